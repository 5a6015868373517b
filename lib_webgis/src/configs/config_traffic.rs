use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "linz_traffic.conf";

const DEFAULT_BASE_URL: &str = "https://webgis.linz.at/MAppEnterprise";
const DEFAULT_DATASET: &str = "VDNB_VKT_VERLAUF_7t_60min_V2_LINZ";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown time zone: {0}")]
    InvalidTimeZone(String),

    #[error("no datasets configured")]
    NoDatasets,

    #[error("dataset {id} is not configured (known: {known})")]
    UnknownDataset { id: String, known: String },
}

/// How the raw full-response dump is named relative to the day files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawNaming {
    /// `<dataset>_raw_<date>.json`, never collides with a day file.
    #[default]
    Distinct,
    /// `<dataset>_<date>.json`, overwritten by the day file for the run date.
    Shared,
}

impl FromStr for RawNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distinct" => Ok(RawNaming::Distinct),
            "shared" => Ok(RawNaming::Shared),
            other => Err(format!("unknown raw naming '{}', expected 'distinct' or 'shared'", other)),
        }
    }
}

impl fmt::Display for RawNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawNaming::Distinct => f.write_str("distinct"),
            RawNaming::Shared => f.write_str("shared"),
        }
    }
}

/// One dataset to fetch and the attributes requested for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDescriptor {
    pub id: String,
    /// Empty means "use the global attribute list".
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl DatasetDescriptor {
    pub fn new(id: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// One layer of configuration. Every field is optional so layers can be
/// stacked: defaults, then the JSON file, then env/CLI overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    pub base_url: Option<String>,
    pub auth_path: Option<String>,
    pub datasets_path: Option<String>,
    pub tenant: Option<String>,
    pub auth_app_id: Option<String>,
    pub dashboard_app_id: Option<String>,
    pub dashboard_view_id: Option<String>,
    pub client_id: Option<String>,
    pub grant_type: Option<String>,
    pub scope: Option<String>,
    pub user_agent: Option<String>,
    pub token_prefix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    /// `false` turns the log file off; console logging is unaffected.
    pub log_to_file: Option<bool>,
    pub log_level: Option<String>,
    pub datasets: Option<Vec<DatasetDescriptor>>,
    pub attributes: Option<Vec<String>>,
    pub date_fields: Option<Vec<String>>,
    pub time_zone: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub raw_naming: Option<RawNaming>,
}

impl ConfigLayer {
    /// Built-in values, matching the public Linz dashboard.
    pub fn defaults() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            auth_path: Some("api/v1/oauth2/token".to_string()),
            datasets_path: Some("api/v1/featureanalyzer/datasets".to_string()),
            tenant: Some("linz_db".to_string()),
            auth_app_id: Some("b20c5cbc-a2be-4890-92e5-a179e44d2daf".to_string()),
            dashboard_app_id: Some("0c86a969-5a3c-4299-b567-8229fc692cca".to_string()),
            dashboard_view_id: Some("8dcab3bd-ca14-40f6-8631-25a816457cfb".to_string()),
            client_id: Some("App".to_string()),
            grant_type: Some("password".to_string()),
            scope: Some("public".to_string()),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            token_prefix: Some("awse_".to_string()),
            output_dir: Some(PathBuf::from("data")),
            log_dir: Some(PathBuf::from("logs")),
            log_to_file: Some(true),
            log_level: Some("info".to_string()),
            datasets: Some(vec![DatasetDescriptor::new(DEFAULT_DATASET, Vec::new())]),
            attributes: Some(vec!["pkw".to_string(), "datum".to_string(), "ID".to_string()]),
            date_fields: Some(
                ["datum", "date", "timestamp", "zeit"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            time_zone: Some("Europe/Vienna".to_string()),
            timeout_secs: Some(60),
            max_retries: Some(0),
            raw_naming: Some(RawNaming::Distinct),
        }
    }

    /// Reads a JSON layer from `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // Merge two layers, where 'other' overrides 'self' for Some values
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            base_url: other.base_url.or(self.base_url),
            auth_path: other.auth_path.or(self.auth_path),
            datasets_path: other.datasets_path.or(self.datasets_path),
            tenant: other.tenant.or(self.tenant),
            auth_app_id: other.auth_app_id.or(self.auth_app_id),
            dashboard_app_id: other.dashboard_app_id.or(self.dashboard_app_id),
            dashboard_view_id: other.dashboard_view_id.or(self.dashboard_view_id),
            client_id: other.client_id.or(self.client_id),
            grant_type: other.grant_type.or(self.grant_type),
            scope: other.scope.or(self.scope),
            user_agent: other.user_agent.or(self.user_agent),
            token_prefix: other.token_prefix.or(self.token_prefix),
            output_dir: other.output_dir.or(self.output_dir),
            log_dir: other.log_dir.or(self.log_dir),
            log_to_file: other.log_to_file.or(self.log_to_file),
            log_level: other.log_level.or(self.log_level),
            datasets: other.datasets.or(self.datasets),
            attributes: other.attributes.or(self.attributes),
            date_fields: other.date_fields.or(self.date_fields),
            time_zone: other.time_zone.or(self.time_zone),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            max_retries: other.max_retries.or(self.max_retries),
            raw_naming: other.raw_naming.or(self.raw_naming),
        }
    }
}

/// Fully resolved, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    pub base_url: String,
    pub auth_path: String,
    pub datasets_path: String,
    pub tenant: String,
    pub auth_app_id: String,
    pub dashboard_app_id: String,
    pub dashboard_view_id: String,
    pub client_id: String,
    pub grant_type: String,
    pub scope: String,
    pub user_agent: String,
    pub token_prefix: String,
    pub output_dir: PathBuf,
    /// `None` when no log file is written.
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    /// Every descriptor has a non-empty attribute list.
    pub datasets: Vec<DatasetDescriptor>,
    pub date_fields: Vec<String>,
    pub time_zone: Tz,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub raw_naming: RawNaming,
}

impl TrafficConfig {
    /// Resolves a merged layer. Missing values fall back to the defaults.
    pub fn from_layer(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let layer = ConfigLayer::defaults().merge(layer);
        macro_rules! take {
            ($field:ident) => {
                layer.$field.unwrap_or_default()
            };
        }

        let base_url: String = take!(base_url);
        Url::parse(&base_url).map_err(|source| ConfigError::InvalidUrl {
            url: base_url.clone(),
            source,
        })?;

        let time_zone_name: String = take!(time_zone);
        let time_zone = time_zone_name
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(time_zone_name.clone()))?;

        let attributes: Vec<String> = take!(attributes);
        let datasets: Vec<DatasetDescriptor> = take!(datasets);
        if datasets.is_empty() {
            return Err(ConfigError::NoDatasets);
        }
        let datasets = datasets
            .into_iter()
            .map(|mut descriptor| {
                if descriptor.attributes.is_empty() {
                    descriptor.attributes = attributes.clone();
                }
                descriptor
            })
            .collect();

        Ok(Self {
            base_url,
            auth_path: take!(auth_path),
            datasets_path: take!(datasets_path),
            tenant: take!(tenant),
            auth_app_id: take!(auth_app_id),
            dashboard_app_id: take!(dashboard_app_id),
            dashboard_view_id: take!(dashboard_view_id),
            client_id: take!(client_id),
            grant_type: take!(grant_type),
            scope: take!(scope),
            user_agent: take!(user_agent),
            token_prefix: take!(token_prefix),
            output_dir: take!(output_dir),
            log_dir: layer.log_dir.filter(|_| layer.log_to_file.unwrap_or(true)),
            log_level: take!(log_level),
            datasets,
            date_fields: take!(date_fields),
            time_zone,
            timeout_secs: take!(timeout_secs),
            max_retries: take!(max_retries),
            raw_naming: take!(raw_naming),
        })
    }

    /// Keeps only the datasets named in `ids`, in the order given.
    /// An empty selection keeps everything.
    pub fn select_datasets(mut self, ids: &[String]) -> Result<Self, ConfigError> {
        if ids.is_empty() {
            return Ok(self);
        }
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            match self.datasets.iter().find(|d| &d.id == id) {
                Some(descriptor) => selected.push(descriptor.clone()),
                None => {
                    return Err(ConfigError::UnknownDataset {
                        id: id.clone(),
                        known: self
                            .datasets
                            .iter()
                            .map(|d| d.id.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                }
            }
        }
        self.datasets = selected;
        Ok(self)
    }
}

impl fmt::Display for TrafficConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrafficConfig
    Base URL: {},
    Tenant: {},
    Output dir: {},
    Datasets: {:?},
    Time zone: {},
    Timeout: {}s,
    Max retries: {},
    Raw naming: {}
",
            self.base_url,
            self.tenant,
            self.output_dir.display(),
            self.datasets.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            self.time_zone,
            self.timeout_secs,
            self.max_retries,
            self.raw_naming
        )
    }
}

/// The config file [`load_config`] reads for `config_path`: the explicit
/// path, or [`DEFAULT_CONFIG_FILE`] when it exists, or nothing.
pub fn config_source(config_path: Option<&Path>) -> Option<PathBuf> {
    match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            path.is_file().then(|| path.to_path_buf())
        }
    }
}

/// Loads the run configuration.
///
/// 1. built-in defaults;
/// 2. the JSON file at `config_path`, or [`DEFAULT_CONFIG_FILE`] when it
///    exists. An explicitly given path must exist;
/// 3. `overrides` (environment and command line);
/// 4. dataset selection by id.
pub fn load_config(
    config_path: Option<&Path>,
    overrides: ConfigLayer,
    only_datasets: &[String],
) -> Result<TrafficConfig, ConfigError> {
    let mut layer = ConfigLayer::defaults();
    if let Some(path) = config_source(config_path) {
        layer = layer.merge(ConfigLayer::from_file(&path)?);
    }

    let layer = layer.merge(overrides);
    TrafficConfig::from_layer(layer)?.select_datasets(only_datasets)
}
