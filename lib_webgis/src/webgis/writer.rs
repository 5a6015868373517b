use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::configs::{RawNaming, TrafficConfig};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize payload for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    pub fn path(&self) -> &Path {
        match self {
            WriteError::CreateDir { path, .. }
            | WriteError::Serialize { path, .. }
            | WriteError::Io { path, .. } => path,
        }
    }
}

/// What a file holds, and the date it is labelled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// The full response, labelled with the run date.
    Raw(NaiveDate),
    /// One day's records.
    Day(NaiveDate),
}

/// Writes payloads as pretty-printed JSON files into one directory.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    output_dir: PathBuf,
    raw_naming: RawNaming,
}

impl JsonWriter {
    pub fn new(output_dir: impl Into<PathBuf>, raw_naming: RawNaming) -> Self {
        Self {
            output_dir: output_dir.into(),
            raw_naming,
        }
    }

    pub fn from_config(config: &TrafficConfig) -> Self {
        Self::new(config.output_dir.clone(), config.raw_naming)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<dataset>_<YYYY-MM-DD>.json`, or `<dataset>_raw_<YYYY-MM-DD>.json`
    /// for a raw dump under [`RawNaming::Distinct`]. Path separators in the
    /// dataset id are replaced by `_`.
    pub fn file_name(&self, dataset_id: &str, kind: OutputKind) -> String {
        let dataset: String = dataset_id
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        match (kind, self.raw_naming) {
            (OutputKind::Raw(date), RawNaming::Distinct) => {
                format!("{}_raw_{}.json", dataset, date.format("%Y-%m-%d"))
            }
            (OutputKind::Raw(date), RawNaming::Shared) | (OutputKind::Day(date), _) => {
                format!("{}_{}.json", dataset, date.format("%Y-%m-%d"))
            }
        }
    }

    pub fn path_for(&self, dataset_id: &str, kind: OutputKind) -> PathBuf {
        self.output_dir.join(self.file_name(dataset_id, kind))
    }

    /// Writes `payload`, replacing any existing file of the same name.
    pub fn write(&self, dataset_id: &str, kind: OutputKind, payload: &Value) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| WriteError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.path_for(dataset_id, kind);
        let json = serde_json::to_string_pretty(payload).map_err(|source| WriteError::Serialize {
            path: path.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| WriteError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| WriteError::Io {
                path: path.clone(),
                source,
            })?;

        log::info!("Saved data to {}", path.display());
        Ok(path)
    }
}
