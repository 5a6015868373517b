//! # linz-traffic
//!
//! Fetches traffic-sensor datasets from the Linz WebGIS portal and stores
//! them as one JSON file per dataset and day.
//!
//! Authentication is automatic by default (OAuth password grant of the public
//! web app) with an interactive fallback that asks for a token copied from the
//! browser. `--prompt-token` skips the automatic path, `--token` skips both.
//!
//! Exit codes: `0` when at least one dataset was fetched, `1` on a
//! configuration or authentication failure, `2` when every dataset failed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use lib_webgis::configs::{config_source, load_config, ConfigLayer, RawNaming};
use lib_webgis::loggers::setup_logging;
use lib_webgis::webgis::{
    build_client, select_provider, AuthMode, OAuthTokenProvider, Pipeline, PromptTokenProvider, RunReport,
};

#[derive(Parser, Debug)]
#[clap(
    name = "linz-traffic",
    version,
    about = "Fetch traffic sensor data from the Linz WebGIS portal and store it as daily JSON files."
)]
struct Cli {
    #[clap(long, env = "LINZ_PROMPT_TOKEN", help = "Skip automatic authentication and prompt for a Bearer token.")]
    prompt_token: bool,

    #[clap(long, env = "LINZ_TOKEN", hide_env_values = true, help = "Use this Bearer token instead of authenticating.")]
    token: Option<String>,

    #[clap(
        long,
        env = "LINZ_DATASETS",
        num_args = 1..,
        value_delimiter = ',',
        help = "Only fetch these configured dataset ids."
    )]
    datasets: Vec<String>,

    #[clap(long, env = "LINZ_CONFIG_PATH", help = "Path to the JSON configuration file (default: linz_traffic.conf).")]
    config: Option<PathBuf>,

    #[clap(long, env = "LINZ_OUTPUT_DIR", help = "Directory the JSON files are written to.")]
    output_dir: Option<PathBuf>,

    #[clap(long, env = "LINZ_BASE_URL", help = "Base URL of the MAppEnterprise installation.")]
    base_url: Option<String>,

    #[clap(long, env = "LINZ_LOG_DIR", help = "Directory for log files.")]
    log_dir: Option<PathBuf>,

    #[clap(long, env = "LINZ_NO_LOG_FILE", help = "Log to the console only, without a log file.")]
    no_log_file: bool,

    #[clap(long, env = "LINZ_MAX_RETRIES", help = "Retries for transient HTTP failures (0 disables retrying).")]
    max_retries: Option<u32>,

    #[clap(long, env = "LINZ_TIMEOUT_SECS", help = "Per-request timeout in seconds.")]
    timeout_secs: Option<u64>,

    #[clap(long, env = "LINZ_RAW_NAMING", help = "Raw dump naming: 'distinct' (<id>_raw_<date>.json) or 'shared' (<id>_<date>.json).")]
    raw_naming: Option<RawNaming>,

    #[clap(long, env = "LINZ_DEBUG", help = "Enable debug logging.")]
    debug: bool,
}

impl Cli {
    /// Command line and environment values as the topmost config layer.
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            base_url: self.base_url.clone(),
            output_dir: self.output_dir.clone(),
            log_dir: self.log_dir.clone(),
            log_to_file: self.no_log_file.then_some(false),
            log_level: self.debug.then(|| "debug".to_string()),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            raw_naming: self.raw_naming,
            ..Default::default()
        }
    }

    fn auth_mode(&self) -> AuthMode {
        AuthMode::from_flags(self.token.clone(), self.prompt_token)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), cli.overrides(), &cli.datasets)
        .context("failed to load configuration")?;

    let log_file = setup_logging("linz_traffic", config.log_dir.as_deref(), &config.log_level)
        .context("failed to initialise logging")?;

    log::info!("Starting Linz traffic data scraper");
    if let Some(path) = log_file {
        log::debug!("Logging to {}", path.display());
    }
    match config_source(cli.config.as_deref()) {
        Some(path) => log::debug!("Loaded config file {}", path.display()),
        None => log::debug!("No config file found. Using defaults and environment/CLI variables."),
    }
    log::debug!("{}", config);

    let client = build_client(&config).context("failed to build HTTP client")?;
    let oauth = OAuthTokenProvider::new(&client, &config).context("invalid token endpoint")?;
    let prompt = PromptTokenProvider::stdio(config.token_prefix.clone());

    let mode = cli.auth_mode();
    match mode {
        AuthMode::Prompt => log::info!("Using manual token entry mode"),
        AuthMode::Static(_) => log::info!("Using token supplied on the command line"),
        AuthMode::Auto => {}
    }
    let provider = select_provider(mode, &config, oauth, prompt);

    let pipeline = Pipeline::new(&config, client, provider);
    let report = pipeline
        .run(pipeline.today())
        .await
        .context("failed to obtain a valid authentication token")?;

    print_summary(&report);

    if report.all_failed() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "\nSuccessfully processed {} out of {} datasets",
        report.succeeded(),
        report.total()
    );
    for dataset in &report.datasets {
        if let Some(err) = &dataset.fetch_error {
            println!("  failed  {}: {}", dataset.dataset_id, err);
        } else {
            println!(
                "  ok      {}: {} day(s), {} file(s) written, {} record(s) skipped",
                dataset.dataset_id,
                dataset.days,
                dataset.written.len(),
                dataset.skipped
            );
        }
    }
    for err in report.failed_writes() {
        println!("  not written: {}", err.path().display());
    }
}
