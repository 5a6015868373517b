//! One sequential run: token, then fetch, dump, partition and write for each
//! configured dataset.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use super::apicall::{DatasetFetcher, FetchError};
use super::auth::{AuthError, TokenProvider};
use super::partition::Partitioner;
use super::writer::{JsonWriter, OutputKind, WriteError};
use crate::configs::{DatasetDescriptor, TrafficConfig};
use crate::retrieve::ky_http::{ApiClient, RequestError};

/// The HTTP client shared by the token request and the dataset fetches.
pub fn build_client(config: &TrafficConfig) -> Result<ApiClient, RequestError> {
    ApiClient::builder(&config.base_url)
        .timeout(Duration::from_secs(config.timeout_secs))
        .max_retries(config.max_retries)
        .build()
}

/// Outcome for one dataset.
#[derive(Debug)]
pub struct DatasetReport {
    pub dataset_id: String,
    /// Set when the dataset could not be fetched; nothing was written then.
    pub fetch_error: Option<FetchError>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<WriteError>,
    pub days: usize,
    pub skipped: usize,
}

impl DatasetReport {
    fn new(dataset_id: &str) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            fetch_error: None,
            written: Vec::new(),
            failed: Vec::new(),
            days: 0,
            skipped: 0,
        }
    }

    pub fn fetched(&self) -> bool {
        self.fetch_error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.datasets.len()
    }

    /// Datasets whose fetch succeeded, regardless of write failures.
    pub fn succeeded(&self) -> usize {
        self.datasets.iter().filter(|d| d.fetched()).count()
    }

    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }

    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.datasets.iter().flat_map(|d| d.written.iter())
    }

    pub fn failed_writes(&self) -> impl Iterator<Item = &WriteError> {
        self.datasets.iter().flat_map(|d| d.failed.iter())
    }
}

pub struct Pipeline<'a> {
    config: &'a TrafficConfig,
    client: ApiClient,
    provider: Box<dyn TokenProvider>,
    partitioner: Partitioner,
    writer: JsonWriter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a TrafficConfig, client: ApiClient, provider: Box<dyn TokenProvider>) -> Self {
        Self {
            config,
            client,
            provider,
            partitioner: Partitioner::from_config(config),
            writer: JsonWriter::from_config(config),
        }
    }

    /// Today in the service time zone; used to label the raw dump.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.time_zone).date_naive()
    }

    /// Runs every configured dataset in order.
    ///
    /// # Errors
    /// Only authentication failure aborts the run. Fetch and write failures
    /// are collected per dataset in the returned [`RunReport`].
    pub async fn run(&self, run_date: NaiveDate) -> Result<RunReport, AuthError> {
        let token = self.provider.token().await.map_err(|e| {
            log::error!("Failed to obtain a valid authentication token: {}", e);
            e
        })?;
        let fetcher = DatasetFetcher::new(&self.client, self.config, &token);

        let mut report = RunReport::default();
        for descriptor in &self.config.datasets {
            report
                .datasets
                .push(self.process_dataset(&fetcher, descriptor, run_date).await);
        }

        log::info!(
            "Successfully processed {} out of {} datasets",
            report.succeeded(),
            report.total()
        );
        Ok(report)
    }

    async fn process_dataset(
        &self,
        fetcher: &DatasetFetcher,
        descriptor: &DatasetDescriptor,
        run_date: NaiveDate,
    ) -> DatasetReport {
        let mut report = DatasetReport::new(&descriptor.id);
        log::info!("Processing dataset: {}", descriptor.id);

        let raw = match fetcher.fetch(descriptor).await {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Failed to fetch data for {}: {}", descriptor.id, e);
                report.fetch_error = Some(e);
                return report;
            }
        };

        self.save(&mut report, OutputKind::Raw(run_date), &raw);

        let partition = self.partitioner.partition(&raw);
        report.days = partition.days.len();
        report.skipped = partition.skipped;
        log::info!(
            "Dataset {}: {} records across {} days",
            descriptor.id,
            partition.record_count(),
            report.days
        );

        for (date, records) in partition.into_day_records() {
            self.save(&mut report, OutputKind::Day(date), &records);
        }
        report
    }

    fn save(&self, report: &mut DatasetReport, kind: OutputKind, payload: &Value) {
        match self.writer.write(&report.dataset_id, kind, payload) {
            Ok(path) => report.written.push(path),
            Err(e) => {
                log::error!("Error saving data for {}: {}", report.dataset_id, e);
                report.failed.push(e);
            }
        }
    }
}
