use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::auth::BearerToken;
use super::headers::dataset_headers;
use crate::configs::{DatasetDescriptor, TrafficConfig};
use crate::retrieve::ky_http::{ApiClient, RequestError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid dataset URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request for dataset {dataset} failed: {source}")]
    Request {
        dataset: String,
        #[source]
        source: RequestError,
    },

    #[error("dataset {dataset} returned status {status}")]
    Status {
        dataset: String,
        status: u16,
        body: Option<String>,
    },

    #[error("dataset {dataset} returned a body that is not JSON: {source}")]
    Decode {
        dataset: String,
        #[source]
        source: RequestError,
    },
}

/// GETs `<base>/<datasetsPath>/<id>/values` with the bearer token.
pub struct DatasetFetcher {
    client: ApiClient,
    headers: HeaderMap,
    datasets_path: String,
}

impl DatasetFetcher {
    pub fn new(client: &ApiClient, config: &TrafficConfig, token: &BearerToken) -> Self {
        Self {
            client: client.with_bearer(token.expose()),
            headers: dataset_headers(config),
            datasets_path: config.datasets_path.trim_matches('/').to_string(),
        }
    }

    /// The values URL for one dataset. Attribute names are joined with bare
    /// commas, which is what the service expects.
    pub fn values_url(&self, descriptor: &DatasetDescriptor) -> Result<Url, FetchError> {
        let path = format!("{}/{}/values", self.datasets_path, descriptor.id);
        let mut url = self.client.base_url().join(&path)?;
        if !descriptor.attributes.is_empty() {
            url.set_query(Some(&format!("attributes={}", descriptor.attributes.join(","))));
        }
        Ok(url)
    }

    /// Fetches the full response for one dataset.
    pub async fn fetch(&self, descriptor: &DatasetDescriptor) -> Result<Value, FetchError> {
        let url = self.values_url(descriptor)?;
        log::info!("Fetching data from {}", url);

        let response = self
            .client
            .request::<Value>(Method::GET, url, Some(self.headers.clone()), None)
            .await
            .map_err(|source| match source {
                RequestError::Decode { .. } => FetchError::Decode {
                    dataset: descriptor.id.clone(),
                    source,
                },
                source => FetchError::Request {
                    dataset: descriptor.id.clone(),
                    source,
                },
            })?;

        if !response.success {
            log::error!(
                "API request for {} failed with status code {}",
                descriptor.id,
                response.status
            );
            if let Some(body) = &response.error_body {
                log::debug!("Response: {}", body);
            }
            if response.status == 401 {
                log::error!("Authentication failed. The token has probably expired; run again with --prompt-token to paste a fresh one.");
            }
            return Err(FetchError::Status {
                dataset: descriptor.id.clone(),
                status: response.status,
                body: response.error_body,
            });
        }

        log::info!("Successfully fetched data for {}", descriptor.id);
        Ok(response.data.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::ConfigLayer;

    #[test]
    fn values_url_keeps_commas() {
        let config = TrafficConfig::from_layer(ConfigLayer::default()).unwrap();
        let client = ApiClient::new(&config.base_url, None).unwrap();
        let token = BearerToken::new("awse_test").unwrap();
        let fetcher = DatasetFetcher::new(&client, &config, &token);

        let url = fetcher.values_url(&config.datasets[0]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://webgis.linz.at/MAppEnterprise/api/v1/featureanalyzer/datasets/VDNB_VKT_VERLAUF_7t_60min_V2_LINZ/values?attributes=pkw,datum,ID"
        );

        let bare = DatasetDescriptor::new("X", Vec::new());
        assert!(fetcher.values_url(&bare).unwrap().query().is_none());
    }
}
