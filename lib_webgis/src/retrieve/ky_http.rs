//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`. It resolves paths
//! against a base URL, injects default headers and an optional bearer token,
//! and returns non-2xx responses as data instead of errors so callers can
//! decide what a failed status means for them.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Longest slice of a response body kept for diagnostics.
const BODY_SNIPPET_CHARS: usize = 500;

/// Errors raised while talking HTTP. Non-2xx statuses are not errors here.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("response from {url} (status {status}) is not valid JSON: {source}")]
    Decode {
        url: Url,
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as `application/json`.
    Json(serde_json::Value),
    /// Serialized as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    fn encode(&self) -> Result<(String, &'static str), serde_json::Error> {
        match self {
            RequestBody::Json(value) => Ok((serde_json::to_string(value)?, "application/json")),
            RequestBody::Form(pairs) => Ok((
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish(),
                "application/x-www-form-urlencoded;charset=UTF-8",
            )),
        }
    }
}

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP
/// transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// Builder for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientBuilder {
    base_url: String,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    max_retries: u32,
    auth_token: Option<String>,
}

impl ApiClientBuilder {
    /// Headers sent with every request.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Total per-request timeout. Without it the reqwest default applies.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retries for transient failures (5xx, connection errors). `0` disables
    /// the retry middleware entirely.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Bearer token attached to every request.
    pub fn auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    /// Fails when the base URL is not absolute or the TLS backend cannot be
    /// initialised.
    pub fn build(self) -> Result<ApiClient, RequestError> {
        let base_url = parse_base_url(&self.base_url)?;

        let mut client = reqwest::Client::builder().default_headers(self.default_headers);
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        let client = client.build().map_err(RequestError::Client)?;

        let mut builder = ClientBuilder::new(client);
        if self.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(ApiClient {
            inner: builder.build(),
            base_url,
            auth_token: self.auth_token,
        })
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and optional retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client with no default headers, no retries and the reqwest
    /// default timeout.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, RequestError> {
        Self::builder(base_url).auth_token(auth_token).build()
    }

    /// Starts a builder for `base_url`.
    pub fn builder(base_url: &str) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.to_string(),
            default_headers: HeaderMap::new(),
            timeout: None,
            max_retries: 0,
            auth_token: None,
        }
    }

    /// Returns a copy of this client that sends `token` as bearer credential.
    /// The connection pool is shared with the original.
    pub fn with_bearer(&self, token: &str) -> Self {
        Self {
            inner: self.inner.clone(),
            base_url: self.base_url.clone(),
            auth_token: Some(token.to_string()),
        }
    }

    /// The base URL, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` below the base URL. A leading `/` is ignored so the
    /// base URL's own path is never dropped.
    pub fn join(&self, path: &str) -> Result<Url, RequestError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Performs a request and decodes a 2xx body as JSON into `T`.
    ///
    /// Non-2xx responses come back as `Ok` with `success == false` and the
    /// body text in `error_body`.
    ///
    /// # Errors
    /// Transport failures, unreadable bodies and 2xx bodies that do not
    /// decode into `T`.
    pub async fn request<T>(
        &self,
        method: Method,
        url: Url,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse<T>, RequestError>
    where
        T: DeserializeOwned,
    {
        let mut req = self.inner.request(method, url.clone());

        let explicit_content_type = headers
            .as_ref()
            .is_some_and(|h| h.contains_key(CONTENT_TYPE));
        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let (encoded, content_type) = b.encode().map_err(RequestError::Encode)?;
            if !explicit_content_type {
                req = req.header(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            req = req.body(encoded);
        }

        let response: reqwest::Response = req.send().await.map_err(|source| RequestError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let text = response.text().await.map_err(|source| RequestError::Body {
            url: url.clone(),
            source,
        })?;

        if status.is_success() {
            let data = serde_json::from_str::<T>(&text).map_err(|source| RequestError::Decode {
                url,
                status: status.as_u16(),
                body: body_snippet(&text),
                source,
            })?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            Ok(ApiResponse {
                data: None,
                error_body: Some(body_snippet(&text)),
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

/// First few hundred characters of a body, for logs and error values.
pub fn body_snippet(body: &str) -> String {
    if body.chars().count() <= BODY_SNIPPET_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}

fn parse_base_url(raw: &str) -> Result<Url, RequestError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
