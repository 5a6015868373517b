//! # Bearer Token Acquisition
//!
//! Every featureanalyzer call needs a bearer token. This module hides where
//! the token comes from behind [`TokenProvider`]:
//!
//! - [`OAuthTokenProvider`] asks the OAuth endpoint (password grant with the
//!   public `App` client);
//! - [`PromptTokenProvider`] asks the operator to paste one from the browser;
//! - [`StaticTokenProvider`] returns a token given on the command line;
//! - [`FallbackTokenProvider`] chains two of the above.
//!
//! [`select_provider`] wires them together from an [`AuthMode`], so the
//! pipeline never branches on where the token came from.

use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::headers::auth_headers;
use crate::configs::TrafficConfig;
use crate::retrieve::ky_http::{ApiClient, RequestBody, RequestError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint rejected the request with status {status}")]
    Rejected { status: u16, body: Option<String> },

    #[error("token endpoint response did not contain an access token")]
    MissingToken,

    #[error("token request failed: {0}")]
    Request(#[from] RequestError),

    #[error("no token provided")]
    EmptyInput,

    #[error("token entry aborted by operator")]
    Aborted,

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("automatic authentication failed ({primary}); manual entry failed ({fallback})")]
    Exhausted {
        primary: Box<AuthError>,
        fallback: Box<AuthError>,
    },
}

/// An opaque bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a trimmed, non-empty token.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AuthError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::EmptyInput);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<{} chars>)", self.0.len())
    }
}

/// Something that can hand out a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    async fn token(&self) -> Result<BearerToken, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Automatic path: POSTs the password-grant form to the OAuth endpoint.
pub struct OAuthTokenProvider {
    client: ApiClient,
    token_url: Url,
    headers: HeaderMap,
    form: Vec<(String, String)>,
}

impl OAuthTokenProvider {
    pub fn new(client: &ApiClient, config: &TrafficConfig) -> Result<Self, RequestError> {
        Ok(Self {
            client: client.clone(),
            token_url: client.join(&config.auth_path)?,
            headers: auth_headers(config),
            form: vec![
                ("grant_type".to_string(), config.grant_type.clone()),
                ("client_id".to_string(), config.client_id.clone()),
                ("scope".to_string(), config.scope.clone()),
            ],
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    fn name(&self) -> &'static str {
        "automatic"
    }

    async fn token(&self) -> Result<BearerToken, AuthError> {
        log::info!("Attempting to obtain authentication token automatically...");

        let response = self
            .client
            .request::<TokenResponse>(
                Method::POST,
                self.token_url.clone(),
                Some(self.headers.clone()),
                Some(RequestBody::Form(self.form.clone())),
            )
            .await?;

        if !response.success {
            log::warn!(
                "Failed to obtain authentication token. Status code: {}",
                response.status
            );
            if let Some(body) = &response.error_body {
                log::debug!("Authentication response: {}", body);
            }
            return Err(AuthError::Rejected {
                status: response.status,
                body: response.error_body,
            });
        }

        let body = response.data.ok_or(AuthError::MissingToken)?;
        let token = match body.access_token {
            Some(raw) if !raw.trim().is_empty() => BearerToken::new(raw)?,
            _ => {
                log::warn!("Authentication response did not contain an access token");
                return Err(AuthError::MissingToken);
            }
        };

        match body.expires_in {
            Some(secs) => log::info!(
                "Successfully obtained authentication token automatically (expires in {}s)",
                secs
            ),
            None => log::info!("Successfully obtained authentication token automatically"),
        }
        Ok(token)
    }
}

/// Interactive path: asks the operator to paste a token.
pub struct PromptTokenProvider {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
    token_prefix: String,
    confirm_first: bool,
}

impl PromptTokenProvider {
    pub fn new(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
        token_prefix: impl Into<String>,
    ) -> Self {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
            token_prefix: token_prefix.into(),
            confirm_first: false,
        }
    }

    /// Reads from stdin and prompts on stdout.
    pub fn stdio(token_prefix: impl Into<String>) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout(), token_prefix)
    }

    /// Ask "enter a token manually? (y/n)" before the actual prompt. Used when
    /// the prompt is the fallback after automatic authentication.
    pub fn confirm_first(mut self, confirm: bool) -> Self {
        self.confirm_first = confirm;
        self
    }

    /// `None` on end of input.
    fn read_line(&self) -> Result<Option<String>, AuthError> {
        let mut input = self.input.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt(&self) -> Result<BearerToken, AuthError> {
        let mut out = self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.confirm_first {
            writeln!(out, "\nFailed to obtain authentication token automatically.")?;
            write!(out, "Would you like to enter a token manually? (y/n) ")?;
            out.flush()?;
            match self.read_line()? {
                Some(answer) if answer.to_lowercase().starts_with('y') => {}
                _ => return Err(AuthError::Aborted),
            }
        }

        writeln!(out, "\nPlease enter a new Bearer token for authentication:")?;
        writeln!(out, "1. Visit the Linz WebGIS portal in your browser")?;
        writeln!(out, "2. Open developer tools (F12) and go to the Network tab")?;
        writeln!(out, "3. Interact with the traffic data visualization")?;
        writeln!(out, "4. Look for API requests to the featureanalyzer endpoints")?;
        writeln!(out, "5. Copy the Bearer token from the Authorization header")?;
        writeln!(
            out,
            "Token should start with '{}' and is quite long.\n",
            self.token_prefix
        )?;
        write!(out, "Bearer token: ")?;
        out.flush()?;

        let line = self.read_line()?.ok_or(AuthError::Aborted)?;
        let token = BearerToken::new(line)?;
        if !token.has_prefix(&self.token_prefix) {
            writeln!(
                out,
                "Warning: Token does not start with '{}'. This may not be a valid token.",
                self.token_prefix
            )?;
            log::warn!(
                "Entered token does not start with '{}'; using it anyway",
                self.token_prefix
            );
        }
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for PromptTokenProvider {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn token(&self) -> Result<BearerToken, AuthError> {
        // Blocks the (single) runtime thread until the operator answers.
        self.prompt()
    }
}

/// A token handed in up front (`--token` / `LINZ_TOKEN`).
pub struct StaticTokenProvider {
    raw: String,
    token_prefix: String,
}

impl StaticTokenProvider {
    pub fn new(raw: impl Into<String>, token_prefix: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            token_prefix: token_prefix.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn token(&self) -> Result<BearerToken, AuthError> {
        let token = BearerToken::new(&self.raw)?;
        if !token.has_prefix(&self.token_prefix) {
            log::warn!(
                "Supplied token does not start with '{}'; using it anyway",
                self.token_prefix
            );
        }
        Ok(token)
    }
}

/// Tries `primary`, then `fallback`.
pub struct FallbackTokenProvider {
    primary: Box<dyn TokenProvider>,
    fallback: Box<dyn TokenProvider>,
}

impl FallbackTokenProvider {
    pub fn new(primary: Box<dyn TokenProvider>, fallback: Box<dyn TokenProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl TokenProvider for FallbackTokenProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn token(&self) -> Result<BearerToken, AuthError> {
        let primary_err = match self.primary.token().await {
            Ok(token) => return Ok(token),
            Err(e) => e,
        };
        log::warn!(
            "{} authentication failed: {}. Falling back to {} entry.",
            self.primary.name(),
            primary_err,
            self.fallback.name()
        );

        self.fallback
            .token()
            .await
            .map_err(|fallback_err| AuthError::Exhausted {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            })
    }
}

/// Where the run's token comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// OAuth first, operator prompt if that fails.
    Auto,
    /// Operator prompt only; the OAuth endpoint is never contacted.
    Prompt,
    /// A token supplied up front.
    Static(String),
}

impl AuthMode {
    /// An explicit token wins over `--prompt-token`.
    pub fn from_flags(token: Option<String>, prompt_token: bool) -> Self {
        match token {
            Some(t) => AuthMode::Static(t),
            None if prompt_token => AuthMode::Prompt,
            None => AuthMode::Auto,
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Auto => f.write_str("Auto"),
            AuthMode::Prompt => f.write_str("Prompt"),
            AuthMode::Static(_) => f.write_str("Static(<redacted>)"),
        }
    }
}

/// Builds the provider chain for `mode`.
pub fn select_provider(
    mode: AuthMode,
    config: &TrafficConfig,
    oauth: OAuthTokenProvider,
    prompt: PromptTokenProvider,
) -> Box<dyn TokenProvider> {
    match mode {
        AuthMode::Static(raw) => Box::new(StaticTokenProvider::new(raw, config.token_prefix.clone())),
        AuthMode::Prompt => Box::new(prompt.confirm_first(false)),
        AuthMode::Auto => Box::new(FallbackTokenProvider::new(
            Box::new(oauth),
            Box::new(prompt.confirm_first(true)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    /// Collects everything written to the console.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn prompt_with(input: &str) -> (PromptTokenProvider, Captured) {
        let out = Captured::default();
        let provider = PromptTokenProvider::new(Cursor::new(input.to_string()), out.clone(), "awse_");
        (provider, out)
    }

    struct Failing;

    #[async_trait]
    impl TokenProvider for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn token(&self) -> Result<BearerToken, AuthError> {
            Err(AuthError::Rejected { status: 401, body: None })
        }
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = BearerToken::new("  awse_secret  ").unwrap();
        assert_eq!(token.expose(), "awse_secret");
        assert!(!format!("{:?}", token).contains("secret"));
        assert!(matches!(BearerToken::new("   "), Err(AuthError::EmptyInput)));
    }

    #[tokio::test]
    async fn prompt_accepts_pasted_token() {
        let (provider, out) = prompt_with("awse_abc123\n");
        let token = provider.token().await.unwrap();
        assert_eq!(token.expose(), "awse_abc123");
        assert!(out.text().contains("Bearer token: "));
        assert!(!out.text().contains("Warning"));
    }

    #[tokio::test]
    async fn prompt_warns_on_unexpected_prefix() {
        let (provider, out) = prompt_with("eyJhbGciOi\n");
        let token = provider.token().await.unwrap();
        assert_eq!(token.expose(), "eyJhbGciOi");
        assert!(out.text().contains("Warning: Token does not start with 'awse_'"));
    }

    #[tokio::test]
    async fn prompt_rejects_empty_and_closed_input() {
        let (provider, _) = prompt_with("\n");
        assert!(matches!(provider.token().await, Err(AuthError::EmptyInput)));

        let (provider, _) = prompt_with("");
        assert!(matches!(provider.token().await, Err(AuthError::Aborted)));
    }

    #[tokio::test]
    async fn confirmation_can_abort() {
        let (provider, _) = prompt_with("n\nawse_never_read\n");
        let provider = provider.confirm_first(true);
        assert!(matches!(provider.token().await, Err(AuthError::Aborted)));

        let (provider, _) = prompt_with("yes\nawse_ok\n");
        let provider = provider.confirm_first(true);
        assert_eq!(provider.token().await.unwrap().expose(), "awse_ok");
    }

    #[tokio::test]
    async fn fallback_reports_both_failures() {
        let (prompt, _) = prompt_with("\n");
        let chain = FallbackTokenProvider::new(Box::new(Failing), Box::new(prompt));
        match chain.token().await {
            Err(AuthError::Exhausted { primary, fallback }) => {
                assert!(matches!(*primary, AuthError::Rejected { status: 401, .. }));
                assert!(matches!(*fallback, AuthError::EmptyInput));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn static_token() {
        let provider = StaticTokenProvider::new("awse_static", "awse_");
        assert_eq!(provider.token().await.unwrap().expose(), "awse_static");
        let empty = StaticTokenProvider::new("", "awse_");
        assert!(matches!(empty.token().await, Err(AuthError::EmptyInput)));
    }

    #[test]
    fn mode_from_flags() {
        assert_eq!(AuthMode::from_flags(None, false), AuthMode::Auto);
        assert_eq!(AuthMode::from_flags(None, true), AuthMode::Prompt);
        assert_eq!(
            AuthMode::from_flags(Some("awse_x".into()), true),
            AuthMode::Static("awse_x".into())
        );
        assert_eq!(format!("{:?}", AuthMode::Static("awse_x".into())), "Static(<redacted>)");
    }
}
