use crate::config::IntegrationConfig;
use crate::error::{AppError, Result};
use crate::metrics::{ERRORS_TOTAL, INTEGRATION_REQUESTS_TOTAL, INTEGRATION_REQUEST_DURATION_SECONDS};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("incident-kb-mcp/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client shared by the outbound integrations
#[derive(Clone)]
pub struct HttpIntegration {
    name: &'static str,
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
    timeout_secs: u64,
}

impl HttpIntegration {
    pub fn new(name: &'static str, config: &IntegrationConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "Integration {} has no endpoint",
                name
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name,
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// POST `body` to `path` and decode the JSON reply
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let outcome = self.send(path, body).await;

        INTEGRATION_REQUEST_DURATION_SECONDS
            .with_label_values(&[self.name])
            .observe(start.elapsed().as_secs_f64());
        let status = if outcome.is_ok() { "success" } else { "error" };
        INTEGRATION_REQUESTS_TOTAL
            .with_label_values(&[self.name, status])
            .inc();

        if let Err(e) = &outcome {
            ERRORS_TOTAL
                .with_label_values(&["integrations", e.error_code()])
                .inc();
            tracing::warn!(integration = self.name, path, error = %e, "Integration request failed");
        }

        outcome
    }

    async fn send<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.url(path))
            .header("User-Agent", USER_AGENT)
            .json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::integration(
                    self.name,
                    format!("request timed out after {} seconds", self.timeout_secs),
                )
            } else {
                AppError::integration(self.name, format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::integration(
                self.name,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AppError::integration(self.name, format!("invalid response body: {}", e)))
    }
}
