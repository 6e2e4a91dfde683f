use crate::types::{
    AuthProvider, Credentials, DigestError, HistoryRecord, HistoryWriter, PushHistoryProvider,
    Result, Source, SourceListProvider,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const BACKEND_TIMEOUT_SECS: u64 = 15;

/// Client for the backend that owns the source list and push history.
pub struct BackendClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    pwd: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

impl BackendClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        // Validate once so endpoint building cannot fail later on the scheme
        Url::parse(base_url)?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(BACKEND_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl AuthProvider for BackendClient {
    async fn login(&self, credentials: &Credentials) -> anyhow::Result<String> {
        let response: LoginResponse = self
            .client
            .post(self.endpoint("login"))
            .json(&LoginRequest {
                user_name: &credentials.user_name,
                pwd: &credentials.password,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding login response")?;

        // The backend answers 200 with success=false on bad credentials
        match (response.success, response.token) {
            (true, Some(token)) => Ok(token),
            _ => Err(anyhow!(
                "login rejected: {}",
                response.message.unwrap_or_else(|| "no reason given".to_string())
            )),
        }
    }
}

#[async_trait]
impl SourceListProvider for BackendClient {
    async fn fetch_source_list(&self) -> anyhow::Result<Vec<Source>> {
        let envelope: ListEnvelope<Source> = self
            .client
            .get(self.endpoint("rss/sources"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding source list")?;

        debug!("Backend returned {} sources", envelope.list.len());
        Ok(envelope.list)
    }
}

#[async_trait]
impl PushHistoryProvider for BackendClient {
    async fn fetch_push_history(&self, token: &str) -> anyhow::Result<Vec<HistoryRecord>> {
        let envelope: ListEnvelope<HistoryRecord> = self
            .client
            .get(self.endpoint("rss/history"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding push history")?;

        debug!("Backend returned {} history records", envelope.list.len());
        Ok(envelope.list)
    }
}

#[async_trait]
impl HistoryWriter for BackendClient {
    async fn insert_push_history(&self, record: &HistoryRecord, token: &str) -> anyhow::Result<()> {
        self.client
            .post(self.endpoint("rss/history"))
            .bearer_auth(token)
            .json(record)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Logs in, retrying with exponential backoff up to `max_attempts` times.
pub async fn login_with_backoff(
    auth: &dyn AuthProvider,
    credentials: &Credentials,
    max_attempts: u32,
) -> Result<String> {
    let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
        current_interval: Duration::from_secs(2),
        initial_interval: Duration::from_secs(2),
        max_interval: Duration::from_secs(64),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut last_error = None;

    // Retry login with backoff
    for attempt in 1..=max_attempts.max(1) {
        match auth.login(credentials).await {
            Ok(token) => {
                info!(user = %credentials.user_name, attempt, "Logged in");
                return Ok(token);
            }
            Err(e) => {
                last_error = Some(e);

                // Wait before the next attempt, unless this was the last one
                if attempt < max_attempts {
                    if let Some(delay) = backoff.next_backoff() {
                        warn!("Login attempt {} failed, retrying in {:?}", attempt, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                break;
            }
        }
    }

    Err(DigestError::upstream(
        "auth",
        last_error.unwrap_or_else(|| anyhow!("login failed")),
    ))
}
