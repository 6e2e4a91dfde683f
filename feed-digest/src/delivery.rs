use crate::types::{DeliveryChannel, DeliveryStatus, Result, SummaryPublisher};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const DELIVERY_TIMEOUT_SECS: u64 = 15;
const GITHUB_API: &str = "https://api.github.com";

fn http_client(user_agent: &str) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
        .build()?)
}

/// Chat webhook taking a form post with a title (`text`) and markdown body (`desp`).
pub struct WebhookChannel {
    client: Client,
    url: String,
    title: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, title: impl Into<String>, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(user_agent)?,
            url: url.into(),
            title: title.into(),
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_message(&self, text: &str) -> anyhow::Result<DeliveryStatus> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("text", self.title.as_str()), ("desp", text)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Webhook accepted digest ({})", status);
            return Ok(DeliveryStatus::Accepted);
        }

        let body = response.text().await.unwrap_or_default();
        Ok(DeliveryStatus::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Writes digests to the log.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_message(&self, text: &str) -> anyhow::Result<DeliveryStatus> {
        info!(target: "feed_digest::digest", "{}", text);
        Ok(DeliveryStatus::Accepted)
    }
}

/// Publishes weekly summaries as GitHub issues.
pub struct IssuePublisher {
    client: Client,
    api_base: String,
    repo: String,
    token: String,
}

#[derive(Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct CreatedIssue {
    html_url: String,
}

impl IssuePublisher {
    /// `repo` is `owner/name`.
    pub fn new(repo: impl Into<String>, token: impl Into<String>, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(user_agent)?,
            api_base: GITHUB_API.to_string(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SummaryPublisher for IssuePublisher {
    async fn publish(&self, title_range: &str, content: &str) -> anyhow::Result<String> {
        let created: CreatedIssue = self
            .client
            .post(format!("{}/repos/{}/issues", self.api_base, self.repo))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&NewIssue {
                title: title_range,
                body: content,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding created issue")?;

        info!("Published weekly summary {}", created.html_url);
        Ok(created.html_url)
    }
}
