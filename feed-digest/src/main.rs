use anyhow::Context;
use clap::{Parser, Subcommand};
use feed_digest::{
    login_with_backoff, BackendClient, Collaborators, Credentials, DeliveryChannel, DigestJob,
    Fetcher, HistoryWriter, IssuePublisher, JobConfig, LogChannel, PgHistoryStore, PushHistoryProvider,
    PushType, Schedule, SummaryPublisher, WebhookChannel,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feed-digest", about = "Collects new feed articles and delivers a daily digest")]
struct Cli {
    #[arg(long, env = "FEED_DIGEST_USER")]
    user: String,

    #[arg(long, env = "FEED_DIGEST_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, env = "FEED_DIGEST_BACKEND_URL")]
    backend_url: Option<String>,

    /// Keep push history in Postgres instead of the backend
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "FEED_DIGEST_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// GitHub repository (owner/name) for weekly summaries
    #[arg(long, env = "FEED_DIGEST_ISSUE_REPO")]
    issue_repo: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    issue_token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily/weekly triggers forever (default)
    Schedule,
    /// Run one batch now and deliver it immediately
    RunOnce {
        #[arg(long)]
        weekly: bool,
    },
}

impl Cli {
    fn job_config(&self) -> JobConfig {
        let mut config = JobConfig::default();
        if let Some(url) = &self.backend_url {
            config.backend_url = url.clone();
        }
        config.database_url = self.database_url.clone();
        config.webhook_url = self.webhook_url.clone();
        config.issue_repo = self.issue_repo.clone();
        config.issue_token = self.issue_token.clone();
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.job_config();

    info!("Starting feed digest (backend: {})", config.backend_url);

    let backend = Arc::new(BackendClient::new(&config.backend_url, &config.fetch.user_agent)?);
    let credentials = Credentials {
        user_name: cli.user.clone(),
        password: cli.password.clone(),
    };
    let token = login_with_backoff(backend.as_ref(), &credentials, config.login_attempts)
        .await
        .context("logging in to backend")?;

    let (history, history_writer): (Arc<dyn PushHistoryProvider>, Arc<dyn HistoryWriter>) =
        match &config.database_url {
            Some(database_url) => {
                let store = Arc::new(
                    PgHistoryStore::connect(database_url)
                        .await
                        .context("connecting to history database")?,
                );
                (
                    store.clone() as Arc<dyn PushHistoryProvider>,
                    store as Arc<dyn HistoryWriter>,
                )
            }
            None => (
                backend.clone() as Arc<dyn PushHistoryProvider>,
                backend.clone() as Arc<dyn HistoryWriter>,
            ),
        };

    let delivery: Arc<dyn DeliveryChannel> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookChannel::new(url, &config.webhook_title, &config.fetch.user_agent)?),
        None => {
            warn!("No webhook configured, digests only go to the log");
            Arc::new(LogChannel)
        }
    };

    let publisher: Option<Arc<dyn SummaryPublisher>> = match (&config.issue_repo, &config.issue_token) {
        (Some(repo), Some(token)) => Some(Arc::new(IssuePublisher::new(
            repo,
            token,
            &config.fetch.user_agent,
        )?) as Arc<dyn SummaryPublisher>),
        _ => None,
    };

    let collaborators = Collaborators {
        sources: backend.clone(),
        history,
        history_writer,
        delivery,
        log_channel: Arc::new(LogChannel),
        publisher,
    };
    let fetcher = Arc::new(Fetcher::new(config.fetch.clone())?);
    let job = Arc::new(DigestJob::new(collaborators, fetcher, &config, token));

    match cli.command.unwrap_or(Command::Schedule) {
        Command::Schedule => {
            Schedule::new(&config.schedule, config.calendar.weekly_day)
                .run(job)
                .await;
        }
        Command::RunOnce { weekly } => {
            let kind = if weekly { PushType::Weekly } else { PushType::Daily };
            let report = job.run_batch(kind).await?;
            info!("Batch finished: {:?}", report.status);
            match job.deliver().await {
                Ok(Some(status)) => info!("Delivery status: {:?}", status),
                Ok(None) => info!("Nothing to deliver"),
                Err(e) => error!("{}", e),
            }
        }
    }

    info!("Feed digest finished");
    Ok(())
}
