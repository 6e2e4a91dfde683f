pub mod types;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod state;
pub mod aggregator;
pub mod digest;
pub mod history;
pub mod backend;
pub mod delivery;
pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod utils;

pub use types::*;
pub use traits::SourceFetcher;
pub use fetcher::Fetcher;
pub use parser::{select_new_items, FeedParser};
pub use state::{BatchOutcome, BatchState};
pub use aggregator::RetryController;
pub use digest::{DigestAssembler, NO_NEW_CONTENT};
pub use history::{derive_cutoff, PgHistoryStore};
pub use backend::{login_with_backoff, BackendClient};
pub use delivery::{IssuePublisher, LogChannel, WebhookChannel};
pub use config::{CalendarConfig, JobConfig, ScheduleConfig};
pub use pipeline::{BatchReport, BatchStatus, Collaborators, DigestJob};
pub use scheduler::{Schedule, Trigger};
