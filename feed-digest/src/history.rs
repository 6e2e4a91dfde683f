use crate::types::{Article, HistoryRecord, HistoryWriter, PushHistoryProvider, PushType, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Number of records read back when deriving a cutoff.
const HISTORY_PAGE_SIZE: i64 = 50;

/// Picks the cutoff for a new batch.
///
/// `history` is newest first. A weekly batch looks for the latest weekly
/// record; a daily batch uses the latest record of any kind. Without a
/// matching record the cutoff is `now - lookback`.
pub fn derive_cutoff(
    history: &[HistoryRecord],
    kind: PushType,
    now: DateTime<Utc>,
    lookback: Duration,
) -> DateTime<Utc> {
    let last = match kind {
        PushType::Weekly => history.iter().find(|record| record.kind == PushType::Weekly),
        PushType::Daily => history.first(),
    };

    last.map(|record| record.time)
        .unwrap_or_else(|| now - lookback)
}

/// Push history kept in Postgres, used instead of the backend history API
/// when a database URL is configured.
pub struct PgHistoryStore {
    db: Pool<Postgres>,
}

impl PgHistoryStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        info!("Push history store ready");
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    async fn load_recent(&self) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, pushed_at, content, articles
            FROM push_history
            ORDER BY pushed_at DESC
            LIMIT $1
            "#,
        )
        .bind(HISTORY_PAGE_SIZE)
        .fetch_all(&self.db)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let kind = match kind.parse::<PushType>() {
                Ok(kind) => kind,
                Err(_) => {
                    debug!("Skipping history row with unknown kind {}", kind);
                    continue;
                }
            };
            let articles_json: serde_json::Value = row.try_get("articles")?;
            let articles: Vec<Article> = serde_json::from_value(articles_json)?;

            records.push(HistoryRecord {
                kind,
                time: row.try_get::<DateTime<Utc>, _>("pushed_at")?,
                content: row.try_get("content")?,
                articles,
            });
        }

        Ok(records)
    }

    async fn insert(&self, record: &HistoryRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let articles = serde_json::to_value(&record.articles)?;

        sqlx::query(
            r#"
            INSERT INTO push_history (id, kind, pushed_at, content, articles)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(record.kind.as_str())
        .bind(record.time)
        .bind(&record.content)
        .bind(articles)
        .execute(&self.db)
        .await?;

        info!("Recorded {} push {} with {} articles", record.kind, id, record.articles.len());
        Ok(id)
    }
}

#[async_trait]
impl PushHistoryProvider for PgHistoryStore {
    async fn fetch_push_history(&self, _token: &str) -> anyhow::Result<Vec<HistoryRecord>> {
        Ok(self.load_recent().await?)
    }
}

#[async_trait]
impl HistoryWriter for PgHistoryStore {
    async fn insert_push_history(&self, record: &HistoryRecord, _token: &str) -> anyhow::Result<()> {
        self.insert(record).await?;
        Ok(())
    }
}
