// Postgres persistence for the collection engine. The hosted dashboard reads
// these tables through its own API; the engine only needs the operations here.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use farwatch_common::{Pir, Priority, StrategicContext};

use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct SignalStore {
    pool: PgPool,
}

/// A row from the indicators table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndicatorRow {
    pub id: String,
    pub indicator_text: String,
    pub status: String,
    pub confidence_level: Option<String>,
    pub session_id: String,
}

impl IndicatorRow {
    pub fn into_pir(self) -> Pir {
        let priority = self.confidence_level.as_deref().and_then(|level| {
            match level.to_ascii_lowercase().as_str() {
                "high" => Some(Priority::High),
                "medium" => Some(Priority::Medium),
                "low" => Some(Priority::Low),
                _ => None,
            }
        });
        Pir {
            id: self.id,
            text: self.indicator_text,
            priority,
            session_id: self.session_id,
        }
    }
}

/// A row from the signal_sources table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: String,
    pub source_name: String,
    pub source_type: String,
    pub source_url: String,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Parameters for inserting a signal. Article fields stay separate from the
/// AI reasoning and from the opaque metadata blob.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub indicator_id: String,
    pub source_id: String,
    pub article_title: String,
    pub article_content: String,
    pub article_url: String,
    pub published_date: Option<DateTime<Utc>>,
    pub match_score: f64,
    pub ai_reasoning: String,
    pub raw_signal_text: String,
    pub session_id: Option<String>,
    pub status: String,
}

impl SignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Other(e.into()))?;
        Ok(())
    }

    // --- Campaign inputs ---

    /// Active PIR indicators, scoped to a session when one is given.
    pub async fn active_indicators(&self, session_id: Option<&str>) -> Result<Vec<IndicatorRow>> {
        let rows = match session_id {
            Some(session) => {
                sqlx::query_as::<_, IndicatorRow>(
                    r#"
                    SELECT id, indicator_text, status, confidence_level, session_id
                    FROM indicators
                    WHERE status = 'active' AND session_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(session)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, IndicatorRow>(
                    r#"
                    SELECT id, indicator_text, status, confidence_level, session_id
                    FROM indicators
                    WHERE status = 'active'
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Latest strategic intent (optionally scoped to a session) joined with
    /// its decisions. Returns None when no intent exists.
    pub async fn strategic_context(
        &self,
        session_id: Option<&str>,
    ) -> Result<Option<StrategicContext>> {
        #[derive(sqlx::FromRow)]
        struct IntentRow {
            id: String,
            intent_text: String,
            context: String,
            session_id: String,
        }

        let intent = match session_id {
            Some(session) => {
                sqlx::query_as::<_, IntentRow>(
                    r#"
                    SELECT id, intent_text, context, session_id
                    FROM strategic_intents
                    WHERE session_id = $1
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(session)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, IntentRow>(
                    r#"
                    SELECT id, intent_text, context, session_id
                    FROM strategic_intents
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let Some(intent) = intent else {
            return Ok(None);
        };

        let decisions: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT decision_text FROM decisions
            WHERE intent_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(&intent.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StrategicContext {
            objective: intent.intent_text,
            background: intent.context,
            decisions: decisions.into_iter().map(|(d,)| d).collect(),
            session_id: intent.session_id,
        }))
    }

    // --- Sources ---

    /// Resolve a source row by (name, url), creating it when absent.
    /// Concurrent creators race safely: the unique constraint makes the
    /// losing insert a no-op and the re-select picks up the winner's row.
    pub async fn create_or_get_source(
        &self,
        name: &str,
        url: &str,
        source_type: &str,
    ) -> Result<String> {
        if let Some(row) = self.source_by_identity(name, url).await? {
            self.touch_source(&row.id).await;
            return Ok(row.id);
        }

        let inserted = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO signal_sources (source_name, source_type, source_url, last_checked)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (source_name, source_url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(source_type)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = inserted {
            debug!(name, url, "Created signal source");
            return Ok(id);
        }

        // Lost the insert race; the row exists now.
        self.source_by_identity(name, url)
            .await?
            .map(|row| row.id)
            .ok_or_else(|| StoreError::NotFound(format!("signal_sources ({name}, {url})")))
    }

    async fn source_by_identity(&self, name: &str, url: &str) -> Result<Option<SourceRow>> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, source_name, source_type, source_url, last_checked
            FROM signal_sources
            WHERE source_name = $1 AND source_url = $2
            "#,
        )
        .bind(name)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Bump last_checked. Logs a warning on failure rather than propagating;
    /// a stale timestamp shouldn't fail a signal write.
    async fn touch_source(&self, id: &str) {
        let result = sqlx::query(
            r#"UPDATE signal_sources SET last_checked = now() WHERE id = $1"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(source_id = id, error = %e, "Failed to update source last_checked");
        }
    }

    // --- Signals ---

    pub async fn create_signal(&self, signal: NewSignal) -> Result<String> {
        let id = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO signals
                (indicator_id, source_id, article_title, article_content, article_url,
                 published_date, match_score, ai_reasoning, raw_signal_text,
                 observed_at, session_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), $10, $11)
            RETURNING id
            "#,
        )
        .bind(&signal.indicator_id)
        .bind(&signal.source_id)
        .bind(&signal.article_title)
        .bind(&signal.article_content)
        .bind(&signal.article_url)
        .bind(signal.published_date)
        .bind(signal.match_score)
        .bind(&signal.ai_reasoning)
        .bind(&signal.raw_signal_text)
        .bind(&signal.session_id)
        .bind(&signal.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Retention sweep: delete signals observed more than `days` days ago.
    /// Returns the number of rows removed.
    pub async fn delete_signals_older_than(&self, days: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM signals WHERE observed_at < now() - ($1 || ' days')::interval"#,
        )
        .bind(days.to_string())
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, days, "Retention sweep removed old signals");
        }
        Ok(removed)
    }
}
