use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sqlx::PgPool;
use tracing::info;

use crate::errors::{MergeError, MergeStep, SinkError};
use crate::metrics_consts::{BATCHES_MERGED, MERGE_BATCH_TIME, MERGE_STEP_FAILED, ROWS_MERGED};
use crate::sinks::RecordSink;
use crate::types::FlatRecord;

const CREATE_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS news";

const CREATE_STAGING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS news.temp (
        id VARCHAR(255),
        title VARCHAR(255),
        description VARCHAR(1000),
        url VARCHAR(255),
        author VARCHAR(100),
        image VARCHAR(500),
        language VARCHAR(50),
        category VARCHAR(50),
        published TIMESTAMPTZ
    )"#;

const CREATE_LATEST_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS news.latest (
        id VARCHAR(255),
        title VARCHAR(255),
        description VARCHAR(1000),
        url VARCHAR(255),
        author VARCHAR(100),
        image VARCHAR(500),
        language VARCHAR(50),
        category VARCHAR(50),
        published TIMESTAMPTZ
    )"#;

const APPEND_STAGING: &str = r#"
    INSERT INTO news.temp (id, title, description, url, author, image, language, category, published)
    VALUES (UNNEST($1::text[]), UNNEST($2::text[]), UNNEST($3::text[]), UNNEST($4::text[]),
            UNNEST($5::text[]), UNNEST($6::text[]), UNNEST($7::text[]), UNNEST($8::text[]),
            UNNEST($9::timestamptz[]))"#;

// Duplicate (id, category) staging rows are collapsed to the freshest one
// before the upsert: Postgres MERGE refuses a source that hits the same
// target row twice, and staging legitimately holds duplicates after a crash
// between append and merge, or on batch replay.
const MERGE_LATEST: &str = r#"
    MERGE INTO news.latest AS target
    USING (
        SELECT DISTINCT ON (id, category)
            id, title, description, url, author, image, language, category, published
        FROM news.temp
        ORDER BY id, category, published DESC NULLS LAST
    ) AS source
    ON target.id = source.id AND target.category = source.category
    WHEN MATCHED THEN
        UPDATE SET
            title = source.title,
            description = source.description,
            url = source.url,
            author = source.author,
            image = source.image,
            language = source.language,
            published = source.published
    WHEN NOT MATCHED THEN
        INSERT (id, title, description, url, author, image, language, category, published)
        VALUES (source.id, source.title, source.description, source.url, source.author,
                source.image, source.language, source.category, source.published)"#;

const CLEAR_STAGING: &str = "TRUNCATE TABLE news.temp";

/// Columnar buffer for the staging append, one vector per column, bound as
/// UNNEST arrays in a single bulk INSERT.
#[derive(Debug)]
struct StagingBatch {
    ids: Vec<String>,
    titles: Vec<String>,
    descriptions: Vec<String>,
    urls: Vec<String>,
    authors: Vec<Option<String>>,
    images: Vec<Option<String>>,
    languages: Vec<String>,
    categories: Vec<String>,
    published_ats: Vec<Option<DateTime<Utc>>>,
}

impl StagingBatch {
    fn new(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            titles: Vec::with_capacity(capacity),
            descriptions: Vec::with_capacity(capacity),
            urls: Vec::with_capacity(capacity),
            authors: Vec::with_capacity(capacity),
            images: Vec::with_capacity(capacity),
            languages: Vec::with_capacity(capacity),
            categories: Vec::with_capacity(capacity),
            published_ats: Vec::with_capacity(capacity),
        }
    }

    fn append(&mut self, record: &FlatRecord) {
        self.ids.push(record.id.clone());
        self.titles.push(record.title.clone());
        self.descriptions.push(record.description.clone());
        self.urls.push(record.url.clone());
        self.authors.push(record.author.clone());
        self.images.push(record.image.clone());
        self.languages.push(record.language.clone());
        self.categories.push(record.category.clone());
        self.published_ats.push(record.published);
    }
}

/// Reconciles each micro-batch into the `news.latest` table through the
/// staged merge protocol: append the batch to `news.temp`, merge staging
/// into the latest-state table keyed on (id, category), truncate staging.
///
/// The steps share no transaction. Each one is individually idempotent, so
/// a crash at any boundary is recovered by the next cycle re-running the
/// protocol over whatever staging holds.
///
/// Exactly one pipeline instance may own the staging table: nothing locks
/// it, and concurrent coordinators would race the append and truncate.
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Step 1: create the schema and both tables if absent. Safe to repeat
    /// every batch; also run once at startup, where failure is fatal.
    pub async fn ensure_schema(&self) -> Result<(), MergeError> {
        for statement in [CREATE_SCHEMA, CREATE_STAGING_TABLE, CREATE_LATEST_TABLE] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MergeError {
                    step: MergeStep::EnsureSchema,
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Step 2: append-only bulk write of the batch into staging, on its own
    /// pooled connection, separate from the merge that follows. Rows left
    /// behind by a crash here are picked up by the next cycle's merge.
    async fn append_staging(&self, batch: &StagingBatch) -> Result<(), MergeError> {
        let mut conn = self.pool.acquire().await.map_err(|e| MergeError {
            step: MergeStep::AppendStaging,
            source: e,
        })?;

        sqlx::query(APPEND_STAGING)
            .bind(&batch.ids)
            .bind(&batch.titles)
            .bind(&batch.descriptions)
            .bind(&batch.urls)
            .bind(&batch.authors)
            .bind(&batch.images)
            .bind(&batch.languages)
            .bind(&batch.categories)
            .bind(&batch.published_ats)
            .execute(&mut *conn)
            .await
            .map_err(|e| MergeError {
                step: MergeStep::AppendStaging,
                source: e,
            })?;

        Ok(())
    }

    /// Step 3: upsert staging into the latest-state table. A key already
    /// present gets every non-key column overwritten, an unseen key gets a
    /// new row. Re-running over the same staging content is a no-op for the
    /// table's final state.
    async fn merge_latest(&self) -> Result<u64, MergeError> {
        let result = sqlx::query(MERGE_LATEST)
            .execute(&self.pool)
            .await
            .map_err(|e| MergeError {
                step: MergeStep::Merge,
                source: e,
            })?;
        Ok(result.rows_affected())
    }

    /// Step 4: empty staging so the next batch starts clean. A crash before
    /// this step re-merges the same rows next cycle, which step 3 tolerates.
    async fn clear_staging(&self) -> Result<(), MergeError> {
        sqlx::query(CLEAR_STAGING)
            .execute(&self.pool)
            .await
            .map_err(|e| MergeError {
                step: MergeStep::ClearStaging,
                source: e,
            })?;
        Ok(())
    }

    /// Run the four protocol steps in order for one batch.
    pub async fn merge_batch(&self, records: &[FlatRecord]) -> Result<(), MergeError> {
        let start = Instant::now();

        let mut batch = StagingBatch::new(records.len());
        for record in records {
            batch.append(record);
        }

        let outcome = async {
            self.ensure_schema().await?;
            self.append_staging(&batch).await?;
            let rows = self.merge_latest().await?;
            self.clear_staging().await?;
            Ok::<u64, MergeError>(rows)
        }
        .await;

        match outcome {
            Ok(rows) => {
                counter!(BATCHES_MERGED).increment(1);
                counter!(ROWS_MERGED).increment(rows);
                histogram!(MERGE_BATCH_TIME).record(start.elapsed().as_millis() as f64);
                info!("merged {} staged rows into news.latest", rows);
                Ok(())
            }
            Err(e) => {
                counter!(MERGE_STEP_FAILED, &[("step", e.step.to_string())]).increment(1);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    async fn send_batch(&self, records: &[FlatRecord]) -> Result<(), SinkError> {
        self.merge_batch(records).await.map_err(SinkError::from)
    }
}
