//! Optional relational mirror of chapters and questions.
//!
//! Both tables are keyed on natural keys and written with upserts, so a rerun
//! converges on the same rows instead of duplicating them. Question rows are
//! buffered per chapter and flushed in fixed-size batches.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ChapterIndexEntry, ChapterScope, Question};

/// One row of the questions table.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    pub exam_id: String,
    pub subject_id: String,
    pub chapter_id: String,
    pub question_index: i64,
    pub payload: Value,
}

impl QuestionRow {
    /// Row for a normalized question; the payload is the shard line as JSON.
    pub fn new(scope: &ChapterScope, question: &Question) -> Result<Self> {
        Ok(Self {
            exam_id: scope.exam_id.clone(),
            subject_id: scope.subject_id.clone(),
            chapter_id: scope.chapter_id.clone(),
            question_index: column_int("question_index", question.index)?,
            payload: serde_json::to_value(question)?,
        })
    }
}

/// One row of the chapters table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRow {
    pub exam_id: String,
    pub subject_id: String,
    pub chapter_id: String,
    pub exam_name: String,
    pub subject_name: String,
    pub chapter_name: String,
    pub question_count: i64,
}

impl TryFrom<&ChapterIndexEntry> for ChapterRow {
    type Error = AppError;

    fn try_from(entry: &ChapterIndexEntry) -> Result<Self> {
        Ok(Self {
            exam_id: entry.exam_id.clone(),
            subject_id: entry.subject_id.clone(),
            chapter_id: entry.chapter_id.clone(),
            exam_name: entry.exam_name.clone(),
            subject_name: entry.subject_name.clone(),
            chapter_name: entry.chapter_name.clone(),
            question_count: column_int("question_count", entry.total_questions)?,
        })
    }
}

/// `BIGINT` column value; out-of-range counts are rejected rather than clamped.
fn column_int(column: &str, value: usize) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::storage(column, format!("{value} does not fit in BIGINT")))
}

/// Secondary sink for normalized data.
#[async_trait]
pub trait RelationalSink: Send + Sync {
    /// Upsert a batch of question rows in one transaction.
    async fn upsert_questions(&mut self, rows: &[QuestionRow]) -> Result<()>;

    /// Upsert a chapter summary row.
    async fn upsert_chapter(&mut self, row: &ChapterRow) -> Result<()>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Accumulates rows and hands them out in batches of `capacity`.
#[derive(Debug)]
pub struct RowBuffer<T> {
    rows: Vec<T>,
    capacity: usize,
}

impl<T> RowBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a row; returns a full batch once `capacity` is reached.
    pub fn push(&mut self, row: T) -> Option<Vec<T>> {
        self.rows.push(row);
        if self.rows.len() >= self.capacity {
            Some(std::mem::replace(
                &mut self.rows,
                Vec::with_capacity(self.capacity),
            ))
        } else {
            None
        }
    }

    /// Take whatever is left, if anything.
    pub fn drain(&mut self) -> Option<Vec<T>> {
        if self.rows.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.rows))
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Open the configured sink, or `None` when no connection string is set.
pub async fn open_sink(url: Option<&str>) -> Result<Option<Box<dyn RelationalSink>>> {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };

    #[cfg(feature = "postgres")]
    {
        let writer = postgres::PostgresSink::connect(url).await?;
        Ok(Some(Box::new(writer)))
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = url;
        Err(crate::error::AppError::config(
            "DATABASE_URL is set but the `postgres` feature is disabled",
        ))
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! Postgres implementation over `tokio-postgres`.

    use async_trait::async_trait;
    use tokio::task::JoinHandle;
    use tokio_postgres::types::Json;
    use tokio_postgres::{Client, NoTls};

    use super::{ChapterRow, QuestionRow, RelationalSink};
    use crate::error::Result;

    pub const CREATE_CHAPTERS: &str = "\
        CREATE TABLE IF NOT EXISTS pyq_chapters (\
            exam_id TEXT NOT NULL, \
            subject_id TEXT NOT NULL, \
            chapter_id TEXT NOT NULL, \
            exam_name TEXT NOT NULL, \
            subject_name TEXT NOT NULL, \
            chapter_name TEXT NOT NULL, \
            question_count BIGINT NOT NULL, \
            created_at TIMESTAMPTZ DEFAULT now(), \
            PRIMARY KEY (exam_id, subject_id, chapter_id))";

    pub const CREATE_QUESTIONS: &str = "\
        CREATE TABLE IF NOT EXISTS pyq_questions (\
            exam_id TEXT NOT NULL, \
            subject_id TEXT NOT NULL, \
            chapter_id TEXT NOT NULL, \
            question_index BIGINT NOT NULL, \
            payload JSONB NOT NULL, \
            created_at TIMESTAMPTZ DEFAULT now(), \
            PRIMARY KEY (exam_id, subject_id, chapter_id, question_index))";

    pub const UPSERT_QUESTION: &str = "\
        INSERT INTO pyq_questions (exam_id, subject_id, chapter_id, question_index, payload) \
        VALUES ($1, $2, $3, $4, $5) \
        ON CONFLICT (exam_id, subject_id, chapter_id, question_index) \
        DO UPDATE SET payload = EXCLUDED.payload";

    pub const UPSERT_CHAPTER: &str = "\
        INSERT INTO pyq_chapters \
            (exam_id, subject_id, chapter_id, exam_name, subject_name, chapter_name, question_count) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (exam_id, subject_id, chapter_id) \
        DO UPDATE SET \
            exam_name = EXCLUDED.exam_name, \
            subject_name = EXCLUDED.subject_name, \
            chapter_name = EXCLUDED.chapter_name, \
            question_count = EXCLUDED.question_count";

    /// Connection-owning writer for the two mirror tables.
    pub struct PostgresSink {
        client: Client,
        connection: JoinHandle<()>,
    }

    impl PostgresSink {
        /// Connect and make sure both tables exist.
        pub async fn connect(url: &str) -> Result<Self> {
            let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
            let connection = tokio::spawn(async move {
                if let Err(err) = connection.await {
                    log::error!("postgres connection error: {err}");
                }
            });

            let sink = Self { client, connection };
            sink.ensure_schema().await?;
            log::info!("Relational sink connected");
            Ok(sink)
        }

        async fn ensure_schema(&self) -> Result<()> {
            self.client.execute(CREATE_CHAPTERS, &[]).await?;
            self.client.execute(CREATE_QUESTIONS, &[]).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl RelationalSink for PostgresSink {
        async fn upsert_questions(&mut self, rows: &[QuestionRow]) -> Result<()> {
            if rows.is_empty() {
                return Ok(());
            }

            let transaction = self.client.transaction().await?;
            let statement = transaction.prepare(UPSERT_QUESTION).await?;
            for row in rows {
                transaction
                    .execute(
                        &statement,
                        &[
                            &row.exam_id,
                            &row.subject_id,
                            &row.chapter_id,
                            &row.question_index,
                            &Json(&row.payload),
                        ],
                    )
                    .await?;
            }
            transaction.commit().await?;
            Ok(())
        }

        async fn upsert_chapter(&mut self, row: &ChapterRow) -> Result<()> {
            self.client
                .execute(
                    UPSERT_CHAPTER,
                    &[
                        &row.exam_id,
                        &row.subject_id,
                        &row.chapter_id,
                        &row.exam_name,
                        &row.subject_name,
                        &row.chapter_name,
                        &row.question_count,
                    ],
                )
                .await?;
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            let Self { client, connection } = *self;
            drop(client);
            if let Err(e) = connection.await {
                log::warn!("postgres connection task ended abnormally: {e}");
            }
            Ok(())
        }
    }
}
