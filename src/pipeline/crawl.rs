// src/pipeline/crawl.rs

//! Question bank crawling pipeline.
//!
//! Walks exam → subject → chapter → questions strictly in upstream order, one
//! request at a time. Each chapter is streamed to its own shard; the master
//! index is written once at the end, even when nothing was found.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;
use crate::models::{
    Chapter, ChapterIndexEntry, ChapterScope, Compression, Config, Exam, FilterConfig, MasterIndex,
    Subject,
};
use crate::pipeline::progress::{ChapterOutcome, CrawlProgress};
use crate::services::{ApiClient, QuestionNormalizer};
use crate::storage::{
    ChapterRow, ImageStore, LocalStorage, QuestionRow, RelationalSink, RowBuffer, ShardWriter,
    build_image_store, open_sink, write_master_index,
};
use crate::utils::log::{header, separator, sub_item, summary};

/// Result of a completed run.
#[derive(Debug)]
pub struct CrawlReport {
    pub index: MasterIndex,
    pub progress: CrawlProgress,
    pub index_path: PathBuf,
}

/// Run the crawler end to end.
///
/// Configuration problems are returned before any request is made. After
/// that, upstream and storage failures are logged and skipped; only a failure
/// to write the master index itself is returned.
pub async fn run_crawler(config: &Config) -> Result<CrawlReport> {
    config.validate()?;

    let start_time = Utc::now();
    header("Question Bank Crawler");

    let api = ApiClient::new(&config.api, config.filters.exam_id.clone())?;
    let images = build_image_store(config).await?;
    log::info!("Image backend: {}", images.backend().describe());

    let sink = match open_sink(config.database.url.as_deref()).await {
        Ok(sink) => sink,
        Err(e) => {
            log::warn!("Relational sink disabled: {}", e);
            None
        }
    };

    let mut crawler = Crawler::new(config, &api, &images, sink);
    let (progress, chapters) = crawler.run().await;
    crawler.close().await;

    let index = MasterIndex {
        total_exams: progress.exams,
        total_subjects: progress.subjects,
        total_chapters: progress.chapters_seen,
        total_questions: progress.questions,
        chapters,
    };

    let storage = LocalStorage::new(&config.output.dir);
    let index_path = write_master_index(&storage, &index, config.output.compression).await?;

    let elapsed = Utc::now() - start_time;
    separator();
    let mut items = progress.summary_items();
    items.push(("Index", index_path.display().to_string()));
    items.push((
        "Elapsed",
        format!("{:.2}s", elapsed.num_milliseconds() as f64 / 1000.0),
    ));
    summary("Crawl", &items);

    Ok(CrawlReport {
        index,
        progress,
        index_path,
    })
}

/// Sequential traversal state for one run.
pub struct Crawler<'a> {
    api: &'a ApiClient,
    images: &'a dyn ImageStore,
    sink: Option<Box<dyn RelationalSink>>,
    filters: &'a FilterConfig,
    output_dir: &'a Path,
    compression: Compression,
    batch_size: usize,
}

impl<'a> Crawler<'a> {
    pub fn new(
        config: &'a Config,
        api: &'a ApiClient,
        images: &'a dyn ImageStore,
        sink: Option<Box<dyn RelationalSink>>,
    ) -> Self {
        Self {
            api,
            images,
            sink,
            filters: &config.filters,
            output_dir: &config.output.dir,
            compression: config.output.compression,
            batch_size: config.database.batch_size,
        }
    }

    /// Crawl everything in scope. Returns the final counters and the index
    /// entries of every published chapter, in traversal order.
    pub async fn run(&mut self) -> (CrawlProgress, Vec<ChapterIndexEntry>) {
        let exams = self.api.list_exams().await;
        let mut progress = CrawlProgress {
            exams: exams.len(),
            ..CrawlProgress::default()
        };
        let mut entries = Vec::new();

        if exams.is_empty() {
            log::warn!("No exams found");
            return (progress, entries);
        }
        log::info!("Found {} exams", exams.len());

        for exam in &exams {
            if progress.should_stop(self.filters) {
                break;
            }
            progress = self.crawl_exam(exam, progress, &mut entries).await;
        }

        if progress.should_stop(self.filters) {
            log::info!("Stopped early: crawl cap reached");
        }
        (progress, entries)
    }

    /// Release the relational sink, if any.
    pub async fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                log::warn!("Failed to close relational sink: {}", e);
            }
        }
    }

    async fn crawl_exam(
        &mut self,
        exam: &Exam,
        mut progress: CrawlProgress,
        entries: &mut Vec<ChapterIndexEntry>,
    ) -> CrawlProgress {
        separator();
        log::info!("Exam: {} ({})", exam.name, exam.id);

        let subjects: Vec<Subject> = self
            .api
            .list_subjects(&exam.id)
            .await
            .into_iter()
            .filter(|s| matches_filter(self.filters.subject_id.as_deref(), &s.id))
            .collect();
        progress.subjects += subjects.len();
        sub_item(&format!("{} subjects", subjects.len()));

        for subject in &subjects {
            if progress.should_stop(self.filters) {
                break;
            }
            progress = self.crawl_subject(exam, subject, progress, entries).await;
        }
        progress
    }

    async fn crawl_subject(
        &mut self,
        exam: &Exam,
        subject: &Subject,
        mut progress: CrawlProgress,
        entries: &mut Vec<ChapterIndexEntry>,
    ) -> CrawlProgress {
        let chapters: Vec<Chapter> = self
            .api
            .list_chapters(&exam.id, &subject.id)
            .await
            .into_iter()
            .filter(|c| matches_filter(self.filters.chapter_id.as_deref(), &c.id))
            .collect();
        progress.chapters_seen += chapters.len();
        log::info!("Subject: {} ({} chapters)", subject.name, chapters.len());

        for chapter in &chapters {
            if progress.should_stop(self.filters) {
                break;
            }
            let outcome = self.crawl_chapter(exam, subject, chapter, &progress).await;
            progress = progress.merge_chapter(&outcome);
            if let Some(entry) = outcome.entry {
                entries.push(entry);
            }
        }
        progress
    }

    async fn crawl_chapter(
        &mut self,
        exam: &Exam,
        subject: &Subject,
        chapter: &Chapter,
        progress: &CrawlProgress,
    ) -> ChapterOutcome {
        let scope = chapter.scope();
        sub_item(&format!(
            "Chapter: {} ({} listed)",
            chapter.name, chapter.hinted_question_count
        ));

        let raw = self.api.list_questions(&scope).await;
        if raw.is_empty() {
            log::warn!("No questions found for chapter {}", chapter.id);
            return ChapterOutcome::default();
        }

        let budget = progress.question_budget(self.filters);
        let shard_file = match self.write_shard(&scope, &raw, budget).await {
            Ok(shard) => shard,
            Err(e) => {
                log::error!("Chapter {} aborted: {}", chapter.id, e);
                return ChapterOutcome::default();
            }
        };

        let entry = ChapterIndexEntry::new(exam, subject, chapter, shard_file.written, shard_file.name);
        if self.sink.is_some() {
            match ChapterRow::try_from(&entry) {
                Ok(row) => self.upsert_chapter(&row).await,
                Err(e) => log::warn!("Skipping chapter row {}: {}", chapter.id, e),
            }
        }
        sub_item(&format!("Saved {} questions", entry.total_questions));

        ChapterOutcome {
            questions: entry.total_questions,
            entry: Some(entry),
        }
    }

    /// Normalize and stream questions until the list or the budget runs out.
    async fn write_shard(
        &mut self,
        scope: &ChapterScope,
        raw: &[serde_json::Value],
        budget: Option<usize>,
    ) -> Result<PublishedShard> {
        let mut writer = ShardWriter::create(self.output_dir, scope, self.compression).await?;
        let mut rows = RowBuffer::new(self.batch_size);

        if let Err(e) = self.fill_shard(&mut writer, &mut rows, scope, raw, budget).await {
            writer.abandon().await;
            return Err(e);
        }

        let written = writer.written();
        let name = writer.finish().await?;
        if let Some(batch) = rows.drain() {
            self.upsert_questions(&batch).await;
        }
        Ok(PublishedShard { name, written })
    }

    async fn fill_shard(
        &mut self,
        writer: &mut ShardWriter,
        rows: &mut RowBuffer<QuestionRow>,
        scope: &ChapterScope,
        raw: &[serde_json::Value],
        budget: Option<usize>,
    ) -> Result<()> {
        let normalizer = QuestionNormalizer::new(self.images, scope);

        for (index, value) in raw.iter().enumerate() {
            if budget.is_some_and(|b| writer.written() >= b) {
                log::info!("Question cap reached in chapter {}", scope.chapter_id);
                break;
            }

            let question = match normalizer.normalize(value, index).await {
                Ok(question) => question,
                Err(e) => {
                    log::warn!("Failed to process question {}: {}", index, e);
                    continue;
                }
            };
            writer.append(&question).await?;

            if self.sink.is_some() {
                match QuestionRow::new(scope, &question) {
                    Ok(row) => {
                        if let Some(batch) = rows.push(row) {
                            self.upsert_questions(&batch).await;
                        }
                    }
                    Err(e) => log::warn!("Skipping question row {}: {}", index, e),
                }
            }
        }
        Ok(())
    }

    async fn upsert_questions(&mut self, rows: &[QuestionRow]) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.upsert_questions(rows).await {
                log::warn!("Failed to upsert {} question rows: {}", rows.len(), e);
            }
        }
    }

    async fn upsert_chapter(&mut self, row: &ChapterRow) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.upsert_chapter(row).await {
                log::warn!("Failed to upsert chapter {}: {}", row.chapter_id, e);
            }
        }
    }
}

struct PublishedShard {
    name: String,
    written: usize,
}

fn matches_filter(filter: Option<&str>, id: &str) -> bool {
    filter.is_none_or(|wanted| wanted == id)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;
    use crate::models::CorrectAnswer;
    use crate::storage::{load_master_index, read_shard};
    use crate::utils::sha1_hex;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

    async fn mount(server: &mut ServerGuard, path: &str, body: Value) -> Mock {
        server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    fn questions_path(chapter_id: &str) -> String {
        format!("/api/v4/cpyqb/exam/e1/subject/s1/chapter/{chapter_id}/questions")
    }

    fn kinematics(image_url: &str) -> Value {
        json!({"data": {"questions": [
            {
                "type": "singleCorrect",
                "level": "easy",
                "previousYearPapers": [{"title": "JEE Main 2024"}],
                "question": {"text": "A ball is thrown upward..."},
                "options": [
                    {"text": "1 s", "isCorrect": false},
                    {"text": "2 s", "isCorrect": true},
                    {"text": "graph", "isCorrect": false, "image": image_url},
                    {"text": "4 s", "isCorrect": false}
                ],
                "solution": {"text": "v = u - gt"}
            },
            {
                "type": "numerical",
                "level": "medium",
                "question": {"text": "Find the range."},
                "options": [],
                "correctValue": "42",
                "solution": {"text": "R = u^2 sin2θ / g"}
            }
        ]}})
    }

    fn no_questions() -> Value {
        json!({"data": {"questions": []}})
    }

    /// One exam, one subject, chapters `c1` (two questions) and `c2`.
    async fn upstream(server: &mut ServerGuard, c2: Value) -> Vec<Mock> {
        let image_url = format!("{}/img/graph.png", server.url());
        vec![
            mount(
                server,
                "/api/v3/dashboard/platform/web",
                json!({"data": {"items": [
                    {"componentTitle": "ChapterwiseExams", "items": [
                        {"examId": "e1", "title": "JEE Main"},
                        {"examId": "e9", "title": "NEET"}
                    ]}
                ]}}),
            )
            .await,
            mount(
                server,
                "/api/v4/cpyqb/exam/e1",
                json!({"data": {"subjects": [{"_id": "s1", "title": "Physics"}]}}),
            )
            .await,
            mount(
                server,
                "/api/v4/cpyqb/exam/e1/subject/s1",
                json!({"data": {"chapters": {"data": [
                    {"_id": "c1", "title": "Kinematics", "allPyqs": {"totalQs": 2}},
                    {"_id": "c2", "title": "Optics", "allPyqs": {"totalQs": 0}}
                ]}}}),
            )
            .await,
            mount(server, &questions_path("c1"), kinematics(&image_url)).await,
            mount(server, &questions_path("c2"), c2).await,
            server
                .mock("GET", "/img/graph.png")
                .with_status(200)
                .with_header("content-type", "image/png")
                .with_body(PNG)
                .create_async()
                .await,
        ]
    }

    fn config(server: &ServerGuard, output: &Path) -> Config {
        let mut config = Config::default();
        config.api.base_url = server.url();
        config.api.token = "token".to_string();
        config.output.dir = output.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_end_to_end_single_chapter() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;

        let report = run_crawler(&config(&server, tmp.path())).await.unwrap();

        assert_eq!(report.index.total_exams, 1);
        assert_eq!(report.index.total_subjects, 1);
        assert_eq!(report.index.total_chapters, 2);
        assert_eq!(report.index.total_questions, 2);
        assert_eq!(report.progress.chapters_processed, 1);
        assert_eq!(report.index.chapters.len(), 1);

        let entry = &report.index.chapters[0];
        assert_eq!(entry.exam_name, "JEE Main");
        assert_eq!(entry.subject_name, "Physics");
        assert_eq!(entry.chapter_name, "Kinematics");
        assert_eq!(entry.shard_file, "e1_s1_c1.jsonl");

        let text = std::fs::read_to_string(tmp.path().join("json/e1_s1_c1.jsonl")).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["correctAnswer"], json!(["B"]));
        assert_eq!(lines[0]["pyqInfo"], "JEE Main 2024");
        assert_eq!(lines[1]["correctAnswer"], json!("42"));

        let image_ref = lines[0]["options"][2]["imageRef"].as_str().unwrap();
        let image_url = format!("{}/img/graph.png", server.url());
        assert_eq!(
            image_ref,
            format!("images/e1/s1/c1/opt3_0000_{}.png", sha1_hex(&image_url))
        );
        assert_eq!(std::fs::read(tmp.path().join(image_ref)).unwrap(), PNG);

        assert!(!tmp.path().join("json/e1_s1_c2.jsonl").exists());

        let loaded = load_master_index(tmp.path()).await.unwrap().unwrap();
        assert_eq!(loaded, report.index);
        let questions = read_shard(tmp.path(), &loaded.chapters[0]).await.unwrap();
        assert_eq!(questions[1].correct_answer, CorrectAnswer::Value(json!("42")));
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;
        let mut config = config(&server, tmp.path());
        config.output.compression = Compression::Gzip;

        run_crawler(&config).await.unwrap();
        let shard = tmp.path().join("json/e1_s1_c1.jsonl.gz");
        let index = tmp.path().join("master_index.json.gz");
        let first = (std::fs::read(&shard).unwrap(), std::fs::read(&index).unwrap());

        run_crawler(&config).await.unwrap();
        let second = (std::fs::read(&shard).unwrap(), std::fs::read(&index).unwrap());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_question_cap_is_never_exceeded() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;
        let mut config = config(&server, tmp.path());
        config.filters.max_questions = 1;

        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.index.total_questions, 1);
        assert_eq!(report.index.chapters[0].total_questions, 1);
        let text = std::fs::read_to_string(tmp.path().join("json/e1_s1_c1.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_question_cap_spans_chapters() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, json!({"data": {"questions": [
            {"type": "numerical", "correctValue": 3},
            {"type": "numerical", "correctValue": 4}
        ]}}))
        .await;
        let mut config = config(&server, tmp.path());
        config.filters.max_questions = 3;

        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.index.total_questions, 3);
        let per_chapter: Vec<usize> = report
            .index
            .chapters
            .iter()
            .map(|entry| entry.total_questions)
            .collect();
        assert_eq!(per_chapter, vec![2, 1]);
        let text = std::fs::read_to_string(tmp.path().join("json/e1_s1_c2.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_chapter_cap_stops_traversal() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, json!({"data": {"questions": [
            {"type": "numerical", "correctValue": 3}
        ]}}))
        .await;
        let mut config = config(&server, tmp.path());

        let report = run_crawler(&config).await.unwrap();
        assert_eq!(report.progress.chapters_processed, 2);

        std::fs::remove_dir_all(tmp.path().join("json")).unwrap();
        config.filters.max_chapters = 1;
        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.progress.chapters_processed, 1);
        assert_eq!(report.index.total_questions, 2);
        assert_eq!(report.index.chapters[0].chapter_id, "c1");
        assert!(!tmp.path().join("json/e1_s1_c2.jsonl").exists());
    }

    #[tokio::test]
    async fn test_chapter_filter() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;
        let mut config = config(&server, tmp.path());
        config.filters.chapter_id = Some("c2".to_string());

        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.index.total_chapters, 1);
        assert_eq!(report.index.total_questions, 0);
        assert!(report.index.chapters.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_subject_filter_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;
        let mut config = config(&server, tmp.path());
        config.filters.subject_id = Some("s404".to_string());

        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.index.total_exams, 1);
        assert_eq!(report.index.total_subjects, 0);
        assert!(report.index.chapters.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_writes_empty_index() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.api.base_url = "http://127.0.0.1:9".to_string();
        config.api.token = "token".to_string();
        config.output.dir = tmp.path().to_path_buf();

        let report = run_crawler(&config).await.unwrap();

        assert_eq!(report.index, MasterIndex::default());
        let loaded = load_master_index(tmp.path()).await.unwrap().unwrap();
        assert_eq!(loaded, MasterIndex::default());
    }

    #[tokio::test]
    async fn test_missing_token_is_fatal_before_any_request() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let mut config = config(&server, tmp.path());
        config.api.token.clear();

        let err = run_crawler(&config).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!tmp.path().join("master_index.json").exists());
        mock.assert_async().await;
    }

    #[derive(Default)]
    struct Recorded {
        batches: Vec<Vec<QuestionRow>>,
        chapters: Vec<ChapterRow>,
    }

    struct RecordingSink(Arc<Mutex<Recorded>>);

    #[async_trait]
    impl RelationalSink for RecordingSink {
        async fn upsert_questions(&mut self, rows: &[QuestionRow]) -> Result<()> {
            self.0.lock().unwrap().batches.push(rows.to_vec());
            Ok(())
        }

        async fn upsert_chapter(&mut self, row: &ChapterRow) -> Result<()> {
            self.0.lock().unwrap().chapters.push(row.clone());
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_receives_batches_and_chapter_rows() {
        let tmp = TempDir::new().unwrap();
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server, no_questions()).await;
        let mut config = config(&server, tmp.path());
        config.database.batch_size = 1;

        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let api = ApiClient::new(&config.api, None).unwrap();
        let images = build_image_store(&config).await.unwrap();
        let sink: Box<dyn RelationalSink> = Box::new(RecordingSink(recorded.clone()));

        let mut crawler = Crawler::new(&config, &api, &images, Some(sink));
        let (progress, entries) = crawler.run().await;
        crawler.close().await;

        assert_eq!(progress.questions, 2);
        assert_eq!(entries.len(), 1);

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.batches.len(), 2);
        assert_eq!(recorded.batches[1][0].question_index, 1);
        assert_eq!(recorded.batches[1][0].payload["correctAnswer"], json!("42"));
        assert_eq!(recorded.chapters.len(), 1);
        assert_eq!(recorded.chapters[0].question_count, 2);
    }
}
