// src/services/api.rs

//! Read-only client for the upstream question bank API.
//!
//! Every listing is null-safe: transport errors, non-2xx responses and
//! undecodable bodies are logged and turned into an empty list so a flaky
//! upstream never aborts a long crawl. Nothing is retried here.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::models::raw::{
    ChaptersData, DashboardComponent, DashboardData, DashboardExam, Envelope, QuestionsData,
    RawChapter, RawSubject, SubjectsData,
};
use crate::models::{ApiConfig, Chapter, ChapterScope, Exam, Subject};
use crate::utils::http;

const DASHBOARD_PATH: &str = "/api/v3/dashboard/platform/web";

/// Authenticated client for the four listing endpoints.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
    page_limit: u32,
    exam_component: String,
    exam_keywords: Vec<String>,
    exam_filter: Option<String>,
}

impl ApiClient {
    /// Create a client from API settings and an optional exam ID restriction.
    pub fn new(config: &ApiConfig, exam_filter: Option<String>) -> Result<Self> {
        let client = http::create_async_client(&config.user_agent, config.timeout_secs)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            page_limit: config.page_limit,
            exam_component: config.exam_component.clone(),
            exam_keywords: config
                .exam_keywords
                .iter()
                .map(|k| k.to_uppercase())
                .collect(),
            exam_filter,
        })
    }

    /// List exams of interest from the dashboard's chapter-wise component.
    pub async fn list_exams(&self) -> Vec<Exam> {
        let Some(data) = self.get_data::<DashboardData>(DASHBOARD_PATH, &[]).await else {
            return Vec::new();
        };

        let component = data
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| serde_json::from_value::<DashboardComponent>(item).ok())
            .find(|c| c.component_title.as_deref() == Some(self.exam_component.as_str()));

        let Some(component) = component else {
            log::warn!("Dashboard has no '{}' component", self.exam_component);
            return Vec::new();
        };

        component
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| serde_json::from_value::<DashboardExam>(item).ok())
            .filter_map(|raw| {
                let id = raw.exam_id.filter(|id| !id.is_empty())?;
                Some(Exam {
                    id,
                    name: raw.title.unwrap_or_default(),
                })
            })
            .filter(|exam| {
                self.exam_filter
                    .as_deref()
                    .is_none_or(|wanted| wanted == exam.id)
            })
            .filter(|exam| self.matches_program(&exam.name))
            .collect()
    }

    /// List subjects of an exam. Entries without id or name are dropped.
    pub async fn list_subjects(&self, exam_id: &str) -> Vec<Subject> {
        let path = format!("/api/v4/cpyqb/exam/{exam_id}");
        let Some(data) = self.get_data::<SubjectsData>(&path, &[]).await else {
            return Vec::new();
        };

        data.subjects
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| decode_item::<RawSubject>(item, "subject"))
            .filter_map(|raw| {
                Some(Subject {
                    id: non_empty(raw.id)?,
                    name: non_empty(raw.title)?,
                    exam_id: exam_id.to_string(),
                })
            })
            .collect()
    }

    /// List chapters of a subject. Entries without id or name are dropped.
    pub async fn list_chapters(&self, exam_id: &str, subject_id: &str) -> Vec<Chapter> {
        let path = format!("/api/v4/cpyqb/exam/{exam_id}/subject/{subject_id}");
        let Some(data) = self.get_data::<ChaptersData>(&path, &[]).await else {
            return Vec::new();
        };

        data.chapters
            .and_then(|page| page.data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| decode_item::<RawChapter>(item, "chapter"))
            .filter_map(|raw| {
                Some(Chapter {
                    id: non_empty(raw.id)?,
                    name: non_empty(raw.title)?,
                    subject_id: subject_id.to_string(),
                    exam_id: exam_id.to_string(),
                    hinted_question_count: raw
                        .all_pyqs
                        .and_then(|stats| stats.total_qs)
                        .unwrap_or(0),
                })
            })
            .collect()
    }

    /// Raw questions of a chapter in upstream order.
    pub async fn list_questions(&self, scope: &ChapterScope) -> Vec<Value> {
        let path = format!(
            "/api/v4/cpyqb/exam/{}/subject/{}/chapter/{}/questions",
            scope.exam_id, scope.subject_id, scope.chapter_id
        );
        self.get_data::<QuestionsData>(&path, &[("hideOutOfSyllabus", "false")])
            .await
            .and_then(|data| data.questions)
            .unwrap_or_default()
    }

    fn matches_program(&self, title: &str) -> bool {
        let title = title.to_uppercase();
        self.exam_keywords.iter().any(|kw| title.contains(kw.as_str()))
    }

    /// GET an endpoint and unwrap its `data` field, logging any failure.
    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);
        match self.fetch::<T>(&url, query).await {
            Ok(envelope) => {
                if envelope.data.is_none() {
                    log::warn!("Response from {} has no data", url);
                }
                envelope.data
            }
            Err(e) => {
                log::warn!("Request failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Envelope<T>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("limit", self.page_limit)])
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Decode one listing entry; a malformed entry is dropped on its own.
fn decode_item<T: DeserializeOwned>(item: Value, kind: &str) -> Option<T> {
    match serde_json::from_value(item) {
        Ok(raw) => Some(raw),
        Err(e) => {
            log::warn!("Skipping malformed {}: {}", kind, e);
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
