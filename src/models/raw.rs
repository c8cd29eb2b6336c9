//! Upstream response shapes.
//!
//! Every field is optional: the content API omits or nulls fields freely and a
//! missing field must never fail a whole listing. Only the fields the crawler
//! reads are modelled; everything else is ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `{ "data": ... }` wrapper shared by all endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardData {
    /// Heterogeneous components; only one of them lists exams
    #[serde(default)]
    pub items: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardComponent {
    #[serde(rename = "componentTitle", default)]
    pub component_title: Option<String>,

    #[serde(default)]
    pub items: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardExam {
    #[serde(rename = "examId", default)]
    pub exam_id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubjectsData {
    /// Decoded item by item into [`RawSubject`]
    #[serde(default)]
    pub subjects: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct RawSubject {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChaptersData {
    #[serde(default)]
    pub chapters: Option<ChapterPage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChapterPage {
    /// Decoded item by item into [`RawChapter`]
    #[serde(default)]
    pub data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct RawChapter {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    /// Advisory only, so a malformed value is ignored
    #[serde(rename = "allPyqs", default, deserialize_with = "lenient")]
    pub all_pyqs: Option<PyqStats>,
}

#[derive(Debug, Deserialize)]
pub struct PyqStats {
    #[serde(rename = "totalQs", default, deserialize_with = "lenient_count")]
    pub total_qs: Option<u64>,
}

/// Decode a field, treating a value of the wrong shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Non-negative count from a number or a numeric string.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct QuestionsData {
    /// Kept untyped so one malformed question cannot sink the chapter
    #[serde(default)]
    pub questions: Option<Vec<Value>>,
}

/// A single upstream question.
#[derive(Debug, Deserialize)]
pub struct RawQuestion {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub level: Option<Value>,

    #[serde(rename = "previousYearPapers", default)]
    pub previous_year_papers: Option<Vec<PaperRef>>,

    #[serde(default)]
    pub question: Option<RawContent>,

    #[serde(default)]
    pub options: Option<Vec<RawOption>>,

    #[serde(rename = "correctValue", default)]
    pub correct_value: Option<Value>,

    #[serde(default)]
    pub solution: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
pub struct PaperRef {
    #[serde(default)]
    pub title: Option<String>,
}

/// Text plus an optional image URL.
#[derive(Debug, Default, Deserialize)]
pub struct RawContent {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawOption {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(rename = "isCorrect", default)]
    pub is_correct: Option<bool>,

    #[serde(default)]
    pub image: Option<String>,
}
