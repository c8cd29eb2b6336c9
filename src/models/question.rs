//! Canonical question record written to shards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream `type` value that switches the answer to a verbatim value.
pub const NUMERICAL: &str = "numerical";

/// A normalized question, one per shard line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Zero-based position within the chapter as returned upstream
    pub index: usize,

    /// Upstream question type, copied verbatim
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Upstream difficulty level, copied verbatim
    pub difficulty: Value,

    /// Title of the first previous-year paper, or empty
    pub pyq_info: String,

    pub question: Content,

    pub options: Vec<AnswerOption>,

    pub correct_answer: CorrectAnswer,

    pub solution: Content,
}

/// Text with an optional relocated image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// One answer choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub text: String,

    pub is_correct: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// Letters of the correct options, or the numerical value as sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Letters(Vec<String>),
    Value(Value),
}

/// Letter for an option position: A-Z, then the 1-based ordinal.
pub fn option_letter(position: usize) -> String {
    match u8::try_from(position) {
        Ok(p) if p < 26 => char::from(b'A' + p).to_string(),
        _ => (position + 1).to_string(),
    }
}
