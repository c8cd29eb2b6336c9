//! Exam, Subject, and Chapter data structures.

use serde::{Deserialize, Serialize};

/// A named assessment program, e.g. "JEE Main".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
}

/// Subject area within an exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub exam_id: String,
}

/// Topical grouping of questions within a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub name: String,
    pub subject_id: String,
    pub exam_id: String,

    /// Advisory count reported by the listing; the crawled count wins
    pub hinted_question_count: u64,
}

impl Chapter {
    /// Identifiers that place this chapter in the hierarchy.
    pub fn scope(&self) -> ChapterScope {
        ChapterScope {
            exam_id: self.exam_id.clone(),
            subject_id: self.subject_id.clone(),
            chapter_id: self.id.clone(),
        }
    }
}

/// The (exam, subject, chapter) key shared by shards, image folders and rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterScope {
    pub exam_id: String,
    pub subject_id: String,
    pub chapter_id: String,
}

impl ChapterScope {
    pub fn new(
        exam_id: impl Into<String>,
        subject_id: impl Into<String>,
        chapter_id: impl Into<String>,
    ) -> Self {
        Self {
            exam_id: exam_id.into(),
            subject_id: subject_id.into(),
            chapter_id: chapter_id.into(),
        }
    }

    /// Base shard name without compression suffix.
    pub fn shard_stem(&self) -> String {
        format!("{}_{}_{}.jsonl", self.exam_id, self.subject_id, self.chapter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_chapter() {
        let chapter = Chapter {
            id: "c9".to_string(),
            name: "Kinematics".to_string(),
            subject_id: "s2".to_string(),
            exam_id: "e1".to_string(),
            hinted_question_count: 40,
        };

        let scope = chapter.scope();
        assert_eq!(scope, ChapterScope::new("e1", "s2", "c9"));
        assert_eq!(scope.shard_stem(), "e1_s2_c9.jsonl");
    }
}
