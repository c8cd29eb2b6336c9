//! Master index structures.

use serde::{Deserialize, Serialize};

use crate::models::{Chapter, Exam, Subject};

/// Summary of one fully written chapter shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterIndexEntry {
    pub exam_id: String,
    pub subject_id: String,
    pub chapter_id: String,
    pub exam_name: String,
    pub subject_name: String,
    pub chapter_name: String,
    pub total_questions: usize,

    /// File name under `json/`
    pub shard_file: String,
}

impl ChapterIndexEntry {
    pub fn new(
        exam: &Exam,
        subject: &Subject,
        chapter: &Chapter,
        total_questions: usize,
        shard_file: impl Into<String>,
    ) -> Self {
        Self {
            exam_id: exam.id.clone(),
            subject_id: subject.id.clone(),
            chapter_id: chapter.id.clone(),
            exam_name: exam.name.clone(),
            subject_name: subject.name.clone(),
            chapter_name: chapter.name.clone(),
            total_questions,
            shard_file: shard_file.into(),
        }
    }
}

/// Single summary document for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterIndex {
    pub total_exams: usize,
    pub total_subjects: usize,
    pub total_chapters: usize,
    pub total_questions: usize,
    pub chapters: Vec<ChapterIndexEntry>,
}
