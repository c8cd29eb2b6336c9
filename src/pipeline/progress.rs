//! Run-wide counters, threaded by value through the crawl.

use crate::models::{ChapterIndexEntry, FilterConfig};

/// What a single chapter contributed.
#[derive(Debug, Default)]
pub struct ChapterOutcome {
    /// Questions written to the shard
    pub questions: usize,
    /// Present only when the shard was published
    pub entry: Option<ChapterIndexEntry>,
}

/// Explicit accumulator for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pub exams: usize,
    pub subjects: usize,
    pub chapters_seen: usize,
    pub chapters_processed: usize,
    pub questions: usize,
}

impl CrawlProgress {
    /// Fold one chapter's outcome in.
    pub fn merge_chapter(mut self, outcome: &ChapterOutcome) -> Self {
        if outcome.entry.is_some() {
            self.chapters_processed += 1;
            self.questions += outcome.questions;
        }
        self
    }

    pub fn chapter_cap_reached(&self, filters: &FilterConfig) -> bool {
        filters.max_chapters > 0 && self.chapters_processed >= filters.max_chapters
    }

    pub fn question_cap_reached(&self, filters: &FilterConfig) -> bool {
        filters.max_questions > 0 && self.questions >= filters.max_questions
    }

    /// Either cap stops the whole traversal.
    pub fn should_stop(&self, filters: &FilterConfig) -> bool {
        self.chapter_cap_reached(filters) || self.question_cap_reached(filters)
    }

    /// Questions still allowed under the cap, `None` when unlimited.
    pub fn question_budget(&self, filters: &FilterConfig) -> Option<usize> {
        (filters.max_questions > 0).then(|| filters.max_questions.saturating_sub(self.questions))
    }

    pub fn summary_items(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Exams", self.exams.to_string()),
            ("Subjects", self.subjects.to_string()),
            (
                "Chapters",
                format!("{}/{}", self.chapters_processed, self.chapters_seen),
            ),
            ("Questions", self.questions.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChapterIndexEntry {
        ChapterIndexEntry {
            exam_id: "e1".to_string(),
            subject_id: "s1".to_string(),
            chapter_id: "c1".to_string(),
            exam_name: "JEE Main".to_string(),
            subject_name: "Physics".to_string(),
            chapter_name: "Kinematics".to_string(),
            total_questions: 3,
            shard_file: "e1_s1_c1.jsonl".to_string(),
        }
    }

    #[test]
    fn test_merge_counts_only_published_chapters() {
        let progress = CrawlProgress::default()
            .merge_chapter(&ChapterOutcome {
                questions: 3,
                entry: Some(entry()),
            })
            .merge_chapter(&ChapterOutcome::default());

        assert_eq!(progress.chapters_processed, 1);
        assert_eq!(progress.questions, 3);
    }

    #[test]
    fn test_caps() {
        let filters = FilterConfig {
            max_chapters: 2,
            max_questions: 5,
            ..FilterConfig::default()
        };
        let mut progress = CrawlProgress::default();
        assert!(!progress.should_stop(&filters));
        assert_eq!(progress.question_budget(&filters), Some(5));

        progress.questions = 5;
        assert!(progress.question_cap_reached(&filters));
        assert_eq!(progress.question_budget(&filters), Some(0));

        progress.questions = 0;
        progress.chapters_processed = 2;
        assert!(progress.should_stop(&filters));
    }

    #[test]
    fn test_zero_means_unlimited() {
        let filters = FilterConfig::default();
        let progress = CrawlProgress {
            chapters_processed: 10_000,
            questions: 1_000_000,
            ..CrawlProgress::default()
        };
        assert!(!progress.should_stop(&filters));
        assert_eq!(progress.question_budget(&filters), None);
    }

    #[test]
    fn test_summary_items() {
        let progress = CrawlProgress {
            exams: 1,
            subjects: 2,
            chapters_seen: 4,
            chapters_processed: 3,
            questions: 9,
        };
        let items = progress.summary_items();
        assert_eq!(items[2], ("Chapters", "3/4".to_string()));
    }
}
