// src/services/normalizer.rs

//! Maps one upstream question to the canonical [`Question`] record.
//!
//! Images referenced by the question, its options and its solution are
//! relocated through an [`ImageStore`] as they are encountered. A failed image
//! only drops that one reference; a question whose shape cannot be read at all
//! becomes a parse error for the caller to skip.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::raw::{RawContent, RawOption, RawQuestion};
use crate::models::{
    AnswerOption, ChapterScope, Content, CorrectAnswer, NUMERICAL, Question, option_letter,
};
use crate::storage::images::{ImageHint, ImageRole, ImageStore};

/// Normalizes questions of a single chapter.
pub struct QuestionNormalizer<'a> {
    images: &'a dyn ImageStore,
    scope: &'a ChapterScope,
}

impl<'a> QuestionNormalizer<'a> {
    pub fn new(images: &'a dyn ImageStore, scope: &'a ChapterScope) -> Self {
        Self { images, scope }
    }

    /// Normalize the question at `index` (its position in the upstream list).
    pub async fn normalize(&self, raw: &Value, index: usize) -> Result<Question> {
        let raw = RawQuestion::deserialize(raw).map_err(|e| AppError::parse(index, e))?;

        let pyq_info = raw
            .previous_year_papers
            .as_deref()
            .and_then(<[_]>::first)
            .and_then(|paper| paper.title.clone())
            .unwrap_or_default();

        let question = self
            .content(raw.question, ImageHint::new(ImageRole::Question, index))
            .await;
        let options = self.options(raw.options.unwrap_or_default(), index).await;
        let solution = self
            .content(raw.solution, ImageHint::new(ImageRole::Solution, index))
            .await;

        let correct_answer = if raw.kind.as_deref() == Some(NUMERICAL) {
            CorrectAnswer::Value(raw.correct_value.unwrap_or(Value::Null))
        } else {
            CorrectAnswer::Letters(
                options
                    .iter()
                    .enumerate()
                    .filter(|(_, option)| option.is_correct)
                    .map(|(position, _)| option_letter(position))
                    .collect(),
            )
        };

        Ok(Question {
            index,
            kind: raw.kind,
            difficulty: raw.level.unwrap_or(Value::Null),
            pyq_info,
            question,
            options,
            correct_answer,
            solution,
        })
    }

    async fn content(&self, raw: Option<RawContent>, hint: ImageHint) -> Content {
        let raw = raw.unwrap_or_default();
        Content {
            text: raw.text.unwrap_or_default(),
            image_ref: self.relocate(raw.image.as_deref(), hint).await,
        }
    }

    async fn options(&self, raw: Vec<RawOption>, index: usize) -> Vec<AnswerOption> {
        let mut options = Vec::with_capacity(raw.len());
        for (position, option) in raw.into_iter().enumerate() {
            let hint = ImageHint::new(ImageRole::Option(position + 1), index);
            options.push(AnswerOption {
                text: option.text.unwrap_or_default(),
                is_correct: option.is_correct.unwrap_or(false),
                image_ref: self.relocate(option.image.as_deref(), hint).await,
            });
        }
        options
    }

    async fn relocate(&self, url: Option<&str>, hint: ImageHint) -> Option<String> {
        self.images.store(url, self.scope, hint).await
    }
}
