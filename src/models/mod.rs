// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod catalog;
mod config;
mod index;
mod question;
pub mod raw;

// Re-export all public types
pub use catalog::{Chapter, ChapterScope, Exam, Subject};
pub use config::{
    ApiConfig, Compression, Config, DatabaseConfig, FilterConfig, ImageBackendKind, ImageConfig,
    OutputConfig, S3Config,
};
pub use index::{ChapterIndexEntry, MasterIndex};
pub use question::{AnswerOption, Content, CorrectAnswer, NUMERICAL, Question, option_letter};
