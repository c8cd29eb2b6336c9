// src/services/mod.rs

//! Upstream access and question normalization.

pub mod api;
pub mod normalizer;

pub use api::ApiClient;
pub use normalizer::QuestionNormalizer;
