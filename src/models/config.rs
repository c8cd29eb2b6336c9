//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream content API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Image relocation settings
    #[serde(default)]
    pub images: ImageConfig,

    /// Shard and index output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Optional relational mirror
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Traversal filters and debug caps
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("GETMARKS_AUTH_TOKEN") {
            self.api.token = token;
        }
        if let Some(backend) = get("IMAGE_BACKEND") {
            self.images.backend = backend.parse()?;
        }
        if let Some(bucket) = get("S3_BUCKET") {
            self.images.s3.bucket = Some(bucket);
        }
        if let Some(region) = get("S3_REGION") {
            self.images.s3.region = Some(region);
        }
        if let Some(prefix) = get("S3_PREFIX") {
            self.images.s3.prefix = prefix;
        }
        if let Some(dir) = get("OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(compression) = get("OUTPUT_COMPRESSION") {
            self.output.compression = compression.parse()?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(id) = get("EXAM_ID") {
            self.filters.exam_id = Some(id);
        }
        if let Some(id) = get("SUBJECT_ID") {
            self.filters.subject_id = Some(id);
        }
        if let Some(id) = get("CHAPTER_ID") {
            self.filters.chapter_id = Some(id);
        }
        if let Some(n) = get("MAX_CHAPTERS") {
            self.filters.max_chapters = parse_count("MAX_CHAPTERS", &n)?;
        }
        if let Some(n) = get("MAX_QUESTIONS") {
            self.filters.max_questions = parse_count("MAX_QUESTIONS", &n)?;
        }
        Ok(())
    }

    /// Validate configuration values before any network call is made.
    pub fn validate(&self) -> Result<()> {
        if self.api.token.trim().is_empty() {
            return Err(AppError::config("GETMARKS_AUTH_TOKEN is required"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::config("api.base_url is empty"));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| AppError::config(format!("api.base_url is invalid: {e}")))?;
        if self.api.page_limit == 0 {
            return Err(AppError::config("api.page_limit must be > 0"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::config("api.timeout_secs must be > 0"));
        }
        if self.images.timeout_secs == 0 {
            return Err(AppError::config("images.timeout_secs must be > 0"));
        }
        if self.database.batch_size == 0 {
            return Err(AppError::config("database.batch_size must be > 0"));
        }

        if self.images.backend == ImageBackendKind::S3 {
            if !cfg!(feature = "s3") {
                return Err(AppError::config(
                    "IMAGE_BACKEND=s3 requires the `s3` feature",
                ));
            }
            if self.images.s3.bucket.as_deref().is_none_or(str::is_empty) {
                return Err(AppError::config("S3_BUCKET is required for IMAGE_BACKEND=s3"));
            }
        }

        if self.database.url.is_some() && !cfg!(feature = "postgres") {
            return Err(AppError::config(
                "DATABASE_URL is set but the `postgres` feature is disabled",
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::config(format!("{key} must be a non-negative integer, got {value:?}")))
}

/// Upstream API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host of the content API
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: String,

    /// Value of the `limit` query parameter
    #[serde(default = "defaults::page_limit")]
    pub page_limit: u32,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Dashboard component that lists chapter-wise exams
    #[serde(default = "defaults::exam_component")]
    pub exam_component: String,

    /// Case-insensitive substrings an exam title must contain (any of)
    #[serde(default = "defaults::exam_keywords")]
    pub exam_keywords: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            token: String::new(),
            page_limit: defaults::page_limit(),
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
            exam_component: defaults::exam_component(),
            exam_keywords: defaults::exam_keywords(),
        }
    }
}

/// Where relocated images go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackendKind {
    #[default]
    Local,
    S3,
}

impl FromStr for ImageBackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(AppError::config(format!("Unsupported IMAGE_BACKEND: {other}"))),
        }
    }
}

impl fmt::Display for ImageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::S3 => f.write_str("s3"),
        }
    }
}

/// Image relocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub backend: ImageBackendKind,

    /// Per-fetch timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub s3: S3Config,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            backend: ImageBackendKind::default(),
            timeout_secs: defaults::timeout(),
            s3: S3Config::default(),
        }
    }
}

/// Object storage target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,

    /// Enables virtual-hosted public URLs when set
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "defaults::s3_prefix")]
    pub prefix: String,

    #[serde(default = "defaults::cache_control")]
    pub cache_control: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            prefix: defaults::s3_prefix(),
            cache_control: defaults::cache_control(),
        }
    }
}

/// Shard compression mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    /// Suffix appended to shard and index file names.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
        }
    }
}

impl FromStr for Compression {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            other => Err(AppError::config(format!(
                "Unsupported OUTPUT_COMPRESSION: {other}"
            ))),
        }
    }
}

/// Output location and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::output_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub compression: Compression,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
            compression: Compression::default(),
        }
    }
}

/// Relational mirror settings. Absent `url` disables the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,

    /// Question rows per upsert transaction
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            batch_size: defaults::batch_size(),
        }
    }
}

/// Traversal restrictions. Caps of 0 mean unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub exam_id: Option<String>,

    #[serde(default)]
    pub subject_id: Option<String>,

    #[serde(default)]
    pub chapter_id: Option<String>,

    #[serde(default)]
    pub max_chapters: usize,

    #[serde(default)]
    pub max_questions: usize,
}

mod defaults {
    use std::path::PathBuf;

    pub fn base_url() -> String {
        "https://web.getmarks.app".into()
    }
    pub fn page_limit() -> u32 {
        10_000
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; pyq-crawler/0.1)".into()
    }
    pub fn exam_component() -> String {
        "ChapterwiseExams".into()
    }
    pub fn exam_keywords() -> Vec<String> {
        vec!["JEE".into(), "IIT".into()]
    }
    pub fn s3_prefix() -> String {
        "getmarks".into()
    }
    pub fn cache_control() -> String {
        "public, max-age=31536000, immutable".into()
    }
    pub fn output_dir() -> PathBuf {
        PathBuf::from("getmarks_data")
    }
    pub fn batch_size() -> usize {
        500
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_token() -> Config {
        let mut config = Config::default();
        config.api.token = "token".to_string();
        config
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.api.page_limit, 10_000);
        assert_eq!(config.images.timeout_secs, 30);
        assert_eq!(config.images.s3.prefix, "getmarks");
        assert_eq!(config.database.batch_size, 500);
        assert_eq!(config.output.compression, Compression::None);
        assert_eq!(config.images.backend, ImageBackendKind::Local);
    }

    #[test]
    fn test_validate_requires_token() {
        assert!(Config::default().validate().is_err());
        assert!(with_token().validate().is_ok());
    }

    #[test]
    fn test_validate_s3_requires_bucket() {
        let mut config = with_token();
        config.images.backend = ImageBackendKind::S3;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());

        config.images.s3.bucket = Some("assets".to_string());
        assert_eq!(config.validate().is_ok(), cfg!(feature = "s3"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = with_token();
        config.database.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_env_with(env(&[
                ("GETMARKS_AUTH_TOKEN", "abc"),
                ("IMAGE_BACKEND", "S3"),
                ("S3_BUCKET", "bucket"),
                ("OUTPUT_COMPRESSION", "gzip"),
                ("CHAPTER_ID", "ch1"),
                ("MAX_QUESTIONS", "25"),
                ("DATABASE_URL", ""),
            ]))
            .unwrap();

        assert_eq!(config.api.token, "abc");
        assert_eq!(config.images.backend, ImageBackendKind::S3);
        assert_eq!(config.images.s3.bucket.as_deref(), Some("bucket"));
        assert_eq!(config.output.compression, Compression::Gzip);
        assert_eq!(config.filters.chapter_id.as_deref(), Some("ch1"));
        assert_eq!(config.filters.max_questions, 25);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.apply_env_with(env(&[("MAX_CHAPTERS", "lots")])).is_err());
        assert!(config.apply_env_with(env(&[("IMAGE_BACKEND", "ftp")])).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../../pyq.example.toml")).unwrap();
        assert_eq!(config.images.s3.prefix, "getmarks");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_parses_toml_sections() {
        let config: Config = toml::from_str(
            r#"
            [api]
            token = "t"
            exam_keywords = ["NEET"]

            [output]
            dir = "out"
            compression = "gzip"

            [filters]
            max_chapters = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.api.exam_keywords, vec!["NEET".to_string()]);
        assert_eq!(config.api.page_limit, 10_000);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.output.compression, Compression::Gzip);
        assert_eq!(config.filters.max_chapters, 2);
    }
}
