//! Content-addressed image relocation.
//!
//! Stored names are derived from the SHA-1 of the *source URL string*, so the
//! name stem is known before any network call:
//!
//! ```text
//! {role}{ordinal?}_{index:04}_{sha1(url)}{ext}
//! q_0007_3f2a….png      question image of question 7
//! opt2_0007_91cc….jpg   image on the second option
//! sol_0007_0b1e….svg    solution image
//! ```

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::{AppError, Result};
use crate::models::ChapterScope;
use crate::utils::{file_extension, http, sha1_hex};

/// Which field of a question an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Question,
    /// 1-based option ordinal
    Option(usize),
    Solution,
}

impl ImageRole {
    pub fn prefix(&self) -> String {
        match self {
            Self::Question => "q".to_string(),
            Self::Option(ordinal) => format!("opt{ordinal}"),
            Self::Solution => "sol".to_string(),
        }
    }
}

/// Naming hint: the image role plus the owning question's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHint {
    pub role: ImageRole,
    pub index: usize,
}

impl ImageHint {
    pub fn new(role: ImageRole, index: usize) -> Self {
        Self { role, index }
    }

    /// File stem for a given source URL.
    pub fn stem(&self, source_url: &str) -> String {
        format!(
            "{}_{:04}_{}",
            self.role.prefix(),
            self.index,
            sha1_hex(source_url)
        )
    }
}

/// A fully named image about to be persisted.
#[derive(Debug, Clone)]
pub struct ImageObject<'a> {
    pub scope: &'a ChapterScope,
    pub stem: String,
    /// Extension with leading dot
    pub ext: String,
}

impl ImageObject<'_> {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.stem, self.ext)
    }
}

/// Persists fetched image bytes and returns a reference readers can resolve.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn put(
        &self,
        object: &ImageObject<'_>,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String>;

    /// Short human-readable target description for logs.
    fn describe(&self) -> String;
}

/// `store(sourceUrl, hint) -> reference | None`.
///
/// Implementations never fail the caller: any problem yields `None` and the
/// caller omits the reference.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(
        &self,
        source_url: Option<&str>,
        scope: &ChapterScope,
        hint: ImageHint,
    ) -> Option<String>;
}

/// Returns the URL if it should be fetched at all.
///
/// Missing URLs and site-relative ones (already servable from the origin) are skipped.
pub fn relocatable(source_url: Option<&str>) -> Option<&str> {
    source_url.filter(|url| !url.is_empty() && !url.starts_with('/'))
}

/// Fetches images over HTTP and hands the bytes to a backend.
pub struct HttpImageStore {
    client: Client,
    backend: Box<dyn ImageBackend>,
}

impl HttpImageStore {
    /// `timeout_secs` bounds each individual fetch.
    pub fn new(backend: Box<dyn ImageBackend>, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = http::create_async_client(user_agent, timeout_secs)?;
        Ok(Self { client, backend })
    }

    pub fn backend(&self) -> &dyn ImageBackend {
        self.backend.as_ref()
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    async fn relocate(&self, url: &str, scope: &ChapterScope, hint: ImageHint) -> Result<String> {
        let stem = hint.stem(url);
        let (bytes, content_type) = self.fetch(url).await?;

        let object = ImageObject {
            scope,
            stem,
            ext: file_extension(url, content_type.as_deref()),
        };

        self.backend
            .put(&object, &bytes, content_type.as_deref())
            .await
            .map_err(|e| AppError::storage(object.file_name(), e))
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn store(
        &self,
        source_url: Option<&str>,
        scope: &ChapterScope,
        hint: ImageHint,
    ) -> Option<String> {
        let url = relocatable(source_url)?;

        match self.relocate(url, scope, hint).await {
            Ok(reference) => {
                log::debug!("Stored {} as {}", url, reference);
                Some(reference)
            }
            Err(e) => {
                log::warn!("Failed to fetch image {}: {}", url, e);
                None
            }
        }
    }
}
