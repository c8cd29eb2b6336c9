//! Utility functions and helpers.

pub mod http;
pub mod log;

use std::path::Path;

use sha1::{Digest, Sha1};
use url::Url;

/// Extension used when neither the URL nor the content type tells us one.
pub const DEFAULT_IMAGE_EXT: &str = ".jpg";

/// SHA-1 hex digest of a string.
pub fn sha1_hex(text: &str) -> String {
    hex::encode(Sha1::digest(text.as_bytes()))
}

/// Lower-cased extension (with leading dot) of a URL's path component.
pub fn url_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Extension implied by an image content type.
pub fn content_type_extension(content_type: &str) -> Option<&'static str> {
    let ct = content_type.to_lowercase();
    if ct.contains("image/png") {
        Some(".png")
    } else if ct.contains("image/jpeg") || ct.contains("image/jpg") {
        Some(".jpg")
    } else if ct.contains("image/webp") {
        Some(".webp")
    } else if ct.contains("image/svg") {
        Some(".svg")
    } else {
        None
    }
}

/// Resolve a file extension from the URL, then the content type, then the default.
pub fn file_extension(url: &str, content_type: Option<&str>) -> String {
    url_extension(url)
        .or_else(|| {
            content_type
                .and_then(content_type_extension)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_IMAGE_EXT.to_string())
}
