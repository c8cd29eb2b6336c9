//! Pipeline entry points for crawler operations.
//!
//! - `run_crawler`: Walk the question bank and write shards plus the master index

pub mod crawl;
pub mod progress;

pub use crawl::{CrawlReport, Crawler, run_crawler};
pub use progress::{ChapterOutcome, CrawlProgress};
