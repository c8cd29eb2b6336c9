//! PYQ Crawler CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pyq_crawler::{
    error::Result,
    models::{Compression, Config, ImageBackendKind},
    pipeline,
    storage::load_master_index,
};

/// Previous-year question bank crawler
#[derive(Parser, Debug)]
#[command(
    name = "pyq-crawler",
    version,
    about = "Crawl a previous-year question bank into JSONL shards"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "pyq.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every chapter in scope and write shards plus the master index
    Crawl(CrawlArgs),

    /// Validate configuration (file + environment)
    Validate,

    /// Show the master index of the last run
    Info {
        /// Output directory to inspect (default: from configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Image backend: local or s3
    #[arg(long)]
    backend: Option<ImageBackendKind>,

    /// Shard compression: none or gzip
    #[arg(long)]
    compression: Option<Compression>,

    /// Only crawl this exam
    #[arg(long)]
    exam_id: Option<String>,

    /// Only crawl this subject
    #[arg(long)]
    subject_id: Option<String>,

    /// Only crawl this chapter
    #[arg(long)]
    chapter_id: Option<String>,

    /// Stop after this many processed chapters (0 = unlimited)
    #[arg(long)]
    max_chapters: Option<usize>,

    /// Stop after this many written questions (0 = unlimited)
    #[arg(long)]
    max_questions: Option<usize>,
}

impl CrawlArgs {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.output {
            config.output.dir = dir;
        }
        if let Some(backend) = self.backend {
            config.images.backend = backend;
        }
        if let Some(compression) = self.compression {
            config.output.compression = compression;
        }
        if self.exam_id.is_some() {
            config.filters.exam_id = self.exam_id;
        }
        if self.subject_id.is_some() {
            config.filters.subject_id = self.subject_id;
        }
        if self.chapter_id.is_some() {
            config.filters.chapter_id = self.chapter_id;
        }
        if let Some(n) = self.max_chapters {
            config.filters.max_chapters = n;
        }
        if let Some(n) = self.max_questions {
            config.filters.max_questions = n;
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// File settings, then environment overrides.
fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let config = Config::load(path)?;
        log::info!("Loaded configuration from {}", path.display());
        config
    } else {
        log::info!("No config at {}, using defaults", path.display());
        Config::default()
    };
    config.apply_env()?;
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;

    match cli.command {
        Command::Crawl(args) => {
            args.apply(&mut config);
            let report = pipeline::run_crawler(&config).await?;
            log::info!(
                "Crawl complete: {} questions in {} chapters",
                report.index.total_questions,
                report.index.chapters.len()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
            log::info!("  API: {}", config.api.base_url);
            log::info!("  Images: {}", config.images.backend);
            log::info!("  Output: {}", config.output.dir.display());
            log::info!(
                "  Database: {}",
                if config.database.url.is_some() {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }

        Command::Info { output } => {
            let dir = output.unwrap_or(config.output.dir);
            log::info!("Output directory: {}", dir.display());

            match load_master_index(&dir).await? {
                Some(index) => {
                    log::info!("Exams: {}", index.total_exams);
                    log::info!("Subjects: {}", index.total_subjects);
                    log::info!(
                        "Chapters: {}/{}",
                        index.chapters.len(),
                        index.total_chapters
                    );
                    log::info!("Questions: {}", index.total_questions);
                    for entry in &index.chapters {
                        log::info!(
                            "  {} / {} / {}: {} ({})",
                            entry.exam_name,
                            entry.subject_name,
                            entry.chapter_name,
                            entry.total_questions,
                            entry.shard_file
                        );
                    }
                }
                None => log::info!("No master index found yet."),
            }
        }
    }

    Ok(())
}
