// src/utils/log.rs

//! Banner-style log output for run progress.
//!
//! Everything goes through the `log` facade so `RUST_LOG` filtering applies.

const RULE_WIDTH: usize = 60;

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(RULE_WIDTH);
    ::log::info!("{}", border);
    ::log::info!("  {}", title);
    ::log::info!("{}", border);
}

/// Log a separator line
pub fn separator() {
    ::log::info!("{}", "─".repeat(RULE_WIDTH));
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    ::log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    ::log::info!("{}", format_summary_title(title));
    for line in format_summary_items(items) {
        ::log::info!("{}", line);
    }
}

fn format_summary_title(title: &str) -> String {
    format!("[SUMMARY] {}", title)
}

fn format_summary_items(items: &[(&str, String)]) -> Vec<String> {
    items
        .iter()
        .map(|(key, value)| format!("    {}: {}", key, value))
        .collect()
}
