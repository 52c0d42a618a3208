//! Progress reporting for the importer
//!
//! Shows a spinner while containers are being wrapped and switches to a
//! bar once the apply phase announces how many nodes it will finalize.

use crate::events::ImportEvent;
use crate::import::ImportSummary;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress reporter driven by import events
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Nodes materialized so far
    materialized: AtomicU64,

    /// Containers that failed so far
    failed: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            materialized: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Update the display from one event
    pub fn handle<G>(&self, event: &ImportEvent<G>) {
        match event {
            ImportEvent::SourceAdded(source) => {
                self.bar.set_message(format!(
                    "Wrapping {} | Nodes: {} | Failed: {}",
                    source.name(),
                    format_number(self.materialized.load(Ordering::Relaxed)),
                    self.failed.load(Ordering::Relaxed)
                ));
            }
            ImportEvent::NodeMaterialized { .. } => {
                self.materialized.fetch_add(1, Ordering::Relaxed);
            }
            ImportEvent::ContainerFailed { source_id, reason } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.bar.println(format!(
                    "{} {}: {}",
                    style("Failed").yellow().bold(),
                    source_id,
                    reason
                ));
            }
            ImportEvent::ApplyStarted { total } => {
                self.bar.set_style(
                    ProgressStyle::default_bar()
                        .template(BAR_TEMPLATE)
                        .expect("Invalid progress template")
                        .progress_chars("=> "),
                );
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
                self.bar.set_message("Applying");
            }
            ImportEvent::ApplyProgress { applied, .. } => {
                self.bar.set_position(*applied as u64);
            }
            ImportEvent::FinalizeFailed { node, reason } => {
                self.bar.println(format!(
                    "{} {}: {}",
                    style("Not applied").yellow().bold(),
                    node.name(),
                    reason
                ));
            }
            ImportEvent::RenderSuspendRequested(_)
            | ImportEvent::SelectionChanged(_)
            | ImportEvent::NodeReloadCompleted(_) => {}
        }
    }

    /// Nodes materialized so far
    pub fn materialized(&self) -> u64 {
        self.materialized.load(Ordering::Relaxed)
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of one import pass
pub fn print_summary(title: &str, summary: &ImportSummary, bytes: u64) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.applied as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if summary.completed {
        println!("{}", style(title).green().bold());
    } else {
        println!("{} {}", style(title).yellow().bold(), style("(cancelled)").yellow());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Containers:").bold(),
        format_number(summary.containers as u64)
    );
    if summary.rebound > 0 || summary.reload_dropped > 0 {
        println!(
            "  {} {}",
            style("Rebound:").bold(),
            format_number(summary.rebound as u64)
        );
    } else {
        println!(
            "  {} {}",
            style("Created:").bold(),
            format_number(summary.created as u64)
        );
    }
    println!(
        "  {} {}",
        style("Applied:").bold(),
        format_number(summary.applied as u64)
    );
    if summary.reloaded > 0 {
        println!(
            "  {} {}",
            style("Reloaded:").bold(),
            format_number(summary.reloaded as u64)
        );
    }
    println!("  {} {}", style("Total Size:").bold(), format_size(bytes, BINARY));
    println!(
        "  {} {:.1}s ({:.0} nodes/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").dim(),
            format_number(summary.skipped as u64)
        );
    }
    if summary.reload_dropped > 0 {
        println!(
            "  {} {}",
            style("Not found:").yellow().bold(),
            format_number(summary.reload_dropped as u64)
        );
    }
    if summary.unapplied > 0 {
        println!(
            "  {} {}",
            style("Not applied:").yellow().bold(),
            format_number(summary.unapplied as u64)
        );
    }
    if summary.failed_containers > 0 || summary.finalize_failed > 0 {
        println!(
            "  {} {} containers, {} nodes",
            style("Errors:").yellow().bold(),
            format_number(summary.failed_containers as u64),
            format_number(summary.finalize_failed as u64)
        );
    }
    println!();
}

/// Print a header at the start of the import
pub fn print_header(sources: &[PathBuf], workers: usize, reload: bool) {
    println!();
    println!(
        "{} {}",
        style("dc-import").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    for source in sources {
        println!("  {} {}", style("Source:").bold(), source.display());
    }
    println!("  {} {}", style("Workers:").bold(), workers);
    if reload {
        println!("  {} after import", style("Reload:").bold());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_bar_follows_apply_events() {
        let reporter = ProgressReporter::new();
        reporter.handle::<u8>(&ImportEvent::ApplyStarted { total: 4 });
        reporter.handle::<u8>(&ImportEvent::ApplyProgress { applied: 2, total: 4 });

        assert_eq!(reporter.bar.length(), Some(4));
        assert_eq!(reporter.bar.position(), 2);
        reporter.bar.finish_and_clear();
    }

    #[test]
    fn test_counts_materialized_nodes() {
        use crate::tree::FilterTree;

        let tree = FilterTree::new();
        let source = tree.add_source("row_0");
        let node = tree.add_child(source.id(), "Tile_0".into(), 0u8).unwrap();

        let reporter = ProgressReporter::new();
        reporter.handle(&ImportEvent::SourceAdded(source));
        reporter.handle(&ImportEvent::NodeMaterialized {
            node,
            mode: crate::import::LoadMode::Import,
        });
        assert_eq!(reporter.materialized(), 1);
        reporter.bar.finish_and_clear();
    }
}
