//! Statistics generation from the crawl output directory
//!
//! This module provides functionality for summarising a crawl, either from the
//! report of the run that just finished or from the checkpoint and artifact
//! files left on disk (`--stats`).

use crate::crawler::CrawlReport;
use crate::state::ErrorEntry;
use crate::storage::{OutputLayout, StorageResult};
use chrono::{DateTime, Utc};

/// Number of most recent errors shown by [`print_statistics`]
const RECENT_ERRORS: usize = 5;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    /// Repository the checkpoint belongs to, if a checkpoint exists
    pub repository: Option<String>,

    /// Total pull requests reported by the host
    pub total_items: u64,

    /// Pull requests recorded so far
    pub processed_items: u64,

    /// Pull requests fully fetched
    pub complete: usize,

    /// Pull requests still partially fetched
    pub pending: usize,

    /// Whether enumeration has walked the whole connection
    pub enumeration_complete: bool,

    /// Resume point of the enumeration
    pub cursor: Option<String>,

    /// Last time the checkpoint was written
    pub updated_at: Option<DateTime<Utc>>,

    /// Record files on disk
    pub record_files: usize,

    /// Diff files on disk
    pub diff_files: usize,

    /// All recorded failures
    pub error_count: usize,

    /// The most recent failures, oldest first
    pub recent_errors: Vec<ErrorEntry>,
}

/// Loads statistics from the output directory
///
/// # Arguments
///
/// * `layout` - The output directory to inspect
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - The artifact directories could not be listed
pub fn load_statistics(layout: &OutputLayout) -> StorageResult<CrawlStatistics> {
    let state = layout.checkpoint().peek();
    let record_files = layout.records().count()?;
    let diff_files = layout.diffs().count()?;

    let stats = match state {
        Some(state) => {
            let skip = state.errors.len().saturating_sub(RECENT_ERRORS);
            CrawlStatistics {
                total_items: state.total_items,
                processed_items: state.processed_items,
                complete: state.completed_count(),
                pending: state.pending_count(),
                enumeration_complete: state.enumeration_complete,
                cursor: state.cursor.clone(),
                updated_at: state.updated_at,
                record_files,
                diff_files,
                error_count: state.errors.len(),
                recent_errors: state.errors[skip..].to_vec(),
                repository: Some(state.repository),
            }
        }
        None => CrawlStatistics {
            repository: None,
            total_items: 0,
            processed_items: 0,
            complete: 0,
            pending: 0,
            enumeration_complete: false,
            cursor: None,
            updated_at: None,
            record_files,
            diff_files,
            error_count: 0,
            recent_errors: Vec::new(),
        },
    };

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    match &stats.repository {
        Some(repository) => println!("Repository: {}", repository),
        None => println!("Repository: (no checkpoint)"),
    }
    if let Some(updated_at) = stats.updated_at {
        println!("Last checkpoint: {}", updated_at.to_rfc3339());
    }
    println!();

    println!("Pull Requests:");
    println!("  Reported by host: {}", stats.total_items);
    println!("  Recorded: {}", stats.processed_items);
    println!(
        "  Complete: {} ({:.1}%)",
        stats.complete,
        percentage(stats.complete as u64, stats.total_items)
    );
    println!("  Pending: {}", stats.pending);
    if stats.enumeration_complete {
        println!("  Enumeration: complete");
    } else {
        match &stats.cursor {
            Some(cursor) => println!("  Enumeration: in progress (cursor {})", cursor),
            None => println!("  Enumeration: not started"),
        }
    }
    println!();

    println!("Files:");
    println!("  Records: {}", stats.record_files);
    println!("  Diffs: {}", stats.diff_files);
    println!();

    if stats.error_count > 0 {
        println!("Errors ({}):", stats.error_count);
        for entry in &stats.recent_errors {
            println!("  #{} at {}: {}", entry.id, entry.at.to_rfc3339(), entry.message);
        }
        println!();
    }
}

/// Prints the summary of a finished run to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Summary ===\n");

    println!("Pull Requests:");
    println!("  Reported by host: {}", report.total_items);
    println!("  Recorded (all runs): {}", report.processed_items);
    println!("  Recorded this run: {}", report.recorded);
    println!("  Completed this run: {}", report.completed);
    println!(
        "  Complete: {} ({:.1}%)",
        report.complete_total,
        percentage(report.complete_total as u64, report.total_items)
    );
    println!("  Pending: {}", report.pending_total);
    println!("  Failures this run: {}", report.item_failures);
    if report.limit_reached {
        println!("  Stopped early: item limit reached");
    }
    println!();

    match &report.diffs {
        Some(diffs) => {
            println!("Diffs:");
            println!("  Commits: {}", diffs.requested);
            println!("  Fetched: {}", diffs.fetched);
            println!("  Already on disk: {}", diffs.skipped);
            println!("  Failed: {}", diffs.failed);
        }
        None => println!("Diffs: skipped"),
    }
    println!();

    if report.is_complete() {
        println!("Status: complete");
    } else if report.is_successful() {
        println!("Status: limit reached, rerun to continue");
    } else {
        println!("Status: incomplete, rerun to resume");
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
