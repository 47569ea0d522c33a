//! Output module for crawl summaries
//!
//! This module handles:
//! - Printing the summary of a finished run
//! - Recording crawl statistics from the checkpoint and artifact files

pub mod stats;

pub use stats::{load_statistics, print_report, print_statistics, CrawlStatistics};
