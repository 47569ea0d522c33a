//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: the checkpointed progress of the whole crawl (enumeration
//!   cursor, completed and pending pull requests, recorded failures)
//! - `ItemState`: the lifecycle of a single pull request

mod crawl_state;
mod item_state;

// Re-export main types
pub use crawl_state::{CrawlState, ErrorEntry};
pub use item_state::ItemState;
