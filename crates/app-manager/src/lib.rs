//! App Manager
//!
//! The services behind each bridge operation: record mapping, listing with
//! filters, intent-backed actions and the single-worker APK extraction stream.

pub mod actions;
pub mod extraction;
pub mod listing;
pub mod record;

pub use actions::ActionDispatcher;
pub use extraction::{ExtractionStreamer, StreamerOptions};
pub use listing::{FilterSpec, ListingService};
pub use record::AppRecord;

/// Error code of a resolved backing file that does not exist
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";

/// Error code of any other extraction failure
pub const EXTRACTION_ERROR: &str = "EXTRACTION_ERROR";
