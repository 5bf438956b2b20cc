//! Installed Apps Core - shared types for the bridge
//!
//! This crate holds what every layer of the bridge agrees on: the error
//! taxonomy, the TOML configuration, and the extraction event model with its
//! single-subscriber event sink.

pub mod config;
pub mod error;
pub mod events;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use events::{EventSink, EventSubscription, ExtractionEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the request/response channel
pub const METHOD_CHANNEL: &str = "installed_apps";

/// Name of the extraction progress channel
pub const EVENT_CHANNEL: &str = "installed_apps/extract_apk_stream";
