//! Installed Apps - application management bridge
//!
//! Exposes the device's package manager to a host application over two
//! channels: a request/response method channel and an event channel that
//! streams APK extraction progress.
//!
//! ## Architecture
//!
//! - `installed-apps-core`: error type, configuration, extraction events and sink
//! - `installed-apps-bridge`: package manager facade with ADB and in-memory backends
//! - `installed-apps-manager`: listing, actions and the extraction streamer
//! - this crate: typed requests, the plugin owning both channels, and the
//!   line protocol driver used by the binary

#![warn(clippy::all)]

pub mod commands;
pub mod plugin;
pub mod request;

// Re-export workspace crates for library usage
pub use installed_apps_bridge as bridge;
pub use installed_apps_core as core;
pub use installed_apps_manager as manager;

pub use plugin::InstalledAppsPlugin;
pub use request::{MethodCall, MethodResponse, Request};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::plugin::InstalledAppsPlugin;
    pub use crate::request::{MethodCall, MethodResponse};
    pub use installed_apps_bridge::{AdbClient, AdbPackageManager, MemoryPackageManager, Platform};
    pub use installed_apps_core::{BridgeConfig, EventSubscription, ExtractionEvent};
    pub use installed_apps_manager::{AppRecord, FilterSpec, StreamerOptions};
}
