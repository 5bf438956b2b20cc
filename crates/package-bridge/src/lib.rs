//! Package Manager Bridge
//!
//! The facade over the operating system's package manager. Everything above
//! this crate talks to the [`PackageManager`] and [`ActivityLauncher`] traits;
//! the ADB backend drives a real device and the in-memory backend serves
//! host embeddings and tests.

pub mod adb;
pub mod archive;
pub mod facade;
pub mod memory;

pub use adb::{AdbClient, AdbPackageManager};
pub use archive::BuiltWith;
pub use facade::{
    ActivityLauncher, ApplicationInfo, FileStat, Intent, PackageInfo, PackageManager, Platform,
    ToastDuration, FLAG_SYSTEM,
};
pub use memory::{InstalledPackage, MemoryPackageManager};

/// Package manager errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Package not found: {0}")]
    NameNotFound(String),
    #[error("ADB not found")]
    AdbNotFound,
    #[error("ADB command failed: {0}")]
    CommandFailed(String),
    #[error("Activity not started: {0}")]
    ActivityRejected(String),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PackageError::NameNotFound(_))
    }
}

/// Package ids are dot-separated segments of `[A-Za-z0-9_]`
pub fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}
