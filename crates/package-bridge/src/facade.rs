//! Package Query Facade
//!
//! Descriptor types mirroring what the OS package manager reports, and the
//! traits every backend implements.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use serde::{Deserialize, Serialize};

use crate::{archive, PackageError};

/// Application is part of the system image
pub const FLAG_SYSTEM: u32 = 1 << 0;

/// A system application that was updated by the user
pub const FLAG_UPDATED_SYSTEM_APP: u32 = 1 << 7;

pub const ACTION_MAIN: &str = "android.intent.action.MAIN";
pub const ACTION_DELETE: &str = "android.intent.action.DELETE";
pub const ACTION_APPLICATION_DETAILS_SETTINGS: &str =
    "android.settings.APPLICATION_DETAILS_SETTINGS";
pub const CATEGORY_LAUNCHER: &str = "android.intent.category.LAUNCHER";

/// An installed application as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub package_name: String,
    /// User-visible label, when the backend can resolve it
    pub label: Option<String>,
    /// OS flag bits (`FLAG_SYSTEM`, ...)
    pub flags: u32,
    /// Private path of the base APK
    pub source_dir: PathBuf,
    /// Publicly readable path of the base APK, if different
    pub public_source_dir: Option<PathBuf>,
}

impl ApplicationInfo {
    pub fn new(package_name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_name: package_name.into(),
            label: None,
            flags: 0,
            source_dir: source_dir.into(),
            public_source_dir: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_system(&self) -> bool {
        self.flags & FLAG_SYSTEM != 0
    }

    /// The installation archive: public path first, private path otherwise
    pub fn backing_file(&self) -> &Path {
        self.public_source_dir.as_deref().unwrap_or(&self.source_dir)
    }
}

/// Version metadata of an installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_name: Option<String>,
    pub version_code: i64,
}

/// The two file attributes records need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Last modification, epoch millis
    pub modified_millis: i64,
    pub len: u64,
}

impl FileStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified_millis = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);

        Self {
            modified_millis,
            len: metadata.len(),
        }
    }
}

/// Toast display length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastDuration {
    Short,
    Long,
}

impl ToastDuration {
    pub fn from_short(short: bool) -> Self {
        if short {
            ToastDuration::Short
        } else {
            ToastDuration::Long
        }
    }
}

/// An activity start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    pub data: Option<String>,
    pub category: Option<String>,
    /// Restrict resolution to this package
    pub package: Option<String>,
    /// Explicit `package/activity` component
    pub component: Option<String>,
    pub new_task: bool,
}

impl Intent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: None,
            category: None,
            package: None,
            component: None,
            new_task: false,
        }
    }

    /// Main launcher entry of `package_name`
    pub fn launcher(package_name: &str) -> Self {
        Self {
            category: Some(CATEGORY_LAUNCHER.to_string()),
            package: Some(package_name.to_string()),
            new_task: true,
            ..Self::new(ACTION_MAIN)
        }
    }

    /// System "App info" screen for `package_name`
    pub fn application_details(package_name: &str) -> Self {
        Self {
            data: Some(format!("package:{}", package_name)),
            new_task: true,
            ..Self::new(ACTION_APPLICATION_DETAILS_SETTINGS)
        }
    }

    /// Uninstall confirmation for `package_name`
    pub fn delete(package_name: &str) -> Self {
        Self {
            data: Some(format!("package:{}", package_name)),
            new_task: true,
            ..Self::new(ACTION_DELETE)
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Package this intent is about, from the explicit package or a `package:` URI
    pub fn target_package(&self) -> Option<&str> {
        self.package
            .as_deref()
            .or_else(|| self.data.as_deref().and_then(|d| d.strip_prefix("package:")))
    }
}

/// Read side of the OS package manager
pub trait PackageManager: Send + Sync {
    /// Every installed application, in OS enumeration order
    fn installed_applications(&self) -> Result<Vec<ApplicationInfo>, PackageError>;

    /// Look up one application; `NameNotFound` when it is not installed
    fn application_info(&self, package_name: &str) -> Result<ApplicationInfo, PackageError>;

    fn package_info(&self, package_name: &str) -> Result<PackageInfo, PackageError>;

    fn application_label(&self, app: &ApplicationInfo) -> String {
        app.label.clone().unwrap_or_else(|| app.package_name.clone())
    }

    fn file_stat(&self, path: &Path) -> Option<FileStat> {
        std::fs::metadata(path).ok().map(|m| FileStat::from_metadata(&m))
    }

    /// A locally readable copy of the backing file
    fn materialize_source(&self, app: &ApplicationInfo) -> Result<PathBuf, PackageError> {
        Ok(app.backing_file().to_path_buf())
    }

    /// Names inside the backing archive; `None` when it cannot be inspected
    fn archive_entries(&self, app: &ApplicationInfo) -> Option<Vec<String>> {
        archive::entry_names(app.backing_file()).ok()
    }

    /// Launcher icon as PNG bytes
    fn load_icon(&self, app: &ApplicationInfo) -> Option<Vec<u8>> {
        let path = self.materialize_source(app).ok()?;
        archive::launcher_icon(&path).ok().flatten()
    }
}

/// Write side: intents and UI feedback
pub trait ActivityLauncher: Send + Sync {
    /// The launcher intent for `package_name`, `None` if it has no launchable activity
    fn launch_intent_for_package(&self, package_name: &str) -> Option<Intent>;

    fn start_activity(&self, intent: &Intent) -> Result<(), PackageError>;

    fn show_toast(&self, message: &str, duration: ToastDuration);
}

/// A full backend
pub trait Platform: PackageManager + ActivityLauncher {}

impl<T: PackageManager + ActivityLauncher> Platform for T {}
