//! App Records
//!
//! Flat, serializable view of an installed application.

use installed_apps_bridge::{ApplicationInfo, BuiltWith, PackageManager};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One installed application as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub name: String,
    #[serde(rename = "package_name")]
    pub package_id: String,
    /// PNG bytes; empty unless requested
    #[serde(rename = "icon")]
    pub icon_bytes: Vec<u8>,
    pub version_name: String,
    pub version_code: i64,
    pub built_with: BuiltWith,
    /// Modification time of the installed archive, epoch millis
    pub installed_timestamp: i64,
    #[serde(rename = "package_size")]
    pub package_size_bytes: u64,
}

impl AppRecord {
    /// Map an OS descriptor into a record.
    ///
    /// Never fails: anything the backend cannot answer degrades to an empty or
    /// zero value. The icon is only loaded when `include_icon` is set.
    pub fn from_descriptor<P>(
        pm: &P,
        app: &ApplicationInfo,
        include_icon: bool,
        platform_override: Option<BuiltWith>,
    ) -> Self
    where
        P: PackageManager + ?Sized,
    {
        let (version_name, version_code) = match pm.package_info(&app.package_name) {
            Ok(info) => (info.version_name.unwrap_or_default(), info.version_code),
            Err(e) => {
                debug!("No package info for {}: {}", app.package_name, e);
                (String::new(), 0)
            }
        };

        let icon_bytes = if include_icon {
            pm.load_icon(app).unwrap_or_default()
        } else {
            Vec::new()
        };

        let built_with = platform_override.unwrap_or_else(|| {
            pm.archive_entries(app)
                .map(|entries| BuiltWith::detect(&entries))
                .unwrap_or(BuiltWith::Unknown)
        });

        let installed_timestamp = pm
            .file_stat(&app.source_dir)
            .map(|stat| stat.modified_millis)
            .unwrap_or(0);
        let package_size_bytes = pm.file_stat(app.backing_file()).map(|stat| stat.len).unwrap_or(0);

        Self {
            name: pm.application_label(app),
            package_id: app.package_name.clone(),
            icon_bytes,
            version_name,
            version_code,
            built_with,
            installed_timestamp,
            package_size_bytes,
        }
    }
}
