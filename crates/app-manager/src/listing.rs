//! Listing Service
//!
//! Enumerates installed applications once, filters them and maps the
//! survivors to records. Output order is whatever the OS enumerates.

use std::sync::Arc;
use installed_apps_bridge::{ApplicationInfo, BuiltWith, PackageManager, Platform};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::record::AppRecord;

/// Which applications a listing keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub exclude_system_apps: bool,
    /// Case-insensitive package id prefix; empty keeps everything
    pub package_name_prefix: String,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            exclude_system_apps: true,
            package_name_prefix: String::new(),
        }
    }
}

impl FilterSpec {
    pub fn matches(&self, app: &ApplicationInfo) -> bool {
        if self.exclude_system_apps && app.is_system() {
            return false;
        }

        self.package_name_prefix.is_empty()
            || app
                .package_name
                .to_ascii_lowercase()
                .starts_with(&self.package_name_prefix.to_ascii_lowercase())
    }
}

/// Filter and map a single enumeration of `pm`
pub fn list_apps<P>(
    pm: &P,
    filter: &FilterSpec,
    include_icon: bool,
    platform_override: Option<BuiltWith>,
) -> Vec<AppRecord>
where
    P: PackageManager + ?Sized,
{
    let apps = match pm.installed_applications() {
        Ok(apps) => apps,
        Err(e) => {
            warn!("Failed to enumerate installed applications: {}", e);
            return Vec::new();
        }
    };

    let total = apps.len();
    let records: Vec<AppRecord> = apps
        .iter()
        .filter(|app| filter.matches(app))
        .map(|app| AppRecord::from_descriptor(pm, app, include_icon, platform_override))
        .collect();

    debug!("Listed {} of {} installed applications", records.len(), total);
    records
}

/// Exact package id lookup over the enumeration, icon included
pub fn app_info<P>(pm: &P, package_name: &str, platform_override: Option<BuiltWith>) -> Option<AppRecord>
where
    P: PackageManager + ?Sized,
{
    let apps = match pm.installed_applications() {
        Ok(apps) => apps,
        Err(e) => {
            warn!("Failed to enumerate installed applications: {}", e);
            return None;
        }
    };

    apps.iter()
        .find(|app| app.package_name == package_name)
        .map(|app| AppRecord::from_descriptor(pm, app, true, platform_override))
}

/// Runs listings off the caller's thread, one blocking task per call
#[derive(Clone)]
pub struct ListingService {
    platform: Arc<dyn Platform>,
}

impl ListingService {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    pub async fn list(
        &self,
        filter: FilterSpec,
        include_icon: bool,
        platform_override: Option<BuiltWith>,
    ) -> Vec<AppRecord> {
        let platform = Arc::clone(&self.platform);
        let task = tokio::task::spawn_blocking(move || {
            list_apps(&*platform, &filter, include_icon, platform_override)
        });

        task.await.unwrap_or_else(|e| {
            warn!("Listing task failed: {}", e);
            Vec::new()
        })
    }

    pub async fn app_info(
        &self,
        package_name: String,
        platform_override: Option<BuiltWith>,
    ) -> Option<AppRecord> {
        let platform = Arc::clone(&self.platform);
        let task = tokio::task::spawn_blocking(move || {
            app_info(&*platform, &package_name, platform_override)
        });

        task.await.unwrap_or_else(|e| {
            warn!("App info task failed: {}", e);
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use installed_apps_bridge::{InstalledPackage, MemoryPackageManager, FLAG_SYSTEM};

    fn registry() -> MemoryPackageManager {
        let pm = MemoryPackageManager::new();
        for (id, flags) in [
            ("com.android.settings", FLAG_SYSTEM),
            ("Com.Example.Camera", 0),
            ("com.example.notes", 0),
            ("org.other.app", 0),
            ("com.example.system", FLAG_SYSTEM),
        ] {
            let info = ApplicationInfo::new(id, format!("/nonexistent/{}.apk", id)).with_flags(flags);
            pm.install(InstalledPackage::new(info));
        }
        pm
    }

    fn ids(records: &[AppRecord]) -> Vec<&str> {
        records.iter().map(|r| r.package_id.as_str()).collect()
    }

    #[test]
    fn test_no_filter_keeps_enumeration_order() {
        let pm = registry();
        let filter = FilterSpec {
            exclude_system_apps: false,
            package_name_prefix: String::new(),
        };

        let records = list_apps(&pm, &filter, false, None);
        assert_eq!(
            ids(&records),
            vec![
                "com.android.settings",
                "Com.Example.Camera",
                "com.example.notes",
                "org.other.app",
                "com.example.system"
            ]
        );
    }

    #[test]
    fn test_exclude_system_apps() {
        let pm = registry();
        let records = list_apps(&pm, &FilterSpec::default(), false, None);
        assert_eq!(ids(&records), vec!["Com.Example.Camera", "com.example.notes", "org.other.app"]);
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let pm = registry();
        let filter = FilterSpec {
            exclude_system_apps: true,
            package_name_prefix: "com.ex".into(),
        };
        assert_eq!(
            ids(&list_apps(&pm, &filter, false, None)),
            vec!["Com.Example.Camera", "com.example.notes"]
        );

        let filter = FilterSpec {
            exclude_system_apps: false,
            package_name_prefix: "COM.EXAMPLE".into(),
        };
        assert_eq!(
            ids(&list_apps(&pm, &filter, false, None)),
            vec!["Com.Example.Camera", "com.example.notes", "com.example.system"]
        );
    }

    #[test]
    fn test_every_filter_yields_subsequence() {
        let pm = registry();
        let all: Vec<String> = pm
            .installed_applications()
            .unwrap()
            .into_iter()
            .map(|a| a.package_name)
            .collect();

        for exclude in [true, false] {
            for prefix in ["", "com", "com.example", "org", "zzz", "COM.ANDROID"] {
                let filter = FilterSpec {
                    exclude_system_apps: exclude,
                    package_name_prefix: prefix.into(),
                };
                let listed = list_apps(&pm, &filter, false, None);

                let mut cursor = all.iter();
                for record in &listed {
                    assert!(cursor.any(|id| *id == record.package_id), "order broken for {:?}", filter);
                    let app = pm.application_info(&record.package_id).unwrap();
                    assert!(filter.matches(&app));
                }
            }
        }
    }

    #[test]
    fn test_app_info_missing_is_none() {
        let pm = registry();
        assert!(app_info(&pm, "com.not.installed", None).is_none());
        assert_eq!(
            app_info(&pm, "com.example.notes", Some(BuiltWith::Native)).unwrap().built_with,
            BuiltWith::Native
        );
    }

    #[tokio::test]
    async fn test_service_runs_off_thread() {
        let service = ListingService::new(Arc::new(registry()));
        let records = service.list(FilterSpec::default(), false, None).await;
        assert_eq!(records.len(), 3);
        assert!(service.app_info("com.missing".into(), None).await.is_none());
    }
}
