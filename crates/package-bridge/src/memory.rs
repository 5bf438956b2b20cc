//! In-Memory Package Manager
//!
//! A registry of installed applications kept in process, backed by real
//! archive files on the local filesystem. Intents and toasts are recorded
//! instead of being shown.

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::facade::{
    ActivityLauncher, ApplicationInfo, Intent, PackageInfo, PackageManager, ToastDuration,
};
use crate::PackageError;

/// One registered application
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub info: ApplicationInfo,
    pub version_name: Option<String>,
    pub version_code: i64,
    /// Has a launcher activity
    pub launchable: bool,
}

impl InstalledPackage {
    pub fn new(info: ApplicationInfo) -> Self {
        Self {
            info,
            version_name: None,
            version_code: 0,
            launchable: true,
        }
    }

    pub fn with_version(mut self, name: impl Into<String>, code: i64) -> Self {
        self.version_name = Some(name.into());
        self.version_code = code;
        self
    }

    pub fn not_launchable(mut self) -> Self {
        self.launchable = false;
        self
    }
}

#[derive(Default)]
pub struct MemoryPackageManager {
    packages: RwLock<Vec<InstalledPackage>>,
    started: Mutex<Vec<Intent>>,
    toasts: Mutex<Vec<(String, ToastDuration)>>,
    reject_activities: RwLock<bool>,
}

impl MemoryPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application, replacing one with the same package id
    pub fn install(&self, package: InstalledPackage) {
        let mut packages = self.packages.write();
        packages.retain(|p| p.info.package_name != package.info.package_name);
        packages.push(package);
    }

    pub fn remove(&self, package_name: &str) -> bool {
        let mut packages = self.packages.write();
        let before = packages.len();
        packages.retain(|p| p.info.package_name != package_name);
        packages.len() != before
    }

    /// Make every `start_activity` fail, as an OS refusing the intent would
    pub fn set_reject_activities(&self, reject: bool) {
        *self.reject_activities.write() = reject;
    }

    /// Intents started so far, oldest first
    pub fn started_intents(&self) -> Vec<Intent> {
        self.started.lock().clone()
    }

    pub fn toasts(&self) -> Vec<(String, ToastDuration)> {
        self.toasts.lock().clone()
    }

    fn find(&self, package_name: &str) -> Option<InstalledPackage> {
        self.packages
            .read()
            .iter()
            .find(|p| p.info.package_name == package_name)
            .cloned()
    }
}

impl PackageManager for MemoryPackageManager {
    fn installed_applications(&self) -> Result<Vec<ApplicationInfo>, PackageError> {
        Ok(self.packages.read().iter().map(|p| p.info.clone()).collect())
    }

    fn application_info(&self, package_name: &str) -> Result<ApplicationInfo, PackageError> {
        self.find(package_name)
            .map(|p| p.info)
            .ok_or_else(|| PackageError::NameNotFound(package_name.to_string()))
    }

    fn package_info(&self, package_name: &str) -> Result<PackageInfo, PackageError> {
        self.find(package_name)
            .map(|p| PackageInfo {
                package_name: p.info.package_name,
                version_name: p.version_name,
                version_code: p.version_code,
            })
            .ok_or_else(|| PackageError::NameNotFound(package_name.to_string()))
    }
}

impl ActivityLauncher for MemoryPackageManager {
    fn launch_intent_for_package(&self, package_name: &str) -> Option<Intent> {
        self.find(package_name)
            .filter(|p| p.launchable)
            .map(|_| Intent::launcher(package_name))
    }

    fn start_activity(&self, intent: &Intent) -> Result<(), PackageError> {
        if *self.reject_activities.read() {
            return Err(PackageError::ActivityRejected(intent.action.clone()));
        }
        debug!("Starting {:?}", intent);
        self.started.lock().push(intent.clone());
        Ok(())
    }

    fn show_toast(&self, message: &str, duration: ToastDuration) {
        self.toasts.lock().push((message.to_string(), duration));
    }
}
