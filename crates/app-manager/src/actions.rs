//! Action Dispatcher
//!
//! One OS intent or query per action. Launch and uninstall fail softly,
//! a missing package is an answer rather than an error.

use std::sync::Arc;
use installed_apps_bridge::{Intent, PackageError, Platform, ToastDuration};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ActionDispatcher {
    platform: Arc<dyn Platform>,
}

impl ActionDispatcher {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Start the launcher activity of a package. `false` on any failure.
    pub fn launch(&self, package_name: Option<&str>) -> bool {
        let Some(package_name) = package_name.map(str::trim).filter(|p| !p.is_empty()) else {
            debug!("Launch requested without a package name");
            return false;
        };

        let Some(intent) = self.platform.launch_intent_for_package(package_name) else {
            warn!("No launchable activity for {}", package_name);
            return false;
        };

        match self.platform.start_activity(&intent) {
            Ok(()) => {
                info!("Launched {}", package_name);
                true
            }
            Err(e) => {
                warn!("Failed to launch {}: {}", package_name, e);
                false
            }
        }
    }

    /// Open the system "App info" screen. No-op when the package is not installed.
    pub fn open_settings(&self, package_name: Option<&str>) {
        let package_name = package_name.unwrap_or_default();
        match self.is_installed(package_name) {
            Ok(true) => {}
            Ok(false) => {
                info!("App {} is not installed on this device.", package_name);
                return;
            }
            Err(e) => {
                warn!("Could not check whether {} is installed: {}", package_name, e);
                return;
            }
        }

        if let Err(e) = self
            .platform
            .start_activity(&Intent::application_details(package_name))
        {
            warn!("Failed to open settings for {}: {}", package_name, e);
        }
    }

    /// Ask the OS to uninstall a package.
    ///
    /// `true` only means the request was dispatched; the user may still
    /// decline and nothing reports the outcome.
    pub fn uninstall(&self, package_name: &str) -> bool {
        match self.platform.start_activity(&Intent::delete(package_name)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to request uninstall of {}: {}", package_name, e);
                false
            }
        }
    }

    /// `Ok(false)` for an unknown package; other backend failures propagate
    pub fn is_installed(&self, package_name: &str) -> Result<bool, PackageError> {
        match self.platform.application_info(package_name) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// An unknown package counts as non-system
    pub fn is_system_app(&self, package_name: &str) -> Result<bool, PackageError> {
        match self.platform.application_info(package_name) {
            Ok(app) => Ok(app.is_system()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn toast(&self, message: &str, short_duration: bool) {
        self.platform
            .show_toast(message, ToastDuration::from_short(short_duration));
    }
}
