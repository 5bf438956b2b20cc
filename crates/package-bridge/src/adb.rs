//! ADB (Android Debug Bridge) Backend
//!
//! Drives the package manager of a connected device through `adb shell`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::facade::{
    ActivityLauncher, ApplicationInfo, FileStat, Intent, PackageInfo, PackageManager,
    ToastDuration, FLAG_SYSTEM,
};
use crate::{archive, is_valid_package_name, PackageError};

/// ADB Client
#[derive(Debug, Clone)]
pub struct AdbClient {
    sdk_path: Option<PathBuf>,
    serial: Option<String>,
}

impl AdbClient {
    /// Create a new ADB client. Without an SDK path `adb` is looked up on `PATH`.
    pub fn new(sdk_path: Option<PathBuf>, serial: Option<String>) -> Self {
        Self { sdk_path, serial }
    }

    /// Get the ADB executable path
    fn adb_path(&self) -> PathBuf {
        let exe = if cfg!(windows) { "adb.exe" } else { "adb" };
        match &self.sdk_path {
            Some(sdk) => sdk.join("platform-tools").join(exe),
            None => PathBuf::from(exe),
        }
    }

    /// Check if ADB is available
    pub fn is_available(&self) -> bool {
        Command::new(self.adb_path()).arg("version").output().is_ok()
    }

    /// Run an ADB command against the selected device
    fn run(&self, args: &[&str]) -> Result<String, AdbOutput> {
        let mut command = Command::new(self.adb_path());
        if let Some(serial) = &self.serial {
            command.args(["-s", serial]);
        }
        command.args(args);

        debug!("adb {:?}", args);

        let output = command.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AdbOutput::Missing,
            _ => AdbOutput::Io(e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbOutput::Failed {
                stdout,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Run a shell command on the device
    pub fn shell(&self, args: &[&str]) -> Result<String, PackageError> {
        let mut full_args = vec!["shell"];
        full_args.extend(args);
        self.run(&full_args).map_err(PackageError::from)
    }

    /// Like `shell`, but a non-zero exit still yields its stdout
    fn shell_lenient(&self, args: &[&str]) -> Result<String, PackageError> {
        let mut full_args = vec!["shell"];
        full_args.extend(args);
        match self.run(&full_args) {
            Ok(stdout) | Err(AdbOutput::Failed { stdout, .. }) => Ok(stdout),
            Err(other) => Err(other.into()),
        }
    }

    /// Pull a file from device
    pub fn pull(&self, remote: &str, local: &Path) -> Result<(), PackageError> {
        let local_str = local.to_string_lossy();
        self.run(&["pull", remote, &local_str])?;
        Ok(())
    }
}

/// Raw outcome of an adb invocation
enum AdbOutput {
    Missing,
    Io(std::io::Error),
    Failed { stdout: String, stderr: String },
}

impl From<AdbOutput> for PackageError {
    fn from(output: AdbOutput) -> Self {
        match output {
            AdbOutput::Missing => PackageError::AdbNotFound,
            AdbOutput::Io(e) => PackageError::Io(e),
            AdbOutput::Failed { stdout, stderr } => {
                PackageError::CommandFailed(if stderr.is_empty() { stdout } else { stderr })
            }
        }
    }
}

/// Quote one argument for the device shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Parse `pm list packages -f` output into `(path, package)` pairs.
/// Paths may themselves contain `=`, so split on the last one.
pub(crate) fn parse_package_paths(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .filter_map(|rest| rest.rsplit_once('='))
        .map(|(path, package)| (path.to_string(), package.to_string()))
        .collect()
}

/// Parse `pm list packages` output into package ids
pub(crate) fn parse_package_names(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::to_string)
        .collect()
}

/// Value following `key` up to the next whitespace
fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let start = text.find(key)? + key.len();
    text[start..].split_whitespace().next()
}

/// Version fields of `dumpsys package <id>`; `None` when the package is not listed
pub(crate) fn parse_dumpsys_version(package_name: &str, output: &str) -> Option<PackageInfo> {
    let version_code = field(output, "versionCode=")?.parse().ok()?;
    let version_name = field(output, "versionName=").map(str::to_string);

    Some(PackageInfo {
        package_name: package_name.to_string(),
        version_name,
        version_code,
    })
}

/// `stat -c '%Y %s'` output
pub(crate) fn parse_stat(output: &str) -> Option<FileStat> {
    let mut parts = output.split_whitespace();
    let seconds: i64 = parts.next()?.parse().ok()?;
    let len: u64 = parts.next()?.parse().ok()?;

    Some(FileStat {
        modified_millis: seconds * 1000,
        len,
    })
}

/// `am start` arguments for an intent
pub(crate) fn am_start_args(intent: &Intent) -> Vec<String> {
    let mut args = vec!["am".to_string(), "start".to_string(), "-a".to_string(), intent.action.clone()];

    if let Some(category) = &intent.category {
        args.push("-c".to_string());
        args.push(category.clone());
    }
    if let Some(data) = &intent.data {
        args.push("-d".to_string());
        args.push(data.clone());
    }
    if intent.new_task {
        args.push("-f".to_string());
        args.push("0x10000000".to_string());
    }
    match (&intent.component, &intent.package) {
        (Some(component), _) => {
            args.push("-n".to_string());
            args.push(component.clone());
        }
        (None, Some(package)) => args.push(package.clone()),
        (None, None) => {}
    }

    args
}

/// Package manager of a device reached over ADB
pub struct AdbPackageManager {
    client: AdbClient,
    cache_dir: PathBuf,
}

impl AdbPackageManager {
    /// `cache_dir` receives APKs pulled for extraction and icon loading
    pub fn new(client: AdbClient, cache_dir: PathBuf) -> Self {
        Self { client, cache_dir }
    }

    pub fn client(&self) -> &AdbClient {
        &self.client
    }

    fn cached_copy(&self, package_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.apk", package_name))
    }

    fn system_packages(&self, filter: Option<&str>) -> Result<HashSet<String>, PackageError> {
        let mut args = vec!["pm", "list", "packages", "-s"];
        args.extend(filter);
        Ok(parse_package_names(&self.client.shell_lenient(&args)?))
    }
}

impl PackageManager for AdbPackageManager {
    fn installed_applications(&self) -> Result<Vec<ApplicationInfo>, PackageError> {
        let listing = self.client.shell(&["pm", "list", "packages", "-f"])?;
        let system = self.system_packages(None)?;

        Ok(parse_package_paths(&listing)
            .into_iter()
            .map(|(path, package)| {
                let flags = if system.contains(&package) { FLAG_SYSTEM } else { 0 };
                ApplicationInfo::new(package, path).with_flags(flags)
            })
            .collect())
    }

    fn application_info(&self, package_name: &str) -> Result<ApplicationInfo, PackageError> {
        if !is_valid_package_name(package_name) {
            return Err(PackageError::NameNotFound(package_name.to_string()));
        }

        // `pm path` exits non-zero with empty output for unknown packages
        let output = self.client.shell_lenient(&["pm", "path", package_name])?;
        let path = output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("package:"))
            .find(|path| path.ends_with("base.apk"))
            .or_else(|| output.lines().find_map(|line| line.trim().strip_prefix("package:")))
            .ok_or_else(|| PackageError::NameNotFound(package_name.to_string()))?;

        let flags = if self.system_packages(Some(package_name))?.contains(package_name) {
            FLAG_SYSTEM
        } else {
            0
        };

        Ok(ApplicationInfo::new(package_name, path).with_flags(flags))
    }

    fn package_info(&self, package_name: &str) -> Result<PackageInfo, PackageError> {
        if !is_valid_package_name(package_name) {
            return Err(PackageError::NameNotFound(package_name.to_string()));
        }

        let output = self.client.shell(&["dumpsys", "package", package_name])?;
        parse_dumpsys_version(package_name, &output)
            .ok_or_else(|| PackageError::NameNotFound(package_name.to_string()))
    }

    fn file_stat(&self, path: &Path) -> Option<FileStat> {
        let quoted = shell_quote(&path.to_string_lossy());
        let output = self.client.shell(&["stat", "-c", "'%Y %s'", &quoted]).ok()?;
        parse_stat(&output)
    }

    fn materialize_source(&self, app: &ApplicationInfo) -> Result<PathBuf, PackageError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let local = self.cached_copy(&app.package_name);
        self.client.pull(&app.backing_file().to_string_lossy(), &local)?;
        debug!("Pulled {} to {:?}", app.package_name, local);
        Ok(local)
    }

    /// Only archives already pulled into the cache are inspected; listing
    /// does not pull every APK off the device.
    fn archive_entries(&self, app: &ApplicationInfo) -> Option<Vec<String>> {
        let local = self.cached_copy(&app.package_name);
        if !local.exists() {
            return None;
        }
        archive::entry_names(&local).ok()
    }
}

impl ActivityLauncher for AdbPackageManager {
    fn launch_intent_for_package(&self, package_name: &str) -> Option<Intent> {
        if !is_valid_package_name(package_name) {
            return None;
        }

        let output = self
            .client
            .shell(&[
                "cmd",
                "package",
                "resolve-activity",
                "--brief",
                "-c",
                crate::facade::CATEGORY_LAUNCHER,
                package_name,
            ])
            .ok()?;

        // Last line is `package/activity`, or "No activity found"
        let component = output.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
        if !component.contains('/') {
            return None;
        }

        Some(Intent::launcher(package_name).with_component(component))
    }

    fn start_activity(&self, intent: &Intent) -> Result<(), PackageError> {
        let args: Vec<String> = am_start_args(intent)
            .into_iter()
            .map(|arg| shell_quote(&arg))
            .collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        // `am start` reports resolution failures on stdout with a zero exit code
        let output = self.client.shell(&args)?;
        if let Some(error) = output.lines().find(|l| l.starts_with("Error")) {
            return Err(PackageError::ActivityRejected(error.to_string()));
        }
        Ok(())
    }

    fn show_toast(&self, message: &str, duration: ToastDuration) {
        // No shell command raises a toast; a transient notification is the closest
        let quoted = shell_quote(message);
        let result = self.client.shell(&[
            "cmd",
            "notification",
            "post",
            "-S",
            "bigtext",
            "-t",
            "'installed_apps'",
            "installed_apps_toast",
            &quoted,
        ]);

        match result {
            Ok(_) => debug!("Toast ({:?}) posted: {}", duration, message),
            Err(e) => warn!("Failed to post toast: {}", e),
        }
    }
}
