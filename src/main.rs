//! Installed Apps bridge - command line entry point
//!
//! Attaches the plugin to the device reached over ADB and serves method
//! calls as JSON lines on stdin/stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use clap::Parser;
use installed_apps::commands::LineServer;
use installed_apps::prelude::*;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installed application bridge over ADB, speaking JSON lines on stdin/stdout
#[derive(Parser, Debug)]
#[command(name = "installed-apps", version, about)]
struct CliArgs {
    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Device serial, overrides `adb.serial` from the config
    #[arg(long, value_name = "SERIAL")]
    serial: Option<String>,
}

fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_path = args
        .config
        .or_else(BridgeConfig::config_file)
        .ok_or_else(|| anyhow!("Cannot determine config path"))?;
    let mut config = BridgeConfig::load_or_default(&config_path).await?;
    if let Some(serial) = args.serial {
        config.adb.serial = Some(serial);
    }

    init_logging(&config.logging.level)?;
    info!("installed-apps v{} starting with {:?}", VERSION, config_path);

    let client = AdbClient::new(config.adb.resolve_sdk_path(), config.adb.serial.clone());
    if !client.is_available() {
        warn!("adb not found; calls will fail until it is installed");
    }

    let cache_dir = config.cache_dir();
    let platform = Arc::new(AdbPackageManager::new(client, cache_dir.clone()));

    let plugin = Arc::new(InstalledAppsPlugin::new(StreamerOptions {
        chunk_size: config.extraction.chunk_size,
        queue_capacity: config.extraction.queue_capacity,
    }));
    plugin.attach(platform);

    info!(
        "Serving {} and {} on stdin/stdout",
        config.channels.method, config.channels.events
    );
    let server = LineServer::new(
        plugin,
        std::io::stdout(),
        cache_dir.join("extracted"),
        config.channels.clone(),
    );
    server.run(BufReader::new(tokio::io::stdin())).await?;

    info!("Input closed, exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("installed-apps").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_args() {
        let args = parse(&["--config", "/tmp/c.toml", "--serial", "emulator-5554"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(args.serial.as_deref(), Some("emulator-5554"));

        let args = parse(&[]).unwrap();
        assert!(args.config.is_none() && args.serial.is_none());

        assert!(parse(&["--serial"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn test_help_and_version_are_generated() {
        let help = parse(&["--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);

        let version = parse(&["--version"]).unwrap_err();
        assert_eq!(version.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
