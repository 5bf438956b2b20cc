//! Installed Apps Plugin
//!
//! Owns both channels: answers method calls and feeds the extraction event
//! stream. Calls made while no backend is attached fail before dispatch.

use std::sync::Arc;
use installed_apps_bridge::{BuiltWith, Platform};
use installed_apps_core::{BridgeError, EventSink, EventSubscription, Result};
use installed_apps_manager::{
    ActionDispatcher, ExtractionStreamer, FilterSpec, ListingService, StreamerOptions,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::request::{MethodCall, MethodResponse, Request};

struct Backend {
    listing: ListingService,
    actions: ActionDispatcher,
    streamer: ExtractionStreamer,
}

pub struct InstalledAppsPlugin {
    backend: RwLock<Option<Backend>>,
    sink: Arc<EventSink>,
    options: StreamerOptions,
}

impl InstalledAppsPlugin {
    pub fn new(options: StreamerOptions) -> Self {
        Self {
            backend: RwLock::new(None),
            sink: Arc::new(EventSink::new()),
            options,
        }
    }

    /// Bind to a package backend. Must be called inside a tokio runtime.
    pub fn attach(&self, platform: Arc<dyn Platform>) {
        let backend = Backend {
            listing: ListingService::new(Arc::clone(&platform)),
            actions: ActionDispatcher::new(Arc::clone(&platform)),
            streamer: ExtractionStreamer::spawn(platform, Arc::clone(&self.sink), self.options),
        };

        if self.backend.write().replace(backend).is_some() {
            debug!("Replaced previously attached backend");
        }
        info!("Plugin attached");
    }

    /// Unbind; queued extractions still finish on the old worker
    pub fn detach(&self) {
        if self.backend.write().take().is_some() {
            info!("Plugin detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.backend.read().is_some()
    }

    /// Detach and wait for queued extractions to finish
    pub async fn shutdown(&self) {
        let backend = self.backend.write().take();
        if let Some(backend) = backend {
            backend.streamer.shutdown().await;
            info!("Plugin shut down");
        }
    }

    /// Subscribe to the extraction stream, replacing any current subscriber
    pub fn listen(&self) -> EventSubscription {
        self.sink.listen()
    }

    /// Drop the current extraction subscriber
    pub fn cancel(&self) {
        self.sink.cancel();
    }

    fn services(&self) -> Option<(ListingService, ActionDispatcher)> {
        self.backend
            .read()
            .as_ref()
            .map(|b| (b.listing.clone(), b.actions.clone()))
    }

    fn submit_extraction(&self, package_name: &str) -> Result<()> {
        match self.backend.read().as_ref() {
            Some(backend) => backend.streamer.submit(package_name),
            None => Err(BridgeError::Detached),
        }
    }

    /// Answer one method call
    pub async fn handle(&self, call: &MethodCall) -> MethodResponse {
        let Some((listing, actions)) = self.services() else {
            return MethodResponse::from_error(&BridgeError::Detached);
        };

        let request = match Request::from_call(call) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("Method {} not implemented", call.method);
                return MethodResponse::NotImplemented;
            }
            Err(e) => return MethodResponse::from_error(&e),
        };

        debug!("Handling {}", request.method());
        match request {
            Request::ListApps(args) => {
                let filter = FilterSpec {
                    exclude_system_apps: args.exclude_system_apps,
                    package_name_prefix: args.package_name_prefix,
                };
                let platform = BuiltWith::parse_override(&args.platform_type);
                MethodResponse::success(listing.list(filter, args.with_icon, platform).await)
            }
            Request::GetAppInfo(args) => {
                let platform = BuiltWith::parse_override(&args.platform_type);
                MethodResponse::success(listing.app_info(args.package_name, platform).await)
            }
            Request::LaunchApp(args) => {
                respond(blocking(move || actions.launch(args.package_name.as_deref())).await)
            }
            Request::OpenSettings(args) => respond(
                blocking(move || actions.open_settings(args.package_name.as_deref()))
                    .await
                    .map(|()| serde_json::Value::Null),
            ),
            Request::Toast(args) => respond(
                blocking(move || actions.toast(&args.message, args.short_length))
                    .await
                    .map(|()| serde_json::Value::Null),
            ),
            Request::IsSystemApp(args) => respond(
                blocking(move || actions.is_system_app(args.package_name()))
                    .await
                    .and_then(package_result),
            ),
            Request::UninstallApp(args) => {
                respond(blocking(move || actions.uninstall(args.package_name())).await)
            }
            Request::IsAppInstalled(args) => respond(
                blocking(move || actions.is_installed(args.package_name()))
                    .await
                    .and_then(package_result),
            ),
            Request::ExtractApk(args) => match self.submit_extraction(args.package_name()) {
                Ok(()) => MethodResponse::empty(),
                Err(e) => MethodResponse::from_error(&e),
            },
        }
    }
}

impl Default for InstalledAppsPlugin {
    fn default() -> Self {
        Self::new(StreamerOptions::default())
    }
}

/// Run a blocking backend call off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::Channel(e.to_string()))
}

fn package_result<T>(result: std::result::Result<T, installed_apps_bridge::PackageError>) -> Result<T> {
    result.map_err(|e| BridgeError::Package(e.to_string()))
}

fn respond<T: serde::Serialize>(result: Result<T>) -> MethodResponse {
    match result {
        Ok(value) => MethodResponse::success(value),
        Err(e) => MethodResponse::from_error(&e),
    }
}
