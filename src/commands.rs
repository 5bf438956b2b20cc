//! Line protocol driver
//!
//! Serves the plugin over newline-delimited JSON: one `MethodCall` per input
//! line, one response per output line. Extraction events are written from a
//! dedicated consumer thread, tagged with the event channel name.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use installed_apps_core::config::ChannelConfig;
use installed_apps_core::{EventSubscription, ExtractionEvent};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::plugin::InstalledAppsPlugin;
use crate::request::{MethodCall, MethodResponse};

/// Package ids of queued extractions, oldest first. The worker runs them in order.
type Pending = Arc<Mutex<VecDeque<String>>>;

pub struct LineServer<W: Write + Send + 'static> {
    plugin: Arc<InstalledAppsPlugin>,
    output: Arc<Mutex<W>>,
    extract_dir: PathBuf,
    channels: ChannelConfig,
}

impl<W: Write + Send + 'static> LineServer<W> {
    pub fn new(plugin: Arc<InstalledAppsPlugin>, output: W, extract_dir: PathBuf, channels: ChannelConfig) -> Self {
        Self {
            plugin,
            output: Arc::new(Mutex::new(output)),
            extract_dir,
            channels,
        }
    }

    pub fn output(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.output)
    }

    /// Serve until `input` ends, then drain queued extractions
    pub async fn run<R: AsyncBufRead + Unpin>(&self, input: R) -> Result<()> {
        let pending: Pending = Arc::new(Mutex::new(VecDeque::new()));
        let forwarder = self.spawn_event_forwarder(self.plugin.listen(), Arc::clone(&pending));

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read request")? {
            if line.trim().is_empty() {
                continue;
            }

            let reply = self.handle_line(&line, &pending).await;
            write_line(&self.output, &reply)?;
        }

        debug!("Input closed, waiting for queued extractions");
        self.plugin.shutdown().await;
        self.plugin.cancel();

        forwarder
            .join()
            .map_err(|_| anyhow::anyhow!("Event forwarder panicked"))?;
        Ok(())
    }

    async fn handle_line(&self, line: &str, pending: &Pending) -> Value {
        let call: MethodCall = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Malformed request: {}", e);
                let response = MethodResponse::Error {
                    code: "INVALID_ARGUMENTS".to_string(),
                    message: e.to_string(),
                };
                return envelope(&self.channels.method, None, &response);
            }
        };

        let extraction = (call.method == "extractApk").then(|| {
            call.arguments
                .get("package_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
        if let Some(package_name) = &extraction {
            pending.lock().push_back(package_name.clone());
        }

        let response = self.plugin.handle(&call).await;
        if extraction.is_some() && !matches!(response, MethodResponse::Success { .. }) {
            pending.lock().pop_back();
        }

        envelope(&self.channels.method, call.id.as_ref(), &response)
    }

    fn spawn_event_forwarder(&self, subscription: EventSubscription, pending: Pending) -> std::thread::JoinHandle<()> {
        let output = Arc::clone(&self.output);
        let extract_dir = self.extract_dir.clone();
        let channel = self.channels.events.clone();

        std::thread::spawn(move || {
            for event in subscription.iter() {
                let package_name = pending.lock().front().cloned().unwrap_or_default();
                if event.is_terminal() {
                    pending.lock().pop_front();
                }

                let line = render_event(&channel, &package_name, event, &extract_dir);
                if let Err(e) = write_line(&output, &line) {
                    warn!("Failed to write event: {}", e);
                }
            }
            debug!("Event forwarder finished");
        })
    }
}

fn envelope(channel: &str, id: Option<&Value>, response: &MethodResponse) -> Value {
    let mut value = serde_json::to_value(response).unwrap_or_else(|e| json!({"status": "error", "message": e.to_string()}));
    if let Value::Object(map) = &mut value {
        map.insert("channel".to_string(), json!(channel));
        if let Some(id) = id {
            map.insert("id".to_string(), id.clone());
        }
    }
    value
}

/// JSON line for an event. A completed payload is written to `<extract_dir>/<package>.apk`.
pub fn render_event(channel: &str, package_name: &str, event: ExtractionEvent, extract_dir: &Path) -> Value {
    match event {
        ExtractionEvent::Progress { fraction } => json!({
            "channel": channel,
            "type": "progress",
            "package_name": package_name,
            "fraction": fraction,
        }),
        ExtractionEvent::Complete { payload } => match save_payload(extract_dir, package_name, &payload) {
            Ok(path) => json!({
                "channel": channel,
                "type": "complete",
                "package_name": package_name,
                "size": payload.len(),
                "path": path,
            }),
            Err(e) => json!({
                "channel": channel,
                "type": "error",
                "package_name": package_name,
                "code": "EXTRACTION_ERROR",
                "message": format!("Failed to save APK: {:#}", e),
            }),
        },
        ExtractionEvent::Error { code, message } => json!({
            "channel": channel,
            "type": "error",
            "package_name": package_name,
            "code": code,
            "message": message,
        }),
    }
}

fn save_payload(extract_dir: &Path, package_name: &str, payload: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(extract_dir)
        .with_context(|| format!("Failed to create {:?}", extract_dir))?;

    let name = if package_name.is_empty() { "unknown" } else { package_name };
    let path = extract_dir.join(format!("{}.apk", name));
    std::fs::write(&path, payload).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

fn write_line<W: Write>(output: &Mutex<W>, value: &Value) -> Result<()> {
    let mut output = output.lock();
    serde_json::to_writer(&mut *output, value)?;
    output.write_all(b"\n")?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use installed_apps_bridge::{ApplicationInfo, InstalledPackage, MemoryPackageManager};

    #[test]
    fn test_render_progress_and_error() {
        let dir = tempfile::tempdir().unwrap();
        let progress = render_event("events", "com.a", ExtractionEvent::Progress { fraction: 0.5 }, dir.path());
        assert_eq!(progress["type"], "progress");
        assert_eq!(progress["fraction"], 0.5);

        let error = render_event("events", "com.a", ExtractionEvent::error("FILE_NOT_FOUND", "APK file not found"), dir.path());
        assert_eq!(error["code"], "FILE_NOT_FOUND");
    }

    #[test]
    fn test_render_complete_saves_payload() {
        let dir = tempfile::tempdir().unwrap();
        let line = render_event("events", "com.a", ExtractionEvent::Complete { payload: vec![1, 2, 3] }, dir.path());

        assert_eq!(line["type"], "complete");
        assert_eq!(line["size"], 3);
        assert_eq!(std::fs::read(dir.path().join("com.a.apk")).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_serves_lines() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("base.apk");
        std::fs::write(&apk, vec![9u8; 10]).unwrap();

        let pm = Arc::new(MemoryPackageManager::new());
        pm.install(InstalledPackage::new(ApplicationInfo::new("com.example", &apk)));
        let plugin = Arc::new(InstalledAppsPlugin::default());
        plugin.attach(pm);

        let server = LineServer::new(plugin, Vec::new(), dir.path().join("out"), ChannelConfig::default());
        let input = concat!(
            "{\"id\": 1, \"method\": \"isAppInstalled\", \"arguments\": {\"package_name\": \"com.example\"}}\n",
            "\n",
            "not json\n",
            "{\"id\": 2, \"method\": \"unknown\"}\n",
            "{\"id\": 3, \"method\": \"extractApk\", \"arguments\": {\"package_name\": \"com.example\"}}\n",
        );
        server.run(input.as_bytes()).await.unwrap();

        let output = String::from_utf8(server.output().lock().clone()).unwrap();
        let lines: Vec<Value> = output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        let replies: Vec<&Value> = lines.iter().filter(|l| l["channel"] == "installed_apps").collect();
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"], true);
        assert_eq!(replies[1]["code"], "INVALID_ARGUMENTS");
        assert_eq!(replies[2]["status"], "not_implemented");
        assert_eq!(replies[3]["status"], "success");

        let events: Vec<&Value> = lines
            .iter()
            .filter(|l| l["channel"] == "installed_apps/extract_apk_stream")
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["fraction"], 1.0);
        assert_eq!(events[1]["type"], "complete");
        assert_eq!(events[1]["package_name"], "com.example");
        assert!(dir.path().join("out").join("com.example.apk").exists());
    }
}
