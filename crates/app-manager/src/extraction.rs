//! APK Extraction Streamer
//!
//! Copies an installed package's backing file in fixed-size chunks on a
//! single background worker, reporting progress on the event sink.
//!
//! Per job the sink sees zero or more `Progress` events with strictly
//! increasing fractions, then exactly one `Complete` or `Error`.

use std::path::PathBuf;
use std::sync::Arc;
use installed_apps_bridge::Platform;
use installed_apps_core::{BridgeError, EventSink, ExtractionEvent, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{EXTRACTION_ERROR, FILE_NOT_FOUND};

/// Worker tuning
#[derive(Debug, Clone, Copy)]
pub struct StreamerOptions {
    pub chunk_size: usize,
    pub queue_capacity: usize,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            queue_capacity: 32,
        }
    }
}

struct ExtractionJob {
    package_name: String,
}

/// Handle to the extraction worker. Jobs run one at a time in submission order.
pub struct ExtractionStreamer {
    sender: mpsc::Sender<ExtractionJob>,
    worker: JoinHandle<()>,
}

impl ExtractionStreamer {
    /// Start the worker on the current tokio runtime
    pub fn spawn(platform: Arc<dyn Platform>, sink: Arc<EventSink>, options: StreamerOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let chunk_size = options.chunk_size.max(1);
        let worker = tokio::spawn(run_worker(receiver, platform, sink, chunk_size));

        Self { sender, worker }
    }

    /// Queue an extraction. Fails only when the job cannot be queued.
    pub fn submit(&self, package_name: impl Into<String>) -> Result<()> {
        let job = ExtractionJob {
            package_name: package_name.into(),
        };
        debug!("Queueing extraction of {}", job.package_name);

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                BridgeError::Extraction(format!("queue full, {} not queued", job.package_name))
            }
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::Extraction("extraction worker stopped".to_string())
            }
        })
    }

    /// Stop accepting jobs and wait for the queued ones to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!("Extraction worker ended abnormally: {}", e);
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<ExtractionJob>,
    platform: Arc<dyn Platform>,
    sink: Arc<EventSink>,
    chunk_size: usize,
) {
    info!("Extraction worker started");
    while let Some(job) = receiver.recv().await {
        extract(&platform, &sink, &job.package_name, chunk_size).await;
    }
    info!("Extraction worker stopped");
}

async fn resolve_source(platform: &Arc<dyn Platform>, package_name: &str) -> std::result::Result<PathBuf, String> {
    let platform = Arc::clone(platform);
    let package_name = package_name.to_string();

    tokio::task::spawn_blocking(move || {
        let app = platform.application_info(&package_name)?;
        platform.materialize_source(&app)
    })
    .await
    .map_err(|e| e.to_string())?
    .map_err(|e| e.to_string())
}

async fn extract(platform: &Arc<dyn Platform>, sink: &EventSink, package_name: &str, chunk_size: usize) {
    let fail = |message: String| {
        warn!("Extraction of {} failed: {}", package_name, message);
        sink.emit(ExtractionEvent::error(
            EXTRACTION_ERROR,
            format!("Failed to extract APK: {}", message),
        ));
    };

    let path = match resolve_source(platform, package_name).await {
        Ok(path) => path,
        Err(message) => return fail(message),
    };

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!("Backing file of {} missing at {:?}", package_name, path);
        sink.emit(ExtractionEvent::error(FILE_NOT_FOUND, "APK file not found"));
        return;
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => return fail(e.to_string()),
    };
    let total = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => return fail(e.to_string()),
    };

    debug!("Extracting {} ({} bytes) from {:?}", package_name, total, path);
    if stream_chunks(file, total, chunk_size, |event| {
        sink.emit(event);
    })
    .await
    {
        info!("Extracted {} ({} bytes)", package_name, total);
    }
}

/// Fill `buffer` unless the reader ends first; returns the bytes read
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn fraction(read: u64, total: u64) -> f64 {
    if total == 0 || read >= total {
        1.0
    } else {
        read as f64 / total as f64
    }
}

/// Read `reader` to the end in `chunk_size` steps.
///
/// `total` is the expected length and only scales the fractions. Returns
/// `true` when `Complete` was emitted, `false` after an `Error`.
pub async fn stream_chunks<R, F>(mut reader: R, total: u64, chunk_size: usize, mut emit: F) -> bool
where
    R: AsyncRead + Unpin,
    F: FnMut(ExtractionEvent),
{
    let mut payload = Vec::with_capacity(total.min(64 * 1024 * 1024) as usize);
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let filled = match fill_chunk(&mut reader, &mut buffer).await {
            Ok(filled) => filled,
            Err(e) => {
                emit(ExtractionEvent::error(
                    EXTRACTION_ERROR,
                    format!("Failed to extract APK: {}", e),
                ));
                return false;
            }
        };

        if filled == 0 {
            break;
        }

        payload.extend_from_slice(&buffer[..filled]);
        emit(ExtractionEvent::Progress {
            fraction: fraction(payload.len() as u64, total),
        });

        if filled < buffer.len() {
            break;
        }
    }

    if payload.is_empty() {
        emit(ExtractionEvent::Progress { fraction: 1.0 });
    }

    emit(ExtractionEvent::Complete { payload });
    true
}
