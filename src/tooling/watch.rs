//! Watch mode: filesystem changes become `fileSaved` trigger events.
//!
//! Changes are debounced per path and flushed in batches. A change under the
//! workspace descriptor directory reloads the registry instead of
//! dispatching skills.

use crate::config::WORKSPACE_DIR;
use crate::error::RuntimeError;
use crate::runtime::{EventReport, Runtime};
use crate::trigger::TriggerEvent;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Watch mode configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub workspace_root: PathBuf,
    /// Repeated changes to one path inside this window count once
    pub debounce_ms: u64,
    /// How long changes accumulate before a batch is dispatched
    pub batch_window_ms: u64,
    pub max_batch_size: usize,
    /// Glob patterns of paths never dispatched
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            debounce_ms: 100,
            batch_window_ms: 50,
            max_batch_size: 100,
            ignore_patterns: vec![
                "**/.git/**".to_string(),
                "**/target/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/.DS_Store".to_string(),
                "**/*.swp".to_string(),
                "**/*.tmp".to_string(),
                "**/*~".to_string(),
            ],
        }
    }
}

/// Groups and debounces changed paths.
pub(crate) struct EventBatcher {
    ignore: GlobSet,
    debounce: Duration,
    max_batch_size: usize,
    /// Path to the time it was last seen
    pending: BTreeMap<PathBuf, Instant>,
}

impl EventBatcher {
    pub(crate) fn new(config: &WatchConfig) -> Result<Self, RuntimeError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                RuntimeError::ConfigError(format!("invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| RuntimeError::ConfigError(format!("invalid ignore patterns: {}", e)))?;
        Ok(Self {
            ignore,
            debounce: Duration::from_millis(config.debounce_ms),
            max_batch_size: config.max_batch_size.max(1),
            pending: BTreeMap::new(),
        })
    }

    /// Record a change. Returns true once the batch is full.
    pub(crate) fn add_path(&mut self, path: PathBuf, now: Instant) -> bool {
        if self.ignore.is_match(&path) {
            return false;
        }
        match self.pending.get_mut(&path) {
            Some(seen) if now.duration_since(*seen) < self.debounce => {
                *seen = now;
            }
            _ => {
                self.pending.insert(path, now);
            }
        }
        self.pending.len() >= self.max_batch_size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain pending paths in path order.
    pub(crate) fn take_batch(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.pending).into_keys().collect()
    }
}

/// Watch mode daemon
pub struct WatchDaemon {
    runtime: Arc<Runtime>,
    config: WatchConfig,
    running: Arc<AtomicBool>,
}

impl WatchDaemon {
    pub fn new(runtime: Arc<Runtime>, config: WatchConfig) -> Self {
        Self {
            runtime,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Watch until the watcher disconnects or the running flag is cleared.
    /// Blocks the calling thread; `handle` drives the async dispatch. Every
    /// finished event report is handed to `on_report`.
    pub fn start<F>(
        &self,
        handle: &tokio::runtime::Handle,
        mut on_report: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnMut(&EventReport),
    {
        self.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| RuntimeError::ConfigError(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.config.workspace_root, RecursiveMode::Recursive)
            .map_err(|e| RuntimeError::ConfigError(format!("Failed to watch directory: {}", e)))?;

        info!(workspace = ?self.config.workspace_root, "Watching workspace");

        let mut batcher = EventBatcher::new(&self.config)?;
        let batch_window = Duration::from_millis(self.config.batch_window_ms);
        let mut last_batch_time = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let timeout = batch_window.saturating_sub(last_batch_time.elapsed());
            match rx.recv_timeout(timeout.max(Duration::from_millis(1))) {
                Ok(Ok(event)) => {
                    let now = Instant::now();
                    for path in changed_paths(event) {
                        if batcher.add_path(path, now) {
                            self.process_batch(handle, batcher.take_batch(), &mut on_report);
                            last_batch_time = Instant::now();
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watch error: {}", e);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
            }

            if !batcher.is_empty() && last_batch_time.elapsed() >= batch_window {
                self.process_batch(handle, batcher.take_batch(), &mut on_report);
                last_batch_time = Instant::now();
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn process_batch<F>(
        &self,
        handle: &tokio::runtime::Handle,
        paths: Vec<PathBuf>,
        on_report: &mut F,
    ) where
        F: FnMut(&EventReport),
    {
        if paths.is_empty() {
            return;
        }
        debug!(count = paths.len(), "Processing change batch");

        let descriptor_dir = self.config.workspace_root.join(WORKSPACE_DIR);
        let (descriptor_changes, files): (Vec<PathBuf>, Vec<PathBuf>) = paths
            .into_iter()
            .partition(|p| is_under(p, &descriptor_dir, &self.config.workspace_root));

        if !descriptor_changes.is_empty() {
            let report = self.runtime.reload();
            info!(
                version = report.version,
                errors = report.errors.len(),
                "Descriptors changed; registry reloaded"
            );
        }

        for path in files {
            let event = TriggerEvent::FileSaved { path };
            let result = handle.block_on(async {
                let pending = self.runtime.on_event(event).await?;
                if pending.is_empty() {
                    return Ok::<_, RuntimeError>(None);
                }
                Ok(Some(pending.wait().await))
            });
            match result {
                Ok(Some(report)) => on_report(&report),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to dispatch file event"),
            }
        }
    }
}

/// Paths created or modified by a notify event.
fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().take(1).collect(),
        // A rename reports [from, to]; the new name is the saved file
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        EventKind::Modify(_) => event.paths.into_iter().take(1).collect(),
        _ => Vec::new(),
    }
}

/// Notify may report absolute or workspace-relative paths.
fn is_under(path: &Path, dir: &Path, root: &Path) -> bool {
    path.starts_with(dir)
        || path
            .strip_prefix(root)
            .is_ok_and(|rel| rel.starts_with(WORKSPACE_DIR))
        || path.starts_with(WORKSPACE_DIR)
}
