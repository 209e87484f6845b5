//! File-backed event channel.
//!
//! The spool directory `<channel_root>/<name>/` stands in for the external
//! realtime transport: writers drop input into `stdin.json` (a JSON object
//! mapping decimal string indices to payload values) and toggle plan mode in
//! `control.json`. A watcher re-reads the files on every change and hands the
//! snapshots to the core queues; index dedup and control value dedup make the
//! inherent re-delivery harmless. The watcher callback only enqueues and
//! never blocks on the supervisor.

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termsync_core::{ControlQueue, SequencedEventQueue};
use tracing::{debug, info, warn};

const STDIN_FILE: &str = "stdin.json";
const CONTROL_FILE: &str = "control.json";
const META_FILE: &str = "meta.json";
const LINES_FILE: &str = "lines.jsonl";

/// Paths of one session's spool directory.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    dir: PathBuf,
}

impl SessionLayout {
    pub fn new(channel_root: &Path, name: &str) -> Self {
        Self {
            dir: channel_root.join(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stdin_path(&self) -> PathBuf {
        self.dir.join(STDIN_FILE)
    }

    pub fn control_path(&self) -> PathBuf {
        self.dir.join(CONTROL_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn lines_path(&self) -> PathBuf {
        self.dir.join(LINES_FILE)
    }
}

#[derive(Debug, Deserialize)]
struct ControlFile {
    plan_mode: bool,
}

/// Watches a session's spool directory and feeds the core queues.
pub struct FileChannel {
    // Watching stops when the channel is dropped.
    _watcher: RecommendedWatcher,
}

impl FileChannel {
    /// Prime the queues from the current snapshot and start watching. The
    /// initial control value is consumed by the control queue's one-shot
    /// flag; pre-existing stdin entries are admitted (startup normally
    /// clears them first unless --no-clear was given).
    pub fn subscribe(
        layout: &SessionLayout,
        inputs: Arc<SequencedEventQueue>,
        controls: Arc<ControlQueue>,
    ) -> Result<Self> {
        std::fs::create_dir_all(layout.dir())
            .with_context(|| format!("creating spool directory {:?}", layout.dir()))?;

        sync_input(&layout.stdin_path(), &inputs);
        let mut last_control = read_control(&layout.control_path());
        controls.admit(last_control.unwrap_or(false));

        let stdin_path = layout.stdin_path();
        let control_path = layout.control_path();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if touches(&event, STDIN_FILE) {
                        sync_input(&stdin_path, &inputs);
                    }
                    if touches(&event, CONTROL_FILE) {
                        if let Some(value) = read_control(&control_path) {
                            // The transport only reports changes; suppress
                            // re-delivered identical snapshots.
                            if last_control != Some(value) {
                                last_control = Some(value);
                                controls.admit(value);
                            }
                        }
                    }
                }
                Err(e) => warn!(target: "termsync::channel", "Watch error: {}", e),
            })
            .context("creating spool watcher")?;
        watcher
            .watch(layout.dir(), RecursiveMode::NonRecursive)
            .with_context(|| format!("watching spool directory {:?}", layout.dir()))?;

        info!(target: "termsync::channel", "Listening for input at {:?}", layout.stdin_path());
        Ok(Self { _watcher: watcher })
    }
}

fn touches(event: &Event, file_name: &str) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(OsStr::new(file_name)))
}

/// Re-read the stdin snapshot and admit its entries in ascending index
/// order. Non-numeric keys and non-string values are skipped; half-written
/// files are skipped until the next notification.
fn sync_input(path: &Path, inputs: &SequencedEventQueue) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return,
    };
    let snapshot: HashMap<String, serde_json::Value> = match serde_json::from_str(&content) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!(target: "termsync::channel", "Skipping unreadable stdin snapshot: {}", e);
            return;
        }
    };
    let entries: Vec<(u64, String)> = snapshot
        .into_iter()
        .filter_map(|(key, value)| {
            let index = key.parse::<u64>().ok()?;
            let value = value.as_str()?.to_string();
            Some((index, value))
        })
        .collect();
    inputs.admit_batch(entries);
}

fn read_control(path: &Path) -> Option<bool> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ControlFile>(&content) {
        Ok(control) => Some(control.plan_mode),
        Err(e) => {
            debug!(target: "termsync::channel", "Skipping unreadable control snapshot: {}", e);
            None
        }
    }
}
