//! File-backed session sink.
//!
//! The published side of the spool layout: `meta.json` holds the current
//! [`SessionMeta`] (rewritten atomically so readers never see a torn
//! document) and `lines.jsonl` accumulates mirrored output lines in index
//! order.

use crate::channel::SessionLayout;
use serde_json::json;
use std::fs;
use std::io::Write;
use termsync_core::{Result, SessionMeta, SessionSink, TermsyncError};

pub struct FileSink {
    layout: SessionLayout,
}

impl FileSink {
    pub fn new(layout: SessionLayout) -> Self {
        Self { layout }
    }
}

fn transport_err(e: std::io::Error) -> TermsyncError {
    TermsyncError::Transport(e.to_string())
}

impl SessionSink for FileSink {
    fn clear_all(&self) -> Result<()> {
        for path in [
            self.layout.stdin_path(),
            self.layout.control_path(),
            self.layout.meta_path(),
            self.layout.lines_path(),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(transport_err(e)),
            }
        }
        Ok(())
    }

    fn clear_input(&self) -> Result<()> {
        match fs::remove_file(self.layout.stdin_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(transport_err(e)),
        }
    }

    fn publish_meta(&self, meta: &SessionMeta) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(meta)?;
        let tmp_path = self.layout.meta_path().with_extension("json.tmp");
        fs::write(&tmp_path, serialized).map_err(transport_err)?;
        fs::rename(&tmp_path, self.layout.meta_path()).map_err(transport_err)
    }

    fn publish_line(&self, index: u64, text: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.layout.lines_path())
            .map_err(transport_err)?;
        let row = json!({ "index": index, "text": text });
        writeln!(file, "{}", row).map_err(transport_err)
    }
}
