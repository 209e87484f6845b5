//! External sink abstraction.
//!
//! The sink is the published side of the session: a `meta` document plus an
//! optional line-indexed output mirror. Sink failures must never take down
//! the local console mirror, so callers log and continue on `Transport`
//! errors instead of propagating them.

use crate::{Result, SessionMeta};
use std::sync::Mutex;

pub trait SessionSink: Send + Sync {
    /// Remove all previously published state for this session namespace.
    fn clear_all(&self) -> Result<()>;

    /// Remove pending external input state. Called during restarts so a
    /// transport snapshot cannot replay indices the queue has forgotten.
    fn clear_input(&self) -> Result<()>;

    fn publish_meta(&self, meta: &SessionMeta) -> Result<()>;

    fn publish_line(&self, index: u64, text: &str) -> Result<()>;
}

/// In-memory sink recording every publish, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    metas: Mutex<Vec<SessionMeta>>,
    lines: Mutex<Vec<(u64, String)>>,
    input_clears: Mutex<u32>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metas(&self) -> Vec<SessionMeta> {
        self.metas.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<(u64, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn input_clears(&self) -> u32 {
        *self.input_clears.lock().unwrap()
    }
}

impl SessionSink for MemorySink {
    fn clear_all(&self) -> Result<()> {
        self.metas.lock().unwrap().clear();
        self.lines.lock().unwrap().clear();
        Ok(())
    }

    fn clear_input(&self) -> Result<()> {
        *self.input_clears.lock().unwrap() += 1;
        Ok(())
    }

    fn publish_meta(&self, meta: &SessionMeta) -> Result<()> {
        self.metas.lock().unwrap().push(meta.clone());
        Ok(())
    }

    fn publish_line(&self, index: u64, text: &str) -> Result<()> {
        self.lines.lock().unwrap().push((index, text.to_string()));
        Ok(())
    }
}
