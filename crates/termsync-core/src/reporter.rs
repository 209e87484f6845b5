//! Lifecycle metadata publishing with heartbeat coalescing.

use crate::{SessionMeta, SessionSink, SessionStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const META_HEARTBEAT: Duration = Duration::from_secs(5);
const LINE_HEARTBEAT: Duration = Duration::from_secs(2);

/// Publishes [`SessionMeta`] at lifecycle transitions and on a bounded
/// heartbeat cadence. Sink failures are logged and swallowed: the external
/// sink being unreachable must never disturb the local session.
pub struct StatusReporter {
    sink: Arc<dyn SessionSink>,
    meta: SessionMeta,
    meta_interval: Duration,
    line_interval: Duration,
    last_meta_beat: Instant,
    last_line_beat: Instant,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn SessionSink>, command: &str) -> Self {
        Self {
            sink,
            meta: SessionMeta::running(command, None),
            meta_interval: META_HEARTBEAT,
            line_interval: LINE_HEARTBEAT,
            last_meta_beat: Instant::now(),
            last_line_beat: Instant::now(),
        }
    }

    /// Override heartbeat intervals (tests use short ones).
    pub fn with_intervals(mut self, meta: Duration, lines: Duration) -> Self {
        self.meta_interval = meta;
        self.line_interval = lines;
        self
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Publish a fresh `running` meta for a newly started session.
    pub fn started(&mut self, command: &str, plan_mode: Option<bool>) {
        let line_count = self.meta.line_count;
        self.meta = SessionMeta::running(command, plan_mode);
        self.meta.line_count = line_count;
        self.publish();
    }

    /// Publish a restart: new `started_at`, status back to `running`.
    pub fn restarted(&mut self, command: &str, plan_mode: Option<bool>) {
        info!(target: "termsync::reporter", "Session restarting: {}", command);
        self.started(command, plan_mode);
    }

    /// Coalesced periodic update while running.
    pub fn heartbeat(&mut self) {
        if self.last_meta_beat.elapsed() < self.meta_interval {
            return;
        }
        self.meta.touch();
        self.publish();
    }

    /// Coalesced line-count update for the output-mirroring variant. The
    /// count is always recorded so terminal publishes carry the latest value
    /// even between beats.
    pub fn line_heartbeat(&mut self, line_count: u64) {
        self.meta.line_count = Some(line_count);
        if self.last_line_beat.elapsed() < self.line_interval {
            return;
        }
        self.meta.touch();
        self.publish();
        self.last_line_beat = Instant::now();
    }

    /// Forward one mirrored output line.
    pub fn line(&mut self, index: u64, text: &str) {
        if let Err(e) = self.sink.publish_line(index, text) {
            warn!(target: "termsync::reporter", "Sink line write failed: {}", e);
        }
    }

    /// Terminal transition after the child exited on its own.
    pub fn finished(&mut self, exit_code: i32) {
        self.meta.status = if exit_code == 0 {
            SessionStatus::Completed
        } else {
            SessionStatus::Error
        };
        self.meta.exit_code = Some(exit_code);
        self.meta.touch();
        self.publish();
    }

    /// Controlled shutdown via an external interrupt signal.
    pub fn interrupted(&mut self) {
        self.meta.status = SessionStatus::Interrupted;
        self.meta.touch();
        self.publish();
    }

    /// Fatal failure (spawn error, unrecoverable read error).
    pub fn failed(&mut self, reason: &str) {
        self.meta.status = SessionStatus::Error;
        self.meta.error = Some(reason.to_string());
        self.meta.touch();
        self.publish();
    }

    fn publish(&mut self) {
        if let Err(e) = self.sink.publish_meta(&self.meta) {
            warn!(target: "termsync::reporter", "Sink meta write failed: {}", e);
        }
        self.last_meta_beat = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;

    fn reporter(sink: Arc<MemorySink>) -> StatusReporter {
        StatusReporter::new(sink, "cat")
            .with_intervals(Duration::from_millis(30), Duration::from_millis(20))
    }

    #[test]
    fn lifecycle_transitions_publish_immediately() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = reporter(sink.clone());
        reporter.started("cat", None);
        reporter.finished(0);

        let metas = sink.metas();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].status, SessionStatus::Running);
        assert_eq!(metas[1].status, SessionStatus::Completed);
        assert_eq!(metas[1].exit_code, Some(0));
    }

    #[test]
    fn nonzero_exit_is_error() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = reporter(sink.clone());
        reporter.finished(2);
        let metas = sink.metas();
        assert_eq!(metas.last().unwrap().status, SessionStatus::Error);
        assert_eq!(metas.last().unwrap().exit_code, Some(2));
    }

    #[test]
    fn heartbeats_are_coalesced() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = reporter(sink.clone());
        reporter.started("cat", None);
        let baseline = sink.metas().len();

        // Rapid-fire heartbeats inside the interval publish nothing.
        for _ in 0..20 {
            reporter.heartbeat();
        }
        assert_eq!(sink.metas().len(), baseline);

        std::thread::sleep(Duration::from_millis(40));
        reporter.heartbeat();
        reporter.heartbeat();
        assert_eq!(sink.metas().len(), baseline + 1);
    }

    #[test]
    fn line_count_carries_into_terminal_meta_between_beats() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = reporter(sink.clone());
        reporter.started("cat", None);
        std::thread::sleep(Duration::from_millis(25));
        reporter.line_heartbeat(3);
        // Inside the interval: recorded but not published.
        reporter.line_heartbeat(7);
        reporter.interrupted();

        let metas = sink.metas();
        assert_eq!(metas.last().unwrap().status, SessionStatus::Interrupted);
        assert_eq!(metas.last().unwrap().line_count, Some(7));
    }

    #[test]
    fn restart_issues_fresh_running_meta() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = reporter(sink.clone());
        reporter.started("cat --permission-mode plan", Some(true));
        reporter.restarted("cat", Some(false));

        let metas = sink.metas();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[1].status, SessionStatus::Running);
        assert_eq!(metas[1].command, "cat");
        assert_eq!(metas[1].plan_mode, Some(false));
    }
}
