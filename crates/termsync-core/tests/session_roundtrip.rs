//! End-to-end tests against real PTYs. Unix-only.
#![cfg(unix)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use termsync_core::{
    ControlQueue, MemorySink, PtyOutput, PtySession, SequencedEventQueue, SessionOutcome,
    SessionStatus, Supervisor, SupervisorConfig,
};

/// Local output sink whose contents the test can observe.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

struct Harness {
    inputs: Arc<SequencedEventQueue>,
    controls: Arc<ControlQueue>,
    sink: Arc<MemorySink>,
    shutdown: Arc<AtomicBool>,
    local: SharedBuf,
}

impl Harness {
    fn new() -> Self {
        Self {
            inputs: Arc::new(SequencedEventQueue::new()),
            controls: Arc::new(ControlQueue::new()),
            sink: Arc::new(MemorySink::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            local: SharedBuf::default(),
        }
    }

    fn spawn(
        &self,
        config: SupervisorConfig,
    ) -> std::thread::JoinHandle<termsync_core::Result<SessionOutcome>> {
        let supervisor = Supervisor::new(
            config,
            self.inputs.clone(),
            self.controls.clone(),
            self.sink.clone(),
            Box::new(self.local.clone()),
            self.shutdown.clone(),
        );
        std::thread::spawn(move || supervisor.run())
    }

    fn running_meta_count(&self) -> usize {
        self.sink
            .metas()
            .iter()
            .filter(|m| m.status == SessionStatus::Running)
            .count()
    }
}

#[test]
fn cat_echoes_written_bytes_back_through_the_pty() {
    let mut session = PtySession::open("cat", "pty-test").expect("spawn cat");
    session.write(b"ping\r").expect("write");

    let mut seen = String::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && !seen.contains("ping") {
        match session.read(Duration::from_millis(100)).expect("read") {
            PtyOutput::Data(bytes) => seen.push_str(&String::from_utf8_lossy(&bytes)),
            PtyOutput::Timeout => {}
            PtyOutput::Eof => break,
        }
    }
    assert!(seen.contains("ping"), "cat output was: {:?}", seen);

    session.terminate(Duration::from_secs(1)).expect("terminate");
    // Idempotent.
    session.terminate(Duration::from_secs(1)).expect("re-terminate");
}

#[test]
fn resize_applies_to_a_live_session() {
    let mut session = PtySession::open("cat", "pty-test").expect("spawn cat");
    session.resize(40, 100).expect("resize");
    session.terminate(Duration::from_secs(1)).expect("terminate");
    assert!(session.resize(24, 80).is_err());
}

#[test]
fn child_exit_code_reaches_the_terminal_meta() {
    let harness = Harness::new();
    let handle = harness.spawn(SupervisorConfig::new("exit 2", "exit-test"));
    let outcome = handle.join().unwrap().expect("supervisor run");
    assert_eq!(outcome, SessionOutcome::Exited(2));

    let metas = harness.sink.metas();
    let last = metas.last().expect("terminal meta");
    assert_eq!(last.status, SessionStatus::Error);
    assert_eq!(last.exit_code, Some(2));
}

#[test]
fn zero_exit_completes() {
    let harness = Harness::new();
    let handle = harness.spawn(SupervisorConfig::new("exit 0", "exit-test"));
    assert_eq!(
        handle.join().unwrap().expect("supervisor run"),
        SessionOutcome::Exited(0)
    );
    let metas = harness.sink.metas();
    assert_eq!(metas.last().unwrap().status, SessionStatus::Completed);
    assert_eq!(metas.last().unwrap().exit_code, Some(0));
}

#[test]
fn queued_input_reaches_the_child_and_interrupt_shuts_down() {
    let harness = Harness::new();
    let handle = harness.spawn(SupervisorConfig::new("cat", "input-test"));

    harness.inputs.admit(1, "1735012345:ping".to_string());
    let local = harness.local.clone();
    assert!(
        wait_for(Duration::from_secs(5), || local.contents().contains("ping")),
        "child never echoed the injected input; local output: {:?}",
        local.contents()
    );

    harness.shutdown.store(true, Ordering::SeqCst);
    let outcome = handle.join().unwrap().expect("supervisor run");
    assert_eq!(outcome, SessionOutcome::Interrupted);
    assert_eq!(
        harness.sink.metas().last().unwrap().status,
        SessionStatus::Interrupted
    );
}

#[test]
fn clear_restarts_into_a_fresh_generation() {
    let harness = Harness::new();
    let handle = harness.spawn(SupervisorConfig::new("cat", "clear-test"));

    harness.inputs.admit(7, "/clear".to_string());
    let h = &harness;
    assert!(
        wait_for(Duration::from_secs(10), || h.running_meta_count() >= 2),
        "no restart observed; metas: {:?}",
        harness.sink.metas()
    );

    // The sequence index returned to the unseen state and external input
    // state was cleared.
    assert_eq!(harness.inputs.last_seen(), None);
    assert!(harness.sink.input_clears() >= 1);

    // The restarted generation still accepts input, including a previously
    // seen index.
    harness.inputs.admit(1, "1735012345:again".to_string());
    let local = harness.local.clone();
    assert!(
        wait_for(Duration::from_secs(5), || local.contents().contains("again")),
        "restarted child never echoed input"
    );

    harness.shutdown.store(true, Ordering::SeqCst);
    assert_eq!(
        handle.join().unwrap().expect("supervisor run"),
        SessionOutcome::Interrupted
    );
}

#[test]
fn plan_mode_toggle_restarts_with_stripped_command() {
    let harness = Harness::new();
    // The command sleeps so the first generation stays alive until toggled.
    let handle = harness.spawn(SupervisorConfig::new(
        "sleep 30 --permission-mode plan 2>/dev/null || sleep 30",
        "plan-test",
    ));

    // First notification is the subscription snapshot and must be discarded.
    harness.controls.admit(true);
    harness.controls.admit(false);

    let h = &harness;
    assert!(
        wait_for(Duration::from_secs(10), || h.running_meta_count() >= 2),
        "no plan-mode restart observed; metas: {:?}",
        harness.sink.metas()
    );
    let metas = harness.sink.metas();
    let restarted = metas
        .iter()
        .filter(|m| m.status == SessionStatus::Running)
        .next_back()
        .unwrap();
    assert!(!restarted.command.contains("--permission-mode plan"));
    assert_eq!(restarted.plan_mode, Some(false));

    harness.shutdown.store(true, Ordering::SeqCst);
    assert_eq!(
        handle.join().unwrap().expect("supervisor run"),
        SessionOutcome::Interrupted
    );
}

/// Local console that rejects every write.
struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("console gone"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn local_console_failure_terminates_the_child_with_error_meta() {
    let sink = Arc::new(MemorySink::new());
    let supervisor = Supervisor::new(
        SupervisorConfig::new("echo hi; sleep 30", "console-test"),
        Arc::new(SequencedEventQueue::new()),
        Arc::new(ControlQueue::new()),
        sink.clone(),
        Box::new(FailingWriter),
        Arc::new(AtomicBool::new(false)),
    );
    let handle = std::thread::spawn(move || supervisor.run());

    // The failed write must tear the session down, not leave the 30s child
    // running behind a dead console.
    let result = handle.join().unwrap();
    assert!(result.is_err(), "got: {:?}", result);

    let metas = sink.metas();
    let last = metas.last().expect("terminal meta");
    assert_eq!(last.status, SessionStatus::Error);
    assert!(last.error.is_some(), "meta: {:?}", last);
}

#[test]
fn single_plan_toggle_after_clear_restart_is_delivered() {
    let harness = Harness::new();
    let handle = harness.spawn(SupervisorConfig::new("cat", "toggle-after-clear"));

    harness.controls.admit(false); // subscription snapshot
    harness.inputs.admit(1, "/clear".to_string());
    let h = &harness;
    assert!(
        wait_for(Duration::from_secs(10), || h.running_meta_count() >= 2),
        "no clear restart observed; metas: {:?}",
        harness.sink.metas()
    );

    // One genuine toggle, no double-send, must restart the session again.
    harness.controls.admit(true);
    assert!(
        wait_for(Duration::from_secs(10), || h.running_meta_count() >= 3),
        "plan toggle was swallowed after the restart; metas: {:?}",
        harness.sink.metas()
    );
    let metas = harness.sink.metas();
    let last_running = metas
        .iter()
        .filter(|m| m.status == SessionStatus::Running)
        .next_back()
        .unwrap();
    assert_eq!(last_running.plan_mode, Some(true));

    harness.shutdown.store(true, Ordering::SeqCst);
    assert_eq!(
        handle.join().unwrap().expect("supervisor run"),
        SessionOutcome::Interrupted
    );
}

#[test]
fn clear_against_a_dead_child_spawns_exactly_one_replacement() {
    let harness = Harness::new();
    let mut config = SupervisorConfig::new("sleep 0.2", "clear-dead-test");
    // The long settle keeps the loop busy past the child's lifetime, so the
    // queued /clear is processed after the exit.
    config.settle_delay = Duration::from_secs(1);
    let handle = harness.spawn(config);

    harness.inputs.admit(1, "1735012345:hold:noenter".to_string());
    harness.inputs.admit(2, "/clear".to_string());

    let outcome = handle.join().unwrap().expect("supervisor run");
    assert_eq!(outcome, SessionOutcome::Exited(0));

    // One fresh generation, which then ran to completion on its own.
    assert_eq!(harness.running_meta_count(), 2);
    assert_eq!(
        harness.sink.metas().last().unwrap().status,
        SessionStatus::Completed
    );
}

#[test]
fn mirrored_lines_are_indexed_without_gaps() {
    let harness = Harness::new();
    let mut config = SupervisorConfig::new("echo one; echo two; sleep 1", "mirror-test");
    config.mirror_lines = true;
    let handle = harness.spawn(config);

    let outcome = handle.join().unwrap().expect("supervisor run");
    assert_eq!(outcome, SessionOutcome::Exited(0));

    let lines = harness.sink.lines();
    let texts: Vec<&str> = lines.iter().map(|(_, t)| t.as_str()).collect();
    assert!(texts.contains(&"one"), "lines: {:?}", lines);
    assert!(texts.contains(&"two"), "lines: {:?}", lines);
    for (expected, (index, _)) in lines.iter().enumerate() {
        assert_eq!(*index, expected as u64);
    }

    let last = harness.sink.metas().last().unwrap().clone();
    assert_eq!(last.status, SessionStatus::Completed);
    assert_eq!(last.line_count, Some(lines.len() as u64));
}
