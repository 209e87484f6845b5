//! The session supervisor: one blocking loop multiplexing child output, the
//! external input queue and the control queue against a single PTY session
//! generation.

use crate::encoder::{decode, encode, DecodedInput, InputStyle};
use crate::pty::{PtyOutput, PtySession};
use crate::queue::{ControlQueue, SequencedEventQueue};
use crate::reporter::StatusReporter;
use crate::sink::SessionSink;
use crate::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Payload intercepted by the supervisor as a restart trigger; never written
/// to the child.
const CLEAR_COMMAND: &str = "/clear";

/// Flag token removed from the command line when plan mode is disabled.
/// Substring removal matches the legacy behavior exactly; a differently
/// formatted flag passes through untouched.
const PLAN_FLAG: &str = " --permission-mode plan";

/// Command line for a plan-mode-change restart. Plan-enabled reconstructs
/// the original command unmodified; plan-disabled strips the plan flag.
pub fn restart_command(original: &str, plan_enabled: bool) -> String {
    if plan_enabled {
        original.to_string()
    } else {
        original.replace(PLAN_FLAG, "")
    }
}

/// How a supervised session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The child exited on its own with this code.
    Exited(i32),
    /// An external interrupt requested a controlled shutdown.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Shell command line to supervise.
    pub command: String,
    /// Session name, published to the child environment and the sink namespace.
    pub name: String,
    /// Mirror output lines to the external sink.
    pub mirror_lines: bool,
    pub input_style: InputStyle,
    /// Sole blocking point of the loop: the timed read on the master side.
    pub poll_interval: Duration,
    /// Pause after each payload before the submit CR (or the next event).
    pub settle_delay: Duration,
    /// Inter-character delay for [`InputStyle::Type`].
    pub keystroke_delay: Duration,
    /// Grace period between SIGTERM and SIGKILL when tearing down a child.
    pub grace: Duration,
}

impl SupervisorConfig {
    pub fn new(command: &str, name: &str) -> Self {
        Self {
            command: command.to_string(),
            name: name.to_string(),
            mirror_lines: false,
            input_style: InputStyle::Paste,
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(100),
            keystroke_delay: Duration::from_millis(30),
            grace: Duration::from_secs(5),
        }
    }
}

/// Supervises exactly one child process generation at a time.
pub struct Supervisor {
    config: SupervisorConfig,
    /// Command of the live generation; differs from `config.command` after a
    /// plan-disabled restart.
    current_command: String,
    plan_mode: Option<bool>,
    inputs: Arc<SequencedEventQueue>,
    controls: Arc<ControlQueue>,
    sink: Arc<dyn SessionSink>,
    reporter: StatusReporter,
    local: Box<dyn Write + Send>,
    shutdown: Arc<AtomicBool>,
    lines: LineAssembler,
    line_idx: u64,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        inputs: Arc<SequencedEventQueue>,
        controls: Arc<ControlQueue>,
        sink: Arc<dyn SessionSink>,
        local: Box<dyn Write + Send>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let reporter = StatusReporter::new(sink.clone(), &config.command);
        let current_command = config.command.clone();
        Self {
            config,
            current_command,
            plan_mode: None,
            inputs,
            controls,
            sink,
            reporter,
            local,
            shutdown,
            lines: LineAssembler::default(),
            line_idx: 0,
        }
    }

    /// Run the session to completion. Returns the outcome, or an error on
    /// spawn failure or a fatal PTY read failure (both published as `error`
    /// meta before propagating).
    pub fn run(mut self) -> Result<SessionOutcome> {
        info!(
            target: "termsync::supervisor",
            "Starting session '{}': {}", self.config.name, self.config.command
        );
        let command = self.current_command.clone();
        self.reporter.started(&command, self.plan_mode);
        let mut session = self.open_session(&command)?;
        let mut exit_code: Option<i32> = None;

        let outcome = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!(target: "termsync::supervisor", "Interrupt received, shutting down");
                session.terminate(self.config.grace)?;
                break SessionOutcome::Interrupted;
            }

            if exit_code.is_none() {
                exit_code = session.try_wait()?;
            }

            if let Some(plan) = self.controls.drain() {
                info!(target: "termsync::supervisor", "Plan mode changed: {}", plan);
                self.plan_mode = Some(plan);
                let command = restart_command(&self.config.command, plan);
                session = self.restart(session, command)?;
                exit_code = None;
                continue;
            }

            let mut restarted = false;
            for raw_value in self.inputs.drain() {
                let input = decode(&raw_value);
                if input.payload.is_empty() {
                    continue;
                }
                if input.payload == CLEAR_COMMAND {
                    let command = self.current_command.clone();
                    session = self.restart(session, command)?;
                    exit_code = None;
                    restarted = true;
                    break;
                }
                debug!(
                    target: "termsync::supervisor",
                    "Injecting input ({} bytes, enter={}, raw={})",
                    input.payload.len(), input.send_enter, input.raw_mode
                );
                self.deliver(&mut session, &input);
            }
            if restarted {
                continue;
            }

            match session.read(self.config.poll_interval) {
                Ok(PtyOutput::Data(bytes)) => {
                    // A dead local console is as fatal as a dead PTY: the
                    // child must not keep running unobserved.
                    if let Err(e) = self.forward(&bytes) {
                        error!(target: "termsync::supervisor", "Local output write failed: {}", e);
                        let _ = session.terminate(self.config.grace);
                        self.reporter.failed(&e.to_string());
                        return Err(e);
                    }
                }
                Ok(PtyOutput::Timeout) => {
                    // Child gone and nothing left to read.
                    if let Some(code) = exit_code {
                        break SessionOutcome::Exited(code);
                    }
                }
                Ok(PtyOutput::Eof) => {
                    let code = match exit_code {
                        Some(code) => code,
                        None => session.wait()?,
                    };
                    break SessionOutcome::Exited(code);
                }
                Err(e) => {
                    error!(target: "termsync::supervisor", "Fatal PTY read failure: {}", e);
                    let _ = session.terminate(self.config.grace);
                    self.reporter.failed(&e.to_string());
                    return Err(e);
                }
            }

            self.reporter.heartbeat();
            if self.config.mirror_lines {
                self.reporter.line_heartbeat(self.line_idx);
            }
        };

        if self.config.mirror_lines {
            self.flush_fragment();
            self.reporter.line_heartbeat(self.line_idx);
        }

        match outcome {
            SessionOutcome::Exited(code) => {
                session.terminate(self.config.grace)?;
                info!(target: "termsync::supervisor", "Child exited with code {}", code);
                self.reporter.finished(code);
            }
            SessionOutcome::Interrupted => {
                self.reporter.interrupted();
            }
        }
        Ok(outcome)
    }

    fn open_session(&mut self, command: &str) -> Result<PtySession> {
        PtySession::open(command, &self.config.name).inspect_err(|e| {
            error!(target: "termsync::supervisor", "Failed to start child: {}", e);
            self.reporter.failed(&e.to_string());
        })
    }

    /// Orchestrated restart: destroy the live generation, reset both event
    /// intakes and the external input state, publish a fresh running meta,
    /// then open the replacement. No queued event is processed in between.
    fn restart(&mut self, mut session: PtySession, command: String) -> Result<PtySession> {
        info!(target: "termsync::supervisor", "Restarting session: {}", command);
        session.terminate(self.config.grace)?;
        self.inputs.reset();
        self.controls.reset();
        if let Err(e) = self.sink.clear_input() {
            warn!(target: "termsync::supervisor", "Could not clear external input state: {}", e);
        }
        self.lines.discard();
        self.reporter.restarted(&command, self.plan_mode);
        let next = self.open_session(&command)?;
        self.current_command = command;
        Ok(next)
    }

    /// Write one decoded input to the child, respecting the settle/enter
    /// timing. Write failures are transient: log, drop the event, keep going.
    fn deliver(&mut self, session: &mut PtySession, input: &DecodedInput) {
        let written = if !input.raw_mode && self.config.input_style == InputStyle::Type {
            self.type_out(session, &input.payload)
        } else {
            session.write(&encode(input))
        };
        if let Err(e) = written {
            warn!(target: "termsync::supervisor", "Dropping input event after write failure: {}", e);
            return;
        }

        // Let the child render (e.g. an input field appearing) before the
        // submit keystroke or the next event arrives.
        std::thread::sleep(self.config.settle_delay);
        if input.send_enter {
            if let Err(e) = session.write(b"\r") {
                warn!(target: "termsync::supervisor", "Enter keystroke failed: {}", e);
            }
        }
    }

    /// Per-character delivery for TUIs that mishandle bulk paste.
    fn type_out(&self, session: &mut PtySession, payload: &str) -> Result<()> {
        let payload = payload.trim_end_matches(['\r', '\n']);
        let mut utf8 = [0u8; 4];
        let mut chars = payload.chars().peekable();
        while let Some(ch) = chars.next() {
            session.write(ch.encode_utf8(&mut utf8).as_bytes())?;
            if chars.peek().is_some() {
                std::thread::sleep(self.config.keystroke_delay);
            }
        }
        Ok(())
    }

    /// Forward child output verbatim to the local console and, when
    /// mirroring, as indexed lines to the external sink.
    fn forward(&mut self, bytes: &[u8]) -> Result<()> {
        self.local.write_all(bytes)?;
        self.local.flush()?;
        if self.config.mirror_lines && !bytes.is_empty() {
            let text = String::from_utf8_lossy(bytes);
            for line in self.lines.push(&text) {
                self.reporter.line(self.line_idx, &line);
                self.line_idx += 1;
            }
        }
        Ok(())
    }

    /// Publish any unterminated trailing fragment as a final line.
    fn flush_fragment(&mut self) {
        let fragment = self.lines.take_remainder();
        let fragment = fragment.trim();
        if !fragment.is_empty() {
            self.reporter.line(self.line_idx, fragment);
            self.line_idx += 1;
        }
    }
}

/// Splits a byte stream into physical lines, buffering the unterminated tail
/// across reads.
#[derive(Debug, Default)]
struct LineAssembler {
    buf: String,
}

impl LineAssembler {
    /// Append a chunk and return the complete lines it closed, each with the
    /// trailing `\n` removed and one trailing `\r` trimmed.
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let mut line: String = self.buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    /// Drop buffered output from a generation that is being torn down.
    fn discard(&mut self) {
        self.buf.clear();
    }
}
