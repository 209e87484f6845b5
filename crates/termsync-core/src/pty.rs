//! PTY-backed child process lifecycle.

use crate::{Result, TermsyncError};
use portable_pty::{native_pty_system, Child as PtyChild, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fixed window size for the supervised terminal.
pub const PTY_ROWS: u16 = 24;
pub const PTY_COLS: u16 = 80;

/// Environment variable carrying the session name into the child, so an
/// instrumented child can discover its own session identity.
pub const SESSION_ENV: &str = "TERMSYNC_SESSION";

/// Result of a timed read from the master side.
#[derive(Debug)]
pub enum PtyOutput {
    Data(Vec<u8>),
    Timeout,
    /// The slave side has been fully closed; benign end of stream.
    Eof,
}

enum ReaderEvent {
    Data(Vec<u8>),
    Failed(String),
}

/// One generation of the supervised pseudo-terminal: the master handle, the
/// child process, and the blocking reader thread that pumps child output
/// into a channel the supervisor can poll with a timeout.
pub struct PtySession {
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn PtyChild + Send + Sync>,
    reader: Option<std::thread::JoinHandle<()>>,
    output_rx: Receiver<ReaderEvent>,
    shutdown: Arc<AtomicBool>,
    exit_code: Option<i32>,
}

impl PtySession {
    /// Allocate a PTY pair, configure it raw at 24x80, and spawn `command`
    /// through `/bin/sh -c` in its own session with the slave as its
    /// standard streams.
    pub fn open(command: &str, name: &str) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows: PTY_ROWS,
            cols: PTY_COLS,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| TermsyncError::Pty(e.to_string()))?;

        // Raw mode so input bytes pass through exactly as sent. Claude-style
        // TUIs treat \r as submit and \n as newline, so CR/NL translation in
        // particular must stay off. The termios settings live on the pty
        // device, so applying them through the master fd configures the
        // slave side as well.
        #[cfg(unix)]
        if let Some(fd) = pair.master.as_raw_fd() {
            if let Err(e) = set_raw_mode(fd) {
                warn!(target: "termsync::pty", "Could not set PTY raw mode: {}", e);
            }
        }
        // Raw-mode transitions can clear prior size settings; re-apply.
        pair.master
            .resize(size)
            .map_err(|e| TermsyncError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new("/bin/sh");
        cmd.args(["-c", command]);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("COLUMNS", PTY_COLS.to_string());
        cmd.env("LINES", PTY_ROWS.to_string());
        cmd.env(SESSION_ENV, name);

        debug!(target: "termsync::pty", "Spawning child: {}", command);
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TermsyncError::SpawnFailed(e.to_string()))?;
        // Close the parent's slave handle; the child owns it now.
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TermsyncError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TermsyncError::Pty(e.to_string()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = shutdown.clone();
        let (tx, output_rx) = mpsc::channel();

        // PTY reads are blocking; dropping the writer and master unblocks
        // this thread with EIO when the session is torn down.
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                if shutdown_for_thread.load(Ordering::SeqCst) {
                    break;
                }
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(ReaderEvent::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if !shutdown_for_thread.load(Ordering::SeqCst) && !is_peer_closed(&e) {
                            let _ = tx.send(ReaderEvent::Failed(e.to_string()));
                        }
                        break;
                    }
                }
            }
            debug!(target: "termsync::pty", "PTY reader thread exiting");
        });

        Ok(Self {
            master: Some(pair.master),
            writer: Some(writer),
            child,
            reader: Some(handle),
            output_rx,
            shutdown,
            exit_code: None,
        })
    }

    /// Wait up to `timeout` for child output. Returns `Eof` once the reader
    /// thread has finished after the slave side closed; fatal read failures
    /// surface as `ReadFailed`.
    pub fn read(&mut self, timeout: Duration) -> Result<PtyOutput> {
        match self.output_rx.recv_timeout(timeout) {
            Ok(ReaderEvent::Data(data)) => Ok(PtyOutput::Data(data)),
            Ok(ReaderEvent::Failed(msg)) => Err(TermsyncError::ReadFailed(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(PtyOutput::Timeout),
            Err(RecvTimeoutError::Disconnected) => Ok(PtyOutput::Eof),
        }
    }

    /// Raw write to the master side.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TermsyncError::WriteFailed("session closed".to_string()))?;
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| TermsyncError::WriteFailed(e.to_string()))
    }

    /// Non-blocking liveness check; the exit code is cached once reaped.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        if self.exit_code.is_some() {
            return Ok(self.exit_code);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status.exit_code() as i32);
                Ok(self.exit_code)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TermsyncError::Pty(e.to_string())),
        }
    }

    /// Block until the child exits and return its code.
    pub fn wait(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self
            .child
            .wait()
            .map_err(|e| TermsyncError::Pty(e.to_string()))?;
        let code = status.exit_code() as i32;
        self.exit_code = Some(code);
        Ok(code)
    }

    /// Re-apply window-size metadata to the pty.
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        match self.master.as_ref() {
            Some(master) => master
                .resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| TermsyncError::Pty(e.to_string())),
            None => Err(TermsyncError::Pty("session closed".to_string())),
        }
    }

    /// Tear down this generation: signal the child's process group, wait up
    /// to `grace`, force-kill if still alive, reap, and join the reader
    /// thread. Calling on an already-terminated session is a no-op.
    pub fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.master.is_none() && self.writer.is_none() && self.reader.is_none() {
            return Ok(());
        }

        let pid = self.child.process_id();
        self.shutdown.store(true, Ordering::SeqCst);

        // Closing the master unblocks the reader thread's pending read.
        drop(self.writer.take());
        drop(self.master.take());

        if self.exit_code.is_none() {
            signal_group(pid, libc::SIGTERM);
            let deadline = Instant::now() + grace;
            loop {
                match self.child.try_wait() {
                    Ok(Some(status)) => {
                        self.exit_code = Some(status.exit_code() as i32);
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(target: "termsync::pty", "try_wait during terminate failed: {}", e);
                        break;
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }

            if self.exit_code.is_none() {
                debug!(target: "termsync::pty", "Grace period elapsed, force-killing child");
                signal_group(pid, libc::SIGKILL);
                match self.child.wait() {
                    Ok(status) => self.exit_code = Some(status.exit_code() as i32),
                    Err(e) => warn!(target: "termsync::pty", "Failed to reap child: {}", e),
                }
            }
        }

        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!(target: "termsync::pty", "PTY reader thread panicked");
            }
        }

        Ok(())
    }
}

/// Benign "slave side closed" errors that signal EOF rather than failure.
fn is_peer_closed(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO) || e.kind() == std::io::ErrorKind::UnexpectedEof
}

/// Signal the child's entire process group; the child runs detached in its
/// own session and may have spawned its own subprocesses.
fn signal_group(pid: Option<u32>, signal: i32) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, signal);
}

#[cfg(unix)]
fn set_raw_mode(fd: std::os::unix::io::RawFd) -> std::io::Result<()> {
    unsafe {
        let mut attrs: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut attrs) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut attrs);
        if libc::tcsetattr(fd, libc::TCSANOW, &attrs) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
