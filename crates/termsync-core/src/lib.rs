//! Core PTY supervision for termsync.

mod encoder;
mod error;
mod meta;
mod pty;
mod queue;
mod reporter;
mod sink;
mod supervisor;

pub use encoder::{decode, encode, DecodedInput, InputStyle, PASTE_END, PASTE_START};
pub use error::TermsyncError;
pub use meta::{now_ms, SessionMeta, SessionStatus};
pub use pty::{PtyOutput, PtySession};
pub use queue::{ControlQueue, SequencedEventQueue};
pub use reporter::StatusReporter;
pub use sink::{MemorySink, SessionSink};
pub use supervisor::{restart_command, SessionOutcome, Supervisor, SupervisorConfig};

/// Result type for termsync operations.
pub type Result<T> = std::result::Result<T, TermsyncError>;
