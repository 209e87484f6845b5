//! Wire format for externally-sourced input events.
//!
//! The transport has no exactly-once semantics, so senders prefix every
//! payload with a unix-timestamp discriminator: `"<ts>:<payload>"` lets the
//! same payload be sent twice under distinct values. Up to two flag tokens
//! may trail the payload (`:noenter`, `:raw`, either order). The timestamp
//! and the flags are wire artifacts only; everything downstream of `decode`
//! works with [`DecodedInput`].

/// Bracketed paste start marker.
pub const PASTE_START: &[u8] = b"\x1b[200~";
/// Bracketed paste end marker.
pub const PASTE_END: &[u8] = b"\x1b[201~";

const FLAG_NOENTER: &str = "noenter";
const FLAG_RAW: &str = "raw";

/// An input event with the wire framing stripped off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    pub payload: String,
    /// Write a synthetic carriage return after the payload settles.
    pub send_enter: bool,
    /// Pass the payload through verbatim instead of as a bracketed paste.
    pub raw_mode: bool,
}

/// How non-raw payloads are delivered to the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputStyle {
    /// Wrap the payload in bracketed-paste markers and write it at once.
    #[default]
    Paste,
    /// Write the payload one character at a time with a keystroke delay,
    /// mimicking real typing for TUIs that mishandle bulk paste.
    Type,
}

impl std::str::FromStr for InputStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paste" => Ok(InputStyle::Paste),
            "type" => Ok(InputStyle::Type),
            _ => Err(format!("Invalid input style: '{}'. Use 'paste' or 'type'.", s)),
        }
    }
}

/// Decode a raw wire value into payload and flags.
///
/// The leading segment is treated as a discardable timestamp only when it is
/// all digits and a separator is present; otherwise the whole value is a
/// literal payload. Flag tokens are popped from the right while present,
/// stopping at the first non-flag token, and only when a timestamp prefix was
/// recognized.
pub fn decode(raw_value: &str) -> DecodedInput {
    let mut send_enter = true;
    let mut raw_mode = false;

    let mut segments: Vec<&str> = raw_value.split(':').collect();
    let timestamped =
        segments.len() > 1 && !segments[0].is_empty() && segments[0].bytes().all(|b| b.is_ascii_digit());

    if timestamped {
        segments.remove(0);
        for _ in 0..2 {
            match segments.last().copied() {
                Some(FLAG_NOENTER) => {
                    send_enter = false;
                    segments.pop();
                }
                Some(FLAG_RAW) => {
                    raw_mode = true;
                    segments.pop();
                }
                _ => break,
            }
        }
    }

    DecodedInput {
        payload: segments.join(":"),
        send_enter,
        raw_mode,
    }
}

/// Encode a decoded input for transmission to the child.
///
/// Trailing line endings are stripped first; the submit carriage return is
/// the supervisor's job and is written as a separate event after the settle
/// delay.
pub fn encode(input: &DecodedInput) -> Vec<u8> {
    let payload = input.payload.trim_end_matches(['\r', '\n']);
    if input.raw_mode {
        return payload.as_bytes().to_vec();
    }
    let mut bytes = Vec::with_capacity(PASTE_START.len() + payload.len() + PASTE_END.len());
    bytes.extend_from_slice(PASTE_START);
    bytes.extend_from_slice(payload.as_bytes());
    bytes.extend_from_slice(PASTE_END);
    bytes
}
