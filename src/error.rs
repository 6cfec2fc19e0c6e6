//! Error taxonomy for the control plane.
//!
//! Per the failure policy, no error crosses a component boundary: every
//! worker loop catches its own `thiserror` enum at loop scope and degrades
//! (log + skip/keep-old-data) rather than propagating. `anyhow` is reserved
//! for the outermost supervision boundary in `main`.

use thiserror::Error;

/// Errors from the upstream platform HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {endpoint} was not valid JSON: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upstream returned non-zero code {code}: {message}")]
    UpstreamCode { code: i32, message: String },
}

/// Errors decoding fixed-layout binary frames (BMC, chassis controller,
/// command dispatcher, HA).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame too short: need at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("bad magic: expected {expected:#06x}, got {actual:#06x}")]
    BadMagic { expected: u16, actual: u16 },
    #[error("bad trailer: expected {expected:#06x}, got {actual:#06x}")]
    BadTrailer { expected: u16, actual: u16 },
    #[error("bad message type: expected {expected:#06x}, got {actual:#06x}")]
    BadMsgType { expected: u16, actual: u16 },
    #[error("declared length {declared} does not match expected {expected}")]
    LengthMismatch { declared: usize, expected: usize },
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
}

/// Result of a chassis controller TCP request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChassisControlError {
    #[error("network error talking to {0}")]
    Network(String),
    #[error("timed out waiting for chassis at {0}")]
    Timeout(String),
    #[error("response from chassis at {0} was malformed")]
    InvalidResponse(String),
}

/// Repository-local errors (never surfaced past the repository boundary
/// except to report "not found" to a caller who asked for a specific key).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("chassis {0} not found")]
    ChassisNotFound(u32),
    #[error("slot {0} is out of range 1..14")]
    SlotOutOfRange(u32),
    #[error("stack {0} not found")]
    StackNotFound(uuid::Uuid),
}

/// Configuration loading degrades to defaults; this error is only used for
/// the warn-log, never propagated to callers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
