//! Log Record Module
//!
//! One framed, checksummed record per transaction state transition.
//!
//! ## Responsibilities
//! - Define the record, its state tag and its payload
//! - Encode/decode a single frame with CRC32 validation
//! - Stream frames lazily out of a segment file
//!
//! ## Frame Format (big-endian)
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────┬───────────┬───────────┐
//! │ Len (4) │ CRC (4) │ LSN (8) │ Txn ID (16)  │ State (1) │ Payload   │
//! └─────────┴─────────┴─────────┴──────────────┴───────────┴───────────┘
//!             └──────────── Len covers everything right of it ─────────┘
//!                       └──────── CRC covers the frame ────────────────┘
//! ```

mod codec;
mod payload;
mod stream;

pub use codec::{
    decode, CRC_SIZE, FIXED_FRAME_SIZE, HEADER_SIZE, LENGTH_PREFIX_SIZE, MIN_RECORD_LEN,
};
pub use payload::{Payload, Value};
pub use stream::RecordStream;

use std::fmt;

use uuid::Uuid;

/// Transaction state carried by a record
///
/// Wire values are frozen for on-disk compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxnState {
    #[default]
    Begin = 0,
    Commit = 1,
    Abort = 2,
}

impl TxnState {
    /// Wire tag
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag, `None` for unknown values
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TxnState::Begin),
            1 => Some(TxnState::Commit),
            2 => Some(TxnState::Abort),
            _ => None,
        }
    }

    /// True once the transaction can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(self, TxnState::Commit | TxnState::Abort)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnState::Begin => write!(f, "BEGIN"),
            TxnState::Commit => write!(f, "COMMIT"),
            TxnState::Abort => write!(f, "ABORT"),
        }
    }
}

/// A single record in the WAL
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Transaction this record belongs to
    pub transaction_id: Uuid,

    /// State transition being logged
    pub state: TxnState,

    /// Opaque, caller-defined payload
    pub payload: Payload,
}

impl LogRecord {
    pub fn new(lsn: u64, transaction_id: Uuid, state: TxnState, payload: Payload) -> Self {
        Self {
            lsn,
            transaction_id,
            state,
            payload,
        }
    }
}
