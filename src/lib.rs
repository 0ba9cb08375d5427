//! # segwal
//!
//! A segmented write-ahead log for transaction state records with:
//! - CRC32-checked, length-prefixed record frames
//! - Size-based segment rotation and count-based retention
//! - Scheduled flush/fsync on a background timer
//! - Crash recovery with torn-write handling
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Embedding process (callers)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ append / sync / recover
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Wal                                 │
//! │          (LSN counter + one mutex + sync timer)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌────────────────┐
//!   │  LogRecord  │          │ SegmentManager │
//!   │   (codec)   │          │  (rotation)    │
//!   └─────────────┘          └───────┬────────┘
//!                                    │
//!                                    ▼
//!                            ┌──────────────┐
//!                            │   Segments   │
//!                            │ 00000000.log │
//!                            └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segwal::{Payload, TxnState, Wal, WalConfig};
//! use uuid::Uuid;
//!
//! # fn main() -> segwal::Result<()> {
//! let wal = Wal::open(WalConfig::builder("./wal").build())?;
//! let txn = Uuid::new_v4();
//!
//! wal.append(Payload::new(), txn, TxnState::Begin)?;
//! wal.append(Payload::new().with("k", "v"), txn, TxnState::Commit)?;
//! wal.sync()?;
//!
//! for record in wal.read_entries()? {
//!     println!("{} {} {}", record.lsn, record.transaction_id, record.state);
//! }
//! wal.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{WalConfig, WalConfigBuilder};
pub use error::{Result, WalError};
pub use record::{LogRecord, Payload, TxnState, Value};
pub use wal::{Recovery, RecoveryReport, Wal, WalState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of segwal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
