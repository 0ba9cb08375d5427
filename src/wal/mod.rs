//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Assign Log Sequence Numbers (LSN) in write order
//! - Append framed records, rotating and evicting segments as they fill
//! - Flush/fsync on demand and on a background timer
//! - Crash recovery and replay
//!
//! ## Lifecycle
//! ```text
//!   Created ──start()──▶ Running ──close()──▶ Closed
//!      └──────────────close()─────────────────▲
//! ```
//!
//! ## Concurrency Model
//! Every operation, the timer's periodic sync included, runs under a single
//! mutex. LSN order therefore equals write order.

mod recovery;
mod timer;

pub use recovery::{Recovery, RecoveryReport};

use std::path::Path;
#[cfg(test)]
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WalConfig;
use crate::error::{Result, WalError};
use crate::record::{LogRecord, Payload, TxnState};
use crate::segment::SegmentManager;

use timer::SyncTimer;

/// Lifecycle state of a WAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalState {
    /// Opened and recovered; timer not started
    Created,
    /// Timer running (if enabled)
    Running,
    /// Terminal: every operation fails with `WalError::Closed`
    Closed,
}

/// State shared with the timer thread
pub(crate) struct Shared {
    config: WalConfig,
    inner: Mutex<WalInner>,
    /// Completed periodic syncs
    #[cfg(test)]
    ticks: AtomicU64,
}

/// Everything guarded by the WAL lock
struct WalInner {
    /// `None` once closed
    manager: Option<SegmentManager>,
    /// LSN handed to the next append
    next_lsn: u64,
    state: WalState,
}

impl WalInner {
    fn manager_mut(&mut self) -> Result<&mut SegmentManager> {
        if self.state == WalState::Closed {
            return Err(WalError::Closed);
        }
        self.manager.as_mut().ok_or(WalError::Closed)
    }
}

impl Shared {
    /// Flush, and fsync when configured. Caller holds the lock.
    fn sync_locked(&self, inner: &mut WalInner) -> Result<()> {
        let fsync = self.config.fsync_on_sync;
        let segment = inner.manager_mut()?.active_mut();
        if fsync {
            segment.fsync()
        } else {
            segment.flush()
        }
    }
}

/// The write-ahead log engine
///
/// `Wal` is `Send + Sync`; share it across threads with an `Arc`.
pub struct Wal {
    shared: Arc<Shared>,
    /// Handle to the periodic sync thread, if running
    timer: Mutex<Option<SyncTimer>>,
}

impl Wal {
    /// Open the log and start the periodic sync timer
    pub fn open(config: WalConfig) -> Result<Self> {
        let wal = Self::new(config)?;
        wal.start()?;
        Ok(wal)
    }

    /// Open the log without starting the timer
    ///
    /// On startup:
    /// 1. Validate config and open the segment directory
    /// 2. Scan every segment to restore the next LSN
    /// 3. Drop a torn tail from the active segment so appends resume on a
    ///    frame boundary
    pub fn new(config: WalConfig) -> Result<Self> {
        config.validate()?;

        let mut manager = SegmentManager::open(&config.dir)?;

        let scans = recovery::scan_segments(&manager, |_| {})?;
        let mut last_lsn: Option<u64> = None;
        for scan in &scans {
            if let Some(lsn) = scan.last_lsn {
                manager.note_lsn(scan.sequence, lsn);
                last_lsn = Some(last_lsn.map_or(lsn, |last| last.max(lsn)));
            }
        }

        let active = manager.active().sequence();
        if let Some(scan) = scans.iter().find(|scan| scan.sequence == active && scan.torn) {
            warn!(
                sequence = active,
                from = manager.active().size(),
                to = scan.valid_len,
                "truncating torn tail of active segment"
            );
            manager.active_mut().truncate(scan.valid_len)?;
        }

        let next_lsn = last_lsn.map_or(0, |lsn| lsn + 1);
        info!(
            dir = %config.dir.display(),
            segments = manager.segment_count(),
            next_lsn,
            "WAL opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(WalInner {
                    manager: Some(manager),
                    next_lsn,
                    state: WalState::Created,
                }),
                #[cfg(test)]
                ticks: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
        })
    }

    /// Start the periodic sync timer (if enabled) and enter `Running`
    ///
    /// Calling this on a running WAL is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            WalState::Closed => return Err(WalError::Closed),
            WalState::Running => return Ok(()),
            WalState::Created => {}
        }

        if self.shared.config.periodic_sync {
            let timer = SyncTimer::spawn(
                Arc::downgrade(&self.shared),
                self.shared.config.sync_interval,
            )?;
            *self.timer.lock() = Some(timer);
        }

        inner.state = WalState::Running;
        Ok(())
    }

    /// Append a record, returning its LSN
    ///
    /// Rotates first if the record would push the active segment past the
    /// rotation threshold, then applies retention. An oversized record still
    /// lands in an empty segment.
    ///
    /// The LSN is only taken once the frame is written. If a failed write
    /// cannot be rolled back the WAL closes itself.
    pub fn append(&self, payload: Payload, transaction_id: Uuid, state: TxnState) -> Result<u64> {
        let config = &self.shared.config;
        let mut inner = self.shared.inner.lock();
        inner.manager_mut()?;

        let lsn = inner.next_lsn;
        let bytes = LogRecord::new(lsn, transaction_id, state, payload).encode()?;

        let manager = inner.manager_mut()?;
        let size = manager.active().size();
        if size > 0 && size + bytes.len() as u64 > config.rotation_threshold {
            manager.rotate()?;
            manager.enforce_retention(config.max_segments)?;
        }

        if let Err(e) = manager.active_mut().append(&bytes) {
            if manager.active().is_poisoned() {
                error!(error = %e, lsn, "append could not be undone, closing WAL");
                inner.manager = None;
                inner.state = WalState::Closed;
            }
            return Err(e);
        }
        manager.record_lsn(lsn);
        inner.next_lsn += 1;
        Ok(lsn)
    }

    /// Append a BEGIN record
    pub fn append_begin(&self, payload: Payload, transaction_id: Uuid) -> Result<u64> {
        self.append(payload, transaction_id, TxnState::Begin)
    }

    /// Flush the active segment, fsync when configured
    ///
    /// Also restarts the timer countdown.
    pub fn sync(&self) -> Result<()> {
        let synced = {
            let mut inner = self.shared.inner.lock();
            self.shared.sync_locked(&mut inner)
        };

        if let Some(timer) = self.timer.lock().as_ref() {
            timer.reschedule();
        }

        synced?;
        debug!("manual sync");
        Ok(())
    }

    /// Every valid record in LSN order
    pub fn read_entries(&self) -> Result<Vec<LogRecord>> {
        Ok(self.recover()?.records)
    }

    /// Flush, then replay every segment
    ///
    /// A torn trailing frame ends a segment cleanly; a corrupt complete frame
    /// aborts with `WalError::Corruption`.
    pub fn recover(&self) -> Result<Recovery> {
        let mut inner = self.shared.inner.lock();
        let manager = inner.manager_mut()?;
        manager.active_mut().flush()?;

        let replayed = recovery::replay(manager)?;
        info!(
            records = replayed.report.records_recovered,
            segments = replayed.report.segments_scanned,
            last_lsn = ?replayed.report.last_lsn,
            torn_tail = replayed.report.torn_tail,
            "WAL replayed"
        );
        Ok(replayed)
    }

    /// Delete historical segments whose records all have LSN ≤ `lsn`
    ///
    /// Call once everything up to `lsn` is durable elsewhere. Returns the
    /// deleted sequence numbers.
    pub fn checkpoint(&self, lsn: u64) -> Result<Vec<u64>> {
        let mut inner = self.shared.inner.lock();
        let manager = inner.manager_mut()?;
        manager.active_mut().flush()?;
        manager.truncate_through(lsn)
    }

    /// Stop the timer, sync a final time and release every handle
    pub fn close(&self) -> Result<()> {
        // Join outside the WAL lock: the timer may be waiting on it
        let timer = self.timer.lock().take();
        let stopped = timer.map_or(Ok(()), SyncTimer::stop);

        let mut inner = self.shared.inner.lock();
        let synced = self.shared.sync_locked(&mut inner);
        let manager = inner.manager.take();
        inner.state = WalState::Closed;
        drop(inner);

        stopped?;
        synced?;
        if let Some(manager) = manager {
            manager.close()?;
        }

        info!(dir = %self.shared.config.dir.display(), "WAL closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> WalState {
        self.shared.inner.lock().state
    }

    /// LSN the next append will receive
    pub fn next_lsn(&self) -> u64 {
        self.shared.inner.lock().next_lsn
    }

    /// Highest LSN assigned so far
    pub fn last_lsn(&self) -> Option<u64> {
        self.next_lsn().checked_sub(1)
    }

    /// Live segment sequence numbers, ascending
    pub fn segments(&self) -> Result<Vec<u64>> {
        let mut inner = self.shared.inner.lock();
        Ok(inner.manager_mut()?.list_segments())
    }

    pub fn dir(&self) -> &Path {
        &self.shared.config.dir
    }

    pub fn config(&self) -> &WalConfig {
        &self.shared.config
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if self.state() != WalState::Closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "failed to close WAL on drop");
            }
            return;
        }

        // A poisoned WAL closes itself but leaves the timer to us
        if let Some(timer) = self.timer.get_mut().take() {
            if let Err(e) = timer.stop() {
                warn!(error = %e, "failed to stop sync timer on drop");
            }
        }
    }
}
