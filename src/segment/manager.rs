//! Segment Manager
//!
//! Owns the ordered set of segments and decides which one receives appends.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Keep exactly one active segment (the highest sequence)
//! - Rotate to a fresh segment on demand
//! - Evict old segments by count (retention) or by LSN (checkpoint)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, WalError};

use super::{parse_sequence, segment_path, Segment, SegmentReader};

/// Manages the segment files of one WAL directory
///
/// ## Invariants:
/// - Sequence numbers are gapless and increasing
/// - The active segment has the highest sequence number
/// - The active segment is never deleted
pub struct SegmentManager {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Every live segment, oldest first, with the highest LSN written to it
    segments: BTreeMap<u64, Option<u64>>,

    /// Target of all appends
    active: Segment,
}

impl SegmentManager {
    /// Open or create the segment directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing segment files
    /// 3. Reject gaps in the numbering
    /// 4. Open the highest as active, or create segment 0
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut sequences: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() {
                if let Some(sequence) = parse_sequence(&path) {
                    sequences.push(sequence);
                }
            }
        }
        sequences.sort_unstable();

        if let Some(pair) = sequences.windows(2).find(|w| w[1] != w[0] + 1) {
            return Err(WalError::corruption(
                0,
                format!("missing segment between {:08} and {:08}", pair[0], pair[1]),
            ));
        }

        let active = match sequences.last() {
            Some(&highest) => Segment::open(dir, highest)?,
            None => Segment::create(dir, 0)?,
        };

        let mut segments: BTreeMap<u64, Option<u64>> =
            sequences.iter().map(|&sequence| (sequence, None)).collect();
        segments.insert(active.sequence(), None);

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            active = active.sequence(),
            "opened segment directory"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            active,
        })
    }

    /// The single target for appends
    pub fn active(&self) -> &Segment {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut Segment {
        &mut self.active
    }

    /// Seal the active segment and start the next one
    ///
    /// The caller guarantees no append is in flight against the old segment.
    /// Returns the new active sequence number.
    pub fn rotate(&mut self) -> Result<u64> {
        self.active.flush()?;

        let next = self.active.sequence() + 1;
        let fresh = Segment::create(&self.dir, next)?;
        let sealed = std::mem::replace(&mut self.active, fresh);
        self.segments.insert(next, None);

        let sealed_sequence = sealed.sequence();
        let sealed_size = sealed.size();
        sealed.close()?;

        info!(
            sealed = sealed_sequence,
            sealed_size,
            active = next,
            "rotated segment"
        );
        Ok(next)
    }

    /// Delete the oldest historical segments until at most `max_segments` remain
    ///
    /// The active segment always survives, even with `max_segments == 0`.
    /// Returns the deleted sequence numbers.
    pub fn enforce_retention(&mut self, max_segments: usize) -> Result<Vec<u64>> {
        let mut removed = Vec::new();

        while self.segments.len() > max_segments {
            let Some(&oldest) = self.segments.keys().next() else {
                break;
            };
            if oldest == self.active.sequence() {
                break;
            }
            self.remove_segment(oldest)?;
            removed.push(oldest);
        }

        if !removed.is_empty() {
            info!(?removed, max_segments, "retention removed segments");
        }
        Ok(removed)
    }

    /// Delete historical segments whose records all have LSN ≤ `lsn`
    ///
    /// Stops at the first segment that still holds a newer record, so the
    /// surviving numbering stays gapless. Returns the deleted sequence numbers.
    pub fn truncate_through(&mut self, lsn: u64) -> Result<Vec<u64>> {
        let active = self.active.sequence();
        let doomed: Vec<u64> = self
            .segments
            .iter()
            .take_while(|&(&sequence, &last)| {
                sequence != active && last.map_or(true, |last| last <= lsn)
            })
            .map(|(&sequence, _)| sequence)
            .collect();

        for &sequence in &doomed {
            self.remove_segment(sequence)?;
        }

        if !doomed.is_empty() {
            info!(removed = ?doomed, through_lsn = lsn, "checkpoint removed segments");
        }
        Ok(doomed)
    }

    /// Sequence numbers in ascending order (historical, then active)
    pub fn list_segments(&self) -> Vec<u64> {
        self.segments.keys().copied().collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Note that `lsn` was written to the active segment
    pub fn record_lsn(&mut self, lsn: u64) {
        self.note_lsn(self.active.sequence(), lsn);
    }

    /// Raise the LSN high-water mark of `sequence`
    pub fn note_lsn(&mut self, sequence: u64, lsn: u64) {
        if let Some(mark) = self.segments.get_mut(&sequence) {
            *mark = Some(mark.map_or(lsn, |current| current.max(lsn)));
        }
    }

    /// Highest LSN known to live in `sequence`
    pub fn last_lsn_of(&self, sequence: u64) -> Option<u64> {
        self.segments.get(&sequence).copied().flatten()
    }

    /// Snapshot reader for any live segment
    ///
    /// The active segment is read up to its flushed size; historical segments
    /// are read in full.
    pub fn open_reader(&self, sequence: u64) -> Result<SegmentReader> {
        if sequence == self.active.sequence() {
            self.active.open_reader()
        } else {
            SegmentReader::open_full(&self.segment_path(sequence))
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, sequence: u64) -> PathBuf {
        segment_path(&self.dir, sequence)
    }

    /// Flush and release the active segment
    pub fn close(self) -> Result<()> {
        self.active.close()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn remove_segment(&mut self, sequence: u64) -> Result<()> {
        let path = self.segment_path(sequence);
        fs::remove_file(&path)?;
        self.segments.remove(&sequence);
        debug!(sequence, path = %path.display(), "deleted segment");
        Ok(())
    }
}
