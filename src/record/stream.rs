//! Lazy record decoding
//!
//! Streams frames out of any `Read + Seek` source with an explicit cursor.

use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;

use super::codec::{decode_body, read_length, LENGTH_PREFIX_SIZE};
use super::LogRecord;

/// Initial body buffer capacity; larger frames grow the buffer on demand
const BODY_CAPACITY_HINT: usize = 4 * 1024;

/// Iterator over the frames of a source
///
/// ## End-of-stream rules
/// - Source exhausted on a frame boundary: stream ends.
/// - Fewer bytes remain than the next frame declares (torn write): stream
///   ends without error. The cursor stays at the start of that frame, so a
///   later `next()` retries it once more bytes are available.
/// - A complete frame fails verification: yields `WalError::Corruption`
///   once, after which the stream is finished for good.
pub struct RecordStream<R> {
    /// Underlying source
    source: R,
    /// Offset of the next frame to read
    position: u64,
    /// Bytes past this offset are treated as absent
    limit: Option<u64>,
    /// Whether the source's own cursor sits at `position`
    in_sync: bool,
    /// Last call stopped on a partial frame
    torn: bool,
    /// Set after corruption or an I/O error
    finished: bool,
}

impl<R: Read + Seek> RecordStream<R> {
    /// Stream the whole source from offset 0
    pub fn new(source: R) -> Self {
        Self {
            source,
            position: 0,
            limit: None,
            in_sync: false,
            torn: false,
            finished: false,
        }
    }

    /// Stream only the first `limit` bytes of the source
    pub fn with_limit(source: R, limit: u64) -> Self {
        let mut stream = Self::new(source);
        stream.limit = Some(limit);
        stream
    }

    /// Offset just past the last complete frame
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True if the stream stopped on a partial trailing frame
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    /// True once corruption or an I/O error ended the stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Move or remove the snapshot bound (e.g. after the file grew)
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Mutable access to the source, e.g. to append more bytes to a cursor
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Read the frame at `position`
    ///
    /// `Ok(None)` means the source ends here or the frame is incomplete.
    fn read_frame(&mut self) -> Result<Option<LogRecord>> {
        if !self.in_sync {
            self.source.seek(SeekFrom::Start(self.position))?;
            self.in_sync = true;
        }

        let mut prefix = Vec::with_capacity(LENGTH_PREFIX_SIZE);
        let wanted = self.bounded(LENGTH_PREFIX_SIZE as u64);
        (&mut self.source).take(wanted).read_to_end(&mut prefix)?;
        if prefix.len() < LENGTH_PREFIX_SIZE {
            return Ok(self.stop(!prefix.is_empty()));
        }

        let declared = read_length(&prefix, self.position)?;

        let body_start = self.position + LENGTH_PREFIX_SIZE as u64;
        let wanted = self.bounded_from(body_start, declared as u64);
        let mut body = Vec::with_capacity(declared.min(BODY_CAPACITY_HINT));
        (&mut self.source).take(wanted).read_to_end(&mut body)?;
        if body.len() < declared {
            return Ok(self.stop(true));
        }

        let record = decode_body(&body, self.position)?;
        self.position = body_start + declared as u64;
        self.torn = false;
        Ok(Some(record))
    }

    /// End the current pass, leaving the cursor at `position`
    fn stop(&mut self, torn: bool) -> Option<LogRecord> {
        self.in_sync = false;
        self.torn = torn;
        None
    }

    fn bounded(&self, len: u64) -> u64 {
        self.bounded_from(self.position, len)
    }

    /// Clamp a read of `len` bytes at `start` to the snapshot bound
    fn bounded_from(&self, start: u64, len: u64) -> u64 {
        match self.limit {
            Some(limit) => len.min(limit.saturating_sub(start)),
            None => len,
        }
    }
}

impl<R: Read + Seek> Iterator for RecordStream<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_frame() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
