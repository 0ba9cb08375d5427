//! Segment files
//!
//! A single append-only file holding a contiguous run of frames.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::{Result, WalError};
use crate::record::{LogRecord, RecordStream};

/// File extension of segment files
pub const SEGMENT_EXTENSION: &str = "log";

/// Digits in a segment file name
const SEQUENCE_WIDTH: usize = 8;

/// Build the path of segment `sequence` inside `dir`
pub fn segment_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!(
        "{:0width$}.{}",
        sequence,
        SEGMENT_EXTENSION,
        width = SEQUENCE_WIDTH
    ))
}

/// Parse a segment sequence number from a file name
/// "00000042.log" → Some(42)
///
/// Only the canonical spelling produced by `segment_path` is accepted, so
/// "000000042.log" is not a second name for segment 42.
pub fn parse_sequence(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != SEGMENT_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence: u64 = stem.parse().ok()?;
    if stem != format!("{:0width$}", sequence, width = SEQUENCE_WIDTH) {
        return None;
    }
    Some(sequence)
}

/// One append-only segment file
///
/// Not internally synchronized: `append` takes `&mut self`, so concurrent
/// writers must be serialized by the owner.
#[derive(Debug)]
pub struct Segment {
    /// Sequence number (file identity)
    sequence: u64,
    /// Path of the backing file
    path: PathBuf,
    /// Buffered append handle
    writer: BufWriter<File>,
    /// Logical size, buffered bytes included
    size: u64,
    /// A failed append could not be rolled back; the tail is unknown
    poisoned: bool,
    #[cfg(test)]
    faults: Faults,
}

/// Injected write failures
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Write this many bytes of the next frame, then fail
    pub(crate) partial_write: Option<usize>,
    /// Fail the rollback that follows
    pub(crate) rollback: bool,
    /// Fail `flush` and `fsync`
    pub(crate) flush: bool,
    /// Fail `close`
    pub(crate) close: bool,
}

impl Segment {
    /// Create a new, empty segment file
    ///
    /// Fails if the file already exists.
    pub fn create(dir: &Path, sequence: u64) -> Result<Self> {
        let path = segment_path(dir, sequence);
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            sequence,
            path,
            writer: BufWriter::new(file),
            size: 0,
            poisoned: false,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Open an existing segment for further appends
    pub fn open(dir: &Path, sequence: u64) -> Result<Self> {
        let path = segment_path(dir, sequence);
        let file = OpenOptions::new().append(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            sequence,
            path,
            writer: BufWriter::new(file),
            size,
            poisoned: false,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Append bytes at the end of the segment
    ///
    /// All or nothing: a failed write is cut back to the previous size before
    /// the error is returned. If that cut fails too, the segment is poisoned
    /// and refuses further appends.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(WalError::Poisoned(format!(
                "segment {:08} has an unknown tail",
                self.sequence
            )));
        }

        let start = self.size;
        if let Err(e) = self.write_frame(bytes) {
            if let Err(rollback) = self.rollback(start) {
                error!(
                    sequence = self.sequence,
                    size = start,
                    error = %rollback,
                    "failed to roll back partial append"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.size += bytes.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        {
            if let Some(written) = self.faults.partial_write.take() {
                self.writer.write_all(&bytes[..written.min(bytes.len())])?;
                self.writer.flush()?;
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
        }
        self.writer.write_all(bytes)
    }

    /// Drop whatever a failed write left past `len`
    fn rollback(&mut self, len: u64) -> Result<()> {
        #[cfg(test)]
        {
            if self.faults.rollback {
                return Err(
                    io::Error::new(io::ErrorKind::Other, "injected rollback failure").into(),
                );
            }
        }
        self.writer.flush()?;
        self.writer.get_ref().set_len(len)?;
        Ok(())
    }

    /// True once a failed append could not be undone
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[cfg(test)]
    fn check_flush_fault(&self) -> io::Result<()> {
        if self.faults.flush {
            return Err(io::Error::new(io::ErrorKind::Other, "injected flush failure"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_flush_fault(&self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Push buffered bytes to the OS (no crash durability)
    pub fn flush(&mut self) -> Result<()> {
        self.check_flush_fault()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, then force the data to the device
    pub fn fsync(&mut self) -> Result<()> {
        self.check_flush_fault()?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes already handed to the OS, i.e. visible to readers
    pub fn flushed_size(&self) -> u64 {
        self.size - self.writer.buffer().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Independent read view over the flushed contents
    ///
    /// The view is bounded to what was flushed at the time of the call;
    /// later appends are not visible through it.
    pub fn open_reader(&self) -> Result<SegmentReader> {
        SegmentReader::open(&self.path, self.flushed_size())
    }

    /// Cut the file back to `len` bytes
    ///
    /// Only used to drop a torn tail before appending resumes.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.set_len(len)?;
        file.sync_all()?;
        self.size = len;
        Ok(())
    }

    /// Flush, then release the file handle
    pub fn close(mut self) -> Result<()> {
        #[cfg(test)]
        {
            if self.faults.close {
                return Err(io::Error::new(io::ErrorKind::Other, "injected close failure").into());
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Snapshot read view over one segment
///
/// Owns its own read handle, released when dropped.
pub struct SegmentReader {
    stream: RecordStream<BufReader<File>>,
}

impl SegmentReader {
    /// Open `path` for reading, bounded to its first `limit` bytes
    pub fn open(path: &Path, limit: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            stream: RecordStream::with_limit(BufReader::new(file), limit),
        })
    }

    /// Open `path` for reading up to its current length
    pub fn open_full(path: &Path) -> Result<Self> {
        let len = std::fs::metadata(path)?.len();
        Self::open(path, len)
    }

    /// Offset just past the last complete frame read so far
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    /// True if reading stopped on a partial trailing frame
    pub fn is_torn(&self) -> bool {
        self.stream.is_torn()
    }
}

impl Iterator for SegmentReader {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
