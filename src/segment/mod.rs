//! Segment Module
//!
//! On-disk layout of the log: a directory of numbered, append-only files.
//!
//! ## Responsibilities
//! - Append framed records to the active segment
//! - Flush/fsync on demand
//! - Snapshot read views for replay
//! - Rotation and retention across segments
//!
//! ## Directory Layout
//! ```text
//! {dir}/
//!   ├── 00000000.log   (historical)
//!   ├── 00000001.log   (historical)
//!   └── 00000002.log   (active)
//! ```

mod file;
mod manager;

pub use file::{parse_sequence, segment_path, Segment, SegmentReader, SEGMENT_EXTENSION};
pub use manager::SegmentManager;
