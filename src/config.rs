//! Configuration for segwal
//!
//! Construction-time settings with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WalError};

/// Default rotation threshold: 16 MB per segment
pub const DEFAULT_ROTATION_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Default number of segment files kept on disk
pub const DEFAULT_MAX_SEGMENTS: usize = 4;

/// Default period of the background sync timer
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Main configuration for a WAL instance
#[derive(Debug, Clone)]
pub struct WalConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {dir}/
    ///     ├── 00000000.log
    ///     ├── 00000001.log
    ///     └── ...
    pub dir: PathBuf,

    /// Rotate to a new segment once the active one would grow past this size (bytes)
    pub rotation_threshold: u64,

    /// Maximum number of segment files retained, active one included
    pub max_segments: usize,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// fsync on every sync (off: flush to the OS only)
    pub fsync_on_sync: bool,

    /// Run the periodic sync timer
    pub periodic_sync: bool,

    /// Period of the sync timer
    pub sync_interval: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./segwal_data"),
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            max_segments: DEFAULT_MAX_SEGMENTS,
            fsync_on_sync: false,
            periodic_sync: true,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl WalConfig {
    /// Create a new config builder
    pub fn builder(dir: impl Into<PathBuf>) -> WalConfigBuilder {
        WalConfigBuilder {
            config: WalConfig {
                dir: dir.into(),
                ..WalConfig::default()
            },
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(WalError::Config("directory must not be empty".to_string()));
        }
        if self.rotation_threshold == 0 {
            return Err(WalError::Config(
                "rotation_threshold must be greater than zero".to_string(),
            ));
        }
        if self.max_segments == 0 {
            return Err(WalError::Config(
                "max_segments must be at least 1".to_string(),
            ));
        }
        if self.periodic_sync && self.sync_interval.is_zero() {
            return Err(WalError::Config(
                "sync_interval must be non-zero when periodic sync is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for WalConfig
pub struct WalConfigBuilder {
    config: WalConfig,
}

impl WalConfigBuilder {
    /// Set the segment directory
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir = path.into();
        self
    }

    /// Enable or disable fsync on sync
    pub fn fsync_on_sync(mut self, enabled: bool) -> Self {
        self.config.fsync_on_sync = enabled;
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn rotation_threshold(mut self, bytes: u64) -> Self {
        self.config.rotation_threshold = bytes;
        self
    }

    /// Set the maximum number of retained segments
    pub fn max_segments(mut self, count: usize) -> Self {
        self.config.max_segments = count;
        self
    }

    /// Set the sync timer period
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Enable or disable the periodic sync timer
    pub fn periodic_sync(mut self, enabled: bool) -> Self {
        self.config.periodic_sync = enabled;
        self
    }

    pub fn build(self) -> WalConfig {
        self.config
    }
}
