//! Tunables for a reading session.
use crate::extract::DEFAULT_BATCH_SECTORS;
use crate::lock::{RetryPolicy, DEFAULT_LOCK_PATH};
use crate::nav::{NavCheck, NavOptions, MAX_VOBU_EXTRA_SECTORS};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Marker file used for advisory device locking. `None` disables locking.
    pub lock_path: Option<PathBuf>,
    /// Lock attempts and the wait between them
    pub lock_retry: RetryPolicy,
    /// Sectors scanned past a bad NAV pack before the rest of the cell is skipped
    pub rescan_limit: u32,
    /// Sectors per read/write batch in bulk extraction
    pub batch_sectors: u32,
    pub nav_check: NavCheck,
}

impl ReaderConfig {
    pub fn nav_options(&self) -> NavOptions {
        NavOptions {
            check: self.nav_check,
            rescan_limit: self.rescan_limit,
        }
    }

    /// A configuration without device locking, e.g. for image files.
    pub fn unlocked() -> Self {
        ReaderConfig {
            lock_path: None,
            ..ReaderConfig::default()
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            lock_path: Some(PathBuf::from(DEFAULT_LOCK_PATH)),
            lock_retry: RetryPolicy::default(), // 180 x 1 s
            rescan_limit: MAX_VOBU_EXTRA_SECTORS,
            batch_sectors: DEFAULT_BATCH_SECTORS,
            nav_check: NavCheck::TwoPoint,
        }
    }
}
