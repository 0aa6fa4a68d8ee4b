//! Per-file download accounting
//!
//! The tracker owns the mapping from servable files to their download
//! counters. Counters are created lazily the first time a path is checked,
//! never removed, and only ever move upwards: a successful download adds one,
//! an administrative disallow raises the counter straight to the quota.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GateError;

/// A single file's download counter.
#[derive(Debug, Default)]
struct DownloadRecord {
    count: AtomicU64,
}

/// Shared handle to one file's counter.
///
/// The handle pairs the counter cell with the configured quota so callers can
/// make the allow/deny decision without another trip through the table lock.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    record: Arc<DownloadRecord>,
    quota: u64,
}

impl CounterHandle {
    /// Downloads recorded so far.
    pub fn count(&self) -> u64 {
        self.record.count.load(Ordering::Acquire)
    }

    /// Download slots left before the file becomes unavailable.
    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.count())
    }

    /// Whether the counter has reached the quota.
    pub fn is_exhausted(&self) -> bool {
        self.count() >= self.quota
    }

    /// Atomically claim one download slot.
    ///
    /// Compare-and-increment: succeeds only while the counter is below the
    /// quota, so concurrent callers can never push the counter past it.
    /// Returns the new count on success, the current count on failure.
    pub fn try_acquire(&self) -> Result<u64, u64> {
        self.record
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.quota).then_some(count + 1)
            })
            .map(|previous| previous + 1)
    }

    /// Raise the counter to the quota, blocking further downloads.
    ///
    /// Uses a monotonic max so a counter already at or past the quota is
    /// never lowered.
    pub fn exhaust(&self) {
        self.record.count.fetch_max(self.quota, Ordering::AcqRel);
    }
}

/// Tracks download counts for every file served from a root directory.
#[derive(Debug)]
pub struct AccessTracker {
    /// Directory files are served from
    root: PathBuf,
    /// Maximum downloads permitted per file
    quota: u64,
    /// Counter table, keyed by the root-joined file path
    records: Mutex<HashMap<PathBuf, Arc<DownloadRecord>>>,
}

impl AccessTracker {
    /// Create a tracker for `root` with a per-file download quota.
    pub fn new(root: impl Into<PathBuf>, quota: u64) -> Result<Self, GateError> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|source| GateError::RootUnavailable {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(GateError::RootNotADirectory(root));
        }

        Ok(Self {
            root,
            quota,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// The directory this tracker serves from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The per-file download quota.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Normalize a request path into a key under the root.
    ///
    /// Accepts paths with or without a leading separator, percent-decodes
    /// them, and refuses anything that would climb out of the root. Purely
    /// lexical: no filesystem access.
    fn normalize(&self, path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(path).ok()?;
        let mut relative = PathBuf::new();
        for component in decoded.trim_start_matches('/').split('/') {
            match component {
                "" | "." => continue,
                ".." => return None,
                component => relative.push(component),
            }
        }
        Some(self.root.join(relative))
    }

    /// Pure existence check: the root-joined path for a request, or `None`
    /// when it does not name an existing, non-directory file.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let file = self.normalize(path)?;
        let meta = fs::metadata(&file).ok()?;
        if meta.is_dir() {
            return None;
        }
        Some(file)
    }

    /// Look up a file's counter, creating a zeroed record on first sight.
    ///
    /// Returns `None` when the path is missing or names a directory; such
    /// paths never acquire a record, even transiently. An existing record's
    /// value is left untouched.
    pub fn lookup_or_create(&self, path: &str) -> Option<CounterHandle> {
        let file = self.resolve(path)?;
        let record = {
            let mut records = self.records.lock();
            Arc::clone(records.entry(file).or_default())
        };
        Some(CounterHandle {
            record,
            quota: self.quota,
        })
    }

    /// Read a file's current download count without creating a record.
    ///
    /// A servable file that has never been checked reports 0.
    pub fn current_count(&self, path: &str) -> Option<u64> {
        let file = self.resolve(path)?;
        let records = self.records.lock();
        Some(
            records
                .get(&file)
                .map_or(0, |record| record.count.load(Ordering::Acquire)),
        )
    }

    /// Record one completed download against an existing record.
    ///
    /// No quota check is made here; callers claim slots through
    /// [`CounterHandle::try_acquire`] before transferring. Returns `false`
    /// and changes nothing when the path has no record.
    pub fn record_download(&self, path: &str) -> bool {
        let Some(file) = self.normalize(path) else {
            return false;
        };
        let records = self.records.lock();
        match records.get(&file) {
            Some(record) => {
                record.count.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Exhaust a file's quota without consuming a download.
    ///
    /// Returns `true` when the path names a servable file (creating its
    /// record if needed); `false` for missing paths and directories, which
    /// are left without a record.
    pub fn disallow(&self, path: &str) -> bool {
        match self.lookup_or_create(path) {
            Some(handle) => {
                handle.exhaust();
                true
            }
            None => false,
        }
    }
}
