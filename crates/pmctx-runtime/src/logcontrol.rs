//! Shared archive handles.
//!
//! A [`LogControl`] owns one open [`ArchiveFile`]. Contexts that open the same
//! archive share a single LogControl through the [`LogCache`]; the reference
//! count says how many archive controllers point at it and the files close
//! when it reaches zero.
//!
//! Lock order: the cache lock is taken after the slot-table and context
//! locks and before any LogControl's own lock. Code holding the cache lock
//! never waits on a context.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use pmctx_archive::{ArchiveFile, ArchiveMetadata, LogLabel, OpenOptions, archive_base_name};
use pmctx_types::ContextFlags;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct LogControl {
    name: String,
    private: bool,
    /// Only changed while the cache lock is held
    refcnt: AtomicUsize,
    first_label: LogLabel,
    min_vol: Option<u32>,
    archive: Mutex<Option<ArchiveFile>>,
}

impl LogControl {
    fn new(archive: ArchiveFile, private: bool) -> Self {
        Self {
            name: archive.name().to_string(),
            private,
            refcnt: AtomicUsize::new(1),
            first_label: archive.label().clone(),
            min_vol: archive.min_volume(),
            archive: Mutex::new(Some(archive)),
        }
    }

    /// Normalised base name of the archive
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Private logs belong to one archive chain (or writer) and are never
    /// handed out by the cache.
    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn refcount(&self) -> usize {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Label of the first volume, as read when the archive was opened
    pub fn label(&self) -> &LogLabel {
        &self.first_label
    }

    pub fn min_volume(&self) -> Option<u32> {
        self.min_vol
    }

    pub fn is_open(&self) -> bool {
        self.archive.lock().is_some()
    }

    /// Run `f` against the open archive.
    pub fn with_archive<T>(&self, f: impl FnOnce(&mut ArchiveFile) -> Result<T>) -> Result<T> {
        let mut guard = self.archive.lock();
        match guard.as_mut() {
            Some(archive) => f(archive),
            None => Err(Error::LogFile(pmctx_archive::Error::NotFound(format!(
                "{} is closed",
                self.name
            )))),
        }
    }

    pub fn metadata(&self) -> Result<ArchiveMetadata> {
        self.with_archive(|a| Ok(a.metadata().clone()))
    }

    /// Select `vol` on the shared archive.
    pub fn change_volume(&self, vol: u32) -> Result<()> {
        self.with_archive(|a| Ok(a.change_volume(vol)?))
    }

    fn rewind(&self) -> Result<()> {
        match self.min_vol {
            Some(vol) => self.change_volume(vol),
            None => Ok(()),
        }
    }

    fn close(&self) {
        if let Some(archive) = self.archive.lock().take() {
            archive.close();
        }
    }
}

/// Registry-wide set of shareable [`LogControl`]s.
#[derive(Debug, Default)]
pub struct LogCache {
    shared: Mutex<Vec<Arc<LogControl>>>,
}

impl LogCache {
    /// Attach the archive `name` to `slot`, sharing an open one when allowed.
    ///
    /// Whatever `slot` held is released first. A `chained` open may reuse a
    /// shared log, but a log it opens itself stays private to the chain.
    pub fn find_or_open(
        &self,
        slot: &mut Option<Arc<LogControl>>,
        name: &str,
        chained: bool,
        flags: ContextFlags,
    ) -> Result<()> {
        if let Some(old) = slot.take() {
            self.release(old);
        }

        let base = archive_base_name(name);
        let writer = flags.contains(ContextFlags::STREAMING_WRITER);

        if !writer && let Some(log) = self.acquire_by_name(base) {
            if let Err(err) = log.rewind() {
                self.release(log);
                return Err(err);
            }
            trace!(archive = %log.name(), refcnt = log.refcount(), "sharing open archive");
            *slot = Some(log);
            return Ok(());
        }

        let options = OpenOptions {
            metadata_only: flags.contains(ContextFlags::METADATA_ONLY),
        };
        let archive = ArchiveFile::open(name, options)?;
        let private = chained || writer || options.metadata_only;

        if private {
            *slot = Some(Arc::new(LogControl::new(archive, true)));
            return Ok(());
        }

        // another thread may have opened the same archive meanwhile
        let mut shared = self.shared.lock();
        if let Some(existing) = shared.iter().find(|l| l.name == archive.name()) {
            existing.refcnt.fetch_add(1, Ordering::AcqRel);
            let existing = Arc::clone(existing);
            drop(shared);
            archive.close();
            if let Err(err) = existing.rewind() {
                self.release(existing);
                return Err(err);
            }
            *slot = Some(existing);
            return Ok(());
        }
        let log = Arc::new(LogControl::new(archive, false));
        shared.push(Arc::clone(&log));
        drop(shared);
        debug!(archive = %log.name(), "cached archive");
        *slot = Some(log);
        Ok(())
    }

    fn acquire_by_name(&self, base: &str) -> Option<Arc<LogControl>> {
        let shared = self.shared.lock();
        let log = shared.iter().find(|l| l.name == base)?;
        log.refcnt.fetch_add(1, Ordering::AcqRel);
        Some(Arc::clone(log))
    }

    /// Take another reference to a log already held elsewhere.
    pub fn acquire(&self, log: &Arc<LogControl>) -> Arc<LogControl> {
        let _shared = self.shared.lock();
        log.refcnt.fetch_add(1, Ordering::AcqRel);
        Arc::clone(log)
    }

    /// Drop one reference; the last one closes the archive.
    pub fn release(&self, log: Arc<LogControl>) {
        let mut shared = self.shared.lock();
        let prev = log.refcnt.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "log control released more often than acquired");
        if prev > 1 {
            return;
        }
        shared.retain(|l| !Arc::ptr_eq(l, &log));
        drop(shared);
        debug!(archive = %log.name(), "closing archive");
        log.close();
    }

    /// Names and reference counts of the shareable logs.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        self.shared
            .lock()
            .iter()
            .map(|l| (l.name.clone(), l.refcount()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmctx_archive::{ArchiveWriter, MetricDesc};
    use pmctx_types::Timeval;
    use tempfile::TempDir;

    fn make_archive(dir: &TempDir, name: &str, start: i64) -> String {
        let base = dir.path().join(name);
        let mut writer =
            ArchiveWriter::create(&base, LogLabel::new("db01", "UTC", Timeval::new(start, 0)))
                .unwrap();
        writer.add_desc(&MetricDesc::new(1, "kernel.all.load")).unwrap();
        writer.finish().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_second_open_shares_log() {
        let dir = TempDir::new().unwrap();
        let name = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut first = None;
        let mut second = None;
        cache.find_or_open(&mut first, &name, false, ContextFlags::empty()).unwrap();
        cache.find_or_open(&mut second, &name, false, ContextFlags::empty()).unwrap();

        let (a, b) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.refcount(), 2);
        assert_eq!(cache.snapshot(), vec![(name.clone(), 2)]);

        cache.release(a);
        assert_eq!(b.refcount(), 1);
        assert!(b.is_open());
        cache.release(b);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_member_file_name_matches_cached_base() {
        let dir = TempDir::new().unwrap();
        let name = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut first = None;
        let mut second = None;
        cache.find_or_open(&mut first, &name, false, ContextFlags::empty()).unwrap();
        cache
            .find_or_open(&mut second, &format!("{}.meta", name), false, ContextFlags::empty())
            .unwrap();
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
    }

    #[test]
    fn test_chained_open_is_private() {
        let dir = TempDir::new().unwrap();
        let name = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut chained = None;
        cache.find_or_open(&mut chained, &name, true, ContextFlags::empty()).unwrap();
        assert!(chained.as_ref().unwrap().is_private());
        assert!(cache.snapshot().is_empty());

        let mut plain = None;
        cache.find_or_open(&mut plain, &name, false, ContextFlags::empty()).unwrap();
        assert!(!Arc::ptr_eq(chained.as_ref().unwrap(), plain.as_ref().unwrap()));
    }

    #[test]
    fn test_chain_consumes_shared_log() {
        let dir = TempDir::new().unwrap();
        let name = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut plain = None;
        cache.find_or_open(&mut plain, &name, false, ContextFlags::empty()).unwrap();
        let mut chained = None;
        cache.find_or_open(&mut chained, &name, true, ContextFlags::empty()).unwrap();
        assert!(Arc::ptr_eq(plain.as_ref().unwrap(), chained.as_ref().unwrap()));
        assert_eq!(plain.as_ref().unwrap().refcount(), 2);
    }

    #[test]
    fn test_reattach_releases_previous() {
        let dir = TempDir::new().unwrap();
        let a = make_archive(&dir, "a", 100);
        let b = make_archive(&dir, "b", 200);
        let cache = LogCache::default();

        let mut slot = None;
        cache.find_or_open(&mut slot, &a, false, ContextFlags::empty()).unwrap();
        let first = Arc::clone(slot.as_ref().unwrap());
        cache.find_or_open(&mut slot, &b, false, ContextFlags::empty()).unwrap();

        assert_eq!(first.refcount(), 0);
        assert!(!first.is_open());
        assert_eq!(cache.snapshot(), vec![(b, 1)]);
    }

    #[test]
    fn test_failed_open_leaves_slot_empty() {
        let dir = TempDir::new().unwrap();
        let a = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut slot = None;
        cache.find_or_open(&mut slot, &a, false, ContextFlags::empty()).unwrap();
        let missing = dir.path().join("nope").to_string_lossy().into_owned();
        let err = cache
            .find_or_open(&mut slot, &missing, false, ContextFlags::empty())
            .unwrap_err();
        assert!(matches!(err, Error::LogFile(_)));
        assert!(slot.is_none());
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_writer_never_shares() {
        let dir = TempDir::new().unwrap();
        let name = make_archive(&dir, "a", 100);
        let cache = LogCache::default();

        let mut plain = None;
        cache.find_or_open(&mut plain, &name, false, ContextFlags::empty()).unwrap();
        let mut writer = None;
        cache
            .find_or_open(&mut writer, &name, false, ContextFlags::STREAMING_WRITER)
            .unwrap();
        assert!(writer.as_ref().unwrap().is_private());
        assert_eq!(plain.as_ref().unwrap().refcount(), 1);
    }
}
