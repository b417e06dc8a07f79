use crate::error::{Error, Result};
use crate::logcontrol::{LogCache, LogControl};
use crate::namespace::Namespace;
use pmctx_archive::{LABEL_RECORD_LEN, LogLabel};
use pmctx_types::{ContextFlags, Timeval};
use std::sync::Arc;
use tracing::debug;

/// One archive of a chain, as recorded when the chain was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiArchiveEntry {
    pub name: String,
    pub hostname: String,
    pub timezone: String,
    pub zoneinfo: Option<String>,
    pub start: Timeval,
}

impl MultiArchiveEntry {
    pub fn from_label(name: &str, label: &LogLabel) -> Self {
        Self {
            name: name.to_string(),
            hostname: label.hostname.clone(),
            timezone: label.timezone.clone(),
            zoneinfo: label.zoneinfo().map(str::to_string),
            start: label.start,
        }
    }
}

/// Per-context archive state: which archive of the chain is active, the
/// read position inside it, and the namespace merged across the chain.
#[derive(Debug)]
pub struct ArchiveController {
    log: Option<Arc<LogControl>>,
    vol: Option<u32>,
    offset: u64,
    entries: Vec<MultiArchiveEntry>,
    current: usize,
    flags: ContextFlags,
    multi: bool,
    namespace: Namespace,
}

impl ArchiveController {
    pub(crate) fn new(flags: ContextFlags, multi: bool) -> Self {
        Self {
            log: None,
            vol: None,
            offset: LABEL_RECORD_LEN,
            entries: Vec::new(),
            current: 0,
            flags,
            multi,
            namespace: Namespace::default(),
        }
    }

    pub fn log(&self) -> Option<&Arc<LogControl>> {
        self.log.as_ref()
    }

    pub(crate) fn log_slot(&mut self) -> &mut Option<Arc<LogControl>> {
        &mut self.log
    }

    pub fn entries(&self) -> &[MultiArchiveEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<MultiArchiveEntry> {
        &mut self.entries
    }

    /// Index of the active archive in [`ArchiveController::entries`]
    pub fn current_archive(&self) -> usize {
        self.current
    }

    pub fn current_entry(&self) -> Option<&MultiArchiveEntry> {
        self.entries.get(self.current)
    }

    pub fn volume(&self) -> Option<u32> {
        self.vol
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    pub fn is_multi_archive(&self) -> bool {
        self.multi
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub(crate) fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    /// Start of the earliest archive in the chain
    pub fn origin(&self) -> Timeval {
        self.entries.first().map(|e| e.start).unwrap_or_default()
    }

    /// Rewind to the first data record of the active archive.
    pub(crate) fn position_at_start(&mut self) -> Result<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        self.vol = log.min_volume();
        if let Some(vol) = self.vol {
            log.change_volume(vol)?;
        }
        self.offset = LABEL_RECORD_LEN;
        Ok(())
    }

    /// Make `index` the active archive and rewind it.
    ///
    /// Fails if the archive on disk no longer starts where it did when the
    /// chain was opened. On failure the previous archive stays active.
    pub(crate) fn change_archive(&mut self, cache: &LogCache, index: usize) -> Result<()> {
        let Some(entry) = self.entries.get(index).cloned() else {
            return Err(Error::BadSpecification(format!(
                "archive index {} out of range (chain has {})",
                index,
                self.entries.len()
            )));
        };

        let attached = self.log.as_ref().is_some_and(|l| l.name() == entry.name);
        if !attached {
            let mut next = None;
            cache.find_or_open(&mut next, &entry.name, self.multi, self.flags)?;
            let Some(log) = next else {
                return Err(Error::LogFile(pmctx_archive::Error::NotFound(entry.name)));
            };
            if log.label().start != entry.start {
                cache.release(log);
                return Err(Error::LogFile(pmctx_archive::Error::BadLabel(format!(
                    "{} changed since the chain was opened",
                    entry.name
                ))));
            }
            if let Some(old) = self.log.replace(log) {
                cache.release(old);
            }
        }
        self.current = index;
        self.position_at_start()?;
        debug!(archive = %entry.name, index, "switched archive");
        Ok(())
    }

    /// Select data volume `vol` of the active archive.
    pub(crate) fn change_volume(&mut self, vol: u32) -> Result<()> {
        let Some(log) = &self.log else {
            return Err(Error::LogFile(pmctx_archive::Error::MissingVolume(
                "no archive attached".to_string(),
            )));
        };
        log.change_volume(vol)?;
        self.vol = Some(vol);
        self.offset = LABEL_RECORD_LEN;
        Ok(())
    }

    /// Independent copy sharing the active log.
    pub(crate) fn duplicate(&self, cache: &LogCache) -> Self {
        Self {
            log: self.log.as_ref().map(|l| cache.acquire(l)),
            vol: self.vol,
            offset: self.offset,
            entries: self.entries.clone(),
            current: self.current,
            flags: self.flags,
            multi: self.multi,
            namespace: self.namespace.clone(),
        }
    }

    /// Drop this controller's reference to its log.
    pub(crate) fn release(mut self, cache: &LogCache) {
        if let Some(log) = self.log.take() {
            cache.release(log);
        }
    }
}
