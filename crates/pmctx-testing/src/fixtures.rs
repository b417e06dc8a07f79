//! Archive fixtures.
//!
//! An [`ArchiveFixture`] describes one archive (label, volumes, metrics,
//! label sets) and writes it with the real archive writer, so tests read
//! exactly what production code would.

use anyhow::Result;
use pmctx_archive::{ArchiveWriter, LabelSet, LogLabel, MetricDesc};
use pmctx_types::Timeval;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchiveFixture {
    name: String,
    hostname: String,
    timezone: String,
    start: Timeval,
    extra_volumes: u32,
    metrics: Vec<(u32, String)>,
    labelsets: Vec<LabelSet>,
}

impl ArchiveFixture {
    /// Archive `name` starting at `start_sec`, host "testhost", one volume.
    pub fn new(name: &str, start_sec: i64) -> Self {
        Self {
            name: name.to_string(),
            hostname: "testhost".to_string(),
            timezone: "UTC".to_string(),
            start: Timeval::new(start_sec, 0),
            extra_volumes: 0,
            metrics: vec![(1, "sample.load".to_string())],
            labelsets: Vec::new(),
        }
    }

    pub fn host(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    pub fn timezone(mut self, tz: &str) -> Self {
        self.timezone = tz.to_string();
        self
    }

    pub fn start_usec(mut self, usec: i32) -> Self {
        self.start.usec = usec;
        self
    }

    /// Total number of data volumes (at least one).
    pub fn volumes(mut self, count: u32) -> Self {
        self.extra_volumes = count.saturating_sub(1);
        self
    }

    pub fn metric(mut self, pmid: u32, name: &str) -> Self {
        self.metrics.push((pmid, name.to_string()));
        self
    }

    pub fn labelset(mut self, kind: u32, ident: u32, json: &str) -> Self {
        self.labelsets.push(LabelSet::new(kind, ident, json));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Timeval {
        self.start
    }

    /// Write the archive into `dir`, returning its base name.
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf> {
        let label = LogLabel::new(self.hostname.clone(), self.timezone.clone(), self.start);
        let mut writer = ArchiveWriter::create(dir.join(&self.name), label)?;
        for (pmid, name) in &self.metrics {
            writer.add_desc(&MetricDesc::new(*pmid, name.clone()))?;
        }
        for set in &self.labelsets {
            writer.add_labelset(set)?;
        }
        for _ in 0..self.extra_volumes {
            writer.new_volume()?;
        }
        Ok(writer.finish()?)
    }
}
