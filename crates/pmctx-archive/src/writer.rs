use crate::error::Result;
use crate::label::{LogLabel, VOL_INDEX, VOL_META};
use crate::meta::{LabelSet, MetricDesc, write_desc, write_labelset};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Creates a new archive on disk: labelled `.meta`, `.index` and first
/// data volume, then appends metadata records.
pub struct ArchiveWriter {
    base: PathBuf,
    label: LogLabel,
    meta: BufWriter<File>,
    volume: u32,
}

impl ArchiveWriter {
    pub fn create(base: impl AsRef<Path>, label: LogLabel) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        if let Some(parent) = base.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut meta = BufWriter::new(create_new(&sibling(&base, "meta"))?);
        label.for_volume(VOL_META).write_to(&mut meta)?;

        let mut index = create_new(&sibling(&base, "index"))?;
        label.for_volume(VOL_INDEX).write_to(&mut index)?;

        let mut data = create_new(&sibling(&base, "0"))?;
        label.for_volume(0).write_to(&mut data)?;

        debug!(archive = %base.display(), start = %label.start, "created archive");
        Ok(Self {
            base,
            label,
            meta,
            volume: 0,
        })
    }

    pub fn add_desc(&mut self, desc: &MetricDesc) -> Result<()> {
        write_desc(&mut self.meta, desc)
    }

    pub fn add_labelset(&mut self, set: &LabelSet) -> Result<()> {
        write_labelset(&mut self.meta, set)
    }

    /// Start the next data volume, returning its number.
    pub fn new_volume(&mut self) -> Result<u32> {
        let vol = self.volume + 1;
        let mut data = create_new(&sibling(&self.base, &vol.to_string()))?;
        self.label.for_volume(vol as i32).write_to(&mut data)?;
        self.volume = vol;
        Ok(vol)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Flush metadata and return the archive's base name.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.meta.flush()?;
        Ok(self.base)
    }
}

fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn create_new(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}
