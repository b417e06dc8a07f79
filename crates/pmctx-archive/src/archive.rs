use crate::error::{Error, Result};
use crate::label::{LABEL_RECORD_LEN, LogLabel, VOL_INDEX, VOL_META};
use crate::meta::{ArchiveMetadata, read_metadata};
use std::fs::File;
use std::io::{ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Only the metadata file is required; data volumes are optional
    pub metadata_only: bool,
}

/// An open archive: metadata file, optional temporal index, and the
/// currently selected data volume.
#[derive(Debug)]
pub struct ArchiveFile {
    name: String,
    label: LogLabel,
    min_vol: Option<u32>,
    max_vol: Option<u32>,
    cur_vol: Option<u32>,
    meta_file: File,
    index_file: Option<File>,
    data_file: Option<File>,
    metadata: ArchiveMetadata,
}

impl ArchiveFile {
    /// Open the archive called `name`.
    ///
    /// `name` may be the base name or any one of the archive's files
    /// (`base.meta`, `base.index`, `base.0`); the stored name is always the
    /// base.
    pub fn open(name: &str, options: OpenOptions) -> Result<Self> {
        let (base, mut meta_file) = open_meta(name)?;
        let meta_label = LogLabel::read_from(&mut meta_file, VOL_META)?;

        let base_path = PathBuf::from(&base);
        let (index_present, volumes) = scan_siblings(&base_path)?;

        let index_file = if index_present {
            match File::open(format!("{}.index", base)) {
                Ok(mut f) => {
                    let label = LogLabel::read_from(&mut f, VOL_INDEX)?;
                    if !label.same_archive(&meta_label) {
                        return Err(Error::BadLabel(format!(
                            "{}.index does not belong with {}.meta",
                            base, base
                        )));
                    }
                    Some(f)
                }
                // removed between scan and open
                Err(err) if err.kind() == ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            }
        } else {
            None
        };

        let metadata = read_metadata(&mut meta_file)?;

        let mut archive = ArchiveFile {
            name: base.clone(),
            label: meta_label,
            min_vol: volumes.first().copied(),
            max_vol: volumes.last().copied(),
            cur_vol: None,
            meta_file,
            index_file,
            data_file: None,
            metadata,
        };

        match archive.min_vol {
            Some(vol) => {
                let meta_label = archive.label.clone();
                archive.change_volume(vol)?;
                if !archive.label.same_archive(&meta_label) {
                    return Err(Error::BadLabel(format!(
                        "{}.{} does not belong with {}.meta",
                        base, vol, base
                    )));
                }
            }
            None if options.metadata_only => {}
            None => {
                return Err(Error::MissingVolume(format!(
                    "no data volume found for {}",
                    base
                )));
            }
        }

        debug!(
            archive = %archive.name,
            min_vol = ?archive.min_vol,
            max_vol = ?archive.max_vol,
            descs = archive.metadata.descs.len(),
            "opened archive"
        );
        Ok(archive)
    }

    /// Switch the current data volume, validating its label.
    pub fn change_volume(&mut self, vol: u32) -> Result<()> {
        if self.cur_vol == Some(vol) {
            return Ok(());
        }
        let path = format!("{}.{}", self.name, vol);
        let mut file = File::open(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::MissingVolume(path.clone()),
            _ => Error::Io(err),
        })?;
        let label = LogLabel::read_from(&mut file, vol as i32)?;
        file.seek(SeekFrom::Start(LABEL_RECORD_LEN))?;

        self.data_file = Some(file);
        self.cur_vol = Some(vol);
        self.label = label;
        debug!(archive = %self.name, vol, "changed volume");
        Ok(())
    }

    /// Re-read the label of the current volume (or of the metadata file
    /// when no volume is selected).
    pub fn read_label(&mut self) -> Result<LogLabel> {
        match (self.data_file.as_mut(), self.cur_vol) {
            (Some(file), Some(vol)) => {
                let label = LogLabel::read_from(file, vol as i32)?;
                file.seek(SeekFrom::Start(LABEL_RECORD_LEN))?;
                Ok(label)
            }
            _ => LogLabel::read_from(&mut self.meta_file, VOL_META),
        }
    }

    /// Release all file handles.
    pub fn close(self) {
        debug!(archive = %self.name, "closed archive");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &LogLabel {
        &self.label
    }

    pub fn min_volume(&self) -> Option<u32> {
        self.min_vol
    }

    pub fn max_volume(&self) -> Option<u32> {
        self.max_vol
    }

    pub fn current_volume(&self) -> Option<u32> {
        self.cur_vol
    }

    pub fn has_index(&self) -> bool {
        self.index_file.is_some()
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }
}

/// Strip a recognised archive file suffix, if any.
pub fn archive_base_name(name: &str) -> &str {
    name.strip_suffix(".meta")
        .or_else(|| name.strip_suffix(".index"))
        .unwrap_or(name)
}

fn numeric_suffix_stripped(name: &str) -> Option<&str> {
    let (base, suffix) = name.rsplit_once('.')?;
    if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) && !base.is_empty() {
        Some(base)
    } else {
        None
    }
}

// Opens `<base>.meta`, trying the name as given before treating a
// trailing `.N` as a volume suffix.
fn open_meta(name: &str) -> Result<(String, File)> {
    let base = archive_base_name(name);
    match File::open(format!("{}.meta", base)) {
        Ok(f) => return Ok((base.to_string(), f)),
        Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
        Err(_) => {}
    }
    if let Some(stripped) = numeric_suffix_stripped(base) {
        match File::open(format!("{}.meta", stripped)) {
            Ok(f) => return Ok((stripped.to_string(), f)),
            Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
            Err(_) => {}
        }
    }
    Err(Error::NotFound(name.to_string()))
}

// Returns whether an index file is present and the sorted volume numbers.
fn scan_siblings(base: &Path) -> Result<(bool, Vec<u32>)> {
    let dir = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!("{}.", stem);

    let mut index = false;
    let mut volumes = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy();
        let Some(suffix) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if suffix == "index" {
            index = true;
        } else if let Ok(vol) = suffix.parse::<u32>() {
            volumes.push(vol);
        }
    }
    volumes.sort_unstable();
    volumes.dedup();
    Ok((index, volumes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_base_name() {
        assert_eq!(archive_base_name("/a/b/20240101.meta"), "/a/b/20240101");
        assert_eq!(archive_base_name("x.index"), "x");
        assert_eq!(archive_base_name("x.0"), "x.0");
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix_stripped("x.12"), Some("x"));
        assert_eq!(numeric_suffix_stripped("x.y"), None);
        assert_eq!(numeric_suffix_stripped(".3"), None);
    }
}
