use crate::error::Result;
use std::path::Path;
use walkdir::WalkDir;

/// Suffix identifying an archive's metadata file.
pub const META_SUFFIX: &str = ".meta";

/// Base names of the archives in `dir`, sorted.
///
/// Only entries ending in `.meta` count; anything else is skipped.
/// Entries are not stat'ed first: an archive that vanishes after the
/// listing shows up as an open failure later, not here.
pub fn expand_directory(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy();
        let Some(stem) = file_name.strip_suffix(META_SUFFIX) else {
            continue;
        };
        if stem.is_empty() {
            continue;
        }
        names.push(dir.join(stem).to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Split a comma-separated archive list, replacing each directory entry
/// with the archives it contains. Order is otherwise preserved.
pub fn expand_archive_list(list: &str) -> Result<ExpandedList> {
    let mut names = Vec::new();
    let mut had_directory = false;
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let path = Path::new(part);
        if path.is_dir() {
            had_directory = true;
            names.extend(expand_directory(path)?);
        } else {
            names.push(part.to_string());
        }
    }
    Ok(ExpandedList {
        names,
        had_directory,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedList {
    pub names: Vec<String>,
    pub had_directory: bool,
}

impl ExpandedList {
    /// A list or a directory is a chain even if it yields one archive.
    pub fn is_multi_archive(&self, original: &str) -> bool {
        self.had_directory || original.contains(',')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_expand_directory_picks_meta_files() -> Result<()> {
        let temp = TempDir::new()?;
        for name in ["b.meta", "a.meta", "a.0", "a.index", "notes.txt", ".meta"] {
            fs::write(temp.path().join(name), b"")?;
        }
        fs::create_dir(temp.path().join("sub.meta.d"))?;

        let names = expand_directory(temp.path())?;
        let expected: Vec<String> = ["a", "b"]
            .iter()
            .map(|n| temp.path().join(n).to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, expected);
        Ok(())
    }

    #[test]
    fn test_expand_list_mixes_names_and_directories() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("x.meta"), b"")?;
        let list = format!("first, {} ,last", temp.path().display());

        let expanded = expand_archive_list(&list)?;
        assert_eq!(expanded.names.len(), 3);
        assert_eq!(expanded.names[0], "first");
        assert!(expanded.names[1].ends_with("x"));
        assert_eq!(expanded.names[2], "last");
        assert!(expanded.had_directory);
        assert!(expanded.is_multi_archive(&list));
        Ok(())
    }

    #[test]
    fn test_single_name_is_not_multi() -> Result<()> {
        let expanded = expand_archive_list("/no/such/archive")?;
        assert_eq!(expanded.names, vec!["/no/such/archive".to_string()]);
        assert!(!expanded.is_multi_archive("/no/such/archive"));
        Ok(())
    }
}
