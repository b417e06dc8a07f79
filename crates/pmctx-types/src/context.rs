use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public, process-unique identifier of a context.
///
/// Handles are issued in increasing order and never recycled; the registry
/// slot that backs a handle is what gets reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(i32);

impl ContextHandle {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ContextHandle> for i32 {
    fn from(handle: ContextHandle) -> Self {
        handle.0
    }
}

/// What kind of source a context is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Uninitialized,
    /// Live connection to a monitoring daemon
    Host,
    /// One archive or a time-ordered chain of archives
    Archive,
    /// In-process local source
    Local,
    TearingDown,
}

impl ContextKind {
    /// Kinds a caller may ask `create_context` for.
    pub fn is_creatable(self) -> bool {
        matches!(self, ContextKind::Host | ContextKind::Archive | ContextKind::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::Uninitialized => "uninitialized",
            ContextKind::Host => "host",
            ContextKind::Archive => "archive",
            ContextKind::Local => "local",
            ContextKind::TearingDown => "tearing-down",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Per-context behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        const SECURE = 1 << 0;
        const COMPRESS = 1 << 1;
        const RELAXED = 1 << 2;
        const CONTAINER = 1 << 3;
        const EXCLUSIVE = 1 << 4;
        const METADATA_ONLY = 1 << 5;
        /// Context writes an archive; its log state is never shared
        const STREAMING_WRITER = 1 << 6;
    }
}

impl ContextFlags {
    /// Short names of the set flags, for diagnostics.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (flag, name) in [
            (ContextFlags::SECURE, "secure"),
            (ContextFlags::COMPRESS, "compress"),
            (ContextFlags::RELAXED, "relaxed"),
            (ContextFlags::CONTAINER, "container"),
            (ContextFlags::EXCLUSIVE, "exclusive"),
            (ContextFlags::METADATA_ONLY, "metadata-only"),
            (ContextFlags::STREAMING_WRITER, "writer"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_ordering() {
        assert!(ContextHandle::new(1) < ContextHandle::new(2));
        assert_eq!(i32::from(ContextHandle::new(7)), 7);
        assert_eq!(ContextHandle::new(3).to_string(), "3");
    }

    #[test]
    fn test_creatable_kinds() {
        assert!(ContextKind::Host.is_creatable());
        assert!(ContextKind::Archive.is_creatable());
        assert!(ContextKind::Local.is_creatable());
        assert!(!ContextKind::Uninitialized.is_creatable());
        assert!(!ContextKind::TearingDown.is_creatable());
    }

    #[test]
    fn test_flag_names() {
        let flags = ContextFlags::SECURE | ContextFlags::METADATA_ONLY;
        assert_eq!(flags.names(), vec!["secure", "metadata-only"]);
        assert!(ContextFlags::empty().names().is_empty());
    }
}
