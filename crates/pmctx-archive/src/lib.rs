// Archive file layer
// Everything the context core needs from an archive on disk: open, close,
// volume switching, label access, and directory expansion.

mod archive;
mod dir;
mod error;
mod label;
mod meta;
mod writer;

// Public API
pub use archive::{ArchiveFile, OpenOptions, archive_base_name};
pub use dir::{ExpandedList, META_SUFFIX, expand_archive_list, expand_directory};
pub use error::{Error, Result};
pub use label::{LABEL_RECORD_LEN, LOG_MAGIC, LOG_VERSION, LogLabel, VOL_INDEX, VOL_META};
pub use meta::{ArchiveMetadata, LabelSet, MetricDesc, read_metadata};
pub use writer::ArchiveWriter;
