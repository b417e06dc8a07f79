use crate::error::{Error, Result};
use pmctx_types::Timeval;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

pub const LOG_MAGIC: u32 = 0x5005_2600;
pub const LOG_VERSION: u32 = 2;

pub const MAX_HOST_LEN: usize = 64;
pub const MAX_TZ_LEN: usize = 40;

/// Label volume number used by the temporal index file.
pub const VOL_INDEX: i32 = -1;
/// Label volume number used by the metadata file.
pub const VOL_META: i32 = -2;

const LABEL_LEN: usize = 4 + 4 + 4 + 4 + 4 + MAX_HOST_LEN + MAX_TZ_LEN;

/// Size of the framed label record at the head of every archive file.
/// Data starts at this offset.
pub const LABEL_RECORD_LEN: u64 = (LABEL_LEN + 8) as u64;

/// Label stamped at the start of every file belonging to one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLabel {
    pub version: u32,
    pub pid: u32,
    pub start: Timeval,
    pub vol: i32,
    pub hostname: String,
    /// Either a POSIX TZ string, or `:Area/City` for a zoneinfo name
    pub timezone: String,
}

impl LogLabel {
    pub fn new(hostname: impl Into<String>, timezone: impl Into<String>, start: Timeval) -> Self {
        Self {
            version: LOG_VERSION,
            pid: std::process::id(),
            start,
            vol: 0,
            hostname: hostname.into(),
            timezone: timezone.into(),
        }
    }

    pub fn for_volume(&self, vol: i32) -> Self {
        Self {
            vol,
            ..self.clone()
        }
    }

    /// Zoneinfo name when the timezone was recorded as `:Area/City`.
    pub fn zoneinfo(&self) -> Option<&str> {
        self.timezone.strip_prefix(':').filter(|z| !z.is_empty())
    }

    /// Read and validate the framed label at the start of `reader`.
    pub fn read_from<R: Read + Seek>(reader: &mut R, expect_vol: i32) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; LABEL_LEN + 8];
        if let Err(err) = reader.read_exact(&mut buf) {
            return Err(match err.kind() {
                ErrorKind::UnexpectedEof => Error::BadLabel("label record truncated".to_string()),
                _ => Error::Io(err),
            });
        }

        let header = be_u32(&buf[0..4]) as usize;
        let trailer = be_u32(&buf[LABEL_LEN + 4..LABEL_LEN + 8]) as usize;
        if header != LABEL_LEN + 8 || trailer != LABEL_LEN + 8 {
            return Err(Error::BadLabel(format!(
                "bad label framing {}/{} (expected {})",
                header,
                trailer,
                LABEL_LEN + 8
            )));
        }

        let body = &buf[4..LABEL_LEN + 4];
        let magic = be_u32(&body[0..4]);
        if magic & 0xffff_ff00 != LOG_MAGIC {
            return Err(Error::BadLabel(format!("bad magic 0x{:x}", magic)));
        }
        let version = magic & 0xff;
        if version != LOG_VERSION {
            return Err(Error::BadLabel(format!("unsupported version {}", version)));
        }

        let label = LogLabel {
            version,
            pid: be_u32(&body[4..8]),
            start: Timeval::new(be_u32(&body[8..12]) as i64, be_u32(&body[12..16]) as i32),
            vol: be_u32(&body[16..20]) as i32,
            hostname: fixed_str(&body[20..20 + MAX_HOST_LEN]),
            timezone: fixed_str(&body[20 + MAX_HOST_LEN..LABEL_LEN]),
        };

        if label.vol != expect_vol {
            return Err(Error::BadLabel(format!(
                "label volume {} where {} was expected",
                label.vol, expect_vol
            )));
        }
        Ok(label)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(LABEL_LEN + 8);
        buf.extend_from_slice(&((LABEL_LEN + 8) as u32).to_be_bytes());
        buf.extend_from_slice(&(LOG_MAGIC | self.version).to_be_bytes());
        buf.extend_from_slice(&self.pid.to_be_bytes());
        buf.extend_from_slice(&(self.start.sec as u32).to_be_bytes());
        buf.extend_from_slice(&(self.start.usec as u32).to_be_bytes());
        buf.extend_from_slice(&(self.vol as u32).to_be_bytes());
        put_fixed(&mut buf, &self.hostname, MAX_HOST_LEN);
        put_fixed(&mut buf, &self.timezone, MAX_TZ_LEN);
        buf.extend_from_slice(&((LABEL_LEN + 8) as u32).to_be_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Two labels describe the same archive if pid and host agree.
    pub fn same_archive(&self, other: &LogLabel) -> bool {
        self.pid == other.pid && self.hostname == other.hostname
    }
}

pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// Truncates to leave room for the terminating NUL.
fn put_fixed(buf: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width - 1);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + (width - len), 0);
}
