use crate::error::{Error, Result};
use crate::label::{LABEL_RECORD_LEN, be_u32};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

pub const TYPE_DESC: u32 = 1;
pub const TYPE_INDOM: u32 = 2;
pub const TYPE_LABEL: u32 = 3;

/// Metric descriptor with the names it is known by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDesc {
    pub pmid: u32,
    pub value_type: i32,
    pub indom: u32,
    pub semantics: i32,
    pub units: u32,
    pub names: Vec<String>,
}

impl MetricDesc {
    pub fn new(pmid: u32, name: impl Into<String>) -> Self {
        Self {
            pmid,
            value_type: 0,
            indom: u32::MAX,
            semantics: 1,
            units: 0,
            names: vec![name.into()],
        }
    }
}

/// A set of labels attached to some metadata object, as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSet {
    /// What `ident` refers to (context, domain, indom, item, ...)
    pub kind: u32,
    pub ident: u32,
    pub json: String,
}

impl LabelSet {
    pub fn new(kind: u32, ident: u32, json: impl Into<String>) -> Self {
        Self {
            kind,
            ident,
            json: json.into(),
        }
    }

    pub fn labels(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        serde_json::from_str(&self.json)
            .map_err(|e| Error::BadMetadata(format!("label set {}: {}", self.ident, e)))
    }
}

/// Everything loaded from an archive's metadata file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub descs: Vec<MetricDesc>,
    pub labelsets: Vec<LabelSet>,
}

/// Read all metadata records following the label of a `.meta` file.
pub fn read_metadata<R: Read + Seek>(reader: &mut R) -> Result<ArchiveMetadata> {
    reader.seek(SeekFrom::Start(LABEL_RECORD_LEN))?;
    let mut meta = ArchiveMetadata::default();

    loop {
        let mut head = [0u8; 4];
        match reader.read_exact(&mut head) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let len = be_u32(&head) as usize;
        if len < 12 {
            return Err(Error::BadMetadata(format!("record length {} too short", len)));
        }
        let mut rest = vec![0u8; len - 4];
        reader.read_exact(&mut rest).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => Error::BadMetadata("record truncated".to_string()),
            _ => Error::Io(err),
        })?;
        let trailer = be_u32(&rest[len - 8..]) as usize;
        if trailer != len {
            return Err(Error::BadMetadata(format!(
                "record trailer {} does not match header {}",
                trailer, len
            )));
        }

        let rtype = be_u32(&rest[0..4]);
        let payload = &rest[4..len - 8];
        match rtype {
            TYPE_DESC => meta.descs.push(decode_desc(payload)?),
            TYPE_LABEL => {
                let set = decode_labelset(payload)?;
                set.labels()?;
                meta.labelsets.push(set);
            }
            // instance domains and anything newer are not needed here
            _ => {}
        }
    }

    Ok(meta)
}

pub fn write_desc<W: Write>(writer: &mut W, desc: &MetricDesc) -> Result<()> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&desc.pmid.to_be_bytes());
    payload.extend_from_slice(&desc.value_type.to_be_bytes());
    payload.extend_from_slice(&desc.indom.to_be_bytes());
    payload.extend_from_slice(&desc.semantics.to_be_bytes());
    payload.extend_from_slice(&desc.units.to_be_bytes());
    payload.extend_from_slice(&(desc.names.len() as u32).to_be_bytes());
    for name in &desc.names {
        put_string(&mut payload, name);
    }
    write_record(writer, TYPE_DESC, &payload)
}

pub fn write_labelset<W: Write>(writer: &mut W, set: &LabelSet) -> Result<()> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&set.kind.to_be_bytes());
    payload.extend_from_slice(&set.ident.to_be_bytes());
    put_string(&mut payload, &set.json);
    write_record(writer, TYPE_LABEL, &payload)
}

fn write_record<W: Write>(writer: &mut W, rtype: u32, payload: &[u8]) -> Result<()> {
    let len = (payload.len() + 12) as u32;
    let mut buf = Vec::with_capacity(len as usize);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&rtype.to_be_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&len.to_be_bytes());
    writer.write_all(&buf)?;
    Ok(())
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.bytes.len() {
            return Err(Error::BadMetadata("record payload truncated".to_string()));
        }
        let value = be_u32(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(value)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(Error::BadMetadata("string runs past record end".to_string()));
        }
        let value = String::from_utf8(self.bytes[self.pos..end].to_vec())
            .map_err(|_| Error::BadMetadata("string is not UTF-8".to_string()))?;
        self.pos = end;
        Ok(value)
    }
}

fn decode_desc(payload: &[u8]) -> Result<MetricDesc> {
    let mut d = Decoder::new(payload);
    let pmid = d.u32()?;
    let value_type = d.u32()? as i32;
    let indom = d.u32()?;
    let semantics = d.u32()? as i32;
    let units = d.u32()?;
    let count = d.u32()?;
    let mut names = Vec::new();
    for _ in 0..count {
        names.push(d.string()?);
    }
    Ok(MetricDesc {
        pmid,
        value_type,
        indom,
        semantics,
        units,
        names,
    })
}

fn decode_labelset(payload: &[u8]) -> Result<LabelSet> {
    let mut d = Decoder::new(payload);
    let kind = d.u32()?;
    let ident = d.u32()?;
    let json = d.string()?;
    Ok(LabelSet { kind, ident, json })
}
