//! Reading and querying the cross-reference data of a document.
//!
//! The engine locates `startxref`, parses legacy xref sections and xref
//! streams, follows `/Prev` chains across incremental updates, and merges
//! entries with newest-wins precedence.

use crate::error::{Error, Result};
use crate::filter::{Collector, FilterPipeline};
use crate::lexer::{self, RefContext};
use crate::object::{keys, Dict, ObjectId, Value};
use crate::sink::ValueCapture;
use crate::source::{ByteSource, Reader};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

const XREF_ENTRY_LEN: usize = 20;
const TAIL_WINDOW: usize = 1024;

/// One entry of the cross-reference table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CrossReferenceEntry {
    /// A free entry: the head of the free list it points at, plus the
    /// generation to use if the object number is reused.
    Free {
        /// Object number of the next free object.
        next_free: u32,
        /// Generation number.
        generation: u16,
    },
    /// An object stored at a byte offset in the document.
    InUse {
        /// Absolute byte offset of the object header.
        offset: u64,
        /// Generation number.
        generation: u16,
    },
    /// An object stored inside an object stream. The generation is 0 by
    /// definition.
    Compressed {
        /// Object number of the containing object stream.
        container: u32,
        /// Index of the object within the container.
        index: u32,
    },
}

/// The cross-reference table: a mapping from object identity to location.
#[derive(Debug, Default, Clone)]
pub struct CrossReferenceTable {
    entries: FxHashMap<ObjectId, CrossReferenceEntry>,
    max_object_number: u32,
}

impl CrossReferenceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for an object identity.
    pub fn get(&self, id: ObjectId) -> Option<&CrossReferenceEntry> {
        self.entries.get(&id)
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The highest object number seen in any section.
    pub fn max_object_number(&self) -> u32 {
        self.max_object_number
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &CrossReferenceEntry)> {
        self.entries.iter()
    }

    /// Add an entry unless one already exists for the same identity.
    /// Sections are processed newest-first, so the first entry wins.
    fn insert_if_absent(&mut self, id: ObjectId, entry: CrossReferenceEntry) {
        self.max_object_number = self.max_object_number.max(id.number);
        self.entries.entry(id).or_insert(entry);
    }
}

/// Everything the trailer locator produces.
pub(crate) struct LoadedXref {
    pub(crate) table: CrossReferenceTable,
    pub(crate) trailer: Dict,
    /// `(0, 0)` for a legacy trailer; the xref stream's own identity
    /// otherwise.
    pub(crate) root_dictionary_id: ObjectId,
}

struct LoadState {
    table: CrossReferenceTable,
    trailer: Option<Dict>,
    root_dictionary_id: ObjectId,
    seen_offsets: FxHashSet<u64>,
}

/// Locate `startxref` and load the complete cross-reference chain.
pub(crate) fn load<S: ByteSource>(r: &mut Reader<S>) -> Result<LoadedXref> {
    let offset = find_startxref(r)?;

    let mut state = LoadState {
        table: CrossReferenceTable::new(),
        trailer: None,
        root_dictionary_id: ObjectId::new(0, 0),
        seen_offsets: FxHashSet::default(),
    };

    load_section(r, offset, &mut state)?;

    let trailer = state
        .trailer
        .ok_or_else(|| Error::malformed(offset, "no trailer dictionary found"))?;

    if trailer.get_reference(keys::ROOT).is_none() {
        return Err(Error::malformed(
            offset,
            "trailer /Root missing or not a reference",
        ));
    }

    Ok(LoadedXref {
        table: state.table,
        trailer,
        root_dictionary_id: state.root_dictionary_id,
    })
}

/// Scan the last kibibyte of the source backwards for `startxref` and read
/// the decimal offset that follows it.
fn find_startxref<S: ByteSource>(r: &mut Reader<S>) -> Result<u64> {
    let len = r.source_len();
    let tail_len = (TAIL_WINDOW as u64).min(len) as usize;
    let tail_start = len - tail_len as u64;

    r.seek(tail_start)?;
    let tail = r.read_exact(tail_len)?;

    let needle = b"startxref";
    let index = tail
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| Error::malformed(len, "startxref not found"))?;

    r.seek(tail_start + index as u64 + needle.len() as u64)?;
    r.skip_white_spaces_and_comments()?;

    let offset = lexer::parse_integer(r)?;
    u64::try_from(offset).map_err(|_| Error::malformed(r.position(), "negative startxref offset"))
}

fn load_section<S: ByteSource>(
    r: &mut Reader<S>,
    offset: u64,
    state: &mut LoadState,
) -> Result<()> {
    if !state.seen_offsets.insert(offset) {
        return Err(Error::malformed(offset, "circular /Prev chain"));
    }

    r.seek(offset)?;
    r.skip_white_spaces_and_comments()?;

    match r.peek()? {
        Some(b'x') => load_legacy_section(r, state),
        Some(b'0'..=b'9') => load_xref_stream(r, state),
        _ => Err(Error::malformed(
            r.position(),
            "expected xref section or xref stream",
        )),
    }
}

/// A legacy `xref` section: subsections of 20-byte records followed by a
/// `trailer` dictionary.
fn load_legacy_section<S: ByteSource>(r: &mut Reader<S>, state: &mut LoadState) -> Result<()> {
    lexer::expect_keyword(r, b"xref")?;
    r.skip_white_spaces()?;

    loop {
        match r.peek()? {
            Some(b't') => break,
            Some(b'0'..=b'9') => {}
            _ => {
                return Err(Error::malformed(
                    r.position(),
                    "expected xref subsection or trailer",
                ));
            }
        }

        let start = lexer::parse_integer(r)?;
        r.skip_white_spaces()?;
        let count = lexer::parse_integer(r)?;
        r.skip_white_spaces()?;

        if start < 0 || count < 0 || start + count > u32::MAX as i64 {
            return Err(Error::malformed(r.position(), "invalid xref subsection header"));
        }

        let mut record = [0u8; XREF_ENTRY_LEN];
        for i in 0..count as u32 {
            r.read_exact_into(&mut record)?;

            let entry = parse_record(&record)
                .ok_or_else(|| Error::malformed(r.position(), "invalid xref record"))?;
            let generation = match entry {
                CrossReferenceEntry::Free { generation, .. }
                | CrossReferenceEntry::InUse { generation, .. } => generation,
                CrossReferenceEntry::Compressed { .. } => 0,
            };

            state
                .table
                .insert_if_absent(ObjectId::new(start as u32 + i, generation), entry);
        }

        r.skip_white_spaces()?;
    }

    lexer::expect_keyword(r, b"trailer")?;
    let trailer = capture_dict(r)?;

    let prev = trailer.get_i64(keys::PREV);

    // The first trailer seen along the chain is the newest.
    if state.trailer.is_none() {
        state.trailer = Some(trailer);
        state.root_dictionary_id = ObjectId::new(0, 0);
    }

    if let Some(prev) = prev {
        let prev = u64::try_from(prev)
            .map_err(|_| Error::malformed(r.position(), "negative /Prev offset"))?;
        load_section(r, prev, state)?;
    }

    Ok(())
}

/// Parse one 20-byte record: ten offset digits, a space, five generation
/// digits, a space, the type byte, and the terminator.
fn parse_record(record: &[u8; XREF_ENTRY_LEN]) -> Option<CrossReferenceEntry> {
    fn digits(data: &[u8]) -> Option<u64> {
        let mut accum: u64 = 0;

        for byte in data {
            match byte {
                b'0'..=b'9' => accum = accum * 10 + (byte - b'0') as u64,
                _ => return None,
            }
        }

        Some(accum)
    }

    let offset = digits(&record[0..10])?;
    let generation = digits(&record[11..16])? as u16;

    match record[17] {
        b'n' => Some(CrossReferenceEntry::InUse { offset, generation }),
        b'f' => Some(CrossReferenceEntry::Free {
            next_free: offset as u32,
            generation,
        }),
        _ => None,
    }
}

/// An xref stream: the object header, the stream dictionary (captured, not
/// delivered), and fixed-width binary records decoded through the filter
/// pipeline.
fn load_xref_stream<S: ByteSource>(r: &mut Reader<S>, state: &mut LoadState) -> Result<()> {
    let header_offset = r.position();

    let number = lexer::parse_integer(r)?;
    r.skip_white_spaces_and_comments()?;
    let generation = lexer::parse_integer(r)?;
    r.skip_white_spaces_and_comments()?;
    lexer::expect_keyword(r, b"obj")?;

    let id = object_id(number, generation)
        .ok_or_else(|| Error::malformed(header_offset, "invalid object header"))?;

    let dict = capture_dict(r)?;

    let length = dict
        .get_i64(keys::LENGTH)
        .and_then(|l| u64::try_from(l).ok())
        .ok_or_else(|| Error::malformed(r.position(), "xref stream missing /Length"))?;

    r.skip_white_spaces_and_comments()?;
    lexer::expect_keyword(r, b"stream")?;
    consume_stream_eol(r)?;

    let (collector, decoded) = Collector::new();
    let mut pipeline = FilterPipeline::build(&dict, collector);

    let mut remaining = length;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        r.read_exact_into(&mut buf[..n])?;
        pipeline.write(&buf[..n])?;
        remaining -= n as u64;
    }
    pipeline.close()?;

    r.skip_white_spaces()?;
    lexer::expect_keyword(r, b"endstream")?;

    let decoded = decoded.borrow();
    parse_xref_stream_data(&decoded, &dict, r.position(), &mut state.table)?;
    drop(decoded);

    let prev = dict.get_i64(keys::PREV);

    // The dictionary of the newest xref stream doubles as the trailer.
    if state.trailer.is_none() {
        state.trailer = Some(dict);
        state.root_dictionary_id = id;
    }

    if let Some(prev) = prev {
        let prev = u64::try_from(prev)
            .map_err(|_| Error::malformed(r.position(), "negative /Prev offset"))?;
        load_section(r, prev, state)?;
    }

    Ok(())
}

/// The stream payload: per `/W`-described record, a type field, field 2 and
/// field 3 in big-endian, laid out per the `/Index` (or implicit `/Size`)
/// subsections.
fn parse_xref_stream_data(
    data: &[u8],
    dict: &Dict,
    at: u64,
    table: &mut CrossReferenceTable,
) -> Result<()> {
    let widths = dict
        .get_array(keys::W)
        .filter(|w| w.len() == 3)
        .ok_or_else(|| Error::malformed(at, "xref stream /W must be a 3-element array"))?;

    let mut w = [0usize; 3];
    for (slot, value) in w.iter_mut().zip(widths) {
        *slot = value
            .as_i64()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v <= 8)
            .ok_or_else(|| Error::malformed(at, "invalid /W field width"))?;
    }

    let subsections: Vec<(u32, u32)> = if let Some(index) = dict.get_array(keys::INDEX) {
        if index.len() % 2 != 0 {
            return Err(Error::malformed(at, "/Index length must be even"));
        }

        index
            .chunks(2)
            .map(|pair| {
                let first = pair[0].as_i64().and_then(|v| u32::try_from(v).ok());
                let count = pair[1].as_i64().and_then(|v| u32::try_from(v).ok());
                first
                    .zip(count)
                    .ok_or_else(|| Error::malformed(at, "invalid /Index entry"))
            })
            .collect::<Result<_>>()?
    } else {
        let size = dict
            .get_i64(keys::SIZE)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::malformed(at, "xref stream needs /Index or /Size"))?;

        vec![(0, size)]
    };

    let entry_len = w[0] + w[1] + w[2];
    let mut cursor = 0usize;

    for (first, count) in subsections {
        for i in 0..count {
            let end = cursor + entry_len;
            if end > data.len() {
                return Err(Error::malformed(at, "/Index overruns xref stream data"));
            }

            let record = &data[cursor..end];
            cursor = end;

            // A zero-width type field means type 1.
            let (kind, rest) = record.split_at(w[0]);
            let kind = if w[0] == 0 { 1 } else { be_uint(kind) };
            let (field2, field3) = rest.split_at(w[1]);
            let field2 = be_uint(field2);
            let field3 = be_uint(field3);

            let number = first + i;

            match kind {
                0 => table.insert_if_absent(
                    ObjectId::new(number, field3 as u16),
                    CrossReferenceEntry::Free {
                        next_free: field2 as u32,
                        generation: field3 as u16,
                    },
                ),
                1 => table.insert_if_absent(
                    ObjectId::new(number, field3 as u16),
                    CrossReferenceEntry::InUse {
                        offset: field2,
                        generation: field3 as u16,
                    },
                ),
                2 => table.insert_if_absent(
                    ObjectId::new(number, 0),
                    CrossReferenceEntry::Compressed {
                        container: field2 as u32,
                        index: field3 as u32,
                    },
                ),
                other => {
                    warn!("ignoring xref entry of unknown type {other}");
                }
            }
        }
    }

    Ok(())
}

fn be_uint(data: &[u8]) -> u64 {
    data.iter().fold(0, |accum, b| accum << 8 | *b as u64)
}

/// Capture the next value, which must be a dictionary.
fn capture_dict<S: ByteSource>(r: &mut Reader<S>) -> Result<Dict> {
    let offset = r.position();
    let mut capture = ValueCapture::new();
    let mut refs = RefContext::new();

    lexer::parse_value(r, &mut capture, &mut refs)?;

    match capture.take() {
        Some(Value::Dictionary(dict)) => Ok(dict),
        _ => Err(Error::malformed(offset, "expected a dictionary")),
    }
}

/// After the `stream` keyword, exactly one EOL: LF or CRLF.
pub(crate) fn consume_stream_eol<S: ByteSource>(r: &mut Reader<S>) -> Result<()> {
    let offset = r.position();

    match r.read_byte()? {
        Some(b'\n') => Ok(()),
        Some(b'\r') => {
            if r.read_byte()? == Some(b'\n') {
                Ok(())
            } else {
                Err(Error::malformed(offset, "expected LF or CRLF after 'stream'"))
            }
        }
        _ => Err(Error::malformed(offset, "expected LF or CRLF after 'stream'")),
    }
}

pub(crate) fn object_id(number: i64, generation: i64) -> Option<ObjectId> {
    let number = u32::try_from(number).ok()?;
    let generation = u16::try_from(generation).ok()?;

    Some(ObjectId::new(number, generation))
}
