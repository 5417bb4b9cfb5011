//! The parser and its traversal controller.
//!
//! [`Parser`] drives either a push-style full walk from the catalog
//! ([`Parser::parse`]) or a pull-style "load, then resolve on demand" mode
//! ([`Parser::load`] plus [`Parser::parse_object`]). It owns the traversal
//! state: the cross-reference table, the visited set, the pending queue and
//! the object-stream cache.

use crate::cmap::CMapParser;
use crate::content::ContentParser;
use crate::error::{Error, Result};
use crate::filter::{Collector, Dispatcher, FilterPipeline};
use crate::lexer::{self, RefContext};
use crate::object::{keys, Dict, ObjectId, Value};
use crate::object_stream::{ObjectStream, ObjectStreamCache};
use crate::sink::{CMapSink, ContentSink, DocumentSink, OpenTypeSink, StreamKind, StreamParser};
use crate::sink::ValueCapture;
use crate::opentype::OpenTypeParser;
use crate::source::{ByteSource, Reader};
use crate::xref::{self, CrossReferenceEntry, CrossReferenceTable};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::rc::Rc;

const STREAM_CHUNK: usize = 8192;

/// A streaming PDF parser.
///
/// Construct one with the application's [`DocumentSink`], optionally attach
/// specialized sub-parser sinks, then either [`parse`](Self::parse) a whole
/// document or [`load`](Self::load) it and pull individual objects with
/// [`parse_object`](Self::parse_object).
///
/// A parser instance is not safe for concurrent use; it may be reused
/// serially across documents, since `load` re-initializes all state.
pub struct Parser<H: DocumentSink> {
    sink: H,
    content_sink: Option<Box<dyn ContentSink>>,
    opentype_sink: Option<Box<dyn OpenTypeSink>>,
    cmap_sink: Option<Box<dyn CMapSink>>,
    reader: Option<Reader<Box<dyn ByteSource>>>,
    xref: CrossReferenceTable,
    trailer: Option<Dict>,
    root_dictionary_id: ObjectId,
    visited: FxHashSet<ObjectId>,
    queue: VecDeque<(ObjectId, StreamKind)>,
    refs: RefContext,
    streams: ObjectStreamCache,
    resolving: Vec<ObjectId>,
}

/// Where a traversal step finds its object.
enum Target {
    InUse(u64),
    Compressed(u32, u32),
}

/// The pieces of parser state a traversal step works on, split out so the
/// reader, the active sink and the engine state can be borrowed together.
struct Session<'p> {
    xref: &'p CrossReferenceTable,
    streams: &'p mut ObjectStreamCache,
    refs: &'p mut RefContext,
    resolving: &'p mut Vec<ObjectId>,
    content_sink: &'p mut Option<Box<dyn ContentSink>>,
    opentype_sink: &'p mut Option<Box<dyn OpenTypeSink>>,
    cmap_sink: &'p mut Option<Box<dyn CMapSink>>,
}

impl<H: DocumentSink> Parser<H> {
    /// Create a parser delivering events to `sink`.
    pub fn new(sink: H) -> Self {
        Self {
            sink,
            content_sink: None,
            opentype_sink: None,
            cmap_sink: None,
            reader: None,
            xref: CrossReferenceTable::new(),
            trailer: None,
            root_dictionary_id: ObjectId::new(0, 0),
            visited: FxHashSet::default(),
            queue: VecDeque::new(),
            refs: RefContext::new(),
            streams: ObjectStreamCache::default(),
            resolving: Vec::new(),
        }
    }

    /// Attach a sink for decoded content streams.
    pub fn set_content_sink(&mut self, sink: impl ContentSink + 'static) {
        self.content_sink = Some(Box::new(sink));
    }

    /// Attach a sink for OpenType/TrueType font programs.
    pub fn set_opentype_sink(&mut self, sink: impl OpenTypeSink + 'static) {
        self.opentype_sink = Some(Box::new(sink));
    }

    /// Attach a sink for CMap streams.
    pub fn set_cmap_sink(&mut self, sink: impl CMapSink + 'static) {
        self.cmap_sink = Some(Box::new(sink));
    }

    /// The document sink.
    pub fn sink(&self) -> &H {
        &self.sink
    }

    /// The document sink, mutably.
    pub fn sink_mut(&mut self) -> &mut H {
        &mut self.sink
    }

    /// Consume the parser and return the document sink.
    pub fn into_sink(self) -> H {
        self.sink
    }

    /// Populate the cross-reference table and trailer from `source`. No
    /// body events are emitted; afterwards objects can be pulled with
    /// [`parse_object`](Self::parse_object).
    pub fn load(&mut self, source: impl ByteSource + 'static) -> Result<()> {
        let boxed: Box<dyn ByteSource> = Box::new(source);
        let mut reader = Reader::new(boxed)?;

        let loaded = xref::load(&mut reader)?;

        self.reader = Some(reader);
        self.xref = loaded.table;
        self.trailer = Some(loaded.trailer);
        self.root_dictionary_id = loaded.root_dictionary_id;
        self.visited.clear();
        self.queue.clear();
        self.refs.reset(StreamKind::Default);
        self.streams.clear();
        self.resolving.clear();

        Ok(())
    }

    /// Parse the whole document in push mode.
    ///
    /// Emits the trailer dictionary as a synthetic object first, then
    /// walks the transitive closure of references starting at `/Root` and
    /// `/Info` in breadth-first discovery order.
    pub fn parse(&mut self, source: impl ByteSource + 'static) -> Result<()> {
        self.load(source)?;

        let trailer = self
            .trailer
            .clone()
            .ok_or_else(|| Error::malformed(0, "document not loaded"))?;

        self.visited.insert(self.root_dictionary_id);
        self.refs.reset(StreamKind::Default);

        self.sink.start_object(self.root_dictionary_id)?;
        emit_value(&mut self.sink, &mut self.refs, &Value::Dictionary(trailer.clone()))?;
        self.sink.end_object()?;

        if let Some(root) = trailer.get_reference(keys::ROOT) {
            self.queue.push_back((root, StreamKind::Default));
        }
        if let Some(info) = trailer.get_reference(keys::INFO) {
            self.queue.push_back((info, StreamKind::Default));
        }
        for (id, kind) in self.refs.pending.drain() {
            if !self.visited.contains(&id) {
                self.queue.push_back((id, kind));
            }
        }

        while let Some((id, kind)) = self.queue.pop_front() {
            if self.visited.contains(&id) {
                continue;
            }

            let Some(entry) = self.xref.get(id).copied() else {
                continue;
            };

            let target = match entry {
                CrossReferenceEntry::Free { .. } => continue,
                CrossReferenceEntry::InUse { offset, .. } => Target::InUse(offset),
                CrossReferenceEntry::Compressed { container, index } => {
                    Target::Compressed(container, index)
                }
            };

            self.visited.insert(id);
            self.refs.reset(kind);
            self.step(None, id, target)?;

            for (id, kind) in self.refs.pending.drain() {
                if !self.visited.contains(&id) {
                    self.queue.push_back((id, kind));
                }
            }
        }

        Ok(())
    }

    /// Parse a single object, delivering its events to `sink`.
    ///
    /// References inside the object surface as `object_reference` events
    /// for the caller to chase selectively. Traversal context is saved and
    /// restored, so this can be interleaved with other calls.
    pub fn parse_object(&mut self, id: ObjectId, sink: &mut dyn DocumentSink) -> Result<()> {
        let saved = std::mem::take(&mut self.refs);
        let result = self.parse_object_inner(id, sink);
        self.refs = saved;

        result
    }

    fn parse_object_inner(&mut self, id: ObjectId, sink: &mut dyn DocumentSink) -> Result<()> {
        match self.xref.get(id).copied() {
            Some(CrossReferenceEntry::InUse { offset, .. }) => {
                self.step(Some(sink), id, Target::InUse(offset))
            }
            Some(CrossReferenceEntry::Compressed { container, index }) => {
                self.step(Some(sink), id, Target::Compressed(container, index))
            }
            _ => Err(Error::UnresolvedReference(id)),
        }
    }

    /// Run one traversal step against either the parser's own sink (push
    /// traversal) or a caller-provided one (pull traversal).
    fn step(
        &mut self,
        sink: Option<&mut dyn DocumentSink>,
        id: ObjectId,
        target: Target,
    ) -> Result<()> {
        let Parser {
            sink: own_sink,
            content_sink,
            opentype_sink,
            cmap_sink,
            reader,
            xref,
            streams,
            refs,
            resolving,
            ..
        } = self;

        let r = reader
            .as_mut()
            .ok_or_else(|| Error::malformed(0, "no document loaded"))?;
        let mut session = Session {
            xref,
            streams,
            refs,
            resolving,
            content_sink,
            opentype_sink,
            cmap_sink,
        };

        let sink: &mut dyn DocumentSink = match sink {
            Some(sink) => sink,
            None => own_sink,
        };

        match target {
            Target::InUse(offset) => parse_indirect_at(r, &mut session, sink, id, offset),
            Target::Compressed(container, index) => {
                parse_compressed(r, &mut session, sink, id, container, index)
            }
        }
    }

    /// `trailer[/Root]`; available after [`load`](Self::load).
    pub fn catalog_id(&self) -> Option<ObjectId> {
        self.trailer.as_ref()?.get_reference(keys::ROOT)
    }

    /// Read-only access to the cross-reference table.
    pub fn cross_reference_table(&self) -> &CrossReferenceTable {
        &self.xref
    }

    /// Read-only access to the trailer dictionary.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }
}

fn parse_indirect_at<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    sink: &mut dyn DocumentSink,
    id: ObjectId,
    offset: u64,
) -> Result<()> {
    r.seek(offset)?;
    r.skip_white_spaces_and_comments()?;

    let found = parse_object_header(r)?;
    if found != id {
        return Err(Error::InconsistentObject {
            expected: id,
            found,
        });
    }

    r.skip_white_spaces_and_comments()?;
    let content_start = r.position();

    // Capture pass: learn the object's /Type, and for streams the length
    // and filter chain, without delivering events to the application.
    let captured = {
        let mut capture = ValueCapture::new();
        lexer::parse_value(r, &mut capture, session.refs)?;
        capture
            .take()
            .ok_or_else(|| Error::malformed(content_start, "empty object"))?
    };

    session.refs.current_type = captured
        .as_dict()
        .and_then(|d| d.get_name(keys::TYPE))
        .cloned();

    r.skip_white_spaces_and_comments()?;
    let has_stream = r.peek()? == Some(b's');

    let stream_length = if has_stream {
        let Some(dict) = captured.as_dict() else {
            return Err(Error::malformed(r.position(), "stream without a dictionary"));
        };

        Some(resolve_stream_length(r, session, dict)?)
    } else {
        None
    };

    // Emission pass: re-parse the value into the active sink. References
    // are recorded again, now with the /Type context in scope.
    sink.start_object(id)?;
    r.seek(content_start)?;
    lexer::parse_value(r, sink, session.refs)?;
    r.skip_white_spaces_and_comments()?;

    if let (Some(length), Some(dict)) = (stream_length, captured.as_dict()) {
        parse_stream(r, session, sink, dict, length, id)?;
        r.skip_white_spaces_and_comments()?;
    }

    lexer::expect_keyword(r, b"endobj")?;
    sink.end_object()
}

fn parse_object_header<S: ByteSource>(r: &mut Reader<S>) -> Result<ObjectId> {
    let header_offset = r.position();

    let number = lexer::parse_integer(r)?;
    r.skip_white_spaces_and_comments()?;
    let generation = lexer::parse_integer(r)?;
    r.skip_white_spaces_and_comments()?;
    lexer::expect_keyword(r, b"obj")?;

    xref::object_id(number, generation)
        .ok_or_else(|| Error::malformed(header_offset, "invalid object header"))
}

/// The stream phase: framing, the filter pipeline and the dispatcher.
fn parse_stream<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    sink: &mut dyn DocumentSink,
    dict: &Dict,
    length: u64,
    id: ObjectId,
) -> Result<()> {
    lexer::expect_keyword(r, b"stream")?;
    xref::consume_stream_eol(r)?;

    let is_object_stream = dict
        .get_name(keys::TYPE)
        .is_some_and(|t| t.as_bytes() == keys::OBJ_STM);
    let kind = if is_object_stream {
        StreamKind::ObjectStream
    } else {
        session.refs.stream_kind
    };

    let tee = is_object_stream.then(|| Rc::new(std::cell::RefCell::new(Vec::new())));

    sink.start_stream()?;

    {
        let parser: Option<Box<dyn StreamParser + '_>> = match kind {
            StreamKind::Content => session
                .content_sink
                .as_mut()
                .map(|s| Box::new(ContentParser::new(&mut **s)) as Box<dyn StreamParser + '_>),
            StreamKind::FontTrueType | StreamKind::FontOpenTypeCff => session
                .opentype_sink
                .as_mut()
                .map(|s| Box::new(OpenTypeParser::new(&mut **s)) as Box<dyn StreamParser + '_>),
            StreamKind::CMap => session
                .cmap_sink
                .as_mut()
                .map(|s| Box::new(CMapParser::new(&mut **s)) as Box<dyn StreamParser + '_>),
            _ => None,
        };

        let dispatcher = Dispatcher::new(&mut *sink, parser, tee.clone());
        let mut pipeline = FilterPipeline::build(dict, dispatcher);
        pump(r, &mut pipeline, length)?;
    }

    sink.end_stream()?;

    r.skip_white_spaces_and_comments()?;
    lexer::expect_keyword(r, b"endstream")?;

    if let Some(tee) = tee {
        let data = std::mem::take(&mut *tee.borrow_mut());
        let stream = ObjectStream::new(dict, data)?;
        session.streams.insert(id.number, Rc::new(stream));
    }

    Ok(())
}

/// Push exactly `length` raw bytes through the pipeline and close it.
fn pump<S: ByteSource>(
    r: &mut Reader<S>,
    pipeline: &mut FilterPipeline,
    length: u64,
) -> Result<()> {
    let mut remaining = length;
    let mut buf = [0u8; STREAM_CHUNK];

    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        r.read_exact_into(&mut buf[..n])?;
        pipeline.write(&buf[..n])?;
        remaining -= n as u64;
    }

    pipeline.close()
}

/// The declared `/Length`: a literal number, or an indirect reference
/// resolved by recursive lookup.
fn resolve_stream_length<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    dict: &Dict,
) -> Result<u64> {
    match dict.get(keys::LENGTH) {
        Some(Value::Number(n)) => u64::try_from(n.as_i64())
            .map_err(|_| Error::malformed(r.position(), "negative /Length")),
        Some(Value::Reference(id)) => resolve_length_reference(r, session, *id),
        _ => Err(Error::malformed(r.position(), "stream missing /Length")),
    }
}

fn resolve_length_reference<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    id: ObjectId,
) -> Result<u64> {
    if session.resolving.contains(&id) {
        return Err(Error::malformed(r.position(), "circular /Length reference"));
    }

    session.resolving.push(id);
    let value = resolve_value(r, session, id);
    session.resolving.pop();

    match value? {
        Value::Number(n) => u64::try_from(n.as_i64())
            .map_err(|_| Error::malformed(r.position(), "negative /Length")),
        _ => Err(Error::UnresolvedReference(id)),
    }
}

/// Fetch an object's value without emitting events, from either an InUse or
/// a Compressed location.
fn resolve_value<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    id: ObjectId,
) -> Result<Value> {
    let entry = session
        .xref
        .get(id)
        .copied()
        .ok_or(Error::UnresolvedReference(id))?;

    match entry {
        CrossReferenceEntry::Free { .. } => Err(Error::UnresolvedReference(id)),
        CrossReferenceEntry::InUse { offset, .. } => {
            let saved = r.position();

            r.seek(offset)?;
            r.skip_white_spaces_and_comments()?;
            let found = parse_object_header(r)?;
            if found != id {
                return Err(Error::InconsistentObject {
                    expected: id,
                    found,
                });
            }
            r.skip_white_spaces_and_comments()?;

            let mut capture = ValueCapture::new();
            let mut scratch = RefContext::new();
            lexer::parse_value(r, &mut capture, &mut scratch)?;
            let value = capture
                .take()
                .ok_or(Error::UnresolvedReference(id))?;

            r.seek(saved)?;

            Ok(value)
        }
        CrossReferenceEntry::Compressed { container, index } => {
            let saved = r.position();
            let stream = load_object_stream(r, session, container)?;
            r.seek(saved)?;

            let start = stream
                .object_start(index)
                .ok_or(Error::UnresolvedReference(id))?;

            let mut r2 = Reader::new(stream.data())?;
            r2.seek(start as u64)?;

            let mut capture = ValueCapture::new();
            let mut scratch = RefContext::new();
            lexer::parse_value(&mut r2, &mut capture, &mut scratch)?;

            capture.take().ok_or(Error::UnresolvedReference(id))
        }
    }
}

/// Decode and index an object stream, or return the cached copy.
fn load_object_stream<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    container: u32,
) -> Result<Rc<ObjectStream>> {
    if let Some(stream) = session.streams.get(container) {
        return Ok(stream);
    }

    let cid = ObjectId::new(container, 0);
    let entry = session
        .xref
        .get(cid)
        .copied()
        .ok_or(Error::UnresolvedReference(cid))?;

    let CrossReferenceEntry::InUse { offset, .. } = entry else {
        // The container of a compressed object is itself always InUse.
        return Err(Error::UnresolvedReference(cid));
    };

    let saved = r.position();

    r.seek(offset)?;
    r.skip_white_spaces_and_comments()?;
    let found = parse_object_header(r)?;
    if found != cid {
        return Err(Error::InconsistentObject {
            expected: cid,
            found,
        });
    }
    r.skip_white_spaces_and_comments()?;

    let dict_offset = r.position();
    let mut capture = ValueCapture::new();
    let mut scratch = RefContext::new();
    lexer::parse_value(r, &mut capture, &mut scratch)?;
    let Some(Value::Dictionary(dict)) = capture.take() else {
        return Err(Error::malformed(dict_offset, "object stream is not a stream"));
    };

    r.skip_white_spaces_and_comments()?;
    let length = resolve_stream_length(r, session, &dict)?;

    lexer::expect_keyword(r, b"stream")?;
    xref::consume_stream_eol(r)?;

    let (collector, decoded) = Collector::new();
    let mut pipeline = FilterPipeline::build(&dict, collector);
    pump(r, &mut pipeline, length)?;

    r.skip_white_spaces_and_comments()?;
    lexer::expect_keyword(r, b"endstream")?;

    let data = std::mem::take(&mut *decoded.borrow_mut());
    let stream = Rc::new(ObjectStream::new(&dict, data)?);
    session.streams.insert(container, stream.clone());

    r.seek(saved)?;

    Ok(stream)
}

/// Parse one object out of a decoded object stream. Objects in a stream
/// carry no `obj`/`endobj` framing.
fn parse_compressed<S: ByteSource>(
    r: &mut Reader<S>,
    session: &mut Session,
    sink: &mut dyn DocumentSink,
    id: ObjectId,
    container: u32,
    index: u32,
) -> Result<()> {
    let stream = load_object_stream(r, session, container)?;
    let start = stream
        .object_start(index)
        .ok_or(Error::UnresolvedReference(id))?;

    let mut r2 = Reader::new(stream.data())?;
    r2.seek(start as u64)?;

    sink.start_object(id)?;
    lexer::parse_value(&mut r2, sink, session.refs)?;
    sink.end_object()
}

/// Re-emit a captured value as events. Internal only: used for the
/// synthetic trailer object.
fn emit_value(
    sink: &mut dyn DocumentSink,
    refs: &mut RefContext,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Null => sink.null_value(),
        Value::Boolean(b) => sink.boolean_value(*b),
        Value::Number(n) => sink.number_value(*n),
        Value::String(s) => sink.string_value(s),
        Value::Name(n) => sink.name_value(n),
        Value::Reference(id) => {
            refs.pending.insert(*id, StreamKind::Default);
            sink.object_reference(*id)
        }
        Value::Array(items) => {
            sink.start_array()?;
            for item in items {
                emit_value(sink, refs, item)?;
            }
            sink.end_array()
        }
        Value::Dictionary(dict) => {
            sink.start_dictionary()?;
            for (key, item) in dict.iter() {
                sink.key(key)?;
                emit_value(sink, refs, item)?;
            }
            sink.end_dictionary()
        }
    }
}
