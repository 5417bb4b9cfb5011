//! Decoded object streams (`/Type /ObjStm`).
//!
//! An object stream packs multiple indirect objects into one decoded body:
//! an index table of `(object number, relative offset)` pairs, then the
//! object data starting at `/First`. Streams are decoded lazily on first
//! use and cached for the lifetime of the parse.

use crate::error::{Error, Result};
use crate::lexer;
use crate::object::{keys, Dict};
use crate::source::Reader;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// A decoded object stream plus its index.
pub(crate) struct ObjectStream {
    data: Vec<u8>,
    first: usize,
    offsets: Vec<usize>,
}

impl ObjectStream {
    /// Index a decoded object-stream body using the container's `/N` and
    /// `/First` entries.
    pub(crate) fn new(dict: &Dict, data: Vec<u8>) -> Result<Self> {
        let count = dict
            .get_i64(keys::N)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::malformed(0, "object stream missing /N"))?;
        let first = dict
            .get_i64(keys::FIRST)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::malformed(0, "object stream missing /First"))?;

        let mut r = Reader::new(data.as_slice())?;
        let mut offsets = Vec::with_capacity(count);

        for _ in 0..count {
            r.skip_white_spaces_and_comments()?;
            // The object number is recorded in the index but not needed to
            // address the data.
            lexer::parse_integer(&mut r)?;
            r.skip_white_spaces_and_comments()?;
            let relative = lexer::parse_integer(&mut r)?;

            let relative = usize::try_from(relative)
                .map_err(|_| Error::malformed(r.position(), "negative object offset"))?;
            offsets.push(relative);
        }

        Ok(Self {
            data,
            first,
            offsets,
        })
    }

    /// The decoded stream body.
    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    /// The number of contained objects.
    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    /// The absolute position of the object at `index` within the decoded
    /// body, or `None` if the index is out of range.
    pub(crate) fn object_start(&self, index: u32) -> Option<usize> {
        let relative = self.offsets.get(index as usize)?;
        let start = self.first.checked_add(*relative)?;

        (start <= self.data.len()).then_some(start)
    }
}

/// A cache of decoded object streams, keyed by container object number.
#[derive(Default)]
pub(crate) struct ObjectStreamCache {
    streams: FxHashMap<u32, Rc<ObjectStream>>,
}

impl ObjectStreamCache {
    pub(crate) fn get(&self, container: u32) -> Option<Rc<ObjectStream>> {
        self.streams.get(&container).cloned()
    }

    pub(crate) fn insert(&mut self, container: u32, stream: Rc<ObjectStream>) {
        self.streams.insert(container, stream);
    }

    pub(crate) fn clear(&mut self) {
        self.streams.clear();
    }
}
