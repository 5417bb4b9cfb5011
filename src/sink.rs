//! Event sinks.
//!
//! The parser never builds a document tree; it pushes typed events into a
//! sink owned by the application. All sink methods default to doing nothing,
//! so an implementation only overrides the events it cares about. Returning
//! an error from any callback aborts the current parse.

use crate::error::Result;
use crate::object::{Dict, Name, Number, ObjectId, Value};

/// The semantic type of a stream, inferred from the context it was
/// referenced in.
///
/// Streams are typed by where they are referenced from, not by the stream
/// object itself. The tag decides which specialized sub-parser (if any)
/// receives the decoded bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum StreamKind {
    /// No specialized handling; decoded bytes go to the document sink only.
    #[default]
    Default,
    /// A page or form XObject content stream.
    Content,
    /// A CMap (e.g. `/ToUnicode`).
    CMap,
    /// An XMP metadata stream.
    Metadata,
    /// A Type 1 font program (`/FontFile`).
    FontType1,
    /// A TrueType font program (`/FontFile2`).
    FontTrueType,
    /// An OpenType font program with CFF outlines.
    FontOpenTypeCff,
    /// A bare CFF font program (`/FontFile3`).
    FontCff,
    /// An ICC color profile.
    IccProfile,
    /// An object stream (`/Type /ObjStm`).
    ObjectStream,
    /// A cross-reference stream (`/Type /XRef`).
    XrefStream,
}

/// The primary event sink: receives the full parse event stream.
#[allow(unused_variables)]
pub trait DocumentSink {
    /// An indirect object definition begins.
    fn start_object(&mut self, id: ObjectId) -> Result<()> {
        Ok(())
    }

    /// The current indirect object definition ends.
    fn end_object(&mut self) -> Result<()> {
        Ok(())
    }

    /// A dictionary begins.
    fn start_dictionary(&mut self) -> Result<()> {
        Ok(())
    }

    /// A dictionary key. Exactly one value event follows before the next
    /// key or `end_dictionary`.
    fn key(&mut self, key: &Name) -> Result<()> {
        Ok(())
    }

    /// The current dictionary ends.
    fn end_dictionary(&mut self) -> Result<()> {
        Ok(())
    }

    /// An array begins.
    fn start_array(&mut self) -> Result<()> {
        Ok(())
    }

    /// The current array ends.
    fn end_array(&mut self) -> Result<()> {
        Ok(())
    }

    /// A boolean value.
    fn boolean_value(&mut self, value: bool) -> Result<()> {
        Ok(())
    }

    /// A numeric value.
    fn number_value(&mut self, value: Number) -> Result<()> {
        Ok(())
    }

    /// A string value. The bytes are the decoded string contents.
    fn string_value(&mut self, value: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A name value.
    fn name_value(&mut self, value: &Name) -> Result<()> {
        Ok(())
    }

    /// The null value.
    fn null_value(&mut self) -> Result<()> {
        Ok(())
    }

    /// A reference to an indirect object.
    fn object_reference(&mut self, id: ObjectId) -> Result<()> {
        Ok(())
    }

    /// A stream body begins. Zero or more `stream_content` calls follow.
    fn start_stream(&mut self) -> Result<()> {
        Ok(())
    }

    /// A chunk of decoded stream content. The buffer is transient; copy it
    /// if you retain it.
    fn stream_content(&mut self, data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// The current stream body ends.
    fn end_stream(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A specialized parser for decoded stream content.
///
/// Decoded bytes arrive in chunks at arbitrary boundaries. A parser consumes
/// what it can and reports how many bytes it took; the dispatcher retains the
/// unconsumed suffix and re-presents it prefixed to the next chunk. On close,
/// whatever is still deferred is presented one final time.
pub trait StreamParser {
    /// Consume decoded bytes; returns the number of bytes consumed.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Final flush: `remainder` holds any bytes still deferred.
    fn close(&mut self, remainder: &[u8]) -> Result<()>;
}

/// Receives content-stream operations.
///
/// Operator dispatch beyond tokenization is the application's business: each
/// operation arrives as the operator name plus its operand values, unknown
/// operators included.
pub trait ContentSink {
    /// A content operation: operator plus the operands preceding it.
    fn operation(&mut self, operator: &Name, operands: &[Value]) -> Result<()>;
}

/// Receives the table directory of an OpenType/TrueType font program.
#[allow(unused_variables)]
pub trait OpenTypeSink {
    /// The font program begins: sfnt version word and table count.
    fn begin_font(&mut self, sfnt_version: u32, num_tables: u16) -> Result<()> {
        Ok(())
    }

    /// One table-directory entry, with the raw table bytes.
    fn table(&mut self, tag: [u8; 4], checksum: u32, data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// The font program ends.
    fn end_font(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives CMap mappings (e.g. from a `/ToUnicode` stream).
///
/// Codes and destinations are hex-decoded bytes; destinations of `bf`
/// mappings are UTF-16BE code units.
#[allow(unused_variables)]
pub trait CMapSink {
    /// CMap parsing begins.
    fn begin_cmap(&mut self) -> Result<()> {
        Ok(())
    }

    /// CMap parsing ends.
    fn end_cmap(&mut self) -> Result<()> {
        Ok(())
    }

    /// A codespace range: the byte length of `low` defines the code width.
    fn codespace_range(&mut self, low: &[u8], high: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A single code-to-Unicode mapping (`bfchar`).
    fn bf_char(&mut self, code: &[u8], unicode: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A range mapping to consecutive Unicode values (`bfrange`).
    fn bf_range(&mut self, low: &[u8], high: &[u8], start_unicode: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A range mapping to an explicit array of Unicode values (`bfrange`).
    fn bf_range_array(&mut self, low: &[u8], high: &[u8], dests: &[Vec<u8>]) -> Result<()> {
        Ok(())
    }
}

enum Container {
    Array(Vec<Value>),
    Dict(Dict, Option<Name>),
}

/// An internal sink that reconstructs the next value from the event stream.
///
/// A small stack machine: `start_array`/`start_dictionary` push a container,
/// scalar events attach to the top container, `end_*` pop and attach to the
/// parent or become the final result.
#[derive(Default)]
pub(crate) struct ValueCapture {
    stack: Vec<Container>,
    result: Option<Value>,
}

impl ValueCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The completed top-level value, if one has been captured.
    pub(crate) fn take(&mut self) -> Option<Value> {
        self.result.take()
    }

    fn add(&mut self, value: Value) {
        match self.stack.last_mut() {
            None => self.result = Some(value),
            Some(Container::Array(items)) => items.push(value),
            Some(Container::Dict(dict, key)) => {
                if let Some(key) = key.take() {
                    dict.insert(key, value);
                }
            }
        }
    }
}

impl DocumentSink for ValueCapture {
    fn start_dictionary(&mut self) -> Result<()> {
        self.stack.push(Container::Dict(Dict::new(), None));
        Ok(())
    }

    fn key(&mut self, key: &Name) -> Result<()> {
        if let Some(Container::Dict(_, pending)) = self.stack.last_mut() {
            *pending = Some(key.clone());
        }
        Ok(())
    }

    fn end_dictionary(&mut self) -> Result<()> {
        if let Some(Container::Dict(dict, _)) = self.stack.pop() {
            self.add(Value::Dictionary(dict));
        }
        Ok(())
    }

    fn start_array(&mut self) -> Result<()> {
        self.stack.push(Container::Array(Vec::new()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        if let Some(Container::Array(items)) = self.stack.pop() {
            self.add(Value::Array(items));
        }
        Ok(())
    }

    fn boolean_value(&mut self, value: bool) -> Result<()> {
        self.add(Value::Boolean(value));
        Ok(())
    }

    fn number_value(&mut self, value: Number) -> Result<()> {
        self.add(Value::Number(value));
        Ok(())
    }

    fn string_value(&mut self, value: &[u8]) -> Result<()> {
        self.add(Value::String(value.to_vec()));
        Ok(())
    }

    fn name_value(&mut self, value: &Name) -> Result<()> {
        self.add(Value::Name(value.clone()));
        Ok(())
    }

    fn null_value(&mut self) -> Result<()> {
        self.add(Value::Null);
        Ok(())
    }

    fn object_reference(&mut self, id: ObjectId) -> Result<()> {
        self.add(Value::Reference(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::object::{Name, Number, ObjectId, Value};
    use crate::sink::{DocumentSink, ValueCapture};

    #[test]
    fn captures_nested_containers() {
        let mut capture = ValueCapture::new();

        capture.start_dictionary().unwrap();
        capture.key(&Name::new(b"Kids")).unwrap();
        capture.start_array().unwrap();
        capture.object_reference(ObjectId::new(3, 0)).unwrap();
        capture.end_array().unwrap();
        capture.key(&Name::new(b"Count")).unwrap();
        capture.number_value(Number::Int(1)).unwrap();
        capture.end_dictionary().unwrap();

        let Value::Dictionary(dict) = capture.take().unwrap() else {
            panic!("expected a dictionary");
        };
        assert_eq!(
            dict.get_array(b"Kids").unwrap(),
            &[Value::Reference(ObjectId::new(3, 0))]
        );
        assert_eq!(dict.get_i64(b"Count"), Some(1));
    }

    #[test]
    fn captures_scalar() {
        let mut capture = ValueCapture::new();
        capture.number_value(Number::Int(42)).unwrap();
        assert_eq!(capture.take(), Some(Value::Number(Number::Int(42))));
    }
}
