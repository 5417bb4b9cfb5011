//! The owned PDF value model.
//!
//! The lexer streams events and retains nothing, but a few places need a
//! materialized value: the trailer dictionary, stream dictionaries (for
//! `/Length` and the filter chain), and the value-capture sink that builds
//! them. These types are that model.

pub mod name;

pub use name::Name;

use log::debug;
use std::fmt::{self, Display, Formatter};

/// The identity of an indirect object: object number and generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// The object number.
    pub number: u32,
    /// The generation number.
    pub generation: u16,
}

impl ObjectId {
    /// Create a new object identifier.
    #[inline]
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// A PDF number: an integer or a real.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    /// An integer.
    Int(i64),
    /// A real.
    Real(f64),
}

impl Number {
    /// Returns the number as an i64, truncating a real.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Number::Int(i) => i,
            Number::Real(r) => {
                let res = r as i64;

                if r.trunc() != r {
                    debug!("real {r} was truncated to {res}");
                }

                res
            }
        }
    }

    /// Returns the number as an f64.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(i) => i as f64,
            Number::Real(r) => r,
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Real(r) => write!(f, "{r}"),
        }
    }
}

/// An owned PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null object.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A number.
    Number(Number),
    /// A string; raw decoded bytes.
    String(Vec<u8>),
    /// A name.
    Name(Name),
    /// A reference to an indirect object.
    Reference(ObjectId),
    /// An array.
    Array(Vec<Value>),
    /// A dictionary.
    Dictionary(Dict),
}

impl Value {
    /// The value as an integer, if it is a number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(n.as_i64()),
            _ => None,
        }
    }

    /// The value as a name.
    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    /// The value as a reference.
    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The value as an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The value as a dictionary.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

/// An owned PDF dictionary.
///
/// Entries keep their first-seen order, so re-emitting a captured dictionary
/// reproduces document order. Lookup scans from the back: when a key occurs
/// twice, the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(Name, Value)>,
}

impl Dict {
    /// Create a new, empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry.
    pub fn insert(&mut self, key: Name, value: Value) {
        self.entries.push((key, value));
    }

    /// Look up a value by key bytes.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.as_bytes() == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if an entry with the given key exists.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Look up an integer value.
    pub fn get_i64(&self, key: &[u8]) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Look up a name value.
    pub fn get_name(&self, key: &[u8]) -> Option<&Name> {
        self.get(key).and_then(Value::as_name)
    }

    /// Look up a reference value.
    pub fn get_reference(&self, key: &[u8]) -> Option<ObjectId> {
        self.get(key).and_then(Value::as_reference)
    }

    /// Look up an array value.
    pub fn get_array(&self, key: &[u8]) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    /// Iterate over the entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// Dictionary keys and filter names used by the engine.
pub(crate) mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &[u8] = $e;
        };
    }

    key!(BITS_PER_COMPONENT, b"BitsPerComponent");
    key!(COLORS, b"Colors");
    key!(COLUMNS, b"Columns");
    key!(CONTENTS, b"Contents");
    key!(DECODE_PARMS, b"DecodeParms");
    key!(DP, b"DP");
    key!(EARLY_CHANGE, b"EarlyChange");
    key!(F, b"F");
    key!(FILTER, b"Filter");
    key!(FIRST, b"First");
    key!(FONT_FILE, b"FontFile");
    key!(FONT_FILE2, b"FontFile2");
    key!(FONT_FILE3, b"FontFile3");
    key!(INDEX, b"Index");
    key!(INFO, b"Info");
    key!(LENGTH, b"Length");
    key!(METADATA, b"Metadata");
    key!(N, b"N");
    key!(OBJ_STM, b"ObjStm");
    key!(PAGE, b"Page");
    key!(PREDICTOR, b"Predictor");
    key!(PREV, b"Prev");
    key!(ROOT, b"Root");
    key!(SIZE, b"Size");
    key!(TO_UNICODE, b"ToUnicode");
    key!(TYPE, b"Type");
    key!(W, b"W");
    key!(XOBJECT, b"XObject");

    key!(ASCII_HEX_DECODE, b"ASCIIHexDecode");
    key!(ASCII_HEX_DECODE_ABBREVIATION, b"AHx");
    key!(ASCII85_DECODE, b"ASCII85Decode");
    key!(ASCII85_DECODE_ABBREVIATION, b"A85");
    key!(FLATE_DECODE, b"FlateDecode");
    key!(FLATE_DECODE_ABBREVIATION, b"Fl");
    key!(LZW_DECODE, b"LZWDecode");
    key!(LZW_DECODE_ABBREVIATION, b"LZW");
    key!(RUN_LENGTH_DECODE, b"RunLengthDecode");
    key!(RUN_LENGTH_DECODE_ABBREVIATION, b"RL");
}

#[cfg(test)]
mod tests {
    use crate::object::{Dict, Name, Number, ObjectId, Value};

    #[test]
    fn object_id_display() {
        assert_eq!(ObjectId::new(12, 3).to_string(), "12 3 R");
    }

    #[test]
    fn number_narrowing() {
        assert_eq!(Number::Int(42).as_i64(), 42);
        assert_eq!(Number::Real(2.5).as_f64(), 2.5);
        assert_eq!(Number::Real(3.0).as_i64(), 3);
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let mut dict = Dict::new();
        dict.insert(Name::new(b"K"), Value::Number(Number::Int(1)));
        dict.insert(Name::new(b"K"), Value::Number(Number::Int(2)));

        assert_eq!(dict.get_i64(b"K"), Some(2));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn iteration_keeps_first_seen_order() {
        let mut dict = Dict::new();
        dict.insert(Name::new(b"Size"), Value::Number(Number::Int(3)));
        dict.insert(Name::new(b"Root"), Value::Reference(ObjectId::new(1, 0)));

        let keys: Vec<_> = dict.iter().map(|(k, _)| k.as_str().to_owned()).collect();
        assert_eq!(keys, ["Size", "Root"]);
    }
}
