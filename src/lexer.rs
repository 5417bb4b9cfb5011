//! The recursive-descent object reader.
//!
//! Tokenizes PDF syntax from a [`Reader`] and pushes typed events into the
//! sink it is handed. The lexer retains nothing; composite values nest by
//! recursion and every event fires in document order.

use crate::error::{Error, Result};
use crate::object::{keys, Name, Number, ObjectId};
use crate::sink::{DocumentSink, StreamKind};
use crate::source::{ByteSource, Reader};
use crate::trivia::{decode_hex_digit, is_regular_character, is_white_space_character};
use log::debug;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// References collected during the most recent parse step, in first-seen
/// order. Re-inserting an id keeps its position but updates the kind, so the
/// second (document-sink) pass refines the inference of the capture pass.
#[derive(Default)]
pub(crate) struct PendingRefs {
    order: Vec<ObjectId>,
    kinds: FxHashMap<ObjectId, StreamKind>,
}

impl PendingRefs {
    pub(crate) fn insert(&mut self, id: ObjectId, kind: StreamKind) {
        if self.kinds.insert(id, kind).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.kinds.clear();
    }

    pub(crate) fn drain(&mut self) -> Vec<(ObjectId, StreamKind)> {
        let drained = self
            .order
            .iter()
            .map(|id| (*id, self.kinds[id]))
            .collect();
        self.clear();

        drained
    }
}

/// Traversal context threaded through the lexer: the dictionary key and
/// object `/Type` currently in scope, the kind the current object was
/// referenced as, and the references collected so far.
#[derive(Default)]
pub(crate) struct RefContext {
    pub(crate) pending: PendingRefs,
    pub(crate) current_key: Option<Name>,
    pub(crate) current_type: Option<Name>,
    pub(crate) stream_kind: StreamKind,
}

impl RefContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self, kind: StreamKind) {
        self.pending.clear();
        self.current_key = None;
        self.current_type = None;
        self.stream_kind = kind;
    }

    /// Infer the stream kind of a reference about to be emitted from the
    /// current key and the current object's `/Type`.
    fn inferred_kind(&self) -> StreamKind {
        let Some(key) = self.current_key.as_ref() else {
            return StreamKind::Default;
        };

        match key.as_bytes() {
            keys::CONTENTS => {
                let page_like = self
                    .current_type
                    .as_ref()
                    .is_some_and(|t| t.as_bytes() == keys::PAGE || t.as_bytes() == keys::XOBJECT);

                if page_like {
                    StreamKind::Content
                } else {
                    StreamKind::Default
                }
            }
            keys::TO_UNICODE => StreamKind::CMap,
            keys::METADATA => StreamKind::Metadata,
            keys::FONT_FILE => StreamKind::FontType1,
            keys::FONT_FILE2 => StreamKind::FontTrueType,
            keys::FONT_FILE3 => StreamKind::FontCff,
            _ => StreamKind::Default,
        }
    }
}

/// Parse a single value at the current position, emitting its events.
pub(crate) fn parse_value<S: ByteSource>(
    r: &mut Reader<S>,
    sink: &mut dyn DocumentSink,
    refs: &mut RefContext,
) -> Result<()> {
    r.skip_white_spaces_and_comments()?;

    let offset = r.position();
    match r.peek()? {
        None => Err(Error::Truncated { offset }),
        Some(b'/') => {
            let name = parse_name(r)?;
            sink.name_value(&name)
        }
        Some(b'(') => parse_literal_string(r, sink),
        Some(b'<') => {
            if r.peek_at(1)? == Some(b'<') {
                parse_dictionary(r, sink, refs)
            } else {
                parse_hex_string(r, sink)
            }
        }
        Some(b'[') => parse_array(r, sink, refs),
        Some(b't') => {
            expect_keyword(r, b"true")?;
            sink.boolean_value(true)
        }
        Some(b'f') => {
            expect_keyword(r, b"false")?;
            sink.boolean_value(false)
        }
        Some(b'n') => {
            expect_keyword(r, b"null")?;
            sink.null_value()
        }
        Some(b'+' | b'-' | b'.' | b'0'..=b'9') => parse_number_or_reference(r, sink, refs),
        Some(b) => Err(Error::malformed(
            offset,
            format!("unexpected byte 0x{b:02x} at start of value"),
        )),
    }
}

/// Parse a name, including its leading solidus. `#hh` escapes are decoded.
pub(crate) fn parse_name<S: ByteSource>(r: &mut Reader<S>) -> Result<Name> {
    let offset = r.position();
    if !r.forward_tag(b"/")? {
        return Err(Error::malformed(offset, "expected '/'"));
    }

    let mut bytes: SmallVec<[u8; 23]> = SmallVec::new();

    while let Some(b) = r.eat(is_regular_character)? {
        if b == b'#' {
            let offset = r.position();
            let hi = hex_escape_digit(r, offset)?;
            let lo = hex_escape_digit(r, offset)?;

            // decode_hex_digit cannot fail on ascii hex digits.
            let decoded = decode_hex_digit(hi).unwrap_or(0) << 4 | decode_hex_digit(lo).unwrap_or(0);
            if decoded == 0 {
                return Err(Error::malformed(offset, "name contains zero byte"));
            }

            bytes.push(decoded);
        } else {
            bytes.push(b);
        }
    }

    Ok(Name::new(&bytes))
}

fn hex_escape_digit<S: ByteSource>(r: &mut Reader<S>, offset: u64) -> Result<u8> {
    match r.eat(|n| n.is_ascii_hexdigit())? {
        Some(digit) => Ok(digit),
        None => match r.peek()? {
            None => Err(Error::Truncated {
                offset: r.position(),
            }),
            Some(_) => Err(Error::malformed(offset, "invalid hex escape in name")),
        },
    }
}

fn parse_literal_string<S: ByteSource>(
    r: &mut Reader<S>,
    sink: &mut dyn DocumentSink,
) -> Result<()> {
    // Caller peeked the opening parenthesis.
    r.forward();

    let mut bytes = Vec::new();
    let mut depth = 1u32;

    while depth > 0 {
        let offset = r.position();
        let b = r.read_byte()?.ok_or(Error::Truncated { offset })?;

        match b {
            b'(' => {
                depth += 1;
                bytes.push(b);
            }
            b')' => {
                depth -= 1;
                if depth > 0 {
                    bytes.push(b);
                }
            }
            b'\\' => {
                let offset = r.position();
                let escaped = r.read_byte()?.ok_or(Error::Truncated { offset })?;

                match escaped {
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b't' => bytes.push(b'\t'),
                    b'b' => bytes.push(0x08),
                    b'f' => bytes.push(0x0c),
                    b'(' | b')' | b'\\' => bytes.push(escaped),
                    b'\r' => {
                        // Line continuation; swallows a following LF.
                        if r.peek()? == Some(b'\n') {
                            r.forward();
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut octal = (escaped - b'0') as u32;
                        for _ in 0..2 {
                            match r.peek()? {
                                Some(d @ b'0'..=b'7') => {
                                    r.forward();
                                    octal = octal << 3 | (d - b'0') as u32;
                                }
                                _ => break,
                            }
                        }
                        // High-order overflow is dropped.
                        bytes.push(octal as u8);
                    }
                    other => bytes.push(other),
                }
            }
            other => bytes.push(other),
        }
    }

    sink.string_value(&bytes)
}

fn parse_hex_string<S: ByteSource>(r: &mut Reader<S>, sink: &mut dyn DocumentSink) -> Result<()> {
    // Caller peeked the opening angle bracket.
    r.forward();

    let mut bytes = Vec::new();
    let mut pending: Option<u8> = None;

    loop {
        let offset = r.position();
        let b = r.read_byte()?.ok_or(Error::Truncated { offset })?;

        match b {
            b'>' => break,
            b if is_white_space_character(b) => {}
            b => match decode_hex_digit(b) {
                Some(nibble) => match pending.take() {
                    Some(hi) => bytes.push(hi << 4 | nibble),
                    None => pending = Some(nibble),
                },
                None => debug!("ignoring invalid hex character 0x{b:02x} in string"),
            },
        }
    }

    // An odd trailing nibble is the high nibble of a zero-padded byte.
    if let Some(hi) = pending {
        bytes.push(hi << 4);
    }

    sink.string_value(&bytes)
}

fn parse_dictionary<S: ByteSource>(
    r: &mut Reader<S>,
    sink: &mut dyn DocumentSink,
    refs: &mut RefContext,
) -> Result<()> {
    // Caller peeked "<<".
    r.forward();
    r.forward();

    sink.start_dictionary()?;

    loop {
        r.skip_white_spaces_and_comments()?;

        let offset = r.position();
        match r.peek()? {
            None => return Err(Error::Truncated { offset }),
            Some(b'>') => {
                r.forward();
                match r.read_byte()? {
                    Some(b'>') => break,
                    Some(_) => return Err(Error::malformed(offset, "expected '>>'")),
                    None => {
                        return Err(Error::Truncated {
                            offset: r.position(),
                        });
                    }
                }
            }
            Some(b'/') => {
                let key = parse_name(r)?;
                refs.current_key = Some(key.clone());
                sink.key(&key)?;
                parse_value(r, sink, refs)?;
            }
            Some(b) => {
                return Err(Error::malformed(
                    offset,
                    format!("expected name key, found 0x{b:02x}"),
                ));
            }
        }
    }

    sink.end_dictionary()
}

fn parse_array<S: ByteSource>(
    r: &mut Reader<S>,
    sink: &mut dyn DocumentSink,
    refs: &mut RefContext,
) -> Result<()> {
    // Caller peeked the opening bracket.
    r.forward();

    sink.start_array()?;

    loop {
        r.skip_white_spaces_and_comments()?;

        let offset = r.position();
        match r.peek()? {
            None => return Err(Error::Truncated { offset }),
            Some(b']') => {
                r.forward();
                break;
            }
            _ => parse_value(r, sink, refs)?,
        }
    }

    sink.end_array()
}

/// A number, or the start of an `N G R` reference. The follow-on integer and
/// `R` are parsed speculatively; any deviation restores the position and the
/// first number stands alone.
fn parse_number_or_reference<S: ByteSource>(
    r: &mut Reader<S>,
    sink: &mut dyn DocumentSink,
    refs: &mut RefContext,
) -> Result<()> {
    let n1 = parse_number(r)?;

    if let Number::Int(number) = n1 {
        if (0..=u32::MAX as i64).contains(&number) {
            let mark = r.position();
            r.skip_white_spaces_and_comments()?;

            if matches!(r.peek()?, Some(b'0'..=b'9')) {
                if let Some(generation) = try_unsigned_integer(r)? {
                    r.skip_white_spaces_and_comments()?;

                    if (0..=u16::MAX as i64).contains(&generation) && r.forward_tag(b"R")? {
                        let id = ObjectId::new(number as u32, generation as u16);
                        refs.pending.insert(id, refs.inferred_kind());

                        return sink.object_reference(id);
                    }
                }
            }

            r.seek(mark)?;
        }
    }

    sink.number_value(n1)
}

/// Parse a number: optional sign, digits, optional fraction. A `.` makes it
/// a real; everything else is an integer.
pub(crate) fn parse_number<S: ByteSource>(r: &mut Reader<S>) -> Result<Number> {
    let offset = r.position();
    let mut buf: SmallVec<[u8; 24]> = SmallVec::new();

    if let Some(sign) = r.eat(|b| b == b'+' || b == b'-')? {
        buf.push(sign);
    }

    let mut real = false;
    loop {
        match r.peek()? {
            Some(b) if b.is_ascii_digit() => {
                r.forward();
                buf.push(b);
            }
            Some(b'.') if !real => {
                r.forward();
                real = true;
                buf.push(b'.');
            }
            _ => break,
        }
    }

    if !buf.iter().any(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(offset, "invalid number"));
    }

    if real {
        // The bytes are ASCII digits, a sign and a dot, so both conversions
        // are infallible in practice.
        let text = std::str::from_utf8(&buf)
            .map_err(|_| Error::malformed(offset, "invalid number"))?;
        let num = text
            .parse::<f64>()
            .map_err(|_| Error::malformed(offset, "invalid number"))?;

        Ok(Number::Real(num))
    } else {
        let negative = buf.first() == Some(&b'-');
        let digits = buf.iter().filter(|b| b.is_ascii_digit());

        let mut value: i64 = 0;
        for d in digits {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((d - b'0') as i64))
                .ok_or_else(|| Error::malformed(offset, "integer overflow"))?;
        }

        Ok(Number::Int(if negative { -value } else { value }))
    }
}

/// Parse an unsigned decimal integer, failing with `Malformed` when the next
/// byte is not a digit.
pub(crate) fn parse_integer<S: ByteSource>(r: &mut Reader<S>) -> Result<i64> {
    let offset = r.position();

    try_unsigned_integer(r)?
        .ok_or_else(|| Error::malformed(offset, "expected integer"))
}

/// Accumulate decimal digits into an integer. Returns `None` when there is
/// no digit at the cursor or the value overflows (the caller rolls back).
fn try_unsigned_integer<S: ByteSource>(r: &mut Reader<S>) -> Result<Option<i64>> {
    let mut value: i64 = 0;
    let mut seen = false;

    while let Some(d) = r.eat(|b| b.is_ascii_digit())? {
        seen = true;
        value = match value
            .checked_mul(10)
            .and_then(|v| v.checked_add((d - b'0') as i64))
        {
            Some(v) => v,
            None => return Ok(None),
        };
    }

    Ok(seen.then_some(value))
}

/// Require the given keyword at the cursor.
pub(crate) fn expect_keyword<S: ByteSource>(r: &mut Reader<S>, keyword: &[u8]) -> Result<()> {
    let offset = r.position();

    if r.forward_tag(keyword)? {
        Ok(())
    } else {
        Err(Error::malformed(
            offset,
            format!("expected '{}'", String::from_utf8_lossy(keyword)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::{parse_value, RefContext};
    use crate::object::{Number, ObjectId, Value};
    use crate::sink::ValueCapture;
    use crate::source::Reader;

    fn capture(data: &[u8]) -> Value {
        let mut r = Reader::new(data).unwrap();
        let mut sink = ValueCapture::new();
        let mut refs = RefContext::new();
        parse_value(&mut r, &mut sink, &mut refs).unwrap();

        sink.take().unwrap()
    }

    fn capture_err(data: &[u8]) -> crate::error::Error {
        let mut r = Reader::new(data).unwrap();
        let mut sink = ValueCapture::new();
        let mut refs = RefContext::new();

        parse_value(&mut r, &mut sink, &mut refs).unwrap_err()
    }

    #[test]
    fn keywords() {
        assert_eq!(capture(b"true"), Value::Boolean(true));
        assert_eq!(capture(b"false"), Value::Boolean(false));
        assert_eq!(capture(b"null"), Value::Null);
    }

    #[test]
    fn numbers() {
        assert_eq!(capture(b"0"), Value::Number(Number::Int(0)));
        assert_eq!(capture(b"+32"), Value::Number(Number::Int(32)));
        assert_eq!(capture(b"-32"), Value::Number(Number::Int(-32)));
        assert_eq!(capture(b"003245"), Value::Number(Number::Int(3245)));
        assert_eq!(capture(b"-.345"), Value::Number(Number::Real(-0.345)));
        assert_eq!(capture(b"34.5"), Value::Number(Number::Real(34.5)));
        assert_eq!(capture(b"6."), Value::Number(Number::Real(6.0)));
    }

    #[test]
    fn number_decimal_round_trip() {
        for n in [0i64, 7, -819, 65537, 4294967296] {
            let text = n.to_string();
            assert_eq!(capture(text.as_bytes()), Value::Number(Number::Int(n)));
        }
    }

    #[test]
    fn names() {
        let name = |b: &[u8]| capture(b).as_name().unwrap().as_bytes().to_vec();

        assert_eq!(name(b"/Name1"), b"Name1");
        assert_eq!(name(b"/A;Name_With-Various***Characters?"), b"A;Name_With-Various***Characters?");
        assert_eq!(name(b"/lime#20Green"), b"lime Green");
        assert_eq!(name(b"/paired#28#29parentheses"), b"paired()parentheses");
        assert_eq!(name(b"/A#3b"), b"A;");
        assert_eq!(name(b"/A#3B"), b"A;");
        assert_eq!(name(b"/"), b"");
    }

    #[test]
    fn name_bad_escape() {
        assert!(matches!(
            capture_err(b"/AB#FG"),
            crate::error::Error::Malformed { .. }
        ));
    }

    #[test]
    fn name_zero_byte() {
        assert!(matches!(
            capture_err(b"/A#00B"),
            crate::error::Error::Malformed { .. }
        ));
    }

    #[test]
    fn literal_strings() {
        let string = |b: &[u8]| match capture(b) {
            Value::String(s) => s,
            other => panic!("expected string, got {other:?}"),
        };

        assert_eq!(string(b"()"), b"");
        assert_eq!(string(b"(Hi there.)"), b"Hi there.");
        assert_eq!(string(b"(Hi (()) there)"), b"Hi (()) there");
        assert_eq!(string(b"(Hi \\()"), b"Hi (");
        assert_eq!(string(b"(a\\nb)"), b"a\nb");
        assert_eq!(string(b"(a\\tb\\bc\\fd)"), b"a\tb\x08c\x0cd");
        assert_eq!(string(b"(Hi \\\nthere)"), b"Hi there");
        assert_eq!(string(b"(Hi \\\r\nthere)"), b"Hi there");
        assert_eq!(string(b"(\\3)"), b"\x03");
        assert_eq!(string(b"(\\053)"), b"+");
        assert_eq!(string(b"(\\05354)"), b"+54");
        // Unrecognized escapes pass the escaped byte through.
        assert_eq!(string(b"(\\q)"), b"q");
    }

    #[test]
    fn literal_string_unterminated() {
        assert!(matches!(
            capture_err(b"(Hi"),
            crate::error::Error::Truncated { .. }
        ));
    }

    #[test]
    fn hex_strings() {
        let string = |b: &[u8]| match capture(b) {
            Value::String(s) => s,
            other => panic!("expected string, got {other:?}"),
        };

        assert_eq!(string(b"<>"), b"");
        assert_eq!(string(b"<00010203>"), [0x00, 0x01, 0x02, 0x03]);
        assert_eq!(string(b"<000102034>"), [0x00, 0x01, 0x02, 0x03, 0x40]);
        assert_eq!(string(b"<1  3 4>"), [0x13, 0x40]);
    }

    #[test]
    fn references() {
        assert_eq!(capture(b"34 1 R"), Value::Reference(ObjectId::new(34, 1)));
        assert_eq!(capture(b"256 0 R (hi)"), Value::Reference(ObjectId::new(256, 0)));
    }

    #[test]
    fn reference_rollback() {
        // Two plain numbers; the speculation must restore the position so
        // the second number can be read again.
        let data = b"256 257";
        let mut r = Reader::new(&data[..]).unwrap();
        let mut sink = ValueCapture::new();
        let mut refs = RefContext::new();

        parse_value(&mut r, &mut sink, &mut refs).unwrap();
        assert_eq!(sink.take(), Some(Value::Number(Number::Int(256))));

        parse_value(&mut r, &mut sink, &mut refs).unwrap();
        assert_eq!(sink.take(), Some(Value::Number(Number::Int(257))));
    }

    #[test]
    fn reference_not_taken_for_reals() {
        let data = b"1 2.5 R";
        let mut r = Reader::new(&data[..]).unwrap();
        let mut sink = ValueCapture::new();
        let mut refs = RefContext::new();

        parse_value(&mut r, &mut sink, &mut refs).unwrap();
        assert_eq!(sink.take(), Some(Value::Number(Number::Int(1))));
    }

    #[test]
    fn arrays() {
        let value = capture(b"[45 /Two (three)]");
        let items = value.as_array().unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Value::Number(Number::Int(45)));
    }

    #[test]
    fn dictionaries() {
        let value = capture(b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
        let dict = value.as_dict().unwrap();

        assert_eq!(dict.get_name(b"Type").unwrap().as_bytes(), b"Page");
        assert_eq!(dict.get_reference(b"Parent"), Some(ObjectId::new(2, 0)));
        assert_eq!(dict.get_array(b"MediaBox").unwrap().len(), 4);
    }

    #[test]
    fn nested_dictionaries() {
        let value = capture(b"<< /A << /B [1 2] >> >>");
        let dict = value.as_dict().unwrap();
        let inner = dict.get(b"A").unwrap().as_dict().unwrap();

        assert_eq!(inner.get_array(b"B").unwrap().len(), 2);
    }

    #[test]
    fn dictionary_rejects_non_name_key() {
        assert!(matches!(
            capture_err(b"<< 42 /Value >>"),
            crate::error::Error::Malformed { .. }
        ));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            capture(b"% leading comment\n 42"),
            Value::Number(Number::Int(42))
        );
    }
}
