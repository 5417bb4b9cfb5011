//! The content-stream sub-parser.
//!
//! Tokenizes decoded content-stream bytes with the same lexical rules as
//! the body lexer and hands `(operator, operands)` pairs to the content
//! sink. Operator dispatch is the sink's business; unknown operators are
//! delivered like any other.

use crate::error::{Error, Result};
use crate::lexer::{self, RefContext};
use crate::object::{Name, Value};
use crate::sink::{ContentSink, StreamParser, ValueCapture};
use crate::source::Reader;
use crate::trivia::is_regular_character;
use log::warn;

pub(crate) struct ContentParser<'a> {
    sink: &'a mut dyn ContentSink,
    operands: Vec<Value>,
}

impl<'a> ContentParser<'a> {
    pub(crate) fn new(sink: &'a mut dyn ContentSink) -> Self {
        Self {
            sink,
            operands: Vec::new(),
        }
    }

    /// Parse complete operations out of `data`. Returns the number of bytes
    /// consumed; an operation whose bytes may continue in the next chunk is
    /// deferred in full.
    fn scan(&mut self, data: &[u8], last: bool) -> Result<usize> {
        self.operands.clear();

        let mut r = Reader::new(data)?;
        let mut consumed = 0usize;

        loop {
            r.skip_white_spaces_and_comments()?;

            let Some(b) = r.peek()? else {
                if self.operands.is_empty() {
                    consumed = data.len();
                }
                break;
            };

            if matches!(b, b'/' | b'.' | b'+' | b'-' | b'0'..=b'9' | b'[' | b'<' | b'(') {
                let mut capture = ValueCapture::new();
                let mut refs = RefContext::new();

                match lexer::parse_value(&mut r, &mut capture, &mut refs) {
                    Ok(()) => {
                        // A number or name ending exactly at the chunk
                        // boundary may be a prefix of a longer token.
                        let open_ended = matches!(b, b'/' | b'.' | b'+' | b'-' | b'0'..=b'9');
                        if open_ended && !last && r.at_end()? {
                            break;
                        }

                        self.operands.push(capture.take().unwrap_or(Value::Null));
                    }
                    Err(Error::Truncated { .. }) if !last => break,
                    Err(Error::Truncated { .. } | Error::Malformed { .. }) => {
                        warn!("failed to read operand in content stream");
                        consumed = data.len();
                        break;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                let start = r.position() as usize;
                r.forward_while(is_regular_character)?;
                let end = r.position() as usize;

                if end == start {
                    warn!("failed to read operator in content stream");
                    consumed = data.len();
                    break;
                }

                if !last && r.at_end()? {
                    break;
                }

                let operator = Name::new(&data[start..end]);

                // Inline images embed raw bytes the tokenizer cannot read;
                // skip to the closing EI.
                if operator.as_bytes() == b"BI" {
                    let from = r.position() as usize;
                    match data[from..].windows(2).position(|w| w == b"EI") {
                        Some(idx) => {
                            r.seek((from + idx + 2) as u64)?;
                        }
                        None if last => {
                            warn!("unterminated inline image in content stream");
                            consumed = data.len();
                            break;
                        }
                        None => break,
                    }
                }

                self.sink.operation(&operator, &self.operands)?;
                self.operands.clear();
                consumed = r.position() as usize;
            }
        }

        Ok(consumed)
    }
}

impl StreamParser for ContentParser<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.scan(data, false)
    }

    fn close(&mut self, remainder: &[u8]) -> Result<()> {
        self.scan(remainder, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::content::ContentParser;
    use crate::error::Result;
    use crate::object::{Name, Number, Value};
    use crate::sink::{ContentSink, StreamParser};

    #[derive(Default)]
    struct Recorder {
        ops: Vec<(String, Vec<Value>)>,
    }

    impl ContentSink for Recorder {
        fn operation(&mut self, operator: &Name, operands: &[Value]) -> Result<()> {
            self.ops.push((operator.as_str().to_owned(), operands.to_vec()));
            Ok(())
        }
    }

    fn run(chunks: &[&[u8]]) -> Vec<(String, Vec<Value>)> {
        let mut recorder = Recorder::default();
        {
            let mut parser = ContentParser::new(&mut recorder);
            let mut carry: Vec<u8> = Vec::new();

            for chunk in chunks {
                carry.extend_from_slice(chunk);
                let consumed = parser.write(&carry).unwrap();
                carry.drain(..consumed);
            }
            parser.close(&carry).unwrap();
        }

        recorder.ops
    }

    #[test]
    fn simple_operations() {
        let ops = run(&[b"1 0 0 1 50 50 cm BT /F1 12 Tf ET"]);

        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].0, "cm");
        assert_eq!(ops[0].1.len(), 6);
        assert_eq!(ops[1].0, "BT");
        assert_eq!(
            ops[2].1,
            vec![
                Value::Name(Name::new(b"F1")),
                Value::Number(Number::Int(12))
            ]
        );
        assert_eq!(ops[3].0, "ET");
    }

    #[test]
    fn operations_split_across_chunks() {
        let ops = run(&[b"1 0 0 1 5", b"0 50 c", b"m (te", b"xt) Tj"]);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].0, "cm");
        assert_eq!(
            ops[0].1[4],
            Value::Number(Number::Int(50)),
        );
        assert_eq!(ops[1].0, "Tj");
        assert_eq!(ops[1].1, vec![Value::String(b"text".to_vec())]);
    }

    #[test]
    fn inline_image_is_skipped() {
        let ops = run(&[b"BI /W 1 /H 1 ID \x00\xff\x01 EI q"]);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].0, "BI");
        assert_eq!(ops[1].0, "q");
    }

    #[test]
    fn unknown_operators_are_delivered() {
        let ops = run(&[b"7 zz"]);

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].0, "zz");
        assert_eq!(ops[0].1, vec![Value::Number(Number::Int(7))]);
    }
}
