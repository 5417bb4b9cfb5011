//! The CMap sub-parser.
//!
//! Recognizes the mapping sections of a CMap program (codespace ranges,
//! `bfchar` and `bfrange`) and forwards each mapping to the CMap sink.
//! Everything else in the program is tokenized and ignored.

use crate::error::{Error, Result};
use crate::lexer::{self, RefContext};
use crate::object::Value;
use crate::sink::{CMapSink, StreamParser, ValueCapture};
use crate::source::Reader;
use crate::trivia::is_regular_character;
use log::warn;

#[derive(Copy, Clone, PartialEq)]
enum Section {
    None,
    Codespace,
    BfChar,
    BfRange,
}

pub(crate) struct CMapParser<'a> {
    sink: &'a mut dyn CMapSink,
    section: Section,
    items: Vec<Value>,
    started: bool,
}

impl<'a> CMapParser<'a> {
    pub(crate) fn new(sink: &'a mut dyn CMapSink) -> Self {
        Self {
            sink,
            section: Section::None,
            items: Vec::new(),
            started: false,
        }
    }

    fn scan(&mut self, data: &[u8], last: bool) -> Result<usize> {
        if !self.started {
            self.sink.begin_cmap()?;
            self.started = true;
        }

        let mut r = Reader::new(data)?;
        let mut consumed = 0usize;

        loop {
            r.skip_white_spaces_and_comments()?;
            consumed = (r.position() as usize).max(consumed);

            let Some(b) = r.peek()? else {
                break;
            };

            if matches!(b, b'/' | b'.' | b'+' | b'-' | b'0'..=b'9' | b'[' | b'<' | b'(') {
                let mut capture = ValueCapture::new();
                let mut refs = RefContext::new();

                match lexer::parse_value(&mut r, &mut capture, &mut refs) {
                    Ok(()) => {
                        if let Some(value) = capture.take() {
                            self.item(value)?;
                        }
                        consumed = r.position() as usize;
                    }
                    Err(Error::Truncated { .. }) if !last => break,
                    Err(Error::Truncated { .. } | Error::Malformed { .. }) => {
                        warn!("failed to read value in CMap stream");
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
                    // Not a token we know; step over it.
                    r.forward();
                    consumed = r.position() as usize;
                    continue;
                }

                // A keyword ending at the chunk boundary may be a prefix.
                if !last && r.at_end()? {
                    break;
                }

                self.keyword(&data[start..end]);
                consumed = r.position() as usize;
            }
        }

        Ok(consumed)
    }

    fn keyword(&mut self, keyword: &[u8]) {
        match keyword {
            b"begincodespacerange" => self.begin(Section::Codespace),
            b"beginbfchar" => self.begin(Section::BfChar),
            b"beginbfrange" => self.begin(Section::BfRange),
            b"endcodespacerange" | b"endbfchar" | b"endbfrange" => {
                self.section = Section::None;
                self.items.clear();
            }
            _ => {
                if self.section == Section::None {
                    self.items.clear();
                }
            }
        }
    }

    fn begin(&mut self, section: Section) {
        self.section = section;
        self.items.clear();
    }

    /// Collect a value inside a mapping section and dispatch once a
    /// complete tuple is available.
    fn item(&mut self, value: Value) -> Result<()> {
        if self.section == Section::None {
            return Ok(());
        }

        self.items.push(value);

        let needed = match self.section {
            Section::Codespace | Section::BfChar => 2,
            Section::BfRange => 3,
            Section::None => return Ok(()),
        };

        if self.items.len() < needed {
            return Ok(());
        }

        let items: Vec<Value> = self.items.drain(..).collect();
        let bytes = |v: &Value| -> Option<Vec<u8>> {
            match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            }
        };

        match self.section {
            Section::Codespace | Section::BfChar => {
                let (Some(low), Some(high)) = (bytes(&items[0]), bytes(&items[1])) else {
                    warn!("ignoring malformed CMap mapping");
                    return Ok(());
                };

                if self.section == Section::Codespace {
                    self.sink.codespace_range(&low, &high)
                } else {
                    self.sink.bf_char(&low, &high)
                }
            }
            Section::BfRange => {
                let (Some(low), Some(high)) = (bytes(&items[0]), bytes(&items[1])) else {
                    warn!("ignoring malformed CMap mapping");
                    return Ok(());
                };

                match &items[2] {
                    Value::String(start) => self.sink.bf_range(&low, &high, start),
                    Value::Array(dests) => {
                        let dests: Vec<Vec<u8>> = dests
                            .iter()
                            .filter_map(|d| match d {
                                Value::String(s) => Some(s.clone()),
                                _ => None,
                            })
                            .collect();

                        self.sink.bf_range_array(&low, &high, &dests)
                    }
                    _ => {
                        warn!("ignoring malformed CMap bfrange destination");
                        Ok(())
                    }
                }
            }
            Section::None => Ok(()),
        }
    }
}

impl StreamParser for CMapParser<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.scan(data, false)
    }

    fn close(&mut self, remainder: &[u8]) -> Result<()> {
        self.scan(remainder, true)?;
        self.sink.end_cmap()
    }
}
