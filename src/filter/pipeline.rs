//! The decoding chain plumbing.
//!
//! A pipeline is a linear chain of decoders ending in a terminal consumer.
//! Each stage owns its downstream receiver; raw bytes pushed into the head
//! come out decoded at the terminal.

use crate::error::{Error, Result};
use crate::sink::{DocumentSink, StreamParser};
use std::cell::RefCell;
use std::rc::Rc;

/// Upper bound for the dispatcher's carry-over buffer. A conforming
/// sub-parser only defers partial tokens, which stay far below this.
const CARRY_LIMIT: usize = 1 << 20;

/// A stage in the decoding chain: accepts incremental input at any byte
/// boundary and is closed exactly once.
pub(crate) trait StreamConsumer {
    /// Push a chunk of bytes into this stage.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush remaining state and close the downstream stage.
    fn close(&mut self) -> Result<()>;
}

/// The terminal consumer of a stream pipeline during traversal.
///
/// Every decoded byte is delivered to the document sink via
/// `stream_content`. When a specialized sub-parser is attached, the same
/// bytes are fed to it with carry-over buffering: whatever the sub-parser
/// does not consume is retained and re-presented prefixed to the next chunk.
/// An object-stream tee additionally accumulates the decoded bytes for the
/// object-stream cache.
pub(crate) struct Dispatcher<'a> {
    sink: &'a mut dyn DocumentSink,
    parser: Option<Box<dyn StreamParser + 'a>>,
    carry: Vec<u8>,
    tee: Option<Rc<RefCell<Vec<u8>>>>,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(
        sink: &'a mut dyn DocumentSink,
        parser: Option<Box<dyn StreamParser + 'a>>,
        tee: Option<Rc<RefCell<Vec<u8>>>>,
    ) -> Self {
        Self {
            sink,
            parser,
            carry: Vec::new(),
            tee,
        }
    }

    fn feed(&mut self, data: &[u8]) -> Result<()> {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(());
        };

        if self.carry.is_empty() {
            let consumed = parser.write(data)?;
            debug_assert!(consumed <= data.len());
            self.carry.extend_from_slice(&data[consumed.min(data.len())..]);
        } else {
            self.carry.extend_from_slice(data);
            let consumed = parser.write(&self.carry)?;
            debug_assert!(consumed <= self.carry.len());
            self.carry.drain(..consumed.min(self.carry.len()));
        }

        if self.carry.len() > CARRY_LIMIT {
            return Err(Error::filter(
                "dispatcher",
                "stream sub-parser deferred more than the carry-over limit",
            ));
        }

        Ok(())
    }
}

impl StreamConsumer for Dispatcher<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.sink.stream_content(data)?;

        if let Some(tee) = &self.tee {
            tee.borrow_mut().extend_from_slice(data);
        }

        self.feed(data)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(parser) = self.parser.as_mut() {
            parser.close(&self.carry)?;
        }
        self.carry.clear();

        Ok(())
    }
}

/// A terminal consumer that accumulates decoded bytes in memory. Used for
/// xref streams and object-stream bodies, which the engine decodes without
/// emitting document events.
pub(crate) struct Collector {
    out: Rc<RefCell<Vec<u8>>>,
}

impl Collector {
    /// Create a collector plus the shared handle its bytes are read from
    /// after the pipeline closes.
    pub(crate) fn new() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let out = Rc::new(RefCell::new(Vec::new()));

        (Self { out: out.clone() }, out)
    }
}

impl StreamConsumer for Collector {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.out.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::filter::pipeline::{Collector, Dispatcher, StreamConsumer};
    use crate::sink::{DocumentSink, StreamParser};

    #[derive(Default)]
    struct CountingSink {
        bytes: Vec<u8>,
    }

    impl DocumentSink for CountingSink {
        fn stream_content(&mut self, data: &[u8]) -> Result<()> {
            self.bytes.extend_from_slice(data);
            Ok(())
        }
    }

    /// Consumes only up to the last newline, deferring the tail.
    struct LineParser {
        lines: std::rc::Rc<std::cell::RefCell<Vec<Vec<u8>>>>,
    }

    impl StreamParser for LineParser {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            match data.iter().rposition(|&b| b == b'\n') {
                Some(idx) => {
                    for line in data[..idx].split(|&b| b == b'\n') {
                        self.lines.borrow_mut().push(line.to_vec());
                    }
                    Ok(idx + 1)
                }
                None => Ok(0),
            }
        }

        fn close(&mut self, remainder: &[u8]) -> Result<()> {
            if !remainder.is_empty() {
                self.lines.borrow_mut().push(remainder.to_vec());
            }
            Ok(())
        }
    }

    #[test]
    fn carry_over_re_presents_deferred_bytes() {
        let lines = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut sink = CountingSink::default();
        let parser = Box::new(LineParser {
            lines: lines.clone(),
        });
        let mut dispatcher = Dispatcher::new(&mut sink, Some(parser), None);

        dispatcher.write(b"alpha\nbe").unwrap();
        dispatcher.write(b"ta\ngam").unwrap();
        dispatcher.write(b"ma").unwrap();
        dispatcher.close().unwrap();
        drop(dispatcher);

        assert_eq!(sink.bytes, b"alpha\nbeta\ngamma");
        assert_eq!(&*lines.borrow(), &[b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
    }

    #[test]
    fn collector_accumulates() {
        let (mut collector, out) = Collector::new();
        collector.write(b"ab").unwrap();
        collector.write(b"cd").unwrap();
        collector.close().unwrap();

        assert_eq!(&*out.borrow(), b"abcd");
    }
}
