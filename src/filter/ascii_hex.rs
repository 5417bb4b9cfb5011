//! A streaming decoder for ASCII-hex-encoded streams.

use crate::error::Result;
use crate::filter::pipeline::StreamConsumer;
use crate::trivia::{decode_hex_digit, is_white_space_character};

pub(crate) struct Decoder<'a> {
    pending: Option<u8>,
    next: Box<dyn StreamConsumer + 'a>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(next: Box<dyn StreamConsumer + 'a>) -> Self {
        Self {
            pending: None,
            next,
            done: false,
        }
    }
}

impl StreamConsumer for Decoder<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }

        let mut out = Vec::with_capacity(data.len() / 2 + 1);

        for &b in data {
            if b == b'>' {
                // An odd trailing nibble is the high nibble of a
                // zero-padded byte.
                if let Some(hi) = self.pending.take() {
                    out.push(hi << 4);
                }
                self.done = true;
                break;
            }

            if is_white_space_character(b) {
                continue;
            }

            // Anything that is not a hex digit is skipped.
            let Some(nibble) = decode_hex_digit(b) else {
                continue;
            };

            match self.pending.take() {
                Some(hi) => out.push(hi << 4 | nibble),
                None => self.pending = Some(nibble),
            }
        }

        if out.is_empty() {
            Ok(())
        } else {
            self.next.write(&out)
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(hi) = self.pending.take() {
            self.next.write(&[hi << 4])?;
        }

        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::filter::ascii_hex::Decoder;
    use crate::filter::pipeline::StreamConsumer;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl StreamConsumer for Capture {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.0.borrow_mut().extend_from_slice(data);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn decode(input: &[u8], chunk: usize) -> Vec<u8> {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut decoder = Decoder::new(Box::new(Capture(out.clone())));

        for piece in input.chunks(chunk) {
            decoder.write(piece).unwrap();
        }
        decoder.close().unwrap();

        let result = out.borrow().clone();
        result
    }

    #[test]
    fn decode_simple() {
        assert_eq!(decode(b"AF3E2901>", 9), [0xaf, 0x3e, 0x29, 0x01]);
    }

    #[test]
    fn decode_whitespaces() {
        assert_eq!(decode(b"AF3   E2   901>", 4), [0xaf, 0x3e, 0x29, 0x01]);
    }

    #[test]
    fn decode_without_terminator() {
        assert_eq!(decode(b"AF3E2901", 3), [0xaf, 0x3e, 0x29, 0x01]);
    }

    #[test]
    fn decode_with_padding() {
        assert_eq!(decode(b"AF3E291>", 1), [0xaf, 0x3e, 0x29, 0x10]);
    }

    #[test]
    fn trailing_bytes_after_terminator_are_ignored() {
        assert_eq!(decode(b"41>42", 5), [0x41]);
    }
}
