//! A streaming decoder for ASCII-85-encoded streams.

use crate::error::{Error, Result};
use crate::filter::pipeline::StreamConsumer;
use crate::trivia::is_white_space_character;

pub(crate) struct Decoder<'a> {
    tuple: [u8; 5],
    count: usize,
    saw_tilde: bool,
    next: Box<dyn StreamConsumer + 'a>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(next: Box<dyn StreamConsumer + 'a>) -> Self {
        Self {
            tuple: [0; 5],
            count: 0,
            saw_tilde: false,
            next,
            done: false,
        }
    }

    /// Decode a partial tuple of `count` characters into `count - 1` bytes,
    /// padding with the highest symbol value.
    fn flush_partial(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.count == 0 {
            return Ok(());
        }

        for i in self.count..5 {
            self.tuple[i] = 84;
        }

        let word = word_85(self.tuple)?;
        out.extend_from_slice(&word[..self.count - 1]);
        self.count = 0;

        Ok(())
    }
}

impl StreamConsumer for Decoder<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }

        let mut out = Vec::with_capacity(data.len());

        for &b in data {
            if self.saw_tilde {
                if b == b'>' {
                    self.flush_partial(&mut out)?;
                    self.done = true;
                    break;
                }
                self.saw_tilde = false;
            }

            if b == b'~' {
                self.saw_tilde = true;
                continue;
            }

            if is_white_space_character(b) {
                continue;
            }

            if b == b'z' {
                if self.count != 0 {
                    return Err(Error::filter("ASCII85Decode", "'z' inside a tuple"));
                }
                out.extend_from_slice(&[0; 4]);
                continue;
            }

            match b {
                0x21..=0x75 => {
                    self.tuple[self.count] = b - 0x21;
                    self.count += 1;

                    if self.count == 5 {
                        out.extend_from_slice(&word_85(self.tuple)?);
                        self.count = 0;
                    }
                }
                _ => {
                    return Err(Error::filter(
                        "ASCII85Decode",
                        format!("invalid character 0x{b:02x}"),
                    ));
                }
            }
        }

        if out.is_empty() {
            Ok(())
        } else {
            self.next.write(&out)
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.done && self.count > 0 {
            let mut out = Vec::new();
            self.flush_partial(&mut out)?;
            if !out.is_empty() {
                self.next.write(&out)?;
            }
        }

        self.next.close()
    }
}

fn word_85([a, b, c, d, e]: [u8; 5]) -> Result<[u8; 4]> {
    let q = ((((a as u64 * 85 + b as u64) * 85 + c as u64) * 85 + d as u64) * 85) + e as u64;

    // 85^5 > 256^4, the result might not fit in a u32.
    let r = u32::try_from(q)
        .map_err(|_| Error::filter("ASCII85Decode", "tuple value out of range"))?;

    Ok(r.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::filter::ascii_85::Decoder;
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
        assert_eq!(decode(b"87cURDZ~>", 9), b"Hello");
    }

    #[test]
    fn decode_byte_by_byte() {
        assert_eq!(decode(b"87cURDZ~>", 1), b"Hello");
    }

    #[test]
    fn decode_spaces() {
        assert_eq!(decode(b"87  cURD  Z~>", 4), b"Hello");
    }

    #[test]
    fn decode_zeroes() {
        assert_eq!(decode(b"z~>", 3), [0, 0, 0, 0]);
    }

    #[test]
    fn decode_partial_tail_without_terminator() {
        // The tail is flushed at close.
        assert_eq!(decode(b"87cURDZ", 7), b"Hello");
    }
}
