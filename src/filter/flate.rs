//! A streaming decoder for Flate-encoded streams.

use crate::error::{Error, Result};
use crate::filter::pipeline::StreamConsumer;
use crate::filter::predictor::Predictor;
use crate::object::Dict;
use log::warn;
use miniz_oxide::inflate::stream::{inflate, InflateState};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

const OUT_BUFFER_SIZE: usize = 8192;

pub(crate) struct Decoder<'a> {
    state: Option<Box<InflateState>>,
    predictor: Predictor,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    next: Box<dyn StreamConsumer + 'a>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(params: Option<&Dict>, next: Box<dyn StreamConsumer + 'a>) -> Self {
        Self {
            state: None,
            predictor: Predictor::from_params(params),
            buf: vec![0; OUT_BUFFER_SIZE],
            scratch: Vec::new(),
            next,
            done: false,
        }
    }
}

fn forward(
    predictor: &mut Predictor,
    scratch: &mut Vec<u8>,
    next: &mut dyn StreamConsumer,
    bytes: &[u8],
) -> Result<()> {
    if predictor.is_identity() {
        next.write(bytes)
    } else {
        scratch.clear();
        predictor.feed(bytes, scratch)?;
        if scratch.is_empty() {
            Ok(())
        } else {
            next.write(scratch)
        }
    }
}

impl StreamConsumer for Decoder<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }

        if self.state.is_none() {
            // Most streams carry a zlib wrapper; fall back to raw deflate
            // when the header is not plausible.
            let zlib = data.len() < 2
                || (data[0] & 0x0f == 8 && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0);
            let format = if zlib {
                DataFormat::Zlib
            } else {
                DataFormat::Raw
            };
            self.state = Some(InflateState::new_boxed(format));
        }

        let state = self.state.as_mut().unwrap();
        let mut input = data;

        loop {
            let res = inflate(state, input, &mut self.buf, MZFlush::None);
            let consumed = res.bytes_consumed.min(input.len());
            let written = res.bytes_written;

            if written > 0 {
                forward(
                    &mut self.predictor,
                    &mut self.scratch,
                    &mut *self.next,
                    &self.buf[..written],
                )?;
            }

            input = &input[consumed..];

            match res.status {
                Ok(MZStatus::StreamEnd) => {
                    self.done = true;
                    return Ok(());
                }
                Ok(_) | Err(MZError::Buf) => {}
                Err(e) => {
                    return Err(Error::filter("FlateDecode", format!("{e:?}")));
                }
            }

            if written == 0 && (input.is_empty() || consumed == 0) {
                return Ok(());
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.done {
            if let Some(state) = self.state.as_mut() {
                loop {
                    let res = inflate(state, &[], &mut self.buf, MZFlush::Finish);
                    let written = res.bytes_written;

                    if written > 0 {
                        forward(
                            &mut self.predictor,
                            &mut self.scratch,
                            &mut *self.next,
                            &self.buf[..written],
                        )?;
                    }

                    match res.status {
                        Ok(MZStatus::StreamEnd) => break,
                        _ if written == 0 => {
                            warn!("flate stream ended prematurely");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        self.predictor.finish();
        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::filter::flate::Decoder;
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

    fn decode_chunked(input: &[u8], chunk: usize) -> Vec<u8> {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut decoder = Decoder::new(None, Box::new(Capture(out.clone())));

        for piece in input.chunks(chunk) {
            decoder.write(piece).unwrap();
        }
        decoder.close().unwrap();

        let result = out.borrow().clone();
        result
    }

    #[test]
    fn decode_zlib() {
        let input = [
            0x78, 0x9c, 0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00, 0x05, 0x8c, 0x01, 0xf5,
        ];

        assert_eq!(decode_chunked(&input, input.len()), b"Hello");
        assert_eq!(decode_chunked(&input, 1), b"Hello");
    }

    #[test]
    fn decode_raw_deflate() {
        let input = [0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00];

        assert_eq!(decode_chunked(&input, input.len()), b"Hello");
    }

    #[test]
    fn decode_large_round_trip() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_chunked(&compressed, 997), payload);
    }
}
