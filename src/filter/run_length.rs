//! A streaming decoder for run-length-encoded streams.

use crate::error::Result;
use crate::filter::pipeline::StreamConsumer;
use log::warn;

const EOD: u8 = 128;

enum State {
    Length,
    Literal(usize),
    Run(usize),
}

pub(crate) struct Decoder<'a> {
    state: State,
    next: Box<dyn StreamConsumer + 'a>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(next: Box<dyn StreamConsumer + 'a>) -> Self {
        Self {
            state: State::Length,
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

        let mut out = Vec::with_capacity(data.len());

        for &b in data {
            match self.state {
                State::Length => match b {
                    EOD => {
                        self.done = true;
                        break;
                    }
                    0..=127 => self.state = State::Literal(b as usize + 1),
                    _ => self.state = State::Run(257 - b as usize),
                },
                State::Literal(remaining) => {
                    out.push(b);
                    if remaining == 1 {
                        self.state = State::Length;
                    } else {
                        self.state = State::Literal(remaining - 1);
                    }
                }
                State::Run(count) => {
                    out.resize(out.len() + count, b);
                    self.state = State::Length;
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
        if !self.done && !matches!(self.state, State::Length) {
            warn!("run-length stream ended prematurely");
        }

        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::filter::pipeline::StreamConsumer;
    use crate::filter::run_length::Decoder;
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
    fn run_length() {
        let input = [4, 10, 11, 12, 13, 14, 253, 3, 128];
        assert_eq!(decode(&input, input.len()), [10, 11, 12, 13, 14, 3, 3, 3, 3]);
    }

    #[test]
    fn run_length_byte_by_byte() {
        let input = [4, 10, 11, 12, 13, 14, 253, 3, 128];
        assert_eq!(decode(&input, 1), [10, 11, 12, 13, 14, 3, 3, 3, 3]);
    }

    #[test]
    fn bytes_after_eod_are_ignored() {
        assert_eq!(decode(&[0, 7, 128, 0, 9], 5), [7]);
    }
}
