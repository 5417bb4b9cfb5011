//! A streaming decoder for LZW-encoded streams.

use crate::error::{Error, Result};
use crate::filter::pipeline::StreamConsumer;
use crate::filter::predictor::Predictor;
use crate::object::{keys, Dict};

const CLEAR_TABLE: usize = 256;
const EOD: usize = 257;
const MAX_ENTRIES: usize = 4096;
const INITIAL_SIZE: usize = 258;

pub(crate) struct Decoder<'a> {
    table: Table,
    prev: Option<Vec<u8>>,
    bit_buf: u32,
    bits: u8,
    predictor: Predictor,
    scratch: Vec<u8>,
    out: Vec<u8>,
    next: Box<dyn StreamConsumer + 'a>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(params: Option<&Dict>, next: Box<dyn StreamConsumer + 'a>) -> Self {
        let early_change = params
            .and_then(|p| p.get_i64(keys::EARLY_CHANGE))
            .map(|e| e != 0)
            .unwrap_or(true);

        Self {
            table: Table::new(early_change),
            prev: None,
            bit_buf: 0,
            bits: 0,
            predictor: Predictor::from_params(params),
            scratch: Vec::new(),
            out: Vec::new(),
            next,
            done: false,
        }
    }

    fn decode_code(&mut self, code: usize) -> Result<()> {
        match code {
            CLEAR_TABLE => {
                self.table.clear();
                self.prev = None;
            }
            EOD => self.done = true,
            code => {
                let sequence: Vec<u8> = if let Some(entry) = self.table.get(code) {
                    entry.to_vec()
                } else if code == self.table.len() && self.prev.is_some() {
                    // The prefix-then-first-char rule: the code being
                    // defined by this very step.
                    let prev = self.prev.as_ref().unwrap();
                    let mut seq = prev.clone();
                    seq.push(prev[0]);
                    seq
                } else {
                    return Err(Error::filter("LZWDecode", format!("invalid code {code}")));
                };

                self.out.extend_from_slice(&sequence);

                if let Some(mut entry) = self.prev.take() {
                    entry.push(sequence[0]);
                    self.table.register(entry);
                }

                self.prev = Some(sequence);
            }
        }

        Ok(())
    }
}

impl StreamConsumer for Decoder<'_> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }

        self.out.clear();

        for &byte in data {
            self.bit_buf = self.bit_buf << 8 | byte as u32;
            self.bits += 8;

            loop {
                let code_len = self.table.code_length();
                if self.bits < code_len {
                    break;
                }

                let code = (self.bit_buf >> (self.bits - code_len)) as usize
                    & ((1 << code_len) - 1);
                self.bits -= code_len;

                self.decode_code(code)?;
                if self.done {
                    break;
                }
            }

            if self.done {
                break;
            }
        }

        if !self.out.is_empty() {
            let out = std::mem::take(&mut self.out);
            let result = forward(
                &mut self.predictor,
                &mut self.scratch,
                &mut *self.next,
                &out,
            );
            self.out = out;
            result?;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Leftover bits shorter than a code are padding.
        self.predictor.finish();
        self.next.close()
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

struct Table {
    early_change: bool,
    entries: Vec<Vec<u8>>,
}

impl Table {
    fn new(early_change: bool) -> Self {
        let mut entries: Vec<_> = (0..=255u8).map(|b| vec![b]).collect();

        // Clear table and EOD don't have any data.
        entries.push(vec![0]);
        entries.push(vec![0]);

        Self {
            early_change,
            entries,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, code: usize) -> Option<&[u8]> {
        self.entries.get(code).map(|v| &**v)
    }

    /// Add an entry. At the 4096-entry cap new entries are dropped; a
    /// conforming encoder emits a clear code before that point.
    fn register(&mut self, entry: Vec<u8>) {
        if self.entries.len() < MAX_ENTRIES {
            self.entries.push(entry);
        }
    }

    fn clear(&mut self) {
        self.entries.truncate(INITIAL_SIZE);
    }

    fn code_length(&self) -> u8 {
        const TEN: usize = 512;
        const ELEVEN: usize = 1024;
        const TWELVE: usize = 2048;

        let adjusted = self.entries.len() + usize::from(self.early_change);

        if adjusted >= TWELVE {
            12
        } else if adjusted >= ELEVEN {
            11
        } else if adjusted >= TEN {
            10
        } else {
            9
        }
    }
}
