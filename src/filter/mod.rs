//! Decoding of filtered streams.

mod ascii_85;
mod ascii_hex;
mod flate;
mod lzw;
pub(crate) mod pipeline;
mod predictor;
mod run_length;

pub(crate) use pipeline::{Collector, Dispatcher, StreamConsumer};

use crate::error::Result;
use crate::object::{keys, Dict, Name, Value};
use log::warn;

/// A recognized stream filter.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Filter {
    AsciiHexDecode,
    Ascii85Decode,
    LzwDecode,
    FlateDecode,
    RunLengthDecode,
}

impl Filter {
    /// Resolve a filter name, including its abbreviation. Unknown names
    /// yield `None`; the pipeline skips them so the data passes through
    /// unchanged.
    pub(crate) fn from_name(name: &Name) -> Option<Self> {
        match name.as_bytes() {
            keys::ASCII_HEX_DECODE | keys::ASCII_HEX_DECODE_ABBREVIATION => {
                Some(Filter::AsciiHexDecode)
            }
            keys::ASCII85_DECODE | keys::ASCII85_DECODE_ABBREVIATION => Some(Filter::Ascii85Decode),
            keys::LZW_DECODE | keys::LZW_DECODE_ABBREVIATION => Some(Filter::LzwDecode),
            keys::FLATE_DECODE | keys::FLATE_DECODE_ABBREVIATION => Some(Filter::FlateDecode),
            keys::RUN_LENGTH_DECODE | keys::RUN_LENGTH_DECODE_ABBREVIATION => {
                Some(Filter::RunLengthDecode)
            }
            _ => {
                warn!("unknown filter: {}", name.as_str());

                None
            }
        }
    }

    fn stage<'a>(
        self,
        params: Option<&Dict>,
        next: Box<dyn StreamConsumer + 'a>,
    ) -> Box<dyn StreamConsumer + 'a> {
        match self {
            Filter::AsciiHexDecode => Box::new(ascii_hex::Decoder::new(next)),
            Filter::Ascii85Decode => Box::new(ascii_85::Decoder::new(next)),
            Filter::LzwDecode => Box::new(lzw::Decoder::new(params, next)),
            Filter::FlateDecode => Box::new(flate::Decoder::new(params, next)),
            Filter::RunLengthDecode => Box::new(run_length::Decoder::new(next)),
        }
    }
}

/// An assembled decoding chain. Raw stream bytes written to the head come
/// out decoded at the terminal consumer.
pub(crate) struct FilterPipeline<'a> {
    head: Box<dyn StreamConsumer + 'a>,
}

impl<'a> FilterPipeline<'a> {
    /// Build the chain declared by a stream dictionary's `/Filter` and
    /// `/DecodeParms` (or `/F`, `/DP`). Filters are built in reverse order
    /// so each one's downstream is already constructed.
    pub(crate) fn build(dict: &Dict, terminal: impl StreamConsumer + 'a) -> FilterPipeline<'a> {
        let mut head: Box<dyn StreamConsumer + 'a> = Box::new(terminal);

        let filters = dict.get(keys::FILTER).or_else(|| dict.get(keys::F));
        let params = dict
            .get(keys::DECODE_PARMS)
            .or_else(|| dict.get(keys::DP));

        let names: Vec<&Name> = match filters {
            Some(Value::Name(name)) => vec![name],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Name(name) => Some(name),
                    other => {
                        warn!("ignoring non-name filter entry {other:?}");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let param_at = |index: usize| -> Option<&Dict> {
            match params {
                Some(Value::Dictionary(d)) if index == 0 => Some(d),
                Some(Value::Array(items)) => items.get(index).and_then(Value::as_dict),
                _ => None,
            }
        };

        for (index, name) in names.iter().enumerate().rev() {
            if let Some(filter) = Filter::from_name(name) {
                head = filter.stage(param_at(index), head);
            }
        }

        FilterPipeline { head }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.head.write(data)
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.head.close()
    }
}
