//! The OpenType/TrueType font sub-parser.
//!
//! A font program needs random access, so the decoded bytes are buffered
//! until close, then the offset table and table directory are parsed. The
//! sink receives one callback per directory entry with the raw table bytes;
//! table contents are its business.

use crate::error::{Error, Result};
use crate::sink::{OpenTypeSink, StreamParser};
use log::warn;

const TTC_TAG: u32 = 0x74746366; // 'ttcf'

pub(crate) struct OpenTypeParser<'a> {
    sink: &'a mut dyn OpenTypeSink,
    buf: Vec<u8>,
}

impl<'a> OpenTypeParser<'a> {
    pub(crate) fn new(sink: &'a mut dyn OpenTypeSink) -> Self {
        Self {
            sink,
            buf: Vec::new(),
        }
    }

    fn parse(&mut self) -> Result<()> {
        let mut font_start = 0usize;
        let mut version = read_u32(&self.buf, 0)?;

        // For a font collection, parse the first font only.
        if version == TTC_TAG {
            font_start = read_u32(&self.buf, 12)? as usize;
            version = read_u32(&self.buf, font_start)?;
        }

        let num_tables = read_u16(&self.buf, font_start + 4)?;
        self.sink.begin_font(version, num_tables)?;

        for i in 0..num_tables as usize {
            let record = font_start + 12 + i * 16;

            let mut tag = [0u8; 4];
            tag.copy_from_slice(
                self.buf
                    .get(record..record + 4)
                    .ok_or_else(|| truncated(self.buf.len()))?,
            );
            let checksum = read_u32(&self.buf, record + 4)?;
            let offset = read_u32(&self.buf, record + 8)? as usize;
            let length = read_u32(&self.buf, record + 12)? as usize;

            let end = offset.checked_add(length).filter(|&e| e <= self.buf.len());
            match end {
                Some(end) => self.sink.table(tag, checksum, &self.buf[offset..end])?,
                None => warn!(
                    "table {} overruns the font data",
                    String::from_utf8_lossy(&tag)
                ),
            }
        }

        self.sink.end_font()
    }
}

impl StreamParser for OpenTypeParser<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.buf.extend_from_slice(data);

        Ok(data.len())
    }

    fn close(&mut self, remainder: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(remainder);
        self.parse()
    }
}

fn truncated(at: usize) -> Error {
    Error::Truncated { offset: at as u64 }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| truncated(data.len()))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| truncated(data.len()))
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::opentype::OpenTypeParser;
    use crate::sink::{OpenTypeSink, StreamParser};

    #[derive(Default)]
    struct Recorder {
        version: u32,
        tables: Vec<([u8; 4], Vec<u8>)>,
        ended: bool,
    }

    impl OpenTypeSink for Recorder {
        fn begin_font(&mut self, sfnt_version: u32, _num_tables: u16) -> Result<()> {
            self.version = sfnt_version;
            Ok(())
        }

        fn table(&mut self, tag: [u8; 4], _checksum: u32, data: &[u8]) -> Result<()> {
            self.tables.push((tag, data.to_vec()));
            Ok(())
        }

        fn end_font(&mut self) -> Result<()> {
            self.ended = true;
            Ok(())
        }
    }

    /// A minimal sfnt: the offset table, one directory entry, one table.
    fn tiny_font() -> Vec<u8> {
        let mut font = Vec::new();
        font.extend_from_slice(&0x00010000u32.to_be_bytes());
        font.extend_from_slice(&1u16.to_be_bytes()); // numTables
        font.extend_from_slice(&[0; 6]); // searchRange etc.
        font.extend_from_slice(b"cmap");
        font.extend_from_slice(&0xdeadbeefu32.to_be_bytes()); // checksum
        font.extend_from_slice(&28u32.to_be_bytes()); // offset
        font.extend_from_slice(&4u32.to_be_bytes()); // length
        font.extend_from_slice(&[1, 2, 3, 4]);

        font
    }

    #[test]
    fn parses_table_directory() {
        let font = tiny_font();
        let mut recorder = Recorder::default();
        {
            let mut parser = OpenTypeParser::new(&mut recorder);
            let (a, b) = font.split_at(10);
            parser.write(a).unwrap();
            parser.write(b).unwrap();
            parser.close(&[]).unwrap();
        }

        assert_eq!(recorder.version, 0x00010000);
        assert_eq!(recorder.tables, [(*b"cmap", vec![1, 2, 3, 4])]);
        assert!(recorder.ended);
    }
}
