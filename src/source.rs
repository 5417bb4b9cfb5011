//! Reading bytes from a random-access source.

use crate::error::{Error, Result};
use crate::trivia::{is_eol_character, is_white_space_character};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Size of the read window kept by a [`Reader`].
pub(crate) const WINDOW_SIZE: usize = 8192;

/// A random-access byte source.
///
/// Anything that can report its total length and serve reads at arbitrary
/// offsets can back a parse: files, in-memory slices, or remote resources
/// fetched by byte range.
pub trait ByteSource {
    /// Returns the total length of the source in bytes.
    fn len(&mut self) -> io::Result<u64>;

    /// Reads as many bytes as possible at `offset` into `buf` and returns
    /// the number of bytes read. Zero means `offset` is at or past the end.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl ByteSource for File {
    fn len(&mut self) -> io::Result<u64> {
        self.metadata().map(|m| m.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = Read::read(self, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

impl ByteSource for &[u8] {
    fn len(&mut self) -> io::Result<u64> {
        Ok(<[u8]>::len(*self) as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let available = self.get(offset..).unwrap_or(&[]);
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&mut self) -> io::Result<u64> {
        Ok(<[u8]>::len(self.as_slice()) as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut slice = self.as_slice();
        slice.read_at(offset, buf)
    }
}

impl ByteSource for Box<dyn ByteSource> {
    fn len(&mut self) -> io::Result<u64> {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// A chunk-buffered reader over a [`ByteSource`].
///
/// The reader keeps a fixed window of the source in memory and refills it as
/// the cursor moves. Seeks within the current window are O(1), which is what
/// makes speculative parse-and-rollback cheap.
pub(crate) struct Reader<S> {
    source: S,
    source_len: u64,
    window: Box<[u8]>,
    window_start: u64,
    window_len: usize,
    cursor: usize,
}

impl<S: ByteSource> Reader<S> {
    /// Create a new reader positioned at offset 0.
    pub(crate) fn new(mut source: S) -> Result<Self> {
        let source_len = source.len()?;

        Ok(Self {
            source,
            source_len,
            window: vec![0; WINDOW_SIZE].into_boxed_slice(),
            window_start: 0,
            window_len: 0,
            cursor: 0,
        })
    }

    /// The total length of the underlying source.
    #[inline]
    pub(crate) fn source_len(&self) -> u64 {
        self.source_len
    }

    /// The current absolute offset.
    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.window_start + self.cursor as u64
    }

    /// Move to an absolute offset. Within the current window this is a pure
    /// cursor update; otherwise the window is reloaded on the next read.
    pub(crate) fn seek(&mut self, offset: u64) -> Result<()> {
        if offset >= self.window_start && offset < self.window_start + self.window_len as u64 {
            self.cursor = (offset - self.window_start) as usize;
        } else {
            self.window_start = offset;
            self.window_len = 0;
            self.cursor = 0;
        }

        Ok(())
    }

    fn load(&mut self, offset: u64) -> Result<()> {
        let n = self.source.read_at(offset, &mut self.window)?;
        self.window_start = offset;
        self.window_len = n;
        self.cursor = 0;

        Ok(())
    }

    /// Peek the next byte without consuming it. `None` at end of source.
    #[inline]
    pub(crate) fn peek(&mut self) -> Result<Option<u8>> {
        if self.cursor < self.window_len {
            return Ok(Some(self.window[self.cursor]));
        }

        if self.position() >= self.source_len {
            return Ok(None);
        }

        self.load(self.position())?;

        Ok(self.window.get(..self.window_len).and_then(|w| w.first()).copied())
    }

    /// Peek the byte `delta` positions ahead of the cursor.
    pub(crate) fn peek_at(&mut self, delta: usize) -> Result<Option<u8>> {
        debug_assert!(delta < WINDOW_SIZE);

        if self.cursor + delta < self.window_len {
            return Ok(Some(self.window[self.cursor + delta]));
        }

        if self.position() + delta as u64 >= self.source_len {
            return Ok(None);
        }

        self.load(self.position())?;

        Ok(self.window.get(delta).copied().filter(|_| delta < self.window_len))
    }

    /// Read a single byte. `None` at end of source.
    #[inline]
    pub(crate) fn read_byte(&mut self) -> Result<Option<u8>> {
        let b = self.peek()?;
        if b.is_some() {
            self.cursor += 1;
        }

        Ok(b)
    }

    /// Advance the cursor by one byte. Only valid right after a successful
    /// peek.
    #[inline]
    pub(crate) fn forward(&mut self) {
        debug_assert!(self.cursor < self.window_len);
        self.cursor += 1;
    }

    /// Eat the next byte if it satisfies the condition.
    #[inline]
    pub(crate) fn eat(&mut self, f: impl Fn(u8) -> bool) -> Result<Option<u8>> {
        match self.peek()? {
            Some(b) if f(b) => {
                self.forward();
                Ok(Some(b))
            }
            _ => Ok(None),
        }
    }

    /// Advance while bytes satisfy the predicate.
    pub(crate) fn forward_while(&mut self, f: impl Fn(u8) -> bool) -> Result<()> {
        while let Some(b) = self.peek()? {
            if f(b) {
                self.forward();
            } else {
                break;
            }
        }

        Ok(())
    }

    /// Advance past `tag` if the next bytes match it.
    pub(crate) fn forward_tag(&mut self, tag: &[u8]) -> Result<bool> {
        let mark = self.position();

        for expected in tag {
            if self.read_byte()? != Some(*expected) {
                self.seek(mark)?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Read exactly `buf.len()` bytes into `buf`, failing with `Truncated`
    /// if the source ends first.
    pub(crate) fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            if self.cursor >= self.window_len {
                let pos = self.position();
                if pos >= self.source_len {
                    return Err(Error::Truncated { offset: pos });
                }
                self.load(pos)?;
                if self.window_len == 0 {
                    return Err(Error::Truncated { offset: pos });
                }
            }

            let n = (buf.len() - filled).min(self.window_len - self.cursor);
            buf[filled..filled + n].copy_from_slice(&self.window[self.cursor..self.cursor + n]);
            self.cursor += n;
            filled += n;
        }

        Ok(())
    }

    /// Read exactly `n` bytes.
    pub(crate) fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; n];
        self.read_exact_into(&mut buf)?;

        Ok(buf)
    }

    /// Skip white-space bytes.
    pub(crate) fn skip_white_spaces(&mut self) -> Result<()> {
        self.forward_while(is_white_space_character)
    }

    /// Skip white spaces and `%`-comments.
    pub(crate) fn skip_white_spaces_and_comments(&mut self) -> Result<()> {
        loop {
            match self.peek()? {
                Some(b) if is_white_space_character(b) => self.forward(),
                Some(b'%') => {
                    self.forward();
                    self.forward_while(|b| !is_eol_character(b))?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Returns `true` if the cursor is at the end of the source.
    pub(crate) fn at_end(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }
}

#[cfg(test)]
mod tests {
    use crate::source::{Reader, WINDOW_SIZE};

    #[test]
    fn read_across_window() {
        let mut data = vec![b'a'; WINDOW_SIZE - 1];
        data.extend_from_slice(b"xyz");

        let mut r = Reader::new(data.as_slice()).unwrap();
        r.seek(WINDOW_SIZE as u64 - 1).unwrap();
        assert_eq!(r.read_byte().unwrap(), Some(b'x'));
        assert_eq!(r.read_byte().unwrap(), Some(b'y'));
        assert_eq!(r.read_byte().unwrap(), Some(b'z'));
        assert_eq!(r.read_byte().unwrap(), None);
    }

    #[test]
    fn peek_at_across_window() {
        let mut data = vec![b' '; WINDOW_SIZE - 1];
        data.extend_from_slice(b"<<");

        let mut r = Reader::new(data.as_slice()).unwrap();
        // Fill the window, then park the cursor on its last byte.
        assert_eq!(r.peek().unwrap(), Some(b' '));
        r.seek(WINDOW_SIZE as u64 - 1).unwrap();
        assert_eq!(r.peek().unwrap(), Some(b'<'));
        assert_eq!(r.peek_at(1).unwrap(), Some(b'<'));
        assert_eq!(r.peek_at(2).unwrap(), None);
    }

    #[test]
    fn seek_rollback_within_window() {
        let mut r = Reader::new(&b"12 34 R"[..]).unwrap();
        assert_eq!(r.read_byte().unwrap(), Some(b'1'));
        let mark = r.position();
        assert_eq!(r.read_byte().unwrap(), Some(b'2'));
        r.seek(mark).unwrap();
        assert_eq!(r.read_byte().unwrap(), Some(b'2'));
    }

    #[test]
    fn read_exact_truncated() {
        let mut r = Reader::new(&b"abc"[..]).unwrap();
        assert!(r.read_exact(4).is_err());
    }

    #[test]
    fn forward_tag_restores_on_mismatch() {
        let mut r = Reader::new(&b"strean"[..]).unwrap();
        assert!(!r.forward_tag(b"stream").unwrap());
        assert_eq!(r.position(), 0);
        assert!(r.forward_tag(b"strean").unwrap());
    }

    #[test]
    fn skip_comments() {
        let mut r = Reader::new(&b"  % a comment\n 42"[..]).unwrap();
        r.skip_white_spaces_and_comments().unwrap();
        assert_eq!(r.peek().unwrap(), Some(b'4'));
    }
}
