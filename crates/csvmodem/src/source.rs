//! Character sources the reader pulls from.
//!
//! A source fills a caller-provided slice and reports how many characters it
//! wrote; `0` means end of stream. Byte sources are decoded as UTF-8 on the
//! fly. A code point split across two reads is carried over, never reported
//! as invalid.

use std::io;

use crate::error::{Error, Result};

/// Blocking character source.
pub trait CharSource {
    /// Fills a prefix of `dst` and returns its length. Returns `0` only at the
    /// end of the stream (or when `dst` is empty).
    ///
    /// # Errors
    ///
    /// I/O failures of the underlying reader and undecodable input.
    fn read_chars(&mut self, dst: &mut [char]) -> Result<usize>;
}

/// Non-blocking character source, driven by tokio.
///
/// The future may suspend; it is the only place a reader ever does.
#[cfg(feature = "async")]
pub trait AsyncCharSource: Send {
    /// See [`CharSource::read_chars`].
    fn read_chars(
        &mut self,
        dst: &mut [char],
    ) -> impl Future<Output = Result<usize>> + Send;
}

/// In-memory text.
#[derive(Debug, Clone)]
pub struct StrSource<'a> {
    rest: &'a str,
}

impl<'a> StrSource<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn take(&mut self, dst: &mut [char]) -> usize {
        let mut written = 0;
        let mut used = 0;
        for (slot, ch) in dst.iter_mut().zip(self.rest.chars()) {
            *slot = ch;
            written += 1;
            used += ch.len_utf8();
        }
        self.rest = &self.rest[used..];
        written
    }
}

impl CharSource for StrSource<'_> {
    fn read_chars(&mut self, dst: &mut [char]) -> Result<usize> {
        Ok(self.take(dst))
    }
}

#[cfg(feature = "async")]
impl AsyncCharSource for StrSource<'_> {
    async fn read_chars(&mut self, dst: &mut [char]) -> Result<usize> {
        Ok(self.take(dst))
    }
}

/// Incremental UTF-8 decoding shared by the byte sources.
#[derive(Debug)]
struct Utf8Decoder {
    bytes: Box<[u8]>,
    start: usize,
    end: usize,
    /// Bytes discarded from the front of `bytes` so far.
    discarded: usize,
    eof: bool,
}

impl Utf8Decoder {
    const CAPACITY: usize = 8 * 1024;

    fn new() -> Self {
        Self {
            bytes: vec![0; Self::CAPACITY].into_boxed_slice(),
            start: 0,
            end: 0,
            discarded: 0,
            eof: false,
        }
    }

    /// Decodes buffered bytes into `dst`. `None` means more bytes are needed
    /// before anything can be produced.
    fn decode(&mut self, dst: &mut [char]) -> Result<Option<usize>> {
        let mut written = 0;
        while written < dst.len() && self.start < self.end {
            let pending = &self.bytes[self.start..self.end];
            match bstr::decode_utf8(pending) {
                (Some(ch), size) => {
                    dst[written] = ch;
                    written += 1;
                    self.start += size;
                }
                // A valid but incomplete prefix at the end of the buffer.
                (None, size) if size == pending.len() && size < 4 && !self.eof => break,
                // Hand out what decoded cleanly; the next call reports the error.
                (None, _) if written > 0 => break,
                (None, _) => {
                    return Err(Error::InvalidUtf8 {
                        offset: self.discarded + self.start,
                    });
                }
            }
        }
        if written > 0 || dst.is_empty() || (self.eof && self.start == self.end) {
            return Ok(Some(written));
        }
        Ok(None)
    }

    /// Moves undecoded bytes to the front and returns the free tail.
    fn spare(&mut self) -> &mut [u8] {
        if self.start > 0 {
            self.bytes.copy_within(self.start..self.end, 0);
            self.discarded += self.start;
            self.end -= self.start;
            self.start = 0;
        }
        &mut self.bytes[self.end..]
    }

    fn filled(&mut self, n: usize) {
        if n == 0 {
            self.eof = true;
        }
        self.end += n;
    }
}

/// UTF-8 text from any [`io::Read`].
#[derive(Debug)]
pub struct Utf8Source<R> {
    reader: R,
    decoder: Utf8Decoder,
}

impl<R: io::Read> Utf8Source<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: Utf8Decoder::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read> CharSource for Utf8Source<R> {
    fn read_chars(&mut self, dst: &mut [char]) -> Result<usize> {
        loop {
            if let Some(n) = self.decoder.decode(dst)? {
                return Ok(n);
            }
            let n = match self.reader.read(self.decoder.spare()) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            self.decoder.filled(n);
        }
    }
}

/// UTF-8 text from any [`tokio::io::AsyncRead`].
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct AsyncUtf8Source<R> {
    reader: R,
    decoder: Utf8Decoder,
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncRead + Unpin + Send> AsyncUtf8Source<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: Utf8Decoder::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncRead + Unpin + Send> AsyncCharSource for AsyncUtf8Source<R> {
    async fn read_chars(&mut self, dst: &mut [char]) -> Result<usize> {
        use tokio::io::AsyncReadExt;

        loop {
            if let Some(n) = self.decoder.decode(dst)? {
                return Ok(n);
            }
            let n = self.reader.read(self.decoder.spare()).await?;
            self.decoder.filled(n);
        }
    }
}
