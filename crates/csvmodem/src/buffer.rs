//! Streaming buffer with pushback.
//!
//! The logical stream seen by consumers is, in order: the unread part of the
//! window, then the pushback queue, then the source. Pushed-back characters
//! are placed in front of everything still unread, so replaying a span
//! reproduces exactly the characters that were consumed.
//!
//! A checkpoint records every character consumed after it. [`reset`]
//! pushes that record back, which lets a caller tokenize the same region
//! again without touching the source.
//!
//! [`reset`]: PushbackBuffer::reset

use std::{collections::VecDeque, sync::Arc};

use tracing::{trace, warn};

use crate::{
    error::{Error, Result},
    pool::{CharPool, PooledRegion},
    source::CharSource,
};

/// Window over a character source that can un-read consumed characters.
#[derive(Debug)]
pub struct PushbackBuffer {
    window: PooledRegion,
    start: usize,
    end: usize,
    pushback: VecDeque<char>,
    /// Characters consumed since the last checkpoint.
    replay: Option<Vec<char>>,
    max: usize,
}

impl PushbackBuffer {
    /// Rents a window of `window_len` characters from `pool`. No buffered
    /// region may grow past `max`.
    #[must_use]
    pub fn new(pool: Arc<dyn CharPool>, window_len: usize, max: usize) -> Self {
        Self {
            window: PooledRegion::rent(pool, window_len),
            start: 0,
            end: 0,
            pushback: VecDeque::new(),
            replay: None,
            max,
        }
    }

    /// Unread characters of the current window.
    #[inline]
    pub(crate) fn window(&self) -> &[char] {
        &self.window.as_slice()[self.start..self.end]
    }

    /// Marks the first `n` window characters as consumed.
    pub(crate) fn consume(&mut self, n: usize) -> Result<()> {
        let n = n.min(self.end - self.start);
        let taken = self.start..self.start + n;
        self.start += n;
        if let Some(replay) = &mut self.replay {
            replay.extend_from_slice(&self.window.as_slice()[taken]);
            if replay.len() > self.max {
                warn!(limit = self.max, "replay region exceeds the buffer limit");
                return Err(Error::BufferOverflow { limit: self.max });
            }
        }
        Ok(())
    }

    /// Moves pushed-back characters into an empty window. Returns `false`
    /// when there were none, meaning the source must be read.
    fn refill_from_pushback(&mut self) -> bool {
        if self.start < self.end {
            return true;
        }
        if self.pushback.is_empty() {
            return false;
        }
        let n = self.pushback.len().min(self.window.len());
        for (slot, ch) in self.window.as_mut_slice().iter_mut().zip(self.pushback.drain(..n)) {
            *slot = ch;
        }
        self.start = 0;
        self.end = n;
        true
    }

    /// Ensures the window holds unread characters, reading the source only
    /// when the pushback queue is empty. Returns the number of unread
    /// characters; `0` means end of stream.
    pub(crate) fn fill(&mut self, source: &mut impl CharSource) -> Result<usize> {
        if !self.refill_from_pushback() {
            let n = source.read_chars(self.window.as_mut_slice())?;
            trace!(n, "read from source");
            self.start = 0;
            self.end = n;
        }
        Ok(self.end - self.start)
    }

    /// Async [`fill`](Self::fill). The read races `cancel`; once it fires
    /// nothing is read and the buffer is left as it was.
    #[cfg(feature = "async")]
    pub(crate) async fn fill_async(
        &mut self,
        source: &mut impl crate::source::AsyncCharSource,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<usize> {
        if self.refill_from_pushback() {
            return Ok(self.end - self.start);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let window = self.window.as_mut_slice();
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            read = crate::source::AsyncCharSource::read_chars(source, window) => read?,
        };
        trace!(n, "read from async source");
        self.start = 0;
        self.end = n;
        Ok(n)
    }

    /// Copies up to `dst.len()` characters into `dst`: window first, then
    /// pushback, then a single source read. Returns `0` only at end of stream.
    pub fn read_into(&mut self, dst: &mut [char], source: &mut impl CharSource) -> Result<usize> {
        let mut written = 0;
        while written < dst.len() && self.refill_from_pushback() {
            let n = self.window().len().min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&self.window()[..n]);
            self.consume(n)?;
            written += n;
        }
        if written == 0 && !dst.is_empty() {
            written = source.read_chars(dst)?;
            if let Some(replay) = &mut self.replay {
                replay.extend_from_slice(&dst[..written]);
                if replay.len() > self.max {
                    warn!(limit = self.max, "replay region exceeds the buffer limit");
                    return Err(Error::BufferOverflow { limit: self.max });
                }
            }
        }
        Ok(written)
    }

    /// Requeues `span` in front of everything still unread.
    ///
    /// Pushing back characters un-consumes them, so they are also removed
    /// from the end of an active checkpoint.
    pub fn push_back(&mut self, span: &[char]) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }
        let unread = &self.window.as_slice()[self.start..self.end];
        for &ch in unread.iter().rev().chain(span.iter().rev()) {
            self.pushback.push_front(ch);
        }
        self.start = self.end;
        if let Some(replay) = &mut self.replay {
            replay.truncate(replay.len().saturating_sub(span.len()));
        }
        trace!(len = span.len(), queued = self.pushback.len(), "push back");
        if self.pushback.len() > self.max {
            warn!(limit = self.max, "pushback exceeds the buffer limit");
            return Err(Error::BufferOverflow { limit: self.max });
        }
        Ok(())
    }

    /// Starts recording consumed characters.
    pub fn checkpoint(&mut self) {
        self.replay = Some(Vec::new());
    }

    /// Stops recording; the characters since the checkpoint stay consumed.
    pub fn commit(&mut self) {
        self.replay = None;
    }

    /// Rewinds to the last checkpoint. The checkpoint stays active.
    pub fn reset(&mut self) -> Result<()> {
        let Some(replay) = self.replay.take() else {
            return Ok(());
        };
        trace!(len = replay.len(), "rewind to checkpoint");
        self.push_back(&replay)?;
        self.replay = Some(Vec::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        pool::{SharedPool, tests::CountingPool},
        source::StrSource,
    };

    fn buffer(window: usize, max: usize) -> PushbackBuffer {
        PushbackBuffer::new(Arc::new(SharedPool::new()), window, max)
    }

    fn read_all(buffer: &mut PushbackBuffer, source: &mut StrSource<'_>, chunk: usize) -> String {
        let mut dst = vec!['\0'; chunk];
        let mut out = String::new();
        loop {
            let n = buffer.read_into(&mut dst, source).unwrap();
            if n == 0 {
                return out;
            }
            out.extend(&dst[..n]);
        }
    }

    #[test]
    fn push_back_replays_before_source() {
        let mut buffer = buffer(4, 64);
        let mut source = StrSource::new("abcdefgh");
        let mut dst = ['\0'; 3];
        assert_eq!(buffer.read_into(&mut dst, &mut source).unwrap(), 3);
        assert_eq!(dst, ['a', 'b', 'c']);
        buffer.push_back(&dst).unwrap();
        assert_eq!(read_all(&mut buffer, &mut source, 3), "abcdefgh");
    }

    #[test]
    fn push_back_goes_in_front_of_unread_window() {
        let mut buffer = buffer(8, 64);
        let mut source = StrSource::new("abcdef");
        assert_eq!(buffer.fill(&mut source).unwrap(), 6);
        buffer.consume(2).unwrap();
        buffer.push_back(&['a', 'b']).unwrap();
        assert_eq!(read_all(&mut buffer, &mut source, 4), "abcdef");
    }

    #[test]
    fn reset_replays_from_checkpoint() {
        let mut buffer = buffer(4, 64);
        let mut source = StrSource::new("head\nbody\n");
        buffer.checkpoint();
        let mut seen = String::new();
        while !seen.ends_with('\n') {
            buffer.fill(&mut source).unwrap();
            let window = buffer.window();
            let take = window
                .iter()
                .position(|&c| c == '\n')
                .map_or(window.len(), |i| i + 1);
            seen.extend(&buffer.window()[..take]);
            buffer.consume(take).unwrap();
        }
        assert_eq!(seen, "head\n");

        buffer.reset().unwrap();
        buffer.commit();
        assert_eq!(read_all(&mut buffer, &mut source, 3), "head\nbody\n");
    }

    #[test]
    fn oversized_pushback_overflows() {
        let mut buffer = buffer(2, 4);
        let err = buffer.push_back(&['a'; 5]).unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { limit: 4 }));
    }

    #[test]
    fn oversized_replay_overflows() {
        let mut buffer = buffer(4, 4);
        let mut source = StrSource::new("abcdefgh");
        buffer.checkpoint();
        buffer.fill(&mut source).unwrap();
        buffer.consume(4).unwrap();
        buffer.fill(&mut source).unwrap();
        let err = buffer.consume(1).unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { limit: 4 }));
    }

    #[test]
    fn oversized_source_read_under_checkpoint_overflows() {
        let mut buffer = buffer(2, 4);
        let mut source = StrSource::new("abcdefgh");
        buffer.checkpoint();
        let mut dst = ['\0'; 6];
        let err = buffer.read_into(&mut dst, &mut source).unwrap_err();
        assert!(matches!(err, Error::BufferOverflow { limit: 4 }));
    }

    #[test]
    fn window_is_returned_on_error_exit() {
        let pool = Arc::new(CountingPool::default());
        let outcome = (|| -> Result<()> {
            let mut buffer = PushbackBuffer::new(pool.clone(), 2, 2);
            buffer.push_back(&['x'; 3])?;
            Ok(())
        })();
        assert!(outcome.is_err());
        assert_eq!(pool.rented.load(Ordering::SeqCst), 1);
        assert_eq!(pool.returned.load(Ordering::SeqCst), 1);
    }
}
