//! Readers: the I/O-free core and the blocking and async façades over it.
//!
//! [`ReaderCore::step`] never reads. When it runs out of characters it
//! returns [`Step::NeedInput`] and the façade fills the buffer, blocking or
//! awaiting as its source requires, then calls `step` again with the state
//! exactly where it was left.

mod blocking;
#[cfg(feature = "async")]
mod nonblocking;

use std::{collections::VecDeque, sync::Arc};

use tracing::debug;

pub use self::blocking::Reader;
#[cfg(feature = "async")]
pub use self::nonblocking::AsyncReader;
use crate::{
    binder::RowBinder,
    buffer::PushbackBuffer,
    error::{Error, Result},
    grammar::Grammar,
    headers::{HeaderStep, Headers, HeadersReader},
    options::ExtraColumns,
    pool::CharPool,
    source::CharSource,
    tokenizer::{RowTokenizer, TokenEvent},
};

/// A row or a comment line, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<R> {
    Row(R),
    /// Text after the comment character, without the terminator.
    Comment(String),
}

#[derive(Debug)]
pub(crate) enum Step<R> {
    NeedInput,
    Row(R),
    Comment(String),
    End,
}

#[derive(Debug)]
enum Phase {
    Headers(HeadersReader),
    Rows,
    Done,
}

#[derive(Debug)]
pub(crate) struct ReaderCore<B> {
    buffer: PushbackBuffer,
    tokenizer: RowTokenizer,
    binder: B,
    phase: Phase,
    headers: Option<Headers>,
    comments: VecDeque<String>,
    eof: bool,
}

impl<B: RowBinder> ReaderCore<B> {
    pub(crate) fn new(grammar: Arc<Grammar>, binder: B, pool: Arc<dyn CharPool>) -> Self {
        let options = grammar.options();
        let buffer = PushbackBuffer::new(pool, options.buffer_size, options.max_buffer_size);
        let headers = HeadersReader::new(binder.known_names(), options.read_header);
        Self {
            buffer,
            tokenizer: RowTokenizer::new(grammar),
            binder,
            phase: Phase::Headers(headers),
            headers: None,
            comments: VecDeque::new(),
            eof: false,
        }
    }

    pub(crate) fn grammar(&self) -> &Arc<Grammar> {
        self.tokenizer.grammar()
    }

    pub(crate) fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    pub(crate) fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Fails the stream: every later step ends it.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        self.phase = Phase::Done;
        err
    }

    pub(crate) fn fill(&mut self, source: &mut impl CharSource) -> Result<()> {
        let n = self.buffer.fill(source).map_err(|err| self.fail(err))?;
        self.eof = n == 0;
        Ok(())
    }

    #[cfg(feature = "async")]
    pub(crate) async fn fill_async(
        &mut self,
        source: &mut impl crate::source::AsyncCharSource,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        let filled = self.buffer.fill_async(source, cancel).await;
        let n = filled.map_err(|err| self.fail(err))?;
        self.eof = n == 0;
        Ok(())
    }

    /// Runs first-row classification. `Ok(false)` asks for more input; once
    /// it returns `true` the header, if any, is available.
    pub(crate) fn classify_headers(&mut self) -> Result<bool> {
        let Phase::Headers(reader) = &mut self.phase else {
            return Ok(true);
        };
        let step = reader.step(&mut self.tokenizer, &mut self.buffer, self.eof);
        let HeaderStep::Done(outcome) = step.map_err(|err| self.fail(err))? else {
            return Ok(false);
        };
        if outcome.is_header {
            self.binder.set_headers(outcome.headers.iter());
            self.headers = Some(outcome.headers);
        } else {
            // The row was handed back to the buffer.
            self.eof = false;
        }
        self.comments.extend(outcome.comments);
        self.phase = Phase::Rows;
        Ok(true)
    }

    /// Advances until a row or comment is complete, input is needed, or the
    /// stream ends. `slot` may hold an instance for the binder to reuse.
    pub(crate) fn step(&mut self, slot: &mut Option<B::Row>) -> Result<Step<B::Row>> {
        loop {
            if let Some(comment) = self.comments.pop_front() {
                return Ok(Step::Comment(comment));
            }
            match &mut self.phase {
                Phase::Done => return Ok(Step::End),
                Phase::Headers(_) => {
                    if !self.classify_headers()? {
                        return Ok(Step::NeedInput);
                    }
                }
                Phase::Rows => {
                    let event = if self.eof {
                        self.tokenizer.finish()
                    } else {
                        let window = self.buffer.window();
                        if window.is_empty() {
                            return Ok(Step::NeedInput);
                        }
                        self.tokenizer
                            .feed(window)
                            .and_then(|(consumed, event)| self.buffer.consume(consumed).map(|()| event))
                    };
                    match event.map_err(|err| self.fail(err))? {
                        Some(TokenEvent::Record) => return self.bind(slot).map(Step::Row),
                        Some(TokenEvent::Comment) => {
                            return Ok(Step::Comment(self.tokenizer.comment().to_owned()));
                        }
                        None if self.eof => self.phase = Phase::Done,
                        None => {}
                    }
                }
            }
        }
    }

    fn bind(&mut self, slot: &mut Option<B::Row>) -> Result<B::Row> {
        let row = self.tokenizer.row();
        let reject_extra = self.grammar().options().extra_columns == ExtraColumns::Reject;
        self.binder.try_pre_allocate(slot);
        self.binder.start_row(row).map_err(|err| self.fail(err))?;

        let known = self.binder.column_count();
        let mut failure = None;
        for (column, field) in self.tokenizer.fields().enumerate() {
            let bound = if column >= known {
                if reject_extra {
                    Err(Error::UnexpectedColumn { row, column })
                } else {
                    continue;
                }
            } else if self.binder.is_bound(column) {
                self.binder.column(column, field)
            } else {
                continue;
            };
            if let Err(err) = bound {
                failure = Some(err);
                break;
            }
        }
        if let Some(err) = failure {
            self.binder.abandon_row();
            return Err(self.reject(row, err));
        }
        self.binder.finish_row().map_err(|err| self.reject(row, err))
    }

    /// Row-scoped errors leave the stream usable; anything else ends it.
    fn reject(&mut self, row: usize, err: Error) -> Error {
        if err.is_row_scoped() {
            debug!(row, error = %err, "row rejected");
            err
        } else {
            self.fail(err)
        }
    }
}
