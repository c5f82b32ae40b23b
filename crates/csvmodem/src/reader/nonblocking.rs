use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ReaderCore, Record, Step};
use crate::{
    binder::RowBinder,
    dynamic::DynamicRowBuilder,
    error::{Error, Result},
    grammar::Grammar,
    headers::Headers,
    options::ReaderOptions,
    pool::{CharPool, SharedPool},
    row_constructor::RowConstructor,
    schema::{Describe, Schema, TypeDescriber},
    source::AsyncCharSource,
};

/// Async CSV reader.
///
/// Every read may suspend at exactly one point: when the buffer asks the
/// source for more characters. That read races the caller's
/// [`CancellationToken`]. After a cancellation the reader is poisoned and
/// every later call fails with [`Error::Cancelled`]; a row in flight is
/// dropped, never returned half-bound.
///
/// # Examples
///
/// ```rust
/// use csvmodem::{AsyncReader, ReaderOptions, StrSource};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let cancel = CancellationToken::new();
/// let text = "id,tag\n1,a\n2,b\n";
/// let mut reader = AsyncReader::dynamic(StrSource::new(text), &ReaderOptions::default())?;
/// let rows = reader.read_all(&cancel).await?;
/// assert_eq!(rows[1].get("tag"), Some("b"));
/// # Ok::<(), csvmodem::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct AsyncReader<S, B: RowBinder> {
    core: ReaderCore<B>,
    source: S,
    poisoned: bool,
}

impl<S: AsyncCharSource, T: Describe + 'static> AsyncReader<S, RowConstructor<T>> {
    /// Reads rows of a self-describing type.
    ///
    /// # Errors
    ///
    /// Invalid options or schema.
    pub fn new(source: S, options: &ReaderOptions) -> Result<Self> {
        Self::with_schema(source, options, T::schema()?)
    }
}

impl<S: AsyncCharSource, T: 'static> AsyncReader<S, RowConstructor<T>> {
    /// # Errors
    ///
    /// Invalid options.
    pub fn with_schema(source: S, options: &ReaderOptions, schema: Schema<T>) -> Result<Self> {
        let binder = RowConstructor::new(Arc::new(schema));
        Ok(Self::with_binder(source, Grammar::compile(options)?, binder))
    }

    /// # Errors
    ///
    /// Invalid options, or whatever `describer` reports.
    pub fn with_describer(source: S, options: &ReaderOptions, describer: &impl TypeDescriber<T>) -> Result<Self> {
        Self::with_schema(source, options, describer.describe()?)
    }
}

impl<S: AsyncCharSource> AsyncReader<S, DynamicRowBuilder> {
    /// # Errors
    ///
    /// Invalid options.
    pub fn dynamic(source: S, options: &ReaderOptions) -> Result<Self> {
        Ok(Self::with_binder(source, Grammar::compile(options)?, DynamicRowBuilder::new()))
    }
}

impl<S: AsyncCharSource, B: RowBinder> AsyncReader<S, B> {
    pub fn with_binder(source: S, grammar: Arc<Grammar>, binder: B) -> Self {
        Self::with_pool(source, grammar, binder, Arc::new(SharedPool::new()))
    }

    pub fn with_pool(source: S, grammar: Arc<Grammar>, binder: B, pool: Arc<dyn CharPool>) -> Self {
        Self {
            core: ReaderCore::new(grammar, binder, pool),
            source,
            poisoned: false,
        }
    }

    /// Whether the stream has ended, normally or after a fatal error.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.core.is_done()
    }

    #[must_use]
    pub fn grammar(&self) -> &Arc<Grammar> {
        self.core.grammar()
    }

    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        self.core.headers()
    }

    /// Whether a cancellation has ended this reader.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// See [`Reader::read_headers`](crate::Reader::read_headers).
    ///
    /// # Errors
    ///
    /// Source and syntax errors in the first row, or [`Error::Cancelled`].
    pub async fn read_headers(&mut self, cancel: &CancellationToken) -> Result<Option<&Headers>> {
        if self.poisoned {
            return Err(Error::Cancelled);
        }
        while !self.core.classify_headers()? {
            self.fill(cancel).await?;
        }
        Ok(self.core.headers())
    }

    async fn fill(&mut self, cancel: &CancellationToken) -> Result<()> {
        let filled = self.core.fill_async(&mut self.source, cancel).await;
        if matches!(filled, Err(Error::Cancelled)) {
            debug!("read cancelled, reader poisoned");
            self.poisoned = true;
        }
        filled
    }

    async fn drive(
        &mut self,
        slot: &mut Option<B::Row>,
        cancel: &CancellationToken,
    ) -> Result<Option<Record<B::Row>>> {
        if self.poisoned {
            return Err(Error::Cancelled);
        }
        loop {
            match self.core.step(slot)? {
                Step::NeedInput => self.fill(cancel).await?,
                Step::Row(row) => return Ok(Some(Record::Row(row))),
                Step::Comment(text) => return Ok(Some(Record::Comment(text))),
                Step::End => return Ok(None),
            }
        }
    }

    /// The next row or comment line.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] once `cancel` fires while waiting on the source;
    /// otherwise as [`Reader::next_record`](crate::Reader::next_record).
    pub async fn next_record(&mut self, cancel: &CancellationToken) -> Result<Option<Record<B::Row>>> {
        self.drive(&mut None, cancel).await
    }

    /// The next row, skipping comment lines.
    ///
    /// # Errors
    ///
    /// See [`next_record`](Self::next_record).
    pub async fn next_row(&mut self, cancel: &CancellationToken) -> Result<Option<B::Row>> {
        loop {
            match self.drive(&mut None, cancel).await? {
                Some(Record::Row(row)) => return Ok(Some(row)),
                Some(Record::Comment(_)) => {}
                None => return Ok(None),
            }
        }
    }

    /// See [`Reader::try_read_with_reuse`](crate::Reader::try_read_with_reuse).
    ///
    /// # Errors
    ///
    /// See [`next_record`](Self::next_record).
    pub async fn try_read_with_reuse(
        &mut self,
        slot: &mut Option<B::Row>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        loop {
            match self.drive(slot, cancel).await? {
                Some(Record::Row(row)) => {
                    *slot = Some(row);
                    return Ok(true);
                }
                Some(Record::Comment(_)) => {}
                None => return Ok(false),
            }
        }
    }

    /// Every remaining row.
    ///
    /// # Errors
    ///
    /// The first error of any kind.
    pub async fn read_all(&mut self, cancel: &CancellationToken) -> Result<Vec<B::Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row(cancel).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn into_source(self) -> S {
        self.source
    }
}
