use std::sync::Arc;

use super::{ReaderCore, Record, Step};
use crate::{
    binder::RowBinder,
    dynamic::DynamicRowBuilder,
    error::Result,
    grammar::Grammar,
    headers::Headers,
    options::ReaderOptions,
    pool::{CharPool, SharedPool},
    row_constructor::RowConstructor,
    schema::{Describe, Schema, TypeDescriber},
    source::CharSource,
};

/// Blocking CSV reader.
///
/// # Examples
///
/// ```rust
/// use csvmodem::{MemberOptions, Reader, ReaderOptions, SchemaBuilder, StrSource};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct City {
///     name: String,
///     population: u64,
/// }
///
/// let schema = SchemaBuilder::<City>::with_default()
///     .parsed("name", |c, v| c.name = v, MemberOptions::default())
///     .parsed("population", |c, v| c.population = v, MemberOptions::default())
///     .build()?;
///
/// let text = "population,name\n3645000,Berlin\n2161000,Paris\n";
/// let mut reader = Reader::with_schema(StrSource::new(text), &ReaderOptions::default(), schema)?;
/// let cities = reader.read_all()?;
/// assert_eq!(cities[1], City { name: "Paris".into(), population: 2_161_000 });
/// # Ok::<(), csvmodem::Error>(())
/// ```
#[derive(Debug)]
pub struct Reader<S, B: RowBinder> {
    core: ReaderCore<B>,
    source: S,
}

impl<S: CharSource, T: Describe + 'static> Reader<S, RowConstructor<T>> {
    /// Reads rows of a self-describing type.
    ///
    /// # Errors
    ///
    /// Invalid options or schema.
    pub fn new(source: S, options: &ReaderOptions) -> Result<Self> {
        Self::with_schema(source, options, T::schema()?)
    }
}

impl<S: CharSource, T: 'static> Reader<S, RowConstructor<T>> {
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

impl<S: CharSource> Reader<S, DynamicRowBuilder> {
    /// Reads [`DynamicRow`](crate::DynamicRow)s. The first row is a header
    /// unless `options.read_header` is [`ReadHeader::Never`](crate::ReadHeader::Never).
    ///
    /// # Errors
    ///
    /// Invalid options.
    pub fn dynamic(source: S, options: &ReaderOptions) -> Result<Self> {
        Ok(Self::with_binder(source, Grammar::compile(options)?, DynamicRowBuilder::new()))
    }
}

impl<S: CharSource, B: RowBinder> Reader<S, B> {
    /// A reader over a shared grammar, with buffers from a private pool.
    pub fn with_binder(source: S, grammar: Arc<Grammar>, binder: B) -> Self {
        Self::with_pool(source, grammar, binder, Arc::new(SharedPool::new()))
    }

    pub fn with_pool(source: S, grammar: Arc<Grammar>, binder: B, pool: Arc<dyn CharPool>) -> Self {
        Self {
            core: ReaderCore::new(grammar, binder, pool),
            source,
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

    /// Header of the stream, once the first row has been classified as one.
    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        self.core.headers()
    }

    /// Classifies the first row without reading past it. Returns the header
    /// if the first row was one.
    ///
    /// # Errors
    ///
    /// Source and syntax errors in the first row.
    pub fn read_headers(&mut self) -> Result<Option<&Headers>> {
        while !self.core.classify_headers()? {
            self.core.fill(&mut self.source)?;
        }
        Ok(self.core.headers())
    }

    fn drive(&mut self, slot: &mut Option<B::Row>) -> Result<Option<Record<B::Row>>> {
        loop {
            match self.core.step(slot)? {
                Step::NeedInput => self.core.fill(&mut self.source)?,
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
    /// A row-scoped error ([`Error::is_row_scoped`](crate::Error::is_row_scoped))
    /// rejects one row and reading can go on; any other error ends the
    /// stream.
    pub fn next_record(&mut self) -> Result<Option<Record<B::Row>>> {
        self.drive(&mut None)
    }

    /// The next row, skipping comment lines.
    ///
    /// # Errors
    ///
    /// See [`next_record`](Self::next_record).
    pub fn next_row(&mut self) -> Result<Option<B::Row>> {
        loop {
            match self.drive(&mut None)? {
                Some(Record::Row(row)) => return Ok(Some(row)),
                Some(Record::Comment(_)) => {}
                None => return Ok(None),
            }
        }
    }

    /// Reads the next row into `slot`, reusing the instance already there
    /// when the binder can. Returns `false` at the end of the stream.
    ///
    /// # Errors
    ///
    /// See [`next_record`](Self::next_record).
    pub fn try_read_with_reuse(&mut self, slot: &mut Option<B::Row>) -> Result<bool> {
        loop {
            match self.drive(slot)? {
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
    pub fn read_all(&mut self) -> Result<Vec<B::Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: CharSource, B: RowBinder> Iterator for Reader<S, B> {
    type Item = Result<B::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
