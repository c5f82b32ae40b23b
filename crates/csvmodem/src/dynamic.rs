//! Name/value rows for streams without a row type.

use std::{fmt, sync::Arc};

use crate::{
    binder::RowBinder,
    error::{Error, Result, RowState},
    headers::HeaderEnumerator,
    name_lookup::NameLookup,
    tokenizer::Field,
};

/// One record as text, with the column names of its stream.
#[derive(Clone, PartialEq, Eq)]
pub struct DynamicRow {
    names: Arc<[Arc<str>]>,
    values: Vec<String>,
    row: usize,
}

impl DynamicRow {
    /// Value of the first column called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let column = self.names.iter().position(|n| &**n == name)?;
        self.get_index(column)
    }

    #[must_use]
    pub fn get_index(&self, column: usize) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Record index within the stream.
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Column names; columns without a header name are named by their index.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names[..self.values.len().min(self.names.len())]
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> + '_ {
        self.names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (&**name, value.as_str()))
    }

    /// Takes the values, dropping the names.
    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

impl fmt::Debug for DynamicRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// [`RowBinder`] producing [`DynamicRow`]s.
#[derive(Debug, Clone)]
pub struct DynamicRowBuilder {
    names: Arc<[Arc<str>]>,
    /// Number of columns named by the header; `None` without a header.
    header_len: Option<usize>,
    values: Vec<String>,
    row: usize,
    state: RowState,
}

impl Default for DynamicRowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicRowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Arc::from(Vec::new()),
            header_len: None,
            values: Vec::new(),
            row: 0,
            state: RowState::Unstarted,
        }
    }

    /// Extends the shared names so every column up to `len` has one. Columns
    /// past the header are named by their index.
    fn name_columns(&mut self, len: usize) {
        if self.names.len() >= len {
            return;
        }
        let names: Vec<Arc<str>> = self
            .names
            .iter()
            .cloned()
            .chain((self.names.len()..len).map(|column| Arc::from(column.to_string())))
            .collect();
        self.names = names.into();
    }
}

impl RowBinder for DynamicRowBuilder {
    type Row = DynamicRow;

    fn known_names(&self) -> Option<Arc<NameLookup>> {
        None
    }

    fn set_headers(&mut self, headers: HeaderEnumerator<'_>) {
        let names: Vec<Arc<str>> = headers.map(Arc::from).collect();
        self.header_len = Some(names.len());
        self.names = names.into();
    }

    fn is_bound(&self, _column: usize) -> bool {
        true
    }

    fn column_count(&self) -> usize {
        self.header_len.unwrap_or(usize::MAX)
    }

    fn start_row(&mut self, row: usize) -> Result<()> {
        if self.state == RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Unstarted,
                actual: self.state,
            });
        }
        self.state = RowState::Started;
        self.row = row;
        self.values.clear();
        Ok(())
    }

    fn column(&mut self, column: usize, field: Field<'_>) -> Result<()> {
        if self.state != RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Started,
                actual: self.state,
            });
        }
        if self.values.len() <= column {
            self.values.resize(column + 1, String::new());
        }
        field.text.clone_into(&mut self.values[column]);
        Ok(())
    }

    fn finish_row(&mut self) -> Result<DynamicRow> {
        if self.state != RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Started,
                actual: self.state,
            });
        }
        self.state = RowState::Finished;
        self.name_columns(self.values.len());
        Ok(DynamicRow {
            names: self.names.clone(),
            values: std::mem::take(&mut self.values),
            row: self.row,
        })
    }

    fn abandon_row(&mut self) {
        self.state = RowState::Finished;
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{headers::Headers, tokenizer::FieldFlags};

    fn field(text: &str) -> Field<'_> {
        Field {
            text,
            flags: FieldFlags::empty(),
        }
    }

    #[test]
    fn extra_columns_are_named_by_index() {
        let mut builder = DynamicRowBuilder::new();
        let headers: Headers = ["a", "b"].into_iter().collect();
        builder.set_headers(headers.iter());
        builder.start_row(1).unwrap();
        for (column, text) in ["1", "2", "3"].into_iter().enumerate() {
            builder.column(column, field(text)).unwrap();
        }
        let row = builder.finish_row().unwrap();
        assert_eq!(row.get("b"), Some("2"));
        assert_eq!(row.get("2"), Some("3"));
        assert_eq!(row.row(), 1);
        assert_eq!(
            row.iter().collect::<Vec<_>>(),
            [("a", "1"), ("b", "2"), ("2", "3")]
        );
    }

    #[test]
    fn short_rows_expose_only_their_columns() {
        let mut builder = DynamicRowBuilder::new();
        let headers: Headers = ["a", "b", "c"].into_iter().collect();
        builder.set_headers(headers.iter());
        builder.start_row(0).unwrap();
        builder.column(0, field("x")).unwrap();
        let row = builder.finish_row().unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.names().len(), 1);
        assert_eq!(row.get("b"), None);
    }

    #[test]
    fn rows_share_names() {
        let mut builder = DynamicRowBuilder::new();
        builder.start_row(0).unwrap();
        builder.column(0, field("x")).unwrap();
        let first = builder.finish_row().unwrap();
        builder.start_row(1).unwrap();
        builder.column(0, field("y")).unwrap();
        let second = builder.finish_row().unwrap();
        assert!(Arc::ptr_eq(&first.names, &second.names));
        assert_eq!(format!("{second:?}"), r#"{"0": "y"}"#);
    }
}
