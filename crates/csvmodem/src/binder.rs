use std::sync::Arc;

use crate::{
    error::Result,
    headers::HeaderEnumerator,
    name_lookup::NameLookup,
    row_constructor::RowConstructor,
    tokenizer::Field,
};

/// Receives the cells of each record and turns them into rows.
///
/// The reader drives a binder through `start_row`, one `column` call per
/// bound cell, and then `finish_row`, or `abandon_row` if anything failed in
/// between.
pub trait RowBinder {
    type Row;

    /// Names a header row is matched against. `None` if the binder accepts
    /// any names.
    fn known_names(&self) -> Option<Arc<NameLookup>>;

    /// Rebinds columns to the header row.
    fn set_headers(&mut self, headers: HeaderEnumerator<'_>);

    /// Whether cells of `column` are delivered at all.
    fn is_bound(&self, column: usize) -> bool;

    /// Columns the binder knows about. Cells past this count are extra.
    fn column_count(&self) -> usize;

    /// Offers the instance to write the next row into. Returns `false` when
    /// the binder cannot reuse instances.
    fn try_pre_allocate(&mut self, slot: &mut Option<Self::Row>) -> bool {
        let _ = slot;
        false
    }

    /// # Errors
    ///
    /// Protocol misuse.
    fn start_row(&mut self, row: usize) -> Result<()>;

    /// # Errors
    ///
    /// The cell cannot be bound.
    fn column(&mut self, column: usize, field: Field<'_>) -> Result<()>;

    /// # Errors
    ///
    /// The row cannot be completed.
    fn finish_row(&mut self) -> Result<Self::Row>;

    fn abandon_row(&mut self);
}

impl<T> RowBinder for RowConstructor<T> {
    type Row = T;

    fn known_names(&self) -> Option<Arc<NameLookup>> {
        Some(self.schema().names().clone())
    }

    fn set_headers(&mut self, headers: HeaderEnumerator<'_>) {
        self.set_column_order(headers);
    }

    fn is_bound(&self, column: usize) -> bool {
        self.member_for_column(column).is_some()
    }

    fn column_count(&self) -> usize {
        RowConstructor::column_count(self)
    }

    fn try_pre_allocate(&mut self, slot: &mut Option<T>) -> bool {
        RowConstructor::try_pre_allocate(self, slot)
    }

    fn start_row(&mut self, row: usize) -> Result<()> {
        RowConstructor::start_row(self, row)
    }

    fn column(&mut self, column: usize, field: Field<'_>) -> Result<()> {
        self.column_available(column, field.text)
    }

    fn finish_row(&mut self) -> Result<T> {
        RowConstructor::finish_row(self)
    }

    fn abandon_row(&mut self) {
        RowConstructor::abandon_row(self);
    }
}
