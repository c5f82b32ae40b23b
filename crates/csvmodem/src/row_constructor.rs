//! Binding of cells to typed rows.
//!
//! A [`RowConstructor`] moves through `Unstarted -> Started -> Finished` once
//! per row. Setter members are applied as soon as their cell arrives if an
//! instance already exists; otherwise they are parsed immediately and applied
//! after construction, in member order. Constructor parameters are staged
//! until [`finish_row`](RowConstructor::finish_row), because construction is
//! atomic. The result never depends on the order cells arrive in.

use std::{fmt, sync::Arc};

use tracing::trace;

use crate::{
    error::{CellError, Error, Result, RowState},
    headers::HeaderEnumerator,
    schema::{Binding, ConstructorArgs, DeferredSet, InstanceProvider, Schema},
};

/// Fixed-size bit set over member indices.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberMask {
    words: Vec<u64>,
}

impl MemberMask {
    fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn set(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    fn contains(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    fn clear(&mut self) {
        self.words.fill(0);
    }

    /// First index set in `required` but not in `self`.
    fn first_missing(&self, required: &MemberMask) -> Option<usize> {
        self.words
            .iter()
            .zip(&required.words)
            .enumerate()
            .find_map(|(word, (&seen, &required))| {
                let missing = required & !seen;
                (missing != 0).then(|| word * 64 + missing.trailing_zeros() as usize)
            })
    }
}

/// Binds one row at a time to instances of `T`.
pub struct RowConstructor<T> {
    schema: Arc<Schema<T>>,
    /// Member bound to each column.
    columns: Vec<Option<usize>>,
    state: RowState,
    row: usize,
    seen: MemberMask,
    required: MemberMask,
    instance: Option<T>,
    staged: ConstructorArgs,
    /// `(member, column, set)` for setters waiting on construction.
    deferred: Vec<(usize, usize, DeferredSet<T>)>,
}

impl<T> RowConstructor<T> {
    /// Columns bind to members in declaration order until
    /// [`set_column_order`](Self::set_column_order) says otherwise.
    #[must_use]
    pub fn new(schema: Arc<Schema<T>>) -> Self {
        let members = schema.members.len();
        let mut required = MemberMask::new(members);
        for (index, member) in schema.members.iter().enumerate() {
            if member.required {
                required.set(index);
            }
        }
        let arity = match &schema.provider {
            InstanceProvider::Constructor { arity, .. } => *arity,
            InstanceProvider::Default(_) => 0,
        };
        Self {
            columns: (0..members).map(Some).collect(),
            state: RowState::Unstarted,
            row: 0,
            seen: MemberMask::new(members),
            required,
            instance: None,
            staged: ConstructorArgs::with_arity(arity),
            deferred: Vec::new(),
            schema,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema<T>> {
        &self.schema
    }

    #[must_use]
    pub fn state(&self) -> RowState {
        self.state
    }

    /// Member bound to `column`, if any.
    #[must_use]
    pub fn member_for_column(&self, column: usize) -> Option<usize> {
        self.columns.get(column).copied().flatten()
    }

    /// Number of columns with a position in the current mapping.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Supplies the instance the next row is written into: the one in `slot`
    /// if there is one, a fresh default otherwise.
    ///
    /// Returns `false`, leaving `slot` alone, when instances come from a
    /// constructor. A reused instance keeps the values of members the next
    /// row does not supply.
    pub fn try_pre_allocate(&mut self, slot: &mut Option<T>) -> bool {
        let InstanceProvider::Default(make) = &self.schema.provider else {
            return false;
        };
        if self.state == RowState::Started {
            return false;
        }
        self.instance = Some(slot.take().unwrap_or_else(|| make()));
        true
    }

    /// # Errors
    ///
    /// [`Error::RowState`] if a row is already started.
    pub fn start_row(&mut self, row: usize) -> Result<()> {
        if self.state == RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Unstarted,
                actual: self.state,
            });
        }
        self.state = RowState::Started;
        self.row = row;
        self.seen.clear();
        self.staged.clear();
        self.deferred.clear();
        if self.instance.is_none() {
            if let InstanceProvider::Default(make) = &self.schema.provider {
                self.instance = Some(make());
            }
        }
        Ok(())
    }

    /// Delivers the text of `column` for the current row.
    ///
    /// # Errors
    ///
    /// [`Error::RowState`] outside a row, [`Error::UnboundColumn`] when no
    /// member is bound to `column`, [`Error::CellParse`] when the member
    /// rejects `text`.
    pub fn column_available(&mut self, column: usize, text: &str) -> Result<()> {
        if self.state != RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Started,
                actual: self.state,
            });
        }
        let Some(index) = self.member_for_column(column) else {
            return Err(Error::UnboundColumn {
                row: self.row,
                column,
            });
        };
        let member = &self.schema.members[index];
        let outcome = match &member.binding {
            Binding::Setter { apply, defer } => match &mut self.instance {
                Some(instance) => apply(instance, text),
                None => defer(text).map(|set| self.deferred.push((index, column, set))),
            },
            Binding::Parameter { position, parse } => {
                parse(text).map(|value| self.staged.stage(*position, value))
            }
        };
        outcome.map_err(|err| self.cell_error(column, index, err))?;
        self.seen.set(index);
        Ok(())
    }

    /// Completes the row and returns its instance.
    ///
    /// # Errors
    ///
    /// [`Error::RowState`] outside a row; [`Error::MissingRequiredColumn`]
    /// before anything is constructed if a required member never arrived;
    /// [`Error::Construction`] and [`Error::CellParse`] from the constructor
    /// and deferred setters.
    pub fn finish_row(&mut self) -> Result<T> {
        if self.state != RowState::Started {
            return Err(Error::RowState {
                expected: RowState::Started,
                actual: self.state,
            });
        }
        self.state = RowState::Finished;

        if let Some(index) = self.seen.first_missing(&self.required) {
            self.instance = None;
            return Err(Error::MissingRequiredColumn {
                row: self.row,
                member: self.schema.members[index].name.clone(),
            });
        }

        let mut instance = match (self.instance.take(), &self.schema.provider) {
            (Some(instance), _) => instance,
            (None, InstanceProvider::Default(make)) => make(),
            (None, InstanceProvider::Constructor { build, .. }) => {
                build(&mut self.staged).map_err(|err| Error::Construction {
                    row: self.row,
                    message: err.0,
                })?
            }
        };

        let mut deferred = std::mem::take(&mut self.deferred);
        deferred.sort_by_key(|&(index, _, _)| index);
        for (index, column, set) in deferred {
            set(&mut instance).map_err(|err| self.cell_error(column, index, err))?;
        }
        trace!(row = self.row, "row constructed");
        Ok(instance)
    }

    /// Drops the row in progress without producing anything.
    pub fn abandon_row(&mut self) {
        self.state = RowState::Finished;
        self.instance = None;
        self.staged.clear();
        self.deferred.clear();
    }

    /// Rebinds columns by header name. A header naming no member leaves its
    /// column unbound; a name repeated in the header binds only its first
    /// column. Members with no header are simply never supplied.
    pub fn set_column_order(&mut self, headers: HeaderEnumerator<'_>) {
        let mut taken = MemberMask::new(self.schema.members.len());
        self.columns = headers
            .map(|name| {
                let index = self.schema.member_index(name)?;
                if taken.contains(index) {
                    return None;
                }
                taken.set(index);
                Some(index)
            })
            .collect();
    }

    fn cell_error(&self, column: usize, index: usize, err: CellError) -> Error {
        Error::CellParse {
            row: self.row,
            column,
            member: self.schema.members[index].name.clone(),
            message: err.0,
        }
    }
}

impl<T> Clone for RowConstructor<T> {
    /// An independent constructor with the same schema and column mapping,
    /// ready for a new row.
    fn clone(&self) -> Self {
        let mut clone = Self::new(self.schema.clone());
        clone.columns.clone_from(&self.columns);
        clone
    }
}

impl<T> fmt::Debug for RowConstructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowConstructor")
            .field("state", &self.state)
            .field("row", &self.row)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CellError,
        headers::Headers,
        schema::{MemberOptions, SchemaBuilder},
    };

    #[derive(Debug, Default, PartialEq, Clone)]
    struct Account {
        id: u64,
        owner: String,
        balance: i64,
    }

    fn required() -> MemberOptions {
        MemberOptions {
            required: true,
            ..Default::default()
        }
    }

    fn setter_schema() -> Arc<Schema<Account>> {
        Arc::new(
            SchemaBuilder::with_default()
                .parsed("id", |a: &mut Account, v| a.id = v, required())
                .parsed("owner", |a: &mut Account, v| a.owner = v, MemberOptions::default())
                .parsed("balance", |a: &mut Account, v| a.balance = v, MemberOptions::default())
                .build()
                .unwrap(),
        )
    }

    fn constructor_schema() -> Arc<Schema<Account>> {
        Arc::new(
            SchemaBuilder::new()
                .constructor(2, |args| {
                    Ok(Account {
                        id: args.take(0).ok_or_else(|| CellError::new("id missing"))?,
                        owner: args.take_or_default(1),
                        balance: 0,
                    })
                })
                .parsed_parameter::<u64>("id", 0, required())
                .parsed_parameter::<String>("owner", 1, MemberOptions::default())
                .parsed("balance", |a: &mut Account, v| a.balance = v, MemberOptions::default())
                .build()
                .unwrap(),
        )
    }

    fn bind(schema: Arc<Schema<Account>>, cells: &[(usize, &str)]) -> Result<Account> {
        let mut constructor = RowConstructor::new(schema);
        constructor.start_row(0)?;
        for &(column, text) in cells {
            constructor.column_available(column, text)?;
        }
        constructor.finish_row()
    }

    #[test]
    fn setters_bind_in_declaration_order() {
        let account = bind(setter_schema(), &[(0, "7"), (1, "ada"), (2, "-5")]).unwrap();
        assert_eq!(
            account,
            Account {
                id: 7,
                owner: "ada".into(),
                balance: -5
            }
        );
    }

    #[test]
    fn constructor_and_setters_mix() {
        let account = bind(constructor_schema(), &[(2, "10"), (1, "grace"), (0, "3")]).unwrap();
        assert_eq!(
            account,
            Account {
                id: 3,
                owner: "grace".into(),
                balance: 10
            }
        );
    }

    #[test]
    fn missing_required_is_checked_before_construction() {
        let err = bind(constructor_schema(), &[(1, "grace")]).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredColumn { ref member, .. } if &**member == "id"));
        assert!(err.is_row_scoped());
    }

    #[test]
    fn optional_members_default() {
        let account = bind(setter_schema(), &[(0, "1")]).unwrap();
        assert_eq!(account, Account { id: 1, ..Default::default() });
    }

    #[test]
    fn parse_failures_name_the_member() {
        let err = bind(setter_schema(), &[(0, "seven")]).unwrap_err();
        match err {
            Error::CellParse { column, member, .. } => {
                assert_eq!(column, 0);
                assert_eq!(&*member, "id");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut constructor = RowConstructor::new(setter_schema());
        assert!(matches!(
            constructor.column_available(0, "1"),
            Err(Error::RowState { actual: RowState::Unstarted, .. })
        ));
        constructor.start_row(0).unwrap();
        assert!(matches!(
            constructor.start_row(1),
            Err(Error::RowState { actual: RowState::Started, .. })
        ));
        assert!(matches!(
            constructor.column_available(9, "1"),
            Err(Error::UnboundColumn { column: 9, .. })
        ));
        constructor.column_available(0, "1").unwrap();
        constructor.finish_row().unwrap();
        assert!(matches!(
            constructor.finish_row(),
            Err(Error::RowState { actual: RowState::Finished, .. })
        ));
    }

    #[test]
    fn column_order_follows_headers() {
        let mut constructor = RowConstructor::new(setter_schema());
        let headers: Headers = ["balance", "extra", "id", "id"].into_iter().collect();
        constructor.set_column_order(headers.iter());
        assert_eq!(constructor.member_for_column(0), Some(2));
        assert_eq!(constructor.member_for_column(1), None);
        assert_eq!(constructor.member_for_column(2), Some(0));
        assert_eq!(constructor.member_for_column(3), None);

        constructor.start_row(1).unwrap();
        constructor.column_available(0, "12").unwrap();
        constructor.column_available(2, "4").unwrap();
        let account = constructor.finish_row().unwrap();
        assert_eq!((account.id, account.balance), (4, 12));
    }

    #[test]
    fn pre_allocation_reuses_the_slot() {
        let mut constructor = RowConstructor::new(setter_schema());
        let mut slot = Some(Account {
            owner: "kept".into(),
            ..Default::default()
        });
        assert!(constructor.try_pre_allocate(&mut slot));
        assert!(slot.is_none());
        constructor.start_row(0).unwrap();
        constructor.column_available(0, "2").unwrap();
        let account = constructor.finish_row().unwrap();
        assert_eq!(account.owner, "kept");

        let mut by_constructor = RowConstructor::new(constructor_schema());
        let mut slot = Some(account);
        assert!(!by_constructor.try_pre_allocate(&mut slot));
        assert!(slot.is_some());
    }

    #[test]
    fn clones_are_independent() {
        let mut first = RowConstructor::new(setter_schema());
        first.start_row(0).unwrap();
        first.column_available(1, "a").unwrap();
        let mut second = first.clone();
        assert_eq!(second.state(), RowState::Unstarted);
        second.start_row(0).unwrap();
        second.column_available(0, "2").unwrap();
        assert_eq!(second.finish_row().unwrap().owner, "");

        first.column_available(0, "1").unwrap();
        assert_eq!(first.finish_row().unwrap().owner, "a");
    }

    #[test]
    fn abandoned_rows_leave_no_trace() {
        let mut constructor = RowConstructor::new(setter_schema());
        constructor.start_row(0).unwrap();
        constructor.column_available(1, "half").unwrap();
        constructor.abandon_row();
        constructor.start_row(1).unwrap();
        constructor.column_available(0, "5").unwrap();
        assert_eq!(constructor.finish_row().unwrap().owner, "");
    }
}
