//! Streaming CSV reader with a resumable tokenizer and typed row binding.
//!
//! Characters flow from a [`CharSource`] (or [`AsyncCharSource`]) through a
//! [`PushbackBuffer`] into a table-driven [`ReaderStateMachine`]. Completed
//! records are handed to a [`RowBinder`]: a [`RowConstructor`] for types
//! described by a [`Schema`], or a [`DynamicRowBuilder`] for plain
//! name/value rows. The first row may be a header; it is recognised by
//! matching its cells against the member names of the schema and replayed as
//! data when nothing matches.
//!
//! The tokenizer never blocks. The blocking [`Reader`] and the async
//! [`AsyncReader`] drive the same core and differ only in how they wait for
//! more characters.

#![allow(missing_docs)]

mod binder;
mod buffer;
mod dynamic;
mod grammar;
mod headers;
mod lookup;
mod name_lookup;
mod pool;
mod reader;
mod row_constructor;
mod schema;
mod source;
mod state_machine;
mod tokenizer;

mod error;
mod options;

#[cfg(test)]
mod tests;

pub use binder::RowBinder;
pub use buffer::PushbackBuffer;
pub use dynamic::{DynamicRow, DynamicRowBuilder};
pub use error::{CellError, ConfigError, Error, Result, RowState, SyntaxError};
pub use grammar::Grammar;
pub use headers::{HeaderEnumerator, Headers};
pub use lookup::{CharacterLookup, CharacterRole};
pub use name_lookup::{NameLookup, common_prefix_length};
pub use options::{EscapeMode, ExtraColumns, ReadHeader, ReaderOptions, RowEnding};
pub use pool::{CharPool, SharedPool};
#[cfg(feature = "async")]
pub use reader::AsyncReader;
pub use reader::{Reader, Record};
pub use row_constructor::RowConstructor;
pub use schema::{
    ColumnMember, ConstructorArgs, DeferredSet, Describe, MemberKind, MemberOptions, Schema, SchemaBuilder,
    TypeDescriber,
};
#[cfg(feature = "async")]
pub use source::{AsyncCharSource, AsyncUtf8Source};
pub use source::{CharSource, StrSource, Utf8Source};
pub use state_machine::{Action, ReaderStateMachine, State, Step as MachineStep};
pub use tokenizer::{Field, FieldFlags};
