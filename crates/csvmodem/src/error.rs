use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{lookup::CharacterRole, schema::MemberKind};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong while reading a CSV stream.
///
/// Variants fall into two groups. Stream-fatal errors (configuration, buffer
/// overflow, malformed input, I/O, cancellation) leave the reader unusable.
/// Row-scoped errors reject a single row; the caller may keep reading. Use
/// [`Error::is_row_scoped`] to tell them apart.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("buffered region exceeded the maximum of {limit} characters")]
    BufferOverflow { limit: usize },
    #[error("malformed input at row {row}, offset {offset}: {reason}")]
    Malformed {
        row: usize,
        offset: usize,
        reason: SyntaxError,
    },
    #[error("row {row} is missing required column `{member}`")]
    MissingRequiredColumn { row: usize, member: Arc<str> },
    #[error("row {row}, column {column} (`{member}`): {message}")]
    CellParse {
        row: usize,
        column: usize,
        member: Arc<str>,
        message: String,
    },
    #[error("row {row} could not be constructed: {message}")]
    Construction { row: usize, message: String },
    #[error("row {row} has unexpected column {column}")]
    UnexpectedColumn { row: usize, column: usize },
    #[error("column {column} in row {row} has no bound member")]
    UnboundColumn { row: usize, column: usize },
    #[error("row constructor is {actual}, expected {expected}")]
    RowState { expected: RowState, actual: RowState },
    #[error("invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("read cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` when only the current row was rejected and the reader
    /// can continue with the next one.
    #[must_use]
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            Error::MissingRequiredColumn { .. }
                | Error::CellParse { .. }
                | Error::Construction { .. }
                | Error::UnexpectedColumn { .. }
                | Error::UnboundColumn { .. }
        )
    }
}

/// Reasons the tokenizer gives up on a stream.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("quote character inside an unquoted field")]
    QuoteInUnquotedField,
    #[error("unexpected character after closing quote")]
    UnexpectedAfterQuote,
    #[error("carriage return not followed by line feed after closing quote")]
    DanglingCarriageReturn,
    #[error("unterminated quoted field")]
    UnterminatedQuotedField,
    #[error("input after a previous syntax error")]
    AfterInvalid,
}

/// Problems found while compiling options or a type schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("character {ch:?} is assigned to both {first:?} and {second:?}")]
    DuplicateRole {
        ch: char,
        first: CharacterRole,
        second: CharacterRole,
    },
    #[error("buffer size {size} must be non-zero and at most the maximum of {max}")]
    BufferSize { size: usize, max: usize },
    #[error("member `{0}` is declared more than once")]
    DuplicateMember(Arc<str>),
    #[error("member names must not be empty")]
    EmptyMemberName,
    #[error("no way to create instances: declare a default instance or a constructor")]
    MissingInstanceProvider,
    #[error("constructor parameter position {position} is out of range for arity {arity}")]
    ParameterOutOfRange { position: usize, arity: usize },
    #[error("constructor parameter position {0} is bound more than once")]
    DuplicateParameter(usize),
    #[error("constructor parameters require a constructor instance provider")]
    ParameterWithoutConstructor,
    #[error("member `{member}` is bound by a setter but declared as {kind:?}")]
    KindMismatch { member: Arc<str>, kind: MemberKind },
}

/// Lifecycle of a row constructor; see [`RowConstructor`](crate::RowConstructor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Unstarted,
    Started,
    Finished,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RowState::Unstarted => "unstarted",
            RowState::Started => "started",
            RowState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Failure reported by a member's parser, setter or constructor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CellError(pub String);

impl CellError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_scoped_classification() {
        let missing = Error::MissingRequiredColumn {
            row: 3,
            member: "id".into(),
        };
        assert!(missing.is_row_scoped());
        assert!(!Error::BufferOverflow { limit: 8 }.is_row_scoped());
        assert!(!Error::Cancelled.is_row_scoped());
    }

    #[test]
    fn malformed_message_carries_position() {
        let err = Error::Malformed {
            row: 2,
            offset: 17,
            reason: SyntaxError::UnexpectedAfterQuote,
        };
        assert_eq!(
            err.to_string(),
            "malformed input at row 2, offset 17: unexpected character after closing quote"
        );
    }
}
