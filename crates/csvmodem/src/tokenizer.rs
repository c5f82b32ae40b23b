//! Field and record events on top of [`ReaderStateMachine`].
//!
//! [`RowTokenizer`] accumulates the text of the current record in a single
//! per-row region and remembers each field as a span into it. Consumers
//! borrow [`Field`]s from that region; nothing is allocated per field. The
//! region is recycled when the next record starts.

use std::{fmt, ops::BitOr, sync::Arc};

use tracing::warn;

use crate::{
    error::{Error, Result},
    grammar::Grammar,
    state_machine::{Action, ReaderStateMachine},
};

/// Bit set describing how a field was written.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    /// The field was enclosed in quotes.
    pub const WAS_QUOTED: Self = Self(1 << 0);
    /// The field contained at least one escape sequence.
    pub const WAS_ESCAPED: Self = Self(1 << 1);
    /// The field was cut off by the end of the stream: its record had no
    /// terminator.
    pub const TRUNCATED: Self = Self(1 << 2);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for FieldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::WAS_QUOTED, "WAS_QUOTED"),
            (Self::WAS_ESCAPED, "WAS_ESCAPED"),
            (Self::TRUNCATED, "TRUNCATED"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in names {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// One value of the current record, borrowed from the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Unquoted, unescaped text.
    pub text: &'a str,
    pub flags: FieldFlags,
}

/// What a call to [`RowTokenizer::feed`] or [`RowTokenizer::finish`]
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEvent {
    /// A record is available through [`RowTokenizer::fields`].
    Record,
    /// A comment line is available through [`RowTokenizer::comment`].
    Comment,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpan {
    start: usize,
    end: usize,
    flags: FieldFlags,
}

/// Restorable position of a [`RowTokenizer`], taken at a record boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Snapshot {
    machine: ReaderStateMachine,
    row: usize,
    offset: usize,
}

#[derive(Debug)]
pub(crate) struct RowTokenizer {
    grammar: Arc<Grammar>,
    machine: ReaderStateMachine,
    values: String,
    fields: Vec<FieldSpan>,
    field_start: usize,
    field_flags: FieldFlags,
    comment: String,
    /// Characters held in `values` and `comment`.
    held: usize,
    /// Index of the record being built. Comments do not count.
    row: usize,
    /// Characters consumed since the start of the stream.
    offset: usize,
    /// The last event's text must be cleared before more input is applied.
    emitted: Option<TokenEvent>,
}

impl RowTokenizer {
    pub(crate) fn new(grammar: Arc<Grammar>) -> Self {
        let machine = ReaderStateMachine::new(grammar.options().row_ending);
        Self {
            grammar,
            machine,
            values: String::new(),
            fields: Vec::new(),
            field_start: 0,
            field_flags: FieldFlags::empty(),
            comment: String::new(),
            held: 0,
            row: 0,
            offset: 0,
            emitted: None,
        }
    }

    pub(crate) fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Index of the record currently (or most recently) tokenized.
    pub(crate) fn row(&self) -> usize {
        self.row
    }

    /// Feeds characters until one event completes or `chars` runs out.
    ///
    /// Returns how many characters were consumed. A character that completes
    /// an event and must also start the next one (a record ended by a lone
    /// `\r` during detection) is left unconsumed.
    pub(crate) fn feed(&mut self, chars: &[char]) -> Result<(usize, Option<TokenEvent>)> {
        self.recycle();
        for (i, &ch) in chars.iter().enumerate() {
            loop {
                let step = self.machine.advance(&self.grammar, ch);
                let event = self.apply(step.action, ch)?;
                if let Some(event) = event {
                    let consumed = if step.reprocess { i } else { i + 1 };
                    self.offset += consumed - i;
                    return Ok((consumed, Some(event)));
                }
                if !step.reprocess {
                    break;
                }
            }
            self.offset += 1;
        }
        Ok((chars.len(), None))
    }

    /// Flushes the record or comment in flight at end of stream.
    pub(crate) fn finish(&mut self) -> Result<Option<TokenEvent>> {
        self.recycle();
        let mut event = None;
        for &action in self.machine.end_of_input() {
            if action == Action::EndRecord {
                self.field_flags.insert(FieldFlags::TRUNCATED);
            }
            if let Some(done) = self.apply(action, '\r')? {
                event = Some(done);
            }
        }
        Ok(event)
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn fields(&self) -> impl ExactSizeIterator<Item = Field<'_>> + '_ {
        self.fields.iter().map(|span| Field {
            text: &self.values[span.start..span.end],
            flags: span.flags,
        })
    }

    pub(crate) fn comment(&self) -> &str {
        &self.comment
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            machine: self.machine,
            row: self.row + usize::from(self.emitted == Some(TokenEvent::Record)),
            offset: self.offset,
        }
    }

    /// Rewinds to `snapshot`, dropping any partial record.
    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.emitted = None;
        self.clear();
        self.machine = snapshot.machine;
        self.row = snapshot.row;
        self.offset = snapshot.offset;
    }

    fn recycle(&mut self) {
        if let Some(event) = self.emitted.take() {
            if event == TokenEvent::Record {
                self.row += 1;
            }
            self.clear();
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.fields.clear();
        self.comment.clear();
        self.field_start = 0;
        self.field_flags = FieldFlags::empty();
        self.held = 0;
    }

    fn hold(&mut self) -> Result<()> {
        self.held += 1;
        let limit = self.grammar.options().max_buffer_size;
        if self.held > limit {
            warn!(row = self.row, limit, "row exceeds the buffer limit");
            return Err(Error::BufferOverflow { limit });
        }
        Ok(())
    }

    /// Checked at record and comment close.
    fn check_held(&self) {
        #[cfg(any(test, feature = "fuzzing"))]
        assert_eq!(
            self.held,
            self.values.chars().count() + self.comment.chars().count(),
            "Internal error: held count out of step with buffered text"
        );
    }

    fn close_field(&mut self) {
        self.fields.push(FieldSpan {
            start: self.field_start,
            end: self.values.len(),
            flags: self.field_flags,
        });
        self.field_start = self.values.len();
        self.field_flags = FieldFlags::empty();
    }

    fn apply(&mut self, action: Action, ch: char) -> Result<Option<TokenEvent>> {
        match action {
            Action::Skip | Action::EndQuoted | Action::SkipBlankLine => {}
            Action::Append => {
                self.values.push(ch);
                self.hold()?;
            }
            Action::AppendEscaped => {
                self.values.push(ch);
                self.field_flags.insert(FieldFlags::WAS_ESCAPED);
                self.hold()?;
            }
            Action::AppendCarriageReturn => {
                self.values.push('\r');
                self.hold()?;
            }
            Action::BeginQuoted => self.field_flags.insert(FieldFlags::WAS_QUOTED),
            Action::EndField => self.close_field(),
            Action::EndRecord => {
                self.close_field();
                self.check_held();
                self.emitted = Some(TokenEvent::Record);
                return Ok(Some(TokenEvent::Record));
            }
            Action::BeginComment => self.comment.clear(),
            Action::AppendComment => {
                self.comment.push(ch);
                self.hold()?;
            }
            Action::AppendCommentCarriageReturn => {
                self.comment.push('\r');
                self.hold()?;
            }
            Action::EndComment => {
                self.check_held();
                self.emitted = Some(TokenEvent::Comment);
                return Ok(Some(TokenEvent::Comment));
            }
            Action::Reject(reason) => {
                warn!(row = self.row, offset = self.offset, %reason, "malformed input");
                return Err(Error::Malformed {
                    row: self.row,
                    offset: self.offset,
                    reason,
                });
            }
        }
        Ok(None)
    }
}
