//! Tokenizer automaton.
//!
//! The machine consumes one classified character at a time and reports what
//! the character means ([`Action`]). All of its state is plain data, so a
//! caller can stop after any character (for example because the source has
//! nothing more to give right now) and resume later by calling
//! [`ReaderStateMachine::advance`] again.
//!
//! Transitions are not decided per character with branches on the options;
//! they are looked up in tables compiled once per grammar. There is one table
//! per row ending. Under [`RowEnding::Detect`] the machine starts on the
//! detecting table and switches to the concrete one as soon as the first
//! terminator has been seen.
//!
//! Invariants
//! - A comment start only counts at the very beginning of a record.
//! - Under a frozen ending, terminator characters of the other endings are
//!   content. A lone `\n` after `\r\n` was detected is part of the field.
//! - Once in [`State::Invalid`] every further character is rejected.

use tracing::debug;

use crate::{
    error::SyntaxError,
    grammar::Grammar,
    lookup::CharacterRole,
    options::{EscapeMode, RowEnding},
};

/// Where the automaton is within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    RecordStart,
    /// Right after a value separator.
    FieldStart,
    UnquotedField,
    QuotedField,
    /// After a distinct escape character inside quotes.
    QuotedEscape,
    /// After a quote that closed, or under doubled escaping may be about to
    /// escape, a quoted field.
    AfterClosingQuote,
    Comment,
    /// Saw `\r` inside a comment and needs the next character to decide.
    CommentCr,
    /// Saw `\r` at the start of a record.
    RecordStartCr,
    /// Saw `\r` inside or right after an unquoted field.
    FieldCr,
    /// Saw `\r` right after a closing quote.
    AfterQuoteCr,
    Invalid,
}

impl State {
    const COUNT: usize = 12;

    const ALL: [State; Self::COUNT] = [
        State::RecordStart,
        State::FieldStart,
        State::UnquotedField,
        State::QuotedField,
        State::QuotedEscape,
        State::AfterClosingQuote,
        State::Comment,
        State::CommentCr,
        State::RecordStartCr,
        State::FieldCr,
        State::AfterQuoteCr,
        State::Invalid,
    ];
}

/// What the tokenizer should do with the character just classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Consume without output.
    Skip,
    /// Append the character to the current field.
    Append,
    /// Append the character to the current field as the product of an escape.
    AppendEscaped,
    /// Append a `\r` that turned out not to start a terminator.
    AppendCarriageReturn,
    BeginQuoted,
    EndQuoted,
    EndField,
    EndRecord,
    /// A terminator at the start of a record; nothing is emitted.
    SkipBlankLine,
    BeginComment,
    AppendComment,
    AppendCommentCarriageReturn,
    EndComment,
    Reject(SyntaxError),
}

/// One table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: State,
    pub action: Action,
    /// Feed the same character again after applying `action`.
    pub reprocess: bool,
    /// Row ending chosen by this transition, set only on the detecting table.
    pub freeze: Option<RowEnding>,
}

impl Transition {
    const fn to(next: State, action: Action) -> Self {
        Self {
            next,
            action,
            reprocess: false,
            freeze: None,
        }
    }

    const fn reject(reason: SyntaxError) -> Self {
        Self::to(State::Invalid, Action::Reject(reason))
    }

    const fn again(mut self) -> Self {
        self.reprocess = true;
        self
    }

    const fn frozen(mut self, freeze: Option<RowEnding>) -> Self {
        self.freeze = freeze;
        self
    }
}

type Table = [[Transition; CharacterRole::COUNT]; State::COUNT];

/// Transition tables for every row ending, compiled for one escape mode.
#[derive(Debug, Clone)]
pub struct TransitionTables {
    tables: Box<[Table; RowEnding::COUNT]>,
}

/// How a character acts as a row terminator under a given ending.
#[derive(Clone, Copy)]
enum Terminator {
    None,
    /// Ends the row by itself; may freeze the detected ending.
    Ends(Option<RowEnding>),
    /// A `\r` that ends the row only if followed by `\n` (or, while detecting,
    /// ends it on its own otherwise).
    Pending,
}

impl Terminator {
    fn of(role: CharacterRole, ending: RowEnding) -> Self {
        match (ending, role) {
            (RowEnding::Lf, CharacterRole::LineFeed) | (RowEnding::Cr, CharacterRole::CarriageReturn) => {
                Terminator::Ends(None)
            }
            (RowEnding::Detect, CharacterRole::LineFeed) => Terminator::Ends(Some(RowEnding::Lf)),
            (RowEnding::CrLf | RowEnding::Detect, CharacterRole::CarriageReturn) => Terminator::Pending,
            _ => Terminator::None,
        }
    }
}

impl TransitionTables {
    /// Compiles the tables for `escape`.
    #[must_use]
    pub fn compile(escape: EscapeMode) -> Self {
        let doubled = escape == EscapeMode::Doubled;
        let endings = [RowEnding::Cr, RowEnding::Lf, RowEnding::CrLf, RowEnding::Detect];
        let tables = endings.map(|ending| {
            State::ALL.map(|state| CharacterRole::ALL.map(|role| rule(state, role, ending, doubled)))
        });
        Self {
            tables: Box::new(tables),
        }
    }

    #[inline]
    fn get(&self, ending: RowEnding, state: State, role: CharacterRole) -> Transition {
        self.tables[ending.index()][state as usize][role as usize]
    }
}

#[allow(clippy::too_many_lines)]
fn rule(state: State, role: CharacterRole, ending: RowEnding, doubled: bool) -> Transition {
    use Action::*;
    use CharacterRole as R;

    let terminator = Terminator::of(role, ending);
    match state {
        State::RecordStart => match (terminator, role) {
            (Terminator::Ends(f), _) => Transition::to(State::RecordStart, SkipBlankLine).frozen(f),
            (Terminator::Pending, _) => Transition::to(State::RecordStartCr, Skip),
            (_, R::ValueSeparator) => Transition::to(State::FieldStart, EndField),
            (_, R::Quote) => Transition::to(State::QuotedField, BeginQuoted),
            (_, R::CommentStart) => Transition::to(State::Comment, BeginComment),
            _ => Transition::to(State::UnquotedField, Append),
        },
        State::FieldStart => match (terminator, role) {
            (Terminator::Ends(f), _) => Transition::to(State::RecordStart, EndRecord).frozen(f),
            (Terminator::Pending, _) => Transition::to(State::FieldCr, Skip),
            (_, R::ValueSeparator) => Transition::to(State::FieldStart, EndField),
            (_, R::Quote) => Transition::to(State::QuotedField, BeginQuoted),
            _ => Transition::to(State::UnquotedField, Append),
        },
        State::UnquotedField => match (terminator, role) {
            (Terminator::Ends(f), _) => Transition::to(State::RecordStart, EndRecord).frozen(f),
            (Terminator::Pending, _) => Transition::to(State::FieldCr, Skip),
            (_, R::ValueSeparator) => Transition::to(State::FieldStart, EndField),
            (_, R::Quote) => Transition::reject(SyntaxError::QuoteInUnquotedField),
            _ => Transition::to(State::UnquotedField, Append),
        },
        State::QuotedField => match role {
            R::Quote => Transition::to(State::AfterClosingQuote, EndQuoted),
            R::Escape => Transition::to(State::QuotedEscape, Skip),
            _ => Transition::to(State::QuotedField, Append),
        },
        State::QuotedEscape => Transition::to(State::QuotedField, AppendEscaped),
        State::AfterClosingQuote => match (terminator, role) {
            (_, R::Quote) if doubled => Transition::to(State::QuotedField, AppendEscaped),
            (_, R::ValueSeparator) => Transition::to(State::FieldStart, EndField),
            (Terminator::Ends(f), _) => Transition::to(State::RecordStart, EndRecord).frozen(f),
            (Terminator::Pending, _) => Transition::to(State::AfterQuoteCr, Skip),
            _ => Transition::reject(SyntaxError::UnexpectedAfterQuote),
        },
        State::Comment => match terminator {
            Terminator::Ends(f) => Transition::to(State::RecordStart, EndComment).frozen(f),
            Terminator::Pending => Transition::to(State::CommentCr, Skip),
            Terminator::None => Transition::to(State::Comment, AppendComment),
        },
        State::CommentCr | State::RecordStartCr | State::FieldCr | State::AfterQuoteCr => {
            after_carriage_return(state, role, ending)
        }
        State::Invalid => Transition::reject(SyntaxError::AfterInvalid),
    }
}

/// Transitions out of the states that hold a pending `\r`. Only reachable
/// under [`RowEnding::CrLf`] and [`RowEnding::Detect`].
fn after_carriage_return(state: State, role: CharacterRole, ending: RowEnding) -> Transition {
    use Action::*;

    let line_feed = role == CharacterRole::LineFeed;
    match ending {
        RowEnding::CrLf | RowEnding::Detect if line_feed => {
            let freeze = (ending == RowEnding::Detect).then_some(RowEnding::CrLf);
            let action = match state {
                State::CommentCr => EndComment,
                State::RecordStartCr => SkipBlankLine,
                _ => EndRecord,
            };
            Transition::to(State::RecordStart, action).frozen(freeze)
        }
        RowEnding::CrLf => match state {
            State::CommentCr => Transition::to(State::Comment, AppendCommentCarriageReturn).again(),
            State::AfterQuoteCr => Transition::reject(SyntaxError::DanglingCarriageReturn),
            _ => Transition::to(State::UnquotedField, AppendCarriageReturn).again(),
        },
        RowEnding::Detect => {
            let action = match state {
                State::CommentCr => EndComment,
                State::RecordStartCr => SkipBlankLine,
                _ => EndRecord,
            };
            Transition::to(State::RecordStart, action)
                .again()
                .frozen(Some(RowEnding::Cr))
        }
        RowEnding::Cr | RowEnding::Lf => Transition::reject(SyntaxError::DanglingCarriageReturn),
    }
}

/// Resumable tokenizer state: the current [`State`] and the row ending in
/// force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStateMachine {
    state: State,
    ending: RowEnding,
}

/// Result of feeding one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// The same character must be fed again.
    pub reprocess: bool,
}

impl ReaderStateMachine {
    #[must_use]
    pub fn new(ending: RowEnding) -> Self {
        Self {
            state: State::RecordStart,
            ending,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// The row ending in force. Stays [`RowEnding::Detect`] until the first
    /// terminator has been seen.
    #[inline]
    #[must_use]
    pub fn row_ending(&self) -> RowEnding {
        self.ending
    }

    /// Feeds one character.
    #[inline]
    pub fn advance(&mut self, grammar: &Grammar, ch: char) -> Step {
        let role = grammar.lookup().classify(ch);
        let transition = grammar.tables().get(self.ending, self.state, role);
        self.state = transition.next;
        if let Some(ending) = transition.freeze {
            debug!(?ending, "row ending detected");
            self.ending = ending;
        }
        Step {
            action: transition.action,
            reprocess: transition.reprocess,
        }
    }

    /// Closes the stream and returns the actions that flush whatever was in
    /// flight. Afterwards the machine is back at [`State::RecordStart`], or
    /// in [`State::Invalid`] if the input ended inside a quoted field.
    pub fn end_of_input(&mut self) -> &'static [Action] {
        use Action::*;

        let crlf = self.ending == RowEnding::CrLf;
        let actions: &'static [Action] = match self.state {
            State::RecordStart => &[],
            State::FieldStart | State::UnquotedField | State::AfterClosingQuote => &[EndRecord],
            State::QuotedField | State::QuotedEscape => {
                &[Reject(SyntaxError::UnterminatedQuotedField)]
            }
            State::Comment => &[EndComment],
            State::CommentCr if crlf => &[AppendCommentCarriageReturn, EndComment],
            State::CommentCr => &[EndComment],
            State::RecordStartCr | State::FieldCr if crlf => &[AppendCarriageReturn, EndRecord],
            State::RecordStartCr => &[],
            State::FieldCr => &[EndRecord],
            State::AfterQuoteCr if crlf => &[Reject(SyntaxError::DanglingCarriageReturn)],
            State::AfterQuoteCr => &[EndRecord],
            State::Invalid => &[Reject(SyntaxError::AfterInvalid)],
        };

        if self.ending == RowEnding::Detect
            && matches!(self.state, State::CommentCr | State::RecordStartCr | State::FieldCr | State::AfterQuoteCr)
        {
            debug!(ending = ?RowEnding::Cr, "row ending detected at end of input");
            self.ending = RowEnding::Cr;
        }

        self.state = if actions.iter().any(|a| matches!(a, Reject(_))) {
            State::Invalid
        } else {
            State::RecordStart
        };
        actions
    }
}
