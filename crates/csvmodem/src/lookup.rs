//! Character classification.
//!
//! [`CharacterLookup`] maps every character to the grammar role it plays under
//! one set of [`ReaderOptions`]. The table is dense over the range spanned by
//! the special characters; anything outside that range is
//! [`CharacterRole::Normal`] without touching the table.

use crate::{
    error::ConfigError,
    options::{EscapeMode, ReaderOptions, RowEnding},
};

/// The part a character plays in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CharacterRole {
    /// Field content.
    Normal,
    ValueSeparator,
    Quote,
    /// Only assigned under [`EscapeMode::Distinct`].
    Escape,
    CommentStart,
    CarriageReturn,
    LineFeed,
    /// A row-ending character that the configured row ending never treats as
    /// a terminator, e.g. `\r` under [`RowEnding::Lf`]. Read as content.
    Other,
}

impl CharacterRole {
    pub(crate) const COUNT: usize = 8;

    pub(crate) const ALL: [CharacterRole; Self::COUNT] = [
        CharacterRole::Normal,
        CharacterRole::ValueSeparator,
        CharacterRole::Quote,
        CharacterRole::Escape,
        CharacterRole::CommentStart,
        CharacterRole::CarriageReturn,
        CharacterRole::LineFeed,
        CharacterRole::Other,
    ];
}

/// O(1) character → [`CharacterRole`] table.
#[derive(Debug, Clone)]
pub struct CharacterLookup {
    min: u32,
    table: Box<[CharacterRole]>,
}

impl CharacterLookup {
    /// Builds the table for `options`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateRole`] when two roles share a character. The
    /// row-ending characters `\r` and `\n` are always reserved.
    pub fn build(options: &ReaderOptions) -> Result<Self, ConfigError> {
        let (cr, lf) = match options.row_ending {
            RowEnding::Cr => (CharacterRole::CarriageReturn, CharacterRole::Other),
            RowEnding::Lf => (CharacterRole::Other, CharacterRole::LineFeed),
            RowEnding::CrLf | RowEnding::Detect => {
                (CharacterRole::CarriageReturn, CharacterRole::LineFeed)
            }
        };

        let mut assigned = vec![
            (options.value_separator, CharacterRole::ValueSeparator),
            (options.quote, CharacterRole::Quote),
        ];
        if let EscapeMode::Distinct(escape) = options.escape {
            assigned.push((escape, CharacterRole::Escape));
        }
        if let Some(comment) = options.comment {
            assigned.push((comment, CharacterRole::CommentStart));
        }
        assigned.push(('\r', cr));
        assigned.push(('\n', lf));

        for (i, &(ch, second)) in assigned.iter().enumerate() {
            if let Some(&(_, first)) = assigned[..i].iter().find(|(other, _)| *other == ch) {
                return Err(ConfigError::DuplicateRole { ch, first, second });
            }
        }

        let min = assigned.iter().map(|&(ch, _)| ch as u32).min().unwrap_or(0);
        let max = assigned.iter().map(|&(ch, _)| ch as u32).max().unwrap_or(0);
        let mut table = vec![CharacterRole::Normal; (max - min) as usize + 1];
        for (ch, role) in assigned {
            table[(ch as u32 - min) as usize] = role;
        }

        Ok(Self {
            min,
            table: table.into_boxed_slice(),
        })
    }

    /// Returns the role of `ch`.
    #[inline]
    #[must_use]
    pub fn classify(&self, ch: char) -> CharacterRole {
        // Characters below `min` wrap around to a huge index and miss.
        let index = (ch as u32).wrapping_sub(self.min) as usize;
        self.table
            .get(index)
            .copied()
            .unwrap_or(CharacterRole::Normal)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_roles() {
        let lookup = CharacterLookup::build(&ReaderOptions::default()).unwrap();
        assert_eq!(lookup.classify(','), CharacterRole::ValueSeparator);
        assert_eq!(lookup.classify('"'), CharacterRole::Quote);
        assert_eq!(lookup.classify('\r'), CharacterRole::CarriageReturn);
        assert_eq!(lookup.classify('\n'), CharacterRole::LineFeed);
        assert_eq!(lookup.classify('a'), CharacterRole::Normal);
        assert_eq!(lookup.classify('#'), CharacterRole::Normal);
        assert_eq!(lookup.classify('\0'), CharacterRole::Normal);
        assert_eq!(lookup.classify('€'), CharacterRole::Normal);
    }

    #[test]
    fn inactive_terminators_are_other() {
        let lf = CharacterLookup::build(&ReaderOptions {
            row_ending: RowEnding::Lf,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lf.classify('\r'), CharacterRole::Other);
        assert_eq!(lf.classify('\n'), CharacterRole::LineFeed);

        let cr = CharacterLookup::build(&ReaderOptions {
            row_ending: RowEnding::Cr,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cr.classify('\n'), CharacterRole::Other);
    }

    #[test]
    fn non_ascii_specials() {
        let lookup = CharacterLookup::build(&ReaderOptions {
            value_separator: '§',
            comment: Some('¶'),
            escape: EscapeMode::Distinct('\\'),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(lookup.classify('§'), CharacterRole::ValueSeparator);
        assert_eq!(lookup.classify('¶'), CharacterRole::CommentStart);
        assert_eq!(lookup.classify('\\'), CharacterRole::Escape);
        assert_eq!(lookup.classify(','), CharacterRole::Normal);
    }

    #[rstest]
    #[case(ReaderOptions { value_separator: '"', ..Default::default() }, '"')]
    #[case(ReaderOptions { comment: Some(','), ..Default::default() }, ',')]
    #[case(ReaderOptions { escape: EscapeMode::Distinct('"'), ..Default::default() }, '"')]
    #[case(ReaderOptions { value_separator: '\n', ..Default::default() }, '\n')]
    #[case(ReaderOptions { quote: '\r', row_ending: RowEnding::Lf, ..Default::default() }, '\r')]
    fn duplicate_roles_are_rejected(#[case] options: ReaderOptions, #[case] expected: char) {
        match CharacterLookup::build(&options) {
            Err(ConfigError::DuplicateRole { ch, .. }) => assert_eq!(ch, expected),
            other => panic!("expected duplicate role error, got {other:?}"),
        }
    }
}
