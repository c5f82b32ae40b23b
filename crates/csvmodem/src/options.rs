/// How a literal quote is written inside a quoted field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EscapeMode {
    /// Two consecutive quote characters stand for one literal quote.
    #[default]
    Doubled,
    /// The given character makes the next character inside a quoted field
    /// literal, whatever it is.
    Distinct(char),
}

/// Which character sequence terminates a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowEnding {
    /// `\r`
    Cr,
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// Whichever of the above appears first. The choice is then frozen for the
    /// rest of the stream.
    #[default]
    Detect,
}

impl RowEnding {
    pub(crate) const COUNT: usize = 4;

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Whether the first row names the columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadHeader {
    /// The first row is always a header.
    Always,
    /// There is no header; columns bind in declaration order.
    Never,
    /// The first row is a header if any of its values names a known member.
    /// Otherwise it is replayed as the first data row.
    #[default]
    Detect,
}

/// What to do with columns beyond those the header (or the schema) describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtraColumns {
    /// Drop them silently.
    #[default]
    Ignore,
    /// Reject the row with [`Error::UnexpectedColumn`](crate::Error::UnexpectedColumn).
    Reject,
}

/// Grammar and limits for a reader.
///
/// Options are validated once by [`Grammar::compile`](crate::Grammar::compile);
/// the compiled grammar is immutable and can be shared between readers.
///
/// # Examples
///
/// ```rust
/// use csvmodem::{EscapeMode, ReaderOptions, RowEnding};
///
/// let options = ReaderOptions {
///     value_separator: ';',
///     escape: EscapeMode::Distinct('\\'),
///     comment: Some('#'),
///     row_ending: RowEnding::CrLf,
///     ..Default::default()
/// };
/// assert!(csvmodem::Grammar::compile(&options).is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderOptions {
    /// Separates values within a row.
    ///
    /// # Default
    ///
    /// `,`
    pub value_separator: char,

    /// Opens and closes a quoted field.
    ///
    /// # Default
    ///
    /// `"`
    pub quote: char,

    /// Escape convention inside quoted fields.
    ///
    /// # Default
    ///
    /// [`EscapeMode::Doubled`]
    pub escape: EscapeMode,

    /// Marks a comment line when it is the first character of a row.
    ///
    /// # Default
    ///
    /// `None`
    pub comment: Option<char>,

    /// Row terminator.
    ///
    /// # Default
    ///
    /// [`RowEnding::Detect`]
    pub row_ending: RowEnding,

    /// Header handling for the first row.
    ///
    /// # Default
    ///
    /// [`ReadHeader::Detect`]
    pub read_header: ReadHeader,

    /// Handling of columns past the known ones.
    ///
    /// # Default
    ///
    /// [`ExtraColumns::Ignore`]
    pub extra_columns: ExtraColumns,

    /// Size, in characters, of the window the reader pulls from its source.
    ///
    /// # Default
    ///
    /// `4096`
    pub buffer_size: usize,

    /// Hard limit, in characters, on any single buffered region: the current
    /// row's text, the pushback queue, or the replay log of a header
    /// candidate. Exceeding it fails the stream with
    /// [`Error::BufferOverflow`](crate::Error::BufferOverflow).
    ///
    /// # Default
    ///
    /// `1_048_576`
    pub max_buffer_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            value_separator: ',',
            quote: '"',
            escape: EscapeMode::Doubled,
            comment: None,
            row_ending: RowEnding::Detect,
            read_header: ReadHeader::Detect,
            extra_columns: ExtraColumns::Ignore,
            buffer_size: 4096,
            max_buffer_size: 1 << 20,
        }
    }
}
