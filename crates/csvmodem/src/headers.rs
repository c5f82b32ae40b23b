//! First-row classification.
//!
//! The first record (after any leading comment lines) is tokenized under a
//! buffer checkpoint. If it names at least one known member it is a header.
//! Otherwise the buffer is rewound and the tokenizer restored, so the same
//! characters are read again as the first data row.

use std::{ops::Range, sync::Arc};

use tracing::debug;

use crate::{
    buffer::PushbackBuffer,
    error::Result,
    name_lookup::NameLookup,
    options::ReadHeader,
    tokenizer::{RowTokenizer, Snapshot, TokenEvent},
};

/// Header names of a stream, stored in one string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    text: String,
    spans: Vec<Range<usize>>,
}

impl Headers {
    pub(crate) fn from_tokenizer(tokenizer: &RowTokenizer) -> Self {
        tokenizer.fields().map(|field| field.text).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn get(&self, column: usize) -> Option<&str> {
        self.spans.get(column).map(|span| &self.text[span.clone()])
    }

    /// A pass over the names, in column order. The enumerator can be
    /// [`reset`](HeaderEnumerator::reset) for another pass.
    #[must_use]
    pub fn iter(&self) -> HeaderEnumerator<'_> {
        HeaderEnumerator {
            headers: self,
            next: 0,
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for Headers {
    fn from_iter<I: IntoIterator<Item = S>>(names: I) -> Self {
        let mut headers = Self::default();
        for name in names {
            let start = headers.text.len();
            headers.text.push_str(name.as_ref());
            headers.spans.push(start..headers.text.len());
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a str;
    type IntoIter = HeaderEnumerator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Restartable iterator over header names.
#[derive(Debug, Clone)]
pub struct HeaderEnumerator<'a> {
    headers: &'a Headers,
    next: usize,
}

impl HeaderEnumerator<'_> {
    /// Starts over from the first column.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl<'a> Iterator for HeaderEnumerator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let name = self.headers.get(self.next)?;
        self.next += 1;
        Some(name)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.headers.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for HeaderEnumerator<'_> {}

/// Result of classifying the first row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOutcome {
    pub is_header: bool,
    /// Empty unless `is_header`.
    pub headers: Headers,
    /// How many header names matched a known member.
    pub matched: usize,
    /// Comment lines read before an accepted header.
    pub comments: Vec<String>,
}

#[derive(Debug)]
pub(crate) enum HeaderStep {
    /// The buffer's window is exhausted; fill it and call again.
    NeedInput,
    Done(HeaderOutcome),
}

#[derive(Debug)]
pub(crate) struct HeadersReader {
    names: Option<Arc<NameLookup>>,
    mode: ReadHeader,
    start: Option<Snapshot>,
    comments: Vec<String>,
}

impl HeadersReader {
    /// Without known names there is nothing to detect against, so
    /// [`ReadHeader::Detect`] reads the first row as a header.
    pub(crate) fn new(names: Option<Arc<NameLookup>>, mode: ReadHeader) -> Self {
        let mode = match (mode, &names) {
            (ReadHeader::Detect, None) => ReadHeader::Always,
            (mode, _) => mode,
        };
        Self {
            names,
            mode,
            start: None,
            comments: Vec::new(),
        }
    }

    /// Advances classification with what the buffer holds. `eof` tells that
    /// the source is exhausted.
    pub(crate) fn step(
        &mut self,
        tokenizer: &mut RowTokenizer,
        buffer: &mut PushbackBuffer,
        eof: bool,
    ) -> Result<HeaderStep> {
        if self.mode == ReadHeader::Never {
            return Ok(HeaderStep::Done(HeaderOutcome::default()));
        }
        let start = *self.start.get_or_insert_with(|| {
            buffer.checkpoint();
            tokenizer.snapshot()
        });

        loop {
            let event = if eof {
                match tokenizer.finish()? {
                    Some(event) => event,
                    None => {
                        buffer.commit();
                        return Ok(HeaderStep::Done(HeaderOutcome {
                            comments: std::mem::take(&mut self.comments),
                            ..HeaderOutcome::default()
                        }));
                    }
                }
            } else {
                let window = buffer.window();
                if window.is_empty() {
                    return Ok(HeaderStep::NeedInput);
                }
                let (consumed, event) = tokenizer.feed(window)?;
                buffer.consume(consumed)?;
                match event {
                    Some(event) => event,
                    None => continue,
                }
            };

            match event {
                TokenEvent::Comment => self.comments.push(tokenizer.comment().to_owned()),
                TokenEvent::Record => return self.classify(tokenizer, buffer, start).map(HeaderStep::Done),
            }
        }
    }

    fn classify(
        &mut self,
        tokenizer: &mut RowTokenizer,
        buffer: &mut PushbackBuffer,
        start: Snapshot,
    ) -> Result<HeaderOutcome> {
        let matched = self.names.as_deref().map_or(0, |names| {
            tokenizer
                .fields()
                .filter(|field| names.try_lookup(field.text).is_some())
                .count()
        });
        let columns = tokenizer.field_count();

        if self.mode == ReadHeader::Always || matched > 0 {
            debug!(columns, matched, "header row accepted");
            buffer.commit();
            return Ok(HeaderOutcome {
                is_header: true,
                headers: Headers::from_tokenizer(tokenizer),
                matched,
                comments: std::mem::take(&mut self.comments),
            });
        }

        debug!(columns, "first row is data, replaying it");
        buffer.reset()?;
        buffer.commit();
        tokenizer.restore(start);
        self.comments.clear();
        Ok(HeaderOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        grammar::Grammar,
        options::ReaderOptions,
        pool::SharedPool,
        source::StrSource,
    };

    struct Fixture {
        tokenizer: RowTokenizer,
        buffer: PushbackBuffer,
    }

    fn fixture(options: &ReaderOptions) -> Fixture {
        let grammar = Grammar::compile(options).unwrap();
        Fixture {
            tokenizer: RowTokenizer::new(grammar),
            buffer: PushbackBuffer::new(Arc::new(SharedPool::new()), options.buffer_size, options.max_buffer_size),
        }
    }

    fn names() -> Option<Arc<NameLookup>> {
        Some(Arc::new(NameLookup::new(["id", "name", "age"])))
    }

    /// Drives classification to completion, reading `source` as needed.
    fn classify(reader: &mut HeadersReader, fixture: &mut Fixture, source: &mut StrSource<'_>) -> HeaderOutcome {
        let mut eof = false;
        loop {
            match reader.step(&mut fixture.tokenizer, &mut fixture.buffer, eof).unwrap() {
                HeaderStep::Done(outcome) => return outcome,
                HeaderStep::NeedInput => eof = fixture.buffer.fill(source).unwrap() == 0,
            }
        }
    }

    /// Reads the records remaining after classification.
    fn rest(fixture: &mut Fixture, source: &mut StrSource<'_>) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        loop {
            let window = fixture.buffer.window();
            let (consumed, event) = if window.is_empty() {
                if fixture.buffer.fill(source).unwrap() > 0 {
                    continue;
                }
                match fixture.tokenizer.finish().unwrap() {
                    Some(event) => (0, Some(event)),
                    None => return rows,
                }
            } else {
                fixture.tokenizer.feed(window).unwrap()
            };
            fixture.buffer.consume(consumed).unwrap();
            if event == Some(TokenEvent::Record) {
                rows.push(fixture.tokenizer.fields().map(|f| f.text.to_string()).collect());
            }
        }
    }

    #[rstest]
    #[case(4)]
    #[case(64)]
    fn known_name_makes_a_header(#[case] buffer_size: usize) {
        let options = ReaderOptions {
            buffer_size,
            comment: Some('#'),
            ..Default::default()
        };
        let mut fixture = fixture(&options);
        let mut source = StrSource::new("# people\nname,unknown\nAda,x\n");
        let mut reader = HeadersReader::new(names(), ReadHeader::Detect);
        let outcome = classify(&mut reader, &mut fixture, &mut source);

        assert!(outcome.is_header);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.comments, vec![" people".to_string()]);
        assert_eq!(outcome.headers.iter().collect::<Vec<_>>(), ["name", "unknown"]);
        assert_eq!(rest(&mut fixture, &mut source), vec![vec!["Ada", "x"]]);
    }

    #[rstest]
    #[case(4)]
    #[case(64)]
    fn data_row_is_replayed(#[case] buffer_size: usize) {
        let options = ReaderOptions {
            buffer_size,
            ..Default::default()
        };
        let mut fixture = fixture(&options);
        let mut source = StrSource::new("1,\"Ada, \"\"the\"\" first\",36\r\n2,Grace,45\r\n");
        let mut reader = HeadersReader::new(names(), ReadHeader::Detect);
        let outcome = classify(&mut reader, &mut fixture, &mut source);

        assert!(!outcome.is_header);
        assert!(outcome.headers.is_empty());
        assert_eq!(fixture.tokenizer.row(), 0);
        assert_eq!(
            rest(&mut fixture, &mut source),
            vec![
                vec!["1", "Ada, \"the\" first", "36"],
                vec!["2", "Grace", "45"]
            ]
        );
    }

    #[test]
    fn unterminated_single_row_is_replayed() {
        let options = ReaderOptions::default();
        let mut fixture = fixture(&options);
        let mut source = StrSource::new("x,y");
        let mut reader = HeadersReader::new(names(), ReadHeader::Detect);
        let outcome = classify(&mut reader, &mut fixture, &mut source);
        assert!(!outcome.is_header);
        assert_eq!(rest(&mut fixture, &mut source), vec![vec!["x", "y"]]);
    }

    #[test]
    fn never_reads_nothing() {
        let mut fixture = fixture(&ReaderOptions::default());
        let mut source = StrSource::new("id\n");
        let mut reader = HeadersReader::new(names(), ReadHeader::Never);
        let outcome = classify(&mut reader, &mut fixture, &mut source);
        assert_eq!(outcome, HeaderOutcome::default());
        assert_eq!(rest(&mut fixture, &mut source), vec![vec!["id"]]);
    }

    #[test]
    fn detect_without_names_always_reads_a_header() {
        let mut fixture = fixture(&ReaderOptions::default());
        let mut source = StrSource::new("a,b\n1,2\n");
        let mut reader = HeadersReader::new(None, ReadHeader::Detect);
        let outcome = classify(&mut reader, &mut fixture, &mut source);
        assert!(outcome.is_header);
        assert_eq!(outcome.matched, 0);
    }

    #[test]
    fn enumerator_restarts() {
        let headers = Headers {
            text: "abc".into(),
            spans: vec![0..1, 1..3],
        };
        let mut names = headers.iter();
        assert_eq!(names.len(), 2);
        assert_eq!(names.by_ref().collect::<Vec<_>>(), ["a", "bc"]);
        names.reset();
        assert_eq!(names.next(), Some("a"));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn cancelled_fill_leaves_classification_pending() {
        use tokio_util::sync::CancellationToken;

        let mut fixture = fixture(&ReaderOptions::default());
        let mut source = StrSource::new("id\n");
        let mut reader = HeadersReader::new(names(), ReadHeader::Detect);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let step = reader
            .step(&mut fixture.tokenizer, &mut fixture.buffer, false)
            .unwrap();
        assert!(matches!(step, HeaderStep::NeedInput));
        let err = fixture
            .buffer
            .fill_async(&mut source, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Cancelled));
        assert_eq!(fixture.tokenizer.row(), 0);
    }
}
