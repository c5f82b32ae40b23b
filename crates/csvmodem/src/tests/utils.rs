use quickcheck::{Arbitrary, Gen};

use crate::{CharSource, Result, RowEnding};

/// Number of quickcheck cases, scaled up on CI.
pub(crate) fn test_count() -> u64 {
    #[cfg(not(miri))]
    let tests = if is_ci::cached() { 10_000 } else { 1_000 };
    #[cfg(miri)]
    let tests = 10;
    tests
}

/// Hands out its text in pieces whose sizes are derived from `splits`.
#[derive(Debug, Clone)]
pub(crate) struct ChunkedSource {
    chars: Vec<char>,
    splits: Vec<usize>,
    at: usize,
    next: usize,
}

impl ChunkedSource {
    pub(crate) fn new(text: &str, splits: Vec<usize>) -> Self {
        Self {
            chars: text.chars().collect(),
            splits,
            at: 0,
            next: 0,
        }
    }
}

impl CharSource for ChunkedSource {
    fn read_chars(&mut self, dst: &mut [char]) -> Result<usize> {
        let remaining = self.chars.len() - self.at;
        if remaining == 0 || dst.is_empty() {
            return Ok(0);
        }
        let want = self.splits.get(self.next).map_or(remaining, |s| 1 + s % remaining);
        self.next += 1;
        let n = want.min(dst.len());
        dst[..n].copy_from_slice(&self.chars[self.at..self.at + n]);
        self.at += n;
        Ok(n)
    }
}

/// A concrete row ending together with the terminator text it expects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ending(pub(crate) RowEnding);

impl Ending {
    pub(crate) fn terminator(self) -> &'static str {
        match self.0 {
            RowEnding::Cr => "\r",
            RowEnding::Lf => "\n",
            RowEnding::CrLf | RowEnding::Detect => "\r\n",
        }
    }
}

impl Arbitrary for Ending {
    fn arbitrary(g: &mut Gen) -> Self {
        let endings = [RowEnding::Cr, RowEnding::Lf, RowEnding::CrLf, RowEnding::Detect];
        Self(*g.choose(&endings).unwrap())
    }
}

/// Writes `records` with every field quoted.
pub(crate) fn render(records: &[Vec<String>], terminator: &str) -> String {
    let mut out = String::new();
    for record in records {
        let fields: Vec<String> = record
            .iter()
            .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
            .collect();
        out.push_str(&fields.join(","));
        out.push_str(terminator);
    }
    out
}
