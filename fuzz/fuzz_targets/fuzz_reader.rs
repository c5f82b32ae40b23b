#![no_main]
use std::{cell::RefCell, io};

use arbitrary::Arbitrary;
use csvmodem::{
    EscapeMode, ExtraColumns, ReadHeader, Reader, ReaderOptions, Record, RowEnding, StrSource, Utf8Source,
};
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

thread_local! {
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

/// Byte sequences that mean something to the tokenizer under some grammar.
static SPECIAL: &[&[u8]] = &[
    b",",
    b";",
    b"\t",
    b"\"",
    b"\"\"",
    b"\\",
    b"#",
    b"\r",
    b"\n",
    b"\r\n",
    "é".as_bytes(),
    "\u{2028}".as_bytes(),
];

fn with_rng<F, R>(f: F) -> R
where
    F: FnOnce(&mut SmallRng) -> R,
{
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

/// Lets libFuzzer mutate, then now and again splices in a grammar token.
fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    let size = fuzzer_mutate(data, size, max_size);
    if seed % 3 != 0 {
        return size;
    }
    with_rng(|rng| {
        let token = SPECIAL[rng.random_range(0..SPECIAL.len())];
        if size + token.len() > max_size {
            return size;
        }
        let at = rng.random_range(0..=size);
        data.copy_within(at..size, at + token.len());
        data[at..at + token.len()].copy_from_slice(token);
        size + token.len()
    })
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

#[derive(Arbitrary, Debug)]
struct Dialect {
    separator: u8,
    distinct_escape: bool,
    comments: bool,
    ending: u8,
    header: u8,
    reject_extra: bool,
    buffer: u8,
}

impl Dialect {
    fn options(&self) -> ReaderOptions {
        ReaderOptions {
            value_separator: [',', ';', '\t', '|'][usize::from(self.separator % 4)],
            escape: if self.distinct_escape {
                EscapeMode::Distinct('\\')
            } else {
                EscapeMode::Doubled
            },
            comment: self.comments.then_some('#'),
            row_ending: [RowEnding::Cr, RowEnding::Lf, RowEnding::CrLf, RowEnding::Detect]
                [usize::from(self.ending % 4)],
            read_header: [ReadHeader::Always, ReadHeader::Never, ReadHeader::Detect][usize::from(self.header % 3)],
            extra_columns: if self.reject_extra {
                ExtraColumns::Reject
            } else {
                ExtraColumns::Ignore
            },
            buffer_size: 1 + usize::from(self.buffer % 64),
            max_buffer_size: 1 << 16,
            ..Default::default()
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Input {
    dialect: Dialect,
    splits: Vec<u8>,
    bytes: Vec<u8>,
}

/// Hands out bytes in pieces sized by `splits`, cutting through code points.
struct Pieces<'a> {
    bytes: &'a [u8],
    splits: &'a [u8],
    next: usize,
}

impl io::Read for Pieces<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = self
            .splits
            .get(self.next)
            .map_or(self.bytes.len(), |&s| 1 + usize::from(s));
        self.next += 1;
        let n = want.min(buf.len()).min(self.bytes.len());
        buf[..n].copy_from_slice(&self.bytes[..n]);
        self.bytes = &self.bytes[n..];
        Ok(n)
    }
}

/// Renders every record and error until the stream ends.
fn drain<S: csvmodem::CharSource>(source: S, options: &ReaderOptions) -> Vec<String> {
    let mut reader = Reader::dynamic(source, options).expect("fuzz grammars are valid");
    let mut out = Vec::new();
    loop {
        match reader.next_record() {
            Ok(Some(Record::Row(row))) => out.push(format!("{}: {row:?}", row.row())),
            Ok(Some(Record::Comment(text))) => out.push(format!("# {text}")),
            Ok(None) => return out,
            Err(err) => {
                out.push(err.to_string());
                if reader.is_finished() {
                    return out;
                }
            }
        }
    }
}

fn reader(input: &Input) {
    let options = input.dialect.options();
    let chunked = drain(
        Utf8Source::new(Pieces {
            bytes: &input.bytes,
            splits: &input.splits,
            next: 0,
        }),
        &options,
    );

    // Splitting must never change what is read.
    if let Ok(text) = std::str::from_utf8(&input.bytes) {
        let whole = drain(StrSource::new(text), &options);
        assert_eq!(chunked, whole, "options: {options:?}");
    }
}

fuzz_target!(|input: Input| reader(&input));
