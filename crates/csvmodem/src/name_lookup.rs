//! Header name resolution.
//!
//! [`NameLookup`] is a prefix trie flattened into one `u32` array. Every level
//! of the trie is laid out as
//!
//! ```text
//! count, (len, ch_1 .. ch_len, payload) * count
//! ```
//!
//! A payload with [`TERMINAL`] set carries the value of a complete name;
//! otherwise it is the array offset of the nested level that continues the
//! prefix. Entries on one level start with distinct characters, except for a
//! zero-length entry that matches only when the input is exhausted. Lookup
//! never allocates and never follows a pointer.

use std::fmt;

/// Marks a payload as a value rather than a nested level offset.
const TERMINAL: u32 = 0x8000_0000;

/// Immutable map from names to their position in the list it was built from.
///
/// Built once per type; safe to share between readers.
#[derive(Clone, PartialEq, Eq)]
pub struct NameLookup {
    table: Box<[u32]>,
    len: usize,
}

impl NameLookup {
    /// Builds a lookup where each name maps to its position in `names`.
    ///
    /// Empty names never match and are skipped. If a name occurs more than
    /// once, its first position wins.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<(Vec<char>, usize)> = names
            .into_iter()
            .enumerate()
            .filter(|(_, name)| !name.as_ref().is_empty())
            .map(|(index, name)| (name.as_ref().chars().collect(), index))
            .collect();
        // Stable: equal names keep their original order for the dedup below.
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|later, earlier| later.0 == earlier.0);

        let names: Vec<&[char]> = entries.iter().map(|(name, _)| name.as_slice()).collect();
        let values: Vec<usize> = entries.iter().map(|&(_, value)| value).collect();
        let mut table = Vec::new();
        build_level(&names, &values, 0, names.len(), 0, &mut table);

        Self {
            table: table.into_boxed_slice(),
            len: names.len(),
        }
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value of `text` if it is exactly one of the names.
    #[must_use]
    pub fn try_lookup(&self, text: &str) -> Option<usize> {
        if text.is_empty() {
            return None;
        }
        let mut rest = text;
        let mut level = 0;
        'levels: loop {
            let count = *self.table.get(level)?;
            let mut pos = level + 1;
            for _ in 0..count {
                let len = self.table[pos] as usize;
                let prefix = &self.table[pos + 1..pos + 1 + len];
                let payload = self.table[pos + 1 + len];
                pos += len + 2;

                let Some(after) = strip_prefix(rest, prefix) else {
                    continue;
                };
                if len == 0 && !after.is_empty() {
                    continue;
                }
                if payload & TERMINAL != 0 {
                    return after
                        .is_empty()
                        .then_some((payload & !TERMINAL) as usize);
                }
                rest = after;
                level = payload as usize;
                continue 'levels;
            }
            return None;
        }
    }
}

impl fmt::Debug for NameLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameLookup")
            .field("names", &self.len)
            .field("table_len", &self.table.len())
            .finish()
    }
}

fn strip_prefix<'t>(text: &'t str, prefix: &[u32]) -> Option<&'t str> {
    let mut chars = text.char_indices();
    for &expected in prefix {
        let (_, ch) = chars.next()?;
        if ch as u32 != expected {
            return None;
        }
    }
    Some(chars.as_str())
}

/// Writes the level covering `names[start..end]`, whose first `skip`
/// characters are already matched.
fn build_level(
    names: &[&[char]],
    values: &[usize],
    start: usize,
    end: usize,
    skip: usize,
    table: &mut Vec<u32>,
) {
    let count_at = table.len();
    table.push(0);

    let mut nested = Vec::new();
    let mut i = start;
    while i < end {
        let (len, group_end) = common_prefix_length(names, i, end, skip);
        let prefix = &names[i][skip..skip + len];
        table.push(len as u32);
        table.extend(prefix.iter().map(|&ch| ch as u32));
        if group_end - i == 1 {
            table.push(TERMINAL | values[i] as u32);
        } else {
            nested.push((table.len(), i, group_end, skip + len));
            table.push(0);
        }
        table[count_at] += 1;
        i = group_end;
    }

    for (payload_at, start, end, skip) in nested {
        table[payload_at] = table.len() as u32;
        build_level(names, values, start, end, skip, table);
    }
}

/// Length of the prefix shared by the group of names starting at `start`,
/// and the end of that group, looking past the first `skip` characters.
///
/// `names[start..end]` must be sorted and duplicate-free. The group is the run
/// of names sharing the character at `skip` with `names[start]`. A group of
/// one has its whole remainder as prefix. A name with nothing past `skip` is
/// a group of one with an empty prefix. An empty range is an empty group:
/// the result is `(0, start)`.
pub fn common_prefix_length<N: AsRef<[char]>>(
    names: &[N],
    start: usize,
    end: usize,
    skip: usize,
) -> (usize, usize) {
    let end = end.min(names.len());
    let Some(first) = names.get(start).filter(|_| start < end) else {
        return (0, start);
    };
    let first = first.as_ref();
    let Some(&lead) = first.get(skip) else {
        return (0, start + 1);
    };
    let group_end = start
        + 1
        + names[start + 1..end]
            .iter()
            .take_while(|name| name.as_ref().get(skip) == Some(&lead))
            .count();
    if group_end - start == 1 {
        return (first.len() - skip, group_end);
    }
    // Sorted input: the first and last names bound the shared prefix.
    let last = names[group_end - 1].as_ref();
    let shared = first[skip..]
        .iter()
        .zip(&last[skip..])
        .take_while(|(a, b)| a == b)
        .count();
    (shared, group_end)
}
