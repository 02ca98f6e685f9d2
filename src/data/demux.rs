//! Sample stream demultiplexer
//!
//! The voltmeter returns its reading memory as one block of ASCII readings
//! separated by commas. [`SampleDemux`] walks such a block lazily and yields
//! indexed samples:
//!
//! - indices start at 0 and are contiguous
//! - scanning stops after `limit` samples or at the end of the block,
//!   whichever comes first; a short block simply yields fewer samples
//! - a NUL byte terminates the block (stale bytes past it are ignored)
//! - an empty field between two commas is still a sample (with no value)
//! - a trailing delimiter or line terminator does not produce an extra sample
//!
//! The scan is single-pass: a new block needs a new `SampleDemux`.

use std::borrow::Cow;

const DELIMITER: u8 = b',';
const TERMINATOR: u8 = 0;

/// One reading from a curve block.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    /// Position in the block, from 0
    pub index: usize,
    /// Reading text as received, whitespace trimmed
    pub raw: Cow<'a, str>,
}

impl Sample<'_> {
    /// Decoded reading, `None` when the text is not a number.
    pub fn value(&self) -> Option<f64> {
        self.raw.parse().ok()
    }
}

/// Lazy scanner over one response block.
#[derive(Debug)]
pub struct SampleDemux<'a> {
    block: &'a [u8],
    pos: usize,
    index: usize,
    limit: usize,
    finished: bool,
}

impl<'a> SampleDemux<'a> {
    /// Scan `block`, yielding at most `limit` samples.
    pub fn new(block: &'a [u8], limit: usize) -> Self {
        Self {
            block,
            pos: 0,
            index: 0,
            limit,
            finished: false,
        }
    }

    fn field_text(field: &'a [u8]) -> Cow<'a, str> {
        match String::from_utf8_lossy(field) {
            Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
            Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
        }
    }
}

impl<'a> Iterator for SampleDemux<'a> {
    type Item = Sample<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.index >= self.limit || self.pos >= self.block.len() {
            return None;
        }

        let rest = &self.block[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == DELIMITER || b == TERMINATOR)
            .unwrap_or(rest.len());
        let raw = Self::field_text(&rest[..end]);

        if rest.get(end) == Some(&DELIMITER) {
            self.pos += end + 1;
        } else {
            // NUL or end of block: the last field only counts if it has content.
            self.finished = true;
            if raw.is_empty() {
                return None;
            }
        }

        let sample = Sample {
            index: self.index,
            raw,
        };
        self.index += 1;
        Some(sample)
    }
}
