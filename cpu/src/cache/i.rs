// SPDX-License-Identifier: MPL-2.0

//! The instruction cache.
//!
//! The I-cache is direct-mapped: 256 lines of four words each, with a valid bit for every word.
//! On a miss, the line is refilled from the missed word up to the end of the line; earlier words
//! keep whatever validity they had, provided the tag did not change.

mod entry;

use std::fmt;

use serde::{Deserialize, Serialize};

use entry::Entry;

/// The number of lines.
pub const LINE_COUNT: usize = 256;

/// The number of words per line.
pub const LINE_LEN: usize = 4;

/// A physical address decomposed for the instruction cache.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Address {
    tag: u32,
    line_idx: usize,
    word_idx: usize,
}

impl From<u32> for Address {
    fn from(mut addr: u32) -> Self {
        // Only words are addressed, so the byte index is dropped.
        addr >>= 2;

        let word_idx = (addr & 0b11) as usize;
        addr >>= 2;

        // 4096 bytes / 16 bytes per line = 256 lines.
        let line_idx = (addr & 0xff) as usize;
        addr >>= 8;

        Self { tag: addr, line_idx, word_idx }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}:{}", self.tag, self.line_idx, self.word_idx)
    }
}

/// The result of a cached instruction fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fetch {
    pub word: u32,
    /// The word was valid in the cache.
    pub hit: bool,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            entries: [Entry::default(); LINE_COUNT],
        }
    }
}

/// The instruction cache.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cache {
    #[serde(with = "serde_arrays")]
    entries: [Entry; LINE_COUNT],
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.entries.iter().filter(|it| it.is_any_valid()).count();
        write!(f, "Cache({} of {} lines valid)", valid, LINE_COUNT)
    }
}

impl Cache {
    /// Fetches the word at the given physical address.
    ///
    /// `fill` reads one word from memory. On a miss it is called for the missed word and each
    /// following word in the same line; if any call fails, the error is returned and the line
    /// is left invalid from the failing word onwards.
    pub fn fetch<E>(
        &mut self,
        addr: u32,
        mut fill: impl FnMut(u32) -> Result<u32, E>,
    ) -> Result<Fetch, E> {
        let addr = Address::from(addr);
        let entry = &mut self.entries[addr.line_idx];

        if let Some(word) = entry.lookup(addr) {
            tracing::trace!("I-cache hit (addr={:?})", addr);

            return Ok(Fetch { word, hit: true });
        }
        tracing::trace!("I-cache miss (addr={:?})", addr);

        let line_base = (addr.tag << 12) | ((addr.line_idx as u32) << 4);
        entry.retag(addr);
        for word_idx in addr.word_idx..LINE_LEN {
            let word = fill(line_base | ((word_idx as u32) << 2))?;
            entry.fill(word_idx, word);
        }

        Ok(Fetch { word: entry.word(addr.word_idx), hit: false })
    }

    /// Invalidates the line that the given address maps to, as an isolated store does in
    /// tag-test mode.
    pub fn invalidate_line(&mut self, addr: u32) {
        let addr = Address::from(addr);
        tracing::trace!("Invalidating I-cache line (addr={:?})", addr);
        self.entries[addr.line_idx].invalidate_as(addr);
    }

    /// Reads the data word the given address maps to, ignoring tags and validity.
    pub fn load_isolated(&self, addr: u32) -> u32 {
        let addr = Address::from(addr);

        self.entries[addr.line_idx].word(addr.word_idx)
    }

    /// Overwrites the data word the given address maps to, leaving tags and validity intact.
    pub fn store_isolated(&mut self, addr: u32, value: u32) {
        let addr = Address::from(addr);
        self.entries[addr.line_idx].set_word(addr.word_idx, value);
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.invalidate();
        }
    }
}
