// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use super::{Address, LINE_LEN};

/// One I-cache line.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Entry {
    tag: u32,
    /// Entries start out invalid; memory is not mirrored until a fetch misses.
    valid: [bool; LINE_LEN],
    words: [u32; LINE_LEN],
}

impl Entry {
    /// Returns the word at `addr` if this entry holds a valid copy of it.
    pub(super) fn lookup(&self, addr: Address) -> Option<u32> {
        (self.tag == addr.tag && self.valid[addr.word_idx]).then(|| self.words[addr.word_idx])
    }

    /// Prepares this entry to mirror the line containing `addr`.
    ///
    /// Validity is kept only if the entry already belonged to the same line.
    pub(super) fn retag(&mut self, addr: Address) {
        if self.tag != addr.tag {
            self.tag = addr.tag;
            self.valid = [false; LINE_LEN];
        }
    }

    pub(super) fn fill(&mut self, word_idx: usize, word: u32) {
        self.words[word_idx] = word;
        self.valid[word_idx] = true;
    }

    pub(super) fn word(&self, word_idx: usize) -> u32 {
        self.words[word_idx]
    }

    pub(super) fn set_word(&mut self, word_idx: usize, value: u32) {
        self.words[word_idx] = value;
    }

    /// Retags this entry to `addr` with every word invalid.
    pub(super) fn invalidate_as(&mut self, addr: Address) {
        self.tag = addr.tag;
        self.invalidate();
    }

    pub(super) fn invalidate(&mut self) {
        self.valid = [false; LINE_LEN];
    }

    pub(super) fn is_any_valid(&self) -> bool {
        self.valid.iter().any(|it| *it)
    }
}
