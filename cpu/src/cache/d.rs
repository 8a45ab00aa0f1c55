// SPDX-License-Identifier: MPL-2.0

//! The data array.
//!
//! 1 KiB of fast memory next to the core. As scratchpad RAM it is addressed directly at
//! [`SCRATCHPAD_ADDR`]; as a data cache it mirrors main RAM one word per line, tagged by the
//! physical address bits above the array index.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::Width;

/// The physical base address of the scratchpad.
pub const SCRATCHPAD_ADDR: u32 = 0x1f80_0000;

/// The size, in bytes, of the data array.
pub const SIZE: u32 = 0x400;

const WORD_COUNT: usize = (SIZE / 4) as usize;

/// The data array.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cache {
    #[serde(with = "serde_arrays")]
    words: [u32; WORD_COUNT],
    /// The cached line tag of each word; `None` where the word is invalid.
    #[serde(with = "serde_arrays")]
    tags: [Option<u32>; WORD_COUNT],
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            words: [0; WORD_COUNT],
            tags: [None; WORD_COUNT],
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.tags.iter().filter(|it| it.is_some()).count();
        write!(f, "Cache({} of {} words tagged)", valid, WORD_COUNT)
    }
}

/// Determines if `addr` lies within the scratchpad window.
pub fn is_scratchpad(addr: u32) -> bool {
    (SCRATCHPAD_ADDR..SCRATCHPAD_ADDR + SIZE).contains(&addr)
}

fn index(addr: u32) -> usize {
    ((addr & (SIZE - 1)) >> 2) as usize
}

fn tag(addr: u32) -> u32 {
    addr >> 10
}

impl Cache {
    /// Reads scratchpad RAM.
    pub fn read(&self, addr: u32, width: Width) -> u32 {
        r3k_util::lane::extract(self.words[index(addr)], addr, width.len())
    }

    /// Writes scratchpad RAM.
    pub fn write(&mut self, addr: u32, value: u32, width: Width) {
        let slot = &mut self.words[index(addr)];
        *slot = r3k_util::lane::insert(*slot, value, addr, width.len());
    }

    /// Returns the cached copy of the word containing `addr`, if there is one.
    pub fn lookup(&self, addr: u32) -> Option<u32> {
        let idx = index(addr);

        (self.tags[idx] == Some(tag(addr))).then(|| self.words[idx])
    }

    /// Caches the word containing `addr`.
    pub fn fill(&mut self, addr: u32, word: u32) {
        let idx = index(addr);
        self.words[idx] = word;
        self.tags[idx] = Some(tag(addr));
    }

    /// Updates the cached copy of a store, if the word is cached.
    pub fn write_through(&mut self, addr: u32, value: u32, width: Width) {
        if self.lookup(addr).is_some() {
            self.write(addr, value, width);
        }
    }

    /// Reads the raw array word `addr` maps to.
    pub fn load_isolated(&self, addr: u32) -> u32 {
        self.words[index(addr)]
    }

    /// Writes the raw array, marking the word invalid.
    pub fn store_isolated(&mut self, addr: u32, value: u32, width: Width) {
        self.write(addr, value, width);
        self.tags[index(addr)] = None;
    }

    pub fn invalidate_all(&mut self) {
        self.tags = [None; WORD_COUNT];
    }
}
