// SPDX-License-Identifier: MPL-2.0

//! CPU caches.
//!
//! The R3000 has a 4 KiB instruction cache and a 1 KiB data array. The data array can act either
//! as a write-through data cache for main RAM or as directly-addressed scratchpad RAM. Which mode
//! is active, and whether each cache is enabled at all, is chosen by the bus interface unit (BIU)
//! control word at physical address [`BIU_ADDR`].

pub mod d;
pub mod i;

use bitfield::bitfield;
use serde::{Deserialize, Serialize};

/// The physical (kseg2) address of the BIU control word.
pub const BIU_ADDR: u32 = 0xfffe_0130;

bitfield! {
    /// The BIU control word.
    #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
    pub struct Biu(u32);
    impl Debug;
    pub lock, set_lock: 0;
    pub inv, set_inv: 1;
    /// Isolated stores operate on I-cache tags rather than data.
    pub tag, set_tag: 2;
    /// The data array is scratchpad RAM rather than a cache.
    pub ram, set_ram: 3;
    /// The data array is enabled.
    pub ds, set_ds: 7;
    /// The instruction cache is enabled.
    pub is1, set_is1: 11;
}

impl Biu {
    /// The bits that select cache modes. Changing any of them invalidates both caches.
    const MODE_MASK: u32 = (1 << 3) | (1 << 7) | (1 << 11);

    /// Determines if the data array is mapped as scratchpad RAM.
    pub fn is_scratchpad(&self) -> bool {
        self.ds() && self.ram()
    }

    /// Determines if the data array caches main RAM.
    pub fn is_data_cache(&self) -> bool {
        self.ds() && !self.ram()
    }
}

/// The instruction cache, the data array, and the BIU control word that configures them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cache {
    pub i: i::Cache,
    pub d: d::Cache,
    biu: Biu,
}

impl Cache {
    pub fn biu(&self) -> Biu {
        self.biu
    }

    /// Writes the BIU control word.
    pub fn set_biu(&mut self, value: u32) {
        let old = self.biu;
        self.biu = Biu(value);

        if (old.0 ^ value) & Biu::MODE_MASK != 0 {
            tracing::debug!("Cache mode changed ({:#x} -> {:#x}); invalidating", old.0, value);
            self.invalidate_all();
        }
    }

    pub fn invalidate_all(&mut self) {
        self.i.invalidate_all();
        self.d.invalidate_all();
    }

    /// Returns to the power-on state, with both caches disabled and invalid.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
