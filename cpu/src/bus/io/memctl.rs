// SPDX-License-Identifier: MPL-2.0

//! Memory control.
//!
//! These registers configure the base addresses, sizes and access timings of the banks on the
//! external bus, plus the main RAM size. The emulator keeps them only so that software reads back
//! what it wrote; none of them change how the [bus](crate::bus) decodes addresses.

use serde::{Deserialize, Serialize};

/// The offset of `RAM_SIZE` into the I/O window.
pub const RAM_SIZE_ADDR: u32 = 0x0060;

/// One past the last offset of the bank configuration registers.
pub const END_ADDR: u32 = 0x0024;

/// Register indices of the bank configuration block.
pub mod reg {
    pub const EXP_1_BASE: usize = 0;
    pub const EXP_2_BASE: usize = 1;
    pub const EXP_1_CFG: usize = 2;
    pub const EXP_3_CFG: usize = 3;
    pub const BIOS_CFG: usize = 4;
    pub const SPU_CFG: usize = 5;
    pub const CDROM_CFG: usize = 6;
    pub const EXP_2_CFG: usize = 7;
    pub const COMMON_CFG: usize = 8;

    pub const NAMES: [&str; 9] = [
        "EXP_1_BASE",
        "EXP_2_BASE",
        "EXP_1_CFG",
        "EXP_3_CFG",
        "BIOS_CFG",
        "SPU_CFG",
        "CDROM_CFG",
        "EXP_2_CFG",
        "COMMON_CFG",
    ];
}

impl Default for Config {
    fn default() -> Self {
        Self::new(0x0000_0b88)
    }
}

/// The memory control registers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    banks: [u32; 9],
    /// `RAM_SIZE`.
    pub ram_size: u32,
}

impl Config {
    /// Creates a new `Config` holding the values the BIOS programs at boot, with the given
    /// `RAM_SIZE`.
    pub fn new(ram_size: u32) -> Self {
        Self {
            banks: [
                0x1f00_0000,
                0x1f80_2000,
                0x0013_243f,
                0x0000_3022,
                0x0013_243f,
                0x2009_31e1,
                0x0002_0843,
                0x0007_0777,
                0x0003_1125,
            ],
            ram_size,
        }
    }

    /// Reads the bank configuration register with the given index. Out-of-range indices read as
    /// zero.
    pub fn read(&self, index: usize) -> u32 {
        self.banks.get(index).copied().unwrap_or(0)
    }

    pub fn write(&mut self, index: usize, value: u32) {
        let Some(slot) = self.banks.get_mut(index) else {
            tracing::warn!("Ignoring write to memory control register #{}", index);
            return;
        };

        *slot = match index {
            // The top byte of each expansion base is hardwired.
            reg::EXP_1_BASE | reg::EXP_2_BASE => (value & 0x00ff_ffff) | 0x1f00_0000,
            _ => value,
        };
        tracing::debug!("memctl.{} = {:#010x}", reg::NAMES[index], *slot);
    }
}
