// SPDX-License-Identifier: MPL-2.0

//! The interrupt controller.
//!
//! Peripherals raise interrupt sources with [`Controller::set`]; the CPU acknowledges them through
//! the `I_STAT` register and selects which ones may reach it through `I_MASK`. The controller
//! drives a single line into the CPU, which is asserted whenever a pending source is also enabled.

use serde::{Deserialize, Serialize};

/// The offset of `I_STAT` into the I/O window.
pub const BASE_ADDR: u32 = 0x0070;

/// Register index of `I_STAT`.
pub const STAT: usize = 0;
/// Register index of `I_MASK`.
pub const MASK: usize = 1;

pub mod source {
    //! Interrupt source bits.

    pub const VBLANK: u32 = 1 << 0;
    pub const GPU: u32 = 1 << 1;
    pub const CDROM: u32 = 1 << 2;
    pub const DMA: u32 = 1 << 3;
    pub const TIMER0: u32 = 1 << 4;
    pub const TIMER1: u32 = 1 << 5;
    pub const TIMER2: u32 = 1 << 6;
    /// Serial port 0, which hosts the controller and memory card ports.
    pub const SIO0: u32 = 1 << 7;
    pub const SIO1: u32 = 1 << 8;
    pub const SPU: u32 = 1 << 9;
    /// The lightpen and expansion-port interrupt.
    pub const EXT: u32 = 1 << 10;

    /// Every documented source.
    pub const ALL: u32 = (1 << 11) - 1;
}

/// The interrupt controller.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    /// Sources which are requesting an interrupt (`I_STAT`).
    pending: u32,
    /// Sources which may interrupt the CPU (`I_MASK`).
    enabled: u32,
    /// The level of the CPU interrupt input.
    line: bool,
}

impl Controller {
    /// Raises the given sources.
    pub fn set(&mut self, sources: u32) {
        tracing::trace!("Raising interrupt sources {:#05x}", sources);
        self.pending |= sources;
        self.refresh();
    }

    /// Reads `I_STAT` or `I_MASK`. Any other register index reads as zero.
    pub fn read(&self, index: usize) -> u32 {
        match index {
            STAT => self.pending,
            MASK => self.enabled,
            _ => 0,
        }
    }

    /// Writes the bits of `value` selected by `access` into `I_STAT` or `I_MASK`.
    ///
    /// Writing `I_STAT` acknowledges sources: a pending source is cleared only if it is enabled
    /// and the corresponding bit of `value` is zero. Bits of `I_STAT` outside of `access` are left
    /// untouched.
    pub fn write(&mut self, index: usize, value: u32, access: u32) {
        match index {
            STAT => {
                let kept = self.pending & access & (value | !self.enabled);
                self.pending = (self.pending & !access) | kept;
            }
            MASK => {
                let enabled = (self.enabled & !access) | (value & access);
                if enabled & !source::ALL != 0 {
                    tracing::warn!(
                        "Enabling undocumented interrupt sources (mask={:#010x})",
                        enabled,
                    );
                }
                self.enabled = enabled;
            }
            _ => {
                tracing::warn!("Ignoring write to interrupt register #{}", index);
            }
        }
        self.refresh();
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn enabled(&self) -> u32 {
        self.enabled
    }

    /// The level of the CPU interrupt input.
    pub fn line(&self) -> bool {
        self.line
    }

    /// Returns to the power-on state, with nothing pending or enabled.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn refresh(&mut self) {
        let line = self.pending & self.enabled != 0;
        if line != self.line {
            tracing::trace!("Interrupt line {}", if line { "asserted" } else { "released" });
        }
        self.line = line;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_line_is_low() {
        let int = Controller::default();

        assert_eq!(int.read(STAT), 0);
        assert_eq!(int.read(MASK), 0);
        assert!(!int.line());
    }

    #[test]
    fn masked_source_asserts_once_enabled() {
        let mut int = Controller::default();
        int.set(source::EXT);
        assert!(!int.line());

        int.write(MASK, source::EXT, !0);
        assert!(int.line());
    }

    #[test]
    fn acknowledge_requires_enable() {
        let mut int = Controller::default();
        int.set(source::VBLANK);

        // Disabled: the write cannot clear the bit.
        int.write(STAT, !source::VBLANK, !0);
        assert_eq!(int.read(STAT), source::VBLANK);

        int.write(MASK, source::VBLANK, !0);
        int.write(STAT, !source::VBLANK, !0);
        assert_eq!(int.read(STAT), 0);
        assert!(!int.line());
    }

    #[test]
    fn acknowledge_never_sets() {
        let mut int = Controller::default();
        int.write(MASK, source::ALL, !0);
        int.write(STAT, !0, !0);

        assert_eq!(int.read(STAT), 0);
        assert!(!int.line());
    }

    #[test]
    fn partial_access_leaves_other_lanes() {
        let mut int = Controller::default();
        int.write(MASK, source::ALL, !0);
        int.set(source::DMA | source::SIO1);

        // A byte write to the low lane cannot touch bit 8.
        int.write(STAT, 0, 0xff);
        assert_eq!(int.read(STAT), source::SIO1);

        int.write(MASK, 0, 0xff00);
        assert_eq!(int.read(MASK), source::ALL & 0xff);
        assert!(!int.line());
    }

    #[test]
    fn repeated_operations_are_idempotent() {
        let mut int = Controller::default();
        int.write(MASK, source::TIMER0, !0);
        int.set(source::TIMER0);
        let before = int.clone();

        int.set(source::TIMER0);
        int.write(MASK, source::TIMER0, !0);
        assert_eq!(int, before);
    }

    #[test]
    fn line_tracks_pending_and_enabled() {
        let mut int = Controller::default();
        for _ in 0..1024 {
            match rand::random::<u8>() % 3 {
                0 => int.set(rand::random::<u32>() & source::ALL),
                1 => int.write(STAT, rand::random(), rand::random()),
                _ => int.write(MASK, rand::random::<u32>() & source::ALL, rand::random()),
            }

            assert_eq!(int.line(), int.read(STAT) & int.read(MASK) != 0);
        }
    }
}
