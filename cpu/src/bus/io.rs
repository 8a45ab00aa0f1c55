// SPDX-License-Identifier: MPL-2.0

//! CPU-local components accessible via I/O registers.
//!
//! The I/O window begins at physical address `0x1f80_1000`. Only the register groups that belong
//! to the processor's support chips are decoded here; every other offset is reported as
//! [unclaimed](Error::Unclaimed) so that the [bus](super::Bus) can forward it to the host device.

pub mod dma;
pub mod int;
pub mod memctl;
pub mod sio;

use super::{MainRam, Width};

/// The error type returned by I/O reads and writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// No register group claims the given offset into the I/O window.
    Unclaimed(u32),
}

/// CPU-local components accessible via I/O registers.
#[derive(Debug)]
pub struct Io<'a> {
    /// Memory control (expansion base addresses, access delays, and RAM size).
    pub memctl: &'a mut memctl::Config,
    /// The interrupt controller.
    pub int: &'a mut int::Controller,
    /// The serial ports.
    pub sio: &'a mut sio::Controller,
    /// The DMA channel front-end.
    pub dma: &'a mut dma::Dma,
}

/// The register group an offset falls into.
enum Group {
    MemCtl(u32),
    Sio(usize, u32),
    RamSize,
    Int(u32),
    Dma(u32),
}

impl Io<'_> {
    /// Advances time-driven state by the given number of CPU cycles.
    ///
    /// DMA completions are delivered before serial bit clocks, and channels and ports are visited
    /// in index order.
    pub fn update(&mut self, cycles: u32) {
        if cycles == 0 {
            return;
        }

        self.dma.update(cycles, self.int);
        self.sio.update(cycles, self.int);
    }

    fn select_group(offset: u32) -> Option<Group> {
        // As with the bus banks, work backwards from the highest base offset.
        match offset {
            dma::END_ADDR.. => None,
            dma::BASE_ADDR.. => Some(Group::Dma(offset - dma::BASE_ADDR)),
            0x0078.. => None,
            int::BASE_ADDR.. => Some(Group::Int((offset - int::BASE_ADDR) >> 2)),
            0x0064.. => None,
            memctl::RAM_SIZE_ADDR.. => Some(Group::RamSize),
            sio::BASE_ADDR.. => {
                let offset = offset - sio::BASE_ADDR;

                Some(Group::Sio((offset >> 4) as usize, offset & 0xf))
            }
            memctl::END_ADDR.. => None,
            _ => Some(Group::MemCtl(offset >> 2)),
        }
    }

    pub fn read(&mut self, offset: u32, width: Width) -> Result<u32, Error> {
        let Some(group) = Self::select_group(offset) else {
            return Err(Error::Unclaimed(offset));
        };

        let value = match group {
            Group::MemCtl(index) => {
                r3k_util::lane::extract(self.memctl.read(index as usize), offset, width.len())
            }
            Group::RamSize => {
                r3k_util::lane::extract(self.memctl.ram_size, offset, width.len())
            }
            Group::Int(index) => {
                r3k_util::lane::extract(self.int.read(index as usize), offset, width.len())
            }
            Group::Sio(port, offset) => self.sio.read(port, offset, width),
            Group::Dma(offset) => {
                r3k_util::lane::extract(self.dma.read(offset & !0b11), offset, width.len())
            }
        };
        tracing::debug!("io[{:#06x}] -> {:#x}", offset, value);

        Ok(value)
    }

    pub fn write(
        &mut self,
        offset: u32,
        value: u32,
        width: Width,
        ram: &mut MainRam,
    ) -> Result<(), Error> {
        let Some(group) = Self::select_group(offset) else {
            return Err(Error::Unclaimed(offset));
        };
        tracing::debug!("io[{:#06x}] <- {:#x}", offset, value);

        let len = width.len();
        match group {
            Group::MemCtl(index) => {
                let word = r3k_util::lane::insert(self.memctl.read(index as usize), value, offset, len);
                self.memctl.write(index as usize, word);
            }
            Group::RamSize => {
                self.memctl.ram_size = r3k_util::lane::insert(self.memctl.ram_size, value, offset, len);
            }
            Group::Int(index) => {
                let shift = r3k_util::lane::shift(offset, len);
                self.int.write(index as usize, value << shift, r3k_util::lane::mask(offset, len));
            }
            Group::Sio(port, offset) => {
                self.sio.write(port, offset, value, width, self.int);
            }
            Group::Dma(offset) => {
                let reg = offset & !0b11;
                let word = r3k_util::lane::insert(self.dma.read(reg), value, offset, len);
                self.dma.write(reg, word, ram, self.int);
            }
        }

        Ok(())
    }
}
