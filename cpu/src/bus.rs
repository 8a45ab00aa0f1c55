// SPDX-License-Identifier: MPL-2.0

//! The physical CPU bus.
//!
//! Addresses handled here are physical, i.e., already stripped of their segment bits by the
//! [MMU](crate::mmu). Main RAM, the BIOS ROM and the CPU-local I/O registers are owned by the
//! emulator; every other region (the expansion regions and the unclaimed parts of the I/O window)
//! is forwarded to a host-provided [`Device`].

pub mod io;

use serde::{Deserialize, Serialize};

pub use io::Io;

/// The width of a bus access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    /// The number of bytes moved by an access of this width.
    pub const fn len(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }

    /// Determines if `addr` is naturally aligned for this width.
    pub const fn is_aligned(self, addr: u32) -> bool {
        addr & (self.len() - 1) == 0
    }
}

/// The error type returned by bus reads and writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// No bank or device claims the given physical address.
    UnmappedAddress(u32),
    /// A device claimed the address but signalled a bus error.
    Bus(u32),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e {
            io::Error::Unclaimed(offset) => Self::UnmappedAddress(offset.wrapping_add(Bus::IO_BASE_ADDR)),
        }
    }
}

/// A byte-addressable device standing in for the parts of the physical address space that this
/// crate does not emulate.
///
/// `addr` is always a physical address, and `value` is always right-aligned regardless of the
/// lane being accessed.
pub trait Device {
    fn read(&mut self, addr: u32, width: Width) -> Result<u32, Error>;

    fn write(&mut self, addr: u32, value: u32, width: Width) -> Result<(), Error>;
}

/// A [`Device`] that claims nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unmapped;

impl Device for Unmapped {
    fn read(&mut self, addr: u32, _: Width) -> Result<u32, Error> {
        Err(Error::UnmappedAddress(addr))
    }

    fn write(&mut self, addr: u32, _: u32, _: Width) -> Result<(), Error> {
        Err(Error::UnmappedAddress(addr))
    }
}

macro_rules! def_bank {
    ($name:ident, $size:literal @ $addr:literal) => {
        impl Default for $name {
            fn default() -> Self {
                Self(vec![0; $size].into_boxed_slice())
            }
        }

        impl $name {
            /// The size, in bytes, of this memory bank.
            pub const SIZE: usize = $size;

            /// The physical base address of this memory bank.
            pub const BASE_ADDR: u32 = $addr;

            fn read(&self, offset: usize, width: Width) -> u32 {
                read_bytes(&self.0[offset..], width)
            }

            fn write(&mut self, offset: usize, value: u32, width: Width) {
                write_bytes(&mut self.0[offset..], value, width)
            }
        }

        /// A bank of memory.
        ///
        /// The backing buffer lives on the heap; the banks are far too large for the stack.
        #[derive(Clone, Serialize, Deserialize)]
        pub struct $name(Box<[u8]>);

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x} bytes)", stringify!($name), self.0.len())
            }
        }

        impl std::ops::Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

def_bank!(MainRam,  0x20_0000 @ 0x0000_0000);
def_bank!(Bios,     0x08_0000 @ 0x1fc0_0000);

impl MainRam {
    /// The physical extent of the RAM region; the 2 MiB of RAM repeat four times within it.
    pub const MIRROR_END: u32 = 0x0080_0000;

    /// Reads the word at the given address, which is wrapped to the size of RAM and word-aligned.
    pub fn word(&self, addr: u32) -> u32 {
        self.read(Self::word_offset(addr), Width::Word)
    }

    /// Writes the word at the given address, which is wrapped to the size of RAM and word-aligned.
    pub fn set_word(&mut self, addr: u32, value: u32) {
        self.write(Self::word_offset(addr), value, Width::Word);
    }

    fn word_offset(addr: u32) -> usize {
        (addr as usize & (Self::SIZE - 1)) & !0b11
    }
}

fn read_bytes(bytes: &[u8], width: Width) -> u32 {
    match width {
        Width::Byte => u32::from(bytes[0]),
        Width::Half => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        Width::Word => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn write_bytes(bytes: &mut [u8], value: u32, width: Width) {
    let len = width.len() as usize;
    bytes[..len].copy_from_slice(&value.to_le_bytes()[..len]);
}

impl<'a> Bus<'a> {
    /// Creates a new [`Bus`].
    pub fn new(
        main_ram: &'a mut MainRam,
        bios: &'a mut Bios,
        io: Io<'a>,
        ext: &'a mut dyn Device,
    ) -> Self {
        Self { main_ram, bios, io, ext }
    }
}

/// The CPU memory bus.
pub struct Bus<'a> {
    /// [`MainRam`].
    pub main_ram: &'a mut MainRam,
    /// [`Bios`].
    pub bios: &'a mut Bios,
    /// The CPU-local I/O registers.
    pub io: Io<'a>,
    /// Everything else.
    pub ext: &'a mut dyn Device,
}

/// The bus region an address falls into.
enum Bank {
    MainRam(usize),
    Io(u32),
    Bios(usize),
    External,
}

impl Bus<'_> {
    /// The physical base address of the I/O register window.
    pub const IO_BASE_ADDR: u32 = 0x1f80_1000;

    const IO_END_ADDR: u32 = 0x1f80_2000;

    /// Selects the bank that claims a physical address.
    fn select_bank(addr: u32) -> Bank {
        // Work backwards from the highest base address so that each arm only needs a lower bound.
        match addr {
            0x1fc8_0000.. => Bank::External,
            Bios::BASE_ADDR.. => Bank::Bios((addr - Bios::BASE_ADDR) as usize),
            Self::IO_END_ADDR.. => Bank::External,
            Self::IO_BASE_ADDR.. => Bank::Io(addr - Self::IO_BASE_ADDR),
            MainRam::MIRROR_END.. => Bank::External,
            _ => Bank::MainRam(addr as usize & (MainRam::SIZE - 1)),
        }
    }

    pub fn read(&mut self, addr: u32, width: Width) -> Result<u32, Error> {
        match Self::select_bank(addr) {
            Bank::MainRam(offset) => Ok(self.main_ram.read(offset, width)),
            Bank::Bios(offset) => Ok(self.bios.read(offset, width)),
            Bank::Io(offset) => match self.io.read(offset, width) {
                Err(io::Error::Unclaimed(_)) => self.ext.read(addr, width),
                result => result.map_err(Error::from),
            },
            Bank::External => self.ext.read(addr, width),
        }
    }

    pub fn write(&mut self, addr: u32, value: u32, width: Width) -> Result<(), Error> {
        match Self::select_bank(addr) {
            Bank::MainRam(offset) => {
                self.main_ram.write(offset, value, width);

                Ok(())
            }
            Bank::Bios(_) => {
                tracing::warn!("Ignoring write to BIOS ROM (addr={:#010x}, value={:#x})", addr, value);

                Ok(())
            }
            Bank::Io(offset) => match self.io.write(offset, value, width, self.main_ram) {
                Err(io::Error::Unclaimed(_)) => self.ext.write(addr, value, width),
                result => result.map_err(Error::from),
            },
            Bank::External => self.ext.write(addr, value, width),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::io::{dma, int, memctl, sio};

    struct Fixture {
        main_ram: MainRam,
        bios: Bios,
        memctl: memctl::Config,
        int: int::Controller,
        sio: sio::Controller,
        dma: dma::Dma,
        ext: Unmapped,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                main_ram: MainRam::default(),
                bios: Bios::default(),
                memctl: memctl::Config::default(),
                int: int::Controller::default(),
                sio: sio::Controller::default(),
                dma: dma::Dma::default(),
                ext: Unmapped,
            }
        }

        fn bus(&mut self) -> Bus {
            Bus::new(
                &mut self.main_ram,
                &mut self.bios,
                Io {
                    memctl: &mut self.memctl,
                    int: &mut self.int,
                    sio: &mut self.sio,
                    dma: &mut self.dma,
                },
                &mut self.ext,
            )
        }
    }

    #[test]
    fn ram_is_little_endian_and_mirrored() {
        let mut fixture = Fixture::new();
        let mut bus = fixture.bus();
        bus.write(0x0000_1000, 0x1122_3344, Width::Word).unwrap();

        assert_eq!(bus.read(0x0000_1000, Width::Byte), Ok(0x44));
        assert_eq!(bus.read(0x0000_1002, Width::Half), Ok(0x1122));
        assert_eq!(bus.read(0x0060_1000, Width::Word), Ok(0x1122_3344));
    }

    #[test]
    fn bios_is_read_only() {
        let mut fixture = Fixture::new();
        fixture.bios[0..4].copy_from_slice(&0x3c08_0013u32.to_le_bytes());
        let mut bus = fixture.bus();
        bus.write(0x1fc0_0000, 0, Width::Word).unwrap();

        assert_eq!(bus.read(0x1fc0_0000, Width::Word), Ok(0x3c08_0013));
    }

    #[test]
    fn unclaimed_regions_reach_the_device() {
        let mut fixture = Fixture::new();
        let mut bus = fixture.bus();

        assert_eq!(bus.read(0x1f00_0000, Width::Byte), Err(Error::UnmappedAddress(0x1f00_0000)));
        assert_eq!(bus.read(0x1f80_1810, Width::Word), Err(Error::UnmappedAddress(0x1f80_1810)));
        assert_eq!(bus.read(0x1fc8_0000, Width::Word), Err(Error::UnmappedAddress(0x1fc8_0000)));
    }

    #[test]
    fn ram_word_helpers_wrap() {
        let mut ram = MainRam::default();
        ram.set_word(0x0020_0010, 0xdead_beef);

        assert_eq!(ram.word(0x10), 0xdead_beef);
        assert_eq!(ram.word(0x13), 0xdead_beef);
    }
}
