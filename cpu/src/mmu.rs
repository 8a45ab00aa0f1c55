// SPDX-License-Identifier: MPL-2.0

//! Virtual memory.
//!
//! There is no TLB. The virtual address space is cut into fixed segments: *kuseg*, *kseg0* and
//! *kseg1* all mirror the low 512 MiB of the physical address space, and *kseg2* is passed
//! through untranslated. Only *kuseg* is accessible from user mode, and only *kuseg* and *kseg0*
//! go through the caches.

use r3k_util::lane;

use crate::{
    bus::{self, MainRam, Width},
    cache::{self, d},
    exc::{self, Exception},
    Cpu,
};

/// Physical address masks, indexed by the top three bits of a virtual address.
const SEGMENT_MASKS: [u32; 8] = [
    // kuseg (2 GiB).
    0x1fff_ffff,
    0x1fff_ffff,
    0x1fff_ffff,
    0x1fff_ffff,
    // kseg0.
    0x1fff_ffff,
    // kseg1.
    0x1fff_ffff,
    // kseg2.
    0xffff_ffff,
    0xffff_ffff,
];

/// Translates the given virtual address to a physical address.
pub fn translate(vaddr: u32) -> u32 {
    vaddr & SEGMENT_MASKS[(vaddr >> 29) as usize]
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Segment {
    Kuseg,
    Kseg0,
    Kseg1,
    Kseg2,
}

impl Segment {
    pub fn of(vaddr: u32) -> Self {
        match vaddr >> 29 {
            0..=3 => Self::Kuseg,
            4 => Self::Kseg0,
            5 => Self::Kseg1,
            _ => Self::Kseg2,
        }
    }

    /// Determines if accesses through this segment are cacheable.
    pub fn is_cached(self) -> bool {
        matches!(self, Self::Kuseg | Self::Kseg0)
    }

    /// Determines if this segment is only accessible in kernel mode.
    pub fn is_kernel(self) -> bool {
        self != Self::Kuseg
    }
}

/// The kind of a memory access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Fetch,
    Load,
    Store,
}

impl Access {
    pub(crate) fn address_error(self, vaddr: u32) -> Exception {
        match self {
            Self::Store => Exception::address_store(vaddr),
            Self::Fetch | Self::Load => Exception::address_load(vaddr),
        }
    }

    /// Converts a bus error into the matching exception.
    pub(crate) fn exception(self, e: bus::Error, vaddr: u32) -> Exception {
        match e {
            bus::Error::UnmappedAddress(addr) => {
                tracing::debug!("{:?} from unmapped address {:#010x}", self, addr);

                self.address_error(vaddr)
            }
            bus::Error::Bus(addr) => {
                tracing::debug!("Bus error during {:?} (addr={:#010x})", self, addr);
                let code = match self {
                    Self::Fetch => exc::code::BUS_FETCH,
                    Self::Load | Self::Store => exc::code::BUS_DATA,
                };

                Exception::new(code)
            }
        }
    }
}

macro_rules! def_load {
    ($fn_name:ident, $width:ident) => {
        /// Loads a right-aligned, zero-extended value from the given virtual address.
        pub(crate) fn $fn_name(&mut self, vaddr: u32) -> Result<u32, Exception> {
            self.load(vaddr, Width::$width)
        }
    };
}

macro_rules! def_store {
    ($fn_name:ident, $width:ident) => {
        /// Stores the low bits of `value` to the given virtual address.
        pub(crate) fn $fn_name(&mut self, vaddr: u32, value: u32) -> Result<(), Exception> {
            self.store(vaddr, value, Width::$width)
        }
    };
}

impl Cpu<'_, '_> {
    def_load!(load_8, Byte);
    def_load!(load_16, Half);
    def_load!(load_32, Word);
    def_store!(store_8, Byte);
    def_store!(store_16, Half);
    def_store!(store_32, Word);

    /// Checks alignment and privilege, returning the segment `vaddr` falls in.
    fn check_access(&self, vaddr: u32, width: Width, access: Access) -> Result<Segment, Exception> {
        if !width.is_aligned(vaddr) {
            tracing::debug!("Misaligned {:?} at {:#010x}", access, vaddr);

            return Err(access.address_error(vaddr));
        }

        let segment = Segment::of(vaddr);
        if segment.is_kernel() && self.state.reg.status().ku_c() {
            tracing::debug!("{:?} from {:?} in user mode (vaddr={:#010x})", access, segment, vaddr);

            return Err(access.address_error(vaddr));
        }

        Ok(segment)
    }

    /// Tests the data-access breakpoint. A hit is recorded in DCIC and traps if DCIC.TR is
    /// set; a trap preempts the access.
    fn check_data_breakpoint(&mut self, vaddr: u32, access: Access) -> Result<(), Exception> {
        let cop0 = &mut self.state.reg.cop0;
        let dcic = cop0.dcic;
        let enabled = match access {
            Access::Load => dcic.dr(),
            Access::Store => dcic.dw(),
            Access::Fetch => false,
        };

        if !(enabled && dcic.dae() && dcic.is_armed(cop0.status.ku_c())) {
            return Ok(());
        }
        if (vaddr ^ cop0.bda) & cop0.bdam != 0 {
            return Ok(());
        }

        // DB and DA, plus R or W.
        let hits = match access {
            Access::Store => 0b1_0101,
            _ => 0b0_1101,
        };
        cop0.dcic.record(hits);
        tracing::debug!("Data breakpoint hit ({:?} at {:#010x})", access, vaddr);

        if dcic.tr() {
            Err(Exception::debug())
        } else {
            Ok(())
        }
    }

    fn load(&mut self, vaddr: u32, width: Width) -> Result<u32, Exception> {
        self.check_data_breakpoint(vaddr, Access::Load)?;
        let segment = self.check_access(vaddr, width, Access::Load)?;
        let addr = translate(vaddr);
        let len = width.len();
        let biu = self.state.cache.biu();

        if segment == Segment::Kseg2 {
            return if addr & !0b11 == cache::BIU_ADDR {
                Ok(lane::extract(biu.0, addr, len))
            } else {
                tracing::debug!("Load from kseg2 (addr={:#010x})", addr);

                Err(Access::Load.address_error(vaddr))
            };
        }

        if self.state.reg.status().isc() {
            let word = if biu.is1() {
                self.state.cache.i.load_isolated(addr)
            } else if biu.ds() {
                self.state.cache.d.load_isolated(addr)
            } else {
                0
            };

            return Ok(lane::extract(word, addr, len));
        }

        if segment.is_cached() {
            if d::is_scratchpad(addr) && biu.is_scratchpad() {
                return Ok(self.state.cache.d.read(addr, width));
            }

            if biu.is_data_cache() && addr < MainRam::MIRROR_END {
                if let Some(word) = self.state.cache.d.lookup(addr) {
                    tracing::trace!("D-cache hit (addr={:#010x})", addr);

                    return Ok(lane::extract(word, addr, len));
                }

                let value = self
                    .bus
                    .read(addr, width)
                    .map_err(|e| Access::Load.exception(e, vaddr))?;
                if width == Width::Word {
                    self.state.cache.d.fill(addr, value);
                }

                return Ok(value);
            }
        }

        self.bus
            .read(addr, width)
            .map_err(|e| Access::Load.exception(e, vaddr))
    }

    /// Stores the bytes of `value` in lanes `first..=last` of the word containing `vaddr`,
    /// leaving the other lanes untouched. The backing word is never read.
    pub(crate) fn store_lanes(
        &mut self,
        vaddr: u32,
        value: u32,
        first: u32,
        last: u32,
    ) -> Result<(), Exception> {
        self.check_data_breakpoint(vaddr, Access::Store)?;
        let aligned = vaddr & !0b11;
        let segment = self.check_access(aligned, Width::Word, Access::Store)?;

        let mut lane = first;
        while lane <= last {
            let width = match last + 1 - lane {
                4 => Width::Word,
                2 | 3 if lane % 2 == 0 => Width::Half,
                _ => Width::Byte,
            };
            self.write(aligned + lane, segment, value >> (8 * lane), width)?;
            lane += width.len();
        }

        Ok(())
    }

    fn store(&mut self, vaddr: u32, value: u32, width: Width) -> Result<(), Exception> {
        self.check_data_breakpoint(vaddr, Access::Store)?;
        let segment = self.check_access(vaddr, width, Access::Store)?;
        self.write(vaddr, segment, value, width)
    }

    fn write(&mut self, vaddr: u32, segment: Segment, value: u32, width: Width) -> Result<(), Exception> {
        let addr = translate(vaddr);
        let len = width.len();
        let biu = self.state.cache.biu();

        if segment == Segment::Kseg2 {
            return if addr & !0b11 == cache::BIU_ADDR {
                self.state.cache.set_biu(lane::insert(biu.0, value, addr, len));

                Ok(())
            } else {
                tracing::debug!("Store to kseg2 (addr={:#010x})", addr);

                Err(Access::Store.address_error(vaddr))
            };
        }

        if self.state.reg.status().isc() {
            let cache = &mut self.state.cache;
            if biu.is1() {
                if biu.tag() {
                    cache.i.invalidate_line(addr);
                } else {
                    let word = lane::insert(cache.i.load_isolated(addr), value, addr, len);
                    cache.i.store_isolated(addr, word);
                }
            } else if biu.ds() {
                cache.d.store_isolated(addr, value, width);
            } else {
                tracing::trace!("Dropping isolated store (addr={:#010x})", addr);
            }

            return Ok(());
        }

        if segment.is_cached() {
            if d::is_scratchpad(addr) && biu.is_scratchpad() {
                self.state.cache.d.write(addr, value, width);

                return Ok(());
            }

            if biu.is_data_cache() && addr < MainRam::MIRROR_END {
                self.state.cache.d.write_through(addr, value, width);
            }
        }

        self.bus
            .write(addr, value, width)
            .map_err(|e| Access::Store.exception(e, vaddr))
    }
}
