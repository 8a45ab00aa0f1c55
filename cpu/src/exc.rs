// SPDX-License-Identifier: MPL-2.0

//! CPU exceptions.

/// Exception vectors, in (BEV=1, BEV=0) pairs.
pub mod vector {
    /// The general exception vector.
    pub const GENERAL: (u32, u32) = (0xbfc0_0180, 0x8000_0080);
    /// The debug (breakpoint-trap) vector.
    pub const DEBUG: (u32, u32) = (0xbfc0_0140, 0x8000_0040);
}

pub mod code {
    //! Exception codes.
    //!
    //! Each code represents a different kind of exception. The TLB codes are never raised; this
    //! CPU has no TLB.

    /// The code for interrupts.
    pub const INTERRUPT: u32 = 0;
    pub const TLB_MODIFICATION: u32 = 1;
    pub const TLB_LOAD: u32 = 2;
    pub const TLB_STORE: u32 = 3;
    /// The code for address-related exceptions caused by memory loads (e.g. instruction fetches).
    ///
    /// In particular, this code is yielded on attempts to access outside of *kuseg* while in user
    /// mode, on misaligned halfword or word loads, and on loads from unmapped addresses.
    pub const ADDRESS_LOAD: u32 = 4;
    /// The store counterpart of [`ADDRESS_LOAD`].
    pub const ADDRESS_STORE: u32 = 5;
    /// The code for bus-related exceptions caused by instruction fetches.
    pub const BUS_FETCH: u32 = 6;
    /// The code for bus-related exceptions caused by data loads and stores.
    pub const BUS_DATA: u32 = 7;
    /// The code for `syscall` instruction invocations.
    pub const SYSCALL: u32 = 8;
    /// The code for `break` instructions and breakpoint traps.
    pub const BREAKPOINT: u32 = 9;
    /// The code yielded in attempts to execute instructions marked by the MIPS I architecture as
    /// 'reserved'.
    pub const RESERVED_INSTR: u32 = 10;
    /// The code yielded in attempts to access an unavailable coprocessor.
    ///
    /// In the PSX, coprocessors 1 and 3 are always unusable.
    pub const COP_UNUSABLE: u32 = 11;
    /// The code yielded in signed arithmetic overflow.
    pub const INTEGER_OVERFLOW: u32 = 12;

    pub const NAMES: [&str; 13] = [
        "Int", "Mod", "TLBL", "TLBS", "AdEL", "AdES", "IBE", "DBE", "Sys", "Bp", "RI", "CpU", "Ov",
    ];
}

/// A CPU exception.
///
/// Exceptions are not necessarily errors. They are interruptions in normal code execution, which
/// may be caused by errors (e.g., misaligned addresses, signed integer overflow) or requested by
/// software with instructions such as `syscall` and `break`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Exception {
    /// A code which identifies the kind of exception that occurred.
    pub code: u32,
    /// The address to latch into BadVaddr, for address errors.
    pub bad_vaddr: Option<u32>,
    /// The coprocessor number to latch into `Cause.CE`.
    pub cop: u32,
    /// The vector pair to jump through.
    pub vector: (u32, u32),
}

impl Exception {
    /// Creates a new `Exception` with the given code, routed through the general vector.
    pub fn new(code: u32) -> Self {
        Self {
            code,
            bad_vaddr: None,
            cop: 0,
            vector: vector::GENERAL,
        }
    }

    pub fn interrupt() -> Self {
        Self::new(code::INTERRUPT)
    }

    pub fn address_load(vaddr: u32) -> Self {
        Self {
            bad_vaddr: Some(vaddr),
            ..Self::new(code::ADDRESS_LOAD)
        }
    }

    pub fn address_store(vaddr: u32) -> Self {
        Self {
            bad_vaddr: Some(vaddr),
            ..Self::new(code::ADDRESS_STORE)
        }
    }

    pub fn cop_unusable(cop: u32) -> Self {
        Self {
            cop,
            ..Self::new(code::COP_UNUSABLE)
        }
    }

    /// A breakpoint trap raised by a DCIC comparator.
    pub fn debug() -> Self {
        Self {
            vector: vector::DEBUG,
            ..Self::new(code::BREAKPOINT)
        }
    }

    pub fn name(&self) -> &'static str {
        code::NAMES.get(self.code as usize).copied().unwrap_or("?")
    }
}
