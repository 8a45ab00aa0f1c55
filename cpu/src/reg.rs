// SPDX-License-Identifier: MPL-2.0

//! The register file.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod cpr {
    //! System control (COP0) registers.

    use bitfield::bitfield;
    use serde::{Deserialize, Serialize};

    /// Breakpoint on execute.
    pub const BPC_IDX: usize = 3;
    /// Breakpoint on data access.
    pub const BDA_IDX: usize = 5;
    /// The target address of the last taken jump.
    pub const TAR_IDX: usize = 6;
    /// Breakpoint control.
    pub const DCIC_IDX: usize = 7;
    pub const BAD_VADDR_IDX: usize = 8;
    /// The data-access breakpoint mask.
    pub const BDAM_IDX: usize = 9;
    /// The execution breakpoint mask.
    pub const BPCM_IDX: usize = 11;
    pub const STATUS_IDX: usize = 12;
    pub const CAUSE_IDX: usize = 13;
    pub const EPC_IDX: usize = 14;
    pub const PRID_IDX: usize = 15;

    bitfield! {
        /// The status register (SR).
        #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
        pub struct Status(u32);
        impl Debug;
        /// Current interrupt enable.
        pub ie_c, set_ie_c: 0;
        /// Current kernel/user mode. Set in user mode.
        pub ku_c, set_ku_c: 1;
        pub ie_p, set_ie_p: 2;
        pub ku_p, set_ku_p: 3;
        pub ie_o, set_ie_o: 4;
        pub ku_o, set_ku_o: 5;
        /// Interrupt mask.
        pub im, set_im: 15, 8;
        /// Isolate cache.
        pub isc, set_isc: 16;
        pub swc, set_swc: 17;
        pub pz, set_pz: 18;
        pub cm, set_cm: 19;
        pub pe, set_pe: 20;
        pub ts, set_ts: 21;
        /// Bootstrap exception vectors.
        pub bev, set_bev: 22;
        pub re, set_re: 25;
        pub cu0, set_cu0: 28;
        pub cu1, set_cu1: 29;
        pub cu2, set_cu2: 30;
        pub cu3, set_cu3: 31;
    }

    impl Status {
        /// The KU/IE stack occupies the low six bits.
        pub const STACK_MASK: u32 = 0x3f;

        /// Pushes a kernel-mode, interrupts-disabled frame onto the KU/IE stack.
        pub fn push(&mut self) {
            self.0 = (self.0 & !Self::STACK_MASK) | ((self.0 << 2) & Self::STACK_MASK);
        }

        /// Pops the KU/IE stack, leaving the oldest frame in place.
        pub fn pop(&mut self) {
            self.0 = (self.0 & !0xf) | ((self.0 >> 2) & 0xf);
        }

        /// Determines if the coprocessor with the given number is usable in the current mode.
        pub fn is_cop_usable(&self, cop: u32) -> bool {
            match cop {
                // COP0 is always available to the kernel.
                0 => self.cu0() || !self.ku_c(),
                1 => self.cu1(),
                2 => self.cu2(),
                _ => self.cu3(),
            }
        }
    }

    bitfield! {
        /// The cause register.
        #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
        pub struct Cause(u32);
        impl Debug;
        pub exc_code, set_exc_code: 6, 2;
        /// Pending interrupts. Only bits 0 and 1 (the software interrupts) are writable.
        pub ip, set_ip: 15, 8;
        /// The hardware interrupt line from the interrupt controller.
        pub ip2, set_ip2: 10;
        /// The coprocessor number of a coprocessor-unusable exception.
        pub ce, set_ce: 29, 28;
        /// The exception occurred in a delay slot whose branch was taken.
        pub bt, set_bt: 30;
        /// The exception occurred in a delay slot.
        pub bd, set_bd: 31;
    }

    impl Cause {
        /// The bits of Cause that MTC0 may write.
        pub const WRITABLE_MASK: u32 = 0x0000_0300;
    }

    bitfield! {
        /// The breakpoint control register.
        #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
        pub struct Dcic(u32);
        impl Debug;
        /// Any breakpoint hit.
        pub db, set_db: 0;
        /// An execution breakpoint hit.
        pub pc, set_pc: 1;
        /// A data-access breakpoint hit.
        pub da, set_da: 2;
        /// A data-read breakpoint hit.
        pub r, set_r: 3;
        /// A data-write breakpoint hit.
        pub w, set_w: 4;
        pub t, set_t: 5;
        /// Debug enable.
        pub de, set_de: 23;
        /// Execution breakpoint enable.
        pub pce, set_pce: 24;
        /// Data-access breakpoint enable.
        pub dae, set_dae: 25;
        pub dr, set_dr: 26;
        pub dw, set_dw: 27;
        pub te, set_te: 28;
        /// Breakpoints apply in kernel mode.
        pub kd, set_kd: 29;
        /// Breakpoints apply in user mode.
        pub ud, set_ud: 30;
        /// Breakpoint hits trap to the debug vector.
        pub tr, set_tr: 31;
    }

    impl Dcic {
        /// The hit status bits.
        pub const STATUS_MASK: u32 = 0x3f;

        /// Determines if breakpoints are armed in the given mode.
        pub fn is_armed(&self, user_mode: bool) -> bool {
            self.de() && if user_mode { self.ud() } else { self.kd() }
        }

        /// Replaces the hit status bits with `hits`.
        pub fn record(&mut self, hits: u32) {
            self.0 = (self.0 & !Self::STATUS_MASK) | hits;
        }
    }
}

/// The system control (COP0) register file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cop0 {
    pub bpc: u32,
    pub bda: u32,
    pub tar: u32,
    pub dcic: cpr::Dcic,
    pub bad_vaddr: u32,
    pub bdam: u32,
    pub bpcm: u32,
    pub status: cpr::Status,
    pub cause: cpr::Cause,
    pub epc: u32,
    pub prid: u32,
}

/// The register file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// The program counter.
    pc: u32,
    hi: u32,
    lo: u32,
    /// General-purpose registers `r1` through `r31`. `r0` is hardwired to zero and not stored.
    gprs: [u32; 31],
    pub cop0: Cop0,
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pc: {:08x} r16:{:08x}", self.pc, self.gpr(16))?;
        for i in 1..16 {
            writeln!(
                f,
                "{:<4}{:08x} {:<4}{:08x}",
                format!("r{}:", i),
                self.gpr(i),
                format!("r{}:", i + 16),
                self.gpr(i + 16),
            )?;
        }
        writeln!(f, "hi: {:08x} lo: {:08x}", self.hi, self.lo)?;
        writeln!(
            f,
            "sr: {:08x} cause: {:08x} epc: {:08x}",
            self.cop0.status.0,
            self.cop0.cause.0,
            self.cop0.epc,
        )?;

        Ok(())
    }
}

impl File {
    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn pc_mut(&mut self) -> &mut u32 {
        &mut self.pc
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn hi_mut(&mut self) -> &mut u32 {
        &mut self.hi
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn lo_mut(&mut self) -> &mut u32 {
        &mut self.lo
    }

    pub fn gpr(&self, index: usize) -> u32 {
        if index == 0 {
            0
        } else {
            self.gprs[index - 1]
        }
    }

    pub fn set_gpr(&mut self, index: usize, value: u32) {
        if index > 0 {
            self.gprs[index - 1] = value;
        }
    }

    pub fn status(&self) -> cpr::Status {
        self.cop0.status
    }

    /// Reads a COP0 register, or `None` if the index names no register.
    pub fn cpr(&self, index: usize) -> Option<u32> {
        let cop0 = &self.cop0;
        let value = match index {
            cpr::BPC_IDX => cop0.bpc,
            cpr::BDA_IDX => cop0.bda,
            cpr::TAR_IDX => cop0.tar,
            cpr::DCIC_IDX => cop0.dcic.0,
            cpr::BAD_VADDR_IDX => cop0.bad_vaddr,
            cpr::BDAM_IDX => cop0.bdam,
            cpr::BPCM_IDX => cop0.bpcm,
            cpr::STATUS_IDX => cop0.status.0,
            cpr::CAUSE_IDX => cop0.cause.0,
            cpr::EPC_IDX => cop0.epc,
            cpr::PRID_IDX => cop0.prid,
            _ => return None,
        };

        Some(value)
    }

    /// Writes a COP0 register as MTC0 does. Read-only registers and unknown indices are ignored.
    pub fn set_cpr(&mut self, index: usize, value: u32) {
        let cop0 = &mut self.cop0;
        match index {
            cpr::BPC_IDX => cop0.bpc = value,
            cpr::BDA_IDX => cop0.bda = value,
            cpr::TAR_IDX => cop0.tar = value,
            cpr::DCIC_IDX => cop0.dcic = cpr::Dcic(value),
            cpr::BDAM_IDX => cop0.bdam = value,
            cpr::BPCM_IDX => cop0.bpcm = value,
            cpr::STATUS_IDX => cop0.status = cpr::Status(value),
            cpr::CAUSE_IDX => {
                let mask = cpr::Cause::WRITABLE_MASK;
                cop0.cause = cpr::Cause((cop0.cause.0 & !mask) | (value & mask));
            }
            cpr::BAD_VADDR_IDX | cpr::EPC_IDX | cpr::PRID_IDX => {
                tracing::debug!("Ignoring write to read-only COP0 register #{}", index);
            }
            _ => {
                tracing::warn!("Ignoring write to COP0 register #{} (value={:#010x})", index, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r0_is_hardwired() {
        let mut reg = File::default();
        reg.set_gpr(0, 0xdead_beef);
        reg.set_gpr(31, 0x1234_5678);

        assert_eq!(reg.gpr(0), 0);
        assert_eq!(reg.gpr(31), 0x1234_5678);
    }

    #[test]
    fn status_stack_push_and_pop() {
        // KUo=1 IEo=0, KUp=1 IEp=1, KUc=0 IEc=1.
        let mut sr = cpr::Status(0x0040_0000 | 0b10_11_01);

        sr.push();
        assert_eq!(sr.0 & 0x3f, 0b11_01_00);
        assert_eq!(sr.0 & !0x3f, 0x0040_0000);

        sr.pop();
        assert_eq!(sr.0 & 0x3f, 0b11_11_01);
    }

    #[test]
    fn only_software_interrupts_are_writable() {
        let mut reg = File::default();
        reg.cop0.cause.set_ip2(true);
        reg.set_cpr(cpr::CAUSE_IDX, 0xffff_ffff);

        assert_eq!(reg.cpr(cpr::CAUSE_IDX), Some(0x0000_0700));
    }

    #[test]
    fn read_only_registers() {
        let mut reg = File::default();
        reg.cop0.prid = 2;
        reg.set_cpr(cpr::PRID_IDX, 0);
        reg.set_cpr(cpr::BAD_VADDR_IDX, 0x1234);

        assert_eq!(reg.cpr(cpr::PRID_IDX), Some(2));
        assert_eq!(reg.cpr(cpr::BAD_VADDR_IDX), Some(0));
        assert_eq!(reg.cpr(0), None);
    }

    #[test]
    fn kernel_may_always_use_cop0() {
        let mut sr = cpr::Status::default();
        assert!(sr.is_cop_usable(0));
        assert!(!sr.is_cop_usable(2));

        sr.set_ku_c(true);
        assert!(!sr.is_cop_usable(0));
        sr.set_cu0(true);
        assert!(sr.is_cop_usable(0));
    }
}
