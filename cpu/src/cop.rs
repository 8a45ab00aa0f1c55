// SPDX-License-Identifier: MPL-2.0

//! Coprocessor dispatch.
//!
//! COP0, the system control coprocessor, lives in the core's own register file. COP2, the
//! geometry transformation engine (GTE), is supplied by the host through the [`Gte`] trait. The
//! PSX has no COP1 or COP3; any attempt to use them raises a coprocessor-unusable exception.

use serde::{Deserialize, Serialize};

use crate::{
    exc::Exception,
    instr::{self, i, r},
    Cpu,
};

/// The geometry transformation engine.
///
/// The core only moves words in and out of the GTE's 32 data and 32 control registers and
/// forwards command words. What a command computes is up to the implementation.
pub trait Gte {
    fn data_reg(&self, index: usize) -> u32;

    fn set_data_reg(&mut self, index: usize, value: u32);

    fn ctrl_reg(&self, index: usize) -> u32;

    fn set_ctrl_reg(&mut self, index: usize, value: u32);

    /// Executes a command and returns the number of cycles until the GTE is free again.
    ///
    /// `command` is the low 25 bits of the `COP2` instruction word.
    fn execute_command(&mut self, command: u32) -> u32;
}

/// A GTE that stores register writes and otherwise does nothing.
///
/// Commands compute nothing but are still charged their hardware latency, so software timing
/// around GTE use is preserved.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Inert {
    data: [u32; 32],
    ctrl: [u32; 32],
}

impl Gte for Inert {
    fn data_reg(&self, index: usize) -> u32 {
        self.data[index & 31]
    }

    fn set_data_reg(&mut self, index: usize, value: u32) {
        self.data[index & 31] = value;
    }

    fn ctrl_reg(&self, index: usize) -> u32 {
        self.ctrl[index & 31]
    }

    fn set_ctrl_reg(&mut self, index: usize, value: u32) {
        self.ctrl[index & 31] = value;
    }

    fn execute_command(&mut self, command: u32) -> u32 {
        command_latency(command)
    }
}

/// The number of cycles the GTE takes to execute a command.
pub fn command_latency(command: u32) -> u32 {
    match command & 0x3f {
        0x01 => 15, // RTPS
        0x06 => 8,  // NCLIP
        0x0c => 6,  // OP
        0x10 => 8,  // DPCS
        0x11 => 8,  // INTPL
        0x12 => 8,  // MVMVA
        0x13 => 19, // NCDS
        0x14 => 13, // CDP
        0x16 => 44, // NCDT
        0x1b => 17, // NCCS
        0x1c => 11, // CC
        0x1e => 14, // NCS
        0x20 => 30, // NCT
        0x28 => 5,  // SQR
        0x29 => 8,  // DCPL
        0x2a => 17, // DPCT
        0x2d => 5,  // AVSZ3
        0x2e => 6,  // AVSZ4
        0x30 => 23, // RTPT
        0x3d => 5,  // GPF
        0x3e => 5,  // GPL
        0x3f => 39, // NCCT
        op => {
            tracing::trace!("Unknown GTE command {:#04x}", op);

            1
        }
    }
}

/// `COPz` sub-operations, from the *rs* field.
mod sub_op {
    pub const MF: u8 = 0x00;
    pub const CF: u8 = 0x02;
    pub const MT: u8 = 0x04;
    pub const CT: u8 = 0x06;
    pub const BC: u8 = 0x08;
    /// Set in *rs* for coprocessor commands.
    pub const CO: u8 = 0x10;
}

impl Cpu<'_, '_> {
    /// Raises coprocessor-unusable unless the given coprocessor is present and enabled.
    pub(crate) fn require_cop(&self, cop: u32) -> Result<(), Exception> {
        let usable = match cop {
            0 | 2 => self.state.reg.status().is_cop_usable(cop),
            _ => false,
        };

        if usable {
            Ok(())
        } else {
            tracing::debug!("COP{} is unusable", cop);

            Err(Exception::cop_unusable(cop))
        }
    }

    /// `BCzF` and `BCzT`. Neither present coprocessor drives its condition input, so the
    /// condition always reads false.
    fn branch_on_cop_condition(&mut self, instr: r::Instr, addr: u32) {
        let on_true = instr.rt & 1 == 1;
        let target = instr::branch_target(addr, instr.code() as u16);
        self.branch(!on_true, target);
    }

    pub(crate) fn execute_cop0(&mut self, instr: r::Instr, addr: u32) -> Result<(), Exception> {
        self.require_cop(0)?;

        if instr.rs & sub_op::CO != 0 {
            match instr.funct {
                0x01 | 0x02 | 0x06 | 0x08 => {
                    tracing::debug!(
                        "Ignoring TLB operation (funct={:#04x}) at {:#010x}; there is no TLB",
                        instr.funct,
                        addr,
                    );
                }
                0x10 => {
                    tracing::trace!("rfe");
                    self.state.reg.cop0.status.pop();
                }
                funct => {
                    tracing::warn!("Ignoring unknown COP0 command (funct={:#04x}) at {:#010x}", funct, addr);
                }
            }

            return Ok(());
        }

        match instr.rs {
            sub_op::MF => match self.state.reg.cpr(instr.rd.into()) {
                Some(value) => self.schedule_load(instr.rt, value),
                None => {
                    tracing::warn!("mfc0: COP0 register #{} does not exist", instr.rd);
                }
            },
            sub_op::MT => {
                let value = self.gpr(instr.rt);
                self.state.reg.set_cpr(instr.rd.into(), value);
            }
            sub_op::CF | sub_op::CT => {
                tracing::warn!("COP0 has no control registers (instr={:#010x})", instr.code());
            }
            sub_op::BC => self.branch_on_cop_condition(instr, addr),
            rs => {
                tracing::warn!("Ignoring unknown COP0 operation (rs={:#04x}) at {:#010x}", rs, addr);
            }
        }

        Ok(())
    }

    pub(crate) fn execute_cop2(&mut self, instr: r::Instr, addr: u32) -> Result<(), Exception> {
        self.require_cop(2)?;

        if instr.rs & sub_op::CO != 0 {
            self.stall_for_gte();
            let latency = self.gte.execute_command(instr.code() & 0x1ff_ffff);
            let clock = &mut self.state.clock;
            clock.gte_ready_at = clock.cycles + u64::from(latency);

            return Ok(());
        }

        match instr.rs {
            sub_op::MF => {
                self.stall_for_gte();
                let value = self.gte.data_reg(instr.rd.into());
                self.schedule_load(instr.rt, value);
            }
            sub_op::CF => {
                self.stall_for_gte();
                let value = self.gte.ctrl_reg(instr.rd.into());
                self.schedule_load(instr.rt, value);
            }
            sub_op::MT => {
                let value = self.gpr(instr.rt);
                self.gte.set_data_reg(instr.rd.into(), value);
            }
            sub_op::CT => {
                let value = self.gpr(instr.rt);
                self.gte.set_ctrl_reg(instr.rd.into(), value);
            }
            sub_op::BC => self.branch_on_cop_condition(instr, addr),
            rs => {
                tracing::warn!("Ignoring unknown COP2 operation (rs={:#04x}) at {:#010x}", rs, addr);
            }
        }

        Ok(())
    }

    /// `LWCz`.
    pub(crate) fn load_cop(&mut self, cop: u32, instr: i::Instr) -> Result<(), Exception> {
        self.require_cop(cop)?;
        let vaddr = instr::calc_vaddr(self.gpr(instr.rs), instr.imm);

        if cop == 2 {
            let value = self.load_32(vaddr)?;
            self.gte.set_data_reg(instr.rt.into(), value);
        } else {
            tracing::warn!("lwc{}: COP{} has no data registers; ignoring", cop, cop);
        }

        Ok(())
    }

    /// `SWCz`.
    pub(crate) fn store_cop(&mut self, cop: u32, instr: i::Instr) -> Result<(), Exception> {
        self.require_cop(cop)?;
        let vaddr = instr::calc_vaddr(self.gpr(instr.rs), instr.imm);

        if cop == 2 {
            self.stall_for_gte();
            let value = self.gte.data_reg(instr.rt.into());
            self.store_32(vaddr, value)?;
        } else {
            tracing::warn!("swc{}: COP{} has no data registers; ignoring", cop, cop);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exc, reg::cpr, testing::{asm, Fixture}};

    #[test]
    fn latency_table() {
        assert_eq!(command_latency(0x0008_0030), 23);
        assert_eq!(command_latency(0x0148_0012 | 0x1e), 14);
        assert_eq!(command_latency(0x3b), 1);
    }

    #[test]
    fn inert_keeps_registers() {
        let mut gte = Inert::default();
        gte.set_data_reg(3, 0x1234);
        gte.set_ctrl_reg(31, 0x5678);

        assert_eq!(gte.data_reg(3), 0x1234);
        assert_eq!(gte.ctrl_reg(31), 0x5678);
        assert_eq!(gte.data_reg(35), 0x1234);
    }

    #[test]
    fn cop2_requires_cu2() {
        let mut fixture = Fixture::new();
        fixture.run_program(&[asm::cop2(0x0008_0030)], 1);

        let cop0 = &fixture.state.reg.cop0;
        assert_eq!(cop0.cause.exc_code(), exc::code::COP_UNUSABLE);
        assert_eq!(cop0.cause.ce(), 2);
    }

    #[test]
    fn cop1_is_never_usable() {
        let mut fixture = Fixture::new();
        fixture.state.reg.cop0.status.set_cu1(true);
        fixture.run_program(&[asm::lwc(1, 2, 0, 0)], 1);

        let cop0 = &fixture.state.reg.cop0;
        assert_eq!(cop0.cause.exc_code(), exc::code::COP_UNUSABLE);
        assert_eq!(cop0.cause.ce(), 1);
    }

    #[test]
    fn gte_moves_and_interlock() {
        let mut fixture = Fixture::new();
        fixture.state.reg.cop0.status.set_cu2(true);
        fixture.run_program(
            &[
                asm::addiu(8, 0, 0x55),
                asm::mtc2(8, 7),
                asm::cop2(0x0008_0030),
                asm::mfc2(9, 7),
                asm::nop(),
            ],
            5,
        );

        assert_eq!(fixture.gte.data_reg(7), 0x55);
        assert_eq!(fixture.state.reg.gpr(9), 0x55);
        // The MFC2 waited out the RTPT.
        assert!(fixture.state.clock.gte_ready_at <= fixture.state.clock.cycles);
        assert!(fixture.state.clock.cycles >= 23);
    }

    #[test]
    fn mfc0_uses_the_load_delay() {
        let mut fixture = Fixture::new();
        fixture.state.reg.cop0.prid = 2;
        fixture.run_program(
            &[
                asm::mfc0(8, cpr::PRID_IDX as u8),
                asm::or(9, 8, 0),
                asm::or(10, 8, 0),
            ],
            3,
        );

        assert_eq!(fixture.state.reg.gpr(9), 0);
        assert_eq!(fixture.state.reg.gpr(10), 2);
    }

    #[test]
    fn rfe_pops_the_mode_stack() {
        let mut fixture = Fixture::new();
        fixture.state.reg.cop0.status = cpr::Status(0b00_11_00);
        fixture.run_program(&[asm::rfe()], 1);

        assert_eq!(fixture.state.reg.status().0 & 0x3f, 0b00_00_11);
    }
}
