// SPDX-License-Identifier: MPL-2.0

//! A bare machine for unit tests: RAM, a blank BIOS, the I/O devices and an inert GTE.

use crate::{
    bus::{
        io::{dma, int, memctl, sio, Io},
        Bios, MainRam, Unmapped,
    },
    cop, mmu, Bus, Cpu, State,
};

pub struct Fixture {
    pub state: State,
    pub main_ram: MainRam,
    pub bios: Bios,
    pub memctl: memctl::Config,
    pub int: int::Controller,
    pub sio: sio::Controller,
    pub dma: dma::Dma,
    pub ext: Unmapped,
    pub gte: cop::Inert,
}

impl Fixture {
    /// Where [`Fixture::run_program`] places code, in cached kseg0.
    pub const PROGRAM_ADDR: u32 = 0x8000_1000;

    pub fn new() -> Self {
        Self {
            state: State::default(),
            main_ram: MainRam::default(),
            bios: Bios::default(),
            memctl: memctl::Config::default(),
            int: int::Controller::default(),
            sio: sio::Controller::default(),
            dma: dma::Dma::default(),
            ext: Unmapped,
            gte: cop::Inert::default(),
        }
    }

    pub fn cpu(&mut self) -> Cpu<'_, '_> {
        let io = Io {
            memctl: &mut self.memctl,
            int: &mut self.int,
            sio: &mut self.sio,
            dma: &mut self.dma,
        };
        let bus = Bus::new(&mut self.main_ram, &mut self.bios, io, &mut self.ext);

        self.state.connect_bus(bus, &mut self.gte)
    }

    /// Copies `code` into RAM or the BIOS at the given virtual address.
    pub fn load_program(&mut self, vaddr: u32, code: &[u32]) {
        let mut addr = mmu::translate(vaddr);
        for word in code {
            if addr >= Bios::BASE_ADDR {
                let offset = (addr - Bios::BASE_ADDR) as usize;
                self.bios[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
            } else {
                self.main_ram.set_word(addr, *word);
            }
            addr += 4;
        }
    }

    /// Executes `count` instructions from the current PC.
    pub fn step(&mut self, count: usize) {
        let mut cpu = self.cpu();
        for _ in 0..count {
            cpu.execute_next_instr();
        }
    }

    /// Loads `code` at [`Fixture::PROGRAM_ADDR`] and executes `count` instructions of it.
    pub fn run_program(&mut self, code: &[u32], count: usize) {
        self.run_program_at(Self::PROGRAM_ADDR, code, count);
    }

    pub fn run_program_at(&mut self, vaddr: u32, code: &[u32], count: usize) {
        self.load_program(vaddr, code);
        *self.state.reg.pc_mut() = vaddr;
        self.step(count);
    }
}

/// Instruction encoders.
pub mod asm {
    pub fn r_type(rs: u8, rt: u8, rd: u8, shamt: u8, funct: u8) -> u32 {
        (u32::from(rs) << 21)
            | (u32::from(rt) << 16)
            | (u32::from(rd) << 11)
            | (u32::from(shamt) << 6)
            | u32::from(funct)
    }

    pub fn i_type(op: u8, rs: u8, rt: u8, imm: u16) -> u32 {
        (u32::from(op) << 26) | (u32::from(rs) << 21) | (u32::from(rt) << 16) | u32::from(imm)
    }

    fn j_type(op: u8, target: u32) -> u32 {
        (u32::from(op) << 26) | ((target >> 2) & 0x03ff_ffff)
    }

    fn cop_move(cop: u8, sub_op: u8, rt: u8, rd: u8) -> u32 {
        i_type(0x10 | cop, sub_op, rt, u16::from(rd) << 11)
    }

    pub fn nop() -> u32 {
        0
    }

    pub fn addiu(rt: u8, rs: u8, imm: u16) -> u32 {
        i_type(0x09, rs, rt, imm)
    }

    pub fn ori(rt: u8, rs: u8, imm: u16) -> u32 {
        i_type(0x0d, rs, rt, imm)
    }

    pub fn lui(rt: u8, imm: u16) -> u32 {
        i_type(0x0f, 0, rt, imm)
    }

    pub fn lw(rt: u8, base: u8, offset: u16) -> u32 {
        i_type(0x23, base, rt, offset)
    }

    pub fn lbu(rt: u8, base: u8, offset: u16) -> u32 {
        i_type(0x24, base, rt, offset)
    }

    pub fn sb(rt: u8, base: u8, offset: u16) -> u32 {
        i_type(0x28, base, rt, offset)
    }

    pub fn sw(rt: u8, base: u8, offset: u16) -> u32 {
        i_type(0x2b, base, rt, offset)
    }

    pub fn lwc(cop: u8, rt: u8, base: u8, offset: u16) -> u32 {
        i_type(0x30 | cop, base, rt, offset)
    }

    pub fn or(rd: u8, rs: u8, rt: u8) -> u32 {
        r_type(rs, rt, rd, 0, 0x25)
    }

    pub fn mult(rs: u8, rt: u8) -> u32 {
        r_type(rs, rt, 0, 0, 0x18)
    }

    pub fn mfhi(rd: u8) -> u32 {
        r_type(0, 0, rd, 0, 0x10)
    }

    pub fn mflo(rd: u8) -> u32 {
        r_type(0, 0, rd, 0, 0x12)
    }

    pub fn syscall() -> u32 {
        r_type(0, 0, 0, 0, 0x0c)
    }

    pub fn beq(rs: u8, rt: u8, offset: u16) -> u32 {
        i_type(0x04, rs, rt, offset)
    }

    pub fn j(target: u32) -> u32 {
        j_type(0x02, target)
    }

    pub fn jal(target: u32) -> u32 {
        j_type(0x03, target)
    }

    pub fn jr(rs: u8) -> u32 {
        r_type(rs, 0, 0, 0, 0x08)
    }

    pub fn mfc0(rt: u8, rd: u8) -> u32 {
        cop_move(0, 0x00, rt, rd)
    }

    pub fn mtc0(rt: u8, rd: u8) -> u32 {
        cop_move(0, 0x04, rt, rd)
    }

    pub fn rfe() -> u32 {
        0x4200_0010
    }

    pub fn mfc2(rt: u8, rd: u8) -> u32 {
        cop_move(2, 0x00, rt, rd)
    }

    pub fn mtc2(rt: u8, rd: u8) -> u32 {
        cop_move(2, 0x04, rt, rd)
    }

    /// A GTE command.
    pub fn cop2(command: u32) -> u32 {
        0x4a00_0000 | (command & 0x01ff_ffff)
    }
}
