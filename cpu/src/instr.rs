// SPDX-License-Identifier: MPL-2.0

//! The MIPS I instruction set.
//!
//! Every instruction is declared once, in the [`def_instr_and_op_kind`] invocation at the bottom
//! of this module, together with its encoding type, its disassembly and its semantics. The macro
//! expands that table into the [`Instr`] and [`Kind`] enums and their decode, disassembly and
//! execution methods.

pub mod asm;
pub mod decode;

pub use asm::Asm;

use r3k_util::{sign_extend_16, sign_extend_8};

use crate::{
    exc::{self, Exception},
    muldiv, sym, Cpu,
};

pub mod i {
    /// An I-type instruction, where 'I' stands for 'immediate'.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Instr {
        /// The *rs* operand.
        pub rs: u8,
        /// The *rt* operand.
        pub rt: u8,
        /// The *imm* operand.
        pub imm: u16,
    }
}

pub mod j {
    /// A J-type instruction, where 'J' stands for 'jump'.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Instr {
        /// The word index of the jump target within the current 256 MiB region.
        pub target: u32,
    }
}

pub mod r {
    /// An R-type instruction, where 'R' stands for 'register'.
    ///
    /// Coprocessor instructions, `syscall` and `break` also use this layout, reading their
    /// sub-operation and code fields from it.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Instr {
        /// The *rs* operand.
        pub rs: u8,
        /// The *rt* operand.
        pub rt: u8,
        /// The *rd* operand.
        ///
        /// This is commonly used as a destination register.
        pub rd: u8,
        /// The *shamt* operand, which stands for 'shift amount'.
        pub shamt: u8,
        /// The *funct* operand.
        pub funct: u8,
    }
}

/// Computes the virtual address of a load or store.
pub(crate) fn calc_vaddr(base: u32, offset: u16) -> u32 {
    let offset = sign_extend_16(offset);
    tracing::trace!(
        "Calc. virtual address (base={:#010x}, offset={:#010x})",
        base,
        offset,
    );

    base.wrapping_add(offset)
}

/// Computes the target of a PC-relative branch located at `addr`.
pub(crate) fn branch_target(addr: u32, offset: u16) -> u32 {
    addr.wrapping_add(4).wrapping_add(sign_extend_16(offset) << 2)
}

/// Computes the target of a `j` or `jal` located at `addr`.
fn jump_target(addr: u32, target: u32) -> u32 {
    (addr.wrapping_add(4) & 0xf000_0000) | (target << 2)
}

/// The return address of a linking jump or branch located at `addr`.
fn return_addr(addr: u32) -> u32 {
    addr.wrapping_add(8)
}

fn overflow() -> Exception {
    Exception::new(exc::code::INTEGER_OVERFLOW)
}

#[inline(always)]
fn log_enter_function(target_addr: u32, ret_addr: u32, sp: u32) {
    tracing::debug!(
        "Entering function `sub_{:08X}` (ra={:#010x}, sp={:#010x})",
        target_addr,
        ret_addr,
        sp,
    );
}

macro_rules! parse_operand {
    ($src:expr, %($field:tt)) => {
        asm::Operand::Reg($src.$field)
    };
    ($src:expr, #(s)) => {
        asm::Operand::SInt(i32::from($src.imm as i16))
    };
    ($src:expr, #(u)) => {
        asm::Operand::UInt($src.imm.into())
    };
    ($src:expr, ^()) => {
        asm::Operand::UInt($src.shamt.into())
    };
    ($src:expr, *()) => {
        asm::Operand::UInt($src.target << 2)
    };
    ($src:expr, >()) => {
        asm::Operand::SInt(i32::from($src.imm as i16) << 2)
    };
    ($src:expr, @()) => {
        asm::Operand::Mem {
            base: $src.rs,
            offset: i32::from($src.imm as i16),
        }
    };
    ($src:expr, &()) => {
        asm::Operand::UInt($src.code() >> 6)
    };
    ($src:expr, ~()) => {
        asm::Operand::UInt($src.code())
    };
}

macro_rules! def_instr_and_op_kind {
    (
        $(
            {
                name: $variant_name:ident,
                type: $ty:ident,
                asm: [
                    $display_name:literal
                    $(
                        $kind:tt($($arg:tt)?)
                    ),* $(,)?
                ],
                fn: |$ctx:ident| $body:block $(,)?
            }
        ),* $(,)?
    ) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub enum Instr {
            $(
                $variant_name($ty::Instr),
            )*
        }

        /// The operation an [`Instr`] performs, without its operands.
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub enum Kind {
            $(
                $variant_name,
            )*
        }

        impl Instr {
            /// Decodes an opcode, or returns `None` if it encodes no instruction.
            pub fn decode(code: u32) -> Option<Self> {
                match Self::try_decode_kind(code)? {
                    $(
                        Kind::$variant_name => {
                            Some(Self::$variant_name($ty::Instr::decode(code)))
                        }
                    )*
                }
            }

            pub fn kind(&self) -> Kind {
                match self {
                    $(
                        Self::$variant_name(_) => Kind::$variant_name,
                    )*
                }
            }

            pub fn asm(&self) -> Asm {
                match *self {
                    $(
                        #[allow(unused_variables)]
                        Self::$variant_name(inner) => {
                            Asm {
                                op_name: $display_name.to_string(),
                                operands: vec![
                                    $(
                                        parse_operand!(inner, $kind($($arg)?))
                                    ),*
                                ],
                            }
                        }
                    )*
                }
            }

            /// Executes this instruction, located at `addr`, on the given CPU.
            pub(crate) fn execute(self, cpu: &mut Cpu<'_, '_>, addr: u32) -> Result<(), Exception> {
                match self {
                    $(
                        Self::$variant_name(instr) => {
                            #[allow(dead_code)]
                            struct Context<'a, 's, 'b> {
                                cpu: &'a mut Cpu<'s, 'b>,
                                instr: $ty::Instr,
                                addr: u32,
                            }

                            fn op($ctx: Context<'_, '_, '_>) -> Result<(), Exception> $body

                            op(Context { cpu, instr, addr })
                        }
                    )*
                }
            }
        }
    };
}

def_instr_and_op_kind!(
    {
        name: Add,
        type: r,
        asm: ["add" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let lhs = ctx.cpu.gpr(ctx.instr.rs) as i32;
            let result = lhs.checked_add(ctx.cpu.gpr(ctx.instr.rt) as i32).ok_or_else(overflow)?;
            ctx.cpu.set_gpr(ctx.instr.rd, result as u32);

            Ok(())
        },
    },
    {
        name: Addi,
        type: i,
        asm: ["addi" %(rt), %(rs), #(s)],
        fn: |ctx| {
            let lhs = ctx.cpu.gpr(ctx.instr.rs) as i32;
            let result = lhs.checked_add(i32::from(ctx.instr.imm as i16)).ok_or_else(overflow)?;
            ctx.cpu.set_gpr(ctx.instr.rt, result as u32);

            Ok(())
        },
    },
    {
        name: Addiu,
        type: i,
        asm: ["addiu" %(rt), %(rs), #(s)],
        fn: |ctx| {
            // Despite the name, the immediate is sign-extended; only the overflow trap is gone.
            let result = ctx.cpu.gpr(ctx.instr.rs).wrapping_add(sign_extend_16(ctx.instr.imm));
            ctx.cpu.set_gpr(ctx.instr.rt, result);

            Ok(())
        },
    },
    {
        name: Addu,
        type: r,
        asm: ["addu" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs).wrapping_add(ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: And,
        type: r,
        asm: ["and" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) & ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Andi,
        type: i,
        asm: ["andi" %(rt), %(rs), #(u)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) & u32::from(ctx.instr.imm);
            ctx.cpu.set_gpr(ctx.instr.rt, result);

            Ok(())
        },
    },
    {
        name: BCond,
        type: i,
        asm: ["bcond" %(rs), %(rt), >()],
        fn: |ctx| {
            // Bit 0 of *rt* selects BGEZ over BLTZ; 0x10 and 0x11 also link. Other *rt* values
            // alias these four.
            let value = ctx.cpu.gpr(ctx.instr.rs) as i32;
            let taken = if ctx.instr.rt & 1 == 1 { value >= 0 } else { value < 0 };

            if ctx.instr.rt & 0x1e == 0x10 {
                ctx.cpu.set_gpr(31, return_addr(ctx.addr));
            }
            ctx.cpu.branch(taken, branch_target(ctx.addr, ctx.instr.imm));

            Ok(())
        },
    },
    {
        name: Beq,
        type: i,
        asm: ["beq" %(rs), %(rt), >()],
        fn: |ctx| {
            let taken = ctx.cpu.gpr(ctx.instr.rs) == ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.branch(taken, branch_target(ctx.addr, ctx.instr.imm));

            Ok(())
        },
    },
    {
        name: Bgtz,
        type: i,
        asm: ["bgtz" %(rs), >()],
        fn: |ctx| {
            let taken = (ctx.cpu.gpr(ctx.instr.rs) as i32) > 0;
            ctx.cpu.branch(taken, branch_target(ctx.addr, ctx.instr.imm));

            Ok(())
        },
    },
    {
        name: Blez,
        type: i,
        asm: ["blez" %(rs), >()],
        fn: |ctx| {
            let taken = (ctx.cpu.gpr(ctx.instr.rs) as i32) <= 0;
            ctx.cpu.branch(taken, branch_target(ctx.addr, ctx.instr.imm));

            Ok(())
        },
    },
    {
        name: Bne,
        type: i,
        asm: ["bne" %(rs), %(rt), >()],
        fn: |ctx| {
            let taken = ctx.cpu.gpr(ctx.instr.rs) != ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.branch(taken, branch_target(ctx.addr, ctx.instr.imm));

            Ok(())
        },
    },
    {
        name: Break,
        type: r,
        asm: ["break" &()],
        fn: |ctx| {
            let code = ctx.instr.code() >> 6;
            match sym::for_break(code) {
                Some(name) => tracing::debug!("break: {}", name),
                None => tracing::debug!("break {:#x} at {:#010x}", code, ctx.addr),
            }

            Err(Exception::new(exc::code::BREAKPOINT))
        },
    },
    {
        name: Cop0,
        type: r,
        asm: ["cop0" ~()],
        fn: |ctx| {
            ctx.cpu.execute_cop0(ctx.instr, ctx.addr)
        },
    },
    {
        name: Cop1,
        type: r,
        asm: ["cop1" ~()],
        fn: |ctx| {
            ctx.cpu.require_cop(1)
        },
    },
    {
        name: Cop2,
        type: r,
        asm: ["cop2" ~()],
        fn: |ctx| {
            ctx.cpu.execute_cop2(ctx.instr, ctx.addr)
        },
    },
    {
        name: Cop3,
        type: r,
        asm: ["cop3" ~()],
        fn: |ctx| {
            ctx.cpu.require_cop(3)
        },
    },
    {
        name: Div,
        type: r,
        asm: ["div" %(rs), %(rt)],
        fn: |ctx| {
            let (lhs, rhs) = (ctx.cpu.gpr(ctx.instr.rs), ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.issue_muldiv(muldiv::Op::Div, lhs, rhs);

            Ok(())
        },
    },
    {
        name: Divu,
        type: r,
        asm: ["divu" %(rs), %(rt)],
        fn: |ctx| {
            let (lhs, rhs) = (ctx.cpu.gpr(ctx.instr.rs), ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.issue_muldiv(muldiv::Op::Divu, lhs, rhs);

            Ok(())
        },
    },
    {
        name: J,
        type: j,
        asm: ["j" *()],
        fn: |ctx| {
            ctx.cpu.branch(true, jump_target(ctx.addr, ctx.instr.target));

            Ok(())
        },
    },
    {
        name: Jal,
        type: j,
        asm: ["jal" *()],
        fn: |ctx| {
            let target = jump_target(ctx.addr, ctx.instr.target);
            let ret_addr = return_addr(ctx.addr);
            log_enter_function(target, ret_addr, ctx.cpu.gpr(29));

            ctx.cpu.set_gpr(31, ret_addr);
            ctx.cpu.branch(true, target);

            Ok(())
        },
    },
    {
        name: Jalr,
        type: r,
        asm: ["jalr" %(rd), %(rs)],
        fn: |ctx| {
            // Read the target before linking, in case *rd* and *rs* are the same register.
            let target = ctx.cpu.gpr(ctx.instr.rs);
            let ret_addr = return_addr(ctx.addr);
            log_enter_function(target, ret_addr, ctx.cpu.gpr(29));

            ctx.cpu.set_gpr(ctx.instr.rd, ret_addr);
            ctx.cpu.branch(true, target);

            Ok(())
        },
    },
    {
        name: Jr,
        type: r,
        asm: ["jr" %(rs)],
        fn: |ctx| {
            let target = ctx.cpu.gpr(ctx.instr.rs);
            ctx.cpu.branch(true, target);

            Ok(())
        },
    },
    {
        name: Lb,
        type: i,
        asm: ["lb" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.load_8(vaddr)?;
            ctx.cpu.schedule_load(ctx.instr.rt, sign_extend_8(value as u8));

            Ok(())
        },
    },
    {
        name: Lbu,
        type: i,
        asm: ["lbu" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.load_8(vaddr)?;
            ctx.cpu.schedule_load(ctx.instr.rt, value);

            Ok(())
        },
    },
    {
        name: Lh,
        type: i,
        asm: ["lh" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.load_16(vaddr)?;
            ctx.cpu.schedule_load(ctx.instr.rt, sign_extend_16(value as u16));

            Ok(())
        },
    },
    {
        name: Lhu,
        type: i,
        asm: ["lhu" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.load_16(vaddr)?;
            ctx.cpu.schedule_load(ctx.instr.rt, value);

            Ok(())
        },
    },
    {
        name: Lui,
        type: i,
        asm: ["lui" %(rt), #(u)],
        fn: |ctx| {
            ctx.cpu.set_gpr(ctx.instr.rt, u32::from(ctx.instr.imm) << 16);

            Ok(())
        },
    },
    {
        name: Lw,
        type: i,
        asm: ["lw" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.load_32(vaddr)?;
            ctx.cpu.schedule_load(ctx.instr.rt, value);

            Ok(())
        },
    },
    {
        name: Lwc0,
        type: i,
        asm: ["lwc0" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.load_cop(0, ctx.instr)
        },
    },
    {
        name: Lwc1,
        type: i,
        asm: ["lwc1" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.load_cop(1, ctx.instr)
        },
    },
    {
        name: Lwc2,
        type: i,
        asm: ["lwc2" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.load_cop(2, ctx.instr)
        },
    },
    {
        name: Lwc3,
        type: i,
        asm: ["lwc3" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.load_cop(3, ctx.instr)
        },
    },
    {
        name: Lwl,
        type: i,
        asm: ["lwl" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let word = ctx.cpu.load_32(vaddr & !0b11)?;
            let shift = (vaddr & 0b11) * 8;
            // LWL and LWR merge with a load still in flight to the same register.
            let current = ctx.cpu.pending_or_gpr(ctx.instr.rt);
            let value = (current & (0x00ff_ffff >> shift)) | (word << (24 - shift));
            ctx.cpu.schedule_load(ctx.instr.rt, value);

            Ok(())
        },
    },
    {
        name: Lwr,
        type: i,
        asm: ["lwr" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let word = ctx.cpu.load_32(vaddr & !0b11)?;
            let shift = (vaddr & 0b11) * 8;
            let current = ctx.cpu.pending_or_gpr(ctx.instr.rt);
            let value = (current & (0xffff_ff00 << (24 - shift))) | (word >> shift);
            ctx.cpu.schedule_load(ctx.instr.rt, value);

            Ok(())
        },
    },
    {
        name: Mfhi,
        type: r,
        asm: ["mfhi" %(rd)],
        fn: |ctx| {
            let stall = ctx.cpu.resolve_muldiv();
            ctx.cpu.stall(stall);
            let value = ctx.cpu.state.reg.hi();
            ctx.cpu.set_gpr(ctx.instr.rd, value);

            Ok(())
        },
    },
    {
        name: Mflo,
        type: r,
        asm: ["mflo" %(rd)],
        fn: |ctx| {
            let stall = ctx.cpu.resolve_muldiv();
            ctx.cpu.stall(stall);
            let value = ctx.cpu.state.reg.lo();
            ctx.cpu.set_gpr(ctx.instr.rd, value);

            Ok(())
        },
    },
    {
        name: Mthi,
        type: r,
        asm: ["mthi" %(rs)],
        fn: |ctx| {
            // Writes don't interlock, but the pending result must not land on top of this one.
            ctx.cpu.resolve_muldiv();
            let value = ctx.cpu.gpr(ctx.instr.rs);
            *ctx.cpu.state.reg.hi_mut() = value;

            Ok(())
        },
    },
    {
        name: Mtlo,
        type: r,
        asm: ["mtlo" %(rs)],
        fn: |ctx| {
            ctx.cpu.resolve_muldiv();
            let value = ctx.cpu.gpr(ctx.instr.rs);
            *ctx.cpu.state.reg.lo_mut() = value;

            Ok(())
        },
    },
    {
        name: Mult,
        type: r,
        asm: ["mult" %(rs), %(rt)],
        fn: |ctx| {
            let (lhs, rhs) = (ctx.cpu.gpr(ctx.instr.rs), ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.issue_muldiv(muldiv::Op::Mult, lhs, rhs);

            Ok(())
        },
    },
    {
        name: Multu,
        type: r,
        asm: ["multu" %(rs), %(rt)],
        fn: |ctx| {
            let (lhs, rhs) = (ctx.cpu.gpr(ctx.instr.rs), ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.issue_muldiv(muldiv::Op::Multu, lhs, rhs);

            Ok(())
        },
    },
    {
        name: Nor,
        type: r,
        asm: ["nor" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = !(ctx.cpu.gpr(ctx.instr.rs) | ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Or,
        type: r,
        asm: ["or" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) | ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Ori,
        type: i,
        asm: ["ori" %(rt), %(rs), #(u)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) | u32::from(ctx.instr.imm);
            ctx.cpu.set_gpr(ctx.instr.rt, result);

            Ok(())
        },
    },
    {
        name: Sb,
        type: i,
        asm: ["sb" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.store_8(vaddr, value)
        },
    },
    {
        name: Sh,
        type: i,
        asm: ["sh" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.store_16(vaddr, value)
        },
    },
    {
        name: Sll,
        type: r,
        asm: ["sll" %(rd), %(rt), ^()],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rt) << ctx.instr.shamt;
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Sllv,
        type: r,
        asm: ["sllv" %(rd), %(rt), %(rs)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rt) << (ctx.cpu.gpr(ctx.instr.rs) & 31);
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Slt,
        type: r,
        asm: ["slt" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = (ctx.cpu.gpr(ctx.instr.rs) as i32) < (ctx.cpu.gpr(ctx.instr.rt) as i32);
            ctx.cpu.set_gpr(ctx.instr.rd, result.into());

            Ok(())
        },
    },
    {
        name: Slti,
        type: i,
        asm: ["slti" %(rt), %(rs), #(s)],
        fn: |ctx| {
            let result = (ctx.cpu.gpr(ctx.instr.rs) as i32) < i32::from(ctx.instr.imm as i16);
            ctx.cpu.set_gpr(ctx.instr.rt, result.into());

            Ok(())
        },
    },
    {
        name: Sltiu,
        type: i,
        asm: ["sltiu" %(rt), %(rs), #(s)],
        fn: |ctx| {
            // The immediate is sign-extended, then compared unsigned.
            let result = ctx.cpu.gpr(ctx.instr.rs) < sign_extend_16(ctx.instr.imm);
            ctx.cpu.set_gpr(ctx.instr.rt, result.into());

            Ok(())
        },
    },
    {
        name: Sltu,
        type: r,
        asm: ["sltu" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) < ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.set_gpr(ctx.instr.rd, result.into());

            Ok(())
        },
    },
    {
        name: Sra,
        type: r,
        asm: ["sra" %(rd), %(rt), ^()],
        fn: |ctx| {
            let result = (ctx.cpu.gpr(ctx.instr.rt) as i32) >> ctx.instr.shamt;
            ctx.cpu.set_gpr(ctx.instr.rd, result as u32);

            Ok(())
        },
    },
    {
        name: Srav,
        type: r,
        asm: ["srav" %(rd), %(rt), %(rs)],
        fn: |ctx| {
            let result = (ctx.cpu.gpr(ctx.instr.rt) as i32) >> (ctx.cpu.gpr(ctx.instr.rs) & 31);
            ctx.cpu.set_gpr(ctx.instr.rd, result as u32);

            Ok(())
        },
    },
    {
        name: Srl,
        type: r,
        asm: ["srl" %(rd), %(rt), ^()],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rt) >> ctx.instr.shamt;
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Srlv,
        type: r,
        asm: ["srlv" %(rd), %(rt), %(rs)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rt) >> (ctx.cpu.gpr(ctx.instr.rs) & 31);
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Sub,
        type: r,
        asm: ["sub" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let lhs = ctx.cpu.gpr(ctx.instr.rs) as i32;
            let result = lhs.checked_sub(ctx.cpu.gpr(ctx.instr.rt) as i32).ok_or_else(overflow)?;
            ctx.cpu.set_gpr(ctx.instr.rd, result as u32);

            Ok(())
        },
    },
    {
        name: Subu,
        type: r,
        asm: ["subu" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs).wrapping_sub(ctx.cpu.gpr(ctx.instr.rt));
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Sw,
        type: i,
        asm: ["sw" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let value = ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.store_32(vaddr, value)
        },
    },
    {
        name: Swc0,
        type: i,
        asm: ["swc0" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.store_cop(0, ctx.instr)
        },
    },
    {
        name: Swc1,
        type: i,
        asm: ["swc1" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.store_cop(1, ctx.instr)
        },
    },
    {
        name: Swc2,
        type: i,
        asm: ["swc2" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.store_cop(2, ctx.instr)
        },
    },
    {
        name: Swc3,
        type: i,
        asm: ["swc3" %(rt), @()],
        fn: |ctx| {
            ctx.cpu.store_cop(3, ctx.instr)
        },
    },
    {
        name: Swl,
        type: i,
        asm: ["swl" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let lane = vaddr & 0b11;
            let value = ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.store_lanes(vaddr, value >> (24 - 8 * lane), 0, lane)
        },
    },
    {
        name: Swr,
        type: i,
        asm: ["swr" %(rt), @()],
        fn: |ctx| {
            let vaddr = calc_vaddr(ctx.cpu.gpr(ctx.instr.rs), ctx.instr.imm);
            let lane = vaddr & 0b11;
            let value = ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.store_lanes(vaddr, value << (8 * lane), lane, 3)
        },
    },
    {
        name: Syscall,
        type: r,
        asm: ["syscall" &()],
        fn: |ctx| {
            tracing::debug!("syscall: {}", sym::for_syscall(ctx.cpu.gpr(4)));

            Err(Exception::new(exc::code::SYSCALL))
        },
    },
    {
        name: Xor,
        type: r,
        asm: ["xor" %(rd), %(rs), %(rt)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) ^ ctx.cpu.gpr(ctx.instr.rt);
            ctx.cpu.set_gpr(ctx.instr.rd, result);

            Ok(())
        },
    },
    {
        name: Xori,
        type: i,
        asm: ["xori" %(rt), %(rs), #(u)],
        fn: |ctx| {
            let result = ctx.cpu.gpr(ctx.instr.rs) ^ u32::from(ctx.instr.imm);
            ctx.cpu.set_gpr(ctx.instr.rt, result);

            Ok(())
        },
    },
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asm as enc, Fixture};

    #[test]
    fn disassembly() {
        let asm = |code| Instr::decode(code).map(|it| it.asm().to_string());

        assert_eq!(asm(0x27bd_ffe8).as_deref(), Some("addiu r29, r29, -0x18"));
        assert_eq!(asm(0x8fbf_0014).as_deref(), Some("lw r31, 0x14(r29)"));
        assert_eq!(asm(0x0bf0_0054).as_deref(), Some("j 0xfc00150"));
        assert_eq!(asm(0x0000_000c).as_deref(), Some("syscall 0"));
        assert_eq!(asm(0x4200_0010).as_deref(), Some("cop0 0x2000010"));
        assert_eq!(asm(0x0000_0001), None);
    }

    #[test]
    fn targets() {
        assert_eq!(branch_target(0x8000_0100, 0xffff), 0x8000_0100);
        assert_eq!(branch_target(0x8000_0100, 0x0001), 0x8000_0108);
        assert_eq!(jump_target(0xbfc0_0000, 0x0010_0000), 0xb040_0000);
    }

    #[test]
    fn arithmetic_and_logic() {
        let mut fixture = Fixture::new();
        fixture.run_program(
            &[
                enc::addiu(8, 0, -5i16 as u16),
                enc::ori(9, 0, 3),
                enc::r_type(8, 9, 10, 0, 0x2a),  // slt r10, r8, r9
                enc::r_type(8, 9, 11, 0, 0x2b),  // sltu r11, r8, r9
                enc::r_type(0, 8, 12, 1, 0x03),  // sra r12, r8, 1
                enc::r_type(0, 8, 13, 28, 0x02), // srl r13, r8, 28
                enc::r_type(8, 9, 14, 0, 0x27),  // nor r14, r8, r9
                enc::i_type(0x0b, 9, 15, 0xffff), // sltiu r15, r9, -1
            ],
            8,
        );

        let reg = &fixture.state.reg;
        assert_eq!(reg.gpr(10), 1);
        assert_eq!(reg.gpr(11), 0);
        assert_eq!(reg.gpr(12), -3i32 as u32);
        assert_eq!(reg.gpr(13), 0xf);
        assert_eq!(reg.gpr(14), !(0xffff_fffb | 3));
        assert_eq!(reg.gpr(15), 1);
    }

    #[test]
    fn signed_overflow_traps_without_writing() {
        let mut fixture = Fixture::new();
        fixture.run_program(
            &[
                enc::lui(8, 0x7fff),
                enc::ori(8, 8, 0xffff),
                enc::addiu(9, 0, 0x1234),
                enc::i_type(0x08, 8, 9, 1), // addi r9, r8, 1
            ],
            4,
        );

        assert_eq!(fixture.state.reg.cop0.cause.exc_code(), exc::code::INTEGER_OVERFLOW);
        assert_eq!(fixture.state.reg.gpr(9), 0x1234);
        assert_eq!(fixture.state.reg.cop0.epc, Fixture::PROGRAM_ADDR + 12);
    }

    #[test]
    fn unaligned_loads_merge() {
        let mut fixture = Fixture::new();
        fixture.main_ram.set_word(0x2000, 0x4433_2211);
        fixture.main_ram.set_word(0x2004, 0x8877_6655);
        fixture.run_program(
            &[
                enc::lui(8, 0x8000),
                // lwr r9, 0x2001(r8); lwl r9, 0x2004(r8)
                enc::i_type(0x26, 8, 9, 0x2001),
                enc::i_type(0x22, 8, 9, 0x2004),
                enc::nop(),
            ],
            4,
        );

        assert_eq!(fixture.state.reg.gpr(9), 0x5544_3322);
    }

    #[test]
    fn unaligned_stores_merge() {
        let mut fixture = Fixture::new();
        fixture.main_ram.set_word(0x2000, 0xaaaa_aaaa);
        fixture.main_ram.set_word(0x2004, 0xbbbb_bbbb);
        fixture.run_program(
            &[
                enc::lui(8, 0x8000),
                enc::lui(9, 0x1122),
                enc::ori(9, 9, 0x3344),
                // swr r9, 0x2002(r8); swl r9, 0x2005(r8)
                enc::i_type(0x2e, 8, 9, 0x2002),
                enc::i_type(0x2a, 8, 9, 0x2005),
            ],
            5,
        );

        assert_eq!(fixture.main_ram.word(0x2000), 0x3344_aaaa);
        assert_eq!(fixture.main_ram.word(0x2004), 0xbbbb_1122);
    }

    #[test]
    fn linking_branch_links_when_not_taken() {
        let mut fixture = Fixture::new();
        fixture.run_program(
            &[
                enc::addiu(8, 0, 1),
                // bltzal r8, +4
                enc::i_type(0x01, 8, 0x10, 4),
                enc::nop(),
            ],
            3,
        );

        assert_eq!(fixture.state.reg.gpr(31), Fixture::PROGRAM_ADDR + 12);
        assert_eq!(fixture.state.reg.pc(), Fixture::PROGRAM_ADDR + 12);
    }

    #[test]
    fn jal_and_jr() {
        let mut fixture = Fixture::new();
        let base = Fixture::PROGRAM_ADDR;
        fixture.run_program(
            &[
                enc::jal(base + 0x10),
                enc::addiu(8, 0, 7),
                enc::nop(),
                enc::nop(),
                // The callee.
                enc::jr(31),
                enc::addiu(9, 0, 9),
            ],
            4,
        );

        let reg = &fixture.state.reg;
        assert_eq!(reg.gpr(31), base + 8);
        assert_eq!((reg.gpr(8), reg.gpr(9)), (7, 9));
        assert_eq!(reg.pc(), base + 8);
    }
}
