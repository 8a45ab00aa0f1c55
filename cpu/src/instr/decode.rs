// SPDX-License-Identifier: MPL-2.0

//! Instruction decoding.

use super::{i, j, r, Instr, Kind};

impl Instr {
    pub const OP_SPECIAL: u8 = 0;

    /// Determines the kind of instruction an opcode encodes, if any.
    pub fn try_decode_kind(code: u32) -> Option<Kind> {
        let op = field::op(code);

        if op == Self::OP_SPECIAL {
            Kind::try_decode_special(field::funct(code))
        } else {
            Kind::try_decode_normal(op)
        }
    }
}

pub mod field {
    //! Instruction word fields.

    macro_rules! def_field {
        ($fn_name:ident, $shift:literal, $width:literal, $ty:ty) => {
            #[inline(always)]
            pub fn $fn_name(code: u32) -> $ty {
                ((code >> $shift) & ((1 << $width) - 1)) as $ty
            }
        };
    }

    def_field!(funct, 0, 6, u8);
    def_field!(shamt, 6, 5, u8);
    def_field!(rd, 11, 5, u8);
    def_field!(rt, 16, 5, u8);
    def_field!(rs, 21, 5, u8);
    def_field!(imm, 0, 16, u16);
    def_field!(target, 0, 26, u32);
    def_field!(op, 26, 6, u8);
}

impl Kind {
    pub fn try_decode_normal(op: u8) -> Option<Self> {
        match op {
            // SPECIAL is decoded by `funct`.
            0b000_000 => None,
            0b000_001 => Some(Self::BCond),
            0b000_010 => Some(Self::J),
            0b000_011 => Some(Self::Jal),
            0b000_100 => Some(Self::Beq),
            0b000_101 => Some(Self::Bne),
            0b000_110 => Some(Self::Blez),
            0b000_111 => Some(Self::Bgtz),

            0b001_000 => Some(Self::Addi),
            0b001_001 => Some(Self::Addiu),
            0b001_010 => Some(Self::Slti),
            0b001_011 => Some(Self::Sltiu),
            0b001_100 => Some(Self::Andi),
            0b001_101 => Some(Self::Ori),
            0b001_110 => Some(Self::Xori),
            0b001_111 => Some(Self::Lui),

            0b010_000 => Some(Self::Cop0),
            0b010_001 => Some(Self::Cop1),
            0b010_010 => Some(Self::Cop2),
            0b010_011 => Some(Self::Cop3),

            0b100_000 => Some(Self::Lb),
            0b100_001 => Some(Self::Lh),
            0b100_010 => Some(Self::Lwl),
            0b100_011 => Some(Self::Lw),
            0b100_100 => Some(Self::Lbu),
            0b100_101 => Some(Self::Lhu),
            0b100_110 => Some(Self::Lwr),

            0b101_000 => Some(Self::Sb),
            0b101_001 => Some(Self::Sh),
            0b101_010 => Some(Self::Swl),
            0b101_011 => Some(Self::Sw),
            0b101_110 => Some(Self::Swr),

            0b110_000 => Some(Self::Lwc0),
            0b110_001 => Some(Self::Lwc1),
            0b110_010 => Some(Self::Lwc2),
            0b110_011 => Some(Self::Lwc3),

            0b111_000 => Some(Self::Swc0),
            0b111_001 => Some(Self::Swc1),
            0b111_010 => Some(Self::Swc2),
            0b111_011 => Some(Self::Swc3),

            _ => None,
        }
    }

    pub fn try_decode_special(funct: u8) -> Option<Self> {
        match funct {
            0b000_000 => Some(Self::Sll),
            0b000_010 => Some(Self::Srl),
            0b000_011 => Some(Self::Sra),
            0b000_100 => Some(Self::Sllv),
            0b000_110 => Some(Self::Srlv),
            0b000_111 => Some(Self::Srav),

            0b001_000 => Some(Self::Jr),
            0b001_001 => Some(Self::Jalr),
            0b001_100 => Some(Self::Syscall),
            0b001_101 => Some(Self::Break),

            0b010_000 => Some(Self::Mfhi),
            0b010_001 => Some(Self::Mthi),
            0b010_010 => Some(Self::Mflo),
            0b010_011 => Some(Self::Mtlo),

            0b011_000 => Some(Self::Mult),
            0b011_001 => Some(Self::Multu),
            0b011_010 => Some(Self::Div),
            0b011_011 => Some(Self::Divu),

            0b100_000 => Some(Self::Add),
            0b100_001 => Some(Self::Addu),
            0b100_010 => Some(Self::Sub),
            0b100_011 => Some(Self::Subu),
            0b100_100 => Some(Self::And),
            0b100_101 => Some(Self::Or),
            0b100_110 => Some(Self::Xor),
            0b100_111 => Some(Self::Nor),

            0b101_010 => Some(Self::Slt),
            0b101_011 => Some(Self::Sltu),

            _ => None,
        }
    }
}

impl i::Instr {
    pub fn decode(code: u32) -> Self {
        Self {
            rs: field::rs(code),
            rt: field::rt(code),
            imm: field::imm(code),
        }
    }
}

impl j::Instr {
    pub fn decode(code: u32) -> Self {
        Self {
            target: field::target(code),
        }
    }
}

impl r::Instr {
    pub fn decode(code: u32) -> Self {
        Self {
            rs: field::rs(code),
            rt: field::rt(code),
            rd: field::rd(code),
            shamt: field::shamt(code),
            funct: field::funct(code),
        }
    }

    /// Reassembles the low 26 bits of the instruction word.
    pub fn code(&self) -> u32 {
        (u32::from(self.rs) << 21)
            | (u32::from(self.rt) << 16)
            | (u32::from(self.rd) << 11)
            | (u32::from(self.shamt) << 6)
            | u32::from(self.funct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields() {
        // addiu r29, r29, -0x18
        let code = 0x27bd_ffe8;
        assert_eq!(field::op(code), 0b001_001);
        assert_eq!(field::rs(code), 29);
        assert_eq!(field::rt(code), 29);
        assert_eq!(field::imm(code), 0xffe8);
    }

    #[test]
    fn r_type_code_is_lossless() {
        for _ in 0..256 {
            let code = rand::random::<u32>() & 0x03ff_ffff;

            assert_eq!(r::Instr::decode(code).code(), code);
        }
    }

    #[test]
    fn reserved_encodings() {
        assert_eq!(Instr::try_decode_kind(0x0000_0001), None);
        assert_eq!(Instr::try_decode_kind(0x5000_0000), None);
        assert_eq!(Instr::try_decode_kind(0xfc00_0000), None);
        assert_eq!(Instr::try_decode_kind(0x0000_0000), Some(Kind::Sll));
        assert_eq!(Instr::try_decode_kind(0x4a18_0001), Some(Kind::Cop2));
    }
}
