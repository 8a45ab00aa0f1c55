// SPDX-License-Identifier: MPL-2.0

//! Disassembly.

use std::fmt;

/// A disassembled instruction.
#[derive(Clone, Debug)]
pub struct Asm {
    pub op_name: String,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Asm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            return f.write_str(&self.op_name);
        }

        write!(
            f,
            "{} {}",
            self.op_name,
            self.operands
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(", "),
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    Reg(u8),
    SInt(i32),
    UInt(u32),
    /// A base register plus a signed displacement.
    Mem { base: u8, offset: i32 },
}

macro_rules! format_int {
    ($value:expr, $abs_value:expr) => {
        if $abs_value < 0x10 {
            format!("{}", $value)
        } else if $value < 0 {
            format!("-{:#x}", $abs_value)
        } else {
            format!("{:#x}", $abs_value)
        }
    };
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Reg(it) => write!(f, "r{}", it),
            Self::SInt(it) => f.write_str(&format_int!(i64::from(it), i64::from(it).abs())),
            Self::UInt(it) => f.write_str(&format_int!(i64::from(it), i64::from(it))),
            Self::Mem { base, offset } => {
                write!(
                    f,
                    "{}(r{})",
                    format_int!(i64::from(offset), i64::from(offset).abs()),
                    base,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operands() {
        assert_eq!(Operand::Reg(31).to_string(), "r31");
        assert_eq!(Operand::SInt(-4).to_string(), "-4");
        assert_eq!(Operand::SInt(-0x18).to_string(), "-0x18");
        assert_eq!(Operand::UInt(0xbfc0).to_string(), "0xbfc0");
        assert_eq!(Operand::Mem { base: 29, offset: 0x14 }.to_string(), "0x14(r29)");
    }
}
