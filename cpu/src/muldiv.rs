// SPDX-License-Identifier: MPL-2.0

//! The multiply/divide unit.
//!
//! Results are computed lazily: `MULT`, `MULTU`, `DIV` and `DIVU` only latch their operands,
//! and the result is written to HI/LO when software next touches either register. Reading too
//! early stalls the core for however many cycles of the operation's latency have not yet been
//! covered by instructions retired since it was issued.

use serde::{Deserialize, Serialize};

use crate::reg;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Mult,
    Multu,
    Div,
    Divu,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct Pending {
    op: Op,
    lhs: u32,
    rhs: u32,
    /// The retired-instruction count when the operation was issued.
    issued_at: u64,
    latency: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pending: Option<Pending>,
}

impl Op {
    /// The number of cycles until the result is ready.
    pub fn latency(self, lhs: u32) -> u32 {
        let magnitude = match self {
            Self::Mult if (lhs as i32) < 0 => !lhs,
            Self::Mult | Self::Multu => lhs,
            Self::Div | Self::Divu => return 36,
        };

        match magnitude {
            0..=0x0000_07ff => 6,
            0..=0x000f_ffff => 9,
            _ => 13,
        }
    }

    /// Computes `(hi, lo)`.
    pub fn compute(self, lhs: u32, rhs: u32) -> (u32, u32) {
        match self {
            Self::Mult => {
                let product = i64::from(lhs as i32) * i64::from(rhs as i32);

                ((product >> 32) as u32, product as u32)
            }
            Self::Multu => {
                let product = u64::from(lhs) * u64::from(rhs);

                ((product >> 32) as u32, product as u32)
            }
            Self::Div => {
                let (n, d) = (lhs as i32, rhs as i32);
                if d == 0 {
                    (lhs, if n >= 0 { 0xffff_ffff } else { 1 })
                } else if n == i32::MIN && d == -1 {
                    (0, 0x8000_0000)
                } else {
                    ((n % d) as u32, (n / d) as u32)
                }
            }
            Self::Divu => {
                if rhs == 0 {
                    (lhs, 0xffff_ffff)
                } else {
                    (lhs % rhs, lhs / rhs)
                }
            }
        }
    }
}

impl Unit {
    /// Starts an operation, replacing any that is still pending.
    pub fn issue(&mut self, op: Op, lhs: u32, rhs: u32, retired: u64) {
        self.pending = Some(Pending {
            op,
            lhs,
            rhs,
            issued_at: retired,
            latency: op.latency(lhs),
        });
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Writes the pending result, if any, into HI/LO and returns the number of cycles the core
    /// must stall for it.
    pub fn resolve(&mut self, file: &mut reg::File, retired: u64) -> u32 {
        let Some(pending) = self.pending.take() else {
            return 0;
        };

        let (hi, lo) = pending.op.compute(pending.lhs, pending.rhs);
        *file.hi_mut() = hi;
        *file.lo_mut() = lo;

        let elapsed = retired.saturating_sub(pending.issued_at);
        let stall = u64::from(pending.latency).saturating_sub(elapsed) as u32;
        if stall > 0 {
            tracing::trace!("{:?} interlock: stalling {} cycles", pending.op, stall);
        }

        stall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication() {
        assert_eq!(Op::Mult.compute(-3i32 as u32, 7), (0xffff_ffff, -21i32 as u32));
        assert_eq!(Op::Multu.compute(0xffff_ffff, 2), (1, 0xffff_fffe));

        for _ in 0..256 {
            let (a, b): (u32, u32) = (rand::random(), rand::random());
            let (hi, lo) = Op::Multu.compute(a, b);

            assert_eq!((u64::from(hi) << 32) | u64::from(lo), u64::from(a) * u64::from(b));
        }
    }

    #[test]
    fn division_edge_cases() {
        assert_eq!(Op::Div.compute(7, 0), (7, 0xffff_ffff));
        assert_eq!(Op::Div.compute(-7i32 as u32, 0), (-7i32 as u32, 1));
        assert_eq!(Op::Div.compute(0x8000_0000, -1i32 as u32), (0, 0x8000_0000));
        assert_eq!(Op::Div.compute(-7i32 as u32, 2), (-1i32 as u32, -3i32 as u32));
        assert_eq!(Op::Divu.compute(7, 0), (7, 0xffff_ffff));
        assert_eq!(Op::Divu.compute(7, 2), (1, 3));
    }

    #[test]
    fn multiply_latency_depends_on_magnitude() {
        assert_eq!(Op::Mult.latency(0x7ff), 6);
        assert_eq!(Op::Mult.latency(-1i32 as u32), 6);
        assert_eq!(Op::Mult.latency(0x800), 9);
        assert_eq!(Op::Multu.latency(0x0010_0000), 13);
        assert_eq!(Op::Divu.latency(1), 36);
    }

    #[test]
    fn early_read_stalls() {
        let mut unit = Unit::default();
        let mut file = reg::File::default();

        unit.issue(Op::Mult, 2, 3, 100);
        assert_eq!(unit.resolve(&mut file, 101), 5);
        assert_eq!(file.lo(), 6);

        unit.issue(Op::Div, 9, 2, 200);
        assert_eq!(unit.resolve(&mut file, 240), 0);
        assert_eq!((file.hi(), file.lo()), (1, 4));

        // Nothing pending.
        assert_eq!(unit.resolve(&mut file, 240), 0);
    }
}
