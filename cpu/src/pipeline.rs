// SPDX-License-Identifier: MPL-2.0

//! Delay-slot state.
//!
//! The R3000 pipeline is not simulated stage by stage. Only its two architecturally visible
//! hazards are kept:
//!
//! - a load's result reaches the register file one instruction late (the *load delay slot*), and
//! - the instruction after a branch or jump always executes (the *branch delay slot*).

use serde::{Deserialize, Serialize};

use crate::reg;

/// A load whose result is not yet visible.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum LoadDelay {
    #[default]
    None,
    Pending { reg: usize, value: u32 },
}

/// The effect of the previous instruction on control flow.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum BranchDelay {
    #[default]
    None,
    /// A branch was evaluated and not taken; the next instruction is still in its delay slot.
    NotTaken,
    /// Execution continues at the target after the delay slot.
    Pending(u32),
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// The load that commits once the current instruction retires.
    load: LoadDelay,
    /// The load issued by the current instruction.
    next_load: LoadDelay,
    branch: BranchDelay,
    /// The current instruction sits in a branch delay slot.
    pub in_delay_slot: bool,
    /// The branch owning the current delay slot was taken.
    pub branch_taken: bool,
}

impl Pipeline {
    pub fn load(&self) -> LoadDelay {
        self.load
    }

    pub fn branch(&self) -> BranchDelay {
        self.branch
    }

    /// Consumes the branch decision of the previous instruction, entering its delay slot if
    /// there was one. Returns the branch target, if taken.
    pub fn enter_slot(&mut self) -> Option<u32> {
        let branch = std::mem::take(&mut self.branch);
        self.in_delay_slot = branch != BranchDelay::None;
        self.branch_taken = matches!(branch, BranchDelay::Pending(_));

        match branch {
            BranchDelay::Pending(target) => Some(target),
            _ => None,
        }
    }

    pub fn set_branch(&mut self, taken: bool, target: u32) {
        self.branch = if taken {
            BranchDelay::Pending(target)
        } else {
            BranchDelay::NotTaken
        };
    }

    /// Drops the pending branch, as an exception does.
    pub fn clear_branch(&mut self) {
        self.branch = BranchDelay::None;
    }

    /// Issues a load into `reg`, visible after the next instruction.
    ///
    /// A load still in flight to the same register is discarded.
    pub fn schedule_load(&mut self, reg: usize, value: u32) {
        if reg == 0 {
            return;
        }
        self.cancel_load(reg);
        self.next_load = LoadDelay::Pending { reg, value };
    }

    /// Discards the in-flight load into `reg`, if any. Direct writes win over a load in its delay
    /// slot.
    pub fn cancel_load(&mut self, reg: usize) {
        if matches!(self.load, LoadDelay::Pending { reg: pending, .. } if pending == reg) {
            self.load = LoadDelay::None;
        }
    }

    /// The value of the in-flight load into `reg`, if any.
    pub fn in_flight(&self, reg: usize) -> Option<u32> {
        match self.load {
            LoadDelay::Pending { reg: pending, value } if pending == reg => Some(value),
            _ => None,
        }
    }

    /// Commits the in-flight load and moves the newly issued one into its delay slot.
    pub fn retire(&mut self, file: &mut reg::File) {
        if let LoadDelay::Pending { reg, value } = self.load {
            tracing::trace!("r{} <- {:#010x} (delayed)", reg, value);
            file.set_gpr(reg, value);
        }
        self.load = std::mem::take(&mut self.next_load);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_is_visible_after_one_instruction() {
        let mut pipeline = Pipeline::default();
        let mut file = reg::File::default();

        pipeline.schedule_load(8, 0x1234);
        pipeline.retire(&mut file);
        assert_eq!(file.gpr(8), 0);
        assert_eq!(pipeline.in_flight(8), Some(0x1234));

        pipeline.retire(&mut file);
        assert_eq!(file.gpr(8), 0x1234);
        assert_eq!(pipeline.load(), LoadDelay::None);
    }

    #[test]
    fn direct_write_wins() {
        let mut pipeline = Pipeline::default();
        let mut file = reg::File::default();

        pipeline.schedule_load(8, 0x1234);
        pipeline.retire(&mut file);
        pipeline.cancel_load(8);
        file.set_gpr(8, 0x5678);
        pipeline.retire(&mut file);

        assert_eq!(file.gpr(8), 0x5678);
    }

    #[test]
    fn back_to_back_loads_to_one_register() {
        let mut pipeline = Pipeline::default();
        let mut file = reg::File::default();

        pipeline.schedule_load(8, 1);
        pipeline.retire(&mut file);
        pipeline.schedule_load(8, 2);
        pipeline.retire(&mut file);
        assert_eq!(file.gpr(8), 0);

        pipeline.retire(&mut file);
        assert_eq!(file.gpr(8), 2);
    }

    #[test]
    fn untaken_branch_still_has_slot() {
        let mut pipeline = Pipeline::default();
        pipeline.set_branch(false, 0x8000_1000);

        assert_eq!(pipeline.enter_slot(), None);
        assert!(pipeline.in_delay_slot);
        assert!(!pipeline.branch_taken);

        assert_eq!(pipeline.enter_slot(), None);
        assert!(!pipeline.in_delay_slot);
    }
}
