// SPDX-License-Identifier: MPL-2.0

//! An emulated R3000A, the CPU of the original PlayStation.
//!
//! The CPU is split into two halves. [`State`] owns everything inside the processor package:
//! registers, caches and delay-slot state. It is plain data and can be saved and restored with
//! serde. [`Cpu`] is a short-lived view that pairs a `State` with the [`Bus`] and the [`Gte`] for
//! as long as the host wants to execute instructions.

pub mod bus;
pub mod cache;
pub mod cop;
pub mod exc;
pub mod instr;
pub mod mmu;
pub mod muldiv;
pub mod pipeline;
pub mod reg;
mod sym;
#[cfg(test)]
mod testing;

use serde::{Deserialize, Serialize};

pub use bus::Bus;
pub use cache::Cache;
pub use cop::Gte;
pub use exc::Exception;
pub use instr::Instr;

use bus::Width;
use mmu::{Access, Segment};

/// The virtual address execution starts from after reset.
pub const RESET_VECTOR: u32 = 0xbfc0_0000;

/// Cycle costs.
mod cost {
    /// The base cost of every instruction.
    pub const INSTR: u64 = 1;
    /// The added cost of a fetch that bypasses the I-cache.
    pub const UNCACHED_FETCH: u64 = 4;
    /// The added cost of refilling an I-cache line.
    pub const I_CACHE_MISS: u64 = 4;
}

/// CPU configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The value of the PRId register.
    pub prid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { prid: 0x0000_0002 }
    }
}

/// Time as seen by the CPU.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    /// Elapsed CPU cycles.
    pub cycles: u64,
    /// Retired instructions.
    pub retired: u64,
    /// The cycle at which the GTE finishes its current command.
    pub gte_ready_at: u64,
}

/// The state of the CPU.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct State {
    pub cache: Cache,
    /// Delay-slot state.
    pub pipeline: pipeline::Pipeline,
    /// The register file.
    pub reg: reg::File,
    pub muldiv: muldiv::Unit,
    pub clock: Clock,
}

impl Default for State {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl State {
    /// Creates a new `State` as it is at power-on.
    pub fn new(config: &Config) -> Self {
        let mut reg = reg::File::default();
        *reg.pc_mut() = RESET_VECTOR;
        reg.cop0.status.set_bev(true);
        reg.cop0.prid = config.prid;

        Self {
            cache: Cache::default(),
            pipeline: pipeline::Pipeline::default(),
            reg,
            muldiv: muldiv::Unit::default(),
            clock: Clock::default(),
        }
    }

    /// Returns to the power-on state, keeping the configured PRId.
    pub fn reset(&mut self) {
        *self = Self::new(&Config { prid: self.reg.cop0.prid });
    }

    /// Attaches this CPU to a bus and a GTE so that it can execute instructions.
    pub fn connect_bus<'s, 'b>(&'s mut self, bus: Bus<'b>, gte: &'b mut dyn Gte) -> Cpu<'s, 'b> {
        Cpu { state: self, bus, gte }
    }
}

/// A CPU connected to its bus.
pub struct Cpu<'s, 'b> {
    state: &'s mut State,
    bus: Bus<'b>,
    gte: &'b mut dyn Gte,
}

impl<'s, 'b> Cpu<'s, 'b> {
    pub fn state(&self) -> &State {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        self.state
    }

    pub fn reg(&self) -> &reg::File {
        &self.state.reg
    }

    pub fn reg_mut(&mut self) -> &mut reg::File {
        &mut self.state.reg
    }

    pub fn bus(&self) -> &Bus<'b> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<'b> {
        &mut self.bus
    }

    /// Executes instructions until at least `budget` cycles have elapsed, returning the number
    /// that actually did.
    ///
    /// The last instruction may overrun the budget, e.g. when it stalls on the GTE or HI/LO.
    pub fn execute_run(&mut self, budget: u64) -> u64 {
        let mut elapsed = 0;
        while elapsed < budget {
            elapsed += self.execute_next_instr();
        }

        elapsed
    }

    /// Executes one instruction (or takes one interrupt), then advances the I/O devices by the
    /// cycles that took. Returns that number of cycles.
    pub fn execute_next_instr(&mut self) -> u64 {
        let start = self.state.clock.cycles;
        self.step();
        let elapsed = self.state.clock.cycles - start;
        self.bus.io.update(u32::try_from(elapsed).unwrap_or(u32::MAX));

        elapsed
    }

    fn step(&mut self) {
        let line = self.bus.io.int.line();
        self.state.reg.cop0.cause.set_ip2(line);

        let target = self.state.pipeline.enter_slot();
        let pc = self.state.reg.pc();
        *self.state.reg.pc_mut() = target.unwrap_or_else(|| pc.wrapping_add(4));
        self.state.clock.cycles += cost::INSTR;

        let cop0 = &self.state.reg.cop0;
        if cop0.status.ie_c() && (cop0.status.im() & cop0.cause.ip()) != 0 {
            tracing::debug!("Interrupt (pc={:#010x}, ip={:#04x})", pc, cop0.cause.ip());
            self.abort(Exception::interrupt(), pc);

            return;
        }

        let op = match self.check_exec_breakpoint(pc).and_then(|_| self.fetch(pc)) {
            Ok(op) => op,
            Err(exc) => {
                self.abort(exc, pc);

                return;
            }
        };

        let result = match Instr::decode(op) {
            Some(instr) => {
                tracing::trace!("{:08x}: {}", pc, instr.asm());

                instr.execute(self, pc)
            }
            None => {
                tracing::warn!("Executing malformed opcode {:#010x} at {:#010x} as a NOP", op, pc);

                Ok(())
            }
        };

        self.state.pipeline.retire(&mut self.state.reg);
        self.state.clock.retired += 1;

        if let Err(exc) = result {
            self.common_exception(exc, pc);
        }
    }

    /// Abandons the instruction at `pc` before it executes.
    fn abort(&mut self, exc: Exception, pc: u32) {
        self.state.pipeline.retire(&mut self.state.reg);
        self.common_exception(exc, pc);
    }

    fn fetch(&mut self, pc: u32) -> Result<u32, Exception> {
        if !Width::Word.is_aligned(pc) || (self.state.reg.status().ku_c() && pc & 0x8000_0000 != 0) {
            tracing::debug!("Bad fetch address {:#010x}", pc);

            return Err(Access::Fetch.address_error(pc));
        }

        let addr = mmu::translate(pc);
        if Segment::of(pc).is_cached() && self.state.cache.biu().is1() {
            let bus = &mut self.bus;
            let fetch = self
                .state
                .cache
                .i
                .fetch(addr, |addr| bus.read(addr, Width::Word))
                .map_err(|e| Access::Fetch.exception(e, pc))?;
            if !fetch.hit {
                self.state.clock.cycles += cost::I_CACHE_MISS;
            }

            Ok(fetch.word)
        } else {
            self.state.clock.cycles += cost::UNCACHED_FETCH;

            self.bus
                .read(addr, Width::Word)
                .map_err(|e| Access::Fetch.exception(e, pc))
        }
    }

    /// Tests the execution breakpoint against the instruction about to run at `pc`.
    fn check_exec_breakpoint(&mut self, pc: u32) -> Result<(), Exception> {
        let cop0 = &mut self.state.reg.cop0;
        let dcic = cop0.dcic;

        if !(dcic.pce() && dcic.is_armed(cop0.status.ku_c())) || (pc ^ cop0.bpc) & cop0.bpcm != 0 {
            return Ok(());
        }

        // DB and PC.
        cop0.dcic.record(0b11);
        tracing::debug!("Execution breakpoint hit at {:#010x}", pc);

        if dcic.tr() {
            Err(Exception::debug())
        } else {
            Ok(())
        }
    }

    /// Enters the exception handler on behalf of the instruction at `pc`.
    fn common_exception(&mut self, exc: Exception, pc: u32) {
        let next_pc = self.state.reg.pc();
        let pipeline = &mut self.state.pipeline;
        let (in_delay_slot, branch_taken) = (pipeline.in_delay_slot, pipeline.branch_taken);
        pipeline.clear_branch();
        pipeline.in_delay_slot = false;
        pipeline.branch_taken = false;

        let cop0 = &mut self.state.reg.cop0;
        if let Some(vaddr) = exc.bad_vaddr {
            cop0.bad_vaddr = vaddr;
        }
        cop0.cause.set_exc_code(exc.code);
        cop0.cause.set_ce(exc.cop);
        cop0.cause.set_bd(in_delay_slot);
        cop0.cause.set_bt(in_delay_slot && branch_taken);
        if in_delay_slot {
            // Resume at the branch so that it is re-executed.
            cop0.epc = pc.wrapping_sub(4);
            if branch_taken {
                cop0.tar = next_pc;
            }
        } else {
            cop0.epc = pc;
        }
        cop0.status.push();

        let vector = if cop0.status.bev() { exc.vector.0 } else { exc.vector.1 };
        tracing::debug!(
            "Exception `{}` (epc={:#010x}, bd={}, vector={:#010x})",
            exc.name(),
            cop0.epc,
            in_delay_slot,
            vector,
        );
        *self.state.reg.pc_mut() = vector;
    }

    fn gpr(&self, index: u8) -> u32 {
        self.state.reg.gpr(index.into())
    }

    /// Writes a GPR immediately, overriding any load to it still in flight.
    fn set_gpr(&mut self, index: u8, value: u32) {
        let index = usize::from(index);
        self.state.pipeline.cancel_load(index);
        self.state.reg.set_gpr(index, value);
    }

    /// Writes a GPR through the load delay slot.
    fn schedule_load(&mut self, index: u8, value: u32) {
        tracing::trace!("r{} <- {:#010x} (scheduled)", index, value);
        self.state.pipeline.schedule_load(index.into(), value);
    }

    /// The value a GPR will hold once the load in flight to it, if any, lands.
    fn pending_or_gpr(&self, index: u8) -> u32 {
        let index = usize::from(index);

        self.state
            .pipeline
            .in_flight(index)
            .unwrap_or_else(|| self.state.reg.gpr(index))
    }

    fn branch(&mut self, taken: bool, target: u32) {
        if taken {
            tracing::trace!("Branching to {:#010x}", target);
        }
        self.state.pipeline.set_branch(taken, target);
    }

    fn issue_muldiv(&mut self, op: muldiv::Op, lhs: u32, rhs: u32) {
        self.state.muldiv.issue(op, lhs, rhs, self.state.clock.retired);
    }

    /// Lands the pending multiply or divide, returning the cycles a read must stall for.
    fn resolve_muldiv(&mut self) -> u32 {
        self.state.muldiv.resolve(&mut self.state.reg, self.state.clock.retired)
    }

    fn stall(&mut self, cycles: u32) {
        self.state.clock.cycles += u64::from(cycles);
    }

    /// Waits for the GTE to finish its current command.
    fn stall_for_gte(&mut self) {
        let clock = &mut self.state.clock;
        if clock.gte_ready_at > clock.cycles {
            tracing::trace!("GTE busy: stalling {} cycles", clock.gte_ready_at - clock.cycles);
            clock.cycles = clock.gte_ready_at;
        }
    }
}
