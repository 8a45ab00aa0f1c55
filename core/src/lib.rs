// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A host for the R3000 core: owns the memory banks and I/O devices, and wires them to the CPU.

pub mod log;

use std::io;

use anyhow::Context as _;
use r3k_cpu::{
    bus::{
        io::{dma, int, memctl, sio, Io},
        Bios, Device, MainRam, Unmapped,
    },
    cop,
    Bus,
    Gte,
    State,
};
use serde::{Deserialize, Serialize};

pub use r3k_cpu::Cpu;

/// Host configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The value of the PRId register.
    pub prid: u32,
    /// The reset value of the `RAM_SIZE` register.
    pub ram_size: u32,
    /// The cycles a DMA transfer takes per word.
    pub dma_word_cycles: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prid: r3k_cpu::Config::default().prid,
            ram_size: 0x0000_0b88,
            dma_word_cycles: 1,
        }
    }
}

impl Config {
    fn cpu(&self) -> r3k_cpu::Config {
        r3k_cpu::Config { prid: self.prid }
    }
}

/// A complete machine minus everything outside the CPU package and its I/O block.
///
/// Regions the core does not claim are forwarded to the external [`Device`], and COP2 commands to
/// the [`Gte`]. Both default to stand-ins that hold no behavior.
pub struct Core {
    config: Config,
    cpu_state: State,
    main_ram: MainRam,
    bios: Bios,
    memctl: memctl::Config,
    int: int::Controller,
    sio: sio::Controller,
    dma: dma::Dma,
    gte: Box<dyn Gte>,
    ext: Box<dyn Device>,
}

impl Default for Core {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// The machine state written by [`Core::save_state`].
#[derive(Serialize)]
struct SavedRef<'a> {
    cpu: &'a State,
    main_ram: &'a MainRam,
    memctl: &'a memctl::Config,
    int: &'a int::Controller,
    sio: &'a sio::Controller,
    dma: &'a dma::Dma,
}

#[derive(Deserialize)]
struct Saved {
    cpu: State,
    main_ram: MainRam,
    memctl: memctl::Config,
    int: int::Controller,
    sio: sio::Controller,
    dma: dma::Dma,
}

impl Core {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            cpu_state: State::new(&config.cpu()),
            main_ram: MainRam::default(),
            bios: Bios::default(),
            memctl: memctl::Config::new(config.ram_size),
            int: int::Controller::default(),
            sio: sio::Controller::default(),
            dma: dma::Dma::new(config.dma_word_cycles),
            gte: Box::new(cop::Inert::default()),
            ext: Box::new(Unmapped),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connects the CPU to the bus.
    pub fn cpu(&mut self) -> Cpu<'_, '_> {
        let io = Io {
            memctl: &mut self.memctl,
            int: &mut self.int,
            sio: &mut self.sio,
            dma: &mut self.dma,
        };
        let bus = Bus::new(&mut self.main_ram, &mut self.bios, io, self.ext.as_mut());

        self.cpu_state.connect_bus(bus, self.gte.as_mut())
    }

    /// Executes for at least `budget` cycles, returning the number that elapsed.
    pub fn run(&mut self, budget: u64) -> u64 {
        self.cpu().execute_run(budget)
    }

    /// Copies a BIOS image into ROM.
    ///
    /// The image may be shorter than the ROM, in which case the remainder is zeroed.
    pub fn load_bios(&mut self, image: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(
            image.len() <= Bios::SIZE,
            "BIOS image is {:#x} bytes; the ROM holds only {:#x}",
            image.len(),
            Bios::SIZE,
        );

        self.bios[..image.len()].copy_from_slice(image);
        self.bios[image.len()..].fill(0);
        tracing::info!("Loaded {:#x}-byte BIOS image", image.len());

        Ok(())
    }

    /// Performs a cold reset. RAM and ROM keep their contents, and host bindings stay in place.
    pub fn reset(&mut self) {
        tracing::info!("Reset");
        self.cpu_state.reset();
        self.memctl = memctl::Config::new(self.config.ram_size);
        self.int.reset();
        self.sio.reset();
        self.dma.reset();
    }

    /// Serializes the machine state.
    ///
    /// ROM contents, the GTE, the external device and every handler are left out; the host
    /// must restore them itself.
    pub fn save_state(&self) -> anyhow::Result<Vec<u8>> {
        let saved = SavedRef {
            cpu: &self.cpu_state,
            main_ram: &self.main_ram,
            memctl: &self.memctl,
            int: &self.int,
            sio: &self.sio,
            dma: &self.dma,
        };

        bincode::serialize(&saved).context("failed to encode savestate")
    }

    /// Restores machine state written by [`Core::save_state`].
    pub fn load_state(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let saved: Saved = bincode::deserialize(bytes).context("failed to decode savestate")?;
        anyhow::ensure!(
            saved.main_ram.len() == MainRam::SIZE,
            "savestate holds {:#x} bytes of RAM",
            saved.main_ram.len(),
        );

        self.cpu_state = saved.cpu;
        self.main_ram = saved.main_ram;
        self.memctl = saved.memctl;
        self.int = saved.int;
        self.sio.restore(saved.sio);
        self.dma.restore(saved.dma);

        Ok(())
    }

    pub fn cpu_state(&self) -> &State {
        &self.cpu_state
    }

    pub fn cpu_state_mut(&mut self) -> &mut State {
        &mut self.cpu_state
    }

    pub fn main_ram(&self) -> &MainRam {
        &self.main_ram
    }

    pub fn main_ram_mut(&mut self) -> &mut MainRam {
        &mut self.main_ram
    }

    pub fn int(&self) -> &int::Controller {
        &self.int
    }

    /// Used by hosts to raise interrupt sources.
    pub fn int_mut(&mut self) -> &mut int::Controller {
        &mut self.int
    }

    pub fn sio(&self) -> &sio::Controller {
        &self.sio
    }

    pub fn sio_mut(&mut self) -> &mut sio::Controller {
        &mut self.sio
    }

    /// Presents new input levels to an SIO port.
    pub fn sio_input(&mut self, port: usize, mask: sio::Inputs, data: sio::Inputs) {
        self.sio.input(port, mask, data, &mut self.int);
    }

    pub fn dma(&self) -> &dma::Dma {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut dma::Dma {
        &mut self.dma
    }

    pub fn gte(&self) -> &dyn Gte {
        self.gte.as_ref()
    }

    pub fn set_gte(&mut self, gte: Box<dyn Gte>) {
        self.gte = gte;
    }

    pub fn set_ext(&mut self, ext: Box<dyn Device>) {
        self.ext = ext;
    }

    /// Writes a hex dump of main RAM.
    pub fn dump_ram(&self, w: &mut impl io::Write) -> io::Result<()> {
        r3k_util::dump_hex(w, MainRam::BASE_ADDR, &self.main_ram)
    }
}
