// SPDX-License-Identifier: MPL-2.0

//! The DMA front-end.
//!
//! This module owns the channel registers and the interrupt logic of the DMA controller; the data
//! itself is moved by handlers that the host binds to each channel. A transfer starts the moment
//! software arms a channel, runs to completion at once, and is reported finished a fixed number of
//! cycles per word later.
//!
//! The only transfer carried out without help is the ordering-table clear of channel 6, which
//! fills RAM with an empty linked list when no handler is bound to it.

use std::fmt;

use bitfield::bitfield;
use serde::{Deserialize, Serialize};

use super::int;
use crate::bus::MainRam;

/// The offset of channel 0's `MADR` into the I/O window.
pub const BASE_ADDR: u32 = 0x0080;

/// One past the last offset of the DMA registers.
pub const END_ADDR: u32 = 0x0100;

pub const CHANNEL_COUNT: usize = 7;

pub mod channel {
    //! Channel numbers.

    pub const MDEC_IN: usize = 0;
    pub const MDEC_OUT: usize = 1;
    pub const GPU: usize = 2;
    pub const CDROM: usize = 3;
    pub const SPU: usize = 4;
    pub const PIO: usize = 5;
    /// The ordering-table clear channel.
    pub const OTC: usize = 6;
}

const DPCR_ADDR: u32 = 0x70;
const DICR_ADDR: u32 = 0x74;

/// The reset value of `DPCR`: every channel disabled, priorities ascending.
const DPCR_RESET: u32 = 0x0765_4321;

/// The linked-list terminator, and the value left in `MADR` by a linked-list transfer.
const END_OF_LIST: u32 = 0x00ff_ffff;

/// Bounds the number of linked-list nodes walked by one transfer.
const MAX_LIST_NODES: usize = MainRam::SIZE / 4;

bitfield! {
    /// A channel control register (`CHCR`).
    #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
    pub struct ChannelControl(u32);
    impl Debug;
    /// The transfer moves data out of RAM.
    pub from_ram, set_from_ram: 0;
    /// `MADR` steps backwards.
    pub backward, set_backward: 1;
    pub chopping, set_chopping: 8;
    pub sync, set_sync: 10, 9;
    pub busy, set_busy: 24;
    /// Starts a manually-synchronized transfer.
    pub trigger, set_trigger: 28;
}

/// The register state of one channel.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub madr: u32,
    pub bcr: u32,
    pub chcr: ChannelControl,
    /// Cycles until the in-flight transfer is reported complete.
    countdown: Option<u32>,
}

impl Channel {
    pub fn is_in_flight(&self) -> bool {
        self.countdown.is_some()
    }
}

/// The arguments of a transfer into RAM.
pub struct ReadParameters<'a> {
    pub ram: &'a mut MainRam,
    /// The physical address of the first word.
    pub addr: u32,
    /// The number of words.
    pub len: u32,
}

/// The arguments of a transfer out of RAM.
pub struct WriteParameters<'a> {
    pub ram: &'a MainRam,
    /// The physical address of the first word.
    pub addr: u32,
    /// The number of words.
    pub len: u32,
}

/// Moves words from a device into RAM.
pub type ReadHandler = Box<dyn FnMut(ReadParameters)>;

/// Moves words from RAM into a device.
pub type WriteHandler = Box<dyn FnMut(WriteParameters)>;

#[derive(Default)]
struct Binding {
    read: Option<ReadHandler>,
    write: Option<WriteHandler>,
}

/// The DMA controller.
#[derive(Serialize, Deserialize)]
pub struct Dma {
    channels: [Channel; CHANNEL_COUNT],
    /// The control register, holding the per-channel enables.
    dpcr: u32,
    /// The interrupt register.
    dicr: u32,
    /// The number of cycles a transfer takes per word moved.
    word_cycles: u32,
    #[serde(skip)]
    bindings: [Binding; CHANNEL_COUNT],
}

impl Default for Dma {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for Dma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dma")
            .field("channels", &self.channels)
            .field("dpcr", &self.dpcr)
            .field("dicr", &self.dicr)
            .field("word_cycles", &self.word_cycles)
            .finish_non_exhaustive()
    }
}

impl Dma {
    /// Creates a controller whose transfers take `word_cycles` cycles per word.
    pub fn new(word_cycles: u32) -> Self {
        Self {
            channels: Default::default(),
            dpcr: DPCR_RESET,
            dicr: 0,
            word_cycles,
            bindings: Default::default(),
        }
    }

    /// The channel at `index`, or `None` past the last channel.
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn dpcr(&self) -> u32 {
        self.dpcr
    }

    pub fn dicr(&self) -> u32 {
        self.dicr
    }

    /// Binds the handler for transfers into RAM on the given channel.
    ///
    /// A channel accepts only one such handler; later bindings are ignored.
    pub fn install_read_handler(
        &mut self,
        channel: usize,
        handler: impl FnMut(ReadParameters) + 'static,
    ) {
        match self.bindings.get_mut(channel).map(|it| &mut it.read) {
            Some(slot @ None) => *slot = Some(Box::new(handler)),
            Some(Some(_)) => tracing::warn!("DMA channel {} already has a read handler", channel),
            None => tracing::warn!("No such DMA channel: {}", channel),
        }
    }

    /// Binds the handler for transfers out of RAM on the given channel.
    ///
    /// A channel accepts only one such handler; later bindings are ignored.
    pub fn install_write_handler(
        &mut self,
        channel: usize,
        handler: impl FnMut(WriteParameters) + 'static,
    ) {
        match self.bindings.get_mut(channel).map(|it| &mut it.write) {
            Some(slot @ None) => *slot = Some(Box::new(handler)),
            Some(Some(_)) => tracing::warn!("DMA channel {} already has a write handler", channel),
            None => tracing::warn!("No such DMA channel: {}", channel),
        }
    }

    /// Reads the register at the given word-aligned offset from `BASE_ADDR`.
    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            DPCR_ADDR => self.dpcr,
            DICR_ADDR => self.dicr,
            0x78.. => {
                tracing::debug!("Read from unknown DMA register {:#x}", offset);
                0
            }
            _ => {
                let channel = &self.channels[(offset >> 4) as usize];
                match offset & 0xc {
                    0x0 => channel.madr,
                    0x4 => channel.bcr,
                    0x8 => channel.chcr.0,
                    _ => {
                        tracing::debug!("Read from DMA{} offset {:#x}", offset >> 4, offset & 0xf);
                        0
                    }
                }
            }
        }
    }

    /// Writes the register at the given word-aligned offset from `BASE_ADDR`, starting any
    /// transfer the write arms.
    pub fn write(&mut self, offset: u32, value: u32, ram: &mut MainRam, int: &mut int::Controller) {
        match offset {
            DPCR_ADDR => {
                self.dpcr = value;
                for index in 0..CHANNEL_COUNT {
                    self.try_start(index, ram);
                }
            }
            DICR_ADDR => {
                let flags = self.dicr & 0x7f00_0000 & !value;
                self.dicr = flags | (value & 0x00ff_ffff);
                self.refresh_irq(int);
            }
            0x78.. => {
                tracing::debug!("Ignoring write to unknown DMA register {:#x}", offset);
            }
            _ => {
                let index = (offset >> 4) as usize;
                let channel = &mut self.channels[index];
                match offset & 0xc {
                    0x0 => channel.madr = value & 0x00ff_ffff,
                    0x4 => channel.bcr = value,
                    0x8 => {
                        channel.chcr = if index == channel::OTC {
                            // Only the start bits are writable; the table always grows downwards.
                            ChannelControl((value & 0x5100_0000) | 0b10)
                        } else {
                            ChannelControl(value)
                        };
                    }
                    _ => {
                        tracing::debug!("Ignoring write to DMA{} offset {:#x}", index, offset & 0xf);
                    }
                }
                self.try_start(index, ram);
            }
        }
    }

    /// Counts down in-flight transfers, completing those whose time is up.
    pub fn update(&mut self, cycles: u32, int: &mut int::Controller) {
        for index in 0..CHANNEL_COUNT {
            let channel = &mut self.channels[index];
            let Some(remaining) = channel.countdown else {
                continue;
            };

            if cycles < remaining {
                channel.countdown = Some(remaining - cycles);
            } else {
                channel.countdown = None;
                self.complete(index, int);
            }
        }
    }

    /// Returns to the power-on state. Handlers stay bound.
    pub fn reset(&mut self) {
        let bindings = std::mem::take(&mut self.bindings);
        *self = Self::new(self.word_cycles);
        self.bindings = bindings;
    }

    /// Replaces the register state with `saved`, keeping the bound handlers.
    pub fn restore(&mut self, saved: Dma) {
        let bindings = std::mem::take(&mut self.bindings);
        *self = saved;
        self.bindings = bindings;
    }

    fn is_enabled(&self, index: usize) -> bool {
        self.dpcr & (1 << (3 + 4 * index)) != 0
    }

    fn try_start(&mut self, index: usize, ram: &mut MainRam) {
        let chcr = self.channels[index].chcr;
        let armed = chcr.busy() && (chcr.sync() != 0 || chcr.trigger());
        if !armed || !self.is_enabled(index) || self.channels[index].is_in_flight() {
            return;
        }

        self.channels[index].chcr.set_trigger(false);
        let words = match chcr.sync() {
            0 => self.transfer_block(index, ram),
            1 => self.transfer_blocks(index, ram),
            2 => self.transfer_list(index, ram),
            _ => {
                tracing::warn!("DMA{} armed with reserved sync mode", index);
                0
            }
        };
        self.channels[index].countdown = Some(words.max(1).saturating_mul(self.word_cycles.max(1)));
    }

    /// Performs a burst transfer of `BCR[15:0]` words.
    fn transfer_block(&mut self, index: usize, ram: &mut MainRam) -> u32 {
        let channel = self.channels[index];
        let len = match channel.bcr & 0xffff {
            0 => 0x1_0000,
            len => len,
        };
        let addr = channel.madr & 0x001f_fffc;

        if index == channel::OTC && self.bindings[index].read.is_none() {
            clear_ordering_table(ram, addr, len);
        } else {
            if channel.chcr.backward() && index != channel::OTC {
                tracing::debug!("DMA{}: backward step is not supported; stepping forwards", index);
            }
            self.dispatch(index, channel.chcr.from_ram(), ram, addr, len);
        }

        len
    }

    /// Performs a transfer of `BCR[31:16]` blocks of `BCR[15:0]` words each.
    fn transfer_blocks(&mut self, index: usize, ram: &mut MainRam) -> u32 {
        let channel = self.channels[index];
        let size = channel.bcr & 0xffff;
        let count = channel.bcr >> 16;
        let len = size * count;
        let addr = channel.madr & 0x001f_fffc;
        self.dispatch(index, channel.chcr.from_ram(), ram, addr, len);

        let channel = &mut self.channels[index];
        channel.madr = channel.madr.wrapping_add(len.wrapping_mul(4)) & 0x00ff_ffff;
        channel.bcr &= 0xffff;

        len
    }

    /// Walks a linked list out of RAM, handing each node's payload to the write handler.
    fn transfer_list(&mut self, index: usize, ram: &mut MainRam) -> u32 {
        let chcr = self.channels[index].chcr;
        if !chcr.from_ram() {
            tracing::warn!("DMA{}: linked-list transfer into RAM", index);
            return 0;
        }

        let mut addr = self.channels[index].madr & 0x001f_fffc;
        let mut total = 0;
        let mut terminated = false;
        for _ in 0..MAX_LIST_NODES {
            let header = ram.word(addr);
            let len = header >> 24;
            if len > 0 {
                self.dispatch(index, true, ram, addr + 4, len);
            }
            total += len + 1;

            if header & 0x0080_0000 != 0 {
                terminated = true;
                break;
            }
            addr = header & 0x001f_fffc;
        }
        if !terminated {
            tracing::warn!("DMA{}: linked list did not terminate", index);
        }
        self.channels[index].madr = END_OF_LIST;

        total
    }

    fn dispatch(&mut self, index: usize, from_ram: bool, ram: &mut MainRam, addr: u32, len: u32) {
        let binding = &mut self.bindings[index];
        if from_ram {
            match binding.write.as_mut() {
                Some(handler) => handler(WriteParameters { ram, addr, len }),
                None => tracing::debug!("DMA{}: no write handler; dropping {} words", index, len),
            }
        } else {
            match binding.read.as_mut() {
                Some(handler) => handler(ReadParameters { ram, addr, len }),
                None => tracing::debug!("DMA{}: no read handler; skipping {} words", index, len),
            }
        }
    }

    fn complete(&mut self, index: usize, int: &mut int::Controller) {
        tracing::debug!("DMA{} complete", index);
        let chcr = &mut self.channels[index].chcr;
        chcr.set_busy(false);
        chcr.set_trigger(false);

        if self.dicr & (1 << (16 + index)) != 0 {
            self.dicr |= 1 << (24 + index);
        }
        self.refresh_irq(int);
    }

    /// Recomputes the master flag, raising the DMA interrupt on its rising edge.
    fn refresh_irq(&mut self, int: &mut int::Controller) {
        let was = self.dicr & (1 << 31) != 0;
        let force = self.dicr & (1 << 15) != 0;
        let master = self.dicr & (1 << 23) != 0;
        let flags = self.dicr & 0x7f00_0000 != 0;
        let now = force || (master && flags);

        if now {
            self.dicr |= 1 << 31;
        } else {
            self.dicr &= !(1 << 31);
        }
        if now && !was {
            int.set(int::source::DMA);
        }
    }
}

/// Fills `len` words ending at `addr` with a list whose entries each point to the word below.
fn clear_ordering_table(ram: &mut MainRam, mut addr: u32, len: u32) {
    for remaining in (0..len).rev() {
        let next = if remaining == 0 {
            END_OF_LIST
        } else {
            addr.wrapping_sub(4) & 0x001f_fffc
        };
        ram.set_word(addr, next);
        addr = next;
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn reg(index: usize, offset: u32) -> u32 {
        (index as u32) << 4 | offset
    }

    fn enable(dma: &mut Dma, index: usize, ram: &mut MainRam, int: &mut int::Controller) {
        let dpcr = dma.dpcr() | (1 << (3 + 4 * index));
        dma.write(DPCR_ADDR, dpcr, ram, int);
    }

    #[test]
    fn ordering_table_clear_builds_empty_list() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();
        int.write(int::MASK, int::source::DMA, !0);
        dma.write(DICR_ADDR, 1 << 23 | 1 << (16 + channel::OTC), &mut ram, &mut int);
        enable(&mut dma, channel::OTC, &mut ram, &mut int);

        dma.write(reg(channel::OTC, 0x0), 0x100c, &mut ram, &mut int);
        dma.write(reg(channel::OTC, 0x4), 4, &mut ram, &mut int);
        dma.write(reg(channel::OTC, 0x8), 0x1100_0000, &mut ram, &mut int);

        assert_eq!(ram.word(0x100c), 0x1008);
        assert_eq!(ram.word(0x1008), 0x1004);
        assert_eq!(ram.word(0x1004), 0x1000);
        assert_eq!(ram.word(0x1000), END_OF_LIST);

        // Still busy until the transfer time elapses.
        assert!(dma.channel(channel::OTC).unwrap().chcr.busy());
        assert!(!int.line());
        dma.update(3, &mut int);
        assert!(dma.channel(channel::OTC).unwrap().chcr.busy());
        dma.update(1, &mut int);

        let chcr = dma.channel(channel::OTC).unwrap().chcr;
        assert!(!chcr.busy());
        assert!(!chcr.trigger());
        assert_eq!(dma.dicr() >> 24, 0x80 | 1 << channel::OTC);
        assert!(int.line());
    }

    #[test]
    fn round_trip_through_handlers() {
        let mut dma = Dma::new(2);
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();

        let device = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&device);
        dma.install_write_handler(channel::GPU, move |params| {
            let mut sink = sink.borrow_mut();
            for i in 0..params.len {
                sink.push(params.ram.word(params.addr + 4 * i));
            }
        });
        let source = Rc::clone(&device);
        dma.install_read_handler(channel::CDROM, move |params| {
            for (i, word) in source.borrow().iter().enumerate() {
                if (i as u32) < params.len {
                    params.ram.set_word(params.addr + 4 * i as u32, !word);
                }
            }
        });
        enable(&mut dma, channel::GPU, &mut ram, &mut int);
        enable(&mut dma, channel::CDROM, &mut ram, &mut int);

        let words: Vec<u32> = (0..8).map(|_| rand::random()).collect();
        for (i, word) in words.iter().enumerate() {
            ram.set_word(0x2000 + 4 * i as u32, *word);
        }

        // Sync mode 1: two blocks of four words.
        dma.write(reg(channel::GPU, 0x0), 0x2000, &mut ram, &mut int);
        dma.write(reg(channel::GPU, 0x4), 0x0002_0004, &mut ram, &mut int);
        dma.write(reg(channel::GPU, 0x8), 0x0100_0201, &mut ram, &mut int);
        assert_eq!(*device.borrow(), words);
        assert_eq!(dma.channel(channel::GPU).unwrap().madr, 0x2020);
        assert_eq!(dma.channel(channel::GPU).unwrap().bcr, 0x0000_0004);

        dma.write(reg(channel::CDROM, 0x0), 0x3000, &mut ram, &mut int);
        dma.write(reg(channel::CDROM, 0x4), 8, &mut ram, &mut int);
        dma.write(reg(channel::CDROM, 0x8), 0x1100_0000, &mut ram, &mut int);
        for (i, word) in words.iter().enumerate() {
            assert_eq!(ram.word(0x3000 + 4 * i as u32), !word);
        }

        dma.update(16, &mut int);
        assert!(!dma.channel(channel::GPU).unwrap().chcr.busy());
        assert!(!dma.channel(channel::CDROM).unwrap().chcr.busy());
    }

    #[test]
    fn linked_list_is_walked_to_terminator() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();

        let nodes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&nodes);
        dma.install_write_handler(channel::GPU, move |params| {
            sink.borrow_mut().push((params.addr, params.len));
        });
        enable(&mut dma, channel::GPU, &mut ram, &mut int);

        ram.set_word(0x100, 0x0200_0300);
        ram.set_word(0x300, 0x0000_0200);
        ram.set_word(0x200, 0x01ff_ffff);

        dma.write(reg(channel::GPU, 0x0), 0x100, &mut ram, &mut int);
        dma.write(reg(channel::GPU, 0x8), 0x0100_0401, &mut ram, &mut int);

        assert_eq!(*nodes.borrow(), [(0x104, 2), (0x204, 1)]);
        assert_eq!(dma.channel(channel::GPU).unwrap().madr, END_OF_LIST);

        dma.update(6, &mut int);
        assert!(!dma.channel(channel::GPU).unwrap().chcr.busy());
    }

    #[test]
    fn disabled_channel_waits_for_dpcr() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();

        dma.write(reg(channel::OTC, 0x0), 0x10, &mut ram, &mut int);
        dma.write(reg(channel::OTC, 0x4), 1, &mut ram, &mut int);
        dma.write(reg(channel::OTC, 0x8), 0x1100_0000, &mut ram, &mut int);
        dma.update(100, &mut int);
        assert!(dma.channel(channel::OTC).unwrap().chcr.busy());
        assert_eq!(ram.word(0x10), 0);

        enable(&mut dma, channel::OTC, &mut ram, &mut int);
        assert_eq!(ram.word(0x10), END_OF_LIST);
    }

    #[test]
    fn dicr_flags_acknowledge_by_writing_one() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();
        dma.write(DICR_ADDR, 1 << 23 | 1 << 16, &mut ram, &mut int);
        enable(&mut dma, channel::MDEC_IN, &mut ram, &mut int);

        dma.write(reg(channel::MDEC_IN, 0x4), 1, &mut ram, &mut int);
        dma.write(reg(channel::MDEC_IN, 0x8), 0x1100_0001, &mut ram, &mut int);
        dma.update(1, &mut int);
        assert_eq!(dma.dicr(), 1 << 31 | 1 << 24 | 1 << 23 | 1 << 16);
        assert_eq!(int.pending(), int::source::DMA);

        dma.write(DICR_ADDR, 1 << 24 | 1 << 23 | 1 << 16, &mut ram, &mut int);
        assert_eq!(dma.dicr(), 1 << 23 | 1 << 16);

        // Bit 15 forces the master flag regardless of the channel flags.
        dma.write(DICR_ADDR, 1 << 15, &mut ram, &mut int);
        assert_eq!(dma.dicr() >> 31, 1);
    }

    #[test]
    fn unused_channel_slot_reads_as_zero() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();
        dma.write(reg(channel::GPU, 0x0), 0x2000, &mut ram, &mut int);
        dma.write(reg(channel::GPU, 0x4), 0x10, &mut ram, &mut int);
        dma.write(reg(channel::GPU, 0x8), 0x0000_0201, &mut ram, &mut int);

        assert_eq!(dma.read(reg(channel::GPU, 0x8)), 0x0000_0201);
        assert_eq!(dma.read(reg(channel::GPU, 0xc)), 0);
    }

    #[test]
    fn channel_lookup_past_the_end_is_none() {
        let dma = Dma::default();

        assert!(dma.channel(channel::OTC).is_some());
        assert!(dma.channel(channel::OTC + 1).is_none());
    }

    #[test]
    fn bindings_are_one_time_and_survive_reset() {
        let mut dma = Dma::default();
        let mut ram = MainRam::default();
        let mut int = int::Controller::default();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::clone(&calls);
        dma.install_read_handler(channel::SPU, move |_| first.borrow_mut().push(1));
        let second = Rc::clone(&calls);
        dma.install_read_handler(channel::SPU, move |_| second.borrow_mut().push(2));

        dma.reset();
        assert_eq!(dma.dpcr(), DPCR_RESET);
        enable(&mut dma, channel::SPU, &mut ram, &mut int);
        dma.write(reg(channel::SPU, 0x4), 1, &mut ram, &mut int);
        dma.write(reg(channel::SPU, 0x8), 0x1100_0000, &mut ram, &mut int);

        assert_eq!(*calls.borrow(), [1]);
    }
}
