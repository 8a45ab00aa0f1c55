// SPDX-License-Identifier: MPL-2.0

//! The serial I/O controller.
//!
//! There are two identical ports. Port 0 carries the controller and memory card bus; port 1 is
//! the link cable. Each port shifts characters out, least-significant bit first, on a bit clock
//! derived from its baud register, and shifts one bit in from its sampled input `DATA` line for
//! every bit shifted out.
//!
//! The external device sits on the other end of the wire: it observes output line changes through
//! a [handler](Controller::install_handler) and presents input levels with [`Controller::input`].
//!
//! Each port occupies 16 bytes of the I/O window:
//!
//! | Offset | Register        |
//! |--------|-----------------|
//! | `+0x0` | TX / RX data    |
//! | `+0x4` | status          |
//! | `+0x8` | mode (16-bit)   |
//! | `+0xa` | control (16-bit)|
//! | `+0xc` | misc (16-bit)   |
//! | `+0xe` | baud (16-bit)   |

use std::fmt;

use bitfield::bitfield;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::int;
use crate::bus::Width;

/// The offset of port 0 into the I/O window.
pub const BASE_ADDR: u32 = 0x0040;

/// The number of ports.
pub const PORT_COUNT: usize = 2;

/// The interrupt source raised by each port.
const SOURCES: [u32; PORT_COUNT] = [int::source::SIO0, int::source::SIO1];

bitflags! {
    /// The status register.
    #[derive(Default, Serialize, Deserialize)]
    pub struct Status: u32 {
        /// The transmit buffer may be written.
        const TX_RDY = 1 << 0;
        /// A received character is waiting in the data register.
        const RX_RDY = 1 << 1;
        /// Nothing is queued or being shifted out.
        const TX_EMPTY = 1 << 2;
        const PARITY_ERR = 1 << 3;
        /// A character arrived before the previous one was read.
        const OVERRUN = 1 << 4;
        const FRAMING_ERR = 1 << 5;
        /// The level of the DSR input.
        const DSR = 1 << 7;
        /// The level of the CTS input.
        const CTS = 1 << 8;
        const IRQ = 1 << 9;
    }
}

bitflags! {
    /// Lines driven by a port.
    #[derive(Default, Serialize, Deserialize)]
    pub struct Lines: u32 {
        const DATA = 1 << 0;
        const DTR = 1 << 1;
        const RTS = 1 << 2;
        /// Toggles once per shifted bit.
        const CLOCK = 1 << 3;
    }
}

bitflags! {
    /// Lines sampled by a port.
    #[derive(Default, Serialize, Deserialize)]
    pub struct Inputs: u32 {
        const DATA = 1 << 0;
        const DSR = 1 << 1;
        const CTS = 1 << 2;
    }
}

bitfield! {
    /// The mode register.
    #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
    pub struct Mode(u16);
    impl Debug;
    pub prescaler, set_prescaler: 1, 0;
    pub char_len, set_char_len: 3, 2;
    pub parity_enable, set_parity_enable: 4;
    pub parity_odd, set_parity_odd: 5;
    pub stop_bits, set_stop_bits: 7, 6;
    pub clock_polarity, set_clock_polarity: 8;
}

impl Mode {
    /// The number of CPU cycles per baud-register unit, or zero if the clock is stopped.
    fn multiplier(&self) -> u32 {
        match self.prescaler() {
            1 => 1,
            2 => 16,
            3 => 64,
            _ => 0,
        }
    }

    /// The number of data bits per character.
    fn bits_per_char(&self) -> u8 {
        self.char_len() as u8 + 5
    }
}

bitfield! {
    /// The control register.
    #[derive(Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
    pub struct Control(u16);
    impl Debug;
    pub tx_enable, set_tx_enable: 0;
    pub dtr, set_dtr: 1;
    pub rx_enable, set_rx_enable: 2;
    pub tx_output_level, set_tx_output_level: 3;
    /// Acknowledges `IRQ` and the error bits. Reads as zero.
    pub iack, set_iack: 4;
    pub rts, set_rts: 5;
    /// Returns the port to its idle state. Reads as zero.
    pub reset, set_reset: 6;
    pub rx_int_mode, set_rx_int_mode: 9, 8;
    pub tx_ienable, set_tx_ienable: 10;
    pub rx_ienable, set_rx_ienable: 11;
    pub dsr_ienable, set_dsr_ienable: 12;
    pub port_select, set_port_select: 13;
}

/// A bit-clock countdown owned by a port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    period: u32,
    remaining: Option<u32>,
}

impl Timer {
    /// Sets the period, starting the countdown if it isn't already running.
    fn start(&mut self, period: u32) {
        self.period = period;
        if period == 0 {
            self.remaining = None;
        } else if self.remaining.is_none() {
            self.remaining = Some(period);
        }
    }

    /// Changes the period without starting a stopped countdown.
    fn set_period(&mut self, period: u32) {
        self.period = period;
        if period == 0 {
            self.remaining = None;
        }
    }

    fn stop(&mut self) {
        self.remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    /// Advances the countdown, returning how many times it expired.
    fn advance(&mut self, cycles: u32) -> u32 {
        let Some(remaining) = self.remaining else {
            return 0;
        };

        if cycles < remaining {
            self.remaining = Some(remaining - cycles);

            0
        } else {
            let over = cycles - remaining;
            self.remaining = Some(self.period - (over % self.period));

            1 + (over / self.period)
        }
    }
}

/// A callback notified whenever the output lines of a port change.
pub type Handler = Box<dyn FnMut(Lines)>;

/// The wires connecting a port to the outside world during a single operation.
struct Wires<'a> {
    handler: &'a mut Option<Handler>,
    int: &'a mut int::Controller,
    source: u32,
}

impl Wires<'_> {
    fn drive(&mut self, lines: Lines) {
        if let Some(handler) = self.handler.as_mut() {
            handler(lines);
        }
    }
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

/// The state of one serial port.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Port {
    status: Status,
    mode: Mode,
    control: Control,
    misc: u16,
    baud: u16,
    /// The character waiting to be shifted out.
    tx_data: u8,
    tx_shift: u8,
    /// Bits of `tx_shift` still to be sent.
    tx_bits: u8,
    /// The last complete character received.
    rx_data: u8,
    rx_shift: u8,
    /// Bits of `rx_shift` received so far.
    rx_bits: u8,
    inputs: Inputs,
    outputs: Lines,
    timer: Timer,
}

impl Port {
    /// Creates an idle port.
    pub fn new() -> Self {
        Self {
            status: Status::TX_RDY | Status::TX_EMPTY,
            mode: Mode::default(),
            control: Control::default(),
            misc: 0,
            baud: 0,
            tx_data: 0,
            tx_shift: 0,
            tx_bits: 0,
            rx_data: 0,
            rx_shift: 0,
            rx_bits: 0,
            inputs: Inputs::empty(),
            outputs: Lines::empty(),
            timer: Timer::default(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn control(&self) -> Control {
        self.control
    }

    pub fn outputs(&self) -> Lines {
        self.outputs
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// The bit period, in CPU cycles, or zero if the clock is stopped.
    fn period(&self) -> u32 {
        self.mode.multiplier() * u32::from(self.baud)
    }

    fn is_shifting(&self) -> bool {
        self.tx_bits > 0
    }

    fn has_queued(&self) -> bool {
        !self.status.contains(Status::TX_RDY)
    }

    /// The 32-bit view of the register word with the given index.
    fn word(&self, index: u32) -> u32 {
        match index {
            0 => u32::from(self.rx_data),
            1 => self.status.bits(),
            2 => u32::from(self.mode.0) | (u32::from(self.control.0) << 16),
            _ => u32::from(self.misc) | (u32::from(self.baud) << 16),
        }
    }

    fn interrupt(&mut self, wires: &mut Wires) {
        self.status.insert(Status::IRQ);
        wires.int.set(wires.source);
    }

    fn set_outputs(&mut self, lines: Lines, wires: &mut Wires) {
        if lines != self.outputs {
            self.outputs = lines;
            wires.drive(lines);
        }
    }

    fn kick(&mut self) {
        if self.control.tx_enable() && (self.has_queued() || self.is_shifting()) {
            let period = self.period();
            if period == 0 {
                tracing::debug!("SIO bit clock is stopped; transmission deferred");
            }
            self.timer.start(period);
        }
    }

    fn transmit(&mut self, value: u8) {
        if self.has_queued() {
            tracing::debug!("SIO transmit buffer overwritten before it was sent");
        }
        self.tx_data = value;
        self.status.remove(Status::TX_RDY | Status::TX_EMPTY);
        self.kick();
    }

    fn receive(&mut self) -> u8 {
        self.status.remove(Status::RX_RDY);

        self.rx_data
    }

    fn write_mode(&mut self, value: u16) {
        self.mode = Mode(value);
        self.timer.set_period(self.period());
    }

    fn write_control(&mut self, value: u16, wires: &mut Wires) {
        let control = Control(value);

        if control.reset() {
            tracing::debug!("SIO reset");
            let inputs = self.inputs;
            let outputs = self.outputs;
            *self = Self::new();
            self.inputs = inputs;
            self.outputs = outputs;
            self.sync_inputs();
            self.set_outputs(Lines::empty(), wires);

            return;
        }

        if control.iack() {
            self.status.remove(Status::IRQ | Status::OVERRUN | Status::PARITY_ERR);
        }

        let mut control = control;
        control.set_iack(false);
        self.control = control;

        let mut lines = self.outputs;
        lines.set(Lines::DTR, control.dtr());
        lines.set(Lines::RTS, control.rts());
        self.set_outputs(lines, wires);

        if control.tx_enable() {
            self.kick();
        } else if !self.is_shifting() {
            self.timer.stop();
        }
    }

    fn write_baud(&mut self, value: u16) {
        self.baud = value;
        self.timer.set_period(self.period());
    }

    fn sync_inputs(&mut self) {
        self.status.set(Status::DSR, self.inputs.contains(Inputs::DSR));
        self.status.set(Status::CTS, self.inputs.contains(Inputs::CTS));
    }

    fn input(&mut self, mask: Inputs, data: Inputs, wires: &mut Wires) {
        let old = self.inputs;
        self.inputs = (old & !mask) | (data & mask);
        self.sync_inputs();

        let dsr_rose = !old.contains(Inputs::DSR) && self.inputs.contains(Inputs::DSR);
        if dsr_rose && self.control.dsr_ienable() {
            self.interrupt(wires);
        }
    }

    /// Shifts one bit in each direction. Returns `false` once there is nothing left to send.
    fn tick(&mut self, wires: &mut Wires) -> bool {
        if !self.is_shifting() {
            if !self.has_queued() || !self.control.tx_enable() {
                return false;
            }

            self.tx_shift = self.tx_data;
            self.tx_bits = self.mode.bits_per_char();
            self.status.insert(Status::TX_RDY);
        }

        let bit = self.tx_shift & 1 != 0;
        self.tx_shift >>= 1;
        self.tx_bits -= 1;

        let mut lines = self.outputs;
        lines.set(Lines::DATA, bit);
        lines.toggle(Lines::CLOCK);
        self.set_outputs(lines, wires);

        if self.inputs.contains(Inputs::DATA) {
            self.rx_shift |= 1 << self.rx_bits;
        }
        self.rx_bits += 1;

        if self.is_shifting() {
            return true;
        }

        // A whole character has gone out, and one has come in.
        if self.status.contains(Status::RX_RDY) {
            self.status.insert(Status::OVERRUN);
        }
        self.rx_data = self.rx_shift;
        self.rx_shift = 0;
        self.rx_bits = 0;
        self.status.insert(Status::RX_RDY);

        if !self.has_queued() {
            self.status.insert(Status::TX_EMPTY);
        }
        if self.control.rx_ienable() || self.control.tx_ienable() {
            self.interrupt(wires);
        }

        self.has_queued()
    }

    fn update(&mut self, cycles: u32, wires: &mut Wires) {
        for _ in 0..self.timer.advance(cycles) {
            if !self.tick(wires) {
                self.timer.stop();
                break;
            }
        }
    }
}

/// The serial I/O controller.
#[derive(Default, Serialize, Deserialize)]
pub struct Controller {
    ports: [Port; PORT_COUNT],
    #[serde(skip)]
    handlers: [Option<Handler>; PORT_COUNT],
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("ports", &self.ports)
            .field(
                "handlers",
                &self.handlers.iter().map(Option::is_some).collect::<Vec<bool>>(),
            )
            .finish()
    }
}

impl Controller {
    /// The port at `index`, or `None` past the last port.
    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Binds the callback notified of output line changes on the given port.
    ///
    /// A port can be bound only once; later bindings are ignored.
    pub fn install_handler(&mut self, port: usize, handler: impl FnMut(Lines) + 'static) {
        match self.handlers.get_mut(port) {
            Some(slot @ None) => *slot = Some(Box::new(handler)),
            Some(Some(_)) => tracing::warn!("SIO port {} already has a handler", port),
            None => tracing::warn!("No such SIO port: {}", port),
        }
    }

    /// Presents new input line levels on the given port. Only the lines in `mask` change.
    ///
    /// The levels are sampled on the port's next bit clock, not here.
    pub fn input(&mut self, port: usize, mask: Inputs, data: Inputs, int: &mut int::Controller) {
        if port >= PORT_COUNT {
            tracing::warn!("No such SIO port: {}", port);
            return;
        }

        let mut wires = Wires {
            handler: &mut self.handlers[port],
            int,
            source: SOURCES[port],
        };
        self.ports[port].input(mask, data, &mut wires);
    }

    pub fn read(&mut self, port: usize, offset: u32, width: Width) -> u32 {
        let Some(port) = self.ports.get_mut(port) else {
            return 0;
        };

        if offset == 0 {
            let value = u32::from(port.receive());
            tracing::trace!("SIO RX -> {:#04x}", value);

            return value;
        }

        r3k_util::lane::extract(port.word(offset >> 2), offset, width.len())
    }

    pub fn write(
        &mut self,
        port: usize,
        offset: u32,
        value: u32,
        width: Width,
        int: &mut int::Controller,
    ) {
        if port >= PORT_COUNT {
            return;
        }
        let mut wires = Wires {
            handler: &mut self.handlers[port],
            int,
            source: SOURCES[port],
        };
        let port = &mut self.ports[port];

        let index = offset >> 2;
        let word = r3k_util::lane::insert(port.word(index), value, offset, width.len());
        let mask = r3k_util::lane::mask(offset, width.len());
        let (lo, hi) = (word as u16, (word >> 16) as u16);

        match index {
            0 if offset == 0 => port.transmit(value as u8),
            2 => {
                if mask & 0xffff != 0 {
                    port.write_mode(lo);
                }
                if mask >> 16 != 0 {
                    port.write_control(hi, &mut wires);
                }
            }
            3 => {
                if mask & 0xffff != 0 {
                    port.misc = lo;
                }
                if mask >> 16 != 0 {
                    port.write_baud(hi);
                }
            }
            _ => {
                tracing::debug!("Ignoring write to read-only SIO offset {:#x}", offset);
            }
        }
    }

    /// Advances every port's bit clock.
    pub fn update(&mut self, cycles: u32, int: &mut int::Controller) {
        for (index, (port, handler)) in self.ports.iter_mut().zip(self.handlers.iter_mut()).enumerate() {
            let mut wires = Wires {
                handler,
                int: &mut *int,
                source: SOURCES[index],
            };
            port.update(cycles, &mut wires);
        }
    }

    /// Returns every port to its power-on state. Handlers stay installed.
    pub fn reset(&mut self) {
        self.ports = Default::default();
    }

    /// Replaces the port state with `saved`, keeping the installed handlers.
    pub fn restore(&mut self, saved: Controller) {
        self.ports = saved.ports;
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    const MODE: u32 = 0x8;
    const CONTROL: u32 = 0xa;
    const BAUD: u32 = 0xe;

    /// Eight-bit characters, eight cycles per bit.
    fn configure(sio: &mut Controller, int: &mut int::Controller, control: u16) {
        sio.write(0, MODE, 0b1101, Width::Half, int);
        sio.write(0, BAUD, 8, Width::Half, int);
        sio.write(0, CONTROL, u32::from(control), Width::Half, int);
    }

    fn record(sio: &mut Controller) -> Rc<RefCell<Vec<Lines>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        sio.install_handler(0, move |lines| sink.borrow_mut().push(lines));

        seen
    }

    #[test]
    fn idle_after_power_on() {
        let mut sio = Controller::default();

        assert_eq!(sio.read(0, 4, Width::Word), (Status::TX_RDY | Status::TX_EMPTY).bits());
        assert_eq!(sio.read(1, 4, Width::Word), (Status::TX_RDY | Status::TX_EMPTY).bits());
        assert!(!sio.port(0).unwrap().timer().is_running());
    }

    #[test]
    fn character_is_shifted_lsb_first() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        let seen = record(&mut sio);
        configure(&mut sio, &mut int, 0x0001);

        sio.write(0, 0, 0b1010_0110, Width::Byte, &mut int);
        sio.update(8 * 8, &mut int);

        let bits: Vec<bool> = seen
            .borrow()
            .iter()
            .filter(|lines| !lines.contains(Lines::DTR))
            .map(|lines| lines.contains(Lines::DATA))
            .collect();
        assert_eq!(bits, [false, true, true, false, false, true, false, true]);
        assert!(sio.port(0).unwrap().status().contains(Status::TX_EMPTY));
        assert!(!sio.port(0).unwrap().timer().is_running());
    }

    #[test]
    fn received_character_interrupts() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        configure(&mut sio, &mut int, 0x0801);
        sio.input(0, Inputs::DATA, Inputs::DATA, &mut int);

        sio.write(0, 0, 0x01, Width::Byte, &mut int);
        sio.update(8 * 8, &mut int);

        let status = sio.port(0).unwrap().status();
        assert!(status.contains(Status::RX_RDY | Status::IRQ));
        assert_eq!(int.pending(), int::source::SIO0);
        assert_eq!(sio.read(0, 0, Width::Byte), 0xff);
        assert!(!sio.port(0).unwrap().status().contains(Status::RX_RDY));

        sio.write(0, CONTROL, 0x0811, Width::Half, &mut int);
        assert!(!sio.port(0).unwrap().status().contains(Status::IRQ));
    }

    #[test]
    fn unread_character_overruns() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        configure(&mut sio, &mut int, 0x0001);

        sio.write(0, 0, 0x55, Width::Byte, &mut int);
        sio.update(8 * 8, &mut int);
        sio.write(0, 0, 0xaa, Width::Byte, &mut int);
        sio.update(8 * 8, &mut int);

        assert!(sio.port(0).unwrap().status().contains(Status::OVERRUN));
    }

    #[test]
    fn reset_mid_shift_returns_to_idle() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        configure(&mut sio, &mut int, 0x0801);
        sio.input(0, Inputs::DATA, Inputs::DATA, &mut int);

        sio.write(0, 0, 0x5a, Width::Byte, &mut int);
        sio.update(8 * 3, &mut int);
        assert!(sio.port(0).unwrap().timer().is_running());

        sio.write(0, CONTROL, 0x0040, Width::Half, &mut int);
        sio.update(8 * 64, &mut int);

        let port = sio.port(0).unwrap();
        assert_eq!(port.status(), Status::TX_RDY | Status::TX_EMPTY);
        assert!(!port.timer().is_running());
        assert_eq!(int.pending(), 0);
    }

    #[test]
    fn dsr_edge_interrupts_when_enabled() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        sio.write(0, CONTROL, 0x1000, Width::Half, &mut int);

        sio.input(0, Inputs::DSR, Inputs::DSR, &mut int);
        assert!(sio.port(0).unwrap().status().contains(Status::DSR | Status::IRQ));
        assert_eq!(int.pending(), int::source::SIO0);

        // Holding the line high is not another edge.
        sio.write(0, CONTROL, 0x1010, Width::Half, &mut int);
        sio.input(0, Inputs::DSR, Inputs::DSR, &mut int);
        assert!(!sio.port(0).unwrap().status().contains(Status::IRQ));
    }

    #[test]
    fn stopped_clock_defers_transmission() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        sio.write(1, CONTROL, 0x0001, Width::Half, &mut int);
        sio.write(1, 0, 0x12, Width::Byte, &mut int);
        sio.update(10_000, &mut int);

        assert!(!sio.port(1).unwrap().status().contains(Status::TX_EMPTY));

        sio.write(1, MODE, 0b1101, Width::Half, &mut int);
        sio.write(1, BAUD, 1, Width::Half, &mut int);
        sio.write(1, CONTROL, 0x0001, Width::Half, &mut int);
        sio.update(8, &mut int);
        assert!(sio.port(1).unwrap().status().contains(Status::TX_EMPTY));
    }

    #[test]
    fn port_lookup_past_the_end_is_none() {
        let sio = Controller::default();

        assert!(sio.port(PORT_COUNT - 1).is_some());
        assert!(sio.port(PORT_COUNT).is_none());
    }

    #[test]
    fn output_lines_follow_control() {
        let mut sio = Controller::default();
        let mut int = int::Controller::default();
        let seen = record(&mut sio);

        sio.write(0, CONTROL, 0x0022, Width::Half, &mut int);
        assert_eq!(seen.borrow().last(), Some(&(Lines::DTR | Lines::RTS)));

        sio.write(0, 8, 0x0002_000d, Width::Word, &mut int);
        assert_eq!(sio.port(0).unwrap().mode().0, 0x000d);
        assert_eq!(seen.borrow().last(), Some(&Lines::DTR));
    }
}
