//! NES standard controllers (joypads).
//!
//! Each pad is an 8-bit parallel-in, serial-out shift register. Writing
//! bit 0 = 1 to `$4016` holds both pads in strobe (continuously reloading);
//! writing 0 latches the buttons. Reads of `$4016` (port 1) and `$4017`
//! (port 2) return one bit each and shift right. `$4017` writes belong to
//! the APU frame counter, so port 2 is mapped read-only.

use std::cell::Cell;
use std::rc::Rc;

use emu_core::{Access, BusContext, BusId, Device, DeviceKind, Resource, Value};

use crate::map::{CPU_BUS, CTRL_PORT1, CTRL_PORT2};

/// NES button indices (bit positions).
pub mod button {
    pub const A: u8 = 0;
    pub const B: u8 = 1;
    pub const SELECT: u8 = 2;
    pub const START: u8 = 3;
    pub const UP: u8 = 4;
    pub const DOWN: u8 = 5;
    pub const LEFT: u8 = 6;
    pub const RIGHT: u8 = 7;
}

/// Button state shared between a host's input code and the controller
/// device inside a running machine. Cloning yields another handle to the
/// same two ports.
#[derive(Debug, Clone, Default)]
pub struct ControllerInput {
    ports: Rc<[Cell<u8>; 2]>,
}

impl ControllerInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a button on `port` (0 or 1). Out-of-range ports are ignored.
    pub fn set_button(&self, port: usize, button: u8, pressed: bool) {
        if let Some(cell) = self.ports.get(port) {
            let bits = cell.get();
            cell.set(if pressed {
                bits | (1 << button)
            } else {
                bits & !(1 << button)
            });
        }
    }

    /// Replace every button on `port` at once.
    pub fn set_buttons(&self, port: usize, buttons: u8) {
        if let Some(cell) = self.ports.get(port) {
            cell.set(buttons);
        }
    }

    #[must_use]
    pub fn buttons(&self, port: usize) -> u8 {
        self.ports.get(port).map_or(0, Cell::get)
    }
}

/// One pad's shift register.
#[derive(Debug, Clone, Copy, Default)]
struct ShiftRegister {
    bits: u8,
}

impl ShiftRegister {
    fn load(&mut self, buttons: u8) {
        self.bits = buttons;
    }

    fn shift(&mut self) -> u8 {
        let result = self.bits & 1;
        // After all 8 bits are shifted out, reads return 1
        self.bits = (self.bits >> 1) | 0x80;
        result
    }
}

/// Both controller ports.
pub struct Controllers {
    input: ControllerInput,
    pads: [ShiftRegister; 2],
    strobe: bool,
}

impl Controllers {
    #[must_use]
    pub fn new(input: ControllerInput) -> Self {
        Self {
            input,
            pads: [ShiftRegister::default(); 2],
            strobe: false,
        }
    }

    fn read_port(&mut self, port: usize) -> u8 {
        if self.strobe {
            // In strobe mode, always return button A state
            return self.input.buttons(port) & 1;
        }
        self.pads[port].shift()
    }
}

impl Device for Controllers {
    fn name(&self) -> &str {
        "nes_controller"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::mem("mem", CPU_BUS, CTRL_PORT1, CTRL_PORT1),
            Resource::mem_access("port2", CPU_BUS, CTRL_PORT2, CTRL_PORT2, Access::ReadOnly),
        ]
    }

    fn reset(&mut self) {
        self.pads = [ShiftRegister::default(); 2];
        self.strobe = false;
    }

    fn read(&mut self, bus_id: BusId, address: u32, bus: &mut BusContext<'_>) -> u8 {
        let port = usize::from(address == CTRL_PORT2);
        // Only D0 is driven; the upper bits float
        (bus.open_bus(bus_id) & 0xE0) | self.read_port(port)
    }

    fn write(&mut self, _bus_id: BusId, _address: u32, value: u8, _bus: &mut BusContext<'_>) {
        let strobe = value & 1 != 0;
        if self.strobe && !strobe {
            // Falling edge: latch current buttons into both shift registers
            for (port, pad) in self.pads.iter_mut().enumerate() {
                pad.load(self.input.buttons(port));
            }
        }
        self.strobe = strobe;
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "strobe" => Some(self.strobe.into()),
            "port1.buttons" => Some(self.input.buttons(0).into()),
            "port2.buttons" => Some(self.input.buttons(1).into()),
            "port1.shift" => Some(self.pads[0].bits.into()),
            "port2.shift" => Some(self.pads[1].bits.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::{Machine, MachineBuilder, MasterClock};

    fn machine() -> (Machine, ControllerInput) {
        let input = ControllerInput::new();
        let m = MachineBuilder::new("pads", MasterClock::new(12))
            .device(Controllers::new(input.clone()))
            .init()
            .unwrap();
        (m, input)
    }

    fn read_bit(m: &mut Machine, address: u32) -> u8 {
        m.read(CPU_BUS, address).unwrap() & 1
    }

    #[test]
    fn strobe_latch_and_read() {
        let (mut m, input) = machine();
        input.set_button(0, button::A, true);
        input.set_button(0, button::START, true);

        m.write(CPU_BUS, 0x4016, 1).unwrap();
        m.write(CPU_BUS, 0x4016, 0).unwrap();

        let bits: Vec<u8> = (0..8).map(|_| read_bit(&mut m, 0x4016)).collect();
        assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 0]);
        // After 8 reads, should return 1
        assert_eq!(read_bit(&mut m, 0x4016), 1);
    }

    #[test]
    fn strobe_mode_returns_a_button() {
        let (mut m, input) = machine();
        input.set_button(0, button::A, true);
        m.write(CPU_BUS, 0x4016, 1).unwrap();

        assert_eq!(read_bit(&mut m, 0x4016), 1);
        assert_eq!(read_bit(&mut m, 0x4016), 1);

        input.set_button(0, button::A, false);
        assert_eq!(read_bit(&mut m, 0x4016), 0);
    }

    #[test]
    fn port_two_reads_at_4017_and_ignores_writes() {
        let (mut m, input) = machine();
        input.set_buttons(1, 0b0000_0010);
        m.write(CPU_BUS, 0x4016, 1).unwrap();
        m.write(CPU_BUS, 0x4016, 0).unwrap();

        assert_eq!(read_bit(&mut m, 0x4017), 0);
        assert_eq!(read_bit(&mut m, 0x4017), 1);
        // Port 1 is independent
        assert_eq!(read_bit(&mut m, 0x4016), 0);
        assert!(m.write(CPU_BUS, 0x4017, 0).is_err());
    }

    #[test]
    fn upper_bits_are_open_bus() {
        let (mut m, _input) = machine();
        m.write(CPU_BUS, 0x4016, 0x40).unwrap();
        assert_eq!(m.read(CPU_BUS, 0x4016).unwrap() & 0xE0, 0x40);
    }
}
