//! Devices: CPUs and controllers plugged into a machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::BusContext;
use crate::observable::Value;
use crate::resource::{BusId, Resource};

/// Index of a device in its machine, equal to registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device{}", self.0)
    }
}

/// Role of a device. CPUs listen on the interrupt lines they declare;
/// controllers drive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Controller,
}

/// Video output description, reported by a frame-producing device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoConfig {
    /// Native display width in pixels.
    pub width: u32,
    /// Native display height in pixels.
    pub height: u32,
    /// Display aspect ratio (width / height as shown, not as stored).
    pub aspect_ratio: f32,
    /// Frame rate in frames per second.
    pub fps: f64,
}

/// Audio output description, reported by a sound-producing device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
}

/// A CPU or controller instance.
///
/// A device declares its resources once, at registration; the machine turns
/// memory resources into address-map entries forwarding to
/// [`read`](Device::read)/[`write`](Device::write), interrupt lines into
/// router lines, and clock domains into calls to [`tick`](Device::tick).
/// Everything else about the device is its own private state.
pub trait Device {
    /// Instance name, unique within a machine by convention.
    fn name(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Bus the device masters by default, if any.
    fn default_bus(&self) -> Option<BusId> {
        None
    }

    /// Resources claimed by this device, in declaration order.
    fn resources(&self) -> Vec<Resource>;

    /// Re-enter the power-on state.
    fn reset(&mut self) {}

    /// One cycle of the device's `clock`-th declared clock domain.
    fn tick(&mut self, clock: usize, bus: &mut BusContext<'_>) {
        let _ = (clock, bus);
    }

    /// Read from one of the device's memory ranges. `address` is the
    /// bus-relative address after mirror redirection.
    fn read(&mut self, bus_id: BusId, address: u32, bus: &mut BusContext<'_>) -> u8 {
        let _ = address;
        bus.open_bus(bus_id)
    }

    /// Write to one of the device's memory ranges.
    fn write(&mut self, bus_id: BusId, address: u32, value: u8, bus: &mut BusContext<'_>) {
        let _ = (bus_id, address, value, bus);
    }

    /// Query internal state by path. Never affects emulation.
    fn query(&self, path: &str) -> Option<Value> {
        let _ = path;
        None
    }

    /// Video timing and geometry, for frame-producing devices.
    fn video(&self) -> Option<VideoConfig> {
        None
    }

    /// Audio timing, for sound-producing devices.
    fn audio(&self) -> Option<AudioConfig> {
        None
    }
}
