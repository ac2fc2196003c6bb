//! Bus access from inside a running machine.
//!
//! A [`BusContext`] is handed to every device callback. It resolves
//! addresses through the machine's address maps, touches region buffers
//! directly, and forwards device-owned ranges to the owning device's
//! `read`/`write` handler. The device being called is taken out of its slot
//! for the duration of the call, so a handler may itself access the bus
//! (a PPU register read that fetches from the PPU bus, a DMA engine copying
//! between ranges) without aliasing. A device reaching its own ranges
//! through the bus gets [`BusError::Busy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::address_map::{AddressMaps, Target};
use crate::device::{Device, DeviceId, DeviceKind};
use crate::error::BusError;
use crate::interrupt::InterruptRouter;
use crate::region::Region;
use crate::resource::{BusId, Direction, LineKey};

/// What an access to an unmapped address reads as.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenBus {
    /// The last value driven on that bus (read or written).
    #[default]
    LastValue,
    /// A constant, e.g. `0xFF` for pulled-up data lines.
    Fixed(u8),
}

/// Open-bus policy plus the last value seen on each bus.
#[derive(Debug, Clone, Default)]
pub(crate) struct DataLatch {
    policy: OpenBus,
    last: BTreeMap<BusId, u8>,
}

impl DataLatch {
    pub(crate) fn new(policy: OpenBus) -> Self {
        Self {
            policy,
            last: BTreeMap::new(),
        }
    }

    fn latch(&mut self, bus: BusId, value: u8) {
        self.last.insert(bus, value);
    }

    pub(crate) fn value(&self, bus: BusId) -> u8 {
        match self.policy {
            OpenBus::Fixed(value) => value,
            OpenBus::LastValue => self.last.get(&bus).copied().unwrap_or(0),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last.clear();
    }
}

/// Frame-boundary flag raised by a video device.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameSignal {
    pub(crate) ready: bool,
    pub(crate) count: u64,
}

/// A registered device and the bookkeeping needed to borrow it.
pub(crate) struct Slot {
    pub(crate) name: String,
    pub(crate) kind: DeviceKind,
    pub(crate) device: Option<Box<dyn Device>>,
}

/// Machine state a device may touch while it runs.
pub struct BusContext<'a> {
    current: Option<DeviceId>,
    maps: &'a AddressMaps,
    regions: &'a mut [Region],
    devices: &'a mut [Slot],
    router: &'a mut InterruptRouter,
    latch: &'a mut DataLatch,
    frame: &'a mut FrameSignal,
}

impl<'a> BusContext<'a> {
    pub(crate) fn new(
        current: Option<DeviceId>,
        maps: &'a AddressMaps,
        regions: &'a mut [Region],
        devices: &'a mut [Slot],
        router: &'a mut InterruptRouter,
        latch: &'a mut DataLatch,
        frame: &'a mut FrameSignal,
    ) -> Self {
        Self {
            current,
            maps,
            regions,
            devices,
            router,
            latch,
            frame,
        }
    }

    fn child(&mut self, current: DeviceId) -> BusContext<'_> {
        BusContext {
            current: Some(current),
            maps: self.maps,
            regions: &mut *self.regions,
            devices: &mut *self.devices,
            router: &mut *self.router,
            latch: &mut *self.latch,
            frame: &mut *self.frame,
        }
    }

    fn take(&mut self, id: DeviceId) -> Result<Box<dyn Device>, BusError> {
        let slot = &mut self.devices[id.0];
        slot.device.take().ok_or_else(|| BusError::Busy {
            device: slot.name.clone(),
        })
    }

    /// The device this context was handed to, or `None` for host accesses.
    #[must_use]
    pub fn current(&self) -> Option<DeviceId> {
        self.current
    }

    /// Read a byte. Unmapped addresses fail; the caller picks the policy.
    pub fn read(&mut self, bus: BusId, address: u32) -> Result<u8, BusError> {
        let resolved = self.maps.resolve(bus, address, Direction::Read)?;
        let value = match resolved.target {
            Target::Region(region) => self.regions[region.0].read(resolved.offset),
            Target::Device(id) => {
                let mut device = self.take(id)?;
                let value = device.read(bus, resolved.address, &mut self.child(id));
                self.devices[id.0].device = Some(device);
                value
            }
        };
        self.latch.latch(bus, value);
        Ok(value)
    }

    /// Write a byte. Unmapped addresses fail; the caller picks the policy.
    pub fn write(&mut self, bus: BusId, address: u32, value: u8) -> Result<(), BusError> {
        let resolved = self.maps.resolve(bus, address, Direction::Write)?;
        self.latch.latch(bus, value);
        match resolved.target {
            Target::Region(region) => self.regions[region.0].write(resolved.offset, value),
            Target::Device(id) => {
                let mut device = self.take(id)?;
                device.write(bus, resolved.address, value, &mut self.child(id));
                self.devices[id.0].device = Some(device);
            }
        }
        Ok(())
    }

    /// Read with the default raw-memory policy: failures read as open bus.
    pub fn read_or_open(&mut self, bus: BusId, address: u32) -> u8 {
        match self.read(bus, address) {
            Ok(value) => value,
            Err(err) => {
                trace!(%err, "read resolved as open bus");
                self.latch.value(bus)
            }
        }
    }

    /// Write with the default raw-memory policy: failures are ignored.
    pub fn write_or_ignore(&mut self, bus: BusId, address: u32, value: u8) {
        if let Err(err) = self.write(bus, address, value) {
            trace!(%err, "write ignored");
        }
    }

    /// Value an unmapped read on `bus` returns under the machine's policy.
    #[must_use]
    pub fn open_bus(&self, bus: BusId) -> u8 {
        self.latch.value(bus)
    }

    /// Assert a line on behalf of the current device.
    pub fn assert_line(&mut self, line: &LineKey) {
        let Some(source) = self.current else {
            return;
        };
        if let Err(err) = self.router.assert(line, source) {
            warn!(%err, %source, "assert on undeclared line");
        }
    }

    /// Withdraw the current device's assertion of a line.
    pub fn clear_line(&mut self, line: &LineKey) {
        let Some(source) = self.current else {
            return;
        };
        if let Err(err) = self.router.clear(line, source) {
            warn!(%err, %source, "clear on undeclared line");
        }
    }

    #[must_use]
    pub fn line_level(&self, line: &LineKey) -> bool {
        self.router.level(line)
    }

    #[must_use]
    pub fn line_edges(&self, line: &LineKey) -> u64 {
        self.router.edges(line)
    }

    /// Signal that a complete frame has been produced.
    pub fn frame_complete(&mut self) {
        self.frame.ready = true;
        self.frame.count += 1;
    }
}
