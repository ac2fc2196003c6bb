//! Machine construction and lifecycle.
//!
//! A [`MachineBuilder`] collects region and device declarations in order.
//! [`MachineBuilder::init`] registers every one of them, and only when all
//! registrations succeed allocates region storage. Any failure drops
//! everything built so far; there is no partially constructed machine.

use tracing::debug;

use crate::address_map::{AddressMaps, MapEntry, Target};
use crate::bus::{BusContext, DataLatch, FrameSignal, OpenBus, Slot};
use crate::clock::{ClockScheduler, Fired, MasterClock, Ticks};
use crate::device::{AudioConfig, Device, DeviceId, DeviceKind, VideoConfig};
use crate::error::{BusError, InitError};
use crate::interrupt::{InterruptRouter, LineState};
use crate::observable::{Observable, Value};
use crate::region::{Region, RegionId, RegionSpec};
use crate::registry::DeviceRegistry;
use crate::resource::{BusId, Direction, LineKey};

enum Declaration {
    Region { spec: RegionSpec, primary: bool },
    Device(Box<dyn Device>),
}

/// Ordered declarations for one machine instance.
pub struct MachineBuilder {
    name: String,
    master: MasterClock,
    open_bus: OpenBus,
    declarations: Vec<Declaration>,
}

impl MachineBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, master: MasterClock) -> Self {
        Self {
            name: name.into(),
            master,
            open_bus: OpenBus::default(),
            declarations: Vec::new(),
        }
    }

    /// What unmapped reads return on this machine.
    #[must_use]
    pub fn open_bus(mut self, policy: OpenBus) -> Self {
        self.open_bus = policy;
        self
    }

    /// Declare a storage-backed region.
    #[must_use]
    pub fn region(mut self, spec: RegionSpec) -> Self {
        self.declarations.push(Declaration::Region {
            spec,
            primary: false,
        });
        self
    }

    /// Declare the region exposed to the host as the machine's main RAM.
    #[must_use]
    pub fn primary_ram(mut self, spec: RegionSpec) -> Self {
        self.declarations.push(Declaration::Region {
            spec,
            primary: true,
        });
        self
    }

    /// Declare a device. Devices register, and tick, in declaration order.
    #[must_use]
    pub fn device(mut self, device: impl Device + 'static) -> Self {
        self.declarations.push(Declaration::Device(Box::new(device)));
        self
    }

    /// Register everything, allocate region storage, and return the machine.
    pub fn init(self) -> Result<Machine, InitError> {
        let mut registry = DeviceRegistry::new(self.master);
        let mut primary_ram = None;
        for declaration in self.declarations {
            match declaration {
                Declaration::Region { spec, primary } => {
                    let id = registry.register_region(spec)?;
                    if primary {
                        primary_ram = Some(id);
                    }
                }
                Declaration::Device(device) => {
                    registry.register(device)?;
                }
            }
        }

        let mut regions = Vec::with_capacity(registry.regions.len());
        for (spec, range) in &registry.regions {
            regions.push(Region::allocate(spec, *range)?);
        }

        debug!(
            machine = %self.name,
            devices = registry.len(),
            regions = regions.len(),
            "machine initialized"
        );
        let DeviceRegistry {
            maps,
            router,
            scheduler,
            slots,
            ..
        } = registry;
        Ok(Machine {
            name: self.name,
            maps,
            regions,
            devices: slots,
            router,
            scheduler,
            latch: DataLatch::new(self.open_bus),
            frame: FrameSignal::default(),
            fired: Vec::new(),
            primary_ram,
        })
    }
}

/// One emulated system: its devices, address maps, interrupt lines, clock
/// domains and region storage.
pub struct Machine {
    name: String,
    maps: AddressMaps,
    regions: Vec<Region>,
    devices: Vec<Slot>,
    router: InterruptRouter,
    scheduler: ClockScheduler,
    latch: DataLatch,
    frame: FrameSignal,
    fired: Vec<Fired>,
    primary_ram: Option<RegionId>,
}

impl Machine {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn master(&self) -> MasterClock {
        self.scheduler.master()
    }

    /// Advance one master tick. Every device whose domain completes a cycle
    /// runs to completion, in registration order, before the next one sees
    /// machine state.
    pub fn step(&mut self) {
        let mut fired = std::mem::take(&mut self.fired);
        fired.clear();
        self.scheduler.tick(&mut fired);
        for f in &fired {
            self.tick_device(f.device, f.clock);
        }
        self.fired = fired;
    }

    fn tick_device(&mut self, id: DeviceId, clock: usize) {
        let Some(mut device) = self.devices[id.0].device.take() else {
            return;
        };
        device.tick(clock, &mut self.context(Some(id)));
        self.devices[id.0].device = Some(device);
    }

    fn context(&mut self, current: Option<DeviceId>) -> BusContext<'_> {
        BusContext::new(
            current,
            &self.maps,
            &mut self.regions,
            &mut self.devices,
            &mut self.router,
            &mut self.latch,
            &mut self.frame,
        )
    }

    /// Step until a device signals a complete frame or `limit` master ticks
    /// pass. Returns true if a frame was produced.
    pub fn run_frame(&mut self, limit: Ticks) -> bool {
        let start = self.scheduler.elapsed();
        while !self.take_frame() {
            if self.scheduler.elapsed().get() - start.get() >= limit.get() {
                return false;
            }
            self.step();
        }
        true
    }

    /// Consume the frame-complete flag.
    pub fn take_frame(&mut self) -> bool {
        std::mem::take(&mut self.frame.ready)
    }

    /// Frames signalled since init or the last reset.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame.count
    }

    /// Master ticks since init or the last reset.
    #[must_use]
    pub fn elapsed(&self) -> Ticks {
        self.scheduler.elapsed()
    }

    /// Return to power-on state without reallocating. Region contents
    /// follow each region's own reset policy.
    pub fn reset(&mut self) {
        for region in &mut self.regions {
            region.reset();
        }
        for slot in &mut self.devices {
            if let Some(device) = slot.device.as_mut() {
                device.reset();
            }
        }
        self.router.clear_all();
        self.scheduler.reset();
        self.latch.reset();
        self.frame = FrameSignal::default();
        debug!(machine = %self.name, "machine reset");
    }

    /// Release the machine and everything it owns.
    pub fn deinit(self) {
        debug!(machine = %self.name, "machine deinitialized");
    }

    /// Read as the host (a debugger): device handlers run with their side
    /// effects, and interrupt operations are ignored.
    pub fn read(&mut self, bus: BusId, address: u32) -> Result<u8, BusError> {
        self.context(None).read(bus, address)
    }

    /// Write as the host.
    pub fn write(&mut self, bus: BusId, address: u32, value: u8) -> Result<(), BusError> {
        self.context(None).write(bus, address, value)
    }

    /// Side-effect-free read of region-backed addresses. Device-owned and
    /// unmapped addresses return `None`.
    #[must_use]
    pub fn peek(&self, bus: BusId, address: u32) -> Option<u8> {
        let resolved = self.maps.resolve(bus, address, Direction::Read).ok()?;
        match resolved.target {
            Target::Region(id) => Some(self.regions[id.0].read(resolved.offset)),
            Target::Device(_) => None,
        }
    }

    /// The designated main RAM, for external inspection.
    #[must_use]
    pub fn primary_ram(&self) -> Option<&[u8]> {
        self.primary_ram.map(|id| self.regions[id.0].as_slice())
    }

    pub fn primary_ram_mut(&mut self) -> Option<&mut [u8]> {
        let id = self.primary_ram?;
        Some(self.regions[id.0].as_mut_slice())
    }

    #[must_use]
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name() == name)
    }

    pub fn region_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.name() == name)
    }

    /// Every mapped range on every bus.
    #[must_use]
    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.maps.entries()
    }

    #[must_use]
    pub fn line_state(&self, line: &LineKey) -> Option<LineState> {
        self.router.state(line)
    }

    #[must_use]
    pub fn router(&self) -> &InterruptRouter {
        &self.router
    }

    #[must_use]
    pub fn scheduler(&self) -> &ClockScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .position(|slot| slot.name == name)
            .map(DeviceId)
    }

    /// Registered devices with their roles, in registration order.
    pub fn devices(&self) -> impl Iterator<Item = (&str, DeviceKind)> {
        self.devices
            .iter()
            .map(|slot| (slot.name.as_str(), slot.kind))
    }

    /// Video timing and geometry of the first frame-producing device.
    #[must_use]
    pub fn video(&self) -> Option<VideoConfig> {
        self.devices
            .iter()
            .filter_map(|slot| slot.device.as_ref())
            .find_map(|device| device.video())
    }

    /// Audio timing of the first sound-producing device.
    #[must_use]
    pub fn audio(&self) -> Option<AudioConfig> {
        self.devices
            .iter()
            .filter_map(|slot| slot.device.as_ref())
            .find_map(|device| device.audio())
    }
}

fn parse_address(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

impl Observable for Machine {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("device.") {
            let (name, inner) = rest.split_once('.')?;
            let id = self.device_id(name)?;
            self.devices[id.0].device.as_ref()?.query(inner)
        } else if let Some(rest) = path.strip_prefix("irq.") {
            let (name, number) = rest.rsplit_once('.')?;
            let line = LineKey::new(name, number.parse().ok()?);
            self.router
                .is_declared(&line)
                .then(|| Value::Bool(self.router.level(&line)))
        } else if let Some(rest) = path.strip_prefix("clock.") {
            let (device, domain) = rest.split_once('.')?;
            let id = self.device_id(device)?;
            self.scheduler
                .domain(id, domain)
                .map(|d| Value::U64(d.cycles()))
        } else if let Some(rest) = path.strip_prefix("bus") {
            let (bus, address) = rest.split_once('.')?;
            let bus = BusId(bus.parse().ok()?);
            self.peek(bus, parse_address(address)?).map(Value::U8)
        } else {
            match path {
                "master_ticks" => Some(self.elapsed().get().into()),
                "frame_count" => Some(self.frame.count.into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "master_ticks",
            "frame_count",
            "bus<N>.<address>",
            "irq.<name>.<number>",
            "clock.<device>.<domain>",
            "device.<name>.<path>",
        ]
    }
}
