//! Device registration: validate a device's resources, then install all of
//! them or none.

use tracing::debug;

use crate::address_map::{AddressMaps, Target};
use crate::bus::Slot;
use crate::clock::{ClockScheduler, MasterClock};
use crate::device::{Device, DeviceId, DeviceKind};
use crate::error::{OverlapError, RegistrationError, ResourceError};
use crate::interrupt::{InterruptRouter, LineRole};
use crate::region::{RegionId, RegionSpec};
use crate::resource::{ClockDomain, LineKey, MemRange, Resource};

/// A memory resource that passed validation but is not yet installed.
struct StagedMemory<'r> {
    name: &'r str,
    range: MemRange,
    mirrors: &'r [MemRange],
}

/// Everything a device declared, validated and ready to commit.
struct Staged<'r> {
    memory: Vec<StagedMemory<'r>>,
    lines: Vec<&'r LineKey>,
    clocks: Vec<&'r ClockDomain>,
}

/// Holds registered devices and the address maps, interrupt lines and
/// clock domains their resources produced.
pub struct DeviceRegistry {
    pub(crate) maps: AddressMaps,
    pub(crate) router: InterruptRouter,
    pub(crate) scheduler: ClockScheduler,
    pub(crate) slots: Vec<Slot>,
    pub(crate) regions: Vec<(RegionSpec, MemRange)>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(master: MasterClock) -> Self {
        Self {
            maps: AddressMaps::new(),
            router: InterruptRouter::new(),
            scheduler: ClockScheduler::new(master),
            slots: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Register a device. On error nothing of the device is installed and
    /// the registry is exactly as it was.
    pub fn register(&mut self, device: Box<dyn Device>) -> Result<DeviceId, RegistrationError> {
        let owner = device.name().to_string();
        if self.slots.iter().any(|slot| slot.name == owner) {
            return Err(RegistrationError {
                device: owner.clone(),
                resource: owner,
                source: ResourceError::DuplicateDevice,
            });
        }
        let resources = device.resources();
        let staged = self.stage(&owner, &resources)?;

        let id = DeviceId(self.slots.len());
        let target = Target::Device(id);
        for mem in &staged.memory {
            self.install(mem, &owner, target);
        }
        let role = match device.kind() {
            DeviceKind::Cpu => LineRole::Listener,
            DeviceKind::Controller => LineRole::Source,
        };
        for line in &staged.lines {
            self.router.declare((*line).clone(), id, role);
        }
        for (index, domain) in staged.clocks.iter().enumerate() {
            self.scheduler.add(id, index, domain);
        }

        debug!(
            device = %owner,
            %id,
            ranges = staged.memory.len(),
            lines = staged.lines.len(),
            clocks = staged.clocks.len(),
            "device registered"
        );
        self.slots.push(Slot {
            name: owner,
            kind: device.kind(),
            device: Some(device),
        });
        Ok(id)
    }

    /// Register a storage-backed region. Storage is allocated later, when
    /// the machine is built, so a failing registration allocates nothing.
    pub fn register_region(&mut self, spec: RegionSpec) -> Result<RegionId, RegistrationError> {
        let owner = spec.name().to_string();
        if spec.area.memory().is_none() {
            return Err(RegistrationError {
                device: owner.clone(),
                resource: owner,
                source: ResourceError::NotMemory,
            });
        }
        let staged = self.stage(&owner, std::slice::from_ref(&spec.area))?;

        let id = RegionId(self.regions.len());
        let range = staged.memory[0].range;
        self.install(&staged.memory[0], &owner, Target::Region(id));
        debug!(region = %owner, %range, "region registered");
        self.regions.push((spec, range));
        Ok(id)
    }

    fn install(&mut self, mem: &StagedMemory<'_>, owner: &str, target: Target) {
        self.maps.add(mem.name, owner, mem.range, target);
        for mirror in mem.mirrors {
            self.maps
                .add_mirror(mem.name, owner, *mirror, mem.range, target);
        }
    }

    fn stage<'r>(
        &self,
        owner: &str,
        resources: &'r [Resource],
    ) -> Result<Staged<'r>, RegistrationError> {
        let mut staged = Staged {
            memory: Vec::new(),
            lines: Vec::new(),
            clocks: Vec::new(),
        };
        for resource in resources {
            let fail = |source| RegistrationError {
                device: owner.to_string(),
                resource: resource.name().to_string(),
                source,
            };
            if resource.name().is_empty() {
                return Err(fail(ResourceError::EmptyName));
            }
            match resource {
                Resource::MemRange { name, range } => {
                    self.check_memory(owner, range, &[], &staged.memory)
                        .map_err(fail)?;
                    staged.memory.push(StagedMemory {
                        name,
                        range: *range,
                        mirrors: &[],
                    });
                }
                Resource::MemRangeWithMirrors {
                    name,
                    range,
                    mirrors,
                } => {
                    self.check_memory(owner, range, mirrors, &staged.memory)
                        .map_err(fail)?;
                    staged.memory.push(StagedMemory {
                        name,
                        range: *range,
                        mirrors,
                    });
                }
                Resource::InterruptLine(line) => {
                    if staged.lines.contains(&line) {
                        return Err(fail(ResourceError::DuplicateInterrupt(line.clone())));
                    }
                    staged.lines.push(line);
                }
                Resource::ClockDomain(domain) => {
                    if !domain.rate.is_valid() {
                        return Err(fail(ResourceError::InvalidClock {
                            num: domain.rate.num,
                            den: domain.rate.den,
                        }));
                    }
                    if staged.clocks.iter().any(|c| c.name == domain.name) {
                        return Err(fail(ResourceError::DuplicateClock(domain.name.clone())));
                    }
                    staged.clocks.push(domain);
                }
            }
        }
        Ok(staged)
    }

    fn check_memory(
        &self,
        owner: &str,
        range: &MemRange,
        mirrors: &[MemRange],
        pending: &[StagedMemory<'_>],
    ) -> Result<(), ResourceError> {
        if range.end < range.start {
            return Err(ResourceError::InvalidRange(*range));
        }
        for mirror in mirrors {
            if mirror.bus != range.bus {
                return Err(ResourceError::MirrorBusMismatch {
                    bus: range.bus,
                    mirror: *mirror,
                });
            }
            if mirror.end < mirror.start {
                return Err(ResourceError::InvalidRange(*mirror));
            }
        }
        self.maps.check(range)?;
        if let Some(clash) = pending.iter().find(|p| p.range.conflicts(range)) {
            return Err(OverlapError {
                bus: range.bus,
                new: *range,
                existing: clash.range,
                owner: owner.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names of registered devices, in registration order.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    #[must_use]
    pub fn maps(&self) -> &AddressMaps {
        &self.maps
    }

    #[must_use]
    pub fn router(&self) -> &InterruptRouter {
        &self.router
    }

    #[must_use]
    pub fn scheduler(&self) -> &ClockScheduler {
        &self.scheduler
    }
}
