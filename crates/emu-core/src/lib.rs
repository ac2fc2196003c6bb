//! Composition core for multi-machine emulation.
//!
//! A machine is assembled from devices that declare resources: memory
//! ranges (optionally mirrored) on numbered buses, named interrupt lines and
//! clock domains expressed as ratios of one master crystal. Registration
//! validates and installs those declarations atomically; the resulting
//! [`Machine`] steps every domain from the master tick without drift,
//! resolves bus accesses through per-bus address maps, and routes
//! interrupt assertions from controllers to the CPUs listening on them.

mod address_map;
mod bus;
mod clock;
mod definition;
mod device;
mod error;
mod interrupt;
mod machine;
mod observable;
mod region;
mod registry;
mod resource;

pub use address_map::{AddressMap, AddressMaps, MapEntry, Resolved, Target};
pub use bus::{BusContext, OpenBus};
pub use clock::{ClockRate, ClockScheduler, DomainState, Fired, MasterClock, Ticks};
pub use definition::{MachineDefinition, VideoStandard};
pub use device::{AudioConfig, Device, DeviceId, DeviceKind, VideoConfig};
pub use error::{
    AllocationError, BusError, InitError, LineError, OverlapError, RegistrationError,
    ResourceError, UnmappedAddressError,
};
pub use interrupt::{InterruptRouter, LineRole, LineState};
pub use machine::{Machine, MachineBuilder};
pub use observable::{Observable, Value};
pub use region::{Region, RegionId, RegionKind, RegionSpec, ResetPolicy};
pub use registry::DeviceRegistry;
pub use resource::{Access, BusId, ClockDomain, Direction, LineKey, MemRange, Resource};
