//! Error taxonomy for machine construction and bus access.

use thiserror::Error;

use crate::resource::{BusId, LineKey, MemRange};

/// Two non-mirror ranges collide on one bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{new} overlaps {existing} owned by '{owner}'")]
pub struct OverlapError {
    pub bus: BusId,
    pub new: MemRange,
    pub existing: MemRange,
    pub owner: String,
}

/// An access fell outside every declared range on its bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unmapped address ${address:04X} on {bus}")]
pub struct UnmappedAddressError {
    pub bus: BusId,
    pub address: u32,
}

/// Why a single resource failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Overlap(#[from] OverlapError),

    #[error("range {0} ends before it starts")]
    InvalidRange(MemRange),

    #[error("mirror {mirror} is not on the primary's bus {bus}")]
    MirrorBusMismatch { bus: BusId, mirror: MemRange },

    #[error("clock rate {num}/{den} of master is not schedulable")]
    InvalidClock { num: u64, den: u64 },

    #[error("interrupt line {0} declared twice by one device")]
    DuplicateInterrupt(LineKey),

    #[error("clock domain '{0}' declared twice by one device")]
    DuplicateClock(String),

    #[error("a device with this name is already registered")]
    DuplicateDevice,

    #[error("resource has an empty name")]
    EmptyName,

    #[error("region area must be a memory range")]
    NotMemory,
}

/// A device (or region) could not be registered; nothing of it was installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot register '{device}' resource '{resource}': {source}")]
pub struct RegistrationError {
    pub device: String,
    pub resource: String,
    #[source]
    pub source: ResourceError,
}

impl RegistrationError {
    /// The overlap that caused this failure, if any.
    #[must_use]
    pub fn overlap(&self) -> Option<&OverlapError> {
        match &self.source {
            ResourceError::Overlap(overlap) => Some(overlap),
            _ => None,
        }
    }
}

/// Backing storage for a region could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("out of memory allocating {bytes} bytes for region '{region}'")]
pub struct AllocationError {
    pub region: String,
    pub bytes: usize,
}

/// A machine could not be constructed. No partial machine survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("machine definition rejected its content: {reason}")]
    Rejected { reason: String },
}

/// A runtime bus access failed. Never fatal to the machine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error(transparent)]
    Unmapped(#[from] UnmappedAddressError),

    #[error("device '{device}' is already handling an access")]
    Busy { device: String },
}

/// An interrupt operation named a line nobody declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("interrupt line {0} was never declared")]
pub struct LineError(pub LineKey);
