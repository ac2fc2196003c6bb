//! Declarative resources a device claims at registration time.
//!
//! A resource is pure data: an address range on one bus (optionally with
//! mirrors), a named interrupt line, or a clock domain. Nothing here has
//! behaviour; the registry turns these claims into address-map entries,
//! router lines and scheduler domains.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::ClockRate;

/// An independent address space.
///
/// Addresses only mean something paired with a bus: two buses may reuse
/// the same numeric ranges without conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusId(pub u8);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus{}", self.0)
    }
}

/// Direction of a bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// Which access directions a memory range answers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Access {
    /// True if this range answers accesses in the given direction.
    #[must_use]
    pub const fn allows(self, direction: Direction) -> bool {
        match (self, direction) {
            (Self::ReadWrite, _)
            | (Self::ReadOnly, Direction::Read)
            | (Self::WriteOnly, Direction::Write) => true,
            (Self::ReadOnly, Direction::Write) | (Self::WriteOnly, Direction::Read) => false,
        }
    }

    /// True if both ranges answer at least one common direction.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.allows(Direction::Read) && other.allows(Direction::Read))
            || (self.allows(Direction::Write) && other.allows(Direction::Write))
    }
}

/// An inclusive address range `[start, end]` on one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemRange {
    pub bus: BusId,
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub access: Access,
}

impl MemRange {
    #[must_use]
    pub const fn new(bus: BusId, start: u32, end: u32) -> Self {
        Self {
            bus,
            start,
            end,
            access: Access::ReadWrite,
        }
    }

    /// Same range, answering only the given access kind.
    #[must_use]
    pub const fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Number of addresses covered. Zero only for inverted (invalid) ranges.
    #[must_use]
    pub const fn size(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end as u64 - self.start as u64 + 1
        }
    }

    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    /// True if the two ranges share at least one address on the same bus.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.bus.0 == other.bus.0 && self.start <= other.end && other.start <= self.end
    }

    /// True if the ranges intersect and answer a common access direction.
    #[must_use]
    pub const fn conflicts(&self, other: &Self) -> bool {
        self.intersects(other) && self.access.intersects(other.access)
    }
}

impl fmt::Display for MemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:${:04X}-${:04X}", self.bus, self.start, self.end)
    }
}

/// Identity of an interrupt line: every declaration with the same name
/// and number refers to the same logical signal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub name: String,
    pub number: u32,
}

impl LineKey {
    #[must_use]
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.number)
    }
}

/// A named oscillator frequency, expressed relative to the master clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDomain {
    pub name: String,
    pub rate: ClockRate,
}

/// A claim made by a device on address space, an interrupt line or a clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Claims `[start, end]` on one bus.
    MemRange { name: String, range: MemRange },
    /// A primary range plus ranges that alias the same backing target.
    MemRangeWithMirrors {
        name: String,
        range: MemRange,
        mirrors: Vec<MemRange>,
    },
    /// A named, numbered signal.
    InterruptLine(LineKey),
    /// A clock domain the device is ticked in.
    ClockDomain(ClockDomain),
}

impl Resource {
    /// `MEM(name, bus, start, end)`.
    #[must_use]
    pub fn mem(name: impl Into<String>, bus: BusId, start: u32, end: u32) -> Self {
        Self::MemRange {
            name: name.into(),
            range: MemRange::new(bus, start, end),
        }
    }

    /// A plain memory range with an explicit access direction.
    #[must_use]
    pub fn mem_access(
        name: impl Into<String>,
        bus: BusId,
        start: u32,
        end: u32,
        access: Access,
    ) -> Self {
        Self::MemRange {
            name: name.into(),
            range: MemRange::new(bus, start, end).with_access(access),
        }
    }

    /// `MEMX(name, bus, start, end, mirrors)`.
    #[must_use]
    pub fn mem_mirrored(
        name: impl Into<String>,
        bus: BusId,
        start: u32,
        end: u32,
        mirrors: impl IntoIterator<Item = MemRange>,
    ) -> Self {
        Self::MemRangeWithMirrors {
            name: name.into(),
            range: MemRange::new(bus, start, end),
            mirrors: mirrors.into_iter().collect(),
        }
    }

    /// `IRQ(name, number)`.
    #[must_use]
    pub fn irq(name: impl Into<String>, number: u32) -> Self {
        Self::InterruptLine(LineKey::new(name, number))
    }

    /// `CLK(name, rate)`.
    #[must_use]
    pub fn clock(name: impl Into<String>, rate: ClockRate) -> Self {
        Self::ClockDomain(ClockDomain {
            name: name.into(),
            rate,
        })
    }

    /// Name used in errors and map listings.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::MemRange { name, .. } | Self::MemRangeWithMirrors { name, .. } => name,
            Self::InterruptLine(line) => &line.name,
            Self::ClockDomain(domain) => &domain.name,
        }
    }

    /// Primary range and mirrors, if this is a memory resource.
    #[must_use]
    pub fn memory(&self) -> Option<(&MemRange, &[MemRange])> {
        match self {
            Self::MemRange { range, .. } => Some((range, &[])),
            Self::MemRangeWithMirrors { range, mirrors, .. } => Some((range, mirrors)),
            Self::InterruptLine(_) | Self::ClockDomain(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUS: BusId = BusId(0);

    #[test]
    fn range_size_is_inclusive() {
        assert_eq!(MemRange::new(BUS, 0x0000, 0x07FF).size(), 0x800);
        assert_eq!(MemRange::new(BUS, 0x4014, 0x4014).size(), 1);
        assert_eq!(MemRange::new(BUS, 0x10, 0x0F).size(), 0);
    }

    #[test]
    fn ranges_on_different_buses_never_intersect() {
        let a = MemRange::new(BusId(0), 0x2000, 0x2FFF);
        let b = MemRange::new(BusId(1), 0x2000, 0x2FFF);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn read_only_and_write_only_do_not_conflict() {
        let port = MemRange::new(BUS, 0x4016, 0x4017);
        let seq = MemRange::new(BUS, 0x4017, 0x4017).with_access(Access::WriteOnly);
        assert!(port.conflicts(&seq));

        let port2 = MemRange::new(BUS, 0x4017, 0x4017).with_access(Access::ReadOnly);
        assert!(!port2.conflicts(&seq));
    }

    #[test]
    fn resource_round_trips_through_json() {
        let res = Resource::mem_mirrored(
            "mem",
            BUS,
            0x0000,
            0x07FF,
            [MemRange::new(BUS, 0x0800, 0x1FFF)],
        );
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"kind\":\"mem_range_with_mirrors\""));
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, res);
    }

    #[test]
    fn access_defaults_when_omitted() {
        let range: MemRange =
            serde_json::from_str(r#"{"bus":1,"start":8192,"end":12287}"#).unwrap();
        assert_eq!(range.access, Access::ReadWrite);
        assert_eq!(range.bus, BusId(1));
    }
}
