//! Per-bus address resolution with mirroring.
//!
//! Each bus keeps its primary ranges in two sorted index lists, one per
//! access direction. Primaries answering a common direction never overlap
//! (the registry refuses it), so resolution is a binary search. Mirrors are
//! checked afterwards in declaration order and redirect onto their primary
//! modulo the primary's size, which covers both periodic register mirrors
//! (8 bytes repeated over 8 KiB) and block mirrors (2 KiB over 6 KiB).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::device::DeviceId;
use crate::error::{OverlapError, UnmappedAddressError};
use crate::region::RegionId;
use crate::resource::{BusId, Direction, MemRange};

/// What answers an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// A storage-backed region; accesses touch its buffer at the offset.
    Region(RegionId),
    /// Forwarded to the owning device with the bus-relative address.
    Device(DeviceId),
}

/// Result of resolving an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub target: Target,
    /// Address within the primary range, after mirror redirection.
    pub address: u32,
    /// Offset from the start of the primary range.
    pub offset: usize,
}

/// One line of a memory-map listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub name: String,
    pub owner: String,
    pub range: MemRange,
    pub target: Target,
    /// Primary range this entry aliases, for mirrors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_of: Option<MemRange>,
}

#[derive(Debug, Clone)]
struct Primary {
    name: String,
    owner: String,
    range: MemRange,
    target: Target,
}

#[derive(Debug, Clone)]
struct Mirror {
    name: String,
    owner: String,
    range: MemRange,
    primary: MemRange,
    target: Target,
}

impl Mirror {
    fn allows(&self, direction: Direction) -> bool {
        self.range.access.allows(direction) && self.primary.access.allows(direction)
    }
}

/// Address map for one bus.
#[derive(Debug, Clone)]
pub struct AddressMap {
    bus: BusId,
    primaries: Vec<Primary>,
    readable: Vec<usize>,
    writable: Vec<usize>,
    mirrors: Vec<Mirror>,
}

impl AddressMap {
    #[must_use]
    pub fn new(bus: BusId) -> Self {
        Self {
            bus,
            primaries: Vec::new(),
            readable: Vec::new(),
            writable: Vec::new(),
            mirrors: Vec::new(),
        }
    }

    #[must_use]
    pub fn bus(&self) -> BusId {
        self.bus
    }

    /// Fail if `range` conflicts with an installed primary.
    pub fn check(&self, range: &MemRange) -> Result<(), OverlapError> {
        match self.primaries.iter().find(|p| p.range.conflicts(range)) {
            Some(existing) => Err(OverlapError {
                bus: self.bus,
                new: *range,
                existing: existing.range,
                owner: existing.owner.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Install a primary range after a successful [`check`](Self::check).
    pub fn add(&mut self, name: &str, owner: &str, range: MemRange, target: Target) {
        let index = self.primaries.len();
        self.primaries.push(Primary {
            name: name.to_string(),
            owner: owner.to_string(),
            range,
            target,
        });
        let primaries = &self.primaries;
        for (direction, list) in [
            (Direction::Read, &mut self.readable),
            (Direction::Write, &mut self.writable),
        ] {
            if range.access.allows(direction) {
                let at = list.partition_point(|&i| primaries[i].range.start < range.start);
                list.insert(at, index);
            }
        }
    }

    /// Install a mirror of `primary`. Mirrors are exempt from overlap checks
    /// and always resolve to their primary's target.
    pub fn add_mirror(
        &mut self,
        name: &str,
        owner: &str,
        range: MemRange,
        primary: MemRange,
        target: Target,
    ) {
        self.mirrors.push(Mirror {
            name: name.to_string(),
            owner: owner.to_string(),
            range,
            primary,
            target,
        });
    }

    fn lookup(&self, address: u32, direction: Direction) -> Option<&Primary> {
        let list = match direction {
            Direction::Read => &self.readable,
            Direction::Write => &self.writable,
        };
        let at = list.partition_point(|&i| self.primaries[i].range.start <= address);
        let candidate = &self.primaries[*list.get(at.checked_sub(1)?)?];
        candidate.range.contains(address).then_some(candidate)
    }

    /// Resolve `address` for an access in `direction`.
    pub fn resolve(
        &self,
        address: u32,
        direction: Direction,
    ) -> Result<Resolved, UnmappedAddressError> {
        if let Some(primary) = self.lookup(address, direction) {
            return Ok(Resolved {
                target: primary.target,
                address,
                offset: (address - primary.range.start) as usize,
            });
        }

        let mirror = self
            .mirrors
            .iter()
            .find(|m| m.range.contains(address) && m.allows(direction));
        if let Some(mirror) = mirror {
            let size = mirror.primary.size();
            let offset = u64::from(address - mirror.range.start) % size;
            return Ok(Resolved {
                target: mirror.target,
                address: mirror.primary.start + offset as u32,
                offset: offset as usize,
            });
        }

        Err(UnmappedAddressError {
            bus: self.bus,
            address,
        })
    }

    /// Every installed range, primaries by address then mirrors in
    /// declaration order.
    #[must_use]
    pub fn entries(&self) -> Vec<MapEntry> {
        let mut order: Vec<usize> = (0..self.primaries.len()).collect();
        order.sort_by_key(|&i| {
            (self.primaries[i].range.start, self.primaries[i].range.end)
        });
        let primaries = order.into_iter().map(|i| {
            let p = &self.primaries[i];
            MapEntry {
                name: p.name.clone(),
                owner: p.owner.clone(),
                range: p.range,
                target: p.target,
                mirror_of: None,
            }
        });
        let mirrors = self.mirrors.iter().map(|m| MapEntry {
            name: m.name.clone(),
            owner: m.owner.clone(),
            range: m.range,
            target: m.target,
            mirror_of: Some(m.primary),
        });
        primaries.chain(mirrors).collect()
    }
}

/// The address maps of every bus a machine has seen.
#[derive(Debug, Clone, Default)]
pub struct AddressMaps {
    buses: BTreeMap<BusId, AddressMap>,
}

impl AddressMaps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, range: &MemRange) -> Result<(), OverlapError> {
        self.buses
            .get(&range.bus)
            .map_or(Ok(()), |map| map.check(range))
    }

    pub fn add(&mut self, name: &str, owner: &str, range: MemRange, target: Target) {
        self.buses
            .entry(range.bus)
            .or_insert_with(|| AddressMap::new(range.bus))
            .add(name, owner, range, target);
    }

    pub fn add_mirror(
        &mut self,
        name: &str,
        owner: &str,
        range: MemRange,
        primary: MemRange,
        target: Target,
    ) {
        self.buses
            .entry(range.bus)
            .or_insert_with(|| AddressMap::new(range.bus))
            .add_mirror(name, owner, range, primary, target);
    }

    pub fn resolve(
        &self,
        bus: BusId,
        address: u32,
        direction: Direction,
    ) -> Result<Resolved, UnmappedAddressError> {
        self.buses
            .get(&bus)
            .ok_or(UnmappedAddressError { bus, address })?
            .resolve(address, direction)
    }

    #[must_use]
    pub fn get(&self, bus: BusId) -> Option<&AddressMap> {
        self.buses.get(&bus)
    }

    /// Buses with at least one installed range, in id order.
    pub fn buses(&self) -> impl Iterator<Item = BusId> + '_ {
        self.buses.keys().copied()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<MapEntry> {
        self.buses.values().flat_map(AddressMap::entries).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Access;
    use proptest::prelude::*;

    const CPU: BusId = BusId(0);
    const RAM: Target = Target::Region(RegionId(0));
    const PPU: Target = Target::Device(DeviceId(3));

    fn nes_like() -> AddressMap {
        let mut map = AddressMap::new(CPU);
        let wram = MemRange::new(CPU, 0x0000, 0x07FF);
        let regs = MemRange::new(CPU, 0x2000, 0x2007);
        map.add("mem", "wram", wram, RAM);
        map.add_mirror("mem", "wram", MemRange::new(CPU, 0x0800, 0x1FFF), wram, RAM);
        map.add("mem", "ppu", regs, PPU);
        map.add_mirror(
            "mem_mirror",
            "ppu",
            MemRange::new(CPU, 0x2008, 0x3FFF),
            regs,
            PPU,
        );
        map
    }

    #[test]
    fn primary_resolves_to_offset() {
        let map = nes_like();
        let r = map.resolve(0x0123, Direction::Read).unwrap();
        assert_eq!(r.target, RAM);
        assert_eq!(r.offset, 0x123);
        assert_eq!(r.address, 0x0123);
    }

    #[test]
    fn block_mirror_wraps_onto_primary() {
        let map = nes_like();
        let r = map.resolve(0x1800, Direction::Write).unwrap();
        assert_eq!(r.target, RAM);
        assert_eq!(r.offset, 0);
        let r = map.resolve(0x1FFF, Direction::Read).unwrap();
        assert_eq!(r.offset, 0x7FF);
    }

    #[test]
    fn mirror_boundaries_wrap_at_primary_size() {
        let map = nes_like();
        // First mirror byte, last byte of the first copy, start of the
        // second copy and the mirror's last byte
        for (address, offset) in [(0x0800, 0), (0x0FFF, 0x7FF), (0x1000, 0), (0x1FFF, 0x7FF)] {
            let r = map.resolve(address, Direction::Read).unwrap();
            assert_eq!(r.target, RAM, "${address:04X}");
            assert_eq!(r.offset, offset, "${address:04X}");
            assert_eq!(r.address, offset as u32, "${address:04X}");
        }
    }

    #[test]
    fn register_mirror_forwards_primary_address() {
        let map = nes_like();
        let r = map.resolve(0x3FFA, Direction::Read).unwrap();
        assert_eq!(r.target, PPU);
        assert_eq!(r.address, 0x2002);
        assert_eq!(r.offset, 2);
    }

    #[test]
    fn unmapped_address_is_typed_failure() {
        let map = nes_like();
        let err = map.resolve(0x4000, Direction::Read).unwrap_err();
        assert_eq!(
            err,
            UnmappedAddressError {
                bus: CPU,
                address: 0x4000
            }
        );
    }

    #[test]
    fn overlap_is_reported_with_owner() {
        let mut map = AddressMap::new(CPU);
        map.add(
            "prg_rom",
            "nes_mapper",
            MemRange::new(CPU, 0x8000, 0xFFFF),
            PPU,
        );
        let err = map.check(&MemRange::new(CPU, 0x9000, 0x9100)).unwrap_err();
        assert_eq!(err.owner, "nes_mapper");
        assert_eq!(err.existing.start, 0x8000);
    }

    #[test]
    fn split_access_shares_an_address() {
        let mut map = AddressMap::new(CPU);
        let port = MemRange::new(CPU, 0x4017, 0x4017).with_access(Access::ReadOnly);
        let seq = MemRange::new(CPU, 0x4017, 0x4017).with_access(Access::WriteOnly);
        map.add("port2", "nes_controller", port, Target::Device(DeviceId(4)));
        map.check(&seq).unwrap();
        map.add("seq", "apu", seq, Target::Device(DeviceId(0)));

        let read = map.resolve(0x4017, Direction::Read).unwrap();
        let write = map.resolve(0x4017, Direction::Write).unwrap();
        assert_eq!(read.target, Target::Device(DeviceId(4)));
        assert_eq!(write.target, Target::Device(DeviceId(0)));
    }

    #[test]
    fn missing_bus_is_unmapped() {
        let maps = AddressMaps::new();
        assert!(maps.resolve(BusId(7), 0, Direction::Read).is_err());
    }

    #[test]
    fn entries_list_primaries_then_mirrors() {
        let entries = nes_like().entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].range.start, 0x0000);
        assert_eq!(entries[1].range.start, 0x2000);
        assert!(entries[2].mirror_of.is_some());
        let json = serde_json::to_string(&entries[1]).unwrap();
        assert!(json.contains("\"type\":\"device\""));
    }

    proptest! {
        #[test]
        fn mirror_equals_primary_modulo_size(
            size in 1u32..0x400,
            mirror_len in 1u32..0x4000,
            k in 0u32..0x4000,
        ) {
            let k = k % mirror_len;
            let primary = MemRange::new(CPU, 0x1000, 0x1000 + size - 1);
            let mirror = MemRange::new(CPU, 0x8000, 0x8000 + mirror_len - 1);
            let mut map = AddressMap::new(CPU);
            map.add("p", "dev", primary, RAM);
            map.add_mirror("m", "dev", mirror, primary, RAM);

            let via_mirror = map.resolve(0x8000 + k, Direction::Read).unwrap();
            let direct = map.resolve(0x1000 + k % size, Direction::Read).unwrap();
            prop_assert_eq!(via_mirror, direct);
        }

        #[test]
        fn disjoint_ranges_resolve_to_their_own_target(
            starts in proptest::collection::btree_set(0u32..0x100, 1..12),
        ) {
            // Ranges of 0x10 bytes on 0x100-aligned bases never overlap.
            let bases: Vec<u32> = starts.into_iter().map(|s| s * 0x100).collect();
            let mut map = AddressMap::new(CPU);
            for (i, &base) in bases.iter().enumerate() {
                let range = MemRange::new(CPU, base, base + 0xF);
                prop_assert!(map.check(&range).is_ok());
                map.add("r", "dev", range, Target::Region(RegionId(i)));
            }
            for (i, &base) in bases.iter().enumerate() {
                for addr in [base, base + 7, base + 0xF] {
                    let r = map.resolve(addr, Direction::Write).unwrap();
                    prop_assert_eq!(r.target, Target::Region(RegionId(i)));
                    prop_assert_eq!(r.offset, (addr - base) as usize);
                }
            }
        }
    }
}
