//! Storage-backed address ranges.

use serde::{Deserialize, Serialize};

use crate::error::AllocationError;
use crate::resource::{MemRange, Resource};

/// Index of a region in its machine, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub usize);

/// Read/write behaviour of a region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Reads and writes touch the buffer.
    #[default]
    Ram,
    /// Writes are ignored.
    Rom,
}

/// What happens to a region's contents on machine reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Contents survive reset, as on most real hardware.
    #[default]
    Preserve,
    /// Every byte is overwritten with the given value.
    Fill(u8),
}

/// Declaration of a region: the address area it answers and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// A `MemRange` or `MemRangeWithMirrors` resource.
    pub area: Resource,
    #[serde(default)]
    pub kind: RegionKind,
    #[serde(default)]
    pub reset: ResetPolicy,
    /// Power-on value of every byte.
    #[serde(default)]
    pub fill: u8,
    /// Initial image, copied over the fill at allocation (ROM contents).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
}

impl RegionSpec {
    /// A zero-filled RAM region preserved across reset.
    #[must_use]
    pub fn ram(area: Resource) -> Self {
        Self {
            area,
            kind: RegionKind::Ram,
            reset: ResetPolicy::Preserve,
            fill: 0,
            image: None,
        }
    }

    /// A read-only region holding `image`.
    #[must_use]
    pub fn rom(area: Resource, image: Vec<u8>) -> Self {
        Self {
            area,
            kind: RegionKind::Rom,
            reset: ResetPolicy::Preserve,
            fill: 0xFF,
            image: Some(image),
        }
    }

    #[must_use]
    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.area.name()
    }

    /// The primary range, if the area is a memory resource.
    #[must_use]
    pub fn primary(&self) -> Option<&MemRange> {
        self.area.memory().map(|(range, _)| range)
    }
}

/// A concrete region: one buffer bound to one primary range.
#[derive(Debug)]
pub struct Region {
    name: String,
    range: MemRange,
    kind: RegionKind,
    reset: ResetPolicy,
    data: Vec<u8>,
}

impl Region {
    /// Allocate storage for a declared region.
    ///
    /// The buffer covers the primary range exactly; mirrors alias it.
    pub fn allocate(spec: &RegionSpec, range: MemRange) -> Result<Self, AllocationError> {
        let oom = || AllocationError {
            region: spec.name().to_string(),
            bytes: usize::try_from(range.size()).unwrap_or(usize::MAX),
        };
        let len = usize::try_from(range.size()).map_err(|_| oom())?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| oom())?;
        data.resize(len, spec.fill);
        if let Some(image) = &spec.image {
            let n = image.len().min(len);
            data[..n].copy_from_slice(&image[..n]);
        }

        Ok(Self {
            name: spec.name().to_string(),
            range,
            kind: spec.kind,
            reset: spec.reset,
            data,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn range(&self) -> MemRange {
        self.range
    }

    #[must_use]
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Read the byte at `offset` from the start of the primary range.
    #[must_use]
    pub fn read(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write the byte at `offset`. ROM ignores writes.
    pub fn write(&mut self, offset: usize, value: u8) {
        if self.kind == RegionKind::Ram {
            self.data[offset] = value;
        }
    }

    /// Apply the region's reset policy. Never reallocates.
    pub fn reset(&mut self) {
        if let ResetPolicy::Fill(value) = self.reset {
            self.data.fill(value);
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Direct access for loaders and host inspection; bypasses the ROM
    /// write guard.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
