//! Shared interrupt lines.
//!
//! Every declaration of the same `(name, number)` names one logical signal.
//! A line remembers which sources currently assert it and reads active
//! while any of them does. The router does not interpret edge or level
//! triggering: it reports the current level and counts transitions, and
//! the listening CPU applies its own policy (edge-detected NMI,
//! level-sensitive IRQ) when it samples the line from its tick.

use std::collections::{BTreeMap, BTreeSet};

use crate::device::DeviceId;
use crate::error::LineError;
use crate::resource::LineKey;

/// How a device takes part in a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// Samples the line (CPUs).
    Listener,
    /// Drives the line (controllers).
    Source,
}

/// Snapshot of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineState {
    pub level: bool,
    /// Inactive → active transitions so far.
    pub rising: u64,
    /// Active → inactive transitions so far.
    pub falling: u64,
    /// Sources currently asserting.
    pub asserters: usize,
}

#[derive(Debug, Clone, Default)]
struct Line {
    listeners: Vec<DeviceId>,
    sources: Vec<DeviceId>,
    asserted: BTreeSet<DeviceId>,
    rising: u64,
    falling: u64,
}

/// Maps named lines to their listeners and aggregates assertions.
#[derive(Debug, Clone, Default)]
pub struct InterruptRouter {
    lines: BTreeMap<LineKey, Line>,
}

impl InterruptRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device to a line, creating the line on first declaration.
    pub fn declare(&mut self, key: LineKey, device: DeviceId, role: LineRole) {
        let line = self.lines.entry(key).or_default();
        let list = match role {
            LineRole::Listener => &mut line.listeners,
            LineRole::Source => &mut line.sources,
        };
        if !list.contains(&device) {
            list.push(device);
        }
    }

    #[must_use]
    pub fn is_declared(&self, key: &LineKey) -> bool {
        self.lines.contains_key(key)
    }

    /// Assert `key` on behalf of `source`. Returns true if the line went
    /// from inactive to active.
    pub fn assert(&mut self, key: &LineKey, source: DeviceId) -> Result<bool, LineError> {
        let line = self
            .lines
            .get_mut(key)
            .ok_or_else(|| LineError(key.clone()))?;
        let was_active = !line.asserted.is_empty();
        line.asserted.insert(source);
        if was_active {
            Ok(false)
        } else {
            line.rising += 1;
            Ok(true)
        }
    }

    /// Withdraw `source`'s assertion. Returns true if the line went
    /// inactive; it stays active while any other source still asserts.
    pub fn clear(&mut self, key: &LineKey, source: DeviceId) -> Result<bool, LineError> {
        let line = self
            .lines
            .get_mut(key)
            .ok_or_else(|| LineError(key.clone()))?;
        if line.asserted.remove(&source) && line.asserted.is_empty() {
            line.falling += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Current level: true iff at least one source asserts the line.
    /// Undeclared lines read inactive.
    #[must_use]
    pub fn level(&self, key: &LineKey) -> bool {
        self.lines
            .get(key)
            .is_some_and(|line| !line.asserted.is_empty())
    }

    /// Rising transitions seen on the line. A listener comparing this
    /// against its previous sample catches pulses shorter than its clock.
    #[must_use]
    pub fn edges(&self, key: &LineKey) -> u64 {
        self.lines.get(key).map_or(0, |line| line.rising)
    }

    #[must_use]
    pub fn state(&self, key: &LineKey) -> Option<LineState> {
        self.lines.get(key).map(|line| LineState {
            level: !line.asserted.is_empty(),
            rising: line.rising,
            falling: line.falling,
            asserters: line.asserted.len(),
        })
    }

    /// Devices listening on the line, in registration order.
    #[must_use]
    pub fn listeners(&self, key: &LineKey) -> &[DeviceId] {
        self.lines
            .get(key)
            .map(|line| line.listeners.as_slice())
            .unwrap_or_default()
    }

    /// Devices declared as sources of the line, in registration order.
    #[must_use]
    pub fn sources(&self, key: &LineKey) -> &[DeviceId] {
        self.lines
            .get(key)
            .map(|line| line.sources.as_slice())
            .unwrap_or_default()
    }

    /// Every declared line.
    pub fn lines(&self) -> impl Iterator<Item = &LineKey> {
        self.lines.keys()
    }

    /// Drop every assertion and transition count. Declarations survive.
    pub fn clear_all(&mut self) {
        for line in self.lines.values_mut() {
            line.asserted.clear();
            line.rising = 0;
            line.falling = 0;
        }
    }
}
