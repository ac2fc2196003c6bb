//! RP2A03 CPU shell.
//!
//! The shell is the machine-facing half of the CPU: it declares the CPU's
//! interrupt inputs and clock, fetches the reset vector, and turns the
//! router's line state into the inputs an instruction core consumes. NMI
//! is edge-triggered (any rising transition since the last sample latches
//! a pending NMI, even if the line has already dropped again); IRQ is
//! level-sensitive; RDY high halts the core. Instruction execution itself
//! belongs to a [`CpuCore`].

use emu_core::{BusContext, BusId, Device, DeviceKind, Resource, Value};

use crate::config::NesRegion;
use crate::map::{self, CPU_BUS, IRQ_N, NMI_N, RDY_N, RESET_VECTOR};

/// Interrupt inputs as the core sees them on one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interrupts {
    /// A latched NMI edge. The core clears it when it takes the interrupt.
    pub nmi: bool,
    /// Current IRQ level.
    pub irq: bool,
}

/// An instruction core driven one CPU cycle at a time.
pub trait CpuCore {
    /// Power-on or reset with the vector fetched from `$FFFC`.
    fn reset(&mut self, vector: u16);

    /// Run one CPU cycle.
    fn cycle(&mut self, interrupts: &mut Interrupts, bus: &mut BusContext<'_>);

    fn query(&self, path: &str) -> Option<Value> {
        let _ = path;
        None
    }
}

/// A core that executes nothing. It counts cycles and acknowledges every
/// NMI, so the shell's interrupt plumbing is observable without a real
/// instruction set.
#[derive(Debug, Clone, Default)]
pub struct NullCore {
    pc: u16,
    cycles: u64,
    nmis: u64,
    irq_cycles: u64,
}

impl CpuCore for NullCore {
    fn reset(&mut self, vector: u16) {
        self.pc = vector;
        self.cycles = 0;
        self.nmis = 0;
        self.irq_cycles = 0;
    }

    fn cycle(&mut self, interrupts: &mut Interrupts, _bus: &mut BusContext<'_>) {
        self.cycles += 1;
        if interrupts.nmi {
            interrupts.nmi = false;
            self.nmis += 1;
        }
        if interrupts.irq {
            self.irq_cycles += 1;
        }
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.pc.into()),
            "cycles" => Some(self.cycles.into()),
            "nmis" => Some(self.nmis.into()),
            "irq_cycles" => Some(self.irq_cycles.into()),
            _ => None,
        }
    }
}

/// Ricoh 2A03 CPU instance.
pub struct Rp2a03 {
    region: NesRegion,
    core: Box<dyn CpuCore>,
    interrupts: Interrupts,
    /// NMI rising edges already latched.
    nmi_edges: u64,
    reset_pending: bool,
    reset_vector: u16,
    halted_cycles: u64,
}

impl Rp2a03 {
    #[must_use]
    pub fn new(region: NesRegion, core: Box<dyn CpuCore>) -> Self {
        Self {
            region,
            core,
            interrupts: Interrupts::default(),
            nmi_edges: 0,
            reset_pending: true,
            reset_vector: 0,
            halted_cycles: 0,
        }
    }

    fn sample_lines(&mut self, bus: &BusContext<'_>) {
        let edges = bus.line_edges(&map::nmi());
        if edges != self.nmi_edges {
            self.nmi_edges = edges;
            self.interrupts.nmi = true;
        }
        self.interrupts.irq = bus.line_level(&map::irq());
    }
}

impl Device for Rp2a03 {
    fn name(&self) -> &str {
        "rp2a03"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn default_bus(&self) -> Option<BusId> {
        Some(CPU_BUS)
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::irq("nmi", NMI_N),
            Resource::irq("irq", IRQ_N),
            Resource::irq("rdy", RDY_N),
            Resource::clock("clk", self.region.cpu_clock()),
        ]
    }

    fn reset(&mut self) {
        self.interrupts = Interrupts::default();
        self.nmi_edges = 0;
        self.reset_pending = true;
        self.halted_cycles = 0;
    }

    fn tick(&mut self, _clock: usize, bus: &mut BusContext<'_>) {
        if self.reset_pending {
            let lo = bus.read_or_open(CPU_BUS, RESET_VECTOR);
            let hi = bus.read_or_open(CPU_BUS, RESET_VECTOR + 1);
            self.reset_vector = u16::from_le_bytes([lo, hi]);
            self.core.reset(self.reset_vector);
            self.reset_pending = false;
            return;
        }

        self.sample_lines(bus);
        if bus.line_level(&map::rdy()) {
            self.halted_cycles += 1;
            return;
        }
        self.core.cycle(&mut self.interrupts, bus);
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "reset_vector" => Some(self.reset_vector.into()),
            "halted_cycles" => Some(self.halted_cycles.into()),
            "nmi_pending" => Some(self.interrupts.nmi.into()),
            "irq" => Some(self.interrupts.irq.into()),
            _ => self.core.query(path.strip_prefix("core.")?),
        }
    }
}
