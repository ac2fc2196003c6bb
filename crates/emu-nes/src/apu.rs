//! APU (2A03) register file and frame sequencer.
//!
//! Waveform synthesis is outside this crate. The APU here keeps what the
//! rest of the machine can observe: the channel registers, the `$4015`
//! status and enable bits, and the frame sequencer, which runs in its own
//! clock domain and raises the shared IRQ line in 4-step mode.
//!
//! Clock domains:
//! - `clk`: CPU rate (crystal / 12 NTSC)
//! - `seq_clk`: frame sequencer steps (crystal / 89490 NTSC, about 240 Hz)

use emu_core::{Access, AudioConfig, BusContext, BusId, Device, DeviceKind, Resource, Value};

use crate::config::NesRegion;
use crate::map::{self, APU_CTRL_STAT, APU_END, APU_FRAME_COUNTER, APU_START, CPU_BUS, IRQ_N};

/// Output rate reported to hosts.
pub const SAMPLE_RATE: f64 = 48_000.0;

const CLK: usize = 0;
const SEQ_CLK: usize = 1;

const FRAME_MODE_5_STEP: u8 = 0x80;
const FRAME_IRQ_INHIBIT: u8 = 0x40;
const STATUS_FRAME_IRQ: u8 = 0x40;

/// APU 2A03.
pub struct Apu {
    region: NesRegion,
    /// `$4000-$4013` as last written.
    registers: [u8; 0x14],
    /// Channel enable bits from `$4015`.
    enabled: u8,
    /// `$4017` mode and inhibit bits.
    frame_counter: u8,
    sequencer_step: u8,
    frame_irq: bool,
    cycles: u64,
}

impl Apu {
    #[must_use]
    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            registers: [0; 0x14],
            enabled: 0,
            frame_counter: 0,
            sequencer_step: 0,
            frame_irq: false,
            cycles: 0,
        }
    }

    fn five_step(&self) -> bool {
        self.frame_counter & FRAME_MODE_5_STEP != 0
    }

    fn set_frame_irq(&mut self, active: bool, bus: &mut BusContext<'_>) {
        self.frame_irq = active;
        if active {
            bus.assert_line(&map::irq());
        } else {
            bus.clear_line(&map::irq());
        }
    }

    fn clock_sequencer(&mut self, bus: &mut BusContext<'_>) {
        let steps = if self.five_step() { 5 } else { 4 };
        // The 4-step sequence ends with the frame interrupt
        if steps == 4 && self.sequencer_step == 3 && self.frame_counter & FRAME_IRQ_INHIBIT == 0 {
            self.set_frame_irq(true, bus);
        }
        self.sequencer_step = (self.sequencer_step + 1) % steps;
    }
}

impl Device for Apu {
    fn name(&self) -> &str {
        "apu"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
    }

    fn default_bus(&self) -> Option<BusId> {
        Some(CPU_BUS)
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::mem("main", CPU_BUS, APU_START, APU_END),
            Resource::mem("ctrl_stat", CPU_BUS, APU_CTRL_STAT, APU_CTRL_STAT),
            // $4017 reads belong to controller port 2
            Resource::mem_access(
                "seq",
                CPU_BUS,
                APU_FRAME_COUNTER,
                APU_FRAME_COUNTER,
                Access::WriteOnly,
            ),
            Resource::clock("clk", self.region.cpu_clock()),
            Resource::clock("seq_clk", self.region.sequencer_clock()),
            Resource::irq("irq", IRQ_N),
        ]
    }

    fn reset(&mut self) {
        self.enabled = 0;
        self.sequencer_step = 0;
        self.frame_irq = false;
        self.cycles = 0;
    }

    fn tick(&mut self, clock: usize, bus: &mut BusContext<'_>) {
        match clock {
            CLK => self.cycles += 1,
            SEQ_CLK => self.clock_sequencer(bus),
            _ => {}
        }
    }

    fn read(&mut self, bus_id: BusId, address: u32, bus: &mut BusContext<'_>) -> u8 {
        if address == APU_CTRL_STAT {
            // Reading acknowledges the frame interrupt
            let mut status = self.enabled & 0x1F;
            if self.frame_irq {
                status |= STATUS_FRAME_IRQ;
            }
            self.set_frame_irq(false, bus);
            status | (bus.open_bus(bus_id) & 0x20)
        } else {
            // Channel registers are write-only
            bus.open_bus(bus_id)
        }
    }

    fn write(&mut self, _bus_id: BusId, address: u32, value: u8, bus: &mut BusContext<'_>) {
        match address {
            APU_START..=APU_END => self.registers[(address - APU_START) as usize] = value,
            APU_CTRL_STAT => self.enabled = value & 0x1F,
            APU_FRAME_COUNTER => {
                self.frame_counter = value & (FRAME_MODE_5_STEP | FRAME_IRQ_INHIBIT);
                self.sequencer_step = 0;
                if value & FRAME_IRQ_INHIBIT != 0 {
                    self.set_frame_irq(false, bus);
                }
            }
            _ => {}
        }
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "cycles" => Some(self.cycles.into()),
            "sequencer_step" => Some(self.sequencer_step.into()),
            "frame_irq" => Some(self.frame_irq.into()),
            "five_step" => Some(self.five_step().into()),
            "enabled" => Some(self.enabled.into()),
            _ => {
                let reg = path.strip_prefix("reg.")?.parse::<usize>().ok()?;
                self.registers.get(reg).map(|&b| b.into())
            }
        }
    }

    fn audio(&self) -> Option<AudioConfig> {
        Some(AudioConfig {
            sample_rate: SAMPLE_RATE,
        })
    }
}
