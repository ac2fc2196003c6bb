//! The NES machine definition.
//!
//! The master clock ticks at 21,477,272 Hz (NTSC crystal). Components
//! derive their timing from it:
//! - PPU: crystal / 4 = 5,369,318 Hz
//! - CPU and APU: crystal / 12 = 1,789,773 Hz
//! - APU frame sequencer: crystal / 89,490 (about 240 Hz)
//!
//! One frame = 341 PPU dots x 262 scanlines = 89,342 PPU cycles, or
//! 357,368 crystal ticks.

use emu_core::{
    AllocationError, InitError, Machine, MachineBuilder, MachineDefinition, MemRange, OpenBus,
    RegionSpec, Resource, VideoStandard,
};
use tracing::debug;

use crate::apu::Apu;
use crate::cartridge::parse_ines;
use crate::config::{NesConfig, NesRegion};
use crate::controller::{ControllerInput, Controllers};
use crate::cpu::{CpuCore, NullCore, Rp2a03};
use crate::dma::SpriteDma;
use crate::map::{CPU_BUS, VRAM_SIZE, WRAM_END, WRAM_MIRROR_END, WRAM_MIRROR_START, WRAM_START};
use crate::mapper::NesMapper;
use crate::ppu::Ppu;

/// Builds the instruction core for each new machine.
pub type CoreFactory = fn() -> Box<dyn CpuCore>;

fn null_core() -> Box<dyn CpuCore> {
    Box::new(NullCore::default())
}

/// WRAM: 2 KiB at `$0000`, mirrored through `$1FFF`. Not cleared on reset.
#[must_use]
pub fn wram() -> RegionSpec {
    RegionSpec::ram(Resource::mem_mirrored(
        "mem",
        CPU_BUS,
        WRAM_START,
        WRAM_END,
        [MemRange::new(CPU_BUS, WRAM_MIRROR_START, WRAM_MIRROR_END)],
    ))
}

fn allocate_vram() -> Result<Vec<u8>, AllocationError> {
    let mut vram = Vec::new();
    vram.try_reserve_exact(VRAM_SIZE)
        .map_err(|_| AllocationError {
            region: "vram".to_string(),
            bytes: VRAM_SIZE,
        })?;
    vram.resize(VRAM_SIZE, 0);
    Ok(vram)
}

/// Nintendo Entertainment System.
pub struct NesDefinition {
    region: NesRegion,
    input: ControllerInput,
    core: CoreFactory,
}

impl NesDefinition {
    #[must_use]
    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            input: ControllerInput::new(),
            core: null_core,
        }
    }

    /// Use `factory` to build the CPU's instruction core.
    #[must_use]
    pub fn with_core(mut self, factory: CoreFactory) -> Self {
        self.core = factory;
        self
    }

    #[must_use]
    pub fn region(&self) -> NesRegion {
        self.region
    }

    /// Controller button state shared with every machine this definition
    /// builds.
    #[must_use]
    pub fn input(&self) -> &ControllerInput {
        &self.input
    }
}

impl Default for NesDefinition {
    fn default() -> Self {
        Self::new(NesRegion::Ntsc)
    }
}

impl MachineDefinition for NesDefinition {
    fn name(&self) -> &str {
        "nes"
    }

    fn description(&self) -> &str {
        "Nintendo Entertainment System"
    }

    fn extensions(&self) -> &[&str] {
        &["nes"]
    }

    fn standard(&self) -> VideoStandard {
        self.region.standard()
    }

    fn init(&self, content: &[u8]) -> Result<Machine, InitError> {
        let cart = parse_ines(content).map_err(|err| InitError::Rejected {
            reason: err.to_string(),
        })?;
        debug!(
            prg = cart.prg_rom.len(),
            chr = cart.chr.len(),
            mirroring = ?cart.mirroring(),
            "cartridge loaded"
        );

        // The cartridge controls the VRAM address lines, so the mapper
        // owns the nametable buffer.
        let vram = allocate_vram()?;

        let region = self.region;
        MachineBuilder::new("nes", region.master())
            .open_bus(OpenBus::LastValue)
            .primary_ram(wram())
            .device(Apu::new(region))
            .device(SpriteDma::new(region))
            .device(NesMapper::new(cart, vram))
            .device(Ppu::new(region))
            .device(Controllers::new(self.input.clone()))
            .device(Rp2a03::new(region, (self.core)()))
            .init()
    }
}

/// Build an NES from a configuration with the default core.
pub fn build(config: &NesConfig) -> Result<Machine, InitError> {
    NesDefinition::new(config.region).init(&config.rom_data)
}
