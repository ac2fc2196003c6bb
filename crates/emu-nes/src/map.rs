//! NES buses, memory map and interrupt lines.

use emu_core::{BusId, LineKey};

pub const CPU_BUS: BusId = BusId(0);
pub const PPU_BUS: BusId = BusId(1);

pub const NMI_N: u32 = 0;
pub const IRQ_N: u32 = 1;
pub const RDY_N: u32 = 2;

pub const WRAM_SIZE: usize = 2 * 1024;
pub const VRAM_SIZE: usize = 4 * 1024;
pub const SRAM_SIZE: usize = 8 * 1024;

// CPU bus
pub const WRAM_START: u32 = 0x0000;
pub const WRAM_END: u32 = 0x07FF;
pub const WRAM_MIRROR_START: u32 = 0x0800;
pub const WRAM_MIRROR_END: u32 = 0x1FFF;
pub const PPU_START: u32 = 0x2000;
pub const PPU_END: u32 = 0x2007;
pub const PPU_MIRROR_START: u32 = 0x2008;
pub const PPU_MIRROR_END: u32 = 0x3FFF;
pub const APU_START: u32 = 0x4000;
pub const APU_END: u32 = 0x4013;
pub const SPRITE_DMA: u32 = 0x4014;
pub const APU_CTRL_STAT: u32 = 0x4015;
pub const CTRL_PORT1: u32 = 0x4016;
pub const CTRL_PORT2: u32 = 0x4017;
pub const APU_FRAME_COUNTER: u32 = 0x4017;
pub const EXPANSION_START: u32 = 0x4018;
pub const EXPANSION_END: u32 = 0x5FFF;
pub const SRAM_START: u32 = 0x6000;
pub const SRAM_END: u32 = 0x7FFF;
pub const PRG_ROM_START: u32 = 0x8000;
pub const PRG_ROM_END: u32 = 0xFFFF;

// PPU bus
pub const CHR_START: u32 = 0x0000;
pub const CHR_END: u32 = 0x1FFF;
pub const VRAM_START: u32 = 0x2000;
pub const VRAM_END: u32 = 0x2FFF;
pub const VRAM_MIRROR_START: u32 = 0x3000;
pub const VRAM_MIRROR_END: u32 = 0x3EFF;
pub const PALETTE_START: u32 = 0x3F00;
pub const PALETTE_END: u32 = 0x3F1F;
pub const PALETTE_MIRROR_START: u32 = 0x3F20;
pub const PALETTE_MIRROR_END: u32 = 0x3FFF;

pub const RESET_VECTOR: u32 = 0xFFFC;

/// Edge-triggered, driven by the PPU at VBlank.
#[must_use]
pub fn nmi() -> LineKey {
    LineKey::new("nmi", NMI_N)
}

/// Level-triggered, shared by the APU frame counter and the cartridge.
#[must_use]
pub fn irq() -> LineKey {
    LineKey::new("irq", IRQ_N)
}

/// Held by sprite DMA to halt the CPU while it owns the bus.
#[must_use]
pub fn rdy() -> LineKey {
    LineKey::new("rdy", RDY_N)
}
