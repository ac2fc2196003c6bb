//! Cartridge mapper: owns every cartridge-decoded range on both buses.
//!
//! The cartridge drives the VRAM address lines, so the machine's 4 KiB
//! nametable buffer is handed to the mapper, which folds the four logical
//! nametables onto it according to the board's mirroring.

use emu_core::{BusContext, BusId, Device, DeviceKind, MemRange, Resource, Value};

use crate::cartridge::{Cartridge, Mirroring};
use crate::map::{
    CHR_END, CHR_START, CPU_BUS, EXPANSION_END, EXPANSION_START, IRQ_N, PPU_BUS, PRG_ROM_END,
    PRG_ROM_START, SRAM_END, SRAM_SIZE, SRAM_START, VRAM_END, VRAM_MIRROR_END, VRAM_MIRROR_START,
    VRAM_START,
};

/// NROM (iNES mapper 0): fixed 16 or 32 KiB PRG, 8 KiB CHR ROM or RAM,
/// 8 KiB work RAM at `$6000`.
pub struct NesMapper {
    cart: Cartridge,
    sram: Vec<u8>,
    vram: Vec<u8>,
}

impl NesMapper {
    #[must_use]
    pub fn new(cart: Cartridge, vram: Vec<u8>) -> Self {
        Self {
            cart,
            sram: vec![0; SRAM_SIZE],
            vram,
        }
    }

    /// Offset into the VRAM buffer for a nametable address.
    fn nametable_offset(&self, address: u32) -> usize {
        let nt = (address - VRAM_START) as usize & 0x0FFF;
        match self.cart.mirroring() {
            // Nametables 0,1 -> page 0; 2,3 -> page 1
            Mirroring::Horizontal => (nt / 0x0800) * 0x0400 + (nt & 0x03FF),
            // Nametables 0,2 -> page 0; 1,3 -> page 1
            Mirroring::Vertical => nt & 0x07FF,
            Mirroring::FourScreen => nt,
        }
    }

    fn prg_read(&self, address: u32) -> u8 {
        let offset = (address - PRG_ROM_START) as usize;
        // 16 KiB images appear twice
        self.cart.prg_rom[offset % self.cart.prg_rom.len()]
    }
}

impl Device for NesMapper {
    fn name(&self) -> &str {
        "nes_mapper"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::mem("expansion", CPU_BUS, EXPANSION_START, EXPANSION_END),
            Resource::mem("sram", CPU_BUS, SRAM_START, SRAM_END),
            Resource::mem("prg_rom", CPU_BUS, PRG_ROM_START, PRG_ROM_END),
            Resource::mem("chr", PPU_BUS, CHR_START, CHR_END),
            Resource::mem_mirrored(
                "vram",
                PPU_BUS,
                VRAM_START,
                VRAM_END,
                [MemRange::new(PPU_BUS, VRAM_MIRROR_START, VRAM_MIRROR_END)],
            ),
            Resource::irq("irq", IRQ_N),
        ]
    }

    fn read(&mut self, bus_id: BusId, address: u32, bus: &mut BusContext<'_>) -> u8 {
        match (bus_id, address) {
            (CPU_BUS, SRAM_START..=SRAM_END) => self.sram[(address - SRAM_START) as usize],
            (CPU_BUS, PRG_ROM_START..=PRG_ROM_END) => self.prg_read(address),
            (PPU_BUS, CHR_START..=CHR_END) => self.cart.chr[address as usize],
            (PPU_BUS, VRAM_START..=VRAM_END) => self.vram[self.nametable_offset(address)],
            // No expansion hardware on NROM boards
            _ => bus.open_bus(bus_id),
        }
    }

    fn write(&mut self, bus_id: BusId, address: u32, value: u8, _bus: &mut BusContext<'_>) {
        match (bus_id, address) {
            (CPU_BUS, SRAM_START..=SRAM_END) => {
                self.sram[(address - SRAM_START) as usize] = value;
            }
            (PPU_BUS, CHR_START..=CHR_END) if self.cart.chr_is_ram => {
                self.cart.chr[address as usize] = value;
            }
            (PPU_BUS, VRAM_START..=VRAM_END) => {
                let offset = self.nametable_offset(address);
                self.vram[offset] = value;
            }
            _ => {}
        }
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "mapper" => Some(self.cart.header.mapper_number.into()),
            "prg_size" => Some((self.cart.prg_rom.len() as u32).into()),
            "chr_ram" => Some(self.cart.chr_is_ram.into()),
            "mirroring" => Some(format!("{:?}", self.cart.mirroring()).into()),
            _ => None,
        }
    }
}
