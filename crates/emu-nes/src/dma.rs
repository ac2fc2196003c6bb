//! Sprite (OAM) DMA.
//!
//! Writing page `$XX` to `$4014` copies `$XX00-$XXFF` from the CPU bus to
//! OAMDATA (`$2004`), one byte every two CPU cycles: a read cycle, then a
//! write cycle. The CPU is halted through its RDY line until the last byte
//! is written.

use emu_core::{Access, BusContext, BusId, Device, DeviceKind, Resource, Value};

use crate::config::NesRegion;
use crate::map::{self, CPU_BUS, RDY_N, SPRITE_DMA};

const OAMDATA: u32 = 0x2004;

pub struct SpriteDma {
    region: NesRegion,
    page: u8,
    /// Bytes still to copy; zero when idle.
    remaining: u16,
    /// Byte fetched on the read cycle, stored on the next.
    data: Option<u8>,
    transfers: u64,
}

impl SpriteDma {
    #[must_use]
    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            page: 0,
            remaining: 0,
            data: None,
            transfers: 0,
        }
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.remaining > 0
    }
}

impl Device for SpriteDma {
    fn name(&self) -> &str {
        "nes_sprite"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
    }

    fn default_bus(&self) -> Option<BusId> {
        Some(CPU_BUS)
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::mem_access("mem", CPU_BUS, SPRITE_DMA, SPRITE_DMA, Access::WriteOnly),
            Resource::irq("rdy", RDY_N),
            Resource::clock("clk", self.region.cpu_clock()),
        ]
    }

    fn reset(&mut self) {
        self.remaining = 0;
        self.data = None;
    }

    fn tick(&mut self, _clock: usize, bus: &mut BusContext<'_>) {
        if !self.active() {
            return;
        }
        match self.data.take() {
            None => {
                let offset = 256 - u32::from(self.remaining);
                let address = (u32::from(self.page) << 8) | offset;
                self.data = Some(bus.read_or_open(CPU_BUS, address));
            }
            Some(byte) => {
                bus.write_or_ignore(CPU_BUS, OAMDATA, byte);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.transfers += 1;
                    bus.clear_line(&map::rdy());
                }
            }
        }
    }

    fn write(&mut self, _bus_id: BusId, _address: u32, value: u8, bus: &mut BusContext<'_>) {
        self.page = value;
        self.remaining = 256;
        self.data = None;
        bus.assert_line(&map::rdy());
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "active" => Some(self.active().into()),
            "page" => Some(self.page.into()),
            "remaining" => Some(self.remaining.into()),
            "transfers" => Some(self.transfers.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::Ppu;
    use emu_core::{Machine, MachineBuilder, MemRange, Observable, RegionSpec};

    fn machine() -> Machine {
        MachineBuilder::new("dma", NesRegion::Ntsc.master())
            .primary_ram(RegionSpec::ram(Resource::mem_mirrored(
                "mem",
                CPU_BUS,
                0x0000,
                0x07FF,
                [MemRange::new(CPU_BUS, 0x0800, 0x1FFF)],
            )))
            .device(SpriteDma::new(NesRegion::Ntsc))
            .device(Ppu::new(NesRegion::Ntsc))
            .init()
            .unwrap()
    }

    fn cpu_cycles(m: &mut Machine, cycles: u64) {
        for _ in 0..cycles * 12 {
            m.step();
        }
    }

    #[test]
    fn copies_a_page_into_oam_holding_rdy() {
        let mut m = machine();
        for i in 0..=255u8 {
            m.write(CPU_BUS, 0x0200 + u32::from(i), i ^ 0xA5).unwrap();
        }
        m.write(CPU_BUS, 0x4014, 0x02).unwrap();
        assert!(m.line_state(&map::rdy()).unwrap().level);

        cpu_cycles(&mut m, 511);
        assert!(m.line_state(&map::rdy()).unwrap().level);
        assert_eq!(m.query("device.nes_sprite.remaining"), Some(Value::U16(1)));

        cpu_cycles(&mut m, 1);
        assert!(!m.line_state(&map::rdy()).unwrap().level);
        assert_eq!(m.query("device.ppu.oam.0"), Some(Value::U8(0xA5)));
        assert_eq!(m.query("device.ppu.oam.255"), Some(Value::U8(0x5A)));
        assert_eq!(m.query("device.nes_sprite.transfers"), Some(Value::U64(1)));
    }

    #[test]
    fn register_is_write_only() {
        let mut m = machine();
        assert!(m.read(CPU_BUS, 0x4014).is_err());
    }
}
