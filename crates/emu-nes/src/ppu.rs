//! NES PPU (2C02) register file and frame timing.
//!
//! One tick is one PPU dot. Each frame is 341 dots by 262 scanlines (312
//! on PAL). Pixel generation is not modelled; the PPU keeps the register
//! semantics the CPU can observe, the palette RAM it owns on the PPU bus,
//! and the timing that drives VBlank, NMI and frame completion.
//!
//! ## Scanline layout
//! - 0-239: visible scanlines
//! - 240: post-render (idle)
//! - 241: `VBlank` starts at dot 1
//! - last line: pre-render; the frame completes when it ends

use emu_core::{BusContext, BusId, Device, DeviceKind, MemRange, Resource, Value, VideoConfig};

use crate::config::NesRegion;
use crate::map::{
    self, CPU_BUS, NMI_N, PALETTE_END, PALETTE_MIRROR_END, PALETTE_MIRROR_START, PALETTE_START,
    PPU_BUS, PPU_END, PPU_MIRROR_END, PPU_MIRROR_START, PPU_START,
};

pub const FB_WIDTH: u32 = 256;
pub const FB_HEIGHT: u32 = 240;

const DOTS_PER_LINE: u16 = 341;
const VBLANK_LINE: u16 = 241;

const CTRL_INCREMENT_32: u8 = 0x04;
const CTRL_NMI_ENABLE: u8 = 0x80;
const STATUS_VBLANK: u8 = 0x80;

/// PPU 2C02.
pub struct Ppu {
    region: NesRegion,

    palette_ram: [u8; 32],
    oam: [u8; 256],

    // Registers
    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,

    // Loopy scroll/address registers
    v: u16,
    t: u16,
    fine_x: u8,
    w: bool,

    // Data read buffer ($2007)
    read_buffer: u8,
    // Last value driven on the register data bus
    io_latch: u8,

    scanline: u16,
    dot: u16,
    frames: u64,
}

impl Ppu {
    #[must_use]
    pub fn new(region: NesRegion) -> Self {
        Self {
            region,
            palette_ram: [0; 32],
            oam: [0; 256],
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            io_latch: 0,
            scanline: 0,
            dot: 0,
            frames: 0,
        }
    }

    #[must_use]
    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    #[must_use]
    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Drive the NMI output: active while VBlank is flagged and enabled.
    fn update_nmi(&self, bus: &mut BusContext<'_>) {
        if self.status & STATUS_VBLANK != 0 && self.ctrl & CTRL_NMI_ENABLE != 0 {
            bus.assert_line(&map::nmi());
        } else {
            bus.clear_line(&map::nmi());
        }
    }

    fn increment_v(&mut self) {
        let step = if self.ctrl & CTRL_INCREMENT_32 != 0 {
            32
        } else {
            1
        };
        self.v = self.v.wrapping_add(step) & 0x7FFF;
    }

    fn register_read(&mut self, reg: u32, bus: &mut BusContext<'_>) -> u8 {
        let value = match reg & 0x07 {
            // $2002 - PPUSTATUS
            2 => {
                let result = (self.status & 0xE0) | (self.io_latch & 0x1F);
                self.status &= !STATUS_VBLANK;
                self.w = false;
                self.update_nmi(bus);
                result
            }
            // $2004 - OAMDATA
            4 => self.oam[self.oam_addr as usize],
            // $2007 - PPUDATA
            7 => {
                let addr = self.v & 0x3FFF;
                let result = if u32::from(addr) >= PALETTE_START {
                    // Palette reads bypass the buffer, which is refilled
                    // from the nametable underneath.
                    self.read_buffer = bus.read_or_open(PPU_BUS, u32::from(addr - 0x1000));
                    self.palette_ram[palette_index(addr)]
                } else {
                    let buffered = self.read_buffer;
                    self.read_buffer = bus.read_or_open(PPU_BUS, u32::from(addr));
                    buffered
                };
                self.increment_v();
                result
            }
            // Write-only registers read back the I/O latch
            _ => self.io_latch,
        };
        self.io_latch = value;
        value
    }

    fn register_write(&mut self, reg: u32, value: u8, bus: &mut BusContext<'_>) {
        self.io_latch = value;
        match reg & 0x07 {
            // $2000 - PPUCTRL
            0 => {
                self.ctrl = value;
                self.t = (self.t & !0x0C00) | (u16::from(value & 0x03) << 10);
                self.update_nmi(bus);
            }
            // $2001 - PPUMASK
            1 => self.mask = value,
            // $2003 - OAMADDR
            3 => self.oam_addr = value,
            // $2004 - OAMDATA
            4 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            // $2005 - PPUSCROLL
            5 => {
                if self.w {
                    self.t = (self.t & !0x73E0)
                        | (u16::from(value & 0x07) << 12)
                        | (u16::from(value >> 3) << 5);
                } else {
                    self.t = (self.t & !0x001F) | (u16::from(value) >> 3);
                    self.fine_x = value & 0x07;
                }
                self.w = !self.w;
            }
            // $2006 - PPUADDR
            6 => {
                if self.w {
                    self.t = (self.t & 0xFF00) | u16::from(value);
                    self.v = self.t;
                } else {
                    self.t = (self.t & 0x00FF) | (u16::from(value & 0x3F) << 8);
                }
                self.w = !self.w;
            }
            // $2007 - PPUDATA
            7 => {
                let addr = self.v & 0x3FFF;
                if u32::from(addr) >= PALETTE_START {
                    self.palette_ram[palette_index(addr)] = value & 0x3F;
                } else {
                    bus.write_or_ignore(PPU_BUS, u32::from(addr), value);
                }
                self.increment_v();
            }
            // $2002 is read-only
            _ => {}
        }
    }
}

/// Index into palette RAM. `$3F10/$3F14/$3F18/$3F1C` alias the
/// background entries below them.
fn palette_index(addr: u16) -> usize {
    let a = (addr & 0x1F) as usize;
    if a & 0x13 == 0x10 { a - 0x10 } else { a }
}

impl Device for Ppu {
    fn name(&self) -> &str {
        "ppu"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Controller
    }

    fn default_bus(&self) -> Option<BusId> {
        Some(PPU_BUS)
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::mem_mirrored(
                "mem",
                CPU_BUS,
                PPU_START,
                PPU_END,
                [MemRange::new(CPU_BUS, PPU_MIRROR_START, PPU_MIRROR_END)],
            ),
            Resource::mem_mirrored(
                "pal",
                PPU_BUS,
                PALETTE_START,
                PALETTE_END,
                [MemRange::new(
                    PPU_BUS,
                    PALETTE_MIRROR_START,
                    PALETTE_MIRROR_END,
                )],
            ),
            Resource::irq("nmi", NMI_N),
            Resource::clock("clk", self.region.ppu_clock()),
        ]
    }

    fn reset(&mut self) {
        self.ctrl = 0;
        self.mask = 0;
        self.status = 0;
        self.w = false;
        self.t = 0;
        self.fine_x = 0;
        self.read_buffer = 0;
        self.io_latch = 0;
        self.scanline = 0;
        self.dot = 0;
        self.frames = 0;
    }

    fn tick(&mut self, _clock: usize, bus: &mut BusContext<'_>) {
        let pre_render = self.region.pre_render_line();
        if self.dot == 1 {
            if self.scanline == VBLANK_LINE {
                self.status |= STATUS_VBLANK;
                self.update_nmi(bus);
            } else if self.scanline == pre_render {
                // Clear VBlank, sprite 0 hit and overflow
                self.status &= !0xE0;
                self.update_nmi(bus);
            }
        }

        self.dot += 1;
        if self.dot == DOTS_PER_LINE {
            self.dot = 0;
            if self.scanline == pre_render {
                self.scanline = 0;
                self.frames += 1;
                bus.frame_complete();
            } else {
                self.scanline += 1;
            }
        }
    }

    fn read(&mut self, bus_id: BusId, address: u32, bus: &mut BusContext<'_>) -> u8 {
        if bus_id == PPU_BUS {
            self.palette_ram[palette_index(address as u16)]
        } else {
            self.register_read(address, bus)
        }
    }

    fn write(&mut self, bus_id: BusId, address: u32, value: u8, bus: &mut BusContext<'_>) {
        if bus_id == PPU_BUS {
            self.palette_ram[palette_index(address as u16)] = value & 0x3F;
        } else {
            self.register_write(address, value, bus);
        }
    }

    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "scanline" => Some(self.scanline.into()),
            "dot" => Some(self.dot.into()),
            "frame" => Some(self.frames.into()),
            "ctrl" => Some(self.ctrl.into()),
            "mask" => Some(self.mask.into()),
            "status" => Some(self.status.into()),
            "oam_addr" => Some(self.oam_addr.into()),
            "v" => Some(self.v.into()),
            "t" => Some(self.t.into()),
            "fine_x" => Some(self.fine_x.into()),
            "vblank" => Some((self.status & STATUS_VBLANK != 0).into()),
            "nmi_enabled" => Some((self.ctrl & CTRL_NMI_ENABLE != 0).into()),
            _ => {
                let index = path.strip_prefix("oam.")?.parse::<usize>().ok()?;
                self.oam.get(index).map(|&b| b.into())
            }
        }
    }

    fn video(&self) -> Option<VideoConfig> {
        Some(VideoConfig {
            width: FB_WIDTH,
            height: FB_HEIGHT,
            aspect_ratio: 4.0 / 3.0,
            fps: self.region.fps(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{build_ines, parse_ines};
    use crate::mapper::NesMapper;
    use emu_core::{Machine, MachineBuilder, Observable, Ticks};

    fn machine() -> Machine {
        let cart = parse_ines(&build_ines(&[0; 16 * 1024], &[], 0)).unwrap();
        MachineBuilder::new("ppu", NesRegion::Ntsc.master())
            .device(NesMapper::new(cart, vec![0; 4096]))
            .device(Ppu::new(NesRegion::Ntsc))
            .init()
            .unwrap()
    }

    /// Run until the PPU has processed `dots` dots.
    fn run_dots(m: &mut Machine, dots: u64) {
        for _ in 0..dots * 4 {
            m.step();
        }
    }

    fn ppu(m: &Machine, path: &str) -> Option<Value> {
        m.query(&format!("device.ppu.{path}"))
    }

    fn vblank(m: &Machine) -> bool {
        ppu(m, "vblank") == Some(Value::Bool(true))
    }

    #[test]
    fn palette_index_aliases_sprite_backdrops() {
        assert_eq!(palette_index(0x3F10), 0x00);
        assert_eq!(palette_index(0x3F14), 0x04);
        assert_eq!(palette_index(0x3F11), 0x11);
        assert_eq!(palette_index(0x3F3C), 0x0C);
    }

    #[test]
    fn vblank_starts_at_line_241_dot_1() {
        let mut m = machine();
        let dots_to_vblank = u64::from(VBLANK_LINE) * 341 + 2;
        run_dots(&mut m, dots_to_vblank - 1);
        assert!(!vblank(&m));
        run_dots(&mut m, 1);
        assert!(vblank(&m));
        // Disabled NMI leaves the line low
        assert_eq!(m.line_state(&map::nmi()).unwrap().rising, 0);
    }

    #[test]
    fn nmi_follows_vblank_and_enable() {
        let mut m = machine();
        m.write(CPU_BUS, 0x2000, CTRL_NMI_ENABLE).unwrap();
        run_dots(&mut m, u64::from(VBLANK_LINE) * 341 + 2);
        let nmi = m.line_state(&map::nmi()).unwrap();
        assert!(nmi.level);
        assert_eq!(nmi.rising, 1);

        // Reading PPUSTATUS acknowledges VBlank and drops NMI
        let status = m.read(CPU_BUS, 0x2002).unwrap();
        assert_eq!(status & 0x80, 0x80);
        assert!(!m.line_state(&map::nmi()).unwrap().level);
        assert_eq!(m.read(CPU_BUS, 0x2002).unwrap() & 0x80, 0);
    }

    #[test]
    fn enabling_nmi_during_vblank_raises_it() {
        let mut m = machine();
        run_dots(&mut m, u64::from(VBLANK_LINE) * 341 + 2);
        assert!(!m.line_state(&map::nmi()).unwrap().level);
        m.write(CPU_BUS, 0x2000, CTRL_NMI_ENABLE).unwrap();
        assert!(m.line_state(&map::nmi()).unwrap().level);
    }

    #[test]
    fn frame_completes_at_end_of_pre_render() {
        let mut m = machine();
        let frame = NesRegion::Ntsc.ticks_per_frame();
        assert!(m.run_frame(Ticks(frame + 100)));
        assert_eq!(m.elapsed(), Ticks(frame));
        assert_eq!(ppu(&m, "scanline"), Some(Value::U16(0)));
        assert_eq!(m.frame_count(), 1);
    }

    #[test]
    fn ppudata_goes_through_the_ppu_bus() {
        let mut m = machine();
        m.write(CPU_BUS, 0x2006, 0x21).unwrap();
        m.write(CPU_BUS, 0x2006, 0x08).unwrap();
        m.write(CPU_BUS, 0x2007, 0xAB).unwrap();
        assert_eq!(m.read(PPU_BUS, 0x2108).unwrap(), 0xAB);

        // Buffered read: first returns stale data
        m.write(CPU_BUS, 0x2006, 0x21).unwrap();
        m.write(CPU_BUS, 0x2006, 0x08).unwrap();
        assert_eq!(m.read(CPU_BUS, 0x2007).unwrap(), 0x00);
        assert_eq!(m.read(CPU_BUS, 0x2007).unwrap(), 0xAB);
    }

    #[test]
    fn palette_is_unbuffered_and_mirrored() {
        let mut m = machine();
        // PPUADDR through the $2008-$3FFF register mirror
        m.write(CPU_BUS, 0x3FF6, 0x3F).unwrap();
        m.write(CPU_BUS, 0x3FF6, 0x10).unwrap();
        m.write(CPU_BUS, 0x2007, 0x2C).unwrap();
        assert_eq!(m.read(PPU_BUS, 0x3F00).unwrap(), 0x2C);
        assert_eq!(m.read(PPU_BUS, 0x3F20).unwrap(), 0x2C);

        m.write(CPU_BUS, 0x2006, 0x3F).unwrap();
        m.write(CPU_BUS, 0x2006, 0x00).unwrap();
        assert_eq!(m.read(CPU_BUS, 0x2007).unwrap(), 0x2C);
    }

    #[test]
    fn oam_data_increments_address() {
        let mut m = machine();
        m.write(CPU_BUS, 0x2003, 0x10).unwrap();
        m.write(CPU_BUS, 0x2004, 0x99).unwrap();
        assert_eq!(ppu(&m, "oam.16"), Some(Value::U8(0x99)));
        assert_eq!(ppu(&m, "oam_addr"), Some(Value::U8(0x11)));
    }

    #[test]
    fn reports_video_geometry() {
        let video = Ppu::new(NesRegion::Pal).video().unwrap();
        assert_eq!((video.width, video.height), (256, 240));
        assert!((video.fps - 50.007).abs() < 0.001);
    }
}
