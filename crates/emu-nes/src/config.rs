//! NES configuration.

use emu_core::{ClockRate, MasterClock, VideoStandard};
use serde::{Deserialize, Serialize};

/// Video region: selects the master crystal and frame geometry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NesRegion {
    /// NTSC: 262 scanlines, 21,477,272 Hz crystal.
    #[default]
    Ntsc,
    /// PAL: 312 scanlines, 26,601,712 Hz crystal.
    Pal,
}

impl NesRegion {
    /// Master crystal frequency in Hz.
    #[must_use]
    pub const fn crystal_hz(self) -> u64 {
        match self {
            Self::Ntsc => 21_477_272,
            Self::Pal => 26_601_712,
        }
    }

    #[must_use]
    pub const fn master(self) -> MasterClock {
        MasterClock::new(self.crystal_hz())
    }

    /// Master ticks per CPU (and APU) cycle.
    #[must_use]
    pub const fn cpu_divisor(self) -> u64 {
        match self {
            Self::Ntsc => 12,
            Self::Pal => 16,
        }
    }

    /// Master ticks per PPU dot.
    #[must_use]
    pub const fn ppu_divisor(self) -> u64 {
        match self {
            Self::Ntsc => 4,
            Self::Pal => 5,
        }
    }

    /// Master ticks per APU frame-sequencer step (about 240 Hz NTSC,
    /// 200 Hz PAL).
    #[must_use]
    pub const fn sequencer_divisor(self) -> u64 {
        match self {
            Self::Ntsc => 89_490,
            Self::Pal => 133_008,
        }
    }

    #[must_use]
    pub const fn cpu_clock(self) -> ClockRate {
        ClockRate::divided_by(self.cpu_divisor())
    }

    #[must_use]
    pub const fn ppu_clock(self) -> ClockRate {
        ClockRate::divided_by(self.ppu_divisor())
    }

    #[must_use]
    pub const fn sequencer_clock(self) -> ClockRate {
        ClockRate::divided_by(self.sequencer_divisor())
    }

    /// Total scanlines per frame, including pre-render and VBlank.
    #[must_use]
    pub const fn scanlines_per_frame(self) -> u16 {
        match self {
            Self::Ntsc => 262,
            Self::Pal => 312,
        }
    }

    /// Pre-render scanline (the last of the frame).
    #[must_use]
    pub const fn pre_render_line(self) -> u16 {
        self.scanlines_per_frame() - 1
    }

    /// Master ticks in one frame of 341-dot scanlines.
    #[must_use]
    pub const fn ticks_per_frame(self) -> u64 {
        341 * self.scanlines_per_frame() as u64 * self.ppu_divisor()
    }

    /// Frames per second, derived from the crystal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fps(self) -> f64 {
        self.crystal_hz() as f64 / self.ticks_per_frame() as f64
    }

    #[must_use]
    pub const fn standard(self) -> VideoStandard {
        match self {
            Self::Ntsc => VideoStandard::Ntsc,
            Self::Pal => VideoStandard::Pal,
        }
    }
}

/// NES configuration.
#[derive(Debug, Clone, Default)]
pub struct NesConfig {
    /// iNES file contents.
    pub rom_data: Vec<u8>,
    /// Video region (NTSC or PAL). Defaults to NTSC.
    pub region: NesRegion,
}
