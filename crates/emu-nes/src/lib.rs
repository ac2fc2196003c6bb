//! NES machine definition.
//!
//! The NES is described as six devices on two buses: the APU, sprite DMA,
//! cartridge mapper, PPU and standard controllers, and the
//! RP2A03 CPU, plus a 2 KiB WRAM region. `emu-core` resolves their
//! declarations into one machine; [`NesDefinition`] is what a host loads
//! iNES images into.

mod apu;
mod cartridge;
mod config;
mod controller;
mod cpu;
mod dma;
pub mod map;
mod mapper;
mod nes;
pub mod ppu;

pub use apu::Apu;
pub use cartridge::{
    Cartridge, CartridgeError, CartridgeHeader, Mirroring, build_ines, parse_header, parse_ines,
};
pub use config::{NesConfig, NesRegion};
pub use controller::{ControllerInput, Controllers, button};
pub use cpu::{CpuCore, Interrupts, NullCore, Rp2a03};
pub use dma::SpriteDma;
pub use mapper::NesMapper;
pub use nes::{CoreFactory, NesDefinition, build, wram};
pub use ppu::Ppu;
