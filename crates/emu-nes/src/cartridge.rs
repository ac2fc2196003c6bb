//! iNES cartridge images.
//!
//! An iNES file is a 16-byte header, an optional 512-byte trainer, PRG ROM
//! in 16 KiB banks and CHR ROM in 8 KiB banks. Zero CHR banks means the
//! board carries 8 KiB of CHR RAM instead.

use thiserror::Error;

const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const PRG_BANK: usize = 16 * 1024;
const CHR_BANK: usize = 8 * 1024;

/// Nametable mirroring wired on the cartridge board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

/// Parsed iNES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub prg_rom_banks: u8,
    pub chr_rom_banks: u8,
    pub mapper_number: u8,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub has_trainer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("iNES file too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid iNES magic (expected NES\\x1A)")]
    BadMagic,

    #[error("iNES image has no PRG ROM")]
    NoPrgRom,

    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u8),
}

/// PRG and CHR contents of a cartridge plus its board wiring.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    pub prg_rom: Vec<u8>,
    /// CHR ROM, or zeroed CHR RAM when the image has none.
    pub chr: Vec<u8>,
    pub chr_is_ram: bool,
}

impl Cartridge {
    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        self.header.mirroring
    }
}

/// Parse the iNES header.
pub fn parse_header(data: &[u8]) -> Result<CartridgeHeader, CartridgeError> {
    if data.len() < HEADER_LEN {
        return Err(CartridgeError::Truncated {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }
    if &data[0..4] != b"NES\x1a" {
        return Err(CartridgeError::BadMagic);
    }

    let flags6 = data[6];
    let flags7 = data[7];
    let mirroring = if flags6 & 0x08 != 0 {
        Mirroring::FourScreen
    } else if flags6 & 0x01 != 0 {
        Mirroring::Vertical
    } else {
        Mirroring::Horizontal
    };

    Ok(CartridgeHeader {
        prg_rom_banks: data[4],
        chr_rom_banks: data[5],
        mapper_number: (flags7 & 0xF0) | (flags6 >> 4),
        mirroring,
        has_battery: flags6 & 0x02 != 0,
        has_trainer: flags6 & 0x04 != 0,
    })
}

/// Parse a complete iNES image. Only NROM (mapper 0) boards are accepted.
pub fn parse_ines(data: &[u8]) -> Result<Cartridge, CartridgeError> {
    let header = parse_header(data)?;
    if header.mapper_number != 0 {
        return Err(CartridgeError::UnsupportedMapper(header.mapper_number));
    }
    if header.prg_rom_banks == 0 {
        return Err(CartridgeError::NoPrgRom);
    }

    let prg_size = usize::from(header.prg_rom_banks) * PRG_BANK;
    let chr_size = usize::from(header.chr_rom_banks) * CHR_BANK;
    let prg_start = HEADER_LEN + if header.has_trainer { TRAINER_LEN } else { 0 };
    let chr_start = prg_start + prg_size;

    if data.len() < chr_start + chr_size {
        return Err(CartridgeError::Truncated {
            expected: chr_start + chr_size,
            actual: data.len(),
        });
    }

    let prg_rom = data[prg_start..chr_start].to_vec();
    let chr_is_ram = chr_size == 0;
    let chr = if chr_is_ram {
        vec![0; CHR_BANK]
    } else {
        data[chr_start..chr_start + chr_size].to_vec()
    };

    Ok(Cartridge {
        header,
        prg_rom,
        chr,
        chr_is_ram,
    })
}

/// Build an iNES image in memory. Test support for this crate and its
/// dependents.
#[must_use]
pub fn build_ines(prg: &[u8], chr: &[u8], flags6: u8) -> Vec<u8> {
    let mut image = vec![0; HEADER_LEN];
    image[0..4].copy_from_slice(b"NES\x1a");
    image[4] = prg.len().div_ceil(PRG_BANK) as u8;
    image[5] = chr.len().div_ceil(CHR_BANK) as u8;
    image[6] = flags6;
    let mut prg = prg.to_vec();
    prg.resize(usize::from(image[4]) * PRG_BANK, 0);
    let mut chr = chr.to_vec();
    chr.resize(usize::from(image[5]) * CHR_BANK, 0);
    image.extend_from_slice(&prg);
    image.extend_from_slice(&chr);
    image
}
