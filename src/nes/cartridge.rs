use anyhow::{Context, Result, bail, ensure};
use std::{fs, path::Path};

use super::mapper::Mirroring;

const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const PRG_UNIT: usize = 0x4000;
const CHR_UNIT: usize = 0x2000;

/// Decoded iNES / NES 2.0 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    mapper_id: u16,
    submapper_id: u8,
    mirroring: Mirroring,
    four_screen: bool,
    battery: bool,
    trainer: bool,
    prg_rom_size: usize,
    chr_rom_size: usize,
    prg_ram_size: usize,
}

impl Header {
    fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= HEADER_LEN,
            "ROM is too small to contain an iNES header"
        );
        ensure!(
            &bytes[0..4] == b"NES\x1A",
            "invalid iNES header magic, expected NES<EOF>"
        );

        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let nes2 = flags7 & 0x0C == 0x08;

        let mut mapper_id = ((flags6 >> 4) | (flags7 & 0xF0)) as u16;
        let mut submapper_id = 0;
        if nes2 {
            mapper_id |= ((bytes[8] & 0x0F) as u16) << 8;
            submapper_id = bytes[8] >> 4;
        }

        let four_screen = flags6 & 0x08 != 0;
        let mirroring = if four_screen {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let (prg_units, chr_units, prg_ram_size) = if nes2 {
            let prg_msb = (bytes[9] & 0x0F) as usize;
            let chr_msb = (bytes[9] >> 4) as usize;
            if prg_msb == 0x0F || chr_msb == 0x0F {
                bail!("NES 2.0 exponent-multiplier ROM sizes are not supported");
            }
            let shift = bytes[10] & 0x0F;
            let prg_ram = if shift == 0 { 0x2000 } else { 64usize << shift };
            (
                (prg_msb << 8) | bytes[4] as usize,
                (chr_msb << 8) | bytes[5] as usize,
                prg_ram,
            )
        } else {
            let ram_units = (bytes[8] as usize).max(1);
            (bytes[4] as usize, bytes[5] as usize, ram_units * 0x2000)
        };

        Ok(Self {
            mapper_id,
            submapper_id,
            mirroring,
            four_screen,
            battery: flags6 & 0x02 != 0,
            trainer: flags6 & 0x04 != 0,
            prg_rom_size: prg_units.max(1) * PRG_UNIT,
            chr_rom_size: chr_units * CHR_UNIT,
            prg_ram_size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mapper_id: u16,
    pub submapper_id: u8,
    pub mirroring: Mirroring,
    pub four_screen: bool,
    pub has_battery_backed_ram: bool,
    pub prg_rom: Vec<u8>,
    pub chr_data: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_ram_size: usize,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("failed to parse ROM: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Header::parse(bytes)?;

        let prg_start = HEADER_LEN + if header.trainer { TRAINER_LEN } else { 0 };
        let prg_end = prg_start + header.prg_rom_size;
        let prg_rom = bytes
            .get(prg_start..prg_end)
            .with_context(|| {
                format!(
                    "ROM truncated: expected {} PRG bytes but file ended early",
                    header.prg_rom_size
                )
            })?
            .to_vec();

        let (chr_data, chr_is_ram) = if header.chr_rom_size == 0 {
            (vec![0; CHR_UNIT], true)
        } else {
            let chr = bytes
                .get(prg_end..prg_end + header.chr_rom_size)
                .with_context(|| {
                    format!(
                        "ROM truncated: expected {} CHR bytes but file ended early",
                        header.chr_rom_size
                    )
                })?;
            (chr.to_vec(), false)
        };

        log::debug!(
            "iNES mapper {} sub {} PRG {}K CHR {}K{} {:?}",
            header.mapper_id,
            header.submapper_id,
            header.prg_rom_size / 1024,
            chr_data.len() / 1024,
            if chr_is_ram { " (RAM)" } else { "" },
            header.mirroring
        );

        if header.battery {
            log::warn!("cartridge has battery-backed RAM; saves are not persisted");
        }

        Ok(Self {
            mapper_id: header.mapper_id,
            submapper_id: header.submapper_id,
            mirroring: header.mirroring,
            four_screen: header.four_screen,
            has_battery_backed_ram: header.battery,
            prg_rom,
            chr_data,
            chr_is_ram,
            prg_ram_size: header.prg_ram_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(flags6: u8, prg_units: u8, chr_units: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(b"NES\x1A");
        bytes[4] = prg_units;
        bytes[5] = chr_units;
        bytes[6] = flags6;
        bytes.extend(std::iter::repeat_n(0xEA, prg_units as usize * PRG_UNIT));
        bytes.extend(std::iter::repeat_n(0x55, chr_units as usize * CHR_UNIT));
        bytes
    }

    #[test]
    fn parses_ines_header() {
        let cart = Cartridge::from_bytes(&image(0x41, 2, 1)).unwrap();
        assert_eq!(cart.mapper_id, 4);
        assert_eq!(cart.mirroring, Mirroring::Vertical);
        assert_eq!(cart.prg_rom.len(), 2 * PRG_UNIT);
        assert_eq!(cart.chr_data.len(), CHR_UNIT);
        assert!(!cart.chr_is_ram);
        assert_eq!(cart.prg_ram_size, 0x2000);
    }

    #[test]
    fn missing_chr_rom_means_chr_ram() {
        let cart = Cartridge::from_bytes(&image(0x00, 1, 0)).unwrap();
        assert!(cart.chr_is_ram);
        assert_eq!(cart.chr_data.len(), CHR_UNIT);
    }

    #[test]
    fn trainer_is_skipped() {
        let mut bytes = image(0x04, 1, 0);
        bytes.splice(HEADER_LEN..HEADER_LEN, std::iter::repeat_n(0x00, TRAINER_LEN));
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.prg_rom[0], 0xEA);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bytes = image(0x00, 1, 1);
        bytes.truncate(HEADER_LEN + 100);
        let err = Cartridge::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("PRG"));

        let mut bytes = image(0x00, 1, 0);
        bytes[3] = 0;
        assert!(Cartridge::from_bytes(&bytes).is_err());
    }
}
