use std::{fs, path::Path};

use log::info;

use crate::error::{EmuError, Result};
use crate::mmu::BANK_SIZE;

// Cartridge header layout (gbdev.io/pandocs/The_Cartridge_Header.html)
const ENTRY_POINT: usize = 0x0100;
const LOGO_START: usize = 0x0104;
const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0143;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const HEADER_CHECKSUM: usize = 0x014D;
const HEADER_END: usize = 0x0150;

/// Bitmap the boot ROM compares against 0x0104-0x0133 before handing over.
pub const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
}

#[derive(Debug)]
pub struct Cartridge {
    banks: Vec<Vec<u8>>,
    pub mbc: MbcType,
    pub title: String,
    /// Raw mapper byte from 0x0147.
    pub cart_type: u8,
    declared_banks: usize,
}

impl Cartridge {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let cart = Self::from_bytes(data)?;
        info!(
            "Loaded ROM: {} (MBC: {:?}, {} banks)",
            cart.title,
            cart.mbc,
            cart.bank_count()
        );
        Ok(cart)
    }

    /// Split a raw image into 16 KiB banks. The last bank is padded with
    /// 0xFF, which is what an unconnected bus reads as.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = Header::parse(&data);
        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;
        let title = header.title();
        let declared_banks = header.declared_banks();

        let mut banks: Vec<Vec<u8>> = data
            .chunks(BANK_SIZE)
            .map(|chunk| {
                let mut bank = chunk.to_vec();
                bank.resize(BANK_SIZE, 0xFF);
                bank
            })
            .collect();
        if banks.is_empty() {
            banks.push(vec![0xFF; BANK_SIZE]);
        }

        Ok(Self {
            banks,
            mbc,
            title,
            cart_type,
            declared_banks,
        })
    }

    /// 32 KiB ROM-only image that passes the boot ROM's logo and header
    /// checks, then idles in a `JR -2` loop at the entry point.
    pub fn blank() -> Self {
        let mut rom = vec![0u8; 2 * BANK_SIZE];
        rom[ENTRY_POINT..ENTRY_POINT + 3].copy_from_slice(&[0x00, 0x18, 0xFE]);
        rom[LOGO_START..LOGO_START + NINTENDO_LOGO.len()].copy_from_slice(&NINTENDO_LOGO);
        let title = b"NO CARTRIDGE";
        rom[TITLE_START..TITLE_START + title.len()].copy_from_slice(title);
        rom[HEADER_CHECKSUM] = header_checksum(&rom);

        Self {
            banks: rom.chunks(BANK_SIZE).map(<[u8]>::to_vec).collect(),
            mbc: MbcType::NoMbc,
            title: String::from_utf8_lossy(title).into_owned(),
            cart_type: 0x00,
            declared_banks: 2,
        }
    }

    pub fn bank(&self, index: usize) -> Option<&[u8]> {
        self.banks.get(index).map(Vec::as_slice)
    }

    /// Banks actually present in the image.
    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Bank count advertised by the header, `2 << n`.
    pub fn declared_bank_count(&self) -> usize {
        self.declared_banks
    }

    /// Mask applied to a selected bank number. The header count is always a
    /// power of two, so this is its bit width.
    pub fn rom_bank_mask(&self) -> usize {
        self.declared_banks - 1
    }
}

/// Checksum over 0x0134-0x014C as computed by the boot ROM.
pub fn header_checksum(rom: &[u8]) -> u8 {
    rom[TITLE_START..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let end = TITLE_END.min(self.data.len());
        let mut slice = &self.data[TITLE_START.min(self.data.len())..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        if self.data.len() < HEADER_END {
            return 0x00;
        }
        self.data.get(CART_TYPE).copied().unwrap_or(0)
    }

    fn mbc_type(&self) -> Result<MbcType> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            other => Err(EmuError::UnsupportedMapper(other)),
        }
    }

    fn declared_banks(&self) -> usize {
        if self.data.len() < HEADER_END {
            return 2;
        }
        // Codes above 8 (8 MiB) are not real ROM sizes.
        let code = self.data.get(ROM_SIZE).copied().unwrap_or(0).min(8);
        2 << code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_image_passes_header_checksum() {
        let cart = Cartridge::blank();
        let bank0 = cart.bank(0).unwrap();
        assert_eq!(bank0[HEADER_CHECKSUM], header_checksum(bank0));
        assert_eq!(&bank0[LOGO_START..LOGO_START + 48], &NINTENDO_LOGO);
        assert_eq!(cart.bank_count(), 2);
    }

    #[test]
    fn short_image_is_padded_to_one_bank() {
        let cart = Cartridge::from_bytes(vec![0x21, 0x20, 0x21]).unwrap();
        assert_eq!(cart.bank_count(), 1);
        let bank0 = cart.bank(0).unwrap();
        assert_eq!(&bank0[..3], &[0x21, 0x20, 0x21]);
        assert_eq!(bank0[3], 0xFF);
        assert_eq!(cart.mbc, MbcType::NoMbc);
    }
}
