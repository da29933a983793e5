//! iNES header parsing.
//!
//! The first 16 bytes of every `.nes` image describe how much PRG/CHR data
//! the cartridge carries, which mapper it needs, and a few compatibility
//! flags. This module parses the iNES 1.0 flavour of that header into a
//! [`Header`] the rest of the core consumes.
//!
//! # Quick overview
//! - Pass the first 16 bytes to [`Header::parse`].
//! - Inspect [`Header::mapper`] to construct the matching mapper.
//! - Use [`Header::prg_rom_size`] / [`Header::chr_rom_size`] to slice the raw
//!   PRG/CHR sections out of the file.
//!
//! Damaged headers turn into a descriptive [`Error`].

use bitflags::bitflags;

use crate::error::Error;

const NES_MAGIC: &[u8; 4] = b"NES\x1A";

/// Size of the fixed iNES header in bytes.
pub const NES_HEADER_LEN: usize = 16;

/// PRG-ROM sizing unit (16 KiB).
pub const PRG_BANK_SIZE: usize = 16 * 1024;
/// CHR-ROM sizing unit in the header (8 KiB).
pub const CHR_HEADER_UNIT: usize = 8 * 1024;
/// CHR banks are tracked internally in 4 KiB units for mapper convenience.
pub const CHR_BANK_SIZE: usize = 4 * 1024;

/// Default PRG-RAM allocation when the header gives no sizing information.
pub const DEFAULT_PRG_RAM_SIZE: usize = 8 * 1024;
/// CHR-RAM allocation for cartridges that ship no CHR-ROM.
pub const DEFAULT_CHR_RAM_SIZE: usize = 8 * 1024;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags6: u8 {
        const MIRRORING       = 0b0000_0001;
        const BATTERY         = 0b0000_0010;
        const TRAINER         = 0b0000_0100;
        const FOUR_SCREEN     = 0b0000_1000;
        const MAPPER_LOW_MASK = 0b1111_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags7: u8 {
        const VS_UNISYSTEM     = 0b0000_0001;
        const PLAYCHOICE_10    = 0b0000_0010;
        const NES2_DETECTION   = 0b0000_1100;
        const MAPPER_HIGH_MASK = 0b1111_0000;
    }
}

/// Layout mirroring for the PPU nametables.
#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mirroring {
    /// Two horizontal nametables that mirror vertically.
    Horizontal,
    /// Two vertical nametables that mirror horizontally.
    Vertical,
    /// Cartridge supplies its own four nametables.
    FourScreen,
    /// Single-screen mirroring using the first CIRAM page.
    SingleScreenLower,
    /// Single-screen mirroring using the second CIRAM page.
    SingleScreenUpper,
}

/// Parsed iNES 1.0 header.
#[derive(Debug, Clone)]
pub struct Header {
    /// Raw header bytes, preserved so images round-trip byte-identically.
    raw: [u8; NES_HEADER_LEN],
    /// Resolved mapper number (low nibble from flags 6, high from flags 7).
    pub mapper: u16,
    /// Nametable layout hint.
    pub mirroring: Mirroring,
    /// Battery-backed PRG-RAM present.
    pub battery: bool,
    /// A 512-byte trainer precedes the PRG section.
    pub trainer_present: bool,
    /// PRG-ROM byte count.
    pub prg_rom_size: usize,
    /// CHR-ROM byte count (0 means the board uses CHR-RAM).
    pub chr_rom_size: usize,
    /// CHR-RAM byte count allocated when no CHR-ROM is present.
    pub chr_ram_size: usize,
    /// PRG-RAM byte count mappers should allocate.
    pub prg_ram_size: usize,
}

impl Header {
    /// Parses the leading 16 bytes of an iNES image.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < NES_HEADER_LEN {
            return Err(Error::TooShort {
                actual: bytes.len(),
            });
        }
        if &bytes[..4] != NES_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let mut raw = [0u8; NES_HEADER_LEN];
        raw.copy_from_slice(&bytes[..NES_HEADER_LEN]);

        let flags6 = Flags6::from_bits_truncate(raw[6]);
        let flags7 = Flags7::from_bits_truncate(raw[7]);

        let mapper_low = (raw[6] >> 4) as u16;
        // Dirty-dumper workaround: early ROM tools stuffed ASCII junk into
        // bytes 8..16, which corrupts the high mapper nibble. A non-zero tail
        // means the nibble cannot be trusted.
        let tail_dirty = raw[8..NES_HEADER_LEN].iter().any(|&b| b != 0);
        let mapper_high = if tail_dirty { 0 } else { (raw[7] >> 4) as u16 };
        let mapper = (mapper_high << 4) | mapper_low;

        let mirroring = if flags6.contains(Flags6::FOUR_SCREEN) {
            Mirroring::FourScreen
        } else if flags6.contains(Flags6::MIRRORING) {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let prg_rom_size = raw[4] as usize * PRG_BANK_SIZE;
        let chr_rom_size = raw[5] as usize * CHR_HEADER_UNIT;
        let chr_ram_size = if chr_rom_size == 0 {
            DEFAULT_CHR_RAM_SIZE
        } else {
            0
        };

        Ok(Self {
            raw,
            mapper,
            mirroring,
            battery: flags6.contains(Flags6::BATTERY),
            trainer_present: flags6.contains(Flags6::TRAINER),
            prg_rom_size,
            chr_rom_size,
            chr_ram_size,
            prg_ram_size: DEFAULT_PRG_RAM_SIZE,
        })
    }

    /// The header exactly as it appeared in the image.
    pub fn raw_bytes(&self) -> &[u8; NES_HEADER_LEN] {
        &self.raw
    }

    /// Number of 16 KiB PRG-ROM banks.
    pub fn prg_bank_count(&self) -> usize {
        self.prg_rom_size / PRG_BANK_SIZE
    }

    /// Number of 4 KiB CHR banks (double the header's 8 KiB count).
    pub fn chr_bank_count(&self) -> usize {
        self.chr_rom_size / CHR_BANK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(prg: u8, chr: u8, flags6: u8, flags7: u8) -> [u8; NES_HEADER_LEN] {
        [
            b'N', b'E', b'S', 0x1A, prg, chr, flags6, flags7, 0, 0, 0, 0, 0, 0, 0, 0,
        ]
    }

    #[test]
    fn parses_mapper_and_sizes() {
        let header = Header::parse(&header_bytes(2, 1, 0x10, 0x40)).expect("parse");
        assert_eq!(header.mapper, 0x41);
        assert_eq!(header.prg_rom_size, 32 * 1024);
        assert_eq!(header.chr_rom_size, 8 * 1024);
        assert_eq!(header.chr_bank_count(), 2);
        assert_eq!(header.chr_ram_size, 0);
    }

    #[test]
    fn dirty_tail_discards_high_mapper_nibble() {
        let mut bytes = header_bytes(1, 1, 0x10, 0x40);
        bytes[12] = b'D'; // "DiskDude!" style junk
        let header = Header::parse(&bytes).expect("parse");
        assert_eq!(header.mapper, 1);
    }

    #[test]
    fn resolves_mirroring_flags() {
        let h = Header::parse(&header_bytes(1, 1, 0x01, 0)).expect("parse");
        assert_eq!(h.mirroring, Mirroring::Vertical);
        let h = Header::parse(&header_bytes(1, 1, 0x00, 0)).expect("parse");
        assert_eq!(h.mirroring, Mirroring::Horizontal);
        // Four-screen wins over the mirroring bit.
        let h = Header::parse(&header_bytes(1, 1, 0x09, 0)).expect("parse");
        assert_eq!(h.mirroring, Mirroring::FourScreen);
    }

    #[test]
    fn chr_less_images_get_chr_ram() {
        let header = Header::parse(&header_bytes(1, 0, 0, 0)).expect("parse");
        assert_eq!(header.chr_rom_size, 0);
        assert_eq!(header.chr_ram_size, DEFAULT_CHR_RAM_SIZE);
    }

    #[test]
    fn rejects_bad_magic_and_short_input() {
        assert!(matches!(
            Header::parse(&[0u8; NES_HEADER_LEN]),
            Err(Error::InvalidMagic)
        ));
        assert!(matches!(
            Header::parse(&[b'N', b'E', b'S']),
            Err(Error::TooShort { actual: 3 })
        ));
    }
}
