//! Cartridge loading and the mapper boundary.
//!
//! A [`Cartridge`] couples the parsed iNES header with the board (mapper)
//! built for it. The CPU and PPU buses talk to the cartridge, which forwards
//! to the mapper's banking logic.

use tracing::debug;

use crate::{
    cartridge::{
        header::{Header, NES_HEADER_LEN},
        mapper::{Mapper, MapperState, new_mapper},
    },
    error::Error,
    reset_kind::ResetKind,
};

pub mod a12_watcher;
pub mod chr;
pub mod header;
pub mod mapper;

/// Bytes of PRG hashed into the save-state fingerprint.
const FINGERPRINT_LEN: usize = 1024;

/// Parsed NES cartridge with its board attached.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub header: Header,
    mapper: Box<dyn Mapper>,
    fingerprint: u32,
}

impl Cartridge {
    /// Parses an iNES image and constructs the matching board.
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        let header = Header::parse(bytes)?;

        let mut cursor = NES_HEADER_LEN;
        if header.trainer_present {
            // The 512-byte trainer block is legacy copier baggage; skip it.
            let _ = section(bytes, &mut cursor, 512, "trainer")?;
        }
        let prg_rom = section(bytes, &mut cursor, header.prg_rom_size, "PRG ROM")?;
        let chr_rom = section(bytes, &mut cursor, header.chr_rom_size, "CHR ROM")?;

        let fingerprint = fingerprint(&prg_rom);
        let mapper = new_mapper(
            &header,
            prg_rom.into_boxed_slice(),
            chr_rom.into_boxed_slice(),
        )?;

        debug!(
            mapper = header.mapper,
            board = %mapper.name(),
            prg_kib = header.prg_rom_size / 1024,
            chr_kib = header.chr_rom_size / 1024,
            battery = header.battery,
            "cartridge loaded"
        );

        Ok(Self {
            header,
            mapper,
            fingerprint,
        })
    }

    /// Reassembles the image: header, then PRG, then CHR. Trainers are not
    /// reproduced.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            NES_HEADER_LEN + self.header.prg_rom_size + self.header.chr_rom_size,
        );
        out.extend_from_slice(self.header.raw_bytes());
        out.extend_from_slice(self.mapper.prg_rom());
        if let Some(chr) = self.mapper.chr_rom() {
            out.extend_from_slice(chr);
        }
        out
    }

    /// 32-bit hash of the first 1 KiB of PRG, stored in save states.
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn reset(&mut self, kind: ResetKind) {
        match kind {
            ResetKind::PowerOn => self.mapper.power_on(),
            ResetKind::Soft => self.mapper.reset(),
        }
    }

    #[inline]
    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    #[inline]
    pub fn mapper_mut(&mut self) -> &mut dyn Mapper {
        self.mapper.as_mut()
    }

    /// CPU read in `$4020-$FFFF`; `None` leaves the bus value untouched.
    #[inline]
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        self.mapper.cpu_read(addr)
    }

    #[inline]
    pub fn cpu_write(&mut self, addr: u16, data: u8, cpu_cycle: u64) {
        self.mapper.cpu_write(addr, data, cpu_cycle);
    }

    /// Captures mapper registers and cartridge RAM for a save state.
    pub fn save_state(&self) -> MapperState {
        self.mapper.save_state()
    }

    pub fn load_state(&mut self, state: &MapperState) {
        self.mapper.load_state(state);
    }
}

fn section(
    bytes: &[u8],
    cursor: &mut usize,
    len: usize,
    name: &'static str,
) -> Result<Vec<u8>, Error> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let end = cursor.checked_add(len).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;
    let slice = bytes.get(*cursor..end).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;

    *cursor = end;
    Ok(slice.to_vec())
}

/// FNV-1a over the first KiB of PRG. Cheap, stable, and good enough to catch
/// a save state restored against the wrong game.
fn fingerprint(prg: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &byte in prg.iter().take(FINGERPRINT_LEN) {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
pub(crate) mod test_rom {
    use super::header::NES_HEADER_LEN;

    /// Builds a minimal iNES image for tests.
    pub fn build(mapper: u8, prg_banks: u8, chr_banks: u8, flags6_low: u8) -> Vec<u8> {
        let mut rom = vec![0u8; NES_HEADER_LEN];
        rom[..4].copy_from_slice(b"NES\x1A");
        rom[4] = prg_banks;
        rom[5] = chr_banks;
        rom[6] = ((mapper & 0x0F) << 4) | (flags6_low & 0x0F);
        rom[7] = mapper & 0xF0;
        rom.extend(vec![0u8; prg_banks as usize * 16 * 1024]);
        rom.extend(vec![0u8; chr_banks as usize * 8 * 1024]);
        rom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_serializes_round_trip() {
        let mut rom = test_rom::build(0, 1, 1, 0);
        // Make the payload distinctive.
        let prg_start = NES_HEADER_LEN;
        rom[prg_start] = 0xAA;
        rom[prg_start + 16 * 1024] = 0x55;

        let cart = Cartridge::new(&rom).expect("parse");
        assert_eq!(cart.serialize(), rom);
    }

    #[test]
    fn errors_when_prg_section_missing() {
        let mut rom = test_rom::build(0, 1, 0, 0);
        rom.truncate(NES_HEADER_LEN + 1024);

        let err = Cartridge::new(&rom).expect_err("should fail");
        assert!(matches!(
            err,
            Error::SectionTooShort {
                section: "PRG ROM",
                ..
            }
        ));
    }

    #[test]
    fn unknown_mapper_is_rejected() {
        let rom = test_rom::build(123, 1, 1, 0);
        assert!(matches!(
            Cartridge::new(&rom),
            Err(Error::UnsupportedMapper(123))
        ));
    }

    #[test]
    fn fingerprint_tracks_prg_contents() {
        let rom_a = test_rom::build(0, 1, 1, 0);
        let mut rom_b = rom_a.clone();
        rom_b[NES_HEADER_LEN + 10] = 0xFF;

        let a = Cartridge::new(&rom_a).expect("parse a");
        let b = Cartridge::new(&rom_b).expect("parse b");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
