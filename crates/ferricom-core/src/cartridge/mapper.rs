//! Cartridge mapper contract.
//!
//! Every board implements [`Mapper`]: the mandatory surface covers CPU/PPU
//! address decoding and nametable mirroring, while optional behaviours (CHR
//! latches, scanline IRQs, nametable overrides, ...) are gated behind
//! *capability flags*. A capability returning `true` is a promise that the
//! matching callback is implemented; the PPU only ever branches on these
//! flags, never on the mapper's identity.

use std::borrow::Cow;
use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::{
    cartridge::{
        chr::Tile,
        header::{Header, Mirroring},
    },
    error::Error,
};

pub mod mapper0;
pub mod mapper1;
pub mod mapper2;
pub mod mapper3;
pub mod mapper4;
pub mod mapper5;
pub mod mapper7;
pub mod mapper9;
pub mod mapper10;
pub mod mapper11;
pub mod mapper34;
pub mod mapper66;

/// Raw PRG-ROM bytes handed to a mapper at construction.
pub type PrgRom = Box<[u8]>;
/// Raw CHR-ROM bytes handed to a mapper at construction (may be empty).
pub type ChrRom = Box<[u8]>;

/// Serializable mapper payload for save states.
///
/// `regs` is a mapper-defined register dump; PRG-RAM and CHR-RAM travel as
/// raw bytes. Boards without RAM leave the vectors empty.
#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperState {
    pub regs: Vec<u8>,
    pub prg_ram: Vec<u8>,
    pub chr_ram: Vec<u8>,
}

pub trait Mapper: DynClone + Debug + Send {
    /// Applies power-on register defaults.
    fn power_on(&mut self);

    /// Front-panel reset. Most boards behave like a fresh power-on.
    fn reset(&mut self) {
        self.power_on();
    }

    /// Answers CPU reads for `addr >= 0x4020`. `None` means the address is
    /// unmapped and the bus substitutes open-bus data.
    fn cpu_read(&self, addr: u16) -> Option<u8>;

    /// Accepts bank-switch register writes and PRG-RAM writes. `cpu_cycle`
    /// lets boards with bus-contention rules (MMC1) filter back-to-back
    /// writes.
    fn cpu_write(&mut self, addr: u16, data: u8, cpu_cycle: u64);

    /// Current CHR mapping for PPU reads in `0x0000-0x1FFF`.
    fn ppu_read(&self, addr: u16) -> u8;

    /// PPU writes in `0x0000-0x1FFF`; only CHR-RAM boards accept them.
    fn ppu_write(&mut self, addr: u16, data: u8);

    /// Decoded tile covering the pattern address, through the current CHR
    /// mapping. The renderer uses this instead of walking bitplanes.
    fn ppu_tile(&self, addr: u16) -> &Tile;

    /// Currently configured nametable layout.
    fn mirroring(&self) -> Mirroring;

    // Capability: scanline IRQ driven by PPU A12 (MMC3 family).
    fn has_scanline_irq(&self) -> bool {
        false
    }
    /// Level of PPU address bit 12, delivered once per pattern fetch pair in
    /// fetch order. Only invoked when [`Self::has_scanline_irq`] is true.
    fn notify_a12(&mut self, a12_high: bool) {
        let _ = a12_high;
    }

    // Capability: CHR latches keyed on magic tile fetches (MMC2/MMC4).
    fn has_chr_latch(&self) -> bool {
        false
    }
    /// Real pattern-fetch address, delivered for both bitplanes of every
    /// background and sprite tile fetch.
    fn latch_access(&mut self, addr: u16) {
        let _ = addr;
    }

    // Capability: BG/sprite fetch phase tracking (MMC5 CHR set switching).
    fn has_ppu_a13_chr_switch(&self) -> bool {
        false
    }
    /// Signalled when the PPU transitions between background and sprite
    /// fetch phases; `sprite_phase` is true while sprites are fetched and
    /// `tall_sprites` reflects the current 8×16 mode.
    fn notify_ppu_a13(&mut self, sprite_phase: bool, tall_sprites: bool) {
        let _ = (sprite_phase, tall_sprites);
    }

    // Capability: nametable override (MMC5 ExRAM / fill mode).
    fn has_nametable_override(&self) -> bool {
        false
    }
    /// Services a PPU nametable read in `0x2000-0x2FFF`. `ciram` is the
    /// console's internal nametable RAM, which the board may route to.
    fn read_nametable(&self, addr: u16, ciram: &[u8]) -> u8 {
        let _ = (addr, ciram);
        0
    }
    /// Services a PPU nametable write in `0x2000-0x2FFF`.
    fn write_nametable(&mut self, addr: u16, data: u8, ciram: &mut [u8]) {
        let _ = (addr, data, ciram);
    }

    // Capability: observe every PPU memory access (MMC5 in-frame detector).
    fn has_ppu_address_hook(&self) -> bool {
        false
    }
    fn ppu_address_update(&mut self, addr: u16) {
        let _ = addr;
    }

    // Capability: end-of-scanline notification (MMC5 in-frame IRQ).
    fn has_ppu_scanline_hook(&self) -> bool {
        false
    }
    fn on_scanline(&mut self, scanline: u16, rendering: bool) {
        let _ = (scanline, rendering);
    }

    /// Whether the board is asserting its IRQ line.
    fn irq_pending(&self) -> bool {
        false
    }
    /// Acknowledges the IRQ line.
    fn clear_irq(&mut self) {}

    /// Raw PRG-ROM bytes the board was built from.
    fn prg_rom(&self) -> &[u8];

    /// Raw CHR-ROM bytes, when the board uses read-only CHR.
    fn chr_rom(&self) -> Option<&[u8]> {
        None
    }

    /// Battery-backed or work PRG-RAM contents, when present.
    fn prg_ram(&self) -> Option<&[u8]> {
        None
    }
    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        None
    }

    /// CHR-RAM contents, when the board uses writable CHR.
    fn chr_ram(&self) -> Option<&[u8]> {
        None
    }

    /// Captures mapper registers plus any cartridge RAM.
    fn save_state(&self) -> MapperState;

    /// Restores a previously captured [`MapperState`].
    fn load_state(&mut self, state: &MapperState);

    /// iNES mapper number implemented by this board.
    fn mapper_id(&self) -> u16;

    /// Human-readable board name.
    fn name(&self) -> Cow<'static, str>;
}

dyn_clone::clone_trait_object!(Mapper);

/// Instantiates the board for `header.mapper`.
pub fn new_mapper(
    header: &Header,
    prg_rom: PrgRom,
    chr_rom: ChrRom,
) -> Result<Box<dyn Mapper>, Error> {
    let mut mapper: Box<dyn Mapper> = match header.mapper {
        0 => Box::new(mapper0::Mapper0::new(header, prg_rom, chr_rom)),
        1 => Box::new(mapper1::Mapper1::new(header, prg_rom, chr_rom)),
        2 => Box::new(mapper2::Mapper2::new(header, prg_rom, chr_rom)),
        3 => Box::new(mapper3::Mapper3::new(header, prg_rom, chr_rom)),
        4 => Box::new(mapper4::Mapper4::new(header, prg_rom, chr_rom)),
        5 => Box::new(mapper5::Mapper5::new(header, prg_rom, chr_rom)),
        7 => Box::new(mapper7::Mapper7::new(header, prg_rom, chr_rom)),
        9 => Box::new(mapper9::Mapper9::new(header, prg_rom, chr_rom)),
        10 => Box::new(mapper10::Mapper10::new(header, prg_rom, chr_rom)),
        11 => Box::new(mapper11::Mapper11::new(header, prg_rom, chr_rom)),
        34 => Box::new(mapper34::Mapper34::new(header, prg_rom, chr_rom)),
        66 => Box::new(mapper66::Mapper66::new(header, prg_rom, chr_rom)),
        id => return Err(Error::UnsupportedMapper(id)),
    };
    mapper.power_on();
    Ok(mapper)
}

/// Allocates PRG-RAM sized from the header. Boards call this at construction.
pub(crate) fn allocate_prg_ram(header: &Header) -> Box<[u8]> {
    vec![0u8; header.prg_ram_size].into_boxed_slice()
}

/// Resolves a bank register against the number of available banks, wrapping
/// out-of-range values the way address lines do on real boards.
#[inline]
pub(crate) fn wrap_bank(bank: usize, bank_count: usize) -> usize {
    if bank_count == 0 { 0 } else { bank % bank_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    fn header(mapper: u8) -> Header {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N',
            b'E',
            b'S',
            0x1A,
            1,
            1,
            (mapper & 0x0F) << 4,
            mapper & 0xF0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ];
        Header::parse(&bytes).expect("header")
    }

    fn rom_16k() -> PrgRom {
        vec![0u8; 16 * 1024].into_boxed_slice()
    }

    fn chr_8k() -> ChrRom {
        vec![0u8; 8 * 1024].into_boxed_slice()
    }

    #[test]
    fn registry_builds_known_boards() {
        for id in [0u8, 1, 2, 3, 4, 5, 7, 9, 10, 11, 34, 66] {
            let mapper = new_mapper(&header(id), rom_16k(), chr_8k()).expect("known mapper");
            assert_eq!(mapper.mapper_id(), id as u16);
        }
    }

    #[test]
    fn registry_rejects_unknown_boards() {
        assert!(matches!(
            new_mapper(&header(123), rom_16k(), chr_8k()),
            Err(Error::UnsupportedMapper(123))
        ));
    }

    #[test]
    fn capability_defaults_are_off() {
        let mapper = new_mapper(&header(0), rom_16k(), chr_8k()).expect("nrom");
        assert!(!mapper.has_scanline_irq());
        assert!(!mapper.has_chr_latch());
        assert!(!mapper.has_nametable_override());
        assert!(!mapper.has_ppu_address_hook());
        assert!(!mapper.has_ppu_scanline_hook());
        assert!(!mapper.has_ppu_a13_chr_switch());
    }
}
