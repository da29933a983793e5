//! Mapper 3 (CNROM) implementation.
//!
//! PRG is fixed (16 KiB mirrored or 32 KiB flat); a single register selects
//! which 8 KiB CHR bank the PPU sees.
//!
//! | Area | Address range | Behaviour                             |
//! |------|---------------|---------------------------------------|
//! | CPU  | `$8000-$FFFF` | Fixed PRG; writes latch CHR bank      |
//! | PPU  | `$0000-$1FFF` | Switchable 8 KiB CHR bank             |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, wrap_bank},
    },
    memory::cpu as cpu_mem,
};

const CHR_BANK_SIZE_8K: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct Mapper3 {
    prg_rom: PrgRom,
    chr: ChrStorage,
    chr_bank_count: usize,
    mirroring: Mirroring,
    chr_bank: u8,
}

impl Mapper3 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let chr = ChrStorage::from_header(header, chr_rom);
        let chr_bank_count = (chr.len() / CHR_BANK_SIZE_8K).max(1);
        Self {
            prg_rom,
            chr,
            chr_bank_count,
            mirroring: header.mirroring,
            chr_bank: 0,
        }
    }

    #[inline]
    fn chr_base(&self) -> usize {
        wrap_bank(self.chr_bank as usize, self.chr_bank_count) * CHR_BANK_SIZE_8K
    }
}

impl Mapper for Mapper3 {
    fn power_on(&mut self) {
        self.chr_bank = 0;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        if addr < cpu_mem::PRG_ROM_START || self.prg_rom.is_empty() {
            return None;
        }
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize % self.prg_rom.len();
        Some(self.prg_rom[offset])
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if addr >= cpu_mem::PRG_ROM_START {
            self.chr_bank = data;
        }
    }

    fn ppu_read(&self, addr: u16) -> u8 {
        self.chr.read_indexed(self.chr_base(), (addr & 0x1FFF) as usize)
    }

    fn ppu_write(&mut self, addr: u16, data: u8) {
        let base = self.chr_base();
        self.chr.write_indexed(base, (addr & 0x1FFF) as usize, data);
    }

    fn ppu_tile(&self, addr: u16) -> &Tile {
        self.chr.tile(self.chr_base(), (addr & 0x1FFF) as usize)
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    fn chr_rom(&self) -> Option<&[u8]> {
        self.chr.as_rom()
    }

    fn chr_ram(&self) -> Option<&[u8]> {
        self.chr.as_ram()
    }

    fn save_state(&self) -> MapperState {
        MapperState {
            regs: vec![self.chr_bank],
            prg_ram: Vec::new(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if let [bank] = state.regs[..] {
            self.chr_bank = bank;
        }
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        3
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("CNROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    #[test]
    fn switches_8k_chr_banks() {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut chr = vec![0u8; 2 * CHR_BANK_SIZE_8K];
        chr[CHR_BANK_SIZE_8K] = 0x99;
        let mut mapper = Mapper3::new(
            &header,
            vec![0u8; 16 * 1024].into_boxed_slice(),
            chr.into_boxed_slice(),
        );

        assert_eq!(mapper.ppu_read(0x0000), 0);
        mapper.cpu_write(0x8000, 1, 0);
        assert_eq!(mapper.ppu_read(0x0000), 0x99);
    }
}
