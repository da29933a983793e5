//! Mapper 7 (AxROM) implementation.
//!
//! One register: bits 0-2 select a 32 KiB PRG bank, bit 4 picks which CIRAM
//! page backs the single-screen nametable layout. CHR is 8 KiB RAM.
//!
//! | Area | Address range | Behaviour                                     |
//! |------|---------------|-----------------------------------------------|
//! | CPU  | `$8000-$FFFF` | Switchable 32 KiB PRG; writes latch register  |
//! | PPU  | `$0000-$1FFF` | 8 KiB CHR-RAM                                 |
//! | PPU  | `$2000-$2FFF` | Single-screen A or B, register bit 4          |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, wrap_bank},
    },
    memory::cpu as cpu_mem,
};

const PRG_BANK_SIZE_32K: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub struct Mapper7 {
    prg_rom: PrgRom,
    chr: ChrStorage,
    prg_bank_count: usize,
    register: u8,
}

impl Mapper7 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_32K).max(1);
        Self {
            prg_rom,
            chr: ChrStorage::from_header(header, chr_rom),
            prg_bank_count,
            register: 0,
        }
    }
}

impl Mapper for Mapper7 {
    fn power_on(&mut self) {
        self.register = 0;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        if addr < cpu_mem::PRG_ROM_START || self.prg_rom.is_empty() {
            return None;
        }
        let bank = wrap_bank((self.register & 0x07) as usize, self.prg_bank_count);
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize;
        Some(self.prg_rom[(bank * PRG_BANK_SIZE_32K + offset) % self.prg_rom.len()])
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if addr >= cpu_mem::PRG_ROM_START {
            self.register = data;
        }
    }

    fn ppu_read(&self, addr: u16) -> u8 {
        self.chr.read(addr)
    }

    fn ppu_write(&mut self, addr: u16, data: u8) {
        self.chr.write(addr, data);
    }

    fn ppu_tile(&self, addr: u16) -> &Tile {
        self.chr.tile(0, (addr & 0x1FFF) as usize)
    }

    fn mirroring(&self) -> Mirroring {
        if self.register & 0x10 == 0 {
            Mirroring::SingleScreenLower
        } else {
            Mirroring::SingleScreenUpper
        }
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
            regs: vec![self.register],
            prg_ram: Vec::new(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if let [register] = state.regs[..] {
            self.register = register;
        }
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        7
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("AxROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    #[test]
    fn selects_32k_banks_and_nametable_page() {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 2 * PRG_BANK_SIZE_32K];
        prg[PRG_BANK_SIZE_32K] = 0x77;
        let mut mapper = Mapper7::new(&header, prg.into_boxed_slice(), Box::default());

        assert_eq!(mapper.cpu_read(0x8000), Some(0));
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenLower);

        mapper.cpu_write(0x8000, 0x11, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(0x77));
        assert_eq!(mapper.mirroring(), Mirroring::SingleScreenUpper);
    }
}
