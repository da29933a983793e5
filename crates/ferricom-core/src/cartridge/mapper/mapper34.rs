//! Mapper 34 (BNROM) implementation.
//!
//! A single register selects a 32 KiB PRG bank; CHR is 8 KiB RAM. (The NINA-1
//! board that shares this mapper number is not modelled.)
//!
//! | Area | Address range | Behaviour                                    |
//! |------|---------------|----------------------------------------------|
//! | CPU  | `$8000-$FFFF` | Switchable 32 KiB PRG; writes latch register |
//! | PPU  | `$0000-$1FFF` | 8 KiB CHR-RAM                                |

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
pub struct Mapper34 {
    prg_rom: PrgRom,
    chr: ChrStorage,
    prg_bank_count: usize,
    mirroring: Mirroring,
    prg_bank: u8,
}

impl Mapper34 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_32K).max(1);
        Self {
            prg_rom,
            chr: ChrStorage::from_header(header, chr_rom),
            prg_bank_count,
            mirroring: header.mirroring,
            prg_bank: 0,
        }
    }
}

impl Mapper for Mapper34 {
    fn power_on(&mut self) {
        self.prg_bank = 0;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        if addr < cpu_mem::PRG_ROM_START || self.prg_rom.is_empty() {
            return None;
        }
        let bank = wrap_bank(self.prg_bank as usize, self.prg_bank_count);
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize;
        Some(self.prg_rom[(bank * PRG_BANK_SIZE_32K + offset) % self.prg_rom.len()])
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if addr >= cpu_mem::PRG_ROM_START {
            self.prg_bank = data;
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
            regs: vec![self.prg_bank],
            prg_ram: Vec::new(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if let [bank] = state.regs[..] {
            self.prg_bank = bank;
        }
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        34
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("BNROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    #[test]
    fn switches_32k_prg_banks() {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 4, 0, 0, 0x20, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 2 * PRG_BANK_SIZE_32K];
        prg[PRG_BANK_SIZE_32K + 0x123] = 0x44;
        let mut mapper = Mapper34::new(&header, prg.into_boxed_slice(), Box::default());

        mapper.cpu_write(0x8000, 1, 0);
        assert_eq!(mapper.cpu_read(0x8123), Some(0x44));
    }
}
