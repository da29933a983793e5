//! Mapper 2 (UNROM / UxROM) implementation.
//!
//! A single write-anywhere register selects the 16 KiB PRG bank at `$8000`;
//! the last bank is fixed at `$C000`. CHR is always 8 KiB of RAM (the board
//! has no CHR-ROM lines).
//!
//! | Area | Address range | Behaviour                               |
//! |------|---------------|-----------------------------------------|
//! | CPU  | `$8000-$BFFF` | Switchable 16 KiB PRG bank              |
//! | CPU  | `$C000-$FFFF` | Fixed last 16 KiB PRG bank              |
//! | CPU  | `$8000-$FFFF` | Writes latch the bank select register   |
//! | PPU  | `$0000-$1FFF` | 8 KiB CHR-RAM                           |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, wrap_bank},
    },
    memory::cpu as cpu_mem,
};

const PRG_BANK_SIZE_16K: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct Mapper2 {
    prg_rom: PrgRom,
    chr: ChrStorage,
    prg_bank_count: usize,
    mirroring: Mirroring,
    prg_bank: u8,
}

impl Mapper2 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_16K).max(1);
        Self {
            prg_rom,
            chr: ChrStorage::from_header(header, chr_rom),
            prg_bank_count,
            mirroring: header.mirroring,
            prg_bank: 0,
        }
    }

    fn read_prg_rom(&self, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }
        let bank = if addr < 0xC000 {
            wrap_bank(self.prg_bank as usize, self.prg_bank_count)
        } else {
            self.prg_bank_count - 1
        };
        let offset = (addr as usize - cpu_mem::PRG_ROM_START as usize) % PRG_BANK_SIZE_16K;
        self.prg_rom[(bank * PRG_BANK_SIZE_16K + offset) % self.prg_rom.len()]
    }
}

impl Mapper for Mapper2 {
    fn power_on(&mut self) {
        self.prg_bank = 0;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        (addr >= cpu_mem::PRG_ROM_START).then(|| self.read_prg_rom(addr))
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
        2
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("UNROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    fn unrom(prg_banks: u8) -> Mapper2 {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, prg_banks, 0, 0x20, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; prg_banks as usize * PRG_BANK_SIZE_16K];
        for bank in 0..prg_banks as usize {
            prg[bank * PRG_BANK_SIZE_16K] = bank as u8;
        }
        Mapper2::new(&header, prg.into_boxed_slice(), Box::default())
    }

    #[test]
    fn switches_low_window_and_fixes_last_bank() {
        let mut mapper = unrom(8);
        assert_eq!(mapper.cpu_read(0xC000), Some(7));

        mapper.cpu_write(0x8000, 3, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(3));
        assert_eq!(mapper.cpu_read(0xC000), Some(7));
    }

    #[test]
    fn bank_select_wraps_to_rom_size() {
        let mut mapper = unrom(4);
        mapper.cpu_write(0x8000, 6, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(2));
    }

    #[test]
    fn chr_ram_is_writable() {
        let mut mapper = unrom(2);
        mapper.ppu_write(0x0000, 0x80);
        assert_eq!(mapper.ppu_read(0x0000), 0x80);
        assert_eq!(mapper.ppu_tile(0x0000).pixels[0][0], 1);
    }
}
