//! Mapper 66 (GxROM) implementation.
//!
//! One register: bits 4-5 select a 32 KiB PRG bank, bits 0-1 an 8 KiB CHR
//! bank. Super Mario Bros. + Duck Hunt is the best known user.
//!
//! | Area | Address range | Behaviour                                    |
//! |------|---------------|----------------------------------------------|
//! | CPU  | `$8000-$FFFF` | Switchable 32 KiB PRG; writes latch register |
//! | PPU  | `$0000-$1FFF` | Switchable 8 KiB CHR bank                    |

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
const CHR_BANK_SIZE_8K: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct Mapper66 {
    prg_rom: PrgRom,
    chr: ChrStorage,
    prg_bank_count: usize,
    chr_bank_count: usize,
    mirroring: Mirroring,
    register: u8,
}

impl Mapper66 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let chr = ChrStorage::from_header(header, chr_rom);
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_32K).max(1);
        let chr_bank_count = (chr.len() / CHR_BANK_SIZE_8K).max(1);
        Self {
            prg_rom,
            chr,
            prg_bank_count,
            chr_bank_count,
            mirroring: header.mirroring,
            register: 0,
        }
    }

    #[inline]
    fn chr_base(&self) -> usize {
        wrap_bank((self.register & 0x03) as usize, self.chr_bank_count) * CHR_BANK_SIZE_8K
    }
}

impl Mapper for Mapper66 {
    fn power_on(&mut self) {
        self.register = 0;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        if addr < cpu_mem::PRG_ROM_START || self.prg_rom.is_empty() {
            return None;
        }
        let bank = wrap_bank(((self.register >> 4) & 0x03) as usize, self.prg_bank_count);
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize;
        Some(self.prg_rom[(bank * PRG_BANK_SIZE_32K + offset) % self.prg_rom.len()])
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if addr >= cpu_mem::PRG_ROM_START {
            self.register = data;
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
        66
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("GxROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    #[test]
    fn register_nibbles_select_banks() {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 4, 2, 0, 0x40, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 2 * PRG_BANK_SIZE_32K];
        prg[PRG_BANK_SIZE_32K] = 0xAB;
        let mut chr = vec![0u8; 2 * CHR_BANK_SIZE_8K];
        chr[CHR_BANK_SIZE_8K] = 0xCD;
        let mut mapper = Mapper66::new(&header, prg.into_boxed_slice(), chr.into_boxed_slice());

        mapper.cpu_write(0x8000, 0x11, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(0xAB));
        assert_eq!(mapper.ppu_read(0x0000), 0xCD);
    }
}
