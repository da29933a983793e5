//! Mapper 0 (NROM) implementation.
//!
//! The launch-era board: no banking hardware at all. 16 KiB images are
//! mirrored into both halves of the CPU window; 32 KiB images map linearly.
//!
//! | Area | Address range | Behaviour                                |
//! |------|---------------|------------------------------------------|
//! | CPU  | `$6000-$7FFF` | Optional PRG-RAM (Family BASIC)          |
//! | CPU  | `$8000-$FFFF` | PRG-ROM, 16 KiB mirrored or 32 KiB flat  |
//! | PPU  | `$0000-$1FFF` | 8 KiB CHR-ROM or CHR-RAM, unbanked       |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, allocate_prg_ram},
    },
    memory::cpu as cpu_mem,
};

#[derive(Debug, Clone)]
pub struct Mapper0 {
    prg_rom: PrgRom,
    prg_ram: Box<[u8]>,
    chr: ChrStorage,
    mirroring: Mirroring,
}

impl Mapper0 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        Self {
            prg_rom,
            prg_ram: allocate_prg_ram(header),
            chr: ChrStorage::from_header(header, chr_rom),
            mirroring: header.mirroring,
        }
    }

    fn read_prg_rom(&self, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize % self.prg_rom.len();
        self.prg_rom[offset]
    }
}

impl Mapper for Mapper0 {
    fn power_on(&mut self) {}

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                let idx = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
                Some(self.prg_ram[idx])
            }
            cpu_mem::PRG_ROM_START..=cpu_mem::CPU_ADDR_END => Some(self.read_prg_rom(addr)),
            _ => None,
        }
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if let cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END = addr {
            let idx = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
            self.prg_ram[idx] = data;
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

    fn prg_ram(&self) -> Option<&[u8]> {
        Some(&self.prg_ram)
    }

    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.prg_ram)
    }

    fn chr_ram(&self) -> Option<&[u8]> {
        self.chr.as_ram()
    }

    fn save_state(&self) -> MapperState {
        MapperState {
            regs: Vec::new(),
            prg_ram: self.prg_ram.to_vec(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        let len = state.prg_ram.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&state.prg_ram[..len]);
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        0
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("NROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    fn nrom(prg_banks: u8) -> Mapper0 {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, prg_banks, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; prg_banks as usize * 16 * 1024];
        // Tag the start of each bank.
        for bank in 0..prg_banks as usize {
            prg[bank * 16 * 1024] = bank as u8 + 1;
        }
        Mapper0::new(
            &header,
            prg.into_boxed_slice(),
            vec![0u8; 8 * 1024].into_boxed_slice(),
        )
    }

    #[test]
    fn mirrors_16k_images_into_both_windows() {
        let mapper = nrom(1);
        assert_eq!(mapper.cpu_read(0x8000), Some(1));
        assert_eq!(mapper.cpu_read(0xC000), Some(1));
    }

    #[test]
    fn maps_32k_images_linearly() {
        let mapper = nrom(2);
        assert_eq!(mapper.cpu_read(0x8000), Some(1));
        assert_eq!(mapper.cpu_read(0xC000), Some(2));
    }

    #[test]
    fn prg_ram_round_trips() {
        let mut mapper = nrom(1);
        mapper.cpu_write(0x6000, 0x42, 0);
        assert_eq!(mapper.cpu_read(0x6000), Some(0x42));
    }
}
