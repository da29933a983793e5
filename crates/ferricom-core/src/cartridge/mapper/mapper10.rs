//! Mapper 10 (MMC4) implementation.
//!
//! Fire Emblem's board: the same FD/FE CHR latch scheme as MMC2, but with
//! 16 KiB PRG banking (switchable at `$8000`, last bank fixed at `$C000`).
//!
//! | Area | Address range | Behaviour                                        |
//! |------|---------------|--------------------------------------------------|
//! | CPU  | `$6000-$7FFF` | PRG-RAM (battery-backed on most boards)          |
//! | CPU  | `$8000-$BFFF` | Switchable 16 KiB PRG bank (`$A000` register)    |
//! | CPU  | `$C000-$FFFF` | Fixed last 16 KiB PRG bank                       |
//! | CPU  | `$B000-$EFFF` | CHR FD/FE bank registers                         |
//! | CPU  | `$F000-$FFFF` | Mirroring control                                |
//! | PPU  | `$0000-$1FFF` | Two 4 KiB CHR windows with FD/FE latch switching |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{
            ChrRom, Mapper, MapperState, PrgRom, allocate_prg_ram,
            mapper9::{ChrLatch, LatchBanks, update_latches},
            wrap_bank,
        },
    },
    memory::cpu as cpu_mem,
};

const PRG_BANK_SIZE_16K: usize = 16 * 1024;
const CHR_BANK_SIZE_4K: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub struct Mapper10 {
    prg_rom: PrgRom,
    prg_ram: Box<[u8]>,
    chr: ChrStorage,

    prg_bank_count: usize,
    chr_bank_count: usize,

    base_mirroring: Mirroring,
    mirroring: Mirroring,

    prg_bank: u8,
    chr_lo: LatchBanks,
    chr_hi: LatchBanks,

    latch0: ChrLatch,
    latch1: ChrLatch,
}

impl Mapper10 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let chr = ChrStorage::from_header(header, chr_rom);
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_16K).max(1);
        let chr_bank_count = (chr.len() / CHR_BANK_SIZE_4K).max(1);

        Self {
            prg_rom,
            prg_ram: allocate_prg_ram(header),
            chr,
            prg_bank_count,
            chr_bank_count,
            base_mirroring: header.mirroring,
            mirroring: header.mirroring,
            prg_bank: 0,
            chr_lo: LatchBanks::default(),
            chr_hi: LatchBanks::default(),
            latch0: ChrLatch::Fd,
            latch1: ChrLatch::Fe,
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

    fn chr_window(&self, addr: u16) -> (usize, usize) {
        let a = (addr & 0x1FFF) as usize;
        let bank = if a < 0x1000 {
            self.chr_lo.select(self.latch0)
        } else {
            self.chr_hi.select(self.latch1)
        };
        (
            wrap_bank(bank as usize, self.chr_bank_count) * CHR_BANK_SIZE_4K,
            a & 0x0FFF,
        )
    }
}

impl Mapper for Mapper10 {
    fn power_on(&mut self) {
        self.prg_bank = 0;
        self.chr_lo = LatchBanks::default();
        self.chr_hi = LatchBanks::default();
        self.latch0 = ChrLatch::Fd;
        self.latch1 = ChrLatch::Fe;
        self.mirroring = self.base_mirroring;
    }

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
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                let idx = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
                self.prg_ram[idx] = data;
            }
            0xA000..=0xAFFF => self.prg_bank = data & 0x0F,
            0xB000..=0xBFFF => self.chr_lo.fd = data & 0x1F,
            0xC000..=0xCFFF => self.chr_lo.fe = data & 0x1F,
            0xD000..=0xDFFF => self.chr_hi.fd = data & 0x1F,
            0xE000..=0xEFFF => self.chr_hi.fe = data & 0x1F,
            0xF000..=0xFFFF => {
                if self.base_mirroring != Mirroring::FourScreen {
                    self.mirroring = if data & 1 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    };
                }
            }
            _ => {}
        }
    }

    fn ppu_read(&self, addr: u16) -> u8 {
        let (base, offset) = self.chr_window(addr);
        self.chr.read_indexed(base, offset)
    }

    fn ppu_write(&mut self, addr: u16, data: u8) {
        let (base, offset) = self.chr_window(addr);
        self.chr.write_indexed(base, offset, data);
    }

    fn ppu_tile(&self, addr: u16) -> &Tile {
        let (base, offset) = self.chr_window(addr);
        self.chr.tile(base, offset)
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn has_chr_latch(&self) -> bool {
        true
    }

    fn latch_access(&mut self, addr: u16) {
        update_latches(addr, &mut self.latch0, &mut self.latch1);
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
            regs: vec![
                self.prg_bank,
                self.chr_lo.fd,
                self.chr_lo.fe,
                self.chr_hi.fd,
                self.chr_hi.fe,
                (self.latch0 == ChrLatch::Fe) as u8,
                (self.latch1 == ChrLatch::Fe) as u8,
                (self.mirroring == Mirroring::Horizontal) as u8,
            ],
            prg_ram: self.prg_ram.to_vec(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if let [prg, lo_fd, lo_fe, hi_fd, hi_fe, l0, l1, mirror] = state.regs[..] {
            self.prg_bank = prg;
            self.chr_lo = LatchBanks { fd: lo_fd, fe: lo_fe };
            self.chr_hi = LatchBanks { fd: hi_fd, fe: hi_fe };
            self.latch0 = if l0 != 0 { ChrLatch::Fe } else { ChrLatch::Fd };
            self.latch1 = if l1 != 0 { ChrLatch::Fe } else { ChrLatch::Fd };
            if self.base_mirroring != Mirroring::FourScreen {
                self.mirroring = if mirror != 0 {
                    Mirroring::Horizontal
                } else {
                    Mirroring::Vertical
                };
            }
        }
        let len = state.prg_ram.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&state.prg_ram[..len]);
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        10
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    #[test]
    fn switches_16k_prg_and_fixes_last() {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 8, 4, 0x90, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 8 * PRG_BANK_SIZE_16K];
        for bank in 0..8 {
            prg[bank * PRG_BANK_SIZE_16K] = bank as u8;
        }
        let mut mapper = Mapper10::new(
            &header,
            prg.into_boxed_slice(),
            vec![0u8; 4 * 8 * 1024].into_boxed_slice(),
        );
        mapper.power_on();

        mapper.cpu_write(0xA000, 3, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(3));
        assert_eq!(mapper.cpu_read(0xC000), Some(7));
    }
}
