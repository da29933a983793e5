//! Mapper 9 (MMC2) implementation.
//!
//! Punch-Out!!'s board. The distinctive feature is a pair of CHR "latches":
//! when the PPU fetches pattern data for tiles `$FD` or `$FE`, the MMC2
//! remembers which of the two it saw (per 4 KiB half) and uses that to pick
//! one of two CHR banks for that half. Games exploit this to swap character
//! art mid-frame without any CPU involvement.
//!
//! | Area | Address range | Behaviour                                        |
//! |------|---------------|--------------------------------------------------|
//! | CPU  | `$6000-$7FFF` | PRG-RAM                                          |
//! | CPU  | `$8000-$9FFF` | Switchable 8 KiB PRG bank (`$A000` register)     |
//! | CPU  | `$A000-$FFFF` | Fixed last three 8 KiB PRG banks                 |
//! | CPU  | `$B000-$EFFF` | CHR FD/FE bank registers                         |
//! | CPU  | `$F000-$FFFF` | Mirroring control                                |
//! | PPU  | `$0000-$1FFF` | Two 4 KiB CHR windows with FD/FE latch switching |

use std::borrow::Cow;

use crate::{
    cartridge::{
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, allocate_prg_ram, wrap_bank},
    },
    memory::cpu as cpu_mem,
};

const PRG_BANK_SIZE_8K: usize = 8 * 1024;
const CHR_BANK_SIZE_4K: usize = 4 * 1024;

/// Pattern-fetch rows that flip a latch: tile `$FD` and `$FE` rows in either
/// pattern table, compared on `addr & 0x0FF0` within the half.
const LATCH_FD_ROW: u16 = 0x0FD0;
const LATCH_FE_ROW: u16 = 0x0FE0;

/// One CHR latch: remembers whether tile `$FD` or `$FE` was fetched last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChrLatch {
    Fd,
    Fe,
}

/// Per-half CHR bank pair selected by the latch state.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct LatchBanks {
    pub fd: u8,
    pub fe: u8,
}

impl LatchBanks {
    pub(super) fn select(&self, latch: ChrLatch) -> u8 {
        match latch {
            ChrLatch::Fd => self.fd,
            ChrLatch::Fe => self.fe,
        }
    }
}

/// Applies a pattern-fetch address to the two latches.
pub(super) fn update_latches(addr: u16, latch0: &mut ChrLatch, latch1: &mut ChrLatch) {
    let a = addr & 0x1FFF;
    let latch = if a < 0x1000 { latch0 } else { latch1 };
    match a & 0x0FF0 {
        LATCH_FD_ROW => *latch = ChrLatch::Fd,
        LATCH_FE_ROW => *latch = ChrLatch::Fe,
        _ => {}
    }
}

#[derive(Debug, Clone)]
pub struct Mapper9 {
    prg_rom: PrgRom,
    prg_ram: Box<[u8]>,
    chr: ChrStorage,

    prg_bank_count: usize,
    chr_bank_count: usize,

    base_mirroring: Mirroring,
    mirroring: Mirroring,

    /// 8 KiB PRG bank for `$8000-$9FFF` (`$A000` writes, low 4 bits).
    prg_bank: u8,
    /// CHR banks for the left half (`$B000`/`$C000` registers).
    chr_lo: LatchBanks,
    /// CHR banks for the right half (`$D000`/`$E000` registers).
    chr_hi: LatchBanks,

    latch0: ChrLatch,
    latch1: ChrLatch,
}

impl Mapper9 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let chr = ChrStorage::from_header(header, chr_rom);
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_8K).max(1);
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
        // $8000: switchable; $A000-$FFFF: last three banks fixed.
        let bank = match addr {
            0x8000..=0x9FFF => wrap_bank(self.prg_bank as usize, self.prg_bank_count),
            0xA000..=0xBFFF => self.prg_bank_count.saturating_sub(3),
            0xC000..=0xDFFF => self.prg_bank_count.saturating_sub(2),
            _ => self.prg_bank_count - 1,
        };
        let offset = (addr as usize - cpu_mem::PRG_ROM_START as usize) % PRG_BANK_SIZE_8K;
        self.prg_rom[(bank * PRG_BANK_SIZE_8K + offset) % self.prg_rom.len()]
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

impl Mapper for Mapper9 {
    fn power_on(&mut self) {
        self.prg_bank = 0;
        self.chr_lo = LatchBanks::default();
        self.chr_hi = LatchBanks::default();
        // Latch 0 boots in the $FD state and latch 1 in $FE, matching what
        // commercial games expect before the first switching tile is drawn.
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

    /// The latch flips *after* the fetch, so the switching tile itself is
    /// drawn from the old bank; the PPU calls this once the data is read.
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
        9
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    fn mmc2() -> Mapper9 {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 8, 4, 0x90, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 8 * 16 * 1024];
        for bank in 0..16 {
            prg[bank * PRG_BANK_SIZE_8K] = bank as u8;
        }
        let mut chr = vec![0u8; 4 * 8 * 1024];
        for bank in 0..8 {
            chr[bank * CHR_BANK_SIZE_4K] = 0x10 + bank as u8;
        }
        let mut mapper = Mapper9::new(&header, prg.into_boxed_slice(), chr.into_boxed_slice());
        mapper.power_on();
        mapper
    }

    #[test]
    fn fixes_last_three_prg_banks() {
        let mut mapper = mmc2();
        mapper.cpu_write(0xA000, 5, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(5));
        assert_eq!(mapper.cpu_read(0xA000), Some(13));
        assert_eq!(mapper.cpu_read(0xC000), Some(14));
        assert_eq!(mapper.cpu_read(0xE000), Some(15));
    }

    #[test]
    fn fd_fetch_switches_left_half_bank() {
        let mut mapper = mmc2();
        mapper.cpu_write(0xB000, 2, 0); // left half, $FD state
        mapper.cpu_write(0xC000, 3, 0); // left half, $FE state

        // Boot state is $FD.
        assert_eq!(mapper.ppu_read(0x0000), 0x12);

        // Fetch a row of tile $FE in the left table: latch flips to $FE.
        mapper.latch_access(0x0FE4);
        assert_eq!(mapper.ppu_read(0x0000), 0x13);

        // Tile $FD flips it back.
        mapper.latch_access(0x0FD8);
        assert_eq!(mapper.ppu_read(0x0000), 0x12);
    }

    #[test]
    fn right_half_latch_is_independent() {
        let mut mapper = mmc2();
        mapper.cpu_write(0xD000, 1, 0);
        mapper.cpu_write(0xE000, 2, 0);

        // Boot state is $FE for latch 1.
        assert_eq!(mapper.ppu_read(0x1000), 0x12);
        mapper.latch_access(0x1FD0);
        assert_eq!(mapper.ppu_read(0x1000), 0x11);

        // The left-half latch did not move.
        assert_eq!(mapper.ppu_read(0x0000), 0x10);
    }

    #[test]
    fn non_magic_fetches_leave_latches_alone() {
        let mut mapper = mmc2();
        mapper.cpu_write(0xB000, 1, 0);
        mapper.latch_access(0x0AB0);
        mapper.latch_access(0x1234);
        assert_eq!(mapper.ppu_read(0x0000), 0x11);
    }
}
