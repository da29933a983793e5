//! Mapper 4 (MMC3) implementation.
//!
//! The workhorse of the late NES library (Super Mario Bros. 3, Kirby's
//! Adventure, ...). It provides:
//! - 8 KiB PRG banking with two switchable and two fixed windows.
//! - 2 KiB + 1 KiB CHR banking with optional A12 inversion.
//! - A scanline IRQ counter clocked by rising edges on PPU address line A12.
//! - Mapper-controlled mirroring and PRG-RAM enable/write-protect bits.
//!
//! | Area | Address range | Behaviour                                       |
//! |------|---------------|-------------------------------------------------|
//! | CPU  | `$6000-$7FFF` | PRG-RAM with enable/write-protect               |
//! | CPU  | `$8000-$9FFF` | Switchable 8 KiB PRG + bank select/data regs    |
//! | CPU  | `$A000-$BFFF` | Switchable 8 KiB PRG + mirroring/RAM regs       |
//! | CPU  | `$C000-$DFFF` | Switchable/fixed 8 KiB PRG + IRQ latch/reload   |
//! | CPU  | `$E000-$FFFF` | Fixed last 8 KiB PRG + IRQ disable/enable       |
//! | PPU  | `$0000-$1FFF` | 2×2 KiB + 4×1 KiB CHR banks, A12-aware          |

use std::borrow::Cow;

use crate::{
    cartridge::{
        a12_watcher::{A12Edge, A12Watcher},
        chr::{ChrStorage, Tile},
        header::{Header, Mirroring},
        mapper::{ChrRom, Mapper, MapperState, PrgRom, allocate_prg_ram, wrap_bank},
    },
    memory::cpu as cpu_mem,
};

const PRG_BANK_SIZE_8K: usize = 8 * 1024;
const CHR_BANK_SIZE_1K: usize = 1024;

/// CPU-visible MMC3 register set: even/odd addresses within each 8 KiB PRG
/// window select a register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mmc3Register {
    /// `$8000/$8001` - bank select and bank data.
    BankSelect,
    BankData,
    /// `$A000/$A001` - mirroring control and PRG-RAM protect.
    Mirroring,
    PrgRamProtect,
    /// `$C000/$C001` - IRQ latch value and reload strobe.
    IrqLatch,
    IrqReload,
    /// `$E000/$E001` - IRQ disable/ack and IRQ enable.
    IrqDisable,
    IrqEnable,
}

impl Mmc3Register {
    fn from_addr(addr: u16) -> Option<Self> {
        use Mmc3Register::*;

        let odd = addr & 1 != 0;
        match addr {
            0x8000..=0x9FFF => Some(if odd { BankData } else { BankSelect }),
            0xA000..=0xBFFF => Some(if odd { PrgRamProtect } else { Mirroring }),
            0xC000..=0xDFFF => Some(if odd { IrqReload } else { IrqLatch }),
            0xE000..=0xFFFF => Some(if odd { IrqEnable } else { IrqDisable }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mapper4 {
    prg_rom: PrgRom,
    prg_ram: Box<[u8]>,
    chr: ChrStorage,

    prg_bank_count: usize,

    /// Header mirroring; four-screen boards ignore `$A000` writes.
    base_mirroring: Mirroring,
    mirroring: Mirroring,

    /// Bank select ($8000): bits 0-2 target register, bit 6 PRG swap mode,
    /// bit 7 CHR A12 inversion.
    bank_select: u8,
    /// R0-R5 control CHR, R6-R7 the two switchable PRG windows.
    bank_regs: [u8; 8],

    prg_ram_enable: bool,
    prg_ram_write_protect: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,

    a12: A12Watcher,
}

impl Mapper4 {
    pub fn new(header: &Header, prg_rom: PrgRom, chr_rom: ChrRom) -> Self {
        let chr = ChrStorage::from_header(header, chr_rom);
        let prg_bank_count = (prg_rom.len() / PRG_BANK_SIZE_8K).max(1);

        Self {
            prg_rom,
            prg_ram: allocate_prg_ram(header),
            chr,
            prg_bank_count,
            base_mirroring: header.mirroring,
            mirroring: header.mirroring,
            bank_select: 0,
            bank_regs: [0; 8],
            prg_ram_enable: true,
            prg_ram_write_protect: false,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            a12: A12Watcher::new(),
        }
    }

    #[inline]
    fn chr_invert(&self) -> bool {
        self.bank_select & 0x80 != 0
    }

    #[inline]
    fn prg_swap_at_c000(&self) -> bool {
        self.bank_select & 0x40 != 0
    }

    #[inline]
    fn prg_ram_present(&self) -> bool {
        !self.prg_ram.is_empty() && self.prg_ram_enable
    }

    fn read_prg_rom(&self, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }

        let last = self.prg_bank_count - 1;
        let second_last = self.prg_bank_count.saturating_sub(2);
        let r6 = wrap_bank(self.bank_regs[6] as usize, self.prg_bank_count);
        let r7 = wrap_bank(self.bank_regs[7] as usize, self.prg_bank_count);

        // Bit 6 of the bank select swaps which window is fixed:
        //   mode 0: $8000=R6 $A000=R7 $C000=fixed(-2) $E000=fixed(-1)
        //   mode 1: $8000=fixed(-2) $A000=R7 $C000=R6 $E000=fixed(-1)
        let bank = match (addr, self.prg_swap_at_c000()) {
            (0x8000..=0x9FFF, false) => r6,
            (0x8000..=0x9FFF, true) => second_last,
            (0xA000..=0xBFFF, _) => r7,
            (0xC000..=0xDFFF, false) => second_last,
            (0xC000..=0xDFFF, true) => r6,
            _ => last,
        };

        let offset = (addr as usize - cpu_mem::PRG_ROM_START as usize) % PRG_BANK_SIZE_8K;
        self.prg_rom[(bank * PRG_BANK_SIZE_8K + offset) % self.prg_rom.len()]
    }

    /// Resolves a pattern address to `(bank base, offset)` under the current
    /// CHR layout. R0/R1 are 2 KiB banks (low bit forced to zero), R2-R5 are
    /// 1 KiB banks; bit 7 of the bank select swaps the two halves.
    fn chr_window(&self, addr: u16) -> (usize, usize) {
        let mut a = (addr & 0x1FFF) as usize;
        if self.chr_invert() {
            a ^= 0x1000;
        }

        let (bank, inner) = match a {
            0x0000..=0x07FF => ((self.bank_regs[0] & !1) as usize, a),
            0x0800..=0x0FFF => ((self.bank_regs[1] & !1) as usize, a - 0x0800),
            0x1000..=0x13FF => (self.bank_regs[2] as usize, a - 0x1000),
            0x1400..=0x17FF => (self.bank_regs[3] as usize, a - 0x1400),
            0x1800..=0x1BFF => (self.bank_regs[4] as usize, a - 0x1800),
            _ => (self.bank_regs[5] as usize, a - 0x1C00),
        };
        (bank * CHR_BANK_SIZE_1K, inner)
    }

    /// Clocks the IRQ counter on a debounced A12 rising edge: reload when the
    /// counter is zero or a reload is pending, decrement otherwise, and raise
    /// the IRQ line on the transition to zero while enabled.
    fn clock_irq_counter(&mut self) {
        if self.irq_reload || self.irq_counter == 0 {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

impl Mapper for Mapper4 {
    fn power_on(&mut self) {
        self.bank_select = 0;
        self.bank_regs = [0; 8];
        // R7 defaults to the second-to-last bank position so the fixed
        // vectors are sane before the game programs anything.
        self.bank_regs[6] = 0;
        self.bank_regs[7] = 1;
        self.prg_ram_enable = true;
        self.prg_ram_write_protect = false;
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
        self.a12.reset();
        self.mirroring = self.base_mirroring;
    }

    fn cpu_read(&self, addr: u16) -> Option<u8> {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                if !self.prg_ram_present() {
                    return None;
                }
                let idx = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
                Some(self.prg_ram[idx])
            }
            cpu_mem::PRG_ROM_START..=cpu_mem::CPU_ADDR_END => Some(self.read_prg_rom(addr)),
            _ => None,
        }
    }

    fn cpu_write(&mut self, addr: u16, data: u8, _cpu_cycle: u64) {
        if let cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END = addr {
            if self.prg_ram_present() && !self.prg_ram_write_protect {
                let idx = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
                self.prg_ram[idx] = data;
            }
            return;
        }

        let Some(reg) = Mmc3Register::from_addr(addr) else {
            return;
        };

        use Mmc3Register::*;
        match reg {
            BankSelect => self.bank_select = data,
            BankData => {
                let index = (self.bank_select & 0x07) as usize;
                self.bank_regs[index] = data;
            }
            Mirroring => {
                if self.base_mirroring != crate::cartridge::header::Mirroring::FourScreen {
                    self.mirroring = if data & 1 == 0 {
                        crate::cartridge::header::Mirroring::Vertical
                    } else {
                        crate::cartridge::header::Mirroring::Horizontal
                    };
                }
            }
            PrgRamProtect => {
                self.prg_ram_enable = data & 0x80 != 0;
                self.prg_ram_write_protect = data & 0x40 != 0;
            }
            IrqLatch => self.irq_latch = data,
            IrqReload => self.irq_reload = true,
            IrqDisable => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            IrqEnable => self.irq_enabled = true,
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

    fn has_scanline_irq(&self) -> bool {
        true
    }

    fn notify_a12(&mut self, a12_high: bool) {
        if self.a12.observe(a12_high) == A12Edge::Rise {
            self.clock_irq_counter();
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    fn chr_rom(&self) -> Option<&[u8]> {
        self.chr.as_rom()
    }

    fn prg_ram(&self) -> Option<&[u8]> {
        (!self.prg_ram.is_empty()).then_some(self.prg_ram.as_ref())
    }

    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        (!self.prg_ram.is_empty()).then_some(self.prg_ram.as_mut())
    }

    fn chr_ram(&self) -> Option<&[u8]> {
        self.chr.as_ram()
    }

    fn save_state(&self) -> MapperState {
        let mut regs = vec![self.bank_select];
        regs.extend_from_slice(&self.bank_regs);
        regs.extend_from_slice(&[
            (self.mirroring == Mirroring::Horizontal) as u8,
            (self.prg_ram_enable as u8) | ((self.prg_ram_write_protect as u8) << 1),
            self.irq_latch,
            self.irq_counter,
            (self.irq_reload as u8) | ((self.irq_enabled as u8) << 1) | ((self.irq_pending as u8) << 2),
            self.a12.state(),
        ]);
        MapperState {
            regs,
            prg_ram: self.prg_ram.to_vec(),
            chr_ram: self.chr.as_ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn load_state(&mut self, state: &MapperState) {
        if state.regs.len() >= 15 {
            self.bank_select = state.regs[0];
            self.bank_regs.copy_from_slice(&state.regs[1..9]);
            if self.base_mirroring != Mirroring::FourScreen {
                self.mirroring = if state.regs[9] != 0 {
                    Mirroring::Horizontal
                } else {
                    Mirroring::Vertical
                };
            }
            self.prg_ram_enable = state.regs[10] & 1 != 0;
            self.prg_ram_write_protect = state.regs[10] & 2 != 0;
            self.irq_latch = state.regs[11];
            self.irq_counter = state.regs[12];
            self.irq_reload = state.regs[13] & 1 != 0;
            self.irq_enabled = state.regs[13] & 2 != 0;
            self.irq_pending = state.regs[13] & 4 != 0;
            self.a12.restore(state.regs[14]);
        }
        let len = state.prg_ram.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&state.prg_ram[..len]);
        self.chr.load_ram(&state.chr_ram);
    }

    fn mapper_id(&self) -> u16 {
        4
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::NES_HEADER_LEN;

    fn mmc3() -> Mapper4 {
        let bytes: [u8; NES_HEADER_LEN] = [
            b'N', b'E', b'S', 0x1A, 2, 2, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let header = Header::parse(&bytes).expect("header");
        let mut prg = vec![0u8; 2 * 16 * 1024];
        for bank in 0..4 {
            prg[bank * PRG_BANK_SIZE_8K] = bank as u8;
        }
        let mut chr = vec![0u8; 2 * 8 * 1024];
        for bank in 0..16 {
            chr[bank * CHR_BANK_SIZE_1K] = bank as u8;
        }
        let mut mapper = Mapper4::new(&header, prg.into_boxed_slice(), chr.into_boxed_slice());
        mapper.power_on();
        mapper
    }

    /// Presents one scanline's worth of A12 traffic: low BG fetches followed
    /// by high sprite fetches.
    fn run_scanline(mapper: &mut Mapper4) {
        for _ in 0..34 {
            mapper.notify_a12(false);
        }
        for _ in 0..8 {
            mapper.notify_a12(true);
        }
    }

    #[test]
    fn prg_mode_swaps_fixed_window() {
        let mut mapper = mmc3();
        mapper.cpu_write(0x8000, 6, 0); // select R6
        mapper.cpu_write(0x8001, 2, 0);

        // Mode 0: R6 at $8000, second-last fixed at $C000.
        assert_eq!(mapper.cpu_read(0x8000), Some(2));
        assert_eq!(mapper.cpu_read(0xC000), Some(2 % 4));
        assert_eq!(mapper.cpu_read(0xE000), Some(3));

        // Mode 1: swap.
        mapper.cpu_write(0x8000, 0x46, 0);
        assert_eq!(mapper.cpu_read(0x8000), Some(2));
        assert_eq!(mapper.cpu_read(0xC000), Some(2));
    }

    #[test]
    fn chr_inversion_swaps_halves() {
        let mut mapper = mmc3();
        mapper.cpu_write(0x8000, 2, 0); // R2: 1 KiB at $1000
        mapper.cpu_write(0x8001, 5, 0);
        assert_eq!(mapper.ppu_read(0x1000), 5);

        // With inversion, R2 moves to $0000.
        mapper.cpu_write(0x8000, 0x82, 0);
        assert_eq!(mapper.ppu_read(0x0000), 5);
    }

    #[test]
    fn irq_counts_scanlines_and_fires_at_zero() {
        let mut mapper = mmc3();
        mapper.cpu_write(0xC000, 3, 0); // latch
        mapper.cpu_write(0xC001, 0, 0); // reload on next clock
        mapper.cpu_write(0xE001, 0, 0); // enable

        run_scanline(&mut mapper); // reload -> 3
        run_scanline(&mut mapper); // 2
        run_scanline(&mut mapper); // 1
        assert!(!mapper.irq_pending());
        run_scanline(&mut mapper); // 0 -> IRQ
        assert!(mapper.irq_pending());

        mapper.cpu_write(0xE000, 0, 0); // disable + ack
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn disabled_irq_counts_but_stays_silent() {
        let mut mapper = mmc3();
        mapper.cpu_write(0xC000, 1, 0);
        mapper.cpu_write(0xC001, 0, 0);
        for _ in 0..8 {
            run_scanline(&mut mapper);
        }
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn mirroring_register() {
        let mut mapper = mmc3();
        mapper.cpu_write(0xA000, 0, 0);
        assert_eq!(mapper.mirroring(), Mirroring::Vertical);
        mapper.cpu_write(0xA000, 1, 0);
        assert_eq!(mapper.mirroring(), Mirroring::Horizontal);
    }
}
