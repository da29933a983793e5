//! ferricom-core: an NTSC NES hardware model.
//!
//! The [`Nes`] aggregate owns the 6502 CPU, PPU, APU, work RAM, controller
//! ports, and the inserted cartridge, and interleaves them at the console's
//! 1:3 CPU-to-PPU cycle ratio. Hosts drive it one frame at a time:
//!
//! ```no_run
//! use ferricom_core::{FrameStatus, Nes};
//!
//! let mut nes = Nes::builder().sample_rate(48_000).build();
//! nes.load_rom(&std::fs::read("game.nes").unwrap()).unwrap();
//! loop {
//!     match nes.frame() {
//!         FrameStatus::Complete => {
//!             let _pixels = nes.framebuffer(); // 256×240 packed RGB
//!             let _samples = nes.take_audio_samples(); // interleaved stereo
//!         }
//!         FrameStatus::Crashed { pc } => panic!("guest jammed at {pc:#06X}"),
//!     }
//! }
//! ```

use ringbuf::HeapCons;
use tracing::warn;

use crate::{
    apu::Apu,
    audio::AudioOutput,
    bus::SystemBus,
    cartridge::Cartridge,
    controller::{Button, Controller},
    cpu::{Cpu, CpuCrash},
    error::Error,
    ppu::{Ppu, PpuBus},
    reset_kind::ResetKind,
    state::{RestoreReport, SNAPSHOT_VERSION, Snapshot},
};

pub mod apu;
pub mod audio;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod ppu;
pub mod ram;
pub mod reset_kind;
pub mod state;

pub use crate::cartridge::header::Mirroring;
pub use crate::ppu::{FRAME_HEIGHT, FRAME_WIDTH};
use crate::ram::CpuRam;

/// Outcome of running one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The PPU completed the frame; the framebuffer and audio batch are
    /// ready.
    Complete,
    /// The CPU decoded an opcode with no implementation. Subsequent calls
    /// are no-ops until a reset.
    Crashed { pc: u16 },
}

/// Builder for configuring and constructing a powered-on console.
#[derive(Debug, Clone)]
pub struct NesBuilder {
    sample_rate: u32,
    power_on_reset: bool,
}

impl Default for NesBuilder {
    fn default() -> Self {
        Self {
            sample_rate: config::DEFAULT_SAMPLE_RATE,
            power_on_reset: true,
        }
    }
}

impl NesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host audio sample rate.
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Enables/disables the initial power-on reset. Tests that construct
    /// machine state by hand may disable it.
    pub fn power_on_reset(mut self, enabled: bool) -> Self {
        self.power_on_reset = enabled;
        self
    }

    pub fn build(self) -> Nes {
        let mut nes = Nes {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            ram: CpuRam::new(),
            cartridge: None,
            controllers: [Controller::new(), Controller::new()],
            audio: AudioOutput::new(self.sample_rate),
            prev_nmi: false,
            pending_dmc_stall: 0,
            crashed: None,
        };
        if self.power_on_reset {
            nes.reset(ResetKind::PowerOn);
        }
        nes
    }
}

#[derive(Debug)]
pub struct Nes {
    cpu: Cpu,
    ppu: Ppu,
    apu: Apu,
    ram: CpuRam,
    cartridge: Option<Cartridge>,
    controllers: [Controller; 2],
    audio: AudioOutput,
    /// Previous NMI line level, for edge detection.
    prev_nmi: bool,
    /// DMC fetch stalls applied at the next instruction boundary.
    pending_dmc_stall: u32,
    crashed: Option<CpuCrash>,
}

impl Nes {
    pub fn builder() -> NesBuilder {
        NesBuilder::new()
    }

    /// Constructs a powered-on console with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Parses an iNES image, inserts it, and power-cycles the console.
    pub fn load_rom(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let cartridge = Cartridge::new(bytes)?;
        self.cartridge = Some(cartridge);
        self.reset(ResetKind::PowerOn);
        Ok(())
    }

    /// Ejects the cartridge and power-cycles back to the idle state.
    pub fn eject_rom(&mut self) {
        self.cartridge = None;
        self.reset(ResetKind::PowerOn);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// Applies a power-on or front-panel reset. Power-on clears work RAM;
    /// a soft reset preserves it.
    pub fn reset(&mut self, kind: ResetKind) {
        if kind == ResetKind::PowerOn {
            self.ram.fill(0);
        }
        self.ppu.reset(kind);
        self.apu.reset(kind);
        if let Some(cart) = self.cartridge.as_mut() {
            cart.reset(kind);
        }
        self.audio.reset();
        self.prev_nmi = false;
        self.pending_dmc_stall = 0;
        self.crashed = None;

        let mut bus = SystemBus::new(
            &mut self.ram,
            &mut self.ppu,
            &mut self.apu,
            self.cartridge.as_mut(),
            &mut self.controllers,
            0,
        );
        self.cpu.reset(&mut bus, kind);
    }

    /// Executes one CPU instruction and advances the APU and PPU by the
    /// cycles it consumed (1:1 and 1:3 respectively). Returns `false` once
    /// the CPU has crashed.
    pub fn step(&mut self) -> bool {
        if self.crashed.is_some() {
            return false;
        }

        let cpu_cycle = self.cpu.cycle_count();
        let mut bus = SystemBus::new(
            &mut self.ram,
            &mut self.ppu,
            &mut self.apu,
            self.cartridge.as_mut(),
            &mut self.controllers,
            cpu_cycle,
        );

        let cycles = match self.cpu.step(&mut bus) {
            Ok(cycles) => cycles,
            Err(crash) => {
                warn!(pc = crash.pc, opcode = crash.opcode, "cpu jammed");
                self.crashed = Some(crash);
                return false;
            }
        };

        // DMC stalls from the previous instruction are charged now; the
        // machine components see the combined time slice.
        let cycles = cycles + std::mem::take(&mut self.pending_dmc_stall);

        self.apu
            .advance(cycles, self.cartridge.as_ref(), &mut self.audio);
        self.pending_dmc_stall = self.apu.take_stall_cycles();

        let mut ppu_bus = PpuBus::new(self.cartridge.as_mut());
        self.ppu
            .advance(cycles * config::PPU_DOTS_PER_CPU_CYCLE, &mut ppu_bus);

        // NMI is edge triggered; the IRQ line is level sampled each step.
        let nmi = self.ppu.nmi_output();
        if nmi && !self.prev_nmi {
            self.cpu.request_nmi();
        }
        self.prev_nmi = nmi;

        let mapper_irq = self
            .cartridge
            .as_ref()
            .is_some_and(|cart| cart.mapper().irq_pending());
        self.cpu.set_irq_line(self.apu.irq_pending() || mapper_irq);

        true
    }

    /// Runs until the PPU finishes the current frame.
    pub fn frame(&mut self) -> FrameStatus {
        if let Some(crash) = self.crashed {
            return FrameStatus::Crashed { pc: crash.pc };
        }

        let target = self.ppu.frame_count() + 1;
        while self.ppu.frame_count() < target {
            if !self.step() {
                break;
            }
        }
        match self.crashed {
            Some(crash) => FrameStatus::Crashed { pc: crash.pc },
            None => FrameStatus::Complete,
        }
    }

    /// The finished 256×240 frame, packed 24-bit RGB, row-major from the
    /// top-left.
    pub fn framebuffer(&self) -> &[u32] {
        self.ppu.framebuffer()
    }

    pub fn frame_count(&self) -> u64 {
        self.ppu.frame_count()
    }

    /// Total CPU cycles executed since power-on.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.cycle_count()
    }

    /// Interleaved stereo samples produced since the last call.
    pub fn take_audio_samples(&mut self) -> Vec<f32> {
        self.audio.drain()
    }

    /// Creates the SPSC audio ring (2048 stereo pairs) and returns the
    /// consumer half for the host audio thread.
    pub fn attach_audio_ring(&mut self) -> HeapCons<f32> {
        self.audio.attach_ring()
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.audio.set_sample_rate(sample_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    /// Updates a controller button. `port` is 0 or 1.
    pub fn set_button(&mut self, port: usize, button: Button, pressed: bool) {
        if let Some(pad) = self.controllers.get_mut(port) {
            pad.set_button(button, pressed);
        }
    }

    /// Reads a CPU-visible byte without side effects (RAM and cartridge
    /// space only; IO registers read as zero on this path).
    pub fn peek_cpu_byte(&mut self, addr: u16) -> u8 {
        let bus = SystemBus::new(
            &mut self.ram,
            &mut self.ppu,
            &mut self.apu,
            self.cartridge.as_mut(),
            &mut self.controllers,
            0,
        );
        bus.peek(addr)
    }

    /// Direct CPU register access for harnesses and debuggers.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    // =========================================================================
    // Save states
    // =========================================================================

    /// Captures the complete machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            rom_fingerprint: self.cartridge.as_ref().map_or(0, Cartridge::fingerprint),
            cpu: self.cpu.save_state(),
            ram: self.ram.as_slice().to_vec(),
            ppu: self.ppu.save_state(),
            apu: self.apu.save_state(),
            mapper: self
                .cartridge
                .as_ref()
                .map(Cartridge::save_state)
                .unwrap_or_default(),
        }
    }

    /// Restores a snapshot. A schema version mismatch fails; a fingerprint
    /// mismatch restores anyway and is flagged in the report.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport, Error> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::SaveStateVersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let fingerprint = self.cartridge.as_ref().map_or(0, Cartridge::fingerprint);
        let rom_mismatch = fingerprint != snapshot.rom_fingerprint;
        if rom_mismatch {
            warn!(
                expected = snapshot.rom_fingerprint,
                found = fingerprint,
                "restoring a snapshot taken against a different ROM"
            );
        }

        self.cpu.load_state(&snapshot.cpu);
        self.ram.copy_from(&snapshot.ram);
        self.ppu.load_state(&snapshot.ppu);
        self.apu.load_state(&snapshot.apu);
        if let Some(cart) = self.cartridge.as_mut() {
            cart.load_state(&snapshot.mapper);
        }
        self.prev_nmi = self.ppu.nmi_output();
        self.pending_dmc_stall = 0;
        self.crashed = None;

        Ok(RestoreReport { rom_mismatch })
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::test_rom;
    use ctor::ctor;
    use tracing_subscriber::FmtSubscriber;

    #[ctor]
    fn init_tracing() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    /// Builds an NROM image with an infinite loop at the reset target.
    fn looping_rom() -> Vec<u8> {
        let mut rom = test_rom::build(0, 1, 1, 0);
        let prg = 16;
        // JMP $8000 at $8000.
        rom[prg] = 0x4C;
        rom[prg + 1] = 0x00;
        rom[prg + 2] = 0x80;
        // Reset vector -> $8000 (PRG offset $3FFC).
        rom[prg + 0x3FFC] = 0x00;
        rom[prg + 0x3FFD] = 0x80;
        rom
    }

    fn console_with(rom: &[u8]) -> Nes {
        let mut nes = Nes::new();
        nes.load_rom(rom).expect("load rom");
        nes
    }

    #[test]
    fn reset_vector_drives_the_program_counter() {
        let nes = console_with(&looping_rom());
        assert_eq!(nes.cpu().pc, 0x8000);
        assert!(nes.cpu().status.bits() & 0b0000_0100 != 0);
    }

    #[test]
    fn frame_runs_to_completion_and_counts_cycles() {
        let mut nes = console_with(&looping_rom());
        // The first call only covers power-on to the first VBlank.
        assert_eq!(nes.frame(), FrameStatus::Complete);
        assert_eq!(nes.frame_count(), 1);

        // A steady-state NTSC frame is just under 29,830 CPU cycles.
        let start_cycles = nes.cpu_cycles();
        assert_eq!(nes.frame(), FrameStatus::Complete);
        let spent = nes.cpu_cycles() - start_cycles;
        assert!((29_000..30_500).contains(&spent), "spent {spent}");
    }

    #[test]
    fn frames_emit_roughly_a_sixtieth_of_audio() {
        let mut nes = console_with(&looping_rom());
        nes.frame();
        nes.take_audio_samples();

        nes.frame();
        let samples = nes.take_audio_samples();
        let pairs = samples.len() / 2;
        assert!((700..800).contains(&pairs), "got {pairs} pairs");
    }

    #[test]
    fn jam_crashes_the_frame_and_stays_down() {
        let mut rom = test_rom::build(0, 1, 1, 0);
        let prg = 16;
        rom[prg] = 0x02; // jam
        rom[prg + 0x3FFC] = 0x00;
        rom[prg + 0x3FFD] = 0x80;

        let mut nes = console_with(&rom);
        assert_eq!(nes.frame(), FrameStatus::Crashed { pc: 0x8000 });
        // Still down on the next call.
        assert_eq!(nes.frame(), FrameStatus::Crashed { pc: 0x8000 });

        // Reset revives the machine.
        nes.reset(ResetKind::Soft);
        assert_eq!(nes.frame(), FrameStatus::Crashed { pc: 0x8000 });
    }

    #[test]
    fn reset_is_idempotent() {
        let mut nes = console_with(&looping_rom());
        nes.frame();
        nes.reset(ResetKind::PowerOn);
        let once = nes.snapshot();
        nes.reset(ResetKind::PowerOn);
        let twice = nes.snapshot();
        assert_eq!(once, twice);
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut nes = console_with(&looping_rom());
        for _ in 0..3 {
            nes.frame();
        }
        let snapshot = nes.snapshot();

        // Run ahead, then rewind.
        for _ in 0..2 {
            nes.frame();
        }
        let report = nes.restore(&snapshot).expect("restore");
        assert!(!report.rom_mismatch);
        assert_eq!(nes.snapshot(), snapshot);
    }

    #[test]
    fn restore_rejects_other_schema_versions() {
        let mut nes = console_with(&looping_rom());
        let mut snapshot = nes.snapshot();
        snapshot.version = 999;
        assert!(matches!(
            nes.restore(&snapshot),
            Err(Error::SaveStateVersionMismatch {
                found: 999,
                expected: SNAPSHOT_VERSION,
            })
        ));
    }

    #[test]
    fn restore_flags_fingerprint_mismatches() {
        let mut nes = console_with(&looping_rom());
        let mut snapshot = nes.snapshot();
        snapshot.rom_fingerprint ^= 0xDEAD_BEEF;
        let report = nes.restore(&snapshot).expect("restore succeeds");
        assert!(report.rom_mismatch);
    }

    /// Builds a looping NROM image whose CHR tile 1 is solid color index 3.
    fn render_rom() -> Vec<u8> {
        let mut rom = looping_rom();
        let chr = 16 + 16 * 1024;
        for row in 0..16 {
            rom[chr + 16 + row] = 0xFF; // tile 1, both bitplanes solid
        }
        rom
    }

    /// Pokes PPU registers the way the CPU would.
    fn ppu_write(nes: &mut Nes, addr: u16, data: u8) {
        let mut bus = PpuBus::new(nes.cartridge.as_mut());
        nes.ppu.cpu_write(addr, data, &mut bus);
    }

    fn set_vram_addr(nes: &mut Nes, addr: u16) {
        ppu_write(nes, 0x2006, (addr >> 8) as u8);
        ppu_write(nes, 0x2006, addr as u8);
    }

    #[test]
    fn background_tiles_render_to_the_framebuffer() {
        let mut nes = console_with(&render_rom());

        // Palette: backdrop black, BG palette 0 color 3 = white.
        set_vram_addr(&mut nes, 0x3F00);
        ppu_write(&mut nes, 0x2007, 0x0F);
        set_vram_addr(&mut nes, 0x3F03);
        ppu_write(&mut nes, 0x2007, 0x30);

        // Fill the first nametable with tile 1.
        set_vram_addr(&mut nes, 0x2000);
        for _ in 0..960 {
            ppu_write(&mut nes, 0x2007, 0x01);
        }

        // Reset the scroll (the $2006 writes above moved `t`) and enable
        // background rendering including the left column.
        ppu_write(&mut nes, 0x2000, 0x00);
        ppu_write(&mut nes, 0x2005, 0x00);
        ppu_write(&mut nes, 0x2005, 0x00);
        ppu_write(&mut nes, 0x2001, 0x0A);

        nes.frame();
        nes.frame();

        let white = 0xFFFEFF;
        assert_eq!(nes.framebuffer()[120 * FRAME_WIDTH + 128], white);
        assert_eq!(nes.framebuffer()[0], white);
    }

    #[test]
    fn sprite_zero_hit_sets_on_overlap() {
        let mut nes = console_with(&render_rom());

        // Opaque background everywhere.
        set_vram_addr(&mut nes, 0x3F03);
        ppu_write(&mut nes, 0x2007, 0x30);
        set_vram_addr(&mut nes, 0x2000);
        for _ in 0..960 {
            ppu_write(&mut nes, 0x2007, 0x01);
        }

        // Sprite 0: tile 1 at (100, 50), front priority, palette 0.
        ppu_write(&mut nes, 0x2003, 0x00);
        for byte in [50u8, 1, 0, 100] {
            ppu_write(&mut nes, 0x2004, byte);
        }
        // Sprite palette 0 color 3 = red.
        set_vram_addr(&mut nes, 0x3F13);
        ppu_write(&mut nes, 0x2007, 0x16);

        // Reset the scroll and enable both layers.
        ppu_write(&mut nes, 0x2000, 0x00);
        ppu_write(&mut nes, 0x2005, 0x00);
        ppu_write(&mut nes, 0x2005, 0x00);
        ppu_write(&mut nes, 0x2001, 0x1E);

        nes.frame();
        nes.frame();

        // The sprite covers scanlines 51..=58 starting at x=100.
        let red = 0xB53120;
        assert_eq!(nes.framebuffer()[52 * FRAME_WIDTH + 100], red);

        // Sprite-zero hit latched until the pre-render line.
        let mut bus = PpuBus::new(nes.cartridge.as_mut());
        let status = nes.ppu.cpu_read(0x2002, &mut bus);
        assert_eq!(status & 0x40, 0x40);
    }

    #[test]
    fn mmc3_scanline_counter_fires_mid_frame() {
        // MMC3 image: 32 KiB PRG, 8 KiB CHR, looping program.
        let mut rom = test_rom::build(4, 2, 1, 0);
        let prg = 16;
        rom[prg] = 0x4C;
        rom[prg + 1] = 0x00;
        rom[prg + 2] = 0x80;
        rom[prg + 0x7FFC] = 0x00;
        rom[prg + 0x7FFD] = 0x80;

        let mut nes = console_with(&rom);

        // Background at $0000, sprites at $1000 so A12 rises once per line.
        ppu_write(&mut nes, 0x2000, 0x08);
        ppu_write(&mut nes, 0x2001, 0x18);

        // Program the IRQ counter through the cartridge.
        let cart = nes.cartridge.as_mut().expect("cartridge");
        cart.cpu_write(0xC000, 20, 0); // latch
        cart.cpu_write(0xC001, 0, 0); // reload
        cart.cpu_write(0xE001, 0, 0); // enable

        nes.frame();
        let cart = nes.cartridge.as_ref().expect("cartridge");
        assert!(cart.mapper().irq_pending());
    }

    #[test]
    fn buttons_reach_the_controller_ports() {
        let mut nes = console_with(&looping_rom());
        nes.set_button(0, Button::Start, true);
        // Strobe then read through the bus.
        let mut bus = SystemBus::new(
            &mut nes.ram,
            &mut nes.ppu,
            &mut nes.apu,
            nes.cartridge.as_mut(),
            &mut nes.controllers,
            0,
        );
        use crate::cpu::CpuBus;
        bus.write(0x4016, 1);
        bus.write(0x4016, 0);
        let mut bits = Vec::new();
        for _ in 0..4 {
            bits.push(bus.read(0x4016) & 1);
        }
        assert_eq!(bits, [0, 0, 0, 1]); // A, B, Select, Start
    }
}
