//! Delta Modulation Channel state machine.
//!
//! Sample bytes are fetched straight from the cartridge PRG space
//! (`$C000-$FFFF` window addressing with the `$FFFF -> $8000` wrap). Each
//! fetch reports four stolen CPU cycles, the coarse DMA model this core uses.

use crate::cartridge::Cartridge;

use super::tables::{
    DMC_RATE_TABLE, DMC_SAMPLE_ADDR_STRIDE, DMC_SAMPLE_BASE, DMC_SAMPLE_LEN_STRIDE,
};

#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Dmc {
    irq_enable: bool,
    loop_flag: bool,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift_register: u8,
    bits_remaining: u8,
    silence: bool,
    timer: u16,
    timer_period: u16,
}

impl Default for Dmc {
    fn default() -> Self {
        Self {
            irq_enable: false,
            loop_flag: false,
            output_level: 0,
            sample_address: DMC_SAMPLE_BASE,
            sample_length: 1,
            current_address: 0,
            bytes_remaining: 0,
            sample_buffer: None,
            shift_register: 0,
            // The bit counter powers up at 8 so the first sample plays for a
            // full byte period.
            bits_remaining: 8,
            silence: true,
            timer: DMC_RATE_TABLE[0] - 1,
            timer_period: DMC_RATE_TABLE[0] - 1,
        }
    }
}

impl Dmc {
    pub(super) fn write_control(&mut self, value: u8, dmc_irq: &mut bool) {
        self.irq_enable = value & 0b1000_0000 != 0;
        if !self.irq_enable {
            *dmc_irq = false;
        }
        self.loop_flag = value & 0b0100_0000 != 0;
        // Each bit output occurs every `DMC_RATE_TABLE[rate]` CPU cycles.
        self.timer_period = DMC_RATE_TABLE[(value & 0b1111) as usize] - 1;
    }

    pub(super) fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0b0111_1111;
    }

    pub(super) fn write_sample_address(&mut self, value: u8) {
        self.sample_address = DMC_SAMPLE_BASE.wrapping_add(u16::from(value) * DMC_SAMPLE_ADDR_STRIDE);
    }

    pub(super) fn write_sample_length(&mut self, value: u8) {
        self.sample_length = u16::from(value) * DMC_SAMPLE_LEN_STRIDE + 1;
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart_sample();
        }
    }

    pub(super) fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    fn next_address(addr: u16) -> u16 {
        if addr == 0xFFFF { 0x8000 } else { addr + 1 }
    }

    /// Advances one CPU cycle: times bit output and refills the sample
    /// buffer through the cartridge, accumulating stolen cycles in `stall`.
    pub(super) fn step(
        &mut self,
        cartridge: Option<&Cartridge>,
        dmc_irq: &mut bool,
        stall: &mut u32,
    ) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.shift_output();
        } else {
            self.timer -= 1;
        }

        self.fetch_sample(cartridge, dmc_irq, stall);
    }

    fn shift_output(&mut self) {
        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
            self.shift_register >>= 1;
        }

        self.bits_remaining = self.bits_remaining.saturating_sub(1);
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(sample) => {
                    self.shift_register = sample;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    fn fetch_sample(
        &mut self,
        cartridge: Option<&Cartridge>,
        dmc_irq: &mut bool,
        stall: &mut u32,
    ) {
        if self.sample_buffer.is_some() || self.bytes_remaining == 0 {
            return;
        }

        let byte = cartridge
            .map(|cart| cart.cpu_read(self.current_address).unwrap_or(0))
            .unwrap_or(0);
        // The RDY line stalls the CPU for roughly four cycles per fetch.
        *stall += 4;

        self.sample_buffer = Some(byte);
        self.current_address = Self::next_address(self.current_address);
        self.bytes_remaining -= 1;

        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enable {
                *dmc_irq = true;
            }
        }
    }

    pub(super) fn output(&self) -> u8 {
        self.output_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_load_sets_seven_bit_level() {
        let mut dmc = Dmc::default();
        dmc.write_direct_load(0xFF);
        assert_eq!(dmc.output(), 0x7F);
    }

    #[test]
    fn register_strides_match_hardware() {
        let mut dmc = Dmc::default();
        dmc.write_sample_address(2);
        dmc.write_sample_length(3);
        assert_eq!(dmc.sample_address, 0xC080);
        assert_eq!(dmc.sample_length, 49);
    }

    #[test]
    fn exhaustion_without_loop_raises_irq() {
        let mut dmc = Dmc::default();
        let mut irq = false;
        dmc.write_control(0x80, &mut irq); // IRQ enable, rate 0
        dmc.write_sample_length(0); // one byte
        dmc.set_enabled(true);

        let mut stall = 0;
        dmc.step(None, &mut irq, &mut stall);
        assert_eq!(stall, 4);
        assert!(irq);
        assert!(!dmc.active());
    }

    #[test]
    fn loop_restarts_instead_of_irq() {
        let mut dmc = Dmc::default();
        let mut irq = false;
        dmc.write_control(0xC0, &mut irq);
        dmc.write_sample_length(0);
        dmc.set_enabled(true);

        let mut stall = 0;
        dmc.step(None, &mut irq, &mut stall);
        assert!(!irq);
        assert!(dmc.active());
    }
}
