//! Triangle channel state and linear counter.

use super::{length_counter::LengthCounter, tables::TRIANGLE_SEQUENCE};

#[cfg_attr(
    feature = "savestate-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct Triangle {
    control_flag: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    pub(super) length: LengthCounter,
    timer: u16,
    timer_period: u16,
    sequence_pos: u8,
    last_output: u8,
    enabled: bool,
}

impl Triangle {
    pub(super) fn write_control(&mut self, value: u8) {
        self.control_flag = value & 0b1000_0000 != 0;
        self.linear_reload_value = value & 0b0111_1111;
    }

    pub(super) fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | u16::from(value);
    }

    pub(super) fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (u16::from(value & 0b111) << 8);
        self.length.load(value >> 3, self.enabled);
        self.linear_reload = true;
        // Writing $400B resets neither the timer nor the sequence position.
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    pub(super) fn clock_linear_counter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control_flag {
            self.linear_reload = false;
        }
    }

    /// Clocked every CPU cycle.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.sequence_pos = (self.sequence_pos + 1) & 0b1_1111;
                self.last_output = TRIANGLE_SEQUENCE[self.sequence_pos as usize];
            }
        } else {
            self.timer -= 1;
        }
    }

    pub(super) fn clock_length(&mut self) {
        self.length.clock(self.control_flag);
    }

    pub(super) fn output(&self) -> u8 {
        // The DAC holds its last level when gating stops the sequencer.
        self.last_output
    }

    pub(super) fn length_active(&self) -> bool {
        self.length.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequencer_walks_down_then_up() {
        let mut tri = Triangle::default();
        tri.set_enabled(true);
        tri.write_control(0x7F); // max linear counter
        tri.write_timer_low(0x00);
        tri.write_timer_high(0x00); // period 0: advance every clock
        tri.clock_linear_counter();

        let mut seen = Vec::new();
        for _ in 0..32 {
            tri.clock_timer();
            seen.push(tri.output());
        }
        assert_eq!(&seen[..16], &TRIANGLE_SEQUENCE[1..17]);
    }

    #[test]
    fn halts_when_linear_counter_empty() {
        let mut tri = Triangle::default();
        tri.set_enabled(true);
        tri.write_control(0x00); // linear reload 0
        tri.write_timer_low(0x00);
        tri.write_timer_high(0x00);
        tri.clock_linear_counter();

        let before = tri.output();
        for _ in 0..8 {
            tri.clock_timer();
        }
        assert_eq!(tri.output(), before);
    }
}
