use bitflags::bitflags;

bitflags! {
    /// 6502 processor status register (NV-BDIZC).
    ///
    /// Bit 5 (`UNUSED`) does not exist in silicon but always reads back as 1
    /// when the status byte is pushed; `BREAK` is likewise only a property
    /// of pushed bytes, distinguishing `BRK`/`PHP` from interrupts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const IRQ_OFF   = 0b0000_0100;
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const UNUSED    = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Power-on value: interrupts masked, unused bit set.
    pub fn power_on() -> Self {
        Status::IRQ_OFF | Status::UNUSED
    }

    /// The byte pushed by `BRK`/`PHP` (break + unused forced high).
    pub fn pushed_by_instruction(self) -> u8 {
        (self | Status::BREAK | Status::UNUSED).bits()
    }

    /// The byte pushed when servicing NMI/IRQ (break low, unused high).
    pub fn pushed_by_interrupt(self) -> u8 {
        ((self | Status::UNUSED) - Status::BREAK).bits()
    }

    /// Restores a byte popped from the stack; the phantom bits are ignored.
    pub fn from_pulled(value: u8) -> Self {
        (Status::from_bits_truncate(value) - Status::BREAK) | Status::UNUSED
    }

    pub fn set_zn(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_bytes_always_carry_bit_5() {
        let status = Status::CARRY | Status::UNUSED;
        assert_eq!(status.pushed_by_instruction() & 0b0011_0000, 0b0011_0000);
        assert_eq!(status.pushed_by_interrupt() & 0b0011_0000, 0b0010_0000);
    }

    #[test]
    fn pull_discards_phantom_bits() {
        let status = Status::from_pulled(0xFF);
        assert!(!status.contains(Status::BREAK));
        assert!(status.contains(Status::UNUSED));
        assert!(status.contains(Status::NEGATIVE));
    }
}
