use bitflags::bitflags;

bitflags! {
    /// PPU status register (`$2002`).
    ///
    /// Reading returns the three event flags in the top bits; the low five
    /// bits float on the data bus and are left clear here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct Status: u8 {
        const SPRITE_OVERFLOW = 0b0010_0000;
        const SPRITE_ZERO_HIT = 0b0100_0000;
        const VBLANK          = 0b1000_0000;
    }
}

impl Status {
    pub(crate) fn in_vblank(self) -> bool {
        self.contains(Status::VBLANK)
    }
}
