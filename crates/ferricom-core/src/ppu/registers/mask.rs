use bitflags::bitflags;

bitflags! {
    /// PPU mask register (`$2001`).
    ///
    /// Bit layout:
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// B G R s b M m g
    /// ```
    /// - `g`: grayscale
    /// - `m`: show background in the leftmost 8 pixels
    /// - `M`: show sprites in the leftmost 8 pixels
    /// - `b`: show background
    /// - `s`: show sprites
    /// - `R`/`G`/`B`: color emphasis
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct Mask: u8 {
        const GRAYSCALE       = 0b0000_0001;
        const BG_LEFT_COLUMN  = 0b0000_0010;
        const SPR_LEFT_COLUMN = 0b0000_0100;
        const SHOW_BACKGROUND = 0b0000_1000;
        const SHOW_SPRITES    = 0b0001_0000;
        const EMPHASIZE_RED   = 0b0010_0000;
        const EMPHASIZE_GREEN = 0b0100_0000;
        const EMPHASIZE_BLUE  = 0b1000_0000;
    }
}

impl Mask {
    /// True when either background or sprite rendering is enabled.
    pub(crate) fn rendering_enabled(self) -> bool {
        self.intersects(Mask::SHOW_BACKGROUND | Mask::SHOW_SPRITES)
    }

    pub(crate) fn show_background(self) -> bool {
        self.contains(Mask::SHOW_BACKGROUND)
    }

    pub(crate) fn show_sprites(self) -> bool {
        self.contains(Mask::SHOW_SPRITES)
    }

    /// Whether the background is visible at pixel column `x`.
    pub(crate) fn background_visible_at(self, x: u16) -> bool {
        self.show_background() && (x >= 8 || self.contains(Mask::BG_LEFT_COLUMN))
    }

    /// Whether sprites are visible at pixel column `x`.
    pub(crate) fn sprites_visible_at(self, x: u16) -> bool {
        self.show_sprites() && (x >= 8 || self.contains(Mask::SPR_LEFT_COLUMN))
    }

    /// Palette mask applied before color lookup: grayscale forces the
    /// column of grays.
    pub(crate) fn palette_mask(self) -> u8 {
        if self.contains(Mask::GRAYSCALE) {
            0x30
        } else {
            0x3F
        }
    }

    /// Emphasis bits (0..8) indexing the pre-computed palette variants.
    pub(crate) fn emphasis(self) -> u8 {
        self.bits() >> 5
    }
}
