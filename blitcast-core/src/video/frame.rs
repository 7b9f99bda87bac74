//! Glyph-cell frames and their wire encoding.
//!
//! ## Wire format (big-endian)
//!
//! ```text
//! width_blocks:   u16
//! height_blocks:  u16
//! palette:        16 × [r, g, b]        (unused slots = 0, 0, 0)
//! per row:
//!   glyphs:       width_blocks × u8     (128 + 6-bit mask)
//!   foreground:   width_blocks × u8     (ASCII hex '0'..='f')
//!   background:   width_blocks × u8     (ASCII hex '0'..='f')
//! ```
//!
//! The format is one-way; the display peripheral is the only reader.

use bytes::BufMut;

use crate::video::types::{PALETTE_SIZE, Rgb};

/// Offset of the private glyph range.
pub const GLYPH_BASE: u8 = 128;

/// Pixel width of one cell.
pub const BLOCK_WIDTH: u32 = 2;

/// Pixel height of one cell.
pub const BLOCK_HEIGHT: u32 = 3;

const HEX: &[u8; 16] = b"0123456789abcdef";

// ── Cell ─────────────────────────────────────────────────────────

/// One display cell: a 2×3 pixel block drawn with two colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    /// 6-bit mask, bit *i* set where row-major pixel *i* uses the
    /// foreground.
    pub mask: u8,
    /// Foreground palette index.
    pub fg: u8,
    /// Background palette index.
    pub bg: u8,
}

impl Cell {
    pub fn glyph(self) -> u8 {
        GLYPH_BASE + (self.mask & 0x3f)
    }

    /// Palette index shown at sub-position `i` (0..6, row-major).
    pub fn index_at(self, i: usize) -> u8 {
        if self.mask & (1 << i) != 0 { self.fg } else { self.bg }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A reduced picture: a grid of cells plus the palette they index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in cells.
    pub width: u16,
    /// Height in cells.
    pub height: u16,
    /// Row-major cells, `width * height` of them.
    pub cells: Vec<Cell>,
    /// Palette; entries past the source palette are black.
    pub palette: [Rgb; PALETTE_SIZE],
}

impl Frame {
    /// Bytes [`encode`](Self::encode) will produce.
    pub fn encoded_len(&self) -> usize {
        4 + PALETTE_SIZE * 3 + self.cells.len() * 3
    }

    /// Serialize into `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16(self.width);
        dst.put_u16(self.height);

        for color in &self.palette {
            dst.put_slice(&[color.r, color.g, color.b]);
        }

        let width = self.width as usize;
        for row in self.cells.chunks(width.max(1)) {
            for cell in row {
                dst.put_u8(cell.glyph());
            }
            for cell in row {
                dst.put_u8(HEX[(cell.fg & 0x0f) as usize]);
            }
            for cell in row {
                dst.put_u8(HEX[(cell.bg & 0x0f) as usize]);
            }
        }
    }

    /// Rebuild the per-pixel palette indices the cells describe
    /// (`width * 2` by `height * 3`, row-major).
    pub fn expand(&self) -> Vec<u8> {
        let px_w = self.width as usize * BLOCK_WIDTH as usize;
        let px_h = self.height as usize * BLOCK_HEIGHT as usize;
        let mut out = vec![0u8; px_w * px_h];

        for (i, cell) in self.cells.iter().enumerate() {
            let bx = (i % self.width as usize) * BLOCK_WIDTH as usize;
            let by = (i / self.width as usize) * BLOCK_HEIGHT as usize;
            for sub in 0..6 {
                let x = bx + sub % 2;
                let y = by + sub / 2;
                out[y * px_w + x] = cell.index_at(sub);
            }
        }
        out
    }
}
