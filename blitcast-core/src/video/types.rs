//! Shared image types used across the video pipeline.
//!
//! [`RgbImage`] is what the decoder produces and the splitter and
//! quantizer consume. [`IndexedImage`] plus a [`Palette`] is what the
//! quantizer hands to the reducer.

use serde::{Deserialize, Serialize};

/// Maximum number of colors a frame can reference.
pub const PALETTE_SIZE: usize = 16;

// ── Rgb ──────────────────────────────────────────────────────────

/// One 8-bit-per-channel color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Sum of absolute channel differences.
    pub fn manhattan(self, other: Rgb) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }
}

/// Ordered colors addressed by index. At most [`PALETTE_SIZE`] entries
/// are valid for reduction.
pub type Palette = Vec<Rgb>;

// ── RgbImage ─────────────────────────────────────────────────────

/// Tightly packed, row-major RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Rgb>,
}

impl RgbImage {
    /// A `width × height` image filled with `color`.
    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Wrap packed RGB24 bytes (`width * height * 3` of them).
    pub fn from_rgb24(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != width as usize * height as usize * 3 {
            return None;
        }
        let pixels = bytes
            .chunks_exact(3)
            .map(|p| Rgb::new(p[0], p[1], p[2]))
            .collect();
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Copy out `region`, clipped to the image bounds.
    pub fn crop(&self, region: Region) -> RgbImage {
        let x0 = region.x.min(self.width);
        let y0 = region.y.min(self.height);
        let x1 = region.x.saturating_add(region.width).min(self.width);
        let y1 = region.y.saturating_add(region.height).min(self.height);

        let mut pixels = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0..y1 {
            let row = y as usize * self.width as usize;
            pixels.extend_from_slice(&self.pixels[row + x0 as usize..row + x1 as usize]);
        }

        RgbImage {
            width: x1 - x0,
            height: y1 - y0,
            pixels,
        }
    }
}

// ── IndexedImage ─────────────────────────────────────────────────

/// Row-major palette indices, as produced by a quantizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    pub indices: Vec<u8>,
}

impl IndexedImage {
    pub fn filled(width: u32, height: u32, index: u8) -> Self {
        Self {
            width,
            height,
            indices: vec![index; width as usize * height as usize],
        }
    }

    pub fn index(&self, x: u32, y: u32) -> u8 {
        self.indices[y as usize * self.width as usize + x as usize]
    }

    /// Resolve every index against `palette`.
    pub fn to_rgb(&self, palette: &[Rgb]) -> RgbImage {
        RgbImage {
            width: self.width,
            height: self.height,
            pixels: self
                .indices
                .iter()
                .map(|&i| palette.get(i as usize).copied().unwrap_or_default())
                .collect(),
        }
    }
}

// ── Region ───────────────────────────────────────────────────────

/// Pixel rectangle used by the region splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb24_wrapping_checks_length() {
        assert!(RgbImage::from_rgb24(2, 1, &[1, 2, 3, 4, 5, 6]).is_some());
        assert!(RgbImage::from_rgb24(2, 1, &[1, 2, 3]).is_none());

        let img = RgbImage::from_rgb24(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.pixel(1, 0), Rgb::new(4, 5, 6));
    }

    #[test]
    fn crop_clips_to_bounds() {
        let mut img = RgbImage::filled(4, 4, Rgb::BLACK);
        img.pixels[5] = Rgb::new(9, 9, 9); // (1, 1)

        let sub = img.crop(Region {
            x: 1,
            y: 1,
            width: 10,
            height: 2,
        });
        assert_eq!((sub.width, sub.height), (3, 2));
        assert_eq!(sub.pixel(0, 0), Rgb::new(9, 9, 9));
    }

    #[test]
    fn manhattan_distance() {
        assert_eq!(Rgb::new(10, 0, 255).manhattan(Rgb::new(0, 5, 250)), 20);
    }
}
