//! Color quantization collaborator.
//!
//! The pipeline only depends on the [`Quantizer`] trait. The bundled
//! [`ImageQuantizer`] keeps images that already use at most 16 colors
//! exact and hands everything else to libimagequant.

use std::collections::BTreeSet;

use imagequant::RGBA;

use crate::error::BlitError;
use crate::video::types::{IndexedImage, PALETTE_SIZE, Palette, Rgb, RgbImage};

// ── Quantizer ────────────────────────────────────────────────────

/// Reduces an image to at most 16 colors.
pub trait Quantizer: Send + Sync {
    /// `speed` is in `1..=10` (higher is faster, coarser); `dither` in
    /// `0.0..=1.0`.
    fn quantize(
        &self,
        img: &RgbImage,
        speed: u8,
        dither: f32,
    ) -> Result<(IndexedImage, Palette), BlitError>;
}

// ── ImageQuantizer ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageQuantizer;

impl Quantizer for ImageQuantizer {
    fn quantize(
        &self,
        img: &RgbImage,
        speed: u8,
        dither: f32,
    ) -> Result<(IndexedImage, Palette), BlitError> {
        if !(1..=10).contains(&speed) {
            return Err(BlitError::Quantize(format!("speed {speed} outside 1..=10")));
        }
        if !(0.0..=1.0).contains(&dither) {
            return Err(BlitError::Quantize(format!("dither {dither} outside 0..=1")));
        }

        if let Some(palette) = exact_palette(img) {
            let indices = img
                .pixels
                .iter()
                .map(|p| palette.binary_search(p).unwrap_or(0) as u8)
                .collect();
            let out = IndexedImage {
                width: img.width,
                height: img.height,
                indices,
            };
            return Ok((out, palette));
        }

        let (palette, indices) = liq_quantize(img, speed, dither)
            .map_err(|e| BlitError::Quantize(e.to_string()))?;
        Ok((
            IndexedImage {
                width: img.width,
                height: img.height,
                indices,
            },
            palette,
        ))
    }
}

/// Sorted distinct colors, if there are at most 16 of them.
fn exact_palette(img: &RgbImage) -> Option<Palette> {
    let mut seen = BTreeSet::new();
    for &p in &img.pixels {
        if seen.insert(p) && seen.len() > PALETTE_SIZE {
            return None;
        }
    }
    Some(seen.into_iter().collect())
}

fn liq_quantize(
    img: &RgbImage,
    speed: u8,
    dither: f32,
) -> Result<(Palette, Vec<u8>), imagequant::Error> {
    let mut attr = imagequant::new();
    attr.set_speed(speed as i32)?;
    attr.set_max_colors(PALETTE_SIZE as u32)?;

    let pixels: Vec<RGBA> = img
        .pixels
        .iter()
        .map(|p| RGBA::new(p.r, p.g, p.b, u8::MAX))
        .collect();
    let mut image = attr.new_image(pixels, img.width as usize, img.height as usize, 0.0)?;

    let mut result = attr.quantize(&mut image)?;
    result.set_dithering_level(dither)?;
    let (colors, indices) = result.remapped(&mut image)?;

    let palette = colors.iter().map(|c| Rgb::new(c.r, c.g, c.b)).collect();
    Ok((palette, indices))
}
