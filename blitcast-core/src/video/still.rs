//! Single-picture encoding.
//!
//! Runs one decoded picture through the same quantize → reduce path the
//! worker pool uses, and renders a frame back into pixels so the result
//! can be inspected as a PNG.

use std::sync::Arc;

use crate::error::BlitError;
use crate::video::frame::{BLOCK_HEIGHT, BLOCK_WIDTH, Frame};
use crate::video::quantize::Quantizer;
use crate::video::reducer::Reducer;
use crate::video::types::{Rgb, RgbImage};

impl From<&image::RgbImage> for RgbImage {
    fn from(img: &image::RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            pixels: img.pixels().map(|p| Rgb::new(p[0], p[1], p[2])).collect(),
        }
    }
}

pub struct StillEncoder {
    quantizer: Arc<dyn Quantizer>,
    reducer: Reducer,
    speed: u8,
    dither: f32,
}

impl StillEncoder {
    pub fn new(quantizer: Arc<dyn Quantizer>, reducer: Reducer, speed: u8, dither: f32) -> Self {
        Self {
            quantizer,
            reducer,
            speed,
            dither,
        }
    }

    /// Quantize and reduce `img`. Its width must be a multiple of 2 and
    /// its height a multiple of 3; nothing is rescaled.
    pub fn encode(&mut self, img: &RgbImage) -> Result<Frame, BlitError> {
        let (indexed, palette) = self.quantizer.quantize(img, self.speed, self.dither)?;
        let frame = self.reducer.reduce(&indexed, &palette)?;
        tracing::debug!(
            width = frame.width,
            height = frame.height,
            colors = palette.len(),
            "picture reduced"
        );
        Ok(frame)
    }
}

/// What a display shows for `frame`, one pixel per glyph sub-pixel.
pub fn preview(frame: &Frame) -> image::RgbImage {
    let width = frame.width as u32 * BLOCK_WIDTH;
    let height = frame.height as u32 * BLOCK_HEIGHT;
    let indices = frame.expand();
    image::RgbImage::from_fn(width, height, |x, y| {
        let c = frame.palette[indices[(y * width + x) as usize] as usize];
        image::Rgb([c.r, c.g, c.b])
    })
}
