//! Pixel-block reducer.
//!
//! Turns a quantized image into a [`Frame`]: every 2×3 pixel block becomes
//! one cell holding a 6-bit mask plus a foreground and a background index.
//! Blocks holding at most two colors are reproduced exactly; blocks with
//! more colors are approximated by the selected [`ReductionStrategy`].
//!
//! A [`Reducer`] owns its scratch buffers. Each worker builds one and
//! reuses it for every frame it handles.

use serde::{Deserialize, Serialize};

use crate::error::ReductionError;
use crate::video::frame::{BLOCK_HEIGHT, BLOCK_WIDTH, Cell, Frame};
use crate::video::salience::{distance_table, salience_map};
use crate::video::types::{IndexedImage, PALETTE_SIZE, Rgb};

/// Foreground index reported for single-color blocks.
pub const SENTINEL_FOREGROUND: u8 = 0;

/// Default background tolerance of the fast strategy (sum of absolute
/// channel differences).
pub const DEFAULT_FAST_THRESHOLD: u32 = 14;

// ── ReductionStrategy ────────────────────────────────────────────

/// How a block picks its two colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionStrategy {
    /// Bottom-right pixel is the background, the first differing pixel
    /// the foreground. Cheap and adequate for block-coherent input.
    #[default]
    Fast,
    /// Edge-weighted vote for the two most salient colors, with pixels
    /// assigned by Lab distance. Slower, higher fidelity.
    Quality,
}

// ── Reducer ──────────────────────────────────────────────────────

pub struct Reducer {
    strategy: ReductionStrategy,
    threshold: u32,
    salience: Vec<f32>,
}

impl Reducer {
    pub fn new(strategy: ReductionStrategy) -> Self {
        Self {
            strategy,
            threshold: DEFAULT_FAST_THRESHOLD,
            salience: Vec::new(),
        }
    }

    /// Background tolerance used by [`ReductionStrategy::Fast`].
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Reduce `img` into a frame. Any violated precondition rejects the
    /// whole image.
    pub fn reduce(&mut self, img: &IndexedImage, palette: &[Rgb]) -> Result<Frame, ReductionError> {
        validate(img, palette)?;

        let width = img.width / BLOCK_WIDTH;
        let height = img.height / BLOCK_HEIGHT;

        let mut frame_palette = [Rgb::BLACK; PALETTE_SIZE];
        frame_palette[..palette.len()].copy_from_slice(palette);

        let cells = match self.strategy {
            ReductionStrategy::Fast => self.reduce_fast(img, palette, width, height),
            ReductionStrategy::Quality => self.reduce_quality(img, palette, width, height),
        };

        Ok(Frame {
            width: width as u16,
            height: height as u16,
            cells,
            palette: frame_palette,
        })
    }

    // ── Strategies ───────────────────────────────────────────────

    fn reduce_fast(&self, img: &IndexedImage, palette: &[Rgb], width: u32, height: u32) -> Vec<Cell> {
        let mut cells = Vec::with_capacity((width * height) as usize);

        for by in 0..height {
            for bx in 0..width {
                let block = block_indices(img, bx, by);
                let bg = block[5];
                let bg_color = palette[bg as usize];

                let mut fg = None;
                let mut mask = 0u8;
                for (i, &index) in block[..5].iter().enumerate() {
                    let is_fg = match fg {
                        None => index != bg,
                        Some(f) => {
                            index == f || palette[index as usize].manhattan(bg_color) > self.threshold
                        }
                    };
                    if is_fg {
                        fg.get_or_insert(index);
                        mask |= 1 << i;
                    }
                }

                cells.push(Cell {
                    mask,
                    fg: fg.unwrap_or(SENTINEL_FOREGROUND),
                    bg,
                });
            }
        }
        cells
    }

    fn reduce_quality(
        &mut self,
        img: &IndexedImage,
        palette: &[Rgb],
        width: u32,
        height: u32,
    ) -> Vec<Cell> {
        salience_map(&img.to_rgb(palette), &mut self.salience);
        let distance = distance_table(palette);

        let mut cells = Vec::with_capacity((width * height) as usize);
        for by in 0..height {
            for bx in 0..width {
                let block = block_indices(img, bx, by);

                // Salience per distinct color, in first-seen order.
                let mut votes: Vec<(u8, f32)> = Vec::with_capacity(6);
                for (i, &index) in block.iter().enumerate() {
                    let x = bx * BLOCK_WIDTH + (i as u32 % 2);
                    let y = by * BLOCK_HEIGHT + (i as u32 / 2);
                    let score = self.salience[(y * img.width + x) as usize];
                    match votes.iter_mut().find(|(c, _)| *c == index) {
                        Some((_, total)) => *total += score,
                        None => votes.push((index, score)),
                    }
                }

                if votes.len() == 1 {
                    cells.push(Cell {
                        mask: 0,
                        fg: SENTINEL_FOREGROUND,
                        bg: block[5],
                    });
                    continue;
                }

                let (mut top1, mut top2) = ((0u8, f32::MIN), (0u8, f32::MIN));
                for &(index, score) in &votes {
                    if score > top1.1 {
                        top2 = top1;
                        top1 = (index, score);
                    } else if score > top2.1 {
                        top2 = (index, score);
                    }
                }

                let d = |a: u8, b: u8| distance[a as usize][b as usize];
                let corner = block[5];
                let (bg, fg) = if d(corner, top1.0) < d(corner, top2.0) {
                    (top1.0, top2.0)
                } else {
                    (top2.0, top1.0)
                };

                let mut mask = 0u8;
                for (i, &index) in block.iter().enumerate() {
                    if d(index, fg) < d(index, bg) {
                        mask |= 1 << i;
                    }
                }
                cells.push(Cell { mask, fg, bg });
            }
        }
        cells
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn validate(img: &IndexedImage, palette: &[Rgb]) -> Result<(), ReductionError> {
    if palette.len() > PALETTE_SIZE {
        return Err(ReductionError::PaletteTooLarge(palette.len()));
    }
    if img.width % BLOCK_WIDTH != 0 {
        return Err(ReductionError::MisalignedWidth(img.width));
    }
    if img.height % BLOCK_HEIGHT != 0 {
        return Err(ReductionError::MisalignedHeight(img.height));
    }

    let expected = img.width as usize * img.height as usize;
    if img.indices.len() != expected {
        return Err(ReductionError::SizeMismatch {
            expected,
            actual: img.indices.len(),
        });
    }
    for dim in [img.width / BLOCK_WIDTH, img.height / BLOCK_HEIGHT] {
        if dim > u16::MAX as u32 {
            return Err(ReductionError::TooLarge(dim));
        }
    }
    if let Some(&index) = img.indices.iter().find(|&&i| i as usize >= palette.len()) {
        return Err(ReductionError::IndexOutOfRange {
            index,
            palette_len: palette.len(),
        });
    }
    Ok(())
}

/// The six indices of block `(bx, by)`, row-major.
fn block_indices(img: &IndexedImage, bx: u32, by: u32) -> [u8; 6] {
    let x = bx * BLOCK_WIDTH;
    let y = by * BLOCK_HEIGHT;
    [
        img.index(x, y),
        img.index(x + 1, y),
        img.index(x, y + 1),
        img.index(x + 1, y + 1),
        img.index(x, y + 2),
        img.index(x + 1, y + 2),
    ]
}

// ── Tests ────────────────────────────────────────────────────────
