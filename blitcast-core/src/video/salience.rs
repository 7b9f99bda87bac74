//! Perceptual helpers for the quality reduction strategy.
//!
//! - CIE L*a*b* (D65) distance between palette entries, via `palette`.
//! - A Sobel edge pass (`imageproc`) turned into a per-pixel salience
//!   score: pixels on strong edges weigh more when a block votes for its
//!   two colors.

use image::{GrayImage, Luma};
use imageproc::gradients::sobel_gradients;
use palette::color_difference::EuclideanDistance;
use palette::white_point::D65;
use palette::{IntoColor, Srgb};

use crate::video::types::{Rgb, RgbImage};

// ── Lab ──────────────────────────────────────────────────────────

pub type Lab = palette::Lab<D65, f64>;

/// `c` in CIE L*a*b*.
pub fn lab(c: Rgb) -> Lab {
    Srgb::new(c.r, c.g, c.b).into_format::<f64>().into_color()
}

/// Symmetric CIE76 distance table for every pair of palette entries.
pub fn distance_table(palette: &[Rgb]) -> [[f64; 16]; 16] {
    let mut table = [[0.0; 16]; 16];
    let labs: Vec<Lab> = palette.iter().take(16).map(|&c| lab(c)).collect();
    for i in 0..labs.len() {
        for j in i + 1..labs.len() {
            let d = labs[i].distance(labs[j]);
            table[i][j] = d;
            table[j][i] = d;
        }
    }
    table
}

// ── Sobel salience ───────────────────────────────────────────────

fn channel(img: &RgbImage, pick: fn(Rgb) -> u8) -> GrayImage {
    GrayImage::from_fn(img.width, img.height, |x, y| {
        Luma([pick(img.pixels[(y * img.width + x) as usize])])
    })
}

/// Fill `out` with one salience score per pixel of `img`.
///
/// Each channel's Sobel magnitude (clamped to 8 bits) is averaged, widened
/// to the 16-bit range and mapped through `ln(e + 7) * 0.65 + 0.45`, so
/// flat areas score about 1.7 and hard edges about 7.7. `out` is reused
/// between frames.
pub fn salience_map(img: &RgbImage, out: &mut Vec<f32>) {
    out.clear();
    out.resize(img.pixels.len(), 0.0);

    let mut sum = vec![0u32; img.pixels.len()];
    let picks: [fn(Rgb) -> u8; 3] = [|c| c.r, |c| c.g, |c| c.b];
    for pick in picks {
        let gradients = sobel_gradients(&channel(img, pick));
        for (total, magnitude) in sum.iter_mut().zip(gradients.pixels()) {
            *total += magnitude[0].min(255) as u32;
        }
    }

    for (score, &total) in out.iter_mut().zip(&sum) {
        let edge = total as f64 / 3.0 * 257.0;
        *score = ((edge + 7.0).ln() * 0.65 + 0.45) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_of_white_and_black() {
        let white = lab(Rgb::new(255, 255, 255));
        assert!((white.l - 100.0).abs() < 0.01);
        assert!(white.a.abs() < 0.01 && white.b.abs() < 0.01);

        let black = lab(Rgb::BLACK);
        assert!(black.l.abs() < 0.01);
    }

    #[test]
    fn distance_table_is_symmetric() {
        let palette = [Rgb::new(255, 0, 0), Rgb::new(0, 0, 255), Rgb::new(250, 5, 5)];
        let t = distance_table(&palette);
        assert_eq!(t[0][1], t[1][0]);
        assert_eq!(t[0][0], 0.0);
        assert!(t[0][2] < t[0][1]);
    }

    #[test]
    fn edges_score_higher_than_flat_areas() {
        let mut img = RgbImage::filled(6, 3, Rgb::BLACK);
        for y in 0..3 {
            for x in 3..6 {
                img.pixels[y * 6 + x] = Rgb::new(255, 255, 255);
            }
        }
        let mut map = Vec::new();
        salience_map(&img, &mut map);
        assert_eq!(map.len(), 18);
        assert!(map[2] > map[0]);
        assert!(map[3] > map[5]);
        assert!((map[0] - 1.71).abs() < 0.01);
    }
}
