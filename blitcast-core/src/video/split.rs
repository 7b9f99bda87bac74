//! Region splitting for multi-panel display arrays.
//!
//! A splitter turns one decoded picture into the ordered list of
//! sub-images that become the frames of a single output unit.

use crate::video::types::{Region, RgbImage};

pub trait Splitter: Send + Sync {
    fn split(&self, img: &RgbImage) -> Vec<RgbImage>;
}

/// Crops a fixed list of rectangles, in order.
#[derive(Debug, Clone, Default)]
pub struct RegionSplitter {
    regions: Vec<Region>,
}

impl RegionSplitter {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl Splitter for RegionSplitter {
    fn split(&self, img: &RgbImage) -> Vec<RgbImage> {
        self.regions.iter().map(|&r| img.crop(r)).collect()
    }
}
