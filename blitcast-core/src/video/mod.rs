//! # Video
//!
//! ```text
//! RgbImage ──► Splitter ──► Quantizer ──► Reducer ──► Frame ──► wire
//! ```
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `types`    | `Rgb`, `RgbImage`, `IndexedImage`, `Region`        |
//! | `split`    | Region splitter for multi-panel arrays             |
//! | `quantize` | Quantizer trait and libimagequant implementation   |
//! | `salience` | Lab distance and Sobel salience for quality mode   |
//! | `reducer`  | 2×3 block reduction into glyph cells               |
//! | `frame`    | `Frame` / `Cell` and the frame wire encoding       |
//! | `still`    | One-picture encoding and PNG previews              |

pub mod frame;
pub mod quantize;
pub mod reducer;
pub mod salience;
pub mod split;
pub mod still;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use frame::{BLOCK_HEIGHT, BLOCK_WIDTH, Cell, Frame, GLYPH_BASE};
pub use quantize::{ImageQuantizer, Quantizer};
pub use reducer::{DEFAULT_FAST_THRESHOLD, ReductionStrategy, Reducer, SENTINEL_FOREGROUND};
pub use split::{RegionSplitter, Splitter};
pub use still::{StillEncoder, preview};
pub use types::{IndexedImage, PALETTE_SIZE, Palette, Region, Rgb, RgbImage};
