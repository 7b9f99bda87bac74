//! # blitcast
//!
//! Command-line front end for `blitcast-core`.
//!
//! ## Subcommands
//!
//! - **video**: Decode a media file with ffmpeg and stream encoded units
//!   (glyph frames plus DFPWM audio) to stdout.
//! - **audio encode / decode**: Convert between raw signed 8-bit 48 kHz
//!   PCM and DFPWM, stdin to stdout.

pub mod commands;
pub mod config;
