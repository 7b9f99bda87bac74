//! Output units: everything one display tick needs.
//!
//! ## Wire format
//!
//! ```text
//! frames:        one serialized Frame per split region, in split order
//! audio_length:  u32 (big-endian)
//! audio:         [u8] (audio_length bytes, may be empty)
//! ```

use bytes::{BufMut, Bytes};

use crate::video::frame::Frame;

/// One tick of output: the frames for every region plus the audio
/// attached to this tick.
///
/// Units are produced in capture order. With audio batching, only every
/// B-th unit carries audio; units appended after the video ends carry
/// audio but no frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputUnit {
    /// Capture sequence number, starting at 0.
    pub sequence: u64,
    pub frames: Vec<Frame>,
    pub audio: Bytes,
}

impl OutputUnit {
    /// Bytes [`encode`](Self::encode) will produce.
    pub fn encoded_len(&self) -> usize {
        self.frames.iter().map(Frame::encoded_len).sum::<usize>() + 4 + self.audio.len()
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        for frame in &self.frames {
            frame.encode(dst);
        }
        encode_audio(&self.audio, dst);
    }
}

/// Audio segment framing: `u32` length prefix then the raw codec bytes.
pub fn encode_audio<B: BufMut>(audio: &[u8], dst: &mut B) {
    dst.put_u32(audio.len() as u32);
    dst.put_slice(audio);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::Cell;
    use crate::video::types::{PALETTE_SIZE, Rgb};

    #[test]
    fn audio_only_unit() {
        let unit = OutputUnit {
            sequence: 3,
            frames: Vec::new(),
            audio: Bytes::from_static(&[9, 8, 7]),
        };
        let mut buf = Vec::new();
        unit.encode(&mut buf);
        assert_eq!(buf, vec![0, 0, 0, 3, 9, 8, 7]);
        assert_eq!(unit.encoded_len(), buf.len());
    }

    #[test]
    fn frames_precede_empty_audio() {
        let frame = Frame {
            width: 1,
            height: 1,
            cells: vec![Cell::default()],
            palette: [Rgb::BLACK; PALETTE_SIZE],
        };
        let unit = OutputUnit {
            sequence: 0,
            frames: vec![frame.clone(), frame],
            audio: Bytes::new(),
        };
        let mut buf = Vec::new();
        unit.encode(&mut buf);

        assert_eq!(buf.len(), 2 * 55 + 4);
        assert_eq!(&buf[buf.len() - 4..], &[0, 0, 0, 0]);
        assert_eq!(&buf[55..59], &[0, 1, 0, 1]);
    }
}
