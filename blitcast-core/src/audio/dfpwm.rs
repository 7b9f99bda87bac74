//! Adaptive delta-modulation codec (one bit per sample).
//!
//! Each input sample is compared against a predictor `level`; the result
//! bit drives the predictor toward one of the rails while an adaptive
//! `response` gain grows during runs of equal bits and shrinks on
//! transitions. The decoder replays exactly the same state machine and
//! low-pass filters the reconstructed level.
//!
//! Bits are packed eight per byte, least-significant bit first.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::audio::source::AudioSource;
use crate::error::CodecError;

// ── Constants ────────────────────────────────────────────────────

/// Fixed sample rate the codec is tuned for.
pub const SAMPLE_RATE: u32 = 48_000;

/// Encoded bytes per second of audio at [`SAMPLE_RATE`].
pub const BYTES_PER_SECOND: u32 = SAMPLE_RATE / 8;

/// Samples consumed per step by [`encode_stream`].
pub const CHUNK_SAMPLES: usize = 1024;

const RESPONSE_PRECISION: i32 = 10;
const RESPONSE_MAX: i32 = (1 << RESPONSE_PRECISION) - 1;
const RESPONSE_FLOOR: i32 = 2 << (RESPONSE_PRECISION - 8);
const LPF_STRENGTH: i32 = 140;

// ── CodecState ───────────────────────────────────────────────────

/// Predictor state shared by the encoder and decoder.
///
/// The state after a bit is a pure function of the state before it and
/// the bit itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecState {
    /// Predictor level in `-128..=127`.
    pub level: i32,
    /// Adaptive step gain in `RESPONSE_FLOOR..=RESPONSE_MAX` once running.
    pub response: i32,
    /// Bit produced (or consumed) by the previous sample.
    pub last_bit: bool,
    /// Low-pass accumulator, decode only.
    pub lpf: i32,
    /// Level before the previous update, decode only.
    pub previous_level: i32,
}

impl CodecState {
    /// Advance `level` and `response` for `bit`. Does not touch
    /// `last_bit`; callers record it once the sample is finished.
    fn advance(&mut self, bit: bool) {
        let target = if bit { 127 } else { -128 };

        let before = self.level;
        self.level += (self.response * (target - self.level) + (1 << (RESPONSE_PRECISION - 1)))
            >> RESPONSE_PRECISION;
        // Tiny gains round to zero movement; force a step so the predictor
        // never sticks short of the rail.
        if self.level == before && before != target {
            self.level += if bit { 1 } else { -1 };
        }

        let trending = bit == self.last_bit;
        let response_target = if trending { RESPONSE_MAX } else { 0 };
        if self.response != response_target {
            self.response += if trending { 1 } else { -1 };
        }
        self.response = self.response.max(RESPONSE_FLOOR);
    }

    fn encode_sample(&mut self, sample: i8) -> bool {
        let sample = sample as i32;
        let bit = sample > self.level || (sample == self.level && self.level == 127);
        self.advance(bit);
        self.last_bit = bit;
        bit
    }

    fn decode_bit(&mut self, bit: bool) -> i8 {
        self.advance(bit);

        let mut amplitude = self.level as u8 as i8 as i32;
        if bit != self.last_bit {
            amplitude = ((self.previous_level + self.level + 1) >> 1) as u8 as i8 as i32;
        }
        self.previous_level = self.level;

        self.lpf += (LPF_STRENGTH * (amplitude - self.lpf) + 0x80) >> 8;
        self.last_bit = bit;
        self.lpf as u8 as i8
    }
}

// ── Encoder ──────────────────────────────────────────────────────

/// Stateful encoder. Keep one per stream; successive calls continue
/// where the previous one stopped.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    state: CodecState,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current predictor state.
    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Encode `samples` into `samples.len() / 8` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `samples.len()` is not a multiple of 8. A ragged buffer
    /// is a caller bug, not a recoverable condition.
    pub fn encode(&mut self, samples: &[i8]) -> Vec<u8> {
        assert!(
            samples.len() % 8 == 0,
            "dfpwm: encode: sample count {} is not a multiple of 8",
            samples.len()
        );

        let mut out = Vec::with_capacity(samples.len() / 8);
        for group in samples.chunks_exact(8) {
            let mut byte = 0u8;
            for &sample in group {
                byte >>= 1;
                if self.state.encode_sample(sample) {
                    byte |= 0x80;
                }
            }
            out.push(byte);
        }
        out
    }
}

/// Encode `samples` from a fresh state. Only suitable for self-contained
/// buffers; streams must use [`Encoder`] or [`encode_stream`].
///
/// # Panics
///
/// Panics if `samples.len()` is not a multiple of 8.
pub fn encode_oneshot(samples: &[i8]) -> Vec<u8> {
    Encoder::new().encode(samples)
}

// ── Decoder ──────────────────────────────────────────────────────

/// Stateful decoder producing eight signed samples per input byte.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    state: CodecState,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Vec<i8> {
        let mut out = Vec::with_capacity(bytes.len() * 8);
        for &byte in bytes {
            let mut bits = byte;
            for _ in 0..8 {
                out.push(self.state.decode_bit(bits & 1 != 0));
                bits >>= 1;
            }
        }
        out
    }
}

// ── Streaming ────────────────────────────────────────────────────

/// Drain `source` into `sink`, [`CHUNK_SAMPLES`] at a time.
///
/// Every chunk is written out before the next one is read. When the
/// source ends mid-chunk the remainder is padded with silence and flushed
/// as a self-contained chunk. Returns the number of bytes written.
///
/// The sink is flushed but not shut down.
pub async fn encode_stream<S, W>(source: &mut S, sink: &mut W) -> Result<u64, CodecError>
where
    S: AudioSource + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let actual = source.sample_rate();
    if actual != SAMPLE_RATE {
        return Err(CodecError::SampleRateMismatch {
            expected: SAMPLE_RATE,
            actual,
        });
    }

    let mut encoder = Encoder::new();
    let mut input = vec![0i8; CHUNK_SAMPLES];
    let mut written = 0u64;

    loop {
        let mut count = 0;
        while count < CHUNK_SAMPLES {
            let n = source.read(&mut input[count..]).await?;
            if n == 0 {
                break;
            }
            count += n;
        }

        if count == CHUNK_SAMPLES {
            let encoded = encoder.encode(&input);
            sink.write_all(&encoded).await?;
            sink.flush().await?;
            written += encoded.len() as u64;
            tracing::trace!(bytes = encoded.len(), "dfpwm chunk written");
            continue;
        }

        if count > 0 {
            input[count..].fill(0);
            let encoded = encode_oneshot(&input);
            sink.write_all(&encoded).await?;
            written += encoded.len() as u64;
            tracing::trace!(samples = count, bytes = encoded.len(), "dfpwm final chunk written");
        }
        sink.flush().await?;
        return Ok(written);
    }
}

/// Decode a DFPWM byte stream into signed 8-bit PCM bytes.
/// Returns the number of samples written.
pub async fn decode_stream<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut decoder = Decoder::new();
    let mut input = vec![0u8; CHUNK_SAMPLES / 8];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut input).await?;
        if n == 0 {
            writer.flush().await?;
            return Ok(written);
        }
        let samples = decoder.decode(&input[..n]);
        let bytes: Vec<u8> = samples.iter().map(|&s| s as u8).collect();
        writer.write_all(&bytes).await?;
        written += samples.len() as u64;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::PcmReader;

    fn tone(len: usize) -> Vec<i8> {
        (0..len)
            .map(|i| ((i as f64 * 0.05).sin() * 90.0) as i8)
            .collect()
    }

    #[test]
    fn oneshot_silence_matches_initial_state() {
        // From the zero state the predictor oscillates around 0, so silence
        // encodes as alternating 0/1 bits starting with 0.
        let encoded = encode_oneshot(&[0i8; 64]);
        assert_eq!(encoded, vec![0xAA; 8]);
    }

    #[test]
    fn oneshot_resets_state_each_call() {
        let samples = tone(256);
        assert_eq!(encode_oneshot(&samples), encode_oneshot(&samples));
    }

    #[test]
    #[should_panic(expected = "multiple of 8")]
    fn ragged_buffer_is_fatal() {
        let _ = encode_oneshot(&[0i8; 7]);
    }

    #[test]
    fn state_continuity_across_calls() {
        let samples = tone(4096);
        let (a, b) = samples.split_at(1000);
        let (a, b) = (&a[..992], [&a[992..], b].concat());

        let mut split = Encoder::new();
        let mut joined = split.encode(a);
        joined.extend(split.encode(&b));

        assert_eq!(joined, encode_oneshot(&samples));
    }

    #[test]
    fn silence_decodes_to_near_zero() {
        let encoded = encode_oneshot(&[0i8; 1024]);
        let decoded = Decoder::new().decode(&encoded);
        assert_eq!(decoded.len(), 1024);
        assert!(decoded[64..].iter().all(|s| s.unsigned_abs() <= 2));
    }

    #[test]
    fn tone_roughly_survives_roundtrip() {
        let samples = tone(8192);
        let decoded = Decoder::new().decode(&encode_oneshot(&samples));
        let err: f64 = samples[1024..]
            .iter()
            .zip(&decoded[1024..])
            .map(|(&a, &b)| (a as f64 - b as f64).abs())
            .sum::<f64>()
            / (samples.len() - 1024) as f64;
        assert!(err < 40.0, "mean abs error {err}");
    }

    #[test]
    fn response_never_drops_below_floor() {
        let mut enc = Encoder::new();
        let alternating: Vec<i8> = (0..512).map(|i| if i % 2 == 0 { 127 } else { -128 }).collect();
        enc.encode(&alternating);
        assert!(enc.state().response >= RESPONSE_FLOOR);
    }

    #[tokio::test]
    async fn stream_rejects_wrong_rate() {
        let pcm = vec![0u8; 2048];
        let mut source = PcmReader::new(&pcm[..], 44_100);
        let mut sink = Vec::new();
        let err = encode_stream(&mut source, &mut sink).await.unwrap_err();
        assert!(matches!(
            err,
            CodecError::SampleRateMismatch { expected: 48_000, actual: 44_100 }
        ));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn stream_matches_stateful_encoder() {
        let samples = tone(CHUNK_SAMPLES * 3);
        let pcm: Vec<u8> = samples.iter().map(|&s| s as u8).collect();
        let mut source = PcmReader::new(&pcm[..], SAMPLE_RATE);
        let mut sink = Vec::new();
        let written = encode_stream(&mut source, &mut sink).await.unwrap();

        assert_eq!(written, (CHUNK_SAMPLES * 3 / 8) as u64);
        assert_eq!(sink, encode_oneshot(&samples));
    }

    #[tokio::test]
    async fn stream_pads_trailing_partial_chunk() {
        let pcm = vec![0u8; CHUNK_SAMPLES + 100];
        let mut source = PcmReader::new(&pcm[..], SAMPLE_RATE);
        let mut sink = Vec::new();
        let written = encode_stream(&mut source, &mut sink).await.unwrap();
        assert_eq!(written, (CHUNK_SAMPLES * 2 / 8) as u64);
        assert_eq!(sink.len(), CHUNK_SAMPLES * 2 / 8);
    }

    #[tokio::test]
    async fn decode_stream_expands_eight_to_one() {
        let encoded = encode_oneshot(&tone(800));
        let mut out = Vec::new();
        let n = decode_stream(&mut &encoded[..], &mut out).await.unwrap();
        assert_eq!(n, 800);
        assert_eq!(out.len(), 800);
    }
}
