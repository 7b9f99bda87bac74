//! Subcommand runners.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use blitcast_core::audio::dfpwm::{self, SAMPLE_RATE};
use blitcast_core::audio::PcmReader;
use blitcast_core::video::preview;
use blitcast_core::{
    AudioCodec, BlitError, CancellationToken, DfpwmCodec, Frame, ImageQuantizer, Pipeline, Reducer,
    RgbImage, StillEncoder, write_units,
};

use crate::config::BlitConfig;

/// Units buffered between the pipeline and stdout.
const OUTPUT_QUEUE: usize = 16;

/// Encode `input` and stream the serialized units to stdout.
pub async fn encode_video(
    config: &BlitConfig,
    input: &str,
    cancel: CancellationToken,
) -> Result<u64, BlitError> {
    let options = config.to_encoder_options(cancel);
    let pipeline = Pipeline::new(options).with_decoder(Arc::new(config.to_decoder()));

    let (tx, rx) = mpsc::channel(OUTPUT_QUEUE);
    let writer = tokio::spawn(write_units(rx, tokio::io::stdout()));

    let result = pipeline.run(input, tx).await;
    let written = writer.await??;
    result?;

    info!(units = written, "video written");
    Ok(written)
}

/// Raw signed 8-bit 48 kHz PCM on stdin → DFPWM on stdout.
pub async fn encode_audio() -> Result<(), BlitError> {
    let mut source = PcmReader::new(tokio::io::stdin(), SAMPLE_RATE);
    let mut stdout = tokio::io::stdout();
    DfpwmCodec.encode(&mut source, &mut stdout).await?;
    Ok(())
}

/// DFPWM on stdin → raw signed 8-bit PCM on stdout.
pub async fn decode_audio() -> Result<(), BlitError> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let samples = dfpwm::decode_stream(&mut stdin, &mut stdout).await?;
    info!(samples, "audio decoded");
    Ok(())
}

/// Encode one PNG or JPEG picture into a frame, written to `output` or
/// stdout, with a rendering of the result saved to `preview_path`.
pub async fn encode_image(
    config: &BlitConfig,
    input: &Path,
    output: Option<&Path>,
    preview_path: &Path,
) -> Result<Frame, BlitError> {
    let video = config.video.clone();
    let input = input.to_path_buf();
    let preview_path: PathBuf = preview_path.to_path_buf();

    let frame = tokio::task::spawn_blocking(move || -> Result<Frame, BlitError> {
        let picture = image::open(&input)?.to_rgb8();
        info!(
            width = picture.width(),
            height = picture.height(),
            "loaded {}",
            input.display()
        );

        let reducer = Reducer::new(video.strategy).with_threshold(video.fast_threshold);
        let mut encoder =
            StillEncoder::new(Arc::new(ImageQuantizer), reducer, video.speed, video.dither as f32);
        let frame = encoder.encode(&RgbImage::from(&picture))?;

        if let Err(e) = preview(&frame).save(&preview_path) {
            warn!("failed to write preview {}: {e}", preview_path.display());
        }
        Ok(frame)
    })
    .await??;

    let mut bytes = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut bytes);
    match output {
        Some(path) => tokio::fs::write(path, &bytes).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }

    info!(
        cells = frame.cells.len(),
        bytes = bytes.len(),
        "picture written"
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("blitcast-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn image_command_writes_frame_and_preview() {
        let input = scratch("input.png");
        let output = scratch("frame.bin");
        let preview_path = scratch("preview.png");

        let picture = image::RgbImage::from_fn(4, 6, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 0])
            }
        });
        picture.save(&input).unwrap();

        let config = BlitConfig::default();
        let frame = encode_image(&config, &input, Some(output.as_path()), &preview_path)
            .await
            .unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), frame.encoded_len());
        assert_eq!(&written[..4], &[0, 2, 0, 2]);

        let rendered = image::open(&preview_path).unwrap().to_rgb8();
        assert_eq!(rendered, picture);

        for path in [input, output, preview_path] {
            std::fs::remove_file(path).ok();
        }
    }

    #[tokio::test]
    async fn missing_picture_is_an_image_error() {
        let config = BlitConfig::default();
        let result = encode_image(
            &config,
            Path::new("/nonexistent/picture.png"),
            Some(scratch("never.bin").as_path()),
            &scratch("never.png"),
        )
        .await;
        assert!(matches!(result, Err(BlitError::Image(_))));
    }
}
