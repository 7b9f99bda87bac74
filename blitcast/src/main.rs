//! blitcast entry point.
//!
//! ```text
//! blitcast video <INPUT>          Encode media, units to stdout
//! blitcast image <INPUT>          Encode one picture, frame to stdout
//! blitcast audio encode           PCM (stdin) → DFPWM (stdout)
//! blitcast audio decode           DFPWM (stdin) → PCM (stdout)
//! blitcast --config <path> ...    Load a custom config TOML
//! blitcast --gen-config           Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use blitcast::commands;
use blitcast::config::BlitConfig;
use blitcast_core::{BlitError, CancellationToken};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "blitcast", about = "Glyph video and DFPWM audio encoder")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "blitcast.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a media file or URL.
    Video {
        /// Path or URL handed to ffmpeg, or `-` to read stdin.
        input: String,

        /// Decoded width in pixels (multiple of 2).
        #[arg(long)]
        width: Option<u32>,

        /// Decoded height in pixels (multiple of 3).
        #[arg(long)]
        height: Option<u32>,

        /// Frame workers.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Decode at playback speed.
        #[arg(long)]
        realtime: bool,

        /// Ignore the source's audio track.
        #[arg(long)]
        no_audio: bool,

        /// Log throughput once per second.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Encode one PNG or JPEG picture into a single frame.
    Image {
        /// Picture to encode. Width must be a multiple of 2, height of 3.
        input: PathBuf,

        /// Write the frame here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to save a PNG rendering of the frame.
        #[arg(short, long, default_value = "preview.png")]
        preview: PathBuf,

        /// Quantizer speed, 1 (best) to 10 (fastest).
        #[arg(short = 'q', long)]
        speed: Option<u8>,

        /// Dither level, 0.0 to 1.0.
        #[arg(short, long)]
        dither: Option<f64>,
    },
    /// Convert between raw PCM and DFPWM.
    Audio {
        #[command(subcommand)]
        action: AudioAction,
    },
}

#[derive(Subcommand, Debug)]
enum AudioAction {
    /// Signed 8-bit 48 kHz mono PCM in, DFPWM out.
    Encode,
    /// DFPWM in, signed 8-bit PCM out.
    Decode,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BlitConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("nothing to do; see `blitcast --help`");
        std::process::exit(2);
    };

    let (mut config, load_issue) = BlitConfig::load(&cli.config);

    // Init tracing. Stdout carries encoded data, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("blitcast v{}", env!("CARGO_PKG_VERSION"));
    if let Some(issue) = &load_issue {
        issue.report();
    }

    match command {
        Command::Video {
            input,
            width,
            height,
            workers,
            realtime,
            no_audio,
            verbose,
        } => {
            if let Some(w) = width {
                config.video.width = w;
            }
            if let Some(h) = height {
                config.video.height = h;
            }
            if let Some(n) = workers {
                config.video.workers = n;
            }
            config.decoder.realtime |= realtime;
            config.logging.verbose |= verbose;
            if no_audio {
                config.audio.enabled = false;
            }

            info!("input: {input}");
            info!("size: {}x{}", config.video.width, config.video.height);
            info!("frame rate: {}", config.video.frame_rate);

            let cancel = CancellationToken::new();

            // Ctrl-C handler.
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, shutting down");
                token.cancel();
            });

            match commands::encode_video(&config, &input, cancel).await {
                Ok(_) | Err(BlitError::Cancelled) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Command::Image {
            input,
            output,
            preview,
            speed,
            dither,
        } => {
            if let Some(q) = speed {
                config.video.speed = q;
            }
            if let Some(d) = dither {
                config.video.dither = d;
            }
            commands::encode_image(&config, &input, output.as_deref(), &preview).await?;
        }
        Command::Audio { action } => match action {
            AudioAction::Encode => commands::encode_audio().await?,
            AudioAction::Decode => commands::decode_audio().await?,
        },
    }

    Ok(())
}
