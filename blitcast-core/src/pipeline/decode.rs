//! External decode collaborator.
//!
//! A [`MediaDecoder`] turns an opaque media source into a
//! [`DecodeSession`]: a raw RGB24 frame stream, a raw signed 8-bit mono
//! PCM stream and a [`DecodeProcess`] handle the pipeline supervises.
//! [`FfmpegDecoder`] is the production implementation; it reads paths,
//! URLs, or `-` for our own stdin.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::error::BlitError;
use crate::video::types::RgbImage;

// ── Collaborator Traits ──────────────────────────────────────────

/// What the pipeline asks the decoder for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    /// Path or URL understood by the decoder.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// PCM rate the audio codec expects.
    pub sample_rate: u32,
    pub realtime: bool,
    pub debug: bool,
}

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A running decode: two byte streams plus the process behind them.
pub struct DecodeSession {
    /// Back-to-back `width * height * 3` byte RGB24 frames.
    pub frames: ByteStream,
    /// Signed 8-bit mono PCM.
    pub audio: ByteStream,
    /// Rate the PCM stream is actually delivered at.
    pub sample_rate: u32,
    pub process: Box<dyn DecodeProcess>,
}

/// Handle on the external decode process.
///
/// Implementations must also terminate the process when dropped.
#[async_trait]
pub trait DecodeProcess: Send {
    /// Wait for normal exit. An abnormal exit is an `UpstreamDecode` error.
    async fn wait(&mut self) -> Result<(), BlitError>;

    /// Terminate the process and reap it.
    async fn kill(&mut self) -> Result<(), BlitError>;
}

pub trait MediaDecoder: Send + Sync {
    fn spawn(&self, request: &DecodeRequest) -> Result<DecodeSession, BlitError>;
}

// ── FrameReader ──────────────────────────────────────────────────

/// Cuts a raw RGB24 byte stream into whole frames.
pub struct FrameReader<R> {
    reader: R,
    width: u32,
    height: u32,
    buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            buf: vec![0; width as usize * height as usize * 3],
        }
    }

    /// Read the next full frame. `None` at end-of-stream; a truncated
    /// trailing frame also counts as end-of-stream.
    pub async fn next_frame(&mut self) -> Result<Option<RgbImage>, BlitError> {
        let mut filled = 0;
        while filled < self.buf.len() {
            let n = self
                .reader
                .read(&mut self.buf[filled..])
                .await
                .map_err(|e| BlitError::UpstreamDecode(format!("frame pipe: {e}")))?;
            if n == 0 {
                if filled > 0 {
                    tracing::debug!(
                        received = filled,
                        expected = self.buf.len(),
                        "dropping truncated trailing frame"
                    );
                }
                return Ok(None);
            }
            filled += n;
        }

        RgbImage::from_rgb24(self.width, self.height, &self.buf)
            .map(Some)
            .ok_or_else(|| BlitError::UpstreamDecode("frame size mismatch".into()))
    }
}

// ── FfmpegDecoder ────────────────────────────────────────────────

/// Descriptor the child writes PCM to.
const AUDIO_FD: i32 = 3;

/// Source name that reads the media from our own stdin.
pub const STDIN_SOURCE: &str = "-";

/// Decodes through one `ffmpeg` process: RGB24 frames on its stdout, PCM
/// on descriptor 3.
///
/// A silent generator is opened next to the source, so inputs without a
/// sound track still deliver PCM. `-shortest` ends both streams with the
/// shorter of picture and sound.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: PathBuf,
    audio: bool,
}

impl FfmpegDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            audio: true,
        }
    }

    /// Decode pictures only. The session's PCM stream is then empty.
    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    fn arguments(&self, request: &DecodeRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            if request.debug { "info" } else { "error" }.into(),
        ];
        if request.realtime {
            args.push("-re".into());
        }
        let input = if request.source == STDIN_SOURCE {
            "pipe:0"
        } else {
            request.source.as_str()
        };
        args.extend(["-i".into(), input.into()]);
        if self.audio {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!("anullsrc=r={}:cl=mono", request.sample_rate),
            ]);
        }

        args.extend([
            "-map".into(),
            "0:v:0".into(),
            "-vf".into(),
            format!("scale={}:{}", request.width, request.height),
            "-r".into(),
            request.frame_rate.to_string(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-c:v".into(),
            "rawvideo".into(),
        ]);

        if !self.audio {
            args.extend(["-an", "-f", "rawvideo", "pipe:1"].map(String::from));
            return args;
        }

        // The source track, when present, is the first audio stream of
        // the output; the generator is the fallback.
        args.extend([
            "-map".into(),
            "0:a:0?".into(),
            "-map".into(),
            "1:a:0".into(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            request.sample_rate.to_string(),
            "-af".into(),
            "lowpass=f=10000".into(),
            "-c:a".into(),
            "pcm_s8".into(),
            "-shortest".into(),
            "-f".into(),
            "tee".into(),
            format!(
                "[f=rawvideo:select=v]pipe:1|[f=s8:select=\\'a:0\\']pipe:{AUDIO_FD}"
            ),
        ]);
        args
    }

    fn command(&self, request: &DecodeRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.arguments(request));
        cmd.stdin(if request.source == STDIN_SOURCE {
            Stdio::inherit()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(if request.debug { Stdio::piped() } else { Stdio::null() })
        .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MediaDecoder for FfmpegDecoder {
    #[cfg(unix)]
    fn spawn(&self, request: &DecodeRequest) -> Result<DecodeSession, BlitError> {
        use command_fds::{CommandFdExt, FdMapping};
        use std::os::fd::OwnedFd;
        use tokio::net::unix::pipe;

        let mut cmd = self.command(request);

        let audio_pipe = if self.audio {
            let (reader, writer) = std::io::pipe()?;
            cmd.fd_mappings(vec![FdMapping {
                parent_fd: OwnedFd::from(writer),
                child_fd: AUDIO_FD,
            }])
            .map_err(|e| BlitError::UpstreamDecode(format!("audio descriptor: {e}")))?;
            Some(reader)
        } else {
            None
        };

        // Consumes `cmd`, closing our copy of the audio write end.
        let mut child = spawn_child(cmd, &self.program)?;
        let frames = child
            .stdout
            .take()
            .ok_or_else(|| BlitError::UpstreamDecode("decoder has no stdout".into()))?;
        forward_stderr(child.stderr.take());

        let audio: ByteStream = match audio_pipe {
            Some(reader) => Box::new(pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?),
            None => Box::new(tokio::io::empty()),
        };

        tracing::debug!(
            source = %request.source,
            width = request.width,
            height = request.height,
            fps = request.frame_rate,
            audio = self.audio,
            "ffmpeg session started"
        );

        Ok(DecodeSession {
            frames: Box::new(frames),
            audio,
            sample_rate: request.sample_rate,
            process: Box::new(FfmpegProcess { child }),
        })
    }

    #[cfg(not(unix))]
    fn spawn(&self, _request: &DecodeRequest) -> Result<DecodeSession, BlitError> {
        Err(BlitError::Configuration(
            "ffmpeg decoding needs a unix host for its audio descriptor".into(),
        ))
    }
}

fn spawn_child(mut cmd: Command, program: &Path) -> Result<Child, BlitError> {
    cmd.spawn().map_err(|e| {
        BlitError::UpstreamDecode(format!("failed to start decoder {}: {e}", program.display()))
    })
}

fn forward_stderr(stderr: Option<ChildStderr>) {
    let Some(stderr) = stderr else { return };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "ffmpeg", "{line}");
        }
    });
}

/// A running ffmpeg. `kill_on_drop` is set, so dropping this terminates it.
pub struct FfmpegProcess {
    child: Child,
}

fn check_exit(status: ExitStatus) -> Result<(), BlitError> {
    if status.success() {
        Ok(())
    } else {
        Err(BlitError::UpstreamDecode(format!("decoder exited with {status}")))
    }
}

#[async_trait]
impl DecodeProcess for FfmpegProcess {
    async fn wait(&mut self) -> Result<(), BlitError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| BlitError::UpstreamDecode(format!("decoder: {e}")))?;
        check_exit(status)
    }

    async fn kill(&mut self) -> Result<(), BlitError> {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to kill decoder");
        }
        tracing::debug!("ffmpeg session killed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DecodeRequest {
        DecodeRequest {
            source: "input.mkv".into(),
            width: 64,
            height: 48,
            frame_rate: 10,
            sample_rate: 48_000,
            realtime: true,
            debug: false,
        }
    }

    #[tokio::test]
    async fn reads_whole_frames_and_drops_truncated_tail() {
        let mut bytes = vec![7u8; 2 * 3 * 3 * 2];
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let mut reader = FrameReader::new(&bytes[..], 2, 3);

        for _ in 0..2 {
            let frame = reader.next_frame().await.unwrap().unwrap();
            assert_eq!((frame.width, frame.height), (2, 3));
            assert!(frame.pixels.iter().all(|p| p.r == 7));
        }
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frames_assemble_across_short_reads() {
        let pipe = tokio_test::io::Builder::new()
            .read(&[1, 1, 1, 2, 2])
            .read(&[2, 3, 3, 3, 4, 4, 4])
            .read(&[5, 5, 5, 6, 6, 6])
            .build();
        let mut reader = FrameReader::new(pipe, 2, 3);

        let frame = reader.next_frame().await.unwrap().unwrap();
        let reds: Vec<u8> = frame.pixels.iter().map(|p| p.r).collect();
        assert_eq!(reds, vec![1, 2, 3, 4, 5, 6]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pipe_failure_is_upstream_error() {
        let pipe = tokio_test::io::Builder::new()
            .read(&[1, 2, 3])
            .read_error(std::io::Error::other("pipe reset"))
            .build();
        let mut reader = FrameReader::new(pipe, 2, 3);
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, BlitError::UpstreamDecode(_)));
    }

    #[tokio::test]
    async fn empty_stream_has_no_frames() {
        let mut reader = FrameReader::new(&[][..], 2, 3);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn video_is_raw_rgb_on_stdout() {
        let args = FfmpegDecoder::default().without_audio().arguments(&request());
        assert!(args.contains(&"-re".to_string()));
        assert!(args.contains(&"scale=64:48".to_string()));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
        assert!(!args.iter().any(|a| a.starts_with("anullsrc")));
        assert!(args.ends_with(&["-an", "-f", "rawvideo", "pipe:1"].map(String::from)));
    }

    #[test]
    fn audio_falls_back_to_silence_and_is_filtered() {
        let mut req = request();
        req.realtime = false;
        let args = FfmpegDecoder::default().arguments(&req);
        assert!(!args.contains(&"-re".to_string()));
        assert!(args.windows(4).any(|w| w == ["-f", "lavfi", "-i", "anullsrc=r=48000:cl=mono"]));
        assert!(args.windows(4).any(|w| w == ["-map", "0:a:0?", "-map", "1:a:0"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "48000"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "1"]));
        assert!(args.windows(2).any(|w| w == ["-af", "lowpass=f=10000"]));
        assert!(args.contains(&"-shortest".to_string()));

        let outputs = args.last().unwrap();
        assert!(outputs.starts_with("[f=rawvideo:select=v]pipe:1|"));
        assert!(outputs.ends_with("]pipe:3"));
    }

    #[test]
    fn stdin_source_reads_pipe_zero() {
        let mut req = request();
        req.source = STDIN_SOURCE.into();
        let decoder = FfmpegDecoder::default();
        let args = decoder.arguments(&req);
        assert!(args.windows(2).any(|w| w == ["-i", "pipe:0"]));

        let cmd = decoder.command(&req);
        let std_args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(std_args.len(), args.len());
    }

    #[tokio::test]
    async fn missing_program_is_upstream_error() {
        let decoder = FfmpegDecoder::new("/nonexistent/ffmpeg-for-blitcast-tests");
        let result = decoder.spawn(&request());
        assert!(matches!(result, Err(BlitError::UpstreamDecode(_))));
    }
}
