use std::{
    fmt,
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    thread::JoinHandle,
};

use tracing::{debug, info};

use crate::{
    buffer::{BitDepth, PixelBuffer},
    config::CodecConfig,
    error::{DailiesError, DailiesResult},
};

/// Start timecode embedded in the movie so review players display the true
/// first frame number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timecode {
    hours: u64,
    minutes: u64,
    seconds: u64,
    frames: u64,
}

impl Timecode {
    /// Timecode of `frame` counted from `00:00:00:00` at the given rate.
    /// Fractional rates round to the nearest whole frame count per second.
    pub fn from_frame(frame: u64, framerate: f64) -> Self {
        let fps = framerate.round().max(1.0) as u64;
        let total_seconds = frame / fps;
        Self {
            hours: total_seconds / 3600,
            minutes: total_seconds / 60 % 60,
            seconds: total_seconds % 60,
            frames: frame % fps,
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Raw-video pixel format implied by a codec profile's bit depth.
pub fn pixel_format_for_bitdepth(bitdepth: u32) -> &'static str {
    if bitdepth >= 10 { "rgb48le" } else { "rgb24" }
}

/// Codecs that take a stream of still images on the pipe instead of raw
/// video; each frame is encoded as a JPEG before being written.
pub fn is_photo_codec(name: &str) -> bool {
    name == "mjpeg"
}

fn format_framerate(framerate: f64) -> String {
    if framerate.fract() == 0.0 {
        format!("{}", framerate as i64)
    } else {
        format!("{framerate}")
    }
}

/// Construct the encoder argument list for one movie.
///
/// The two input modes (still-image pipe for photo codecs, raw video
/// otherwise) and the order of the optional codec parameters match the
/// encoder's CLI contract exactly; each optional parameter appears only when
/// the profile sets it.
pub fn build_encoder_args(
    codec: &CodecConfig,
    width: u32,
    height: u32,
    framerate: f64,
    start_timecode: Timecode,
    out_path: &Path,
) -> Vec<String> {
    let rate = format_framerate(framerate);
    let mut args: Vec<String> = if is_photo_codec(&codec.name) {
        vec![
            "-y".into(),
            "-framerate".into(),
            rate.clone(),
            "-i".into(),
            "pipe:0".into(),
        ]
    } else {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "info".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            pixel_format_for_bitdepth(codec.bitdepth).into(),
            "-video_size".into(),
            format!("{width}x{height}"),
            "-framerate".into(),
            rate.clone(),
            "-i".into(),
            "pipe:0".into(),
        ]
    };

    args.push("-timecode".into());
    args.push(start_timecode.to_string());

    fn push_opt(args: &mut Vec<String>, flag: &str, value: &Option<String>) {
        if let Some(value) = value {
            args.push(flag.into());
            args.push(value.clone());
        }
    }
    push_opt(&mut args, "-c:v", &codec.codec);
    push_opt(&mut args, "-profile:v", &codec.profile);
    push_opt(&mut args, "-qscale:v", &codec.qscale);
    push_opt(&mut args, "-preset", &codec.preset);
    push_opt(&mut args, "-g", &codec.keyint);
    push_opt(&mut args, "-bf", &codec.bframes);
    push_opt(&mut args, "-tune", &codec.tune);
    push_opt(&mut args, "-crf", &codec.crf);
    push_opt(&mut args, "-pix_fmt", &codec.pix_fmt);
    args.push("-r".into());
    args.push(rate);
    push_opt(&mut args, "-vf", &codec.vf);
    push_opt(&mut args, "-vendor", &codec.vendor);
    push_opt(&mut args, "-metadata:s", &codec.metadata_s);
    push_opt(&mut args, "-b:v", &codec.bitrate);

    args.push(out_path.to_string_lossy().into_owned());
    args
}

enum FrameSink {
    /// The encoder subprocess, fed through its stdin pipe. Its stdout and
    /// stderr are drained continuously on reader threads; a full output pipe
    /// would stall the subprocess and block the frame writes.
    Process {
        child: Child,
        stdin: Option<ChildStdin>,
        stdout_reader: JoinHandle<Vec<u8>>,
        stderr_reader: JoinHandle<Vec<u8>>,
    },
    /// Debug artifact mode: one numbered JPEG per frame, no subprocess.
    Stills { directory: PathBuf, basename: String },
    /// In-memory recording of every write and the close, for pipeline
    /// verification without an encoder.
    Capture { frames: Vec<Vec<u8>>, closed: bool },
}

/// Outcome of one encoder session.
#[derive(Debug, Default)]
pub struct EncodeReport {
    pub frames_written: u64,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Populated by the capture sink only.
    pub captured_frames: Vec<Vec<u8>>,
}

/// Owns one encoder subprocess and the ordered frame-write protocol.
///
/// Exactly N frames are fed in increasing frame-number order, then the input
/// stream is closed once and the subprocess awaited. A session is never
/// reused across movies.
pub struct FrameStreamEncoder {
    width: u32,
    height: u32,
    depth: BitDepth,
    photo_codec: bool,
    frames_written: u64,
    last_frame: Option<u64>,
    sink: FrameSink,
}

impl FrameStreamEncoder {
    /// Spawn the encoder subprocess with the given argument list.
    ///
    /// The encoder logs progress to stderr for the whole run, so both output
    /// pipes are handed to reader threads immediately; reading them only
    /// after the last frame would deadlock once a pipe buffer fills.
    pub fn spawn(
        program: &Path,
        codec: &CodecConfig,
        width: u32,
        height: u32,
        args: &[String],
    ) -> DailiesResult<Self> {
        info!(program = %program.display(), args = %args.join(" "), "spawning encoder");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DailiesError::encode(format!(
                    "failed to spawn encoder '{}' (is it installed and on PATH?): {e}",
                    program.display()
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DailiesError::encode("failed to open encoder stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DailiesError::encode("failed to open encoder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DailiesError::encode("failed to open encoder stderr"))?;
        Ok(Self {
            width,
            height,
            depth: BitDepth::for_codec_bitdepth(codec.bitdepth),
            photo_codec: is_photo_codec(&codec.name),
            frames_written: 0,
            last_frame: None,
            sink: FrameSink::Process {
                child,
                stdin: Some(stdin),
                stdout_reader: drain_pipe(stdout),
                stderr_reader: drain_pipe(stderr),
            },
        })
    }

    /// Debug artifact mode: persist each frame as
    /// `<basename>.<5-digit frame>.jpg` instead of streaming.
    pub fn debug_stills(
        codec: &CodecConfig,
        width: u32,
        height: u32,
        directory: &Path,
        basename: &str,
    ) -> Self {
        Self {
            width,
            height,
            depth: BitDepth::for_codec_bitdepth(codec.bitdepth),
            photo_codec: is_photo_codec(&codec.name),
            frames_written: 0,
            last_frame: None,
            sink: FrameSink::Stills {
                directory: directory.to_path_buf(),
                basename: basename.to_string(),
            },
        }
    }

    /// In-memory sink recording every frame payload.
    pub fn capture(codec: &CodecConfig, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: BitDepth::for_codec_bitdepth(codec.bitdepth),
            photo_codec: is_photo_codec(&codec.name),
            frames_written: 0,
            last_frame: None,
            sink: FrameSink::Capture {
                frames: Vec::new(),
                closed: false,
            },
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Write one frame. Frames must arrive in strictly increasing
    /// frame-number order and match the session dimensions.
    pub fn write_frame(&mut self, buf: &PixelBuffer, frame_number: u64) -> DailiesResult<()> {
        let roi = buf.roi();
        if roi.width != self.width || roi.height != self.height {
            return Err(DailiesError::encode(format!(
                "frame {frame_number} size mismatch: got {}x{}, expected {}x{}",
                roi.width, roi.height, self.width, self.height
            )));
        }
        if let Some(last) = self.last_frame {
            if frame_number <= last {
                return Err(DailiesError::encode(format!(
                    "frame {frame_number} out of order (last written {last})"
                )));
            }
        }

        match &mut self.sink {
            FrameSink::Process { stdin, .. } => {
                let Some(stdin) = stdin.as_mut() else {
                    return Err(DailiesError::encode("encoder stream already closed"));
                };
                if self.photo_codec {
                    let payload = encode_jpeg(buf)?;
                    stdin.write_all(&payload).map_err(|e| {
                        DailiesError::encode(format!("write frame {frame_number}: {e}"))
                    })?;
                } else {
                    let payload = buf.to_bytes(self.depth);
                    stdin.write_all(&payload).map_err(|e| {
                        DailiesError::encode(format!("write frame {frame_number}: {e}"))
                    })?;
                }
            }
            FrameSink::Stills {
                directory,
                basename,
            } => {
                let path = directory.join(format!("{basename}.{frame_number:05}.jpg"));
                let payload = encode_jpeg(buf)?;
                std::fs::write(&path, payload).map_err(|e| {
                    DailiesError::encode(format!("write still '{}': {e}", path.display()))
                })?;
                debug!(path = %path.display(), "wrote debug still");
            }
            FrameSink::Capture { frames, closed } => {
                if *closed {
                    return Err(DailiesError::encode("encoder stream already closed"));
                }
                let payload = if self.photo_codec {
                    encode_jpeg(buf)?
                } else {
                    buf.to_bytes(self.depth)
                };
                frames.push(payload);
            }
        }

        self.last_frame = Some(frame_number);
        self.frames_written += 1;
        Ok(())
    }

    /// Close the input stream exactly once and await the subprocess,
    /// capturing its output for diagnostics.
    pub fn finish(self) -> DailiesResult<EncodeReport> {
        let frames_written = self.frames_written;
        match self.sink {
            FrameSink::Process {
                mut child,
                stdin,
                stdout_reader,
                stderr_reader,
            } => {
                drop(stdin);
                let stdout = stdout_reader.join().unwrap_or_default();
                let stderr = stderr_reader.join().unwrap_or_default();
                let status = child.wait().map_err(|e| {
                    DailiesError::encode(format!("failed to wait for encoder: {e}"))
                })?;
                Ok(EncodeReport {
                    frames_written,
                    success: status.success(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    captured_frames: Vec::new(),
                })
            }
            FrameSink::Stills { .. } => Ok(EncodeReport {
                frames_written,
                success: true,
                ..EncodeReport::default()
            }),
            FrameSink::Capture { frames, .. } => Ok(EncodeReport {
                frames_written,
                success: true,
                captured_frames: frames,
                ..EncodeReport::default()
            }),
        }
    }
}

fn drain_pipe(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut collected = Vec::new();
        let _ = pipe.read_to_end(&mut collected);
        collected
    })
}

/// Quality-90, full-chroma still frame for photo codecs and debug stills.
fn encode_jpeg(buf: &PixelBuffer) -> DailiesResult<Vec<u8>> {
    let rgb = buf.to_rgb8();
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90);
    rgb.write_with_encoder(encoder)
        .map_err(|e| DailiesError::encode(format!("jpeg encode: {e}")))?;
    Ok(out)
}
