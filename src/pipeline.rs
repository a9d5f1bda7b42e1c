use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};

use tracing::info;

use crate::{
    buffer::PixelBuffer,
    color::ColorTransform,
    config::{OverlayProfile, ResolvedConfig},
    encode::{EncodeReport, FrameStreamEncoder, Timecode, build_encoder_args},
    error::{DailiesError, DailiesResult},
    geometry::{self, GeometrySpec},
    movie_log::RenderLog,
    overlay::{OverlayCompositor, render_cropmask},
    sequence::{FrameSequence, resolve_sequences},
};

/// Run-level options gathered from the command line.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    /// Override for the configured movie location. Relative paths resolve
    /// against the sequence directory.
    pub output_override: Option<PathBuf>,
    /// Text element contents keyed by element name.
    pub texts: BTreeMap<String, String>,
    /// Persist frames as numbered stills instead of invoking the encoder.
    pub debug: bool,
}

/// Orchestrates one run: sequence resolution, then one movie per sequence.
///
/// Each movie gets its own explicit context (output paths, log, overlay
/// state, encoder session); nothing is shared across movies.
pub struct DailyPipeline {
    config: ResolvedConfig,
    options: PipelineOptions,
}

/// Per-movie mutable state, created fresh for every sequence.
struct MovieContext {
    movie_path: PathBuf,
    movie_basename: String,
    output_dir: PathBuf,
    log: RenderLog,
    texts: BTreeMap<String, String>,
    color: Option<ColorTransform>,
    geometry: GeometrySpec,
}

impl DailyPipeline {
    pub fn new(config: ResolvedConfig, options: PipelineOptions) -> Self {
        Self { config, options }
    }

    /// Resolve sequences from the input path and render one movie per
    /// sequence. Resolving nothing is fatal.
    pub fn run(&self, input: &Path) -> DailiesResult<Vec<PathBuf>> {
        let sequences = resolve_sequences(input, &self.config.globals.input_image_formats)?;
        if sequences.is_empty() {
            return Err(DailiesError::sequence(format!(
                "no image sequences found under '{}'",
                input.display()
            )));
        }
        info!(count = sequences.len(), "resolved sequences");
        let mut movies = Vec::with_capacity(sequences.len());
        for sequence in &sequences {
            movies.push(self.render_movie(sequence)?);
        }
        Ok(movies)
    }

    /// Movie file name: `<base>[_<codec>].<ext>`.
    fn movie_basename(&self, sequence: &FrameSequence) -> String {
        let base = sequence.base_name();
        if self.config.globals.movie_append_codec && !self.config.codec.name.is_empty() {
            format!("{base}_{}", self.config.codec.name)
        } else {
            base.to_string()
        }
    }

    fn output_dir(&self, sequence: &FrameSequence) -> PathBuf {
        let location = self
            .options
            .output_override
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.config.globals.movie_location));
        if location.is_relative() {
            sequence.directory.join(location)
        } else {
            location
        }
    }

    fn prepare(&self, sequence: &FrameSequence) -> DailiesResult<MovieContext> {
        let output_dir = self.output_dir(sequence);
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            DailiesError::config(format!(
                "create output directory '{}': {e}",
                output_dir.display()
            ))
        })?;

        let movie_basename = self.movie_basename(sequence);
        let movie_path =
            output_dir.join(format!("{movie_basename}.{}", self.config.globals.movie_ext));
        let log_path = movie_path.with_extension("log");
        let mut log = RenderLog::create(&log_path)?;
        log.info(format!(
            "rendering sequence {} ({} frames, {}-{}) to {}",
            sequence.pattern(),
            sequence.len(),
            sequence.start(),
            sequence.end(),
            movie_path.display()
        ));

        // Target resolution: unset dimensions derive from the first frame.
        let globals = &self.config.globals;
        let (width, height) = match (globals.width, globals.height) {
            (Some(width), Some(height)) => (width, height),
            (width, height) => {
                let native = image::image_dimensions(&sequence.first().path).map_err(|e| {
                    DailiesError::image(format!(
                        "read dimensions of '{}': {e}",
                        sequence.first().path.display()
                    ))
                })?;
                geometry::derive_target_size(native, width, height)?
            }
        };
        log.info(format!("output resolution {width}x{height}"));

        let geometry = GeometrySpec {
            width,
            height,
            fit: globals.fit,
            filter: globals.filter.as_deref().and_then(geometry::parse_filter),
            crop_width: globals.cropwidth.clone(),
            crop_height: globals.cropheight.clone(),
        };

        let color = ColorTransform::from_config(
            self.config.color_transform.as_ref(),
            globals.ocioconfig.as_deref(),
        );
        match &color {
            Some(t) => log.info(format!(
                "color transform {} -> {} ({})",
                t.src,
                t.dst,
                t.config_path.display()
            )),
            None => log.warn("no color transform will be applied"),
        }

        // Element texts: command-line values plus a default datetime stamp.
        let mut texts = self.options.texts.clone();
        if !texts.contains_key("datetime") {
            let format = self
                .config
                .overlay
                .text_elements
                .get("datetime")
                .and_then(|e| e.datetime_format.as_deref());
            let now = chrono::Local::now();
            let stamp = match format {
                Some(fmt) => now.format(fmt).to_string(),
                None => now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            };
            texts.insert("datetime".to_string(), stamp);
        }

        Ok(MovieContext {
            movie_path,
            movie_basename,
            output_dir,
            log,
            texts,
            color,
            geometry,
        })
    }

    /// Render one sequence end-to-end: per frame, load, strip alpha, color
    /// transform, geometric normalization, overlay compositing, then one
    /// ordered write to the encoder stream; close the stream once after the
    /// last frame.
    pub fn render_movie(&self, sequence: &FrameSequence) -> DailiesResult<PathBuf> {
        let start = Instant::now();
        let mut ctx = self.prepare(sequence)?;
        let mut compositor = OverlayCompositor::new();

        // Overlay layers and the encoder session are created once the first
        // processed frame fixes the real output dimensions (with fit
        // disabled they can differ from the configured target height).
        let mut encoder: Option<FrameStreamEncoder> = None;
        let mut static_layer: Option<PixelBuffer> = None;
        let mut cropmask: Option<PixelBuffer> = None;

        let total = sequence.len();
        for (i, frame) in sequence.frames().iter().enumerate() {
            ctx.log.info(format!(
                "processing frame {:04}: \t{:04} of {:04}",
                frame.number,
                i + 1,
                total
            ));
            let frame_start = Instant::now();

            let mut buf = match self.process_frame(&ctx, &frame.path) {
                Ok(buf) => buf,
                Err(e) => {
                    ctx.log.error(format!(
                        "frame {} ({}): {e}; skipping frame",
                        frame.number,
                        frame.path.display()
                    ));
                    continue;
                }
            };

            if encoder.is_none() {
                let out_width = buf.canvas_width();
                let out_height = buf.canvas_height();
                static_layer = Some(compositor.build_static_layer(
                    &self.config.overlay,
                    &ctx.texts,
                    out_width,
                    out_height,
                )?);
                if let Some(mask_config) = &self.config.overlay.cropmask {
                    cropmask = render_cropmask(mask_config, out_width, out_height)?;
                }
                encoder = Some(self.open_encoder(&ctx, sequence, out_width, out_height)?);
            }

            // A failed write means the encoder is gone; close and reap it so
            // its exit status and stderr still land in the movie log before
            // the error propagates.
            if let Err(e) = Self::composite_and_write(
                &self.config.overlay,
                &mut compositor,
                cropmask.as_ref(),
                static_layer.as_ref(),
                encoder.as_mut(),
                &mut buf,
                frame.number,
            ) {
                ctx.log
                    .error(format!("frame {}: {e}; aborting movie", frame.number));
                if let Some(session) = encoder.take() {
                    if let Ok(report) = session.finish() {
                        let _ = self.finish_log(&mut ctx, &report);
                    }
                }
                return Err(e);
            }

            ctx.log.info(format!(
                "frame processing time: {:.3}s",
                frame_start.elapsed().as_secs_f64()
            ));
        }

        let Some(encoder) = encoder else {
            return Err(DailiesError::image(format!(
                "no frames of {} could be processed",
                sequence.pattern()
            )));
        };
        let report = encoder.finish()?;
        self.finish_log(&mut ctx, &report)?;

        ctx.log.info(format!(
            "total processing time: {:.3}s ({} frames)",
            start.elapsed().as_secs_f64(),
            report.frames_written
        ));
        Ok(ctx.movie_path)
    }

    /// Overlay compositing and the ordered encoder write for one frame.
    fn composite_and_write(
        overlay: &OverlayProfile,
        compositor: &mut OverlayCompositor,
        cropmask: Option<&PixelBuffer>,
        static_layer: Option<&PixelBuffer>,
        encoder: Option<&mut FrameStreamEncoder>,
        buf: &mut PixelBuffer,
        frame_number: u64,
    ) -> DailiesResult<()> {
        if let Some(mask) = cropmask {
            buf.composite_over(mask)?;
        }
        if let Some(layer) = static_layer {
            buf.composite_over(layer)?;
        }
        compositor.render_frame_counter(overlay, frame_number, buf);
        if let Some(session) = encoder {
            session.write_frame(buf, frame_number)?;
        }
        Ok(())
    }

    /// Color and geometry for one frame; overlays are composited by the
    /// caller.
    fn process_frame(&self, ctx: &MovieContext, path: &Path) -> DailiesResult<PixelBuffer> {
        let mut buf = PixelBuffer::load(path)?.drop_alpha();
        if let Some(color) = &ctx.color {
            color.apply(&mut buf)?;
        }
        geometry::normalize(&buf, &ctx.geometry)
    }

    fn open_encoder(
        &self,
        ctx: &MovieContext,
        sequence: &FrameSequence,
        width: u32,
        height: u32,
    ) -> DailiesResult<FrameStreamEncoder> {
        if self.options.debug {
            info!(
                dir = %ctx.output_dir.display(),
                base = %ctx.movie_basename,
                "debug mode: writing numbered stills instead of invoking the encoder"
            );
            return Ok(FrameStreamEncoder::debug_stills(
                &self.config.codec,
                width,
                height,
                &ctx.output_dir,
                &ctx.movie_basename,
            ));
        }
        let timecode = Timecode::from_frame(sequence.start(), self.config.globals.framerate);
        let args = build_encoder_args(
            &self.config.codec,
            width,
            height,
            self.config.globals.framerate,
            timecode,
            &ctx.movie_path,
        );
        let program = self
            .config
            .globals
            .ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        FrameStreamEncoder::spawn(&program, &self.config.codec, width, height, &args)
    }

    fn finish_log(&self, ctx: &mut MovieContext, report: &EncodeReport) -> DailiesResult<()> {
        if !report.stdout.is_empty() {
            ctx.log
                .info(format!("encoder stdout:\n{}", report.stdout.trim_end()));
        }
        if !report.stderr.is_empty() {
            ctx.log
                .info(format!("encoder stderr:\n{}", report.stderr.trim_end()));
        }
        if !report.success {
            ctx.log.error("encoder exited with a non-zero status");
            return Err(DailiesError::encode(format!(
                "encoder failed for '{}'",
                ctx.movie_path.display()
            )));
        }
        Ok(())
    }
}

/// Parse `-t "artist: Jed Smith | comment: first pass"` into element texts.
pub fn parse_text_arg(arg: &str) -> DailiesResult<BTreeMap<String, String>> {
    let mut texts = BTreeMap::new();
    for part in arg.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once(':').ok_or_else(|| {
            DailiesError::config(format!("text element '{part}' is not 'key: value'"))
        })?;
        texts.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(texts)
}
