#![forbid(unsafe_code)]

pub mod buffer;
pub mod color;
pub mod config;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod movie_log;
pub mod overlay;
pub mod pipeline;
pub mod sequence;

pub use buffer::{BitDepth, PixelBuffer, Roi};
pub use color::ColorTransform;
pub use config::{CodecConfig, Config, CropAmount, Globals, OverlayProfile, ResolvedConfig};
pub use encode::{
    EncodeReport, FrameStreamEncoder, Timecode, build_encoder_args, pixel_format_for_bitdepth,
};
pub use error::{DailiesError, DailiesResult};
pub use geometry::{GeometrySpec, derive_target_size, normalize};
pub use movie_log::RenderLog;
pub use overlay::OverlayCompositor;
pub use pipeline::{DailyPipeline, PipelineOptions, parse_text_arg};
pub use sequence::{Frame, FrameSequence, resolve_sequences};
