use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::{buffer::PixelBuffer, error::DailiesResult};

/// A named source → destination colorspace conversion bound to a color
/// configuration file.
///
/// The conversion is a pure function over the buffer's RGB samples; channel
/// count is never changed. An unknown colorspace name degrades to a logged
/// pass-through rather than a partial application.
#[derive(Clone, Debug)]
pub struct ColorTransform {
    pub src: String,
    pub dst: String,
    pub config_path: PathBuf,
}

/// Resolve the color config path: the configured value wins, then the `OCIO`
/// environment variable. `None` when neither points at an existing file,
/// which disables the transform for the run.
pub fn resolve_color_config(configured: Option<&Path>) -> Option<PathBuf> {
    let candidate = configured
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("OCIO").map(PathBuf::from))?;
    if candidate.is_file() {
        Some(candidate)
    } else {
        warn!(
            path = %candidate.display(),
            "color config does not exist; no color transform will be applied"
        );
        None
    }
}

impl ColorTransform {
    /// Build a transform if both a colorspace pair and a resolvable config
    /// path are available.
    pub fn from_config(
        spaces: Option<&(String, String)>,
        config_path: Option<&Path>,
    ) -> Option<Self> {
        let (src, dst) = spaces?;
        let config_path = resolve_color_config(config_path)?;
        Some(Self {
            src: src.clone(),
            dst: dst.clone(),
            config_path,
        })
    }

    /// Apply the conversion in place. On an unknown colorspace name the
    /// buffer passes through unmodified.
    pub fn apply(&self, buf: &mut PixelBuffer) -> DailiesResult<()> {
        let (Some(to_linear), Some(from_linear)) =
            (transfer_to_linear(&self.src), transfer_from_linear(&self.dst))
        else {
            error!(
                src = %self.src,
                dst = %self.dst,
                config = %self.config_path.display(),
                "color convert failed: colorspace not found in config"
            );
            return Ok(());
        };
        debug!(src = %self.src, dst = %self.dst, "applying color transform");
        let max = f32::from(u16::MAX);
        buf.map_samples(0..3, |v| {
            let x = f32::from(v) / max;
            let y = from_linear(to_linear(x));
            (y.clamp(0.0, 1.0) * max).round() as u16
        });
        Ok(())
    }
}

type Transfer = fn(f32) -> f32;

fn transfer_to_linear(name: &str) -> Option<Transfer> {
    match normalize(name).as_str() {
        "linear" | "scenelinear" => Some(identity),
        "srgb" => Some(srgb_to_linear),
        "rec709" => Some(rec709_to_linear),
        "gamma22" => Some(gamma22_to_linear),
        "gamma24" => Some(gamma24_to_linear),
        "cineon" => Some(cineon_to_linear),
        _ => None,
    }
}

fn transfer_from_linear(name: &str) -> Option<Transfer> {
    match normalize(name).as_str() {
        "linear" | "scenelinear" => Some(identity),
        "srgb" => Some(linear_to_srgb),
        "rec709" => Some(linear_to_rec709),
        "gamma22" => Some(linear_to_gamma22),
        "gamma24" => Some(linear_to_gamma24),
        "cineon" => Some(linear_to_cineon),
        _ => None,
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn identity(x: f32) -> f32 {
    x
}

fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.003_130_8 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

fn rec709_to_linear(x: f32) -> f32 {
    if x < 0.081 {
        x / 4.5
    } else {
        ((x + 0.099) / 1.099).powf(1.0 / 0.45)
    }
}

fn linear_to_rec709(x: f32) -> f32 {
    if x < 0.018 {
        x * 4.5
    } else {
        1.099 * x.powf(0.45) - 0.099
    }
}

fn gamma22_to_linear(x: f32) -> f32 {
    x.max(0.0).powf(2.2)
}

fn linear_to_gamma22(x: f32) -> f32 {
    x.max(0.0).powf(1.0 / 2.2)
}

fn gamma24_to_linear(x: f32) -> f32 {
    x.max(0.0).powf(2.4)
}

fn linear_to_gamma24(x: f32) -> f32 {
    x.max(0.0).powf(1.0 / 2.4)
}

// Cineon log per the Kodak 10-bit printing density curve, normalized to [0,1].
const CINEON_BLACK: f32 = 95.0;
const CINEON_WHITE: f32 = 685.0;

fn cineon_to_linear(x: f32) -> f32 {
    let code = x * 1023.0;
    let offset = 10f32.powf((CINEON_BLACK - CINEON_WHITE) / 300.0);
    (10f32.powf((code - CINEON_WHITE) / 300.0) - offset) / (1.0 - offset)
}

fn linear_to_cineon(x: f32) -> f32 {
    let offset = 10f32.powf((CINEON_BLACK - CINEON_WHITE) / 300.0);
    let code = CINEON_WHITE + 300.0 * (x * (1.0 - offset) + offset).max(1e-10).log10();
    (code / 1023.0).clamp(0.0, 1.0)
}
