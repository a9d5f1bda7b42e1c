use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::error::{DailiesError, DailiesResult};

pub const DEFAULT_CONFIG_FILE: &str = "dailies-config.yaml";
pub const DEFAULT_CODEC: &str = "avchq";
pub const DEFAULT_PROFILE: &str = "delivery";

/// Top-level configuration file layout.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    pub globals: Globals,
    #[serde(default)]
    pub output_codecs: BTreeMap<String, CodecConfig>,
    #[serde(default)]
    pub ocio_profiles: BTreeMap<String, OcioProfile>,
    #[serde(default)]
    pub dailies_profiles: BTreeMap<String, OverlayProfile>,
}

/// Global defaults; codec profiles may override the same-named fields.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Globals {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub framerate: f64,
    #[serde(default)]
    pub fit: bool,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub cropwidth: Option<CropAmount>,
    #[serde(default)]
    pub cropheight: Option<CropAmount>,
    #[serde(default)]
    pub input_image_formats: Vec<String>,
    pub movie_ext: String,
    pub movie_location: String,
    #[serde(default)]
    pub movie_append_codec: bool,
    #[serde(default)]
    pub output_codec: Option<String>,
    /// Encoder binary to invoke; defaults to `ffmpeg` on `PATH`.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub ocioconfig: Option<PathBuf>,
    #[serde(default)]
    pub ocio_default_transform: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

/// A crop extent: absolute pixels or a percentage string like `"10%"`.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum CropAmount {
    Pixels(u32),
    Text(String),
}

impl CropAmount {
    /// Resolve to pixels against one input dimension.
    pub fn resolve(&self, dimension: u32) -> DailiesResult<u32> {
        match self {
            Self::Pixels(px) => Ok(*px),
            Self::Text(s) => {
                let s = s.trim();
                if let Some(pct) = s.strip_suffix('%') {
                    let pct: f64 = pct.trim().parse().map_err(|_| {
                        DailiesError::config(format!("invalid crop percentage '{s}'"))
                    })?;
                    Ok((pct / 100.0 * f64::from(dimension)) as u32)
                } else {
                    s.parse()
                        .map_err(|_| DailiesError::config(format!("invalid crop amount '{s}'")))
                }
            }
        }
    }
}

/// One named encoder profile. Optional parameters are emitted in the encoder
/// argument list only when present.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct CodecConfig {
    pub name: String,
    #[serde(default = "default_bitdepth")]
    pub bitdepth: u32,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub qscale: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub keyint: Option<String>,
    #[serde(default)]
    pub bframes: Option<String>,
    #[serde(default)]
    pub tune: Option<String>,
    #[serde(default)]
    pub crf: Option<String>,
    #[serde(default)]
    pub pix_fmt: Option<String>,
    #[serde(default)]
    pub vf: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub metadata_s: Option<String>,
    #[serde(default)]
    pub bitrate: Option<String>,
    // Same-named global overrides.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub framerate: Option<f64>,
    #[serde(default)]
    pub movie_ext: Option<String>,
    #[serde(default)]
    pub fit: Option<bool>,
}

fn default_bitdepth() -> u32 {
    8
}

/// A named source/destination colorspace pair.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct OcioProfile {
    pub ociocolorconvert: Vec<String>,
}

impl OcioProfile {
    pub fn spaces(&self) -> DailiesResult<(&str, &str)> {
        match self.ociocolorconvert.as_slice() {
            [src, dst] => Ok((src, dst)),
            other => Err(DailiesError::config(format!(
                "ociocolorconvert must list [source, destination], got {} entries",
                other.len()
            ))),
        }
    }
}

/// Overlay profile: shared element defaults plus the element map.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct OverlayProfile {
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_color: Option<[f64; 4]>,
    #[serde(default)]
    pub justify: Option<String>,
    #[serde(default)]
    pub leading: Option<f64>,
    #[serde(default)]
    pub text_elements: BTreeMap<String, TextElement>,
    #[serde(default)]
    pub cropmask: Option<CropmaskConfig>,
}

/// One overlay element. Unset fields inherit the profile's shared defaults
/// (shallow inheritance: only unset fields inherit).
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct TextElement {
    #[serde(default)]
    pub font: Option<PathBuf>,
    /// Size as a fraction of the frame width.
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_color: Option<[f64; 4]>,
    /// Fractional `[x0, y0, x1, y1]` in a lower-left-origin system.
    #[serde(default, rename = "box")]
    pub bounds: Option<[f64; 4]>,
    #[serde(default)]
    pub justify: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub leading: Option<f64>,
    /// Zero-padding width for the frame counter element.
    #[serde(default)]
    pub padding: Option<usize>,
    /// strftime format for the datetime element.
    #[serde(default)]
    pub datetime_format: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct CropmaskConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub aspect: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
}

/// Everything one movie render needs, resolved once at startup.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub globals: Globals,
    pub codec: CodecConfig,
    pub overlay: OverlayProfile,
    /// `(source, destination)` colorspace names, when a transform applies.
    pub color_transform: Option<(String, String)>,
}

impl Config {
    /// Locate the config file: explicit path, else `DAILIES_CONFIG`, else
    /// `dailies-config.yaml` in the working directory.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(env) = std::env::var("DAILIES_CONFIG") {
            if !env.is_empty() {
                return PathBuf::from(env);
            }
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> DailiesResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DailiesError::config(format!("read config '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> DailiesResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| DailiesError::config(format!("parse config: {e}")))
    }

    /// Resolve the per-run configuration from profile names.
    ///
    /// Unknown codec and overlay profile names abort the run. A requested
    /// color transform that is missing from the config degrades to the
    /// configured default transform, then to no transform.
    pub fn resolve(
        &self,
        codec_name: Option<&str>,
        profile_name: Option<&str>,
        transform_name: Option<&str>,
    ) -> DailiesResult<ResolvedConfig> {
        let codec_name = codec_name
            .map(str::to_string)
            .or_else(|| self.globals.output_codec.clone())
            .unwrap_or_else(|| DEFAULT_CODEC.to_string());
        let codec = self.output_codecs.get(&codec_name).ok_or_else(|| {
            DailiesError::config(format!(
                "unknown codec '{codec_name}'; available: {}",
                self.output_codecs
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let profile_name = profile_name.unwrap_or(DEFAULT_PROFILE);
        let overlay = self.dailies_profiles.get(profile_name).ok_or_else(|| {
            DailiesError::config(format!(
                "unknown dailies profile '{profile_name}'; available: {}",
                self.dailies_profiles
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let color_transform = self.resolve_color_transform(transform_name)?;

        // Codec values override the same-named globals.
        let mut globals = self.globals.clone();
        if let Some(width) = codec.width {
            globals.width = Some(width);
        }
        if let Some(height) = codec.height {
            globals.height = Some(height);
        }
        if let Some(framerate) = codec.framerate {
            globals.framerate = framerate;
        }
        if let Some(movie_ext) = &codec.movie_ext {
            globals.movie_ext = movie_ext.clone();
        }
        if let Some(fit) = codec.fit {
            globals.fit = fit;
        }

        Ok(ResolvedConfig {
            globals,
            codec: codec.clone(),
            overlay: overlay.clone(),
            color_transform,
        })
    }

    fn resolve_color_transform(
        &self,
        requested: Option<&str>,
    ) -> DailiesResult<Option<(String, String)>> {
        let lookup = |name: &str| -> DailiesResult<Option<(String, String)>> {
            match self.ocio_profiles.get(name) {
                Some(profile) => {
                    let (src, dst) = profile.spaces()?;
                    info!(profile = name, src, dst, "using color transform");
                    Ok(Some((src.to_string(), dst.to_string())))
                }
                None => Ok(None),
            }
        };

        if let Some(name) = requested {
            if let Some(pair) = lookup(name)? {
                return Ok(Some(pair));
            }
            warn!(profile = name, "requested color transform not in config");
            if let Some(default) = &self.globals.ocio_default_transform {
                if let Some(pair) = lookup(default)? {
                    warn!(profile = %default, "falling back to default color transform");
                    return Ok(Some(pair));
                }
                warn!(profile = %default, "default color transform also not in config");
            }
            return Ok(None);
        }

        if let Some(default) = &self.globals.ocio_default_transform {
            if let Some(pair) = lookup(default)? {
                return Ok(Some(pair));
            }
            warn!(profile = %default, "default color transform not in config");
        }

        warn!("no color transform specified; none will be applied");
        Ok(None)
    }
}
