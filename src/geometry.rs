use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::{
    buffer::{PixelBuffer, Roi},
    config::CropAmount,
    error::{DailiesError, DailiesResult},
};

/// Resolved geometric normalization parameters for one movie.
#[derive(Clone, Debug)]
pub struct GeometrySpec {
    pub width: u32,
    pub height: u32,
    pub fit: bool,
    pub filter: Option<FilterType>,
    pub crop_width: Option<CropAmount>,
    pub crop_height: Option<CropAmount>,
}

/// Derive the target resolution from the first frame's native size.
///
/// An unset width falls back to the native width; an unset height is derived
/// from the (possibly fallen-back) width preserving the input aspect ratio.
pub fn derive_target_size(
    native: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> DailiesResult<(u32, u32)> {
    let (iw, ih) = native;
    if ih == 0 {
        return Err(DailiesError::image("input height is zero"));
    }
    let iar = f64::from(iw) / f64::from(ih);
    let width = width.unwrap_or(iw);
    let height = match height {
        Some(h) => h,
        None => (f64::from(width) / iar).round() as u32,
    };
    Ok((width, height))
}

/// Map a resampling filter name onto the processing library's filters.
/// Unknown names log a warning and fall back to the library default.
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.to_ascii_lowercase().as_str() {
        "nearest" | "box" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmullrom" | "cubic" | "bicubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        other => {
            warn!(filter = other, "unknown resize filter; using default");
            None
        }
    }
}

/// Normalize a frame to the target resolution: crop, aspect-preserving
/// resize, then vertical fit.
///
/// Operation order is fixed. The crop narrows the region of interest
/// symmetrically and re-baselines the canvas so the resize sees the cropped
/// extent as the whole frame. The resize always preserves the (post-crop)
/// aspect ratio; forcing the exact target height is the fit step's job.
/// With `fit` disabled a non-matching height passes through untouched.
pub fn normalize(buf: &PixelBuffer, spec: &GeometrySpec) -> DailiesResult<PixelBuffer> {
    let mut buf = buf.rebase();
    let mut iwidth = buf.canvas_width();
    let mut iheight = buf.canvas_height();
    if iheight == 0 {
        return Err(DailiesError::image("input height is zero"));
    }
    let mut iar = f64::from(iwidth) / f64::from(iheight);

    // 1. Symmetric edge crop, then re-baseline.
    if spec.crop_width.is_some() || spec.crop_height.is_some() {
        let crop_w = match &spec.crop_width {
            Some(amount) => amount.resolve(iwidth)?,
            None => 0,
        };
        let crop_h = match &spec.crop_height {
            Some(amount) => amount.resolve(iheight)?,
            None => 0,
        };
        if crop_w >= iwidth || crop_h >= iheight {
            return Err(DailiesError::image(format!(
                "crop {crop_w}x{crop_h} consumes the whole {iwidth}x{iheight} frame"
            )));
        }
        debug!(crop_w, crop_h, "cropping frame edges");
        buf.crop(Roi {
            x: crop_w / 2,
            y: crop_h / 2,
            width: iwidth - crop_w,
            height: iheight - crop_h,
        })?;
        buf = buf.rebase();
        iwidth = buf.canvas_width();
        iheight = buf.canvas_height();
        iar = f64::from(iwidth) / f64::from(iheight);
        debug!(iwidth, iheight, iar, "post-crop input geometry");
    }

    // No-op when the post-crop frame already matches the target.
    if iwidth == spec.width && iheight == spec.height {
        return Ok(buf);
    }

    // 2. Aspect-preserving resize to the target width.
    let height_no_ar = if iwidth != spec.width {
        let height_no_ar = (f64::from(spec.width) / iar).round().max(1.0) as u32;
        info!(
            input = format!("{iwidth}x{iheight}"),
            output = format!("{}x{}", spec.width, height_no_ar),
            "resizing"
        );
        let resized = image::imageops::resize(
            &buf.to_rgb16(),
            spec.width,
            height_no_ar,
            spec.filter.unwrap_or(FilterType::Triangle),
        );
        buf = PixelBuffer::from_samples(spec.width, height_no_ar, 3, resized.into_raw())?;
        height_no_ar
    } else {
        iheight
    };

    // 3. Vertical fit: center-crop when too tall, center-pad when too short.
    if spec.fit && height_no_ar != spec.height {
        let height_diff = i64::from(spec.height) - i64::from(height_no_ar);
        debug!(height_diff, "fitting to target height");
        if height_diff < 0 {
            // Translate up by half the overshoot, then crop to the target box.
            let mut shifted = buf.translate(0, (height_diff / 2) as i32);
            shifted.crop(Roi::full(spec.width, spec.height))?;
            buf = shifted.rebase();
        } else {
            // Pad onto a target-sized canvas, content centered.
            let mut canvas = PixelBuffer::new(spec.width, spec.height, buf.channels())?;
            let dy = (height_diff / 2) as u32;
            for y in 0..height_no_ar.min(spec.height) {
                for x in 0..spec.width {
                    for c in 0..buf.channels() {
                        canvas.put(x, y + dy, c, buf.get(x, y, c));
                    }
                }
            }
            buf = canvas;
        }
    }

    Ok(buf)
}
