use std::path::Path;

use crate::error::{DailiesError, DailiesResult};

/// Per-sample storage depth of the bytes handed to the encoder.
///
/// Processing always happens at 16 bits; 8-bit output is a truncation at
/// serialization time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Derive the serialization depth from a codec profile's declared bit
    /// depth. The split is the same one the raw-video pixel format uses, so
    /// sample width and pixel format can never disagree.
    pub fn for_codec_bitdepth(bits: u32) -> Self {
        if bits >= 10 { Self::Sixteen } else { Self::Eight }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }
}

/// The currently valid pixel sub-rectangle within a buffer's canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// An in-memory rectangular sample array with a region of interest distinct
/// from its canvas size.
///
/// Samples are `u16` in native scale (0..=65535). Crop narrows the region of
/// interest without touching sample storage; [`PixelBuffer::rebase`]
/// materializes the region as a new full canvas so downstream operations see
/// the cropped extent as the whole frame.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    roi: Roi,
    data: Vec<u16>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u8) -> DailiesResult<Self> {
        if width == 0 || height == 0 {
            return Err(DailiesError::image("buffer width/height must be non-zero"));
        }
        if channels != 3 && channels != 4 {
            return Err(DailiesError::image("buffer must have 3 or 4 channels"));
        }
        let len = width as usize * height as usize * channels as usize;
        Ok(Self {
            width,
            height,
            channels,
            roi: Roi::full(width, height),
            data: vec![0u16; len],
        })
    }

    pub fn from_samples(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u16>,
    ) -> DailiesResult<Self> {
        let mut buf = Self::new(width, height, channels)?;
        if data.len() != buf.data.len() {
            return Err(DailiesError::image(format!(
                "sample count {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                channels
            )));
        }
        buf.data = data;
        Ok(buf)
    }

    /// Decode an image file into a full-canvas buffer.
    ///
    /// EXR decodes through the float path and is clamped to [0,1] by the
    /// conversion; integer formats scale up losslessly.
    pub fn load(path: &Path) -> DailiesResult<Self> {
        let img = image::open(path)
            .map_err(|e| DailiesError::image(format!("open '{}': {e}", path.display())))?;
        let rgba = img.to_rgba16();
        let (width, height) = (rgba.width(), rgba.height());
        Self::from_samples(width, height, 4, rgba.into_raw())
    }

    pub fn canvas_width(&self) -> u32 {
        self.width
    }

    pub fn canvas_height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    fn sample_index(&self, x: u32, y: u32, c: u8) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize + c as usize
    }

    pub fn get(&self, x: u32, y: u32, c: u8) -> u16 {
        self.data[self.sample_index(x, y, c)]
    }

    pub fn put(&mut self, x: u32, y: u32, c: u8, v: u16) {
        let i = self.sample_index(x, y, c);
        self.data[i] = v;
    }

    /// Apply a pure function to every sample of the given channel range.
    pub fn map_samples(&mut self, channels: std::ops::Range<u8>, f: impl Fn(u16) -> u16) {
        let ch = self.channels as usize;
        for px in self.data.chunks_exact_mut(ch) {
            for c in channels.clone() {
                px[c as usize] = f(px[c as usize]);
            }
        }
    }

    /// Narrow the region of interest. Storage is untouched.
    pub fn crop(&mut self, roi: Roi) -> DailiesResult<()> {
        if roi.width == 0 || roi.height == 0 {
            return Err(DailiesError::image("crop region must be non-empty"));
        }
        if roi.x + roi.width > self.width || roi.y + roi.height > self.height {
            return Err(DailiesError::image(format!(
                "crop region {}x{}+{}+{} exceeds canvas {}x{}",
                roi.width, roi.height, roi.x, roi.y, self.width, self.height
            )));
        }
        self.roi = roi;
        Ok(())
    }

    /// Materialize the region of interest as a new full canvas.
    pub fn rebase(&self) -> Self {
        let roi = self.roi;
        let ch = self.channels as usize;
        let mut data = Vec::with_capacity(roi.width as usize * roi.height as usize * ch);
        for y in roi.y..roi.y + roi.height {
            let start = self.sample_index(roi.x, y, 0);
            let end = start + roi.width as usize * ch;
            data.extend_from_slice(&self.data[start..end]);
        }
        Self {
            width: roi.width,
            height: roi.height,
            channels: self.channels,
            roi: Roi::full(roi.width, roi.height),
            data,
        }
    }

    /// Reposition the canvas content by an integer offset, keeping the
    /// region of interest where it was. Pixels shifted in from outside are
    /// zero (black/transparent).
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        let mut out = Self {
            width: self.width,
            height: self.height,
            channels: self.channels,
            roi: self.roi,
            data: vec![0u16; self.data.len()],
        };
        let ch = self.channels as usize;
        for y in 0..self.height as i32 {
            let src_y = y - dy;
            if src_y < 0 || src_y >= self.height as i32 {
                continue;
            }
            for x in 0..self.width as i32 {
                let src_x = x - dx;
                if src_x < 0 || src_x >= self.width as i32 {
                    continue;
                }
                let src = self.sample_index(src_x as u32, src_y as u32, 0);
                let dst = out.sample_index(x as u32, y as u32, 0);
                out.data[dst..dst + ch].copy_from_slice(&self.data[src..src + ch]);
            }
        }
        out
    }

    /// Keep the first three channels, discarding alpha if present.
    pub fn drop_alpha(&self) -> Self {
        if self.channels == 3 {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.data.chunks_exact(4) {
            data.extend_from_slice(&px[..3]);
        }
        Self {
            width: self.width,
            height: self.height,
            channels: 3,
            roi: self.roi,
            data,
        }
    }

    /// Extend to RGBA with a fully opaque alpha channel.
    pub fn with_alpha(&self) -> Self {
        if self.channels == 4 {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.data.chunks_exact(3) {
            data.extend_from_slice(px);
            data.push(u16::MAX);
        }
        Self {
            width: self.width,
            height: self.height,
            channels: 4,
            roi: self.roi,
            data,
        }
    }

    /// Fill a canvas rectangle with a constant RGBA value.
    pub fn fill(&mut self, rgba: [u16; 4], roi: Roi) {
        let x1 = (roi.x + roi.width).min(self.width);
        let y1 = (roi.y + roi.height).min(self.height);
        let ch = self.channels.min(4);
        for y in roi.y..y1 {
            for x in roi.x..x1 {
                for c in 0..ch {
                    self.put(x, y, c, rgba[c as usize]);
                }
            }
        }
    }

    /// Straight-alpha "over" composite of `src` onto `self`.
    ///
    /// `src` must be RGBA with the same canvas size; `self` may be RGB or
    /// RGBA.
    pub fn composite_over(&mut self, src: &Self) -> DailiesResult<()> {
        if src.channels != 4 {
            return Err(DailiesError::image("composite source must be RGBA"));
        }
        if src.width != self.width || src.height != self.height {
            return Err(DailiesError::image(format!(
                "composite size mismatch: {}x{} over {}x{}",
                src.width, src.height, self.width, self.height
            )));
        }
        let max = f32::from(u16::MAX);
        for y in 0..self.height {
            for x in 0..self.width {
                let sa = f32::from(src.get(x, y, 3)) / max;
                if sa <= 0.0 {
                    continue;
                }
                for c in 0..3 {
                    let s = f32::from(src.get(x, y, c));
                    let d = f32::from(self.get(x, y, c));
                    let v = s * sa + d * (1.0 - sa);
                    self.put(x, y, c, v.round().clamp(0.0, max) as u16);
                }
                if self.channels == 4 {
                    let da = f32::from(self.get(x, y, 3)) / max;
                    let a = sa + da * (1.0 - sa);
                    self.put(x, y, 3, (a * max).round().clamp(0.0, max) as u16);
                }
            }
        }
        Ok(())
    }

    /// Blend a single RGBA value onto one pixel (used by glyph rasterization).
    pub fn blend_pixel(&mut self, x: u32, y: u32, rgba: [u16; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let max = f32::from(u16::MAX);
        let sa = f32::from(rgba[3]) / max;
        if sa <= 0.0 {
            return;
        }
        for c in 0..3 {
            let s = f32::from(rgba[c as usize]);
            let d = f32::from(self.get(x, y, c));
            let v = s * sa + d * (1.0 - sa);
            self.put(x, y, c, v.round().clamp(0.0, max) as u16);
        }
        if self.channels == 4 {
            let da = f32::from(self.get(x, y, 3)) / max;
            let a = sa + da * (1.0 - sa);
            self.put(x, y, 3, (a * max).round().clamp(0.0, max) as u16);
        }
    }

    /// Serialize the region of interest's RGB samples at the given depth.
    ///
    /// 16-bit output is little-endian, matching the `rgb48le` raw-video pixel
    /// format; 8-bit keeps the high byte.
    pub fn to_bytes(&self, depth: BitDepth) -> Vec<u8> {
        let roi = self.roi;
        let mut out = Vec::with_capacity(
            roi.width as usize * roi.height as usize * 3 * depth.bytes_per_sample(),
        );
        for y in roi.y..roi.y + roi.height {
            for x in roi.x..roi.x + roi.width {
                for c in 0..3 {
                    let v = self.get(x, y, c);
                    match depth {
                        BitDepth::Eight => out.push((v >> 8) as u8),
                        BitDepth::Sixteen => out.extend_from_slice(&v.to_le_bytes()),
                    }
                }
            }
        }
        out
    }

    /// 8-bit RGB copy of the region of interest (still-image encoding).
    pub fn to_rgb8(&self) -> image::RgbImage {
        let roi = self.roi;
        let mut img = image::RgbImage::new(roi.width, roi.height);
        for y in 0..roi.height {
            for x in 0..roi.width {
                let px = image::Rgb([
                    (self.get(roi.x + x, roi.y + y, 0) >> 8) as u8,
                    (self.get(roi.x + x, roi.y + y, 1) >> 8) as u8,
                    (self.get(roi.x + x, roi.y + y, 2) >> 8) as u8,
                ]);
                img.put_pixel(x, y, px);
            }
        }
        img
    }

    /// RGB `u16` copy of the region of interest, for resampling.
    pub fn to_rgb16(&self) -> image::ImageBuffer<image::Rgb<u16>, Vec<u16>> {
        let based = if self.roi == Roi::full(self.width, self.height) && self.channels == 3 {
            self.clone()
        } else {
            self.drop_alpha().rebase()
        };
        image::ImageBuffer::from_raw(based.width, based.height, based.data)
            .unwrap_or_else(|| image::ImageBuffer::new(1, 1))
    }
}
