use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use rusttype::{Font, Scale, point};
use tracing::{debug, error, warn};

use crate::{
    buffer::{PixelBuffer, Roi},
    config::{CropmaskConfig, OverlayProfile, TextElement},
    error::DailiesResult,
};

/// A text element with profile defaults already inherited.
#[derive(Clone, Debug)]
pub struct ResolvedElement {
    pub font: Option<PathBuf>,
    pub font_size: f64,
    pub font_color: [f64; 4],
    pub bounds: [f64; 4],
    pub justify: Justify,
    pub prefix: Option<String>,
    pub leading: f64,
    pub padding: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
}

impl Justify {
    fn parse(name: Option<&str>) -> Self {
        match name {
            Some("center") => Self::Center,
            _ => Self::Left,
        }
    }
}

impl ResolvedElement {
    /// Shallow inheritance: only fields the element leaves unset fall back
    /// to the profile's shared defaults.
    pub fn resolve(element: &TextElement, profile: &OverlayProfile) -> Self {
        Self {
            font: element.font.clone().or_else(|| profile.font.clone()),
            font_size: element.font_size.or(profile.font_size).unwrap_or(0.02),
            font_color: element
                .font_color
                .or(profile.font_color)
                .unwrap_or([1.0, 1.0, 1.0, 1.0]),
            bounds: element.bounds.unwrap_or([0.0, 0.0, 1.0, 1.0]),
            justify: Justify::parse(
                element
                    .justify
                    .as_deref()
                    .or(profile.justify.as_deref()),
            ),
            prefix: element.prefix.clone(),
            leading: element.leading.or(profile.leading).unwrap_or(0.0),
            padding: element.padding.unwrap_or(4),
        }
    }
}

/// Renders configured text elements and the cropmask onto frame buffers.
///
/// Frame-invariant elements are rendered once into a static layer that is
/// composited onto every frame; the frame counter is rendered per frame.
pub struct OverlayCompositor {
    fonts: BTreeMap<PathBuf, Font<'static>>,
}

impl Default for OverlayCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayCompositor {
    pub fn new() -> Self {
        Self {
            fonts: BTreeMap::new(),
        }
    }

    fn font(&mut self, path: &Path) -> Option<&Font<'static>> {
        if !self.fonts.contains_key(path) {
            let bytes = std::fs::read(path).ok()?;
            let font = Font::try_from_vec(bytes)?;
            self.fonts.insert(path.to_path_buf(), font);
        }
        self.fonts.get(path)
    }

    /// Render all frame-invariant elements into a fresh transparent RGBA
    /// layer. Element text comes from `texts` keyed by element name; the
    /// frame counter is excluded (it changes per frame).
    pub fn build_static_layer(
        &mut self,
        profile: &OverlayProfile,
        texts: &BTreeMap<String, String>,
        width: u32,
        height: u32,
    ) -> DailiesResult<PixelBuffer> {
        let mut layer = PixelBuffer::new(width, height, 4)?;
        for (name, element) in &profile.text_elements {
            if name == "framecounter" {
                continue;
            }
            let resolved = ResolvedElement::resolve(element, profile);
            self.render_element(name, &resolved, texts.get(name).map(String::as_str), &mut layer);
        }
        Ok(layer)
    }

    /// Render the frame-number counter directly onto a frame buffer, when
    /// the profile configures one.
    pub fn render_frame_counter(
        &mut self,
        profile: &OverlayProfile,
        frame_number: u64,
        buf: &mut PixelBuffer,
    ) {
        let Some(element) = profile.text_elements.get("framecounter") else {
            return;
        };
        let resolved = ResolvedElement::resolve(element, profile);
        let text = format!("{frame_number:0width$}", width = resolved.padding);
        self.render_element("framecounter", &resolved, Some(&text), buf);
    }

    /// Render one element's text into the buffer. A missing font file or
    /// missing text content logs and skips the element; the frame is never
    /// aborted.
    pub fn render_element(
        &mut self,
        name: &str,
        element: &ResolvedElement,
        text: Option<&str>,
        buf: &mut PixelBuffer,
    ) {
        let Some(text) = text else {
            warn!(element = name, "no text specified for element; skipping");
            return;
        };
        let contents = match &element.prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };

        let Some(font_path) = element.font.clone() else {
            error!(element = name, "no font configured; skipping element");
            return;
        };
        if self.font(&font_path).is_none() {
            error!(
                element = name,
                font = %font_path.display(),
                "font does not exist or failed to load; skipping element"
            );
            return;
        }

        let width = buf.canvas_width();
        let height = buf.canvas_height();
        let font_size = (element.font_size * f64::from(width)) as f32;
        let scale = Scale::uniform(font_size);

        // Fractional lower-left-origin box corners, converted independently
        // to pixel coordinates with a top-left origin.
        let x0 = element.bounds[0] * f64::from(width);
        let y0 = f64::from(height) - element.bounds[1] * f64::from(height);
        let x1 = element.bounds[2] * f64::from(width);
        let box_width = (x1 - x0) as f32;

        let font = &self.fonts[&font_path];
        let lines = wrap_lines(
            |candidate| measure_width(font, scale, candidate),
            &contents,
            box_width,
        );
        debug!(element = name, lines = lines.len(), "rendering text element");

        // Lines stack bottom-up: the last line sits at the box's lower edge
        // plus one line height, each earlier line one leaded line above.
        let mut baseline = (y0 + f64::from(font_size)) as f32;
        let color = element.font_color;
        for line in lines.iter().rev() {
            let line_width = measure_width(font, scale, line);
            let x = match element.justify {
                Justify::Left => x0 as f32,
                Justify::Center => x0 as f32 + (box_width - line_width) / 2.0,
            };
            draw_line(buf, font, scale, x, baseline, line, color);
            baseline -= font_size + font_size * element.leading as f32;
        }
    }
}

/// Measured pixel width of a text run at the given scale.
pub fn measure_width(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Greedy word wrap: a break is forced whenever adding the next word would
/// exceed the box width; the final word group completes the last line.
pub fn wrap_lines(
    measure: impl Fn(&str) -> f32,
    text: &str,
    box_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line = word.to_string();
            continue;
        }
        let candidate = format!("{line} {word}");
        if measure(&candidate) > box_width {
            lines.push(std::mem::take(&mut line));
            line = word.to_string();
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn draw_line(
    buf: &mut PixelBuffer,
    font: &Font<'_>,
    scale: Scale,
    x: f32,
    baseline: f32,
    text: &str,
    color: [f64; 4],
) {
    let max = f64::from(u16::MAX);
    let rgb: Vec<u16> = color[..3]
        .iter()
        .map(|c| (c.clamp(0.0, 1.0) * max) as u16)
        .collect();
    let alpha = color[3].clamp(0.0, 1.0);

    let glyphs: Vec<_> = font.layout(text, scale, point(x, baseline)).collect();
    for glyph in glyphs {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = bb.min.x + gx as i32;
            let py = bb.min.y + gy as i32;
            if px < 0 || py < 0 {
                return;
            }
            let a = (alpha * f64::from(coverage) * max) as u16;
            buf.blend_pixel(px as u32, py as u32, [rgb[0], rgb[1], rgb[2], a]);
        });
    }
}

/// Build the cropmask layer: a semi-opaque full-canvas bar with a fully
/// transparent centered window at the target aspect ratio. Returns `None`
/// (with a logged error) when aspect or opacity is unset.
pub fn render_cropmask(
    config: &CropmaskConfig,
    width: u32,
    height: u32,
) -> DailiesResult<Option<PixelBuffer>> {
    if !config.enable {
        return Ok(None);
    }
    let (Some(aspect), Some(opacity)) = (config.aspect, config.opacity) else {
        error!("cropmask enabled but aspect or opacity unset; skipping cropmask");
        return Ok(None);
    };

    let window_height = (f64::from(width) / aspect).round() as u32;
    let bar = height.saturating_sub(window_height) / 2;
    debug!(window_height, bar, "rendering cropmask");

    let mut mask = PixelBuffer::new(width, height, 4)?;
    let alpha = (opacity.clamp(0.0, 1.0) * f64::from(u16::MAX)) as u16;
    mask.fill([0, 0, 0, alpha], Roi::full(width, height));
    if window_height > 0 && bar < height {
        mask.fill(
            [0, 0, 0, 0],
            Roi {
                x: 0,
                y: bar,
                width,
                height: height - 2 * bar,
            },
        );
    }
    Ok(Some(mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10px per character, space included: a stand-in for a monospaced font.
    fn mono(text: &str) -> f32 {
        text.chars().count() as f32 * 10.0
    }

    #[test]
    fn wrap_keeps_short_text_on_one_line() {
        let lines = wrap_lines(mono, "hello world", 500.0);
        assert_eq!(lines, vec!["hello world"]);
    }

    #[test]
    fn wrap_never_exceeds_box_width() {
        let text = "the quick brown fox jumps over the lazy dog";
        for box_width in [60.0, 100.0, 150.0, 250.0] {
            let lines = wrap_lines(mono, text, box_width);
            for line in &lines {
                assert!(
                    mono(line) <= box_width || !line.contains(' '),
                    "line '{line}' too wide for {box_width}"
                );
            }
            let rejoined = lines.join(" ");
            assert_eq!(rejoined, text);
        }
    }

    #[test]
    fn wrap_forces_break_before_overflow() {
        let lines = wrap_lines(mono, "aa bb cc", 50.0);
        assert_eq!(lines, vec!["aa bb", "cc"]);
    }

    #[test]
    fn oversized_single_word_gets_its_own_line() {
        let lines = wrap_lines(mono, "supercalifragilistic no", 100.0);
        assert_eq!(lines[0], "supercalifragilistic");
    }

    #[test]
    fn element_inherits_profile_defaults_shallowly() {
        let profile = OverlayProfile {
            font: Some(PathBuf::from("shared.ttf")),
            font_size: Some(0.03),
            font_color: Some([0.5, 0.5, 0.5, 1.0]),
            justify: Some("center".to_string()),
            leading: Some(0.15),
            ..Default::default()
        };
        let element = TextElement {
            font_size: Some(0.01),
            ..Default::default()
        };
        let resolved = ResolvedElement::resolve(&element, &profile);
        assert_eq!(resolved.font_size, 0.01);
        assert_eq!(resolved.font.as_deref(), Some(Path::new("shared.ttf")));
        assert_eq!(resolved.justify, Justify::Center);
        assert_eq!(resolved.leading, 0.15);
    }

    #[test]
    fn missing_font_skips_element_without_touching_buffer() {
        let mut compositor = OverlayCompositor::new();
        let mut buf = PixelBuffer::new(64, 64, 4).unwrap();
        let element = ResolvedElement {
            font: Some(PathBuf::from("/no/such/font.ttf")),
            font_size: 0.1,
            font_color: [1.0, 1.0, 1.0, 1.0],
            bounds: [0.0, 0.0, 1.0, 1.0],
            justify: Justify::Left,
            prefix: None,
            leading: 0.0,
            padding: 4,
        };
        compositor.render_element("artist", &element, Some("name"), &mut buf);
        for y in 0..64 {
            for x in 0..64 {
                assert_eq!(buf.get(x, y, 3), 0);
            }
        }
    }

    #[test]
    fn cropmask_layers_bar_and_window() {
        let config = CropmaskConfig {
            enable: true,
            aspect: Some(2.0),
            opacity: Some(0.5),
        };
        let mask = render_cropmask(&config, 200, 200).unwrap().unwrap();
        // Window height 100, bars of 50 at top and bottom.
        assert!(mask.get(100, 10, 3) > 0);
        assert_eq!(mask.get(100, 100, 3), 0);
        assert!(mask.get(100, 190, 3) > 0);
    }

    #[test]
    fn cropmask_without_aspect_is_skipped() {
        let config = CropmaskConfig {
            enable: true,
            aspect: None,
            opacity: Some(0.5),
        };
        assert!(render_cropmask(&config, 100, 100).unwrap().is_none());
    }

    #[test]
    fn disabled_cropmask_is_none() {
        let config = CropmaskConfig {
            enable: false,
            aspect: Some(2.0),
            opacity: Some(0.5),
        };
        assert!(render_cropmask(&config, 100, 100).unwrap().is_none());
    }
}
