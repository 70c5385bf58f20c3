use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};

use super::canvas::{Canvas, Color};
use crate::error::{RenderError, RenderResult};
use crate::lyrics::layout::{LineStyle, TextMeasure};

const REGULAR_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Text drawing parameters in device pixels.
#[derive(Clone, Copy, Debug)]
pub struct TextStyle {
    pub size: f32,
    pub weight: Weight,
    pub color: Color,
    pub align: Align,
    /// Drop shadow offset; zero disables the shadow.
    pub shadow_offset: f32,
    pub shadow: Color,
}

/// Regular and bold faces used for every text layer.
pub struct FontSet {
    regular: Font,
    bold: Font,
}

impl FontSet {
    /// Load explicit font files, falling back to well-known system fonts for
    /// whichever face is not given. A missing bold face reuses the regular one.
    pub fn load(regular: Option<&Path>, bold: Option<&Path>) -> RenderResult<Self> {
        let regular_path = match regular {
            Some(p) => p.to_path_buf(),
            None => find_system_font(REGULAR_CANDIDATES)
                .ok_or_else(|| RenderError::resource("no usable system font found"))?,
        };
        let regular_font = load_font(&regular_path)?;

        let bold_path = bold
            .map(Path::to_path_buf)
            .or_else(|| find_system_font(BOLD_CANDIDATES));
        let bold_font = match bold_path {
            Some(path) => match load_font(&path) {
                Ok(font) => font,
                Err(err) => {
                    log::warn!("{}; using regular face for bold text", err);
                    load_font(&regular_path)?
                }
            },
            None => load_font(&regular_path)?,
        };

        log::info!("Using font {}", regular_path.display());
        Ok(Self {
            regular: regular_font,
            bold: bold_font,
        })
    }

    fn face(&self, weight: Weight) -> &Font {
        match weight {
            Weight::Regular => &self.regular,
            Weight::Bold => &self.bold,
        }
    }

    /// Advance width of `text` in pixels.
    pub fn measure_width(&self, text: &str, size: f32, weight: Weight) -> f32 {
        let font = self.face(weight);
        text.chars()
            .map(|ch| font.metrics(ch, size).advance_width)
            .sum()
    }

    /// Draw one line with its vertical middle on `y`, anchored at `x` per the
    /// style's alignment. `opacity` scales both text and shadow.
    pub fn draw(
        &self,
        canvas: &mut Canvas,
        text: &str,
        x: f32,
        y: f32,
        style: &TextStyle,
        opacity: f32,
    ) {
        let start_x = match style.align {
            Align::Left => x,
            Align::Center => x - self.measure_width(text, style.size, style.weight) / 2.0,
        };
        if style.shadow_offset != 0.0 {
            let shadow = Color {
                a: style.shadow.a * opacity,
                ..style.shadow
            };
            self.draw_glyphs(
                canvas,
                text,
                start_x + style.shadow_offset,
                y + style.shadow_offset,
                style,
                shadow,
            );
        }
        let color = Color {
            a: style.color.a * opacity,
            ..style.color
        };
        self.draw_glyphs(canvas, text, start_x, y, style, color);
    }

    fn draw_glyphs(
        &self,
        canvas: &mut Canvas,
        text: &str,
        x: f32,
        y_middle: f32,
        style: &TextStyle,
        color: Color,
    ) {
        let font = self.face(style.weight);
        let baseline = match font.horizontal_line_metrics(style.size) {
            Some(lm) => y_middle + (lm.ascent + lm.descent) / 2.0,
            None => y_middle + style.size * 0.35,
        };

        let mut cursor_x = x;
        for ch in text.chars() {
            let (metrics, bitmap) = font.rasterize(ch, style.size);
            let glyph_x = (cursor_x + metrics.xmin as f32).round() as i32;
            let glyph_y =
                (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = bitmap[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }
                    canvas.blend(
                        glyph_x + gx as i32,
                        glyph_y + gy as i32,
                        color,
                        alpha as f32 / 255.0,
                    );
                }
            }

            cursor_x += metrics.advance_width;
        }
    }
}

impl TextMeasure for FontSet {
    fn measure(&self, text: &str, style: LineStyle) -> f32 {
        let weight = match style {
            LineStyle::Active => Weight::Bold,
            LineStyle::Context => Weight::Regular,
        };
        self.measure_width(text, style.font_size(), weight)
    }
}

fn load_font(path: &Path) -> RenderResult<Font> {
    let bytes = std::fs::read(path).map_err(|e| {
        RenderError::resource(format!("failed to read font {}: {}", path.display(), e))
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
        RenderError::resource(format!("failed to parse font {}: {}", path.display(), e))
    })
}

fn find_system_font(candidates: &[&str]) -> Option<PathBuf> {
    let mut paths: Vec<PathBuf> = candidates.iter().map(PathBuf::from).collect();
    if let Some(user_fonts) = dirs::font_dir() {
        for name in candidates {
            if let Some(file) = Path::new(name).file_name() {
                paths.push(user_fonts.join(file));
            }
        }
    }
    paths.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_font_is_a_resource_error() {
        let err = FontSet::load(Some(Path::new("/nonexistent/font.ttf")), None)
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::ResourceLoad(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unparsable_font_is_rejected() {
        let dir = std::env::temp_dir().join("vinylcast-font-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(load_font(&path).is_err());
    }
}
