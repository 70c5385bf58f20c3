use image::RgbaImage;
use rayon::prelude::*;

/// Straight-alpha colour; `a` is 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// CSS-style `hsla()`, hue in degrees, saturation and lightness 0-1.
    pub fn hsla(hue: f32, saturation: f32, lightness: f32, alpha: f32) -> Self {
        let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let h = hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = lightness - c / 2.0;
        let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgba(to_byte(r), to_byte(g), to_byte(b), alpha)
    }

    pub fn alpha_byte(&self) -> u8 {
        (self.a * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

/// Opaque RGBA8 frame in device pixels, read back from a rendered scene.
/// Text is blended directly into it.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// Opaque black canvas.
    pub fn new(width: u32, height: u32) -> Self {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        pixels.chunks_exact_mut(4).for_each(|px| px[3] = 255);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Take over a premultiplied RGBA8 buffer; `None` on a size mismatch.
    pub fn from_premultiplied(width: u32, height: u32, mut data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        data.par_chunks_exact_mut(4).for_each(unpremultiply);
        Some(Self {
            width,
            height,
            pixels: data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }

    /// Source-over blend of `color` at `coverage` onto pixel (x, y).
    pub fn blend(&mut self, x: i32, y: i32, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &mut self.pixels[idx..idx + 4];
        let a = (color.a * coverage).clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let inv = 1.0 - a;
        px[0] = (color.r as f32 * a + px[0] as f32 * inv).round() as u8;
        px[1] = (color.g as f32 * a + px[1] as f32 * inv).round() as u8;
        px[2] = (color.b as f32 * a + px[2] as f32 * inv).round() as u8;
        px[3] = 255;
    }
}

fn unpremultiply(px: &mut [u8]) {
    let a = px[3] as u16;
    if a == 0 || a == 255 {
        return;
    }
    for c in &mut px[..3] {
        *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}
