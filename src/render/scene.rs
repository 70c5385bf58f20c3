use std::sync::Arc;

use image::RgbaImage;
use kurbo::{Affine, Circle, Rect, RoundedRect, Shape, Stroke};
use rayon::prelude::*;
use vello_cpu::peniko::color::PremulRgba8;
use vello_cpu::peniko::{self, Gradient};
use vello_cpu::{Image, ImageSource, Pixmap, RenderContext};

use super::canvas::{Canvas, Color};
use crate::error::{RenderError, RenderResult};

/// Flattening tolerance for curves, in device pixels.
const TOLERANCE: f64 = 0.1;

/// An RGBA image uploaded as a vello paint, drawn at its own pixel size
/// before any placement transform.
#[derive(Clone)]
pub struct ImagePaint {
    paint: Image,
    width: f64,
    height: f64,
}

impl ImagePaint {
    pub fn from_rgba(src: &RgbaImage) -> RenderResult<Self> {
        let w = to_u16(src.width(), "image width")?;
        let h = to_u16(src.height(), "image height")?;
        let pixels: Vec<PremulRgba8> = src
            .as_raw()
            .par_chunks_exact(4)
            .map(|px| {
                let [r, g, b, a] = premul_rgba8(px[0], px[1], px[2], px[3]);
                PremulRgba8 { r, g, b, a }
            })
            .collect();
        let may_have_opacities = pixels.iter().any(|px| px.a != 255);
        let pixmap = Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities);
        Ok(Self {
            paint: Image {
                image: ImageSource::Pixmap(Arc::new(pixmap)),
                sampler: peniko::ImageSampler::default(),
            },
            width: f64::from(w),
            height: f64::from(h),
        })
    }

    fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// One frame's vector drawing, rasterised by `vello_cpu` on `render`.
pub struct Scene {
    ctx: RenderContext,
    width: u16,
    height: u16,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let w = to_u16(width, "canvas width")?;
        let h = to_u16(height, "canvas height")?;
        if w == 0 || h == 0 {
            return Err(RenderError::canvas(format!("empty canvas {}x{}", width, height)));
        }
        Ok(Self {
            ctx: RenderContext::new(w, h),
            width: w,
            height: h,
        })
    }

    pub fn fill(&mut self, color: Color) {
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(to_paint(color));
        self.ctx.fill_rect(&Rect::new(
            0.0,
            0.0,
            f64::from(self.width),
            f64::from(self.height),
        ));
    }

    /// Stretch `image` over the device rectangle (x, y, w, h).
    pub fn draw_image(&mut self, image: &ImagePaint, x: f64, y: f64, w: f64, h: f64) {
        if image.is_empty() || w <= 0.0 || h <= 0.0 {
            return;
        }
        self.ctx.set_transform(
            Affine::translate((x, y))
                * Affine::scale_non_uniform(w / image.width, h / image.height),
        );
        self.ctx.set_paint(image.paint.clone());
        self.ctx
            .fill_rect(&Rect::new(0.0, 0.0, image.width, image.height));
    }

    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Color) {
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(to_paint(color));
        self.ctx
            .fill_path(&Circle::new((cx, cy), radius).to_path(TOLERANCE));
    }

    /// Ring of `line_width` centred on `radius`.
    pub fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, line_width: f64, color: Color) {
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(to_paint(color));
        self.ctx.set_stroke(Stroke::new(line_width));
        self.ctx
            .stroke_path(&Circle::new((cx, cy), radius).to_path(TOLERANCE));
    }

    /// Fill a circle with a radial gradient running from `inner` to `radius`.
    /// `stops` are (offset, colour) pairs over that span, sorted by offset;
    /// everything inside `inner` takes the first stop.
    pub fn fill_radial_gradient(
        &mut self,
        cx: f64,
        cy: f64,
        inner: f64,
        radius: f64,
        stops: &[(f32, Color)],
    ) {
        if stops.is_empty() || radius <= 0.0 {
            return;
        }
        let span = radius - inner;
        let stops: Vec<(f32, peniko::Color)> = stops
            .iter()
            .map(|&(t, c)| (((inner + f64::from(t) * span) / radius) as f32, to_paint(c)))
            .collect();
        let gradient = Gradient::new_radial((cx, cy), radius as f32).with_stops(stops.as_slice());

        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(gradient);
        self.ctx
            .fill_path(&Circle::new((cx, cy), radius).to_path(TOLERANCE));
    }

    /// Rounded bar of `width` x `length` standing on a circle of `radius`
    /// around (cx, cy), pointing outward at `angle` from +x.
    #[allow(clippy::too_many_arguments)]
    pub fn fill_radial_bar(
        &mut self,
        cx: f64,
        cy: f64,
        angle: f64,
        radius: f64,
        width: f64,
        length: f64,
        corner: f64,
        color: Color,
    ) {
        if length <= 0.0 || width <= 0.0 {
            return;
        }
        let half = width / 2.0;
        let bar = RoundedRect::new(radius, -half, radius + length, half, corner);
        self.ctx
            .set_transform(Affine::translate((cx, cy)) * Affine::rotate(angle));
        self.ctx.set_paint(to_paint(color));
        self.ctx.fill_path(&bar.to_path(TOLERANCE));
    }

    /// Draw `image` over the square of side `2 * radius`, rotated by `angle`
    /// around (cx, cy) and clipped to that circle.
    pub fn draw_image_in_circle(
        &mut self,
        image: &ImagePaint,
        cx: f64,
        cy: f64,
        radius: f64,
        angle: f64,
    ) {
        if image.is_empty() || radius <= 0.0 {
            return;
        }
        let side = radius * 2.0;
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx
            .push_clip_layer(&Circle::new((cx, cy), radius).to_path(TOLERANCE));
        self.ctx.set_transform(
            Affine::translate((cx, cy))
                * Affine::rotate(angle)
                * Affine::translate((-radius, -radius))
                * Affine::scale_non_uniform(side / image.width, side / image.height),
        );
        self.ctx.set_paint(image.paint.clone());
        self.ctx
            .fill_rect(&Rect::new(0.0, 0.0, image.width, image.height));
        self.ctx.pop_layer();
    }

    /// Rasterise everything drawn so far and read it back as straight RGBA.
    pub fn render(mut self) -> RenderResult<Canvas> {
        let mut pixmap = Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        Canvas::from_premultiplied(
            u32::from(self.width),
            u32::from(self.height),
            pixmap.data_as_u8_slice().to_vec(),
        )
        .ok_or_else(|| RenderError::canvas("pixmap size does not match the scene"))
    }
}

fn to_paint(color: Color) -> peniko::Color {
    peniko::Color::from_rgba8(color.r, color.g, color.b, color.alpha_byte())
}

fn premul_rgba8(r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
    let af = (a as u16) + 1;
    let premul = |c: u8| -> u8 { (((c as u16) * af) >> 8) as u8 };
    [premul(r), premul(g), premul(b), a]
}

fn to_u16(value: u32, what: &str) -> RenderResult<u16> {
    u16::try_from(value)
        .map_err(|_| RenderError::canvas(format!("{} {} exceeds {}", what, value, u16::MAX)))
}
