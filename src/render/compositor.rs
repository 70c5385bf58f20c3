use std::f64::consts::PI;

use image::RgbaImage;

use super::canvas::{Canvas, Color};
use super::scene::{ImagePaint, Scene};
use super::text::{Align, FontSet, TextStyle, Weight};
use crate::audio::buffer::BarHeights;
use crate::error::RenderResult;
use crate::lyrics::layout::{LineStyle, LyricLayout};
use crate::lyrics::timeline::LyricTimeline;

pub const LOGICAL_WIDTH: f32 = 1280.0;
pub const LOGICAL_HEIGHT: f32 = 720.0;

const DISC_X: f64 = 320.0;
const DISC_Y: f64 = LOGICAL_HEIGHT as f64 / 2.0;
const DISC_RADIUS: f64 = 200.0;
const BAR_BASE_RADIUS: f64 = DISC_RADIUS + 2.0;
const BAR_WIDTH: f64 = 1.5;
const BAR_CORNER: f64 = 0.5;
const COVER_RATIO: f64 = 0.65;
/// Radians per second of cover rotation.
const COVER_SPIN: f64 = 0.4;

const ZOOM_CYCLE: f64 = 20.0;
const ZOOM_AMOUNT: f64 = 0.1;

const TITLE_X: f32 = DISC_X as f32;

const SHADOW: Color = Color::rgba(0, 0, 0, 0.9);

/// Cover rotation angle at `time` seconds.
pub fn rotation_at(time: f64) -> f32 {
    (time * COVER_SPIN) as f32
}

/// Slow in-out zoom for still backgrounds: 1.0 to 1.1 and back every 40s.
pub fn zoom_at(time: f64) -> f32 {
    let progress = (time % (ZOOM_CYCLE * 2.0)) / ZOOM_CYCLE;
    let ease = if progress < 1.0 { progress } else { 2.0 - progress };
    (1.0 + ease * ease * (3.0 - 2.0 * ease) * ZOOM_AMOUNT) as f32
}

/// Everything that varies between two frames.
pub struct FrameSpec<'a> {
    pub time: f64,
    pub bars: &'a BarHeights,
    pub active_lyric: Option<usize>,
    pub background: &'a RgbaImage,
    /// Still images zoom slowly; video frames are drawn at cover scale.
    pub still_background: bool,
    pub rotation: f32,
}

/// Draws frames onto a 1280x720 logical canvas rendered at `scale`.
pub struct FrameCompositor {
    scale: f32,
    width: u32,
    height: u32,
    timeline: LyricTimeline,
    layout: LyricLayout,
    fonts: Option<FontSet>,
    title: String,
    artist: String,
}

impl FrameCompositor {
    pub fn new(
        scale: f32,
        timeline: LyricTimeline,
        fonts: Option<FontSet>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        if fonts.is_none() {
            log::warn!("No font available; lyrics and titles will not be drawn");
        }
        Self {
            scale,
            width: (LOGICAL_WIDTH * scale).round() as u32,
            height: (LOGICAL_HEIGHT * scale).round() as u32,
            timeline,
            layout: LyricLayout::default(),
            fonts,
            title: title.into(),
            artist: artist.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timeline(&self) -> &LyricTimeline {
        &self.timeline
    }

    /// Render one frame. Identical specs give identical pixels.
    pub fn composite(&self, frame: &FrameSpec) -> RenderResult<Canvas> {
        let mut scene = Scene::new(self.width, self.height)?;
        scene.fill(Color::rgb(0, 0, 0));
        let cover = ImagePaint::from_rgba(frame.background)?;
        self.draw_background(&mut scene, &cover, frame);
        self.draw_bars(&mut scene, frame.bars);
        self.draw_disc(&mut scene, &cover, frame.rotation);

        let mut canvas = scene.render()?;
        if let Some(fonts) = &self.fonts {
            self.draw_lyrics(&mut canvas, fonts, frame.active_lyric);
            self.draw_titles(&mut canvas, fonts);
        }
        Ok(canvas)
    }

    fn draw_background(&self, scene: &mut Scene, image: &ImagePaint, frame: &FrameSpec) {
        let (mw, mh) = match frame.background.dimensions() {
            (0, _) | (_, 0) => (LOGICAL_WIDTH, LOGICAL_HEIGHT),
            (w, h) => (w as f32, h as f32),
        };
        let base = (LOGICAL_WIDTH / mw).max(LOGICAL_HEIGHT / mh);
        let zoom = if frame.still_background {
            zoom_at(frame.time)
        } else {
            1.0
        };
        let ratio = base * zoom;
        let (w, h) = (mw * ratio, mh * ratio);
        let (x, y) = ((LOGICAL_WIDTH - w) / 2.0, (LOGICAL_HEIGHT - h) / 2.0);
        let s = self.scale;
        scene.draw_image(
            image,
            f64::from(x * s),
            f64::from(y * s),
            f64::from(w * s),
            f64::from(h * s),
        );
    }

    fn draw_bars(&self, scene: &mut Scene, bars: &BarHeights) {
        let s = f64::from(self.scale);
        let count = bars.heights.len();
        for (i, &height) in bars.heights.iter().enumerate() {
            let fraction = i as f64 / count as f64;
            // Bar 0 points up before the quarter turn, so it ends up at 9 o'clock.
            let angle = fraction * 2.0 * PI - PI;
            let color = Color::hsla(fraction as f32 * 360.0, 1.0, 0.65, 0.9);
            scene.fill_radial_bar(
                DISC_X * s,
                DISC_Y * s,
                angle,
                BAR_BASE_RADIUS * s,
                BAR_WIDTH * s,
                f64::from(height) * s,
                BAR_CORNER * s,
                color,
            );
        }
    }

    fn draw_disc(&self, scene: &mut Scene, cover: &ImagePaint, rotation: f32) {
        let s = f64::from(self.scale);
        let (cx, cy, r) = (DISC_X * s, DISC_Y * s, DISC_RADIUS * s);
        scene.fill_circle(cx, cy, r, Color::rgb(0x11, 0x11, 0x11));
        scene.stroke_circle(cx, cy, r, 4.0 * s, Color::rgba(255, 255, 255, 0.1));
        scene.fill_radial_gradient(
            cx,
            cy,
            r * 0.5,
            r,
            &[
                (0.0, Color::rgb(0x1a, 0x1a, 0x1a)),
                (0.5, Color::rgb(0x22, 0x22, 0x22)),
                (1.0, Color::rgb(0x11, 0x11, 0x11)),
            ],
        );
        scene.draw_image_in_circle(cover, cx, cy, r * COVER_RATIO, f64::from(rotation));
    }

    fn draw_lyrics(&self, canvas: &mut Canvas, fonts: &FontSet, active: Option<usize>) {
        let s = self.scale;
        for line in self.layout.place(&self.timeline, active, fonts) {
            let style = match line.style {
                LineStyle::Active => TextStyle {
                    size: line.style.font_size() * s,
                    weight: Weight::Bold,
                    color: Color::rgb(255, 255, 255),
                    align: Align::Left,
                    shadow_offset: 2.0 * s,
                    shadow: SHADOW,
                },
                LineStyle::Context => TextStyle {
                    size: line.style.font_size() * s,
                    weight: Weight::Regular,
                    color: Color::rgba(255, 255, 255, 0.85),
                    align: Align::Left,
                    shadow_offset: 1.0 * s,
                    shadow: SHADOW,
                },
            };
            fonts.draw(canvas, &line.text, line.x * s, line.y * s, &style, line.alpha);
        }
    }

    fn draw_titles(&self, canvas: &mut Canvas, fonts: &FontSet) {
        let s = self.scale;
        let title = TextStyle {
            size: 26.0 * s,
            weight: Weight::Bold,
            color: Color::rgb(255, 255, 255),
            align: Align::Center,
            shadow_offset: 1.0 * s,
            shadow: SHADOW,
        };
        let artist = TextStyle {
            size: 18.0 * s,
            weight: Weight::Regular,
            color: Color::rgba(255, 255, 255, 0.9),
            ..title
        };
        fonts.draw(
            canvas,
            &self.title,
            TITLE_X * s,
            (LOGICAL_HEIGHT - 50.0) * s,
            &title,
            1.0,
        );
        fonts.draw(
            canvas,
            &self.artist,
            TITLE_X * s,
            (LOGICAL_HEIGHT - 20.0) * s,
            &artist,
            1.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn flat_bars(height: f32) -> BarHeights {
        BarHeights {
            heights: vec![height; 180],
        }
    }

    fn compositor() -> FrameCompositor {
        FrameCompositor::new(1.0, LyricTimeline::default(), None, "Title", "Artist")
    }

    #[test]
    fn canvas_size_follows_scale() {
        let c = FrameCompositor::new(1.5, LyricTimeline::default(), None, "", "");
        assert_eq!((c.width(), c.height()), (1920, 1080));
    }

    #[test]
    fn zoom_oscillates_between_one_and_one_point_one() {
        assert!((zoom_at(0.0) - 1.0).abs() < 1e-6);
        assert!((zoom_at(20.0) - 1.1).abs() < 1e-6);
        assert!((zoom_at(40.0) - 1.0).abs() < 1e-6);
        assert!((zoom_at(10.0) - 1.05).abs() < 1e-6);
        assert!((zoom_at(30.0) - 1.05).abs() < 1e-6);
    }

    #[test]
    fn rotation_grows_with_time() {
        assert_eq!(rotation_at(0.0), 0.0);
        assert!((rotation_at(10.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn same_spec_same_pixels() {
        let c = compositor();
        let bg = RgbaImage::from_fn(32, 18, |x, y| Rgba([(x * 8) as u8, (y * 14) as u8, 90, 255]));
        let bars = flat_bars(20.0);
        let spec = FrameSpec {
            time: 12.3,
            bars: &bars,
            active_lyric: None,
            background: &bg,
            still_background: true,
            rotation: rotation_at(12.3),
        };
        assert_eq!(c.composite(&spec).unwrap(), c.composite(&spec).unwrap());
    }

    #[test]
    fn background_covers_canvas_and_disc_shows_cover() {
        let c = compositor();
        let blue = RgbaImage::from_pixel(16, 9, Rgba([0, 0, 255, 255]));
        let bars = flat_bars(2.0);
        let canvas = c.composite(&FrameSpec {
            time: 0.0,
            bars: &bars,
            active_lyric: None,
            background: &blue,
            still_background: false,
            rotation: 0.0,
        })
        .unwrap();
        let is_blue = |px: [u8; 4]| px[0] == 0 && px[1] == 0 && px[2] >= 250;
        assert!(is_blue(canvas.pixel(1279, 719)));
        assert!(is_blue(canvas.pixel(0, 0)));
        // Centre of the disc is inside the cover clip.
        assert!(is_blue(canvas.pixel(320, 360)));
        // Between cover and rim the disc body is dark grey.
        let body = canvas.pixel(320, 360 - 160);
        assert!(body[0] == body[2] && body[0] < 0x30);
    }

    #[test]
    fn first_bar_points_left() {
        let c = compositor();
        let black = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mut heights = vec![0.0; 180];
        heights[0] = 40.0;
        let bars = BarHeights { heights };
        let canvas = c.composite(&FrameSpec {
            time: 0.0,
            bars: &bars,
            active_lyric: None,
            background: &black,
            still_background: false,
            rotation: 0.0,
        })
        .unwrap();
        // Bar 0 is red and spans x in [78, 118] at the disc's height.
        let px = canvas.pixel(98, 359);
        assert!(px[0] > 150 && px[1] < 100, "{:?}", px);
        let opposite = canvas.pixel(542, 359);
        assert_eq!(opposite, [0, 0, 0, 255]);
    }
}
