use crate::audio::bars::{map_bars, BAR_COUNT};
use crate::audio::buffer::{AnalysisWindow, BarHeights, SampleBuffer};
use crate::audio::spectrum::SpectrumAnalyzer;
use crate::error::RenderResult;
use crate::render::background::Background;
use crate::render::canvas::Canvas;
use crate::render::compositor::{rotation_at, FrameCompositor, FrameSpec};

/// Produces frames of one render in order. The analyzer's smoothing state
/// carries from frame to frame, so frames must be requested sequentially.
pub struct FrameProducer {
    samples: SampleBuffer,
    analyzer: SpectrumAnalyzer,
    compositor: FrameCompositor,
    background: Background,
    fps: u32,
    smoothing: f32,
    next_index: usize,
}

impl FrameProducer {
    pub fn new(
        samples: SampleBuffer,
        window_size: usize,
        compositor: FrameCompositor,
        background: Background,
        fps: u32,
        smoothing: f32,
    ) -> RenderResult<Self> {
        Ok(Self {
            samples,
            analyzer: SpectrumAnalyzer::new(window_size)?,
            compositor,
            background,
            fps,
            smoothing,
            next_index: 0,
        })
    }

    pub fn total_frames(&self) -> usize {
        self.samples.frame_count(self.fps)
    }

    /// First sample of the analysis window for `index`. The window starts a
    /// quarter of its length early so onsets register before they peak.
    pub fn sample_offset(&self, index: usize) -> i64 {
        let lookback = (self.analyzer.window_len() / 4) as i64;
        (index * self.samples.samples_per_frame(self.fps)) as i64 - lookback
    }

    fn analyze(&mut self, index: usize) -> RenderResult<BarHeights> {
        let window = AnalysisWindow::extract(
            self.samples.samples(),
            self.sample_offset(index),
            self.analyzer.window_len(),
        );
        let spectrum = self.analyzer.analyze(&window, self.smoothing)?;
        Ok(map_bars(&spectrum, BAR_COUNT))
    }

    /// Analyze frames up to `index` without drawing them, so the next
    /// [`render_next`](Self::render_next) sees the same smoothing state as
    /// a full render would.
    pub fn skip_to(&mut self, index: usize) -> RenderResult<()> {
        while self.next_index < index {
            self.analyze(self.next_index)?;
            self.next_index += 1;
        }
        Ok(())
    }

    /// Index of the frame the next call to `render_next` draws.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn render_next(&mut self) -> RenderResult<Canvas> {
        let index = self.next_index;
        let time = index as f64 / self.fps as f64;
        let bars = self.analyze(index)?;
        let active_lyric = self.compositor.timeline().active_index(time);
        let still_background = self.background.is_still();
        let background = self.background.frame_at(time);

        let canvas = self.compositor.composite(&FrameSpec {
            time,
            bars: &bars,
            active_lyric,
            background,
            still_background,
            rotation: rotation_at(time),
        })?;
        self.next_index += 1;
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::timeline::LyricTimeline;
    use image::{Rgba, RgbaImage};

    fn tone(seconds: f64, rate: u32) -> SampleBuffer {
        let n = (seconds * rate as f64) as usize;
        let samples = (0..n)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / rate as f32).sin() * 0.5)
            .collect();
        SampleBuffer::new(samples, rate)
    }

    fn producer() -> FrameProducer {
        let compositor = FrameCompositor::new(0.1, LyricTimeline::default(), None, "t", "a");
        let background = Background::Still(RgbaImage::from_pixel(8, 8, Rgba([30, 60, 90, 255])));
        FrameProducer::new(tone(1.0, 8000), 2048, compositor, background, 30, 0.65).unwrap()
    }

    #[test]
    fn offsets_look_back_a_quarter_window() {
        let p = producer();
        // 8000 / 30 = 266 samples per frame.
        assert_eq!(p.sample_offset(0), -512);
        assert_eq!(p.sample_offset(2), 532 - 512);
        assert_eq!(p.sample_offset(10), 2660 - 512);
        assert_eq!(p.total_frames(), 30);
    }

    #[test]
    fn skipping_matches_sequential_rendering() {
        let mut a = producer();
        for _ in 0..5 {
            a.render_next().unwrap();
        }
        let sequential = a.render_next().unwrap();

        let mut b = producer();
        b.skip_to(5).unwrap();
        assert_eq!(b.next_index(), 5);
        let skipped = b.render_next().unwrap();

        assert_eq!(sequential, skipped);
        assert_eq!(sequential.width(), 128);
        assert_eq!(sequential.height(), 72);
    }
}
