/// Decoded mono samples for one render. Immutable once built.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// `floor(duration * fps)`, computed on integers so that exact
    /// durations like 3.1s never lose a frame to rounding.
    pub fn frame_count(&self, fps: u32) -> usize {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * fps as u64 / self.sample_rate as u64) as usize
    }

    /// Samples that advance between two consecutive video frames.
    pub fn samples_per_frame(&self, fps: u32) -> usize {
        if fps == 0 {
            return 0;
        }
        (self.sample_rate / fps) as usize
    }
}

/// Fixed-length slice of samples fed to the spectrum analyzer.
#[derive(Clone, Debug)]
pub struct AnalysisWindow {
    samples: Vec<f32>,
}

impl AnalysisWindow {
    /// Copy `len` samples starting at `offset`. A negative offset clamps to
    /// the start of the track; reads past the end are zero-padded.
    pub fn extract(samples: &[f32], offset: i64, len: usize) -> Self {
        let start = offset.max(0) as usize;
        let mut window = vec![0.0f32; len];
        if start < samples.len() {
            let end = (start + len).min(samples.len());
            window[..end - start].copy_from_slice(&samples[start..end]);
        }
        Self { samples: window }
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Log-magnitude spectrum, one byte per frequency bin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spectrum {
    pub bins: Vec<u8>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bin value, or 0 past the end.
    pub fn get(&self, idx: usize) -> f32 {
        self.bins.get(idx).copied().unwrap_or(0) as f32
    }
}

/// Pixel heights of the radial bars, in logical canvas units.
#[derive(Clone, Debug, PartialEq)]
pub struct BarHeights {
    pub heights: Vec<f32>,
}

impl BarHeights {
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_floors_exactly() {
        let rate = 8000;
        let track = SampleBuffer::new(vec![0.0; 24_800], rate); // 3.1s
        assert_eq!(track.frame_count(30), 93);

        let track = SampleBuffer::new(vec![0.0; 24_000], rate); // 3.0s
        assert_eq!(track.frame_count(30), 90);

        let track = SampleBuffer::new(vec![0.0; 24_199], rate);
        assert_eq!(track.frame_count(30), 90);
    }

    #[test]
    fn negative_offset_clamps_to_start() {
        let samples: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let window = AnalysisWindow::extract(&samples, -4, 8);
        assert_eq!(window.samples(), &samples[0..8]);
    }

    #[test]
    fn overrun_is_zero_padded() {
        let samples: Vec<f32> = (1..=6).map(|i| i as f32).collect();
        let window = AnalysisWindow::extract(&samples, 4, 4);
        assert_eq!(window.samples(), &[5.0, 6.0, 0.0, 0.0]);

        let past_end = AnalysisWindow::extract(&samples, 100, 4);
        assert_eq!(past_end.samples(), &[0.0; 4]);
    }

    #[test]
    fn spectrum_get_past_end_is_zero() {
        let spectrum = Spectrum { bins: vec![10, 20] };
        assert_eq!(spectrum.get(1), 20.0);
        assert_eq!(spectrum.get(2), 0.0);
    }
}
