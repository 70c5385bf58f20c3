use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::buffer::{AnalysisWindow, Spectrum};
use crate::error::{RenderError, RenderResult};

pub const DEFAULT_WINDOW_SIZE: usize = 2048;

const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -10.0;
const EPSILON: f32 = 1e-6;

/// Windowed FFT with exponential smoothing carried between calls.
///
/// One analyzer belongs to one render session. The smoothing state is sized
/// to the current window length and is zeroed whenever that length changes
/// or [`SpectrumAnalyzer::reset`] is called.
pub struct SpectrumAnalyzer {
    window_len: usize,
    hann: Vec<f32>,
    previous: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(window_len: usize) -> RenderResult<Self> {
        validate_window_len(window_len)?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_len);
        Ok(Self {
            window_len,
            hann: hann_window(window_len),
            previous: vec![0.0; window_len / 2],
            fft,
            scratch: vec![Complex::new(0.0, 0.0); window_len],
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn reset(&mut self) {
        self.previous.iter_mut().for_each(|m| *m = 0.0);
    }

    pub fn analyze(&mut self, window: &AnalysisWindow, smoothing: f32) -> RenderResult<Spectrum> {
        if window.len() != self.window_len {
            log::debug!(
                "Analysis window changed from {} to {}, resetting smoothing state",
                self.window_len,
                window.len()
            );
            *self = Self::new(window.len())?;
        }

        let n = self.window_len;
        for (slot, (&s, &w)) in self
            .scratch
            .iter_mut()
            .zip(window.samples().iter().zip(self.hann.iter()))
        {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let smoothing = smoothing.clamp(0.0, 1.0);
        let half = n / 2;
        let mut bins = Vec::with_capacity(half);
        for i in 0..half {
            let raw = self.scratch[i].norm() / n as f32 * 2.0;
            let mag = smoothing * self.previous[i] + (1.0 - smoothing) * raw;
            self.previous[i] = mag;
            bins.push(db_to_byte(20.0 * (mag + EPSILON).log10()));
        }

        Ok(Spectrum { bins })
    }
}

fn validate_window_len(len: usize) -> RenderResult<()> {
    if len < 2 || !len.is_power_of_two() {
        return Err(RenderError::InvalidWindowSize(len));
    }
    Ok(())
}

/// Map [-100dB, -10dB] onto [0, 255], truncating like a byte store.
fn db_to_byte(db: f32) -> u8 {
    let val = (db - MIN_DB) * (255.0 / (MAX_DB - MIN_DB));
    val.clamp(0.0, 255.0) as u8
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
