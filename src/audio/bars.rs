use super::buffer::{BarHeights, Spectrum};

pub const BAR_COUNT: usize = 180;

/// Height of a bar at silence.
pub const MIN_BAR_HEIGHT: f32 = 2.0;
const MAX_BAR_GROWTH: f32 = 40.0;

/// Fraction of the spectrum kept; the top bins are mostly noise.
const USABLE_FRACTION: f32 = 0.8;
const HIGH_BAR_GAIN: f32 = 0.8;
const PEAK_CURVE: f32 = 2.5;

/// Map a spectrum onto `bar_count` log-spaced bar heights.
///
/// Bar `i` reads the fractional bin `exp(ln(max_idx) * i / bar_count)`,
/// interpolating between the neighbouring bins, so low frequencies are spread
/// over proportionally more bars. Pure: identical spectra give identical bars.
pub fn map_bars(spectrum: &Spectrum, bar_count: usize) -> BarHeights {
    let min_idx = 1.0f32;
    let max_idx = ((spectrum.len() as f32 * USABLE_FRACTION).floor()).max(min_idx);
    let log_range = (max_idx / min_idx).ln();

    let heights = (0..bar_count)
        .map(|i| {
            let position = i as f32 / bar_count as f32;
            let idx = min_idx * (log_range * position).exp();
            let lower = idx.floor();
            let frac = idx - lower;
            let mut val = spectrum.get(lower as usize) * (1.0 - frac)
                + spectrum.get(idx.ceil() as usize) * frac;
            val *= 1.0 + position * HIGH_BAR_GAIN;
            bar_height(val.min(255.0))
        })
        .collect();

    BarHeights { heights }
}

fn bar_height(val: f32) -> f32 {
    if val > 0.0 {
        MIN_BAR_HEIGHT + (val / 255.0).powf(PEAK_CURVE) * MAX_BAR_GROWTH
    } else {
        MIN_BAR_HEIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(len: usize, value: u8) -> Spectrum {
        Spectrum {
            bins: vec![value; len],
        }
    }

    #[test]
    fn length_matches_requested_count() {
        for len in [0, 1, 2, 16, 512, 1024, 4096] {
            for count in [1, 64, BAR_COUNT, 360] {
                let bars = map_bars(&flat(len, 128), count);
                assert_eq!(bars.len(), count);
                assert!(bars.heights.iter().all(|&h| h >= MIN_BAR_HEIGHT));
            }
        }
    }

    #[test]
    fn silence_sits_on_the_floor() {
        let bars = map_bars(&flat(1024, 0), BAR_COUNT);
        assert!(bars.heights.iter().all(|&h| h == MIN_BAR_HEIGHT));
    }

    #[test]
    fn full_scale_reaches_the_cap() {
        let bars = map_bars(&flat(1024, 255), BAR_COUNT);
        for h in &bars.heights {
            assert!((h - (MIN_BAR_HEIGHT + MAX_BAR_GROWTH)).abs() < 1e-4);
        }
    }

    #[test]
    fn higher_bars_get_more_gain() {
        let bars = map_bars(&flat(1024, 100), BAR_COUNT);
        assert!(bars.heights[BAR_COUNT - 1] > bars.heights[0]);
        assert!(bars
            .heights
            .windows(2)
            .all(|w| w[1] >= w[0]));
    }

    #[test]
    fn low_bins_get_proportionally_more_bars() {
        // Energy only in bins 1..8 of 1024: log spacing gives those bins
        // far more than the linear share of 180 * 8 / 819 bars.
        let mut bins = vec![0u8; 1024];
        for b in bins.iter_mut().take(8).skip(1) {
            *b = 200;
        }
        let bars = map_bars(&Spectrum { bins }, BAR_COUNT);
        let lit = bars.heights.iter().filter(|&&h| h > MIN_BAR_HEIGHT).count();
        assert!(lit > 40, "lit bars: {lit}");
    }

    #[test]
    fn deterministic() {
        let spectrum = Spectrum {
            bins: (0..1024).map(|i| (i % 256) as u8).collect(),
        };
        assert_eq!(map_bars(&spectrum, BAR_COUNT), map_bars(&spectrum, BAR_COUNT));
    }
}
