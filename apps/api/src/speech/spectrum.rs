//! Frequency-magnitude snapshot used for the live recording visualization.
//!
//! Mirrors a browser analyser node: a Blackman-windowed 256-point transform,
//! 128 bins scaled from the -100..-30 dB range onto 0..1, then averaged down
//! to 32 buckets.

use std::f32::consts::PI;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;
pub const BUCKETS: usize = 32;
const BINS_PER_BUCKET: usize = BIN_COUNT / BUCKETS;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

pub type Spectrum = [f32; BUCKETS];

/// Keeps the most recent `FFT_SIZE` samples and turns them into a snapshot.
pub struct SpectrumAnalyzer {
    window: Vec<f32>,
    coefficients: Vec<f32>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let coefficients = (0..FFT_SIZE)
            .map(|n| {
                let x = 2.0 * PI * n as f32 / (FFT_SIZE - 1) as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();
        Self {
            window: vec![0.0; FFT_SIZE],
            coefficients,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        if samples.len() >= FFT_SIZE {
            self.window
                .copy_from_slice(&samples[samples.len() - FFT_SIZE..]);
            return;
        }
        self.window.drain(..samples.len());
        self.window.extend_from_slice(samples);
    }

    pub fn snapshot(&self) -> Spectrum {
        let windowed: Vec<f32> = self
            .window
            .iter()
            .zip(&self.coefficients)
            .map(|(s, c)| s * c)
            .collect();

        let mut levels = [0.0f32; BIN_COUNT];
        for (k, level) in levels.iter_mut().enumerate() {
            let (mut re, mut im) = (0.0f32, 0.0f32);
            for (n, sample) in windowed.iter().enumerate() {
                let angle = 2.0 * PI * (k * n) as f32 / FFT_SIZE as f32;
                re += sample * angle.cos();
                im -= sample * angle.sin();
            }
            let magnitude = (re * re + im * im).sqrt() / FFT_SIZE as f32;
            *level = normalize_db(magnitude);
        }

        let mut buckets = [0.0f32; BUCKETS];
        for (i, bucket) in buckets.iter_mut().enumerate() {
            let bins = &levels[i * BINS_PER_BUCKET..(i + 1) * BINS_PER_BUCKET];
            *bucket = bins.iter().sum::<f32>() / BINS_PER_BUCKET as f32;
        }
        buckets
    }
}

fn normalize_db(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * magnitude.log10();
    ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::tests::sine_frame;

    #[test]
    fn test_silence_is_flat_zero() {
        let analyzer = SpectrumAnalyzer::new();
        assert_eq!(analyzer.snapshot(), [0.0; BUCKETS]);
    }

    #[test]
    fn test_tone_peaks_in_matching_bucket() {
        let mut analyzer = SpectrumAnalyzer::new();
        // 40 cycles per window lands in bin 40, bucket 10.
        analyzer.push(&sine_frame(FFT_SIZE, 40.0));
        let spectrum = analyzer.snapshot();

        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 10);
        assert!(spectrum.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_short_pushes_slide_the_window() {
        let mut analyzer = SpectrumAnalyzer::new();
        analyzer.push(&[0.5; 100]);
        analyzer.push(&[0.25; 200]);
        assert_eq!(analyzer.window.len(), FFT_SIZE);
        assert_eq!(analyzer.window[FFT_SIZE - 1], 0.25);
        assert_eq!(analyzer.window[FFT_SIZE - 201], 0.5);
    }
}
