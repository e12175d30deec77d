//! Spectrum analyser core
//!
//! Holds the most recent `fft_size` time-domain samples written by the
//! analyser node on the audio thread, and turns them into byte magnitudes on
//! demand: Blackman window, FFT, smoothing against the previous pull, dB
//! scaling into `[min_db, max_db]`.

use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::audio::{FFT_SIZE, MAX_DECIBELS, MIN_DECIBELS, SMOOTHING_TIME_CONSTANT};

/// Tunables for an analyser stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    /// Transform size, a power of two
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: FFT_SIZE,
            smoothing_time_constant: SMOOTHING_TIME_CONSTANT,
            min_decibels: MIN_DECIBELS,
            max_decibels: MAX_DECIBELS,
        }
    }
}

struct AnalyserCore {
    options: AnalyserOptions,
    /// Ring of the latest `fft_size` mono samples; `write_pos` is the oldest
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl AnalyserCore {
    fn new(options: AnalyserOptions) -> Self {
        let n = options.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);
        Self {
            options,
            ring: vec![0.0; n],
            write_pos: 0,
            window: blackman_window(n),
            smoothed: vec![0.0; n / 2],
            fft,
            scratch: vec![Complex::new(0.0, 0.0); n],
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let n = self.ring.len();
        // only the tail can survive in the ring
        let tail = &samples[samples.len().saturating_sub(n)..];
        for &s in tail {
            self.ring[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
        }
    }

    /// Oldest-to-newest copy of the ring
    fn ordered(&self) -> impl Iterator<Item = f32> + '_ {
        self.ring[self.write_pos..]
            .iter()
            .chain(self.ring[..self.write_pos].iter())
            .copied()
    }

    fn update_smoothed(&mut self) {
        let n = self.ring.len();
        let samples: Vec<f32> = self.ordered().collect();
        for (i, (slot, s)) in self.scratch.iter_mut().zip(samples).enumerate() {
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.options.smoothing_time_constant;
        let norm = 1.0 / n as f32;
        for (bin, value) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * norm;
            let next = tau * *value + (1.0 - tau) * magnitude;
            *value = if next.is_finite() { next } else { 0.0 };
        }
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_smoothed();
        let min_db = self.options.min_decibels;
        let range = self.options.max_decibels - min_db;
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = if mag > 0.0 { 20.0 * mag.log10() } else { f32::NEG_INFINITY };
            let scaled = 255.0 * (db - min_db) / range;
            *dst = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (dst, s) in out.iter_mut().zip(self.ordered()) {
            *dst = (128.0 * (1.0 + s)).clamp(0.0, 255.0) as u8;
        }
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

/// Cloneable handle to an analyser stage.
///
/// The audio thread writes through [`AnalyserHandle::push`]; readers pull
/// magnitudes once per display frame.
#[derive(Clone)]
pub struct AnalyserHandle {
    core: Arc<Mutex<AnalyserCore>>,
    fft_size: usize,
}

impl AnalyserHandle {
    /// Create an analyser. `fft_size` is rounded up to a power of two (minimum 32).
    pub fn new(mut options: AnalyserOptions) -> Self {
        options.fft_size = options.fft_size.max(32).next_power_of_two();
        options.smoothing_time_constant = options.smoothing_time_constant.clamp(0.0, 1.0);
        if options.max_decibels <= options.min_decibels {
            options.max_decibels = options.min_decibels + 1.0;
        }
        let fft_size = options.fft_size;
        Self {
            core: Arc::new(Mutex::new(AnalyserCore::new(options))),
            fft_size,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (`fft_size / 2`)
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append mono samples (newest last)
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut core) = self.core.lock() {
            core.push(samples);
        }
    }

    /// Fill `out` with byte magnitudes; extra entries are left untouched
    pub fn get_byte_frequency_data(&self, out: &mut [u8]) {
        if let Ok(mut core) = self.core.lock() {
            core.byte_frequency_data(out);
        }
    }

    /// Fill `out` with the waveform as bytes centred on 128
    pub fn get_byte_time_domain_data(&self, out: &mut [u8]) {
        if let Ok(core) = self.core.lock() {
            core.byte_time_domain_data(out);
        }
    }
}
