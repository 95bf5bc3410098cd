//! Spectral analysis, filtering and feedback control.
//!
//! The FFT here is the iterative radix-2 Cooley-Tukey transform; callers
//! guarantee a power-of-two length (the `fft` algorithm validates it or pads
//! on request).

use millkit_kernel::ParamReader;
use millkit_numerics::Complex;
use std::f64::consts::TAU;

pub mod fft;
pub mod fusion;
pub mod fuzzy;
pub mod kalman;
pub mod pid;
pub mod stft;
pub mod wavelet;

pub const WINDOWS: &[&str] = &["none", "hann"];
pub const MAX_SAMPLES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Rectangular,
    Hann,
}

impl Window {
    pub fn parse(params: &mut ParamReader<'_>, default: &'static str) -> Self {
        match params.choice("window", WINDOWS, default) {
            "hann" => Self::Hann,
            _ => Self::Rectangular,
        }
    }

    /// Periodic window coefficients of length `n`.
    pub fn coefficients(self, n: usize) -> Vec<f64> {
        match self {
            Self::Rectangular => vec![1.0; n],
            Self::Hann => (0..n)
                .map(|i| 0.5 - 0.5 * (TAU * i as f64 / n as f64).cos())
                .collect(),
        }
    }
}

/// In-place radix-2 FFT. `data.len()` must be a power of two.
pub fn fft_in_place(data: &mut [Complex]) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two());

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if i < j {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let step = Complex::from_polar(1.0, -TAU / len as f64);
        for start in (0..n).step_by(len) {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let even = data[start + k];
                let odd = data[start + k + len / 2] * w;
                data[start + k] = even + odd;
                data[start + k + len / 2] = even - odd;
                w = w * step;
            }
        }
        len <<= 1;
    }
}

/// One-sided amplitude spectrum of `frame`, windowed and then zero-padded
/// to `size` (a power of two, at least `frame.len()`).
///
/// Amplitudes are corrected for the window's coherent gain, so a windowed
/// sinusoid of amplitude `A` on a bin centre reads `A`.
pub fn amplitude_spectrum(frame: &[f64], window: Window, size: usize) -> Vec<f64> {
    let size = size.max(frame.len());
    if frame.is_empty() {
        return Vec::new();
    }
    let coefficients = window.coefficients(frame.len());
    let gain: f64 = coefficients.iter().sum();
    let gain = if gain > 0.0 { gain } else { 1.0 };
    let mut data = vec![Complex::ZERO; size];
    for (slot, (x, w)) in data.iter_mut().zip(frame.iter().zip(&coefficients)) {
        *slot = Complex::new(x * w, 0.0);
    }
    fft_in_place(&mut data);

    let half = size / 2;
    (0..=half)
        .map(|k| {
            let scale = if k == 0 || k == half { 1.0 } else { 2.0 };
            scale * data[k].norm() / gain
        })
        .collect()
}

/// Index of the largest bin, skipping DC.
pub fn dominant_bin(spectrum: &[f64]) -> Option<usize> {
    spectrum
        .iter()
        .enumerate()
        .skip(1)
        .fold(None, |best: Option<(usize, f64)>, (i, &m)| match best {
            Some((_, bm)) if bm >= m => best,
            _ => Some((i, m)),
        })
        .map(|(i, _)| i)
}
