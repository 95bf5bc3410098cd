//! Short-time Fourier transform (spectrogram).

use super::{MAX_SAMPLES, Window, amplitude_spectrum, dominant_bin};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::f64::consts::TAU;

const MAX_CELLS: usize = 2_000_000;

pub struct Stft;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "stft",
    name: "Short-Time Fourier Transform",
    description: "Spectrogram of a signal from overlapping windowed frames, with the dominant frequency of each frame.",
    formula: "S(m, k) = |Σ_n x[n + mH] w[n] e^{−2πikn/L}|,  t_m = (mH + L/2) / fs",
    reference: "Allen, J. B. (1977). Short term spectral analysis, synthesis, and modification by discrete Fourier transform. IEEE Trans. ASSP 25(3), 235-238.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("signal", "-", "samples"),
        FieldSpec::required("sample_rate", "Hz", "sampling frequency"),
        FieldSpec::required("window_size", "-", "frame length L, a power of two ≤ signal length"),
        FieldSpec::optional("hop_size", "-", "frame advance H, default L/2"),
        FieldSpec::optional("window", "-", "none | hann (default hann)"),
    ],
    outputs: &[
        FieldSpec::output("frame_count", "-", "number of frames"),
        FieldSpec::output("times_s", "s", "centre time of each frame"),
        FieldSpec::output("frequencies_hz", "Hz", "bin centre frequencies"),
        FieldSpec::output("spectrogram", "-", "amplitude per frame (rows) and bin (columns)"),
        FieldSpec::output("dominant_frequencies_hz", "Hz", "strongest non-DC bin per frame"),
        FieldSpec::output("frequency_resolution_hz", "Hz", "fs / L"),
    ],
};

#[derive(Debug, Clone)]
pub struct StftInput {
    signal: Vec<f64>,
    sample_rate: f64,
    window_size: usize,
    hop: usize,
    window: Window,
}

#[derive(Debug, Serialize)]
pub struct StftOutput {
    pub frame_count: usize,
    pub window_size: usize,
    pub hop_size: usize,
    pub frequency_resolution_hz: f64,
    pub times_s: Vec<f64>,
    pub frequencies_hz: Vec<f64>,
    pub spectrogram: Vec<Vec<f64>>,
    pub dominant_frequencies_hz: Vec<f64>,
}

impl Algorithm for Stft {
    type Input = StftInput;
    type Output = StftOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // 128 Hz for the first half second, 320 Hz for the second.
        let signal: Vec<f64> = (0..1024)
            .map(|i| {
                let t = i as f64 / 1024.0;
                let f = if i < 512 { 128.0 } else { 320.0 };
                (TAU * f * t).sin()
            })
            .collect();
        json!({ "signal": signal, "sample_rate": 1024.0, "window_size": 128 })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> StftInput {
        let signal = params.required_f64_array("signal");
        let sample_rate = params.required_f64("sample_rate");
        params.ensure_positive("sample_rate", sample_rate);
        let window_size = params.required_usize("window_size");
        if params.ensure_count("window_size", window_size, 4, 1 << 16) {
            params.ensure(
                "window_size",
                window_size.is_power_of_two(),
                "must be a power of two",
            );
        }
        let hop = params.optional_usize("hop_size", (window_size / 2).max(1));
        params.ensure_count("hop_size", hop, 1, window_size.max(1));
        let window = Window::parse(params, "hann");

        if params.has("signal") {
            params.ensure(
                "signal",
                signal.len() <= MAX_SAMPLES,
                format!("must have at most {MAX_SAMPLES} samples"),
            );
            if !params.failed("window_size") {
                params.ensure(
                    "signal",
                    signal.len() >= window_size,
                    format!("must hold at least one window of {window_size} samples"),
                );
            }
        }
        if !params.has_errors() {
            let frames = 1 + (signal.len() - window_size) / hop;
            params.ensure(
                "hop_size",
                frames.saturating_mul(window_size / 2 + 1) <= MAX_CELLS,
                format!("spectrogram would exceed {MAX_CELLS} cells; increase hop_size"),
            );
            let covered = (frames - 1) * hop + window_size;
            if covered < signal.len() {
                params.warning(
                    "hop_size",
                    format!(
                        "{} trailing sample(s) fall outside the last frame",
                        signal.len() - covered
                    ),
                );
            }
        }
        StftInput {
            signal,
            sample_rate,
            window_size,
            hop,
            window,
        }
    }

    fn calculate(&self, input: &StftInput) -> Result<ResultEnvelope<StftOutput>, AlgorithmError> {
        let l = input.window_size;
        if l < 2 || !l.is_power_of_two() || input.hop == 0 || input.signal.len() < l {
            return Err(AlgorithmError::InvalidInput(
                "window must be a power of two no longer than the signal, hop positive".into(),
            ));
        }
        let resolution = input.sample_rate / l as f64;
        let frames = 1 + (input.signal.len() - l) / input.hop;

        let mut spectrogram = Vec::with_capacity(frames);
        let mut times = Vec::with_capacity(frames);
        let mut dominant = Vec::with_capacity(frames);
        for m in 0..frames {
            let start = m * input.hop;
            let spectrum = amplitude_spectrum(&input.signal[start..start + l], input.window, l);
            dominant.push(dominant_bin(&spectrum).unwrap_or(0) as f64 * resolution);
            times.push((start as f64 + l as f64 / 2.0) / input.sample_rate);
            spectrogram.push(spectrum);
        }
        let frequencies = (0..=l / 2).map(|k| k as f64 * resolution).collect();

        Ok(ResultEnvelope::new(StftOutput {
            frame_count: frames,
            window_size: l,
            hop_size: input.hop,
            frequency_resolution_hz: resolution,
            times_s: times,
            frequencies_hz: frequencies,
            spectrogram,
            dominant_frequencies_hz: dominant,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    #[test]
    fn tracks_a_frequency_step() {
        let out = run(&Stft, Stft.example()).result;
        assert_eq!(out.frame_count, 15);
        assert_eq!(out.spectrogram[0].len(), 65);
        assert_eq!(out.frequency_resolution_hz, 8.0);
        assert_eq!(out.dominant_frequencies_hz[0], 128.0);
        assert_eq!(out.dominant_frequencies_hz[14], 320.0);
        assert!(out.times_s.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn uncovered_tail_is_a_warning() {
        let mut p = Stft.example();
        p["hop_size"] = json!(100);
        let (_, issues) = parse(&Stft, p);
        assert!(error_fields(&issues).is_empty());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("trailing"));
    }

    #[test]
    fn window_longer_than_signal_is_rejected() {
        let (_, issues) = parse(
            &Stft,
            json!({"signal": [0.0, 1.0, 0.0, -1.0], "sample_rate": 4.0, "window_size": 8}),
        );
        assert_eq!(error_fields(&issues), vec!["signal"]);
    }
}
