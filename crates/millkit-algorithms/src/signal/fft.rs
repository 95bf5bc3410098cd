//! Amplitude spectrum of a sampled signal.

use super::{MAX_SAMPLES, Window, amplitude_spectrum, dominant_bin};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::stats;
use serde::Serialize;
use serde_json::{Value, json};
use std::f64::consts::TAU;

pub struct Fft;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "fft",
    name: "Fast Fourier Transform",
    description: "One-sided amplitude spectrum, dominant frequency and strongest peaks of a uniformly sampled signal.",
    formula: "X_k = Σ_{n=0}^{N−1} x_n w_n e^{−2πikn/N},  A_k = 2|X_k| / Σ w_n,  f_k = k · fs / N",
    reference: "Cooley, J. W., Tukey, J. W. (1965). An algorithm for the machine calculation of complex Fourier series. Mathematics of Computation 19(90), 297-301.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("signal", "-", "samples; length a power of two unless padding is requested"),
        FieldSpec::required("sample_rate", "Hz", "sampling frequency fs"),
        FieldSpec::optional("window", "-", "none | hann (default none)"),
        FieldSpec::optional("pad_to_power_of_two", "-", "zero-pad instead of rejecting other lengths, default false"),
        FieldSpec::optional("top_peaks", "-", "local maxima to report, default 5"),
    ],
    outputs: &[
        FieldSpec::output("sample_count", "-", "input length"),
        FieldSpec::output("fft_size", "-", "transform length after any padding"),
        FieldSpec::output("padded", "-", "whether zero-padding was applied"),
        FieldSpec::output("frequency_resolution_hz", "Hz", "fs / fft_size"),
        FieldSpec::output("frequencies_hz", "Hz", "bin centre frequencies, DC to Nyquist"),
        FieldSpec::output("amplitudes", "-", "one-sided amplitude per bin"),
        FieldSpec::output("dominant_frequency_hz", "Hz", "strongest non-DC bin"),
        FieldSpec::output("dominant_amplitude", "-", "amplitude at the dominant bin"),
        FieldSpec::output("peaks", "-", "strongest local maxima: frequency_hz, amplitude"),
        FieldSpec::output("dc_offset", "-", "signal mean"),
        FieldSpec::output("rms", "-", "root mean square of the signal"),
    ],
};

#[derive(Debug, Clone)]
pub struct FftInput {
    signal: Vec<f64>,
    sample_rate: f64,
    window: Window,
    pad: bool,
    top_peaks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Peak {
    pub frequency_hz: f64,
    pub amplitude: f64,
}

#[derive(Debug, Serialize)]
pub struct FftOutput {
    pub sample_count: usize,
    pub fft_size: usize,
    pub padded: bool,
    pub frequency_resolution_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub dominant_frequency_hz: f64,
    pub dominant_amplitude: f64,
    pub peaks: Vec<Peak>,
    pub dc_offset: f64,
    pub rms: f64,
}

/// Interior local maxima, strongest first.
pub fn find_peaks(amplitudes: &[f64], resolution: f64, limit: usize) -> Vec<Peak> {
    let mut peaks: Vec<(usize, f64)> = (1..amplitudes.len().saturating_sub(1))
        .filter(|&k| amplitudes[k] > amplitudes[k - 1] && amplitudes[k] >= amplitudes[k + 1])
        .map(|k| (k, amplitudes[k]))
        .collect();
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    peaks
        .into_iter()
        .take(limit)
        .map(|(k, amplitude)| Peak {
            frequency_hz: k as f64 * resolution,
            amplitude,
        })
        .collect()
}

impl Algorithm for Fft {
    type Input = FftInput;
    type Output = FftOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        let signal: Vec<f64> = (0..256)
            .map(|i| {
                let t = i as f64 / 1000.0;
                (TAU * 125.0 * t).sin() + 0.3 * (TAU * 250.0 * t).sin()
            })
            .collect();
        json!({ "signal": signal, "sample_rate": 1000.0, "window": "hann" })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> FftInput {
        let signal = params.required_f64_array("signal");
        let sample_rate = params.required_f64("sample_rate");
        params.ensure_positive("sample_rate", sample_rate);
        let window = Window::parse(params, "none");
        let pad = params.optional_bool("pad_to_power_of_two", false);
        let top_peaks = params.optional_usize("top_peaks", 5);
        params.ensure_count("top_peaks", top_peaks, 1, 100);

        if params.has("signal") && params.ensure_min_len("signal", signal.len(), 2) {
            params.ensure(
                "signal",
                signal.len() <= MAX_SAMPLES,
                format!("must have at most {MAX_SAMPLES} samples"),
            );
            if !pad {
                params.ensure(
                    "signal",
                    signal.len().is_power_of_two(),
                    format!(
                        "length {} is not a power of two; set pad_to_power_of_two to zero-pad",
                        signal.len()
                    ),
                );
            }
        }
        FftInput {
            signal,
            sample_rate,
            window,
            pad,
            top_peaks,
        }
    }

    fn calculate(&self, input: &FftInput) -> Result<ResultEnvelope<FftOutput>, AlgorithmError> {
        let n = input.signal.len();
        if n < 2 || input.sample_rate <= 0.0 {
            return Err(AlgorithmError::InvalidInput(
                "need at least two samples and a positive sample rate".into(),
            ));
        }
        let size = n.next_power_of_two();
        if size != n && !input.pad {
            return Err(AlgorithmError::InvalidInput(format!(
                "length {n} is not a power of two"
            )));
        }

        let amplitudes = amplitude_spectrum(&input.signal, input.window, size);
        let resolution = input.sample_rate / size as f64;
        let frequencies: Vec<f64> = (0..amplitudes.len())
            .map(|k| k as f64 * resolution)
            .collect();
        let dominant = dominant_bin(&amplitudes).unwrap_or(0);
        let peaks = find_peaks(&amplitudes, resolution, input.top_peaks);

        let mut warnings = Vec::new();
        if size != n {
            warnings.push(format!(
                "zero-padded from {n} to {size} samples; bins are interpolated, not resolved"
            ));
        }
        if amplitudes.iter().skip(1).all(|a| *a < 1e-12) {
            warnings.push("no spectral content above DC".to_string());
        } else if dominant * 10 >= (amplitudes.len() - 1) * 9 {
            warnings.push(
                "dominant component lies near the Nyquist frequency; the signal may be aliased"
                    .to_string(),
            );
        }

        let rms = stats::rms(&input.signal);
        Ok(ResultEnvelope::with_warnings(
            FftOutput {
                sample_count: n,
                fft_size: size,
                padded: size != n,
                frequency_resolution_hz: resolution,
                dominant_frequency_hz: frequencies.get(dominant).copied().unwrap_or(0.0),
                dominant_amplitude: amplitudes.get(dominant).copied().unwrap_or(0.0),
                frequencies_hz: frequencies,
                amplitudes,
                peaks,
                dc_offset: stats::mean(&input.signal),
                rms,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (TAU * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn dominant_frequency_within_one_bin() {
        for freq in [50.0, 100.0, 123.4, 300.0] {
            let out = run(&Fft, json!({"signal": sine(freq, 1000.0, 512), "sample_rate": 1000.0}))
                .result;
            assert!(
                (out.dominant_frequency_hz - freq).abs() <= out.frequency_resolution_hz,
                "{freq} Hz read as {}",
                out.dominant_frequency_hz
            );
        }
    }

    #[test]
    fn example_reports_both_tones() {
        let out = run(&Fft, Fft.example()).result;
        assert_eq!(out.fft_size, 256);
        assert!((out.dominant_frequency_hz - 125.0).abs() < 1e-9);
        assert!((out.dominant_amplitude - 1.0).abs() < 1e-6);
        let freqs: Vec<f64> = out.peaks.iter().take(2).map(|p| p.frequency_hz).collect();
        assert_eq!(freqs, vec![125.0, 250.0]);
    }

    #[test]
    fn odd_length_is_rejected_unless_padding() {
        let (_, issues) = parse(&Fft, json!({"signal": [1.0, 2.0, 3.0], "sample_rate": 10.0}));
        assert_eq!(error_fields(&issues), vec!["signal"]);

        let out = run(
            &Fft,
            json!({"signal": sine(10.0, 100.0, 100), "sample_rate": 100.0, "pad_to_power_of_two": true}),
        );
        assert_eq!(out.result.fft_size, 128);
        assert!(out.result.padded);
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn constant_signal_is_all_dc() {
        let flat = vec![2.0; 8];
        let out = run(&Fft, json!({"signal": flat, "sample_rate": 8.0}));
        assert_eq!(out.result.dc_offset, 2.0);
        assert!((out.result.amplitudes[0] - 2.0).abs() < 1e-12);
        assert_eq!(out.warnings, vec!["no spectral content above DC".to_string()]);
    }

    #[test]
    fn oversized_samples_are_rejected_at_the_gate() {
        let (_, issues) = parse(
            &Fft,
            json!({"signal": [1e200, -1e200, 1e200, -1e200], "sample_rate": 100.0}),
        );
        assert_eq!(error_fields(&issues), vec!["signal"]);

        let out = run(
            &Fft,
            json!({"signal": [1e12, -1e12, 1e12, -1e12], "sample_rate": 100.0}),
        );
        assert!((out.result.rms - 1e12).abs() < 1.0);
    }
}
