//! Multi-level Haar wavelet decomposition with optional threshold denoising.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::stats;
use serde::Serialize;
use serde_json::{Value, json};
use std::f64::consts::FRAC_1_SQRT_2;

const MAX_LEVELS: usize = 16;
const DEFAULT_LEVELS: usize = 3;
/// `median(|d|) / 0.6745` estimates the noise σ of Gaussian detail coefficients.
const MAD_TO_SIGMA: f64 = 0.6745;

pub struct Wavelet;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "wavelet",
    name: "Haar Wavelet Transform",
    description: "Orthonormal Haar decomposition into approximation and per-level detail coefficients, with energy per level and optional soft or hard threshold denoising.",
    formula: "a_i = (x_2i + x_2i+1)/√2,  d_i = (x_2i − x_2i+1)/√2,  λ = σ̂ √(2 ln N),  σ̂ = median(|d₁|)/0.6745",
    reference: "Mallat, S. (1989). A theory for multiresolution signal decomposition: the wavelet representation. IEEE PAMI 11(7), 674-693; Donoho, D. L., Johnstone, I. M. (1994). Ideal spatial adaptation by wavelet shrinkage. Biometrika 81(3), 425-455.",
    safety_class: SafetyClass::Standard,
    domain: Domain::SignalControl,
    inputs: &[
        FieldSpec::required("signal", "-", "samples; length divisible by 2^levels"),
        FieldSpec::optional("levels", "-", "decomposition depth, default up to 3"),
        FieldSpec::optional("denoise", "-", "none | soft | hard (default none)"),
        FieldSpec::optional("threshold", "-", "explicit threshold; universal threshold when omitted"),
    ],
    outputs: &[
        FieldSpec::output("levels", "-", "decomposition depth used"),
        FieldSpec::output("approximation", "-", "coarsest approximation coefficients"),
        FieldSpec::output("details", "-", "detail coefficients per level, finest first"),
        FieldSpec::output("energy_by_level", "-", "level, energy, fraction of total"),
        FieldSpec::output("approximation_energy", "-", "energy in the approximation"),
        FieldSpec::output("denoised", "-", "reconstruction after thresholding, null without denoise"),
        FieldSpec::output("threshold_used", "-", "null without denoise"),
        FieldSpec::output("coefficients_zeroed", "-", "detail coefficients set to zero"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shrinkage {
    Soft,
    Hard,
}

#[derive(Debug, Clone)]
pub struct WaveletInput {
    signal: Vec<f64>,
    levels: usize,
    shrinkage: Option<Shrinkage>,
    threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LevelEnergy {
    pub level: usize,
    pub energy: f64,
    pub fraction: f64,
}

#[derive(Debug, Serialize)]
pub struct WaveletOutput {
    pub levels: usize,
    pub approximation: Vec<f64>,
    pub details: Vec<Vec<f64>>,
    pub energy_by_level: Vec<LevelEnergy>,
    pub approximation_energy: f64,
    pub denoised: Option<Vec<f64>>,
    pub threshold_used: Option<f64>,
    pub coefficients_zeroed: usize,
}

/// One analysis step: `(approximation, detail)`, each half as long.
pub fn haar_step(x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.chunks_exact(2)
        .map(|p| ((p[0] + p[1]) * FRAC_1_SQRT_2, (p[0] - p[1]) * FRAC_1_SQRT_2))
        .unzip()
}

/// One synthesis step, the inverse of [`haar_step`].
pub fn haar_inverse_step(approximation: &[f64], detail: &[f64]) -> Vec<f64> {
    approximation
        .iter()
        .zip(detail)
        .flat_map(|(a, d)| [(a + d) * FRAC_1_SQRT_2, (a - d) * FRAC_1_SQRT_2])
        .collect()
}

/// Largest `L ≤ cap` with `2^L` dividing `n`.
fn divisible_levels(n: usize, cap: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (n.trailing_zeros() as usize).min(cap)
}

fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

impl Algorithm for Wavelet {
    type Input = WaveletInput;
    type Output = WaveletOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "signal": [4.0, 6.0, 10.0, 12.0, 8.0, 6.0, 5.0, 5.0, 4.1, 5.9, 10.2, 11.8, 7.9, 6.1, 5.0, 5.0],
            "levels": 2,
            "denoise": "soft"
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> WaveletInput {
        let signal = params.required_f64_array("signal");
        let n = signal.len();
        let levels = if params.has("levels") {
            let levels = params.optional_usize("levels", DEFAULT_LEVELS);
            if params.ensure_count("levels", levels, 1, MAX_LEVELS) && params.has("signal") {
                params.ensure(
                    "signal",
                    n % (1usize << levels) == 0 && n > 0,
                    format!("length {n} must be a positive multiple of 2^levels = {}", 1usize << levels),
                );
            }
            levels
        } else {
            let levels = divisible_levels(n, DEFAULT_LEVELS);
            if params.has("signal") {
                params.ensure("signal", levels > 0, format!("length {n} must be even"));
            }
            levels
        };
        let shrinkage = match params.choice("denoise", &["none", "soft", "hard"], "none") {
            "soft" => Some(Shrinkage::Soft),
            "hard" => Some(Shrinkage::Hard),
            _ => None,
        };
        let threshold = params.maybe_f64("threshold");
        if let Some(t) = threshold {
            params.ensure_non_negative("threshold", t);
            if shrinkage.is_none() {
                params.warning("threshold", "ignored because denoise is none");
            }
        }
        WaveletInput {
            signal,
            levels,
            shrinkage,
            threshold,
        }
    }

    fn calculate(
        &self,
        input: &WaveletInput,
    ) -> Result<ResultEnvelope<WaveletOutput>, AlgorithmError> {
        let n = input.signal.len();
        if input.levels == 0 || input.levels > MAX_LEVELS || n == 0 || n % (1usize << input.levels) != 0 {
            return Err(AlgorithmError::InvalidInput(format!(
                "length {n} cannot be decomposed to {} level(s)",
                input.levels
            )));
        }

        let mut approximation = input.signal.clone();
        let mut details = Vec::with_capacity(input.levels);
        for _ in 0..input.levels {
            let (a, d) = haar_step(&approximation);
            approximation = a;
            details.push(d);
        }

        let total = energy(&input.signal);
        let fraction = |e: f64| if total > 0.0 { e / total } else { 0.0 };
        let energy_by_level = details
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let e = energy(d);
                LevelEnergy {
                    level: i + 1,
                    energy: e,
                    fraction: fraction(e),
                }
            })
            .collect();
        let approximation_energy = energy(&approximation);

        let mut warnings = Vec::new();
        let mut zeroed = 0;
        let (denoised, threshold_used) = match input.shrinkage {
            None => (None, None),
            Some(shrinkage) => {
                let lambda = input.threshold.unwrap_or_else(|| {
                    let abs: Vec<f64> = details[0].iter().map(|d| d.abs()).collect();
                    let sigma = stats::median(&abs) / MAD_TO_SIGMA;
                    sigma * (2.0 * (n as f64).ln()).sqrt()
                });
                let shrunk: Vec<Vec<f64>> = details
                    .iter()
                    .map(|level| {
                        level
                            .iter()
                            .map(|&d| {
                                let kept = match shrinkage {
                                    Shrinkage::Hard if d.abs() > lambda => d,
                                    Shrinkage::Soft if d.abs() > lambda => d.signum() * (d.abs() - lambda),
                                    _ => 0.0,
                                };
                                if kept == 0.0 && d != 0.0 {
                                    zeroed += 1;
                                }
                                kept
                            })
                            .collect()
                    })
                    .collect();
                let mut x = approximation.clone();
                for d in shrunk.iter().rev() {
                    x = haar_inverse_step(&x, d);
                }
                let detail_count: usize = details.iter().map(Vec::len).sum();
                if detail_count > 0 && zeroed == detail_count {
                    warnings.push(
                        "threshold removed every detail coefficient; only the approximation remains"
                            .to_string(),
                    );
                }
                (Some(x), Some(lambda))
            }
        };

        Ok(ResultEnvelope::with_warnings(
            WaveletOutput {
                levels: input.levels,
                approximation,
                details,
                energy_by_level,
                approximation_energy,
                denoised,
                threshold_used,
                coefficients_zeroed: zeroed,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    #[test]
    fn transform_preserves_energy() {
        let out = run(&Wavelet, json!({"signal": [1.0, 3.0, -2.0, 5.0, 0.5, 0.5, 7.0, -1.0]})).result;
        assert_eq!(out.levels, 3);
        assert_eq!(out.approximation.len(), 1);
        let detail_energy: f64 = out.energy_by_level.iter().map(|l| l.energy).sum();
        let total = 1.0 + 9.0 + 4.0 + 25.0 + 0.25 + 0.25 + 49.0 + 1.0;
        assert!((detail_energy + out.approximation_energy - total).abs() < 1e-9);
    }

    #[test]
    fn zero_threshold_reconstructs_exactly() {
        let signal = vec![2.0, -1.0, 4.0, 4.5, 0.0, 3.0, -2.0, 1.0];
        let out = run(
            &Wavelet,
            json!({"signal": signal, "denoise": "hard", "threshold": 0.0}),
        )
        .result;
        for (a, b) in out.denoised.unwrap().iter().zip(&signal) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn soft_denoising_smooths_the_example() {
        let out = run(&Wavelet, Wavelet.example()).result;
        assert!(out.threshold_used.unwrap() > 0.0);
        assert!(out.coefficients_zeroed > 0);
        assert_eq!(out.denoised.unwrap().len(), 16);
    }

    #[test]
    fn length_must_divide() {
        let (_, issues) = parse(&Wavelet, json!({"signal": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], "levels": 2}));
        assert_eq!(error_fields(&issues), vec!["signal"]);
        let (_, issues) = parse(&Wavelet, json!({"signal": [1.0, 2.0, 3.0]}));
        assert_eq!(error_fields(&issues), vec!["signal"]);
    }
}
