//! Regenerative-chatter stability lobes for a single-degree-of-freedom tool.
//!
//! The tool is modelled by its dominant mode, `G(ω) = 1 / (k (1 − r² + 2iζr))`
//! with `r = ω/ωn`. Chatter can only occur where `Re G < 0`, that is `r > 1`,
//! so each lobe is swept over a band of frequencies just above resonance.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::{Complex, vector};
use serde::Serialize;
use serde_json::{Value, json};
use std::f64::consts::TAU;

/// Lower limits that keep the FRF real part and the teeth-in-cut average away from zero.
const MIN_DAMPING: f64 = 1e-4;
const MIN_IMMERSION: f64 = 1e-6;

pub struct StabilityLobes;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "stability_lobes",
    name: "Stability Lobe Diagram",
    description: "Chatter-free depth of cut against spindle speed for a single-mode tool, with an optional operating-point check.",
    formula: "b_lim = −1 / (2 Ks Re[G(ωc)] N*),  Ω = 60 ωc / (2π N (k + ε/2π)),  ε = 2π − 2 atan(Re G / Im G)",
    reference: "Tlusty, J., Polacek, M. (1963). The stability of machine tools against self-excited vibrations in machining. Proc. ASME Int. Research in Production Engineering, 465-474; Schmitz, T. L., Smith, K. S. (2009). Machining Dynamics, ch. 4.",
    safety_class: SafetyClass::SafetyCritical,
    domain: Domain::ManufacturingPhysics,
    inputs: &[
        FieldSpec::required("natural_frequency", "Hz", "dominant mode frequency fn"),
        FieldSpec::required("damping_ratio", "-", "modal damping ζ, 0 < ζ < 0.5"),
        FieldSpec::required("stiffness", "N/m", "modal stiffness k"),
        FieldSpec::required("specific_cutting_force", "N/mm²", "cutting force coefficient Ks"),
        FieldSpec::required("number_of_teeth", "-", "teeth on the cutter N"),
        FieldSpec::optional("radial_immersion", "-", "ae / D in (0, 1], default 1.0"),
        FieldSpec::optional("num_lobes", "-", "lobes to compute, default 5"),
        FieldSpec::optional("points_per_lobe", "-", "samples per lobe, default 100"),
        FieldSpec::optional("spindle_speed", "rpm", "operating point to check (with depth_of_cut)"),
        FieldSpec::optional("depth_of_cut", "mm", "operating point to check (with spindle_speed)"),
    ],
    outputs: &[
        FieldSpec::output("lobes", "-", "per lobe: index, spindle_speed_rpm[], depth_mm[]"),
        FieldSpec::output("critical_depth_mm", "mm", "depth stable at every spindle speed"),
        FieldSpec::output("mean_teeth_in_cut", "-", "N*"),
        FieldSpec::output("chatter_frequency_range_hz", "Hz", "[lowest, highest] swept chatter frequency"),
        FieldSpec::output("preferred_spindle_speeds_rpm", "rpm", "60 fn / (N (k + 1)) per lobe"),
        FieldSpec::output("operating_point", "-", "null unless spindle_speed and depth_of_cut are given"),
    ],
};

#[derive(Debug, Clone)]
pub struct StabilityInput {
    natural_frequency: f64,
    damping: f64,
    stiffness: f64,
    ks: f64,
    teeth: usize,
    immersion: f64,
    num_lobes: usize,
    points: usize,
    operating: Option<(f64, f64)>,
}

#[derive(Debug, Serialize)]
pub struct Lobe {
    pub index: usize,
    pub spindle_speed_rpm: Vec<f64>,
    pub depth_mm: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct OperatingPoint {
    pub spindle_speed_rpm: f64,
    pub depth_of_cut_mm: f64,
    pub limit_depth_mm: f64,
    pub stable: bool,
}

#[derive(Debug, Serialize)]
pub struct StabilityOutput {
    pub lobes: Vec<Lobe>,
    pub critical_depth_mm: f64,
    pub mean_teeth_in_cut: f64,
    pub chatter_frequency_range_hz: [f64; 2],
    pub preferred_spindle_speeds_rpm: Vec<f64>,
    pub operating_point: Option<OperatingPoint>,
}

impl StabilityInput {
    fn frf(&self, r: f64) -> Complex {
        let denominator = Complex::new(
            self.stiffness * (1.0 - r * r),
            self.stiffness * 2.0 * self.damping * r,
        );
        denominator.recip().unwrap_or(Complex::ZERO)
    }

    fn mean_teeth_in_cut(&self) -> f64 {
        let exit_angle = (1.0 - 2.0 * self.immersion).clamp(-1.0, 1.0).acos();
        self.teeth as f64 * exit_angle / TAU
    }

    /// Ks converted from N/mm² to N/m².
    fn ks_si(&self) -> f64 {
        self.ks * 1e6
    }
}

/// Linear interpolation of a lobe at `speed`; `None` outside its span.
fn depth_at(lobe: &Lobe, speed: f64) -> Option<f64> {
    lobe.spindle_speed_rpm
        .windows(2)
        .zip(lobe.depth_mm.windows(2))
        .find_map(|(s, d)| {
            let (lo, hi) = if s[0] <= s[1] { (0, 1) } else { (1, 0) };
            if speed < s[lo] || speed > s[hi] {
                return None;
            }
            let span = s[hi] - s[lo];
            if span <= 0.0 {
                return Some(d[lo].min(d[hi]));
            }
            let t = (speed - s[lo]) / span;
            Some(d[lo] + t * (d[hi] - d[lo]))
        })
}

impl Algorithm for StabilityLobes {
    type Input = StabilityInput;
    type Output = StabilityOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "natural_frequency": 800.0,
            "damping_ratio": 0.03,
            "stiffness": 2.0e7,
            "specific_cutting_force": 2000.0,
            "number_of_teeth": 4,
            "spindle_speed": 10000.0,
            "depth_of_cut": 0.2
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> StabilityInput {
        let natural_frequency = params.required_f64("natural_frequency");
        params.ensure_positive("natural_frequency", natural_frequency);
        let damping = params.required_f64("damping_ratio");
        params.ensure(
            "damping_ratio",
            (MIN_DAMPING..0.5).contains(&damping),
            format!("must be in [{MIN_DAMPING:e}, 0.5)"),
        );
        let stiffness = params.required_f64("stiffness");
        params.ensure_positive("stiffness", stiffness);
        let ks = params.required_f64("specific_cutting_force");
        params.ensure_positive("specific_cutting_force", ks);
        let teeth = params.required_usize("number_of_teeth");
        params.ensure_count("number_of_teeth", teeth, 1, 64);
        let immersion = params.optional_f64("radial_immersion", 1.0);
        params.ensure(
            "radial_immersion",
            (MIN_IMMERSION..=1.0).contains(&immersion),
            format!("must be in [{MIN_IMMERSION:e}, 1]"),
        );
        let num_lobes = params.optional_usize("num_lobes", 5);
        params.ensure_count("num_lobes", num_lobes, 1, 50);
        let points = params.optional_usize("points_per_lobe", 100);
        params.ensure_count("points_per_lobe", points, 10, 2000);

        let speed = params.maybe_f64("spindle_speed");
        let depth = params.maybe_f64("depth_of_cut");
        let operating = match (speed, depth) {
            (Some(s), Some(d)) => {
                params.ensure_positive("spindle_speed", s);
                params.ensure_positive("depth_of_cut", d);
                Some((s, d))
            }
            (Some(_), None) => {
                params.ensure("depth_of_cut", false, "is required when spindle_speed is given");
                None
            }
            (None, Some(_)) => {
                params.ensure("spindle_speed", false, "is required when depth_of_cut is given");
                None
            }
            (None, None) => None,
        };

        StabilityInput {
            natural_frequency,
            damping,
            stiffness,
            ks,
            teeth,
            immersion,
            num_lobes,
            points,
            operating,
        }
    }

    fn calculate(
        &self,
        input: &StabilityInput,
    ) -> Result<ResultEnvelope<StabilityOutput>, AlgorithmError> {
        if !(input.natural_frequency > 0.0
            && input.damping > 0.0
            && input.stiffness > 0.0
            && input.ks > 0.0
            && input.teeth > 0
            && input.immersion > 0.0
            && input.points >= 2)
        {
            return Err(AlgorithmError::InvalidInput(
                "modal parameters, Ks, teeth and immersion must be positive".into(),
            ));
        }
        let n_star = input.mean_teeth_in_cut();
        let teeth = input.teeth as f64;
        let ks = input.ks_si();

        let r_start = 1.0 + 0.01 * input.damping;
        let r_end = 1.0 + (10.0 * input.damping).max(0.5);
        let ratios = vector::linspace(r_start, r_end, input.points);

        // Depth and phase depend only on r; the lobe index only shifts speed.
        let samples: Vec<(f64, f64)> = ratios
            .iter()
            .map(|&r| {
                let g = input.frf(r);
                let depth_m = -1.0 / (2.0 * ks * g.re * n_star);
                let epsilon = TAU - 2.0 * (g.re / g.im).atan();
                (depth_m * 1e3, epsilon)
            })
            .collect();

        let lobes: Vec<Lobe> = (0..input.num_lobes)
            .map(|k| {
                let (spindle_speed_rpm, depth_mm) = ratios
                    .iter()
                    .zip(&samples)
                    .map(|(&r, &(depth, epsilon))| {
                        let chatter_hz = r * input.natural_frequency;
                        let speed = 60.0 * chatter_hz / (teeth * (k as f64 + epsilon / TAU));
                        (speed, depth)
                    })
                    .unzip();
                Lobe {
                    index: k,
                    spindle_speed_rpm,
                    depth_mm,
                }
            })
            .collect();

        let critical_depth_mm = 2.0 * input.stiffness * input.damping * (1.0 + input.damping)
            / (ks * n_star)
            * 1e3;

        let preferred = (0..input.num_lobes)
            .map(|k| 60.0 * input.natural_frequency / (teeth * (k as f64 + 1.0)))
            .collect();

        let mut warnings = Vec::new();
        let operating_point = input.operating.map(|(speed, depth)| {
            let limit = lobes
                .iter()
                .filter_map(|lobe| depth_at(lobe, speed))
                .fold(f64::INFINITY, f64::min)
                .max(critical_depth_mm);
            // Outside every lobe's span only the absolute limit is known.
            let limit = if limit.is_finite() { limit } else { critical_depth_mm };
            let stable = depth < limit;
            if !stable {
                warnings.push(format!(
                    "operating point {speed:.0} rpm at {depth:.3} mm lies above the stability limit of {limit:.3} mm; expect chatter"
                ));
            }
            OperatingPoint {
                spindle_speed_rpm: speed,
                depth_of_cut_mm: depth,
                limit_depth_mm: limit,
                stable,
            }
        });

        if n_star < 0.5 {
            warnings.push(format!(
                "mean teeth in cut is {n_star:.2}; the averaged model is unreliable at low immersion"
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            StabilityOutput {
                lobes,
                critical_depth_mm,
                mean_teeth_in_cut: n_star,
                chatter_frequency_range_hz: [
                    r_start * input.natural_frequency,
                    r_end * input.natural_frequency,
                ],
                preferred_spindle_speeds_rpm: preferred,
                operating_point,
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
    fn critical_depth_matches_closed_form() {
        let out = run(&StabilityLobes, StabilityLobes.example()).result;
        assert!((out.mean_teeth_in_cut - 2.0).abs() < 1e-12);
        assert!((out.critical_depth_mm - 0.309).abs() < 1e-9);
    }

    #[test]
    fn every_lobe_point_is_at_or_above_the_critical_depth() {
        let out = run(&StabilityLobes, StabilityLobes.example()).result;
        assert_eq!(out.lobes.len(), 5);
        for lobe in &out.lobes {
            assert_eq!(lobe.depth_mm.len(), 100);
            for d in &lobe.depth_mm {
                assert!(*d >= out.critical_depth_mm * (1.0 - 1e-9));
            }
            assert!(lobe.spindle_speed_rpm.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn higher_lobes_run_slower() {
        let out = run(&StabilityLobes, StabilityLobes.example()).result;
        let first = out.lobes[0].spindle_speed_rpm[0];
        let second = out.lobes[1].spindle_speed_rpm[0];
        assert!(second < first);
    }

    #[test]
    fn shallow_cut_is_stable_and_deep_cut_is_not() {
        let out = run(&StabilityLobes, StabilityLobes.example());
        assert!(out.result.operating_point.as_ref().unwrap().stable);
        assert!(out.warnings.is_empty());

        let mut deep = StabilityLobes.example();
        deep["depth_of_cut"] = json!(50.0);
        let out = run(&StabilityLobes, deep);
        assert!(!out.result.operating_point.as_ref().unwrap().stable);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn half_an_operating_point_is_an_error() {
        let mut p = StabilityLobes.example();
        p.as_object_mut().unwrap().remove("depth_of_cut");
        let (_, issues) = parse(&StabilityLobes, p);
        assert_eq!(error_fields(&issues), vec!["depth_of_cut"]);
    }

    #[test]
    fn vanishing_immersion_is_rejected_and_light_immersion_stays_finite() {
        let mut p = StabilityLobes.example();
        p["radial_immersion"] = json!(1e-17);
        let (_, issues) = parse(&StabilityLobes, p.clone());
        assert_eq!(error_fields(&issues), vec!["radial_immersion"]);

        p["radial_immersion"] = json!(1e-5);
        let out = run(&StabilityLobes, p);
        assert!(out.result.critical_depth_mm.is_finite());
        assert!(
            out.result
                .lobes
                .iter()
                .flat_map(|l| &l.depth_mm)
                .all(|d| d.is_finite())
        );
        assert!(!out.warnings.is_empty());
    }
}
