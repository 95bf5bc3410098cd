//! Kienzle cutting-force model.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

/// Rake angle the tabulated `kc1.1` values are measured at.
const REFERENCE_RAKE_DEG: f64 = 6.0;
/// Relative change of `kc` per degree of rake away from the reference.
const RAKE_SENSITIVITY: f64 = 0.015;
const MIN_APPROACH_DEG: f64 = 1.0;

pub struct KienzleForce;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "kienzle_force",
    name: "Kienzle Cutting Force",
    description: "Main cutting force and power from the Kienzle specific-cutting-force law.",
    formula: "Fc = kc1.1 · b · h^(1 − mc) · Kγ · Kw,  h = f · sin κ,  b = ap / sin κ",
    reference: "Kienzle, O. (1952). Die Bestimmung von Kräften und Leistungen an spanenden Werkzeugen und Werkzeugmaschinen. VDI-Z 94, 299-305.",
    safety_class: SafetyClass::SafetyCritical,
    domain: Domain::ManufacturingPhysics,
    inputs: &[
        FieldSpec::required("specific_cutting_force", "N/mm²", "kc1.1, specific force at h = b = 1 mm"),
        FieldSpec::required("mc", "-", "Kienzle exponent, 0 ≤ mc < 1"),
        FieldSpec::required("feed", "mm/rev", "feed per revolution"),
        FieldSpec::required("depth_of_cut", "mm", "axial depth of cut ap"),
        FieldSpec::optional("approach_angle_deg", "deg", "tool cutting-edge angle κr (default 90)"),
        FieldSpec::optional("rake_angle_deg", "deg", "rake angle γ; corrects kc relative to 6°"),
        FieldSpec::optional("tool_wear_factor", "-", "Kw between 1.0 (sharp) and 2.0 (default 1.0)"),
        FieldSpec::optional("cutting_speed", "m/min", "when given, cutting power is reported"),
    ],
    outputs: &[
        FieldSpec::output("cutting_force_n", "N", "main cutting force Fc"),
        FieldSpec::output("specific_cutting_force", "N/mm²", "effective kc at this chip thickness"),
        FieldSpec::output("chip_thickness_mm", "mm", "undeformed chip thickness h"),
        FieldSpec::output("chip_width_mm", "mm", "chip width b"),
        FieldSpec::output("correction_factor", "-", "Kγ · Kw"),
        FieldSpec::output("cutting_power_kw", "kW", "Fc · vc, null without cutting_speed"),
    ],
};

#[derive(Debug, Clone)]
pub struct KienzleInput {
    kc11: f64,
    mc: f64,
    feed: f64,
    depth: f64,
    approach_deg: f64,
    rake_deg: Option<f64>,
    wear: f64,
    speed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct KienzleOutput {
    pub cutting_force_n: f64,
    pub specific_cutting_force: f64,
    pub chip_thickness_mm: f64,
    pub chip_width_mm: f64,
    pub correction_factor: f64,
    pub cutting_power_kw: Option<f64>,
}

impl Algorithm for KienzleForce {
    type Input = KienzleInput;
    type Output = KienzleOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "specific_cutting_force": 1700.0,
            "mc": 0.25,
            "feed": 0.2,
            "depth_of_cut": 2.0,
            "approach_angle_deg": 90.0,
            "cutting_speed": 200.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> KienzleInput {
        let kc11 = params.required_f64("specific_cutting_force");
        params.ensure_positive("specific_cutting_force", kc11);
        let mc = params.required_f64("mc");
        params.ensure("mc", (0.0..1.0).contains(&mc), "must be in [0, 1)");
        let feed = params.required_f64("feed");
        params.ensure_positive("feed", feed);
        let depth = params.required_f64("depth_of_cut");
        params.ensure_positive("depth_of_cut", depth);

        let approach_deg = params.optional_f64("approach_angle_deg", 90.0);
        params.ensure(
            "approach_angle_deg",
            (MIN_APPROACH_DEG..=90.0).contains(&approach_deg),
            format!("must be between {MIN_APPROACH_DEG} and 90"),
        );
        let rake_deg = params.maybe_f64("rake_angle_deg");
        if let Some(r) = rake_deg {
            params.ensure_range("rake_angle_deg", r, -30.0, 30.0);
        }
        let wear = params.optional_f64("tool_wear_factor", 1.0);
        params.ensure_range("tool_wear_factor", wear, 1.0, 2.0);
        let speed = params.maybe_f64("cutting_speed");
        if let Some(v) = speed {
            params.ensure_positive("cutting_speed", v);
        }

        if !params.failed("feed") && !params.failed("approach_angle_deg") {
            let h = feed * approach_deg.to_radians().sin();
            if h > 0.0 && !(0.05..=1.6).contains(&h) {
                params.warning(
                    "feed",
                    format!("chip thickness {h:.3} mm is outside the 0.05-1.6 mm range kc1.1 is fitted on"),
                );
            }
        }

        KienzleInput {
            kc11,
            mc,
            feed,
            depth,
            approach_deg,
            rake_deg,
            wear,
            speed,
        }
    }

    fn calculate(
        &self,
        input: &KienzleInput,
    ) -> Result<ResultEnvelope<KienzleOutput>, AlgorithmError> {
        let sin_k = input.approach_deg.to_radians().sin();
        if !(sin_k > 0.0 && input.feed > 0.0) {
            return Err(AlgorithmError::InvalidInput(
                "feed and approach angle must be positive".into(),
            ));
        }
        let h = input.feed * sin_k;
        let b = input.depth / sin_k;

        let rake_factor = input
            .rake_deg
            .map(|g| 1.0 - RAKE_SENSITIVITY * (g - REFERENCE_RAKE_DEG))
            .unwrap_or(1.0);
        let correction = rake_factor * input.wear;
        let kc = input.kc11 * h.powf(-input.mc) * correction;
        let force = kc * b * h;
        let power = input.speed.map(|v| force * v / 60_000.0);

        let mut warnings = Vec::new();
        if input.wear > 1.5 {
            warnings.push(format!(
                "tool wear factor {:.2} raises the force by {:.0}%; check spindle and fixture margins",
                input.wear,
                (input.wear - 1.0) * 100.0
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            KienzleOutput {
                cutting_force_n: force,
                specific_cutting_force: kc,
                chip_thickness_mm: h,
                chip_width_mm: b,
                correction_factor: correction,
                cutting_power_kw: power,
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
    fn textbook_turning_case() {
        let out = run(&KienzleForce, KienzleForce.example()).result;
        assert!((out.chip_thickness_mm - 0.2).abs() < 1e-12);
        assert!((out.specific_cutting_force - 2542.09).abs() < 0.1);
        assert!((out.cutting_force_n - 1016.84).abs() < 0.1);
        assert!((out.cutting_power_kw.unwrap() - 3.389).abs() < 1e-3);
    }

    #[test]
    fn force_grows_with_feed_and_depth() {
        let force = |feed: f64, depth: f64| {
            run(
                &KienzleForce,
                json!({"specific_cutting_force": 1700.0, "mc": 0.25, "feed": feed, "depth_of_cut": depth}),
            )
            .result
            .cutting_force_n
        };
        assert!(force(0.3, 2.0) > force(0.2, 2.0));
        assert!(force(0.2, 3.0) > force(0.2, 2.0));
    }

    #[test]
    fn every_missing_field_is_reported() {
        let (_, issues) = parse(&KienzleForce, json!({"mc": 1.5}));
        assert_eq!(
            error_fields(&issues),
            vec!["specific_cutting_force", "mc", "feed", "depth_of_cut"]
        );
    }

    #[test]
    fn thin_chips_warn_without_failing() {
        let (_, issues) = parse(
            &KienzleForce,
            json!({"specific_cutting_force": 1700.0, "mc": 0.25, "feed": 0.01, "depth_of_cut": 1.0}),
        );
        assert!(error_fields(&issues).is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn negative_rake_raises_force() {
        let base = KienzleForce.example();
        let mut negative = base.clone();
        negative["rake_angle_deg"] = json!(-6.0);
        let neutral = run(&KienzleForce, base).result.cutting_force_n;
        let raised = run(&KienzleForce, negative).result.cutting_force_n;
        assert!((raised / neutral - 1.18).abs() < 1e-9);
    }
}
