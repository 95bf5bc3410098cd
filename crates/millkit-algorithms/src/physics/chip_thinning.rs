//! Radial chip thinning and feed compensation for milling.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

/// Below this ae/D the engagement arc vanishes in floating point.
const MIN_ENGAGEMENT_RATIO: f64 = 1e-6;
const MIN_LEAD_DEG: f64 = 1.0;

pub struct ChipThinning;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "chip_thinning",
    name: "Chip Thinning Compensation",
    description: "Maximum and mean chip thickness at light radial engagement, and the feed per tooth that restores a target chip thickness.",
    formula: "φ = acos(1 − 2ae/D),  hex = fz · sin φ · sin κ (ae < D/2, else fz · sin κ),  fz' = h_target · fz / hex",
    reference: "Sandvik Coromant (2017). Metal Cutting Technology Training Handbook, milling chapter.",
    safety_class: SafetyClass::Standard,
    domain: Domain::ManufacturingPhysics,
    inputs: &[
        FieldSpec::required("tool_diameter", "mm", "cutter diameter D"),
        FieldSpec::required("radial_engagement", "mm", "radial width of cut ae, 0 < ae ≤ D"),
        FieldSpec::required("feed_per_tooth", "mm", "programmed feed per tooth fz"),
        FieldSpec::optional("lead_angle_deg", "deg", "cutting-edge angle κ, default 90"),
        FieldSpec::optional("target_chip_thickness", "mm", "desired hex, default fz"),
        FieldSpec::optional("number_of_teeth", "-", "with spindle_speed, reports the table feed"),
        FieldSpec::optional("spindle_speed", "rpm", "with number_of_teeth, reports the table feed"),
    ],
    outputs: &[
        FieldSpec::output("engagement_angle_deg", "deg", "arc of engagement φ"),
        FieldSpec::output("max_chip_thickness_mm", "mm", "hex at the programmed feed"),
        FieldSpec::output("mean_chip_thickness_mm", "mm", "hm over the engagement arc"),
        FieldSpec::output("thinning_factor", "-", "fz / hex, ≥ 1"),
        FieldSpec::output("compensated_feed_per_tooth", "mm", "fz that yields the target hex"),
        FieldSpec::output("table_feed_mm_min", "mm/min", "null unless teeth and spindle speed are given"),
    ],
};

#[derive(Debug, Clone)]
pub struct ChipThinningInput {
    diameter: f64,
    engagement: f64,
    feed_per_tooth: f64,
    lead_deg: f64,
    target: Option<f64>,
    teeth: Option<usize>,
    spindle_speed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ChipThinningOutput {
    pub engagement_angle_deg: f64,
    pub max_chip_thickness_mm: f64,
    pub mean_chip_thickness_mm: f64,
    pub thinning_factor: f64,
    pub compensated_feed_per_tooth: f64,
    pub table_feed_mm_min: Option<f64>,
}

impl Algorithm for ChipThinning {
    type Input = ChipThinningInput;
    type Output = ChipThinningOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "tool_diameter": 10.0,
            "radial_engagement": 1.0,
            "feed_per_tooth": 0.05,
            "number_of_teeth": 4,
            "spindle_speed": 8000.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> ChipThinningInput {
        let diameter = params.required_f64("tool_diameter");
        params.ensure_positive("tool_diameter", diameter);
        let engagement = params.required_f64("radial_engagement");
        if params.ensure_positive("radial_engagement", engagement) && !params.failed("tool_diameter") {
            let ratio = engagement / diameter;
            params.ensure(
                "radial_engagement",
                (MIN_ENGAGEMENT_RATIO..=1.0).contains(&ratio),
                format!("must be between {MIN_ENGAGEMENT_RATIO:e} and 1 times tool_diameter"),
            );
        }
        let feed_per_tooth = params.required_f64("feed_per_tooth");
        params.ensure_positive("feed_per_tooth", feed_per_tooth);
        let lead_deg = params.optional_f64("lead_angle_deg", 90.0);
        params.ensure(
            "lead_angle_deg",
            (MIN_LEAD_DEG..=90.0).contains(&lead_deg),
            format!("must be between {MIN_LEAD_DEG} and 90"),
        );
        let target = params.maybe_f64("target_chip_thickness");
        if let Some(t) = target {
            params.ensure_positive("target_chip_thickness", t);
        }
        let teeth = params
            .has("number_of_teeth")
            .then(|| params.optional_usize("number_of_teeth", 1));
        if let Some(z) = teeth {
            params.ensure_count("number_of_teeth", z, 1, 64);
        }
        let spindle_speed = params.maybe_f64("spindle_speed");
        if let Some(n) = spindle_speed {
            params.ensure_positive("spindle_speed", n);
        }
        ChipThinningInput {
            diameter,
            engagement,
            feed_per_tooth,
            lead_deg,
            target,
            teeth,
            spindle_speed,
        }
    }

    fn calculate(
        &self,
        input: &ChipThinningInput,
    ) -> Result<ResultEnvelope<ChipThinningOutput>, AlgorithmError> {
        if !(input.diameter > 0.0 && input.engagement > 0.0 && input.feed_per_tooth > 0.0) {
            return Err(AlgorithmError::InvalidInput(
                "diameter, engagement and feed must be positive".into(),
            ));
        }
        let ratio = (input.engagement / input.diameter).min(1.0);
        let phi = (1.0 - 2.0 * ratio).clamp(-1.0, 1.0).acos();
        let sin_lead = input.lead_deg.to_radians().sin();

        let radial = if ratio < 0.5 { phi.sin() } else { 1.0 };
        let scale = radial * sin_lead;
        if scale <= 0.0 {
            return Err(AlgorithmError::InvalidInput(
                "engagement geometry produces no chip".into(),
            ));
        }
        let hex = input.feed_per_tooth * scale;
        let hm = input.feed_per_tooth * sin_lead * (1.0 - phi.cos()) / phi;
        let target = input.target.unwrap_or(input.feed_per_tooth);
        let compensated = target / scale;
        let table_feed = match (input.teeth, input.spindle_speed) {
            (Some(z), Some(n)) => Some(compensated * z as f64 * n),
            _ => None,
        };

        let mut warnings = Vec::new();
        if compensated > 3.0 * input.feed_per_tooth {
            warnings.push(format!(
                "compensated feed {compensated:.4} mm is more than 3x the programmed feed; verify edge strength"
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            ChipThinningOutput {
                engagement_angle_deg: phi.to_degrees(),
                max_chip_thickness_mm: hex,
                mean_chip_thickness_mm: hm,
                thinning_factor: input.feed_per_tooth / hex,
                compensated_feed_per_tooth: compensated,
                table_feed_mm_min: table_feed,
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
    fn ten_percent_engagement() {
        let out = run(&ChipThinning, ChipThinning.example()).result;
        assert!((out.engagement_angle_deg - 36.8699).abs() < 1e-3);
        assert!((out.max_chip_thickness_mm - 0.03).abs() < 1e-12);
        assert!((out.compensated_feed_per_tooth - 0.05 / 0.6).abs() < 1e-12);
        assert!((out.table_feed_mm_min.unwrap() - 0.05 / 0.6 * 4.0 * 8000.0).abs() < 1e-6);
        assert!(out.mean_chip_thickness_mm < out.max_chip_thickness_mm);
    }

    #[test]
    fn half_engagement_has_no_thinning() {
        let out = run(
            &ChipThinning,
            json!({"tool_diameter": 10.0, "radial_engagement": 6.0, "feed_per_tooth": 0.05}),
        )
        .result;
        assert_eq!(out.thinning_factor, 1.0);
        assert_eq!(out.table_feed_mm_min, None);
    }

    #[test]
    fn engagement_beyond_diameter_is_rejected() {
        let (_, issues) = parse(
            &ChipThinning,
            json!({"tool_diameter": 10.0, "radial_engagement": 12.0, "feed_per_tooth": 0.05}),
        );
        assert_eq!(error_fields(&issues), vec!["radial_engagement"]);
    }

    #[test]
    fn very_light_cut_warns() {
        let out = run(
            &ChipThinning,
            json!({"tool_diameter": 20.0, "radial_engagement": 0.1, "feed_per_tooth": 0.05}),
        );
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn vanishing_engagement_is_rejected_before_calculation() {
        let (_, issues) = parse(
            &ChipThinning,
            json!({"tool_diameter": 10.0, "radial_engagement": 1e-11, "feed_per_tooth": 0.05}),
        );
        assert_eq!(error_fields(&issues), vec!["radial_engagement"]);

        let out = run(
            &ChipThinning,
            json!({"tool_diameter": 10.0, "radial_engagement": 1e-5, "feed_per_tooth": 0.05}),
        );
        assert!(out.result.compensated_feed_per_tooth.is_finite());
    }
}
