//! Johnson-Cook flow stress.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

pub struct JohnsonCook;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "johnson_cook",
    name: "Johnson-Cook Flow Stress",
    description: "Flow stress under combined strain hardening, strain-rate hardening and thermal softening.",
    formula: "σ = (A + B εⁿ)(1 + C ln(ε̇/ε̇₀))(1 − T*ᵐ),  T* = (T − Tr)/(Tm − Tr)",
    reference: "Johnson, G. R., Cook, W. H. (1983). A constitutive model and data for metals subjected to large strains, high strain rates and high temperatures. Proc. 7th Int. Symp. on Ballistics, 541-547.",
    safety_class: SafetyClass::Standard,
    domain: Domain::ManufacturingPhysics,
    inputs: &[
        FieldSpec::required("a", "MPa", "initial yield stress A"),
        FieldSpec::required("b", "MPa", "hardening modulus B"),
        FieldSpec::required("n", "-", "hardening exponent"),
        FieldSpec::required("c", "-", "strain-rate sensitivity C"),
        FieldSpec::required("m", "-", "thermal softening exponent"),
        FieldSpec::required("strain", "-", "equivalent plastic strain ε"),
        FieldSpec::required("strain_rate", "1/s", "plastic strain rate ε̇"),
        FieldSpec::required("temperature", "°C", "workpiece temperature T"),
        FieldSpec::required("melting_temperature", "°C", "melting temperature Tm"),
        FieldSpec::optional("reference_strain_rate", "1/s", "ε̇₀, default 1.0"),
        FieldSpec::optional("room_temperature", "°C", "Tr, default 20"),
    ],
    outputs: &[
        FieldSpec::output("flow_stress_mpa", "MPa", "σ"),
        FieldSpec::output("strain_hardening_mpa", "MPa", "A + B εⁿ"),
        FieldSpec::output("strain_rate_factor", "-", "1 + C ln(ε̇/ε̇₀), floored at 0"),
        FieldSpec::output("thermal_softening_factor", "-", "1 − T*ᵐ"),
        FieldSpec::output("homologous_temperature", "-", "T*, clamped to [0, 1]"),
    ],
};

#[derive(Debug, Clone)]
pub struct JohnsonCookInput {
    a: f64,
    b: f64,
    n: f64,
    c: f64,
    m: f64,
    strain: f64,
    strain_rate: f64,
    reference_rate: f64,
    temperature: f64,
    room_temperature: f64,
    melting_temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct JohnsonCookOutput {
    pub flow_stress_mpa: f64,
    pub strain_hardening_mpa: f64,
    pub strain_rate_factor: f64,
    pub thermal_softening_factor: f64,
    pub homologous_temperature: f64,
}

impl Algorithm for JohnsonCook {
    type Input = JohnsonCookInput;
    type Output = JohnsonCookOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // AISI 4340
        json!({
            "a": 792.0, "b": 510.0, "n": 0.26, "c": 0.014, "m": 1.03,
            "strain": 0.5, "strain_rate": 1000.0,
            "temperature": 400.0, "melting_temperature": 1520.0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> JohnsonCookInput {
        let a = params.required_f64("a");
        params.ensure_positive("a", a);
        let b = params.required_f64("b");
        params.ensure_non_negative("b", b);
        let n = params.required_f64("n");
        params.ensure_range("n", n, 0.0, 1.0);
        let c = params.required_f64("c");
        params.ensure_non_negative("c", c);
        let m = params.required_f64("m");
        params.ensure_positive("m", m);
        let strain = params.required_f64("strain");
        params.ensure_range("strain", strain, 0.0, 10.0);
        let strain_rate = params.required_f64("strain_rate");
        params.ensure_positive("strain_rate", strain_rate);
        let temperature = params.required_f64("temperature");
        params.ensure_range("temperature", temperature, -273.15, 5000.0);
        let melting_temperature = params.required_f64("melting_temperature");
        let reference_rate = params.optional_f64("reference_strain_rate", 1.0);
        params.ensure_positive("reference_strain_rate", reference_rate);
        let room_temperature = params.optional_f64("room_temperature", 20.0);
        params.ensure(
            "melting_temperature",
            melting_temperature > room_temperature,
            "must exceed room_temperature",
        );

        if !params.failed("strain_rate")
            && !params.failed("reference_strain_rate")
            && strain_rate < reference_rate
        {
            params.warning(
                "strain_rate",
                "below the reference strain rate; the rate term softens the material",
            );
        }
        if !params.failed("temperature") && temperature >= melting_temperature {
            params.warning("temperature", "at or above the melting temperature; flow stress is zero");
        }

        JohnsonCookInput {
            a,
            b,
            n,
            c,
            m,
            strain,
            strain_rate,
            reference_rate,
            temperature,
            room_temperature,
            melting_temperature,
        }
    }

    fn calculate(
        &self,
        input: &JohnsonCookInput,
    ) -> Result<ResultEnvelope<JohnsonCookOutput>, AlgorithmError> {
        let span = input.melting_temperature - input.room_temperature;
        if !(span > 0.0 && input.reference_rate > 0.0) {
            return Err(AlgorithmError::InvalidInput(
                "melting temperature must exceed room temperature".into(),
            ));
        }
        let mut warnings = Vec::new();

        let hardening = input.a + input.b * input.strain.max(0.0).powf(input.n);

        let ratio = (input.strain_rate / input.reference_rate).max(f64::MIN_POSITIVE);
        let raw_rate = 1.0 + input.c * ratio.ln();
        let rate_factor = raw_rate.max(0.0);
        if raw_rate < 0.0 {
            warnings.push("strain-rate term fell below zero and was floored".to_string());
        }

        let homologous = ((input.temperature - input.room_temperature) / span).clamp(0.0, 1.0);
        if input.temperature < input.room_temperature {
            warnings.push("temperature below room temperature; thermal softening ignored".to_string());
        }
        let thermal = 1.0 - homologous.powf(input.m);

        Ok(ResultEnvelope::with_warnings(
            JohnsonCookOutput {
                flow_stress_mpa: hardening * rate_factor * thermal,
                strain_hardening_mpa: hardening,
                strain_rate_factor: rate_factor,
                thermal_softening_factor: thermal,
                homologous_temperature: homologous,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{parse, run};

    #[test]
    fn aisi_4340_reference_point() {
        let out = run(&JohnsonCook, JohnsonCook.example()).result;
        assert!((out.strain_hardening_mpa - 1217.9).abs() < 0.1);
        assert!((out.flow_stress_mpa - 1011.0).abs() < 1.0);
    }

    #[test]
    fn hotter_is_softer() {
        let stress = |t: f64| {
            let mut p = JohnsonCook.example();
            p["temperature"] = json!(t);
            run(&JohnsonCook, p).result.flow_stress_mpa
        };
        assert!(stress(200.0) > stress(600.0));
        assert!(stress(600.0) > stress(1000.0));
    }

    #[test]
    fn melt_and_cold_edges_stay_finite() {
        let mut melt = JohnsonCook.example();
        melt["temperature"] = json!(1600.0);
        let out = run(&JohnsonCook, melt);
        assert_eq!(out.result.flow_stress_mpa, 0.0);

        let mut cold = JohnsonCook.example();
        cold["temperature"] = json!(-40.0);
        let out = run(&JohnsonCook, cold);
        assert_eq!(out.result.homologous_temperature, 0.0);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn quasi_static_rate_warns() {
        let mut p = JohnsonCook.example();
        p["strain_rate"] = json!(0.001);
        let (_, issues) = parse(&JohnsonCook, p);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "strain_rate");
    }
}
