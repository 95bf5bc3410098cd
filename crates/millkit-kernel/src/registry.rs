//! The immutable id → algorithm map.
//!
//! Built exactly once from a fixed catalogue. Construction is the only place
//! a duplicate id can appear, and it is refused there, before any caller can
//! observe the registry.

use crate::contract::{AlgorithmMeta, DynAlgorithm};
use crate::error::RegistryError;
use std::collections::BTreeMap;

pub struct Registry {
    algorithms: BTreeMap<&'static str, Box<dyn DynAlgorithm>>,
}

impl Registry {
    pub fn new(algorithms: Vec<Box<dyn DynAlgorithm>>) -> Result<Self, RegistryError> {
        let mut map: BTreeMap<&'static str, Box<dyn DynAlgorithm>> = BTreeMap::new();
        for algorithm in algorithms {
            let meta = algorithm.describe();
            if meta.id.trim().is_empty() {
                return Err(RegistryError::EmptyId {
                    name: meta.name.to_string(),
                });
            }
            if map.contains_key(meta.id) {
                return Err(RegistryError::DuplicateId(meta.id.to_string()));
            }
            map.insert(meta.id, algorithm);
        }
        Ok(Self { algorithms: map })
    }

    /// Registered ids in ascending order.
    pub fn list(&self) -> Vec<&'static str> {
        self.algorithms.keys().copied().collect()
    }

    pub fn lookup(&self, id: &str) -> Option<&dyn DynAlgorithm> {
        self.algorithms.get(id).map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &dyn DynAlgorithm)> {
        self.algorithms.iter().map(|(id, a)| (*id, a.as_ref()))
    }

    pub fn describe_all(&self) -> Vec<&'static AlgorithmMeta> {
        self.algorithms.values().map(|a| a.describe()).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.list())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Two tiny algorithms for kernel tests.

    use crate::contract::{
        Algorithm, AlgorithmMeta, Domain, FieldSpec, ResultEnvelope, SafetyClass,
    };
    use crate::error::AlgorithmError;
    use crate::params::ParamReader;
    use serde::Serialize;
    use serde_json::{Value, json};

    pub struct Doubler;

    pub static DOUBLER_META: AlgorithmMeta = AlgorithmMeta {
        id: "doubler",
        name: "Doubler",
        description: "Doubles a positive value.",
        formula: "y = 2x",
        reference: "-",
        safety_class: SafetyClass::Standard,
        domain: Domain::NumericLearning,
        inputs: &[FieldSpec::required("x", "-", "positive value")],
        outputs: &[FieldSpec::output("y", "-", "doubled value")],
    };

    #[derive(Serialize)]
    pub struct Doubled {
        pub y: f64,
    }

    impl Algorithm for Doubler {
        type Input = f64;
        type Output = Doubled;

        fn meta(&self) -> &'static AlgorithmMeta {
            &DOUBLER_META
        }

        fn example(&self) -> Value {
            json!({"x": 3.0})
        }

        fn parse(&self, params: &mut ParamReader<'_>) -> f64 {
            let x = params.required_f64("x");
            params.ensure_positive("x", x);
            if x > 1e6 {
                params.warning("x", "unusually large");
            }
            x
        }

        fn calculate(&self, x: &f64) -> Result<ResultEnvelope<Doubled>, AlgorithmError> {
            let mut warnings = Vec::new();
            if *x > 100.0 {
                warnings.push("large input".to_string());
            }
            Ok(ResultEnvelope::with_warnings(Doubled { y: 2.0 * x }, warnings))
        }
    }

    /// Misbehaves on purpose: divides by its input, panics on negatives and
    /// its parser panics on huge values.
    pub struct Fragile;

    pub static FRAGILE_META: AlgorithmMeta = AlgorithmMeta {
        id: "fragile",
        name: "Fragile",
        description: "Reciprocal without guards.",
        formula: "y = 1/x",
        reference: "-",
        safety_class: SafetyClass::Standard,
        domain: Domain::NumericLearning,
        inputs: &[FieldSpec::required("x", "-", "any value")],
        outputs: &[FieldSpec::output("y", "-", "reciprocal")],
    };

    impl Algorithm for Fragile {
        type Input = f64;
        type Output = Doubled;

        fn meta(&self) -> &'static AlgorithmMeta {
            &FRAGILE_META
        }

        fn example(&self) -> Value {
            json!({"x": 4.0})
        }

        fn parse(&self, params: &mut ParamReader<'_>) -> f64 {
            let x = params.required_f64("x");
            if x > 1e300 {
                panic!("fragile cannot parse {x}");
            }
            params.ensure_positive("x", x);
            x
        }

        fn calculate(&self, x: &f64) -> Result<ResultEnvelope<Doubled>, AlgorithmError> {
            if *x < 0.0 {
                panic!("negative input reached fragile");
            }
            Ok(ResultEnvelope::new(Doubled { y: 1.0 / x }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{Doubler, Fragile};
    use super::*;

    #[test]
    fn duplicate_ids_are_rejected_at_construction() {
        let err = Registry::new(vec![Box::new(Doubler), Box::new(Doubler)]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("doubler".into()));
    }

    #[test]
    fn list_is_sorted_and_lookup_matches_meta() {
        let registry = Registry::new(vec![Box::new(Fragile), Box::new(Doubler)]).unwrap();
        assert_eq!(registry.list(), vec!["doubler", "fragile"]);
        for (id, algorithm) in registry.iter() {
            assert_eq!(algorithm.describe().id, id);
        }
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.len(), 2);
    }
}
