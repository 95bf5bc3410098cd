//! Setup planning as a constraint satisfaction problem.
//!
//! Variables are features, domains are the fixture orientations from which
//! each feature is accessible, and the constraints are a limit on the number
//! of setups plus "same setup" constraints for features sharing a tolerance
//! group. Orientation subsets are enumerated smallest first and ranked by
//! (features covered ↓, tolerance groups split ↑, setups ↑), so the result is
//! exact for the small orientation sets found on real fixtures.

use crate::nested::nested_strings;
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const DEFAULT_ORIENTATIONS: [&str; 6] = ["+X", "-X", "+Y", "-Y", "+Z", "-Z"];
const MAX_ORIENTATIONS: usize = 16;
const MAX_FEATURES: usize = 200;

pub struct SetupPlanning;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "csp_setup_planning",
    name: "Setup Planning (CSP)",
    description: "Groups machining features into the fewest fixture setups such that every feature is reachable and features sharing a tolerance group are cut in the same setup.",
    formula: "max |covered|, then min |split groups|, then min |S|  s.t.  |S| ≤ max_setups,  setup(f) ∈ access(f) ∩ S,  setup(f) = setup(g) ∀ f, g in one tolerance group",
    reference: "Zhang, H.-C., Lin, E. (1999). A hybrid-graph approach for automated setup planning in CAPP. Robotics and Computer-Integrated Manufacturing 15(1), 89-100.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Combinatorial,
    inputs: &[
        FieldSpec::required("features", "-", "objects: id, access_directions[], optional tolerance_group"),
        FieldSpec::optional("orientations", "-", "allowed setup orientations, default ±X ±Y ±Z"),
        FieldSpec::optional("max_setups", "-", "setup limit, default the number of orientations"),
    ],
    outputs: &[
        FieldSpec::output("setups", "-", "setup number, orientation, feature ids"),
        FieldSpec::output("setup_count", "-", "setups used"),
        FieldSpec::output("unassigned", "-", "features not reachable within the chosen setups"),
        FieldSpec::output("split_tolerance_groups", "-", "groups cut across more than one setup"),
        FieldSpec::output("all_constraints_met", "-", "nothing unassigned and no group split"),
        FieldSpec::output("optimal", "-", "true: the subset search is exhaustive"),
        FieldSpec::output("subsets_evaluated", "-", "orientation subsets scored"),
    ],
};

#[derive(Debug, Clone)]
struct Feature {
    id: String,
    /// Bitmask over the orientation list.
    access: u32,
    group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetupInput {
    features: Vec<Feature>,
    orientations: Vec<String>,
    max_setups: usize,
}

#[derive(Debug, Serialize)]
pub struct Setup {
    pub setup: usize,
    pub orientation: String,
    pub features: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SetupOutput {
    pub setups: Vec<Setup>,
    pub setup_count: usize,
    pub unassigned: Vec<String>,
    pub split_tolerance_groups: Vec<String>,
    pub all_constraints_met: bool,
    pub optimal: bool,
    pub subsets_evaluated: usize,
}

/// Plan for one orientation subset: the orientation index per feature.
struct Plan {
    placement: Vec<Option<usize>>,
    covered: usize,
    split: Vec<String>,
    size: usize,
}

impl Plan {
    fn better_than(&self, other: &Plan) -> bool {
        (self.covered, std::cmp::Reverse(self.split.len()), std::cmp::Reverse(self.size))
            > (other.covered, std::cmp::Reverse(other.split.len()), std::cmp::Reverse(other.size))
    }
}

fn lowest_bit(mask: u32) -> Option<usize> {
    (mask != 0).then(|| mask.trailing_zeros() as usize)
}

/// Place every feature given the chosen orientation subset.
fn place(features: &[Feature], groups: &BTreeMap<&str, Vec<usize>>, subset: u32) -> Plan {
    let mut placement: Vec<Option<usize>> = features
        .iter()
        .map(|f| lowest_bit(f.access & subset))
        .collect();
    let mut split = Vec::new();
    for (name, members) in groups {
        let reachable: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| placement[i].is_some())
            .collect();
        if reachable.len() < 2 {
            continue;
        }
        let common = reachable
            .iter()
            .fold(subset, |mask, &i| mask & features[i].access);
        match lowest_bit(common) {
            Some(o) => reachable.iter().for_each(|&i| placement[i] = Some(o)),
            None => split.push((*name).to_string()),
        }
    }
    let covered = placement.iter().filter(|p| p.is_some()).count();
    Plan {
        placement,
        covered,
        split,
        size: subset.count_ones() as usize,
    }
}

impl Algorithm for SetupPlanning {
    type Input = SetupInput;
    type Output = SetupOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "features": [
                {"id": "top_face", "access_directions": ["+Z"]},
                {"id": "pocket_1", "access_directions": ["+Z"], "tolerance_group": "datum_A"},
                {"id": "bore_1", "access_directions": ["+Z", "+X"], "tolerance_group": "datum_A"},
                {"id": "side_slot", "access_directions": ["+X", "-Y"]},
                {"id": "bottom_chamfer", "access_directions": ["-Z"]}
            ],
            "max_setups": 3
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> SetupInput {
        let orientations: Vec<String> = match params.raw("orientations") {
            None => DEFAULT_ORIENTATIONS.iter().map(|s| s.to_string()).collect(),
            Some(raw) => {
                let names: Option<Vec<String>> = raw.as_array().and_then(|items| {
                    items.iter().map(|v| v.as_str().map(str::to_string)).collect()
                });
                names.unwrap_or_else(|| {
                    params.error("orientations", "must be an array of strings");
                    Vec::new()
                })
            }
        };
        if params.ensure_count("orientations", orientations.len(), 1, MAX_ORIENTATIONS) {
            let mut sorted = orientations.clone();
            sorted.sort();
            sorted.dedup();
            params.ensure(
                "orientations",
                sorted.len() == orientations.len(),
                "must not repeat an orientation",
            );
        }

        let items = params.required_array("features");
        if params.has("features") {
            params.ensure_count("features", items.len(), 1, MAX_FEATURES);
        }
        let mut features = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let path = format!("features[{i}]");
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                params.error("features", format!("{path}.id must be a string"));
                continue;
            };
            let Some(directions) =
                nested_strings(params, "features", item, "access_directions", &path)
            else {
                continue;
            };
            if directions.is_empty() {
                params.error("features", format!("{path}.access_directions must not be empty"));
                continue;
            }
            let mut access = 0u32;
            for d in &directions {
                match orientations.iter().position(|o| o == d) {
                    Some(bit) => access |= 1 << bit,
                    None => params.error(
                        "features",
                        format!("{path}: unknown access direction `{d}`"),
                    ),
                }
            }
            let group = match item.get("tolerance_group") {
                None | Some(Value::Null) => None,
                Some(Value::String(g)) => Some(g.clone()),
                Some(_) => {
                    params.error("features", format!("{path}.tolerance_group must be a string"));
                    None
                }
            };
            if features.iter().any(|f: &Feature| f.id == id) {
                params.error("features", format!("duplicate feature id `{id}`"));
            }
            features.push(Feature {
                id: id.to_string(),
                access,
                group,
            });
        }

        let max_setups = params.optional_usize("max_setups", orientations.len());
        params.ensure_count("max_setups", max_setups, 1, orientations.len().max(1));
        SetupInput {
            features,
            orientations,
            max_setups,
        }
    }

    fn calculate(
        &self,
        input: &SetupInput,
    ) -> Result<ResultEnvelope<SetupOutput>, AlgorithmError> {
        let k = input.orientations.len();
        if input.features.is_empty() || k == 0 || k > MAX_ORIENTATIONS || input.max_setups == 0 {
            return Err(AlgorithmError::InvalidInput(
                "need features, 1-16 orientations and a positive setup limit".into(),
            ));
        }
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, f) in input.features.iter().enumerate() {
            if let Some(g) = &f.group {
                groups.entry(g.as_str()).or_default().push(i);
            }
        }

        let mut best: Option<Plan> = None;
        let mut evaluated = 0;
        for size in 1..=input.max_setups.min(k) {
            for subset in 1u32..(1u32 << k) {
                if subset.count_ones() as usize != size {
                    continue;
                }
                evaluated += 1;
                let plan = place(&input.features, &groups, subset);
                if best.as_ref().is_none_or(|b| plan.better_than(b)) {
                    best = Some(plan);
                }
            }
            let done = best.as_ref().is_some_and(|b| {
                b.covered == input.features.len() && b.split.is_empty()
            });
            if done {
                break;
            }
        }
        let Some(plan) = best else {
            return Err(AlgorithmError::InvalidInput("no orientation subset to evaluate".into()));
        };

        let mut setups = Vec::new();
        for (o, name) in input.orientations.iter().enumerate() {
            let ids: Vec<String> = input
                .features
                .iter()
                .zip(&plan.placement)
                .filter(|(_, p)| **p == Some(o))
                .map(|(f, _)| f.id.clone())
                .collect();
            if !ids.is_empty() {
                setups.push(Setup {
                    setup: setups.len() + 1,
                    orientation: name.clone(),
                    features: ids,
                });
            }
        }
        let unassigned: Vec<String> = input
            .features
            .iter()
            .zip(&plan.placement)
            .filter(|(_, p)| p.is_none())
            .map(|(f, _)| f.id.clone())
            .collect();

        let mut warnings: Vec<String> = plan
            .split
            .iter()
            .map(|g| format!("tolerance group `{g}` split across setups"))
            .collect();
        if !unassigned.is_empty() {
            warnings.push(format!(
                "{} feature(s) not reachable within {} setup(s): {}",
                unassigned.len(),
                input.max_setups,
                unassigned.join(", ")
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            SetupOutput {
                setup_count: setups.len(),
                all_constraints_met: unassigned.is_empty() && plan.split.is_empty(),
                setups,
                unassigned,
                split_tolerance_groups: plan.split,
                optimal: true,
                subsets_evaluated: evaluated,
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
    fn example_needs_three_setups() {
        let out = run(&SetupPlanning, SetupPlanning.example());
        let r = &out.result;
        assert_eq!(r.setup_count, 3);
        assert!(r.all_constraints_met);
        let datum = r
            .setups
            .iter()
            .find(|s| s.features.contains(&"pocket_1".to_string()))
            .unwrap();
        assert!(datum.features.contains(&"bore_1".to_string()));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn opposite_faces_under_one_setup_leave_work_unassigned() {
        let out = run(
            &SetupPlanning,
            json!({
                "features": [
                    {"id": "F1", "access_directions": ["+Z"]},
                    {"id": "F2", "access_directions": ["-Z"]}
                ],
                "max_setups": 1
            }),
        );
        assert_eq!(out.result.unassigned.len(), 1);
        assert!(!out.result.all_constraints_met);
        assert_eq!(out.result.setup_count, 1);
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn incompatible_tolerance_group_is_split() {
        let out = run(
            &SetupPlanning,
            json!({
                "features": [
                    {"id": "a", "access_directions": ["+Z"], "tolerance_group": "g"},
                    {"id": "b", "access_directions": ["+X"], "tolerance_group": "g"}
                ]
            }),
        );
        assert_eq!(out.result.split_tolerance_groups, vec!["g".to_string()]);
        assert!(out.result.unassigned.is_empty());
        assert!(!out.result.all_constraints_met);
        assert_eq!(out.result.setup_count, 2);
    }

    #[test]
    fn unknown_direction_and_duplicates_are_rejected() {
        let (_, issues) = parse(
            &SetupPlanning,
            json!({
                "features": [
                    {"id": "a", "access_directions": ["+W"]},
                    {"id": "a", "access_directions": ["+Z"]}
                ],
                "max_setups": 9
            }),
        );
        assert_eq!(error_fields(&issues), vec!["features", "features", "max_setups"]);
    }
}
