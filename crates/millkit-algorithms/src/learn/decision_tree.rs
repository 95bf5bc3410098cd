//! CART decision tree for classification (Gini) or regression (variance).

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::{EPSILON, stats};
use serde::Serialize;
use serde_json::{Value, json};

const MAX_SAMPLES: usize = 20_000;
const MAX_DEPTH: usize = 20;
const TASKS: &[&str] = &["classification", "regression"];

pub struct DecisionTree;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "decision_tree",
    name: "CART Decision Tree",
    description: "Grows a binary tree by greedy axis-aligned splits that maximise impurity decrease; Gini for classes, variance for continuous targets.",
    formula: "Gini = 1 − Σ_c p_c²;  Var = mean((y − ȳ)²);  split gain = n·I(parent) − n_L·I(L) − n_R·I(R)",
    reference: "Breiman, L., Friedman, J., Olshen, R., Stone, C. (1984). Classification and Regression Trees. Wadsworth.",
    safety_class: SafetyClass::Standard,
    domain: Domain::NumericLearning,
    inputs: &[
        FieldSpec::required("features", "-", "training samples, one row each"),
        FieldSpec::required("targets", "-", "class label or value per sample"),
        FieldSpec::optional("task", "-", "classification | regression, default classification"),
        FieldSpec::optional("max_depth", "-", "deepest split level, 1 to 20, default 5"),
        FieldSpec::optional("min_samples_split", "-", "smallest node that may split, default 2"),
        FieldSpec::optional("min_samples_leaf", "-", "smallest allowed child, default 1"),
        FieldSpec::optional("feature_names", "-", "labels used in split descriptions"),
        FieldSpec::optional("predict", "-", "rows to predict with the grown tree"),
    ],
    outputs: &[
        FieldSpec::output("nodes", "-", "pre-order node list; leaves have no split"),
        FieldSpec::output("depth", "-", "depth of the deepest leaf"),
        FieldSpec::output("leaf_count", "-", "number of leaves"),
        FieldSpec::output("feature_importances", "-", "normalised impurity decrease per feature"),
        FieldSpec::output("training_score", "-", "accuracy or R² on the training set"),
        FieldSpec::output("predictions", "-", "tree output per predict row, if given"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Classification,
    Regression,
}

#[derive(Debug, Clone)]
pub struct DecisionTreeInput {
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
    task: Task,
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    feature_names: Vec<String>,
    predict: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: usize,
    pub depth: usize,
    pub samples: usize,
    pub impurity: f64,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Split {
    pub feature: usize,
    pub feature_name: String,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Serialize)]
pub struct DecisionTreeOutput {
    pub nodes: Vec<TreeNode>,
    pub depth: usize,
    pub leaf_count: usize,
    pub feature_importances: Vec<f64>,
    pub training_score: f64,
    pub predictions: Option<Vec<f64>>,
}

/// Node impurity and prediction for a set of targets.
fn summarize(task: Task, targets: &[f64]) -> (f64, f64) {
    match task {
        Task::Regression => (stats::variance(targets), stats::mean(targets)),
        Task::Classification => {
            let mut labels = targets.to_vec();
            labels.sort_by(f64::total_cmp);
            let n = labels.len() as f64;
            let mut gini = 1.0;
            let (mut best, mut best_count) = (0.0, 0usize);
            for run in labels.chunk_by(|a, b| a == b) {
                let p = run.len() as f64 / n;
                gini -= p * p;
                if run.len() > best_count {
                    best = run[0];
                    best_count = run.len();
                }
            }
            (gini.max(0.0), best)
        }
    }
}

struct Grower<'a> {
    input: &'a DecisionTreeInput,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl Grower<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let input = self.input;
        let targets: Vec<f64> = rows.iter().map(|&i| input.targets[i]).collect();
        let (impurity, value) = summarize(input.task, &targets);
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            depth,
            samples: rows.len(),
            impurity,
            value,
            split: None,
        });
        if depth >= input.max_depth
            || rows.len() < input.min_samples_split
            || impurity < EPSILON
        {
            return id;
        }
        let Some((feature, threshold, gain)) = self.best_split(&rows, impurity) else {
            return id;
        };
        self.importances[feature] += gain;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| input.features[i][feature] <= threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id].split = Some(Split {
            feature,
            feature_name: input.feature_names[feature].clone(),
            threshold,
            left,
            right,
        });
        id
    }

    /// Best (feature, threshold, weighted gain) over midpoints of distinct values.
    fn best_split(&self, rows: &[usize], impurity: f64) -> Option<(usize, f64, f64)> {
        let input = self.input;
        let n = rows.len();
        let min_leaf = input.min_samples_leaf.max(1);
        let mut best: Option<(usize, f64, f64)> = None;
        let dims = input.features[rows[0]].len();
        for f in 0..dims {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| input.features[a][f].total_cmp(&input.features[b][f]));
            for cut in min_leaf..=n.saturating_sub(min_leaf) {
                let lo = input.features[order[cut - 1]][f];
                let hi = input.features[order[cut]][f];
                if hi - lo <= EPSILON {
                    continue;
                }
                let left: Vec<f64> = order[..cut].iter().map(|&i| input.targets[i]).collect();
                let right: Vec<f64> = order[cut..].iter().map(|&i| input.targets[i]).collect();
                let (li, _) = summarize(input.task, &left);
                let (ri, _) = summarize(input.task, &right);
                let gain = n as f64 * impurity - cut as f64 * li - (n - cut) as f64 * ri;
                if gain > EPSILON && best.is_none_or(|(_, _, g)| gain > g + EPSILON) {
                    best = Some((f, 0.5 * (lo + hi), gain));
                }
            }
        }
        best
    }
}

fn predict(nodes: &[TreeNode], row: &[f64]) -> f64 {
    let mut node = &nodes[0];
    while let Some(split) = &node.split {
        let next = if row[split.feature] <= split.threshold {
            split.left
        } else {
            split.right
        };
        node = &nodes[next];
    }
    node.value
}

impl Algorithm for DecisionTree {
    type Input = DecisionTreeInput;
    type Output = DecisionTreeOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Chatter (1) or stable cut (0) against spindle speed and depth of cut.
        json!({
            "features": [
                [8000.0, 0.5], [8000.0, 1.0], [8000.0, 2.5], [8000.0, 3.0],
                [10000.0, 0.5], [10000.0, 1.5], [10000.0, 2.0], [10000.0, 3.5],
                [12000.0, 0.5], [12000.0, 1.0], [12000.0, 3.0], [12000.0, 4.0]
            ],
            "targets": [0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 1],
            "task": "classification",
            "max_depth": 3,
            "feature_names": ["spindle_speed_rpm", "depth_of_cut_mm"],
            "predict": [[9000.0, 0.8], [11000.0, 3.2]]
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> DecisionTreeInput {
        let features = params.required_matrix("features");
        let dims = features.first().map_or(0, Vec::len);
        if params.has("features")
            && params.ensure_count("features", features.len(), 2, MAX_SAMPLES)
            && params.ensure("features", dims > 0, "rows must have at least one feature")
        {
            params.ensure_rectangular("features", &features, dims);
        }
        let targets = params.required_f64_array("targets");
        if params.has("targets") && !params.failed("features") {
            params.ensure_len("targets", targets.len(), features.len());
        }
        let task = match params.choice("task", TASKS, "classification") {
            "regression" => Task::Regression,
            _ => Task::Classification,
        };
        if task == Task::Classification {
            params.ensure(
                "targets",
                targets.iter().all(|t| t.fract() == 0.0),
                "class labels must be integers",
            );
        }
        let max_depth = params.optional_usize("max_depth", 5);
        params.ensure_count("max_depth", max_depth, 1, MAX_DEPTH);
        let min_samples_split = params.optional_usize("min_samples_split", 2);
        params.ensure_count("min_samples_split", min_samples_split, 2, MAX_SAMPLES);
        let min_samples_leaf = params.optional_usize("min_samples_leaf", 1);
        params.ensure_count("min_samples_leaf", min_samples_leaf, 1, MAX_SAMPLES);

        let feature_names = match params.raw("feature_names") {
            None => (0..dims).map(|i| format!("x{i}")).collect(),
            Some(value) => {
                let names: Option<Vec<String>> = value.as_array().and_then(|items| {
                    items.iter().map(|v| v.as_str().map(str::to_owned)).collect()
                });
                match names {
                    Some(names) => {
                        if !params.failed("features") {
                            params.ensure_len("feature_names", names.len(), dims);
                        }
                        names
                    }
                    None => {
                        params.error("feature_names", "must be an array of strings");
                        Vec::new()
                    }
                }
            }
        };

        let predict = params.optional_matrix("predict");
        if let Some(rows) = &predict
            && !params.failed("features")
        {
            params.ensure_rectangular("predict", rows, dims);
        }
        DecisionTreeInput {
            features,
            targets,
            task,
            max_depth,
            min_samples_split,
            min_samples_leaf,
            feature_names,
            predict,
        }
    }

    fn calculate(
        &self,
        input: &DecisionTreeInput,
    ) -> Result<ResultEnvelope<DecisionTreeOutput>, AlgorithmError> {
        let n = input.features.len();
        let dims = input.features.first().map_or(0, Vec::len);
        if n == 0 || dims == 0 || input.targets.len() != n || input.feature_names.len() != dims {
            return Err(AlgorithmError::InvalidInput(
                "features, targets and feature_names disagree in shape".into(),
            ));
        }
        let mut grower = Grower {
            input,
            nodes: Vec::new(),
            importances: vec![0.0; dims],
        };
        grower.grow((0..n).collect(), 0);
        let Grower {
            nodes, importances, ..
        } = grower;

        let total: f64 = importances.iter().sum();
        let feature_importances = importances
            .iter()
            .map(|g| if total > 0.0 { g / total } else { 0.0 })
            .collect();
        let fitted: Vec<f64> = input.features.iter().map(|r| predict(&nodes, r)).collect();
        let training_score = match input.task {
            Task::Classification => {
                let hits = fitted
                    .iter()
                    .zip(&input.targets)
                    .filter(|(p, t)| p == t)
                    .count();
                hits as f64 / n as f64
            }
            Task::Regression => stats::r_squared(&input.targets, &fitted),
        };
        let predictions = input
            .predict
            .as_ref()
            .map(|rows| rows.iter().map(|r| predict(&nodes, r)).collect());
        let leaf_count = nodes.iter().filter(|n| n.split.is_none()).count();
        let depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);

        let mut warnings = Vec::new();
        if leaf_count == 1 {
            warnings.push("no split improved impurity; the tree is a single leaf".into());
        }
        if training_score >= 1.0 - EPSILON && leaf_count * 2 > n {
            warnings.push(format!(
                "{leaf_count} leaves for {n} samples: the tree likely memorises the training set"
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            DecisionTreeOutput {
                nodes,
                depth,
                leaf_count,
                feature_importances,
                training_score,
                predictions,
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
    fn example_splits_on_depth_of_cut() {
        let out = run(&DecisionTree, DecisionTree.example());
        let r = out.result;
        assert_eq!(r.training_score, 1.0);
        assert_eq!(r.leaf_count, 2);
        let root = r.nodes[0].split.as_ref().unwrap();
        assert_eq!(root.feature_name, "depth_of_cut_mm");
        assert!((root.threshold - 1.75).abs() < 1e-12);
        assert_eq!(r.feature_importances, vec![0.0, 1.0]);
        assert_eq!(r.predictions.unwrap(), vec![0.0, 1.0]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn regression_fits_a_step() {
        let r = run(
            &DecisionTree,
            json!({
                "features": [[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]],
                "targets": [10.0, 10.0, 10.0, 20.0, 20.0, 20.0],
                "task": "regression",
                "predict": [[0.0], [9.0]]
            }),
        )
        .result;
        assert!((r.training_score - 1.0).abs() < 1e-12);
        assert_eq!(r.predictions.unwrap(), vec![10.0, 20.0]);
        assert_eq!(r.nodes[0].value, 15.0);
    }

    #[test]
    fn min_leaf_and_depth_limit_growth() {
        let features: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let targets = [0, 1, 0, 1, 0, 1, 0, 1];
        let r = run(
            &DecisionTree,
            json!({"features": features, "targets": targets, "max_depth": 1, "min_samples_leaf": 3}),
        )
        .result;
        assert!(r.depth <= 1);
        for node in &r.nodes {
            assert!(node.samples >= 3);
        }
    }

    #[test]
    fn constant_targets_yield_a_single_leaf() {
        let out = run(
            &DecisionTree,
            json!({"features": [[1.0], [2.0], [3.0]], "targets": [4, 4, 4]}),
        );
        assert_eq!(out.result.leaf_count, 1);
        assert_eq!(out.result.feature_importances, vec![0.0]);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn rejects_fractional_classes_and_name_mismatch() {
        let (_, issues) = parse(
            &DecisionTree,
            json!({
                "features": [[1.0, 2.0], [3.0, 4.0]],
                "targets": [0.5, 1.0],
                "feature_names": ["a"]
            }),
        );
        assert_eq!(error_fields(&issues), vec!["targets", "feature_names"]);
    }
}
