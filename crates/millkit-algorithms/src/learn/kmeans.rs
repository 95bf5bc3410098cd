//! K-means clustering with seeded k-means++ initialisation.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::{SeededRng, vector};
use serde::Serialize;
use serde_json::{Value, json};

use crate::optimize::DEFAULT_SEED;

const MAX_POINTS: usize = 100_000;
const MAX_K: usize = 100;

pub struct KMeans;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "kmeans",
    name: "K-Means Clustering",
    description: "Partitions points into k clusters minimising within-cluster squared distance (Lloyd iterations from k-means++ seeds).",
    formula: "min Σ_i ‖x_i − μ_{c(i)}‖²,  c(i) = argmin_j ‖x_i − μ_j‖,  μ_j = mean{x_i : c(i) = j};  seeding P(x) ∝ D(x)²",
    reference: "Lloyd, S. (1982). Least squares quantization in PCM. IEEE Trans. Information Theory 28(2), 129-137; Arthur, D., Vassilvitskii, S. (2007). k-means++: the advantages of careful seeding. SODA, 1027-1035.",
    safety_class: SafetyClass::Standard,
    domain: Domain::NumericLearning,
    inputs: &[
        FieldSpec::required("data", "-", "points, one row each, equal dimension"),
        FieldSpec::required("k", "-", "cluster count, 1 to min(points, 100)"),
        FieldSpec::optional("max_iterations", "-", "Lloyd iteration budget, default 100"),
        FieldSpec::optional("tolerance", "-", "stop when no centroid moves further, default 1e-6"),
        FieldSpec::optional("seed", "-", "seed for k-means++, default 42"),
    ],
    outputs: &[
        FieldSpec::output("centroids", "-", "cluster centres"),
        FieldSpec::output("labels", "-", "cluster index per point"),
        FieldSpec::output("cluster_sizes", "-", "points per cluster"),
        FieldSpec::output("inertia", "-", "sum of squared distances to the assigned centre"),
        FieldSpec::output("iterations", "-", "Lloyd iterations run"),
        FieldSpec::output("converged", "-", "stopped on tolerance, not on budget"),
    ],
};

#[derive(Debug, Clone)]
pub struct KMeansInput {
    data: Vec<Vec<f64>>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
}

#[derive(Debug, Serialize)]
pub struct KMeansOutput {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub cluster_sizes: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(j, c)| (j, vector::squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn seed_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut SeededRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![data[rng.index(data.len())].clone()];
    let mut d2: Vec<f64> = data
        .iter()
        .map(|x| vector::squared_distance(x, &centroids[0]))
        .collect();
    while centroids.len() < k {
        let next = data[rng.weighted_index(&d2)].clone();
        for (d, x) in d2.iter_mut().zip(data) {
            *d = d.min(vector::squared_distance(x, &next));
        }
        centroids.push(next);
    }
    centroids
}

impl Algorithm for KMeans {
    type Input = KMeansInput;
    type Output = KMeansOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Tool-wear signatures: (spindle load %, vibration RMS mm/s).
        json!({
            "data": [
                [20.0, 0.8], [22.0, 1.0], [19.5, 0.9], [21.0, 1.1],
                [45.0, 2.9], [47.5, 3.2], [44.0, 3.0], [46.0, 3.1],
                [70.0, 6.0], [72.0, 6.4], [69.0, 5.8]
            ],
            "k": 3,
            "seed": 7
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> KMeansInput {
        let data = params.required_matrix("data");
        let dims = data.first().map_or(0, Vec::len);
        if params.has("data")
            && params.ensure_count("data", data.len(), 1, MAX_POINTS)
            && params.ensure("data", dims > 0, "points must have at least one coordinate")
        {
            params.ensure_rectangular("data", &data, dims);
        }
        let k = params.required_usize("k");
        params.ensure_count("k", k, 1, MAX_K.min(data.len().max(1)));
        let max_iterations = params.optional_usize("max_iterations", 100);
        params.ensure_count("max_iterations", max_iterations, 1, 10_000);
        let tolerance = params.optional_f64("tolerance", 1e-6);
        params.ensure_non_negative("tolerance", tolerance);
        let seed = params.optional_u64("seed", DEFAULT_SEED);
        KMeansInput {
            data,
            k,
            max_iterations,
            tolerance,
            seed,
        }
    }

    fn calculate(
        &self,
        input: &KMeansInput,
    ) -> Result<ResultEnvelope<KMeansOutput>, AlgorithmError> {
        let data = &input.data;
        let n = data.len();
        let dims = data.first().map_or(0, Vec::len);
        if input.k == 0 || input.k > n || dims == 0 || data.iter().any(|x| x.len() != dims) {
            return Err(AlgorithmError::InvalidInput(
                "need 1 ≤ k ≤ points and equal-dimension points".into(),
            ));
        }
        let mut rng = SeededRng::new(input.seed);
        let mut centroids = seed_plus_plus(data, input.k, &mut rng);
        let mut labels = vec![0usize; n];
        let mut warnings = Vec::new();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < input.max_iterations {
            iterations += 1;
            for (label, x) in labels.iter_mut().zip(data) {
                *label = nearest(x, &centroids).0;
            }
            let mut sums = vec![vec![0.0; dims]; input.k];
            let mut counts = vec![0usize; input.k];
            for (x, &l) in data.iter().zip(&labels) {
                vector::axpy(1.0, x, &mut sums[l]);
                counts[l] += 1;
            }
            let mut shift = 0.0f64;
            for j in 0..input.k {
                let next = if counts[j] > 0 {
                    vector::scale(&sums[j], 1.0 / counts[j] as f64)
                } else {
                    // Re-seed an empty cluster at the point worst served now.
                    let far = (0..n)
                        .max_by(|&a, &b| {
                            nearest(&data[a], &centroids)
                                .1
                                .total_cmp(&nearest(&data[b], &centroids).1)
                        })
                        .unwrap_or(0);
                    warnings.push(format!(
                        "cluster {j} emptied in iteration {iterations}; re-seeded at point {far}"
                    ));
                    data[far].clone()
                };
                shift = shift.max(vector::distance(&next, &centroids[j]));
                centroids[j] = next;
            }
            if shift <= input.tolerance {
                converged = true;
                break;
            }
        }

        let mut cluster_sizes = vec![0usize; input.k];
        let mut inertia = 0.0;
        for (label, x) in labels.iter_mut().zip(data) {
            let (j, d2) = nearest(x, &centroids);
            *label = j;
            cluster_sizes[j] += 1;
            inertia += d2;
        }
        if !converged {
            warnings.push(format!(
                "not converged after {} iterations",
                input.max_iterations
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            KMeansOutput {
                centroids,
                labels,
                cluster_sizes,
                inertia,
                iterations,
                converged,
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
    fn separates_three_wear_states() {
        let out = run(&KMeans, KMeans.example()).result;
        assert!(out.converged);
        let mut sizes = out.cluster_sizes.clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 4, 4]);
        // Points of one state share a label.
        assert!(out.labels[0..4].iter().all(|l| *l == out.labels[0]));
        assert!(out.labels[4..8].iter().all(|l| *l == out.labels[4]));
        assert!(out.labels[8..].iter().all(|l| *l == out.labels[8]));
        assert_ne!(out.labels[0], out.labels[4]);
    }

    #[test]
    fn same_seed_same_partition() {
        let a = run(&KMeans, KMeans.example()).result;
        let b = run(&KMeans, KMeans.example()).result;
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia.to_bits(), b.inertia.to_bits());
    }

    #[test]
    fn single_cluster_centre_is_the_mean() {
        let out = run(
            &KMeans,
            json!({"data": [[0.0, 0.0], [2.0, 0.0], [1.0, 3.0]], "k": 1}),
        )
        .result;
        assert_eq!(out.centroids, vec![vec![1.0, 1.0]]);
        assert!((out.inertia - (2.0 + 2.0 + 4.0)).abs() < 1e-12);
    }

    #[test]
    fn more_clusters_than_points_is_rejected() {
        let (_, issues) = parse(&KMeans, json!({"data": [[1.0], [2.0]], "k": 3}));
        assert_eq!(error_fields(&issues), vec!["k"]);
    }
}
