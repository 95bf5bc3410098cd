//! Travelling salesman tours for tool and fixture sequencing.
//!
//! Up to [`EXACT_LIMIT`] cities every tour is enumerated. Beyond that the
//! nearest-neighbour tour is improved with 2-opt until no move helps or the
//! pass budget runs out.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use millkit_numerics::vector;
use serde::Serialize;
use serde_json::{Value, json};

pub const EXACT_LIMIT: usize = 8;
const MAX_CITIES: usize = 500;
const IMPROVEMENT_EPS: f64 = 1e-10;

pub struct Tsp;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "tsp",
    name: "Travelling Salesman (tool path sequencing)",
    description: "Shortest closed tour through a set of points or a distance matrix: exhaustive search for small instances, nearest neighbour plus 2-opt otherwise.",
    formula: "min Σ_k d(π_k, π_{k+1}) + d(π_n, π_1);  2-opt: Δ = d(a,c) + d(b,d) − d(a,b) − d(c,d) < 0",
    reference: "Croes, G. A. (1958). A method for solving traveling-salesman problems. Operations Research 6(6), 791-812; Lin, S. (1965). Computer solutions of the traveling salesman problem. Bell System Technical Journal 44(10), 2245-2269.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Combinatorial,
    inputs: &[
        FieldSpec::optional("points", "mm", "city coordinates, one row per city (this or distance_matrix)"),
        FieldSpec::optional("distance_matrix", "-", "n×n non-negative distances (this or points)"),
        FieldSpec::optional("start_city", "-", "index the tour starts from, default 0"),
        FieldSpec::optional("max_iterations", "-", "2-opt pass budget, default 1000"),
    ],
    outputs: &[
        FieldSpec::output("tour", "-", "city order starting at start_city; the return leg is implied"),
        FieldSpec::output("total_distance", "-", "closed tour length"),
        FieldSpec::output("initial_distance", "-", "length before improvement"),
        FieldSpec::output("improvement_percent", "%", "reduction from the initial tour"),
        FieldSpec::output("optimal", "-", "proven by exhaustive search"),
        FieldSpec::output("iterations", "-", "improving 2-opt passes"),
        FieldSpec::output("method", "-", "exhaustive | nearest_neighbor_2opt"),
    ],
};

#[derive(Debug, Clone)]
pub struct TspInput {
    distances: Vec<Vec<f64>>,
    symmetric: bool,
    start: usize,
    max_iterations: usize,
}

#[derive(Debug, Serialize)]
pub struct TspOutput {
    pub tour: Vec<usize>,
    pub total_distance: f64,
    pub initial_distance: f64,
    pub improvement_percent: f64,
    pub optimal: bool,
    pub iterations: usize,
    pub method: &'static str,
}

pub fn tour_length(d: &[Vec<f64>], tour: &[usize]) -> f64 {
    if tour.len() < 2 {
        return 0.0;
    }
    let legs: f64 = tour.windows(2).map(|w| d[w[0]][w[1]]).sum();
    legs + d[tour[tour.len() - 1]][tour[0]]
}

fn nearest_neighbour(d: &[Vec<f64>], start: usize) -> Vec<usize> {
    let n = d.len();
    let mut visited = vec![false; n];
    let mut tour = Vec::with_capacity(n);
    let mut current = start;
    visited[start] = true;
    tour.push(start);
    for _ in 1..n {
        let next = (0..n)
            .filter(|&c| !visited[c])
            .min_by(|&a, &b| d[current][a].total_cmp(&d[current][b]).then(a.cmp(&b)));
        let Some(next) = next else { break };
        visited[next] = true;
        tour.push(next);
        current = next;
    }
    tour
}

/// Lexicographic next permutation; `false` once the last one is reached.
fn next_permutation(items: &mut [usize]) -> bool {
    let Some(i) = (1..items.len()).rev().find(|&i| items[i - 1] < items[i]) else {
        return false;
    };
    let pivot = i - 1;
    let j = (i..items.len()).rev().find(|&j| items[j] > items[pivot]).unwrap_or(i);
    items.swap(pivot, j);
    items[i..].reverse();
    true
}

fn exhaustive(d: &[Vec<f64>], start: usize) -> Vec<usize> {
    let mut rest: Vec<usize> = (0..d.len()).filter(|&c| c != start).collect();
    let mut tour = Vec::with_capacity(d.len());
    let mut best = (f64::INFINITY, Vec::new());
    loop {
        tour.clear();
        tour.push(start);
        tour.extend_from_slice(&rest);
        let length = tour_length(d, &tour);
        if length < best.0 - IMPROVEMENT_EPS {
            best = (length, tour.clone());
        }
        if !next_permutation(&mut rest) {
            break;
        }
    }
    best.1
}

/// Cost change of reversing `tour[i..=j]`. The first city stays fixed.
fn two_opt_delta(d: &[Vec<f64>], tour: &[usize], i: usize, j: usize, symmetric: bool) -> f64 {
    let n = tour.len();
    let (a, b, c, e) = (tour[i - 1], tour[i], tour[j], tour[(j + 1) % n]);
    let mut delta = d[a][c] + d[b][e] - d[a][b] - d[c][e];
    if !symmetric {
        let forward: f64 = (i..j).map(|k| d[tour[k]][tour[k + 1]]).sum();
        let backward: f64 = (i..j).map(|k| d[tour[k + 1]][tour[k]]).sum();
        delta += backward - forward;
    }
    delta
}

/// 2-opt to a local optimum; returns the number of improving passes.
fn two_opt(d: &[Vec<f64>], tour: &mut [usize], symmetric: bool, max_passes: usize) -> usize {
    let n = tour.len();
    let mut passes = 0;
    while passes < max_passes {
        let mut improved = false;
        for i in 1..n - 1 {
            for j in i + 1..n {
                if two_opt_delta(d, tour, i, j, symmetric) < -IMPROVEMENT_EPS {
                    tour[i..=j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
        passes += 1;
    }
    passes
}

impl Algorithm for Tsp {
    type Input = TspInput;
    type Output = TspOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Hole positions on a plate, in mm.
        json!({
            "points": [
                [0.0, 0.0], [40.0, 0.0], [80.0, 0.0], [80.0, 30.0],
                [80.0, 60.0], [40.0, 60.0], [0.0, 60.0], [0.0, 30.0],
                [40.0, 30.0], [60.0, 45.0]
            ],
            "start_city": 0
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> TspInput {
        let points = params.optional_matrix("points");
        let matrix = params.optional_matrix("distance_matrix");
        let mut symmetric = true;
        let distances = match (points, matrix) {
            (Some(_), Some(_)) => {
                params.error("points", "give either points or distance_matrix, not both");
                Vec::new()
            }
            (None, None) => {
                if !params.failed("points") && !params.failed("distance_matrix") {
                    params.error("points", "points or distance_matrix is required");
                }
                Vec::new()
            }
            (Some(points), None) => {
                let dims = points.first().map_or(0, Vec::len);
                if params.ensure_count("points", points.len(), 2, MAX_CITIES)
                    && params.ensure("points", (1..=3).contains(&dims), "rows must have 1-3 coordinates")
                    && params.ensure_rectangular("points", &points, dims)
                {
                    points
                        .iter()
                        .map(|p| points.iter().map(|q| vector::distance(p, q)).collect())
                        .collect()
                } else {
                    Vec::new()
                }
            }
            (None, Some(m)) => {
                let n = m.len();
                if params.ensure_count("distance_matrix", n, 2, MAX_CITIES)
                    && params.ensure_rectangular("distance_matrix", &m, n)
                {
                    params.ensure(
                        "distance_matrix",
                        m.iter().flatten().all(|v| *v >= 0.0),
                        "distances must not be negative",
                    );
                    params.ensure(
                        "distance_matrix",
                        (0..n).all(|i| m[i][i] == 0.0),
                        "diagonal must be zero",
                    );
                    symmetric = (0..n).all(|i| (0..i).all(|j| (m[i][j] - m[j][i]).abs() < 1e-9));
                    if !symmetric {
                        params.warning(
                            "distance_matrix",
                            "matrix is asymmetric; tours are directed",
                        );
                    }
                }
                m
            }
        };
        let start = params.optional_usize("start_city", 0);
        if !distances.is_empty() {
            params.ensure(
                "start_city",
                start < distances.len(),
                format!("must be below the city count {}", distances.len()),
            );
        }
        let max_iterations = params.optional_usize("max_iterations", 1000);
        params.ensure_count("max_iterations", max_iterations, 1, 100_000);
        TspInput {
            distances,
            symmetric,
            start,
            max_iterations,
        }
    }

    fn calculate(&self, input: &TspInput) -> Result<ResultEnvelope<TspOutput>, AlgorithmError> {
        let d = &input.distances;
        let n = d.len();
        if n < 2 || input.start >= n || d.iter().any(|r| r.len() != n) {
            return Err(AlgorithmError::InvalidInput(
                "need a square distance matrix over at least two cities and a valid start".into(),
            ));
        }

        let (tour, initial, passes, method, optimal) = if n <= EXACT_LIMIT {
            let identity: Vec<usize> = (input.start..n).chain(0..input.start).collect();
            let initial = tour_length(d, &identity);
            (exhaustive(d, input.start), initial, 0, "exhaustive", true)
        } else {
            let mut tour = nearest_neighbour(d, input.start);
            let initial = tour_length(d, &tour);
            let passes = two_opt(d, &mut tour, input.symmetric, input.max_iterations);
            (tour, initial, passes, "nearest_neighbor_2opt", false)
        };
        let total = tour_length(d, &tour);

        let mut warnings = Vec::new();
        if !optimal && passes == input.max_iterations {
            warnings.push("2-opt pass budget exhausted before reaching a local optimum".to_string());
        }
        Ok(ResultEnvelope::with_warnings(
            TspOutput {
                tour,
                total_distance: total,
                initial_distance: initial,
                improvement_percent: if initial > 0.0 {
                    (initial - total) / initial * 100.0
                } else {
                    0.0
                },
                optimal,
                iterations: passes,
                method,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    fn is_permutation(tour: &[usize], n: usize) -> bool {
        let mut seen = tour.to_vec();
        seen.sort_unstable();
        seen == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn square_is_solved_exactly() {
        let out = run(
            &Tsp,
            json!({"points": [[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0]]}),
        )
        .result;
        assert!(out.optimal);
        assert_eq!(out.method, "exhaustive");
        assert!((out.total_distance - 4.0).abs() < 1e-12);
        assert!(out.initial_distance > out.total_distance);
        assert_eq!(out.tour[0], 0);
    }

    #[test]
    fn large_instance_uses_two_opt() {
        let out = run(&Tsp, Tsp.example()).result;
        assert_eq!(out.method, "nearest_neighbor_2opt");
        assert!(is_permutation(&out.tour, 10));
        assert!(out.total_distance <= out.initial_distance);
        // No closed tour can be shorter than the 280 mm hull perimeter.
        assert!(out.total_distance >= 280.0);
    }

    #[test]
    fn circle_points_are_visited_in_order() {
        let points: Vec<Vec<f64>> = (0..12)
            .map(|k| {
                let a = std::f64::consts::TAU * ((k * 5) % 12) as f64 / 12.0;
                vec![a.cos(), a.sin()]
            })
            .collect();
        let out = run(&Tsp, json!({ "points": points })).result;
        let side = 2.0 * (std::f64::consts::PI / 12.0).sin();
        assert!((out.total_distance - 12.0 * side).abs() < 1e-9);
    }

    #[test]
    fn asymmetric_matrix_warns_and_respects_direction() {
        let (input, issues) = parse(
            &Tsp,
            json!({"distance_matrix": [[0.0, 1.0, 10.0], [10.0, 0.0, 1.0], [1.0, 10.0, 0.0]]}),
        );
        assert!(error_fields(&issues).is_empty());
        assert_eq!(issues.len(), 1);
        let out = Tsp.calculate(&input).unwrap().result;
        assert_eq!(out.tour, vec![0, 1, 2]);
        assert_eq!(out.total_distance, 3.0);
    }

    #[test]
    fn needs_exactly_one_source() {
        let (_, issues) = parse(&Tsp, json!({}));
        assert_eq!(error_fields(&issues), vec!["points"]);
        let (_, issues) = parse(
            &Tsp,
            json!({"points": [[0.0, 0.0], [1.0, 0.0]], "distance_matrix": [[0.0, 1.0], [1.0, 0.0]]}),
        );
        assert_eq!(error_fields(&issues), vec!["points"]);
    }
}
