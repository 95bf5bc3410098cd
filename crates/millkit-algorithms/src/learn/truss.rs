//! Linear-elastic analysis of pin-jointed plane trusses by the direct
//! stiffness method.
//!
//! The reduced system is scaled to unit diagonal before the Cholesky
//! factorisation, so the singularity test that detects mechanisms is
//! independent of the absolute stiffness of the members.

use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, MAX_MAGNITUDE, MIN_POSITIVE,
    ParamReader, ResultEnvelope, SafetyClass, in_numeric_range,
};
use millkit_numerics::{EPSILON, Matrix, NumericsError, vector};
use serde::Serialize;
use serde_json::{Value, json};

use crate::nested::{nested_index, nested_number};

const MAX_NODES: usize = 200;
const MAX_ELEMENTS: usize = 1_000;
const DEFAULT_MODULUS: f64 = 210e9;
const MIN_SAFETY_FACTOR: f64 = 1.5;

pub struct TrussFea;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "fea_2d",
    name: "2D Truss Finite Element Analysis",
    description: "Solves nodal displacements, member forces, stresses and support reactions of a plane pin-jointed truss under static nodal loads.",
    formula: "k_e = (EA/L)[c² cs; cs s²] ⊗ [1 −1; −1 1];  K_ff u_f = F_f;  N = (EA/L)(c Δu_x + s Δu_y);  σ = N/A;  R = K u − F",
    reference: "Logan, D.L. (2016). A First Course in the Finite Element Method, 6th ed., ch. 3 Development of Truss Equations. Cengage.",
    safety_class: SafetyClass::SafetyCritical,
    domain: Domain::NumericLearning,
    inputs: &[
        FieldSpec::required("nodes", "m", "node coordinates [x, y]"),
        FieldSpec::required("elements", "-", "members {nodes: [i, j], area (m²), elastic_modulus (Pa)?}"),
        FieldSpec::required("supports", "-", "restraints {node, fix_x?, fix_y?}, both fixed by default"),
        FieldSpec::required("loads", "N", "nodal forces {node, fx?, fy?}"),
        FieldSpec::optional("elastic_modulus", "Pa", "modulus for members that give none, default 210e9"),
        FieldSpec::optional("yield_strength", "Pa", "enables utilisation and safety factor"),
    ],
    outputs: &[
        FieldSpec::output("displacements", "m", "ux, uy per node"),
        FieldSpec::output("element_results", "-", "length, axial force (N, tension positive), stress (Pa), strain per member"),
        FieldSpec::output("reactions", "N", "rx, ry per supported node"),
        FieldSpec::output("max_displacement", "m", "largest nodal displacement magnitude"),
        FieldSpec::output("max_stress", "Pa", "largest absolute member stress"),
        FieldSpec::output("safety_factor", "-", "yield_strength / max_stress, if yield given"),
        FieldSpec::output("equilibrium_residual", "N", "‖Σ reactions + Σ loads‖"),
    ],
};

#[derive(Debug, Clone)]
struct Member {
    nodes: [usize; 2],
    area: f64,
    modulus: f64,
}

#[derive(Debug, Clone)]
struct Support {
    node: usize,
    fix: [bool; 2],
}

#[derive(Debug, Clone)]
pub struct TrussInput {
    nodes: Vec<Vec<f64>>,
    members: Vec<Member>,
    supports: Vec<Support>,
    loads: Vec<f64>,
    yield_strength: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct NodeDisplacement {
    pub node: usize,
    pub ux: f64,
    pub uy: f64,
}

#[derive(Debug, Serialize)]
pub struct ElementResult {
    pub element: usize,
    pub length: f64,
    pub axial_force: f64,
    pub stress: f64,
    pub strain: f64,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct Reaction {
    pub node: usize,
    pub rx: f64,
    pub ry: f64,
}

#[derive(Debug, Serialize)]
pub struct TrussOutput {
    pub displacements: Vec<NodeDisplacement>,
    pub element_results: Vec<ElementResult>,
    pub reactions: Vec<Reaction>,
    pub max_displacement: f64,
    pub max_stress: f64,
    pub safety_factor: Option<f64>,
    pub equilibrium_residual: f64,
}

/// Length and direction cosines of a member.
fn geometry(nodes: &[Vec<f64>], member: &Member) -> (f64, f64, f64) {
    let [i, j] = member.nodes;
    let dx = nodes[j][0] - nodes[i][0];
    let dy = nodes[j][1] - nodes[i][1];
    let length = dx.hypot(dy);
    (length, dx / length, dy / length)
}

impl TrussInput {
    fn stiffness(&self) -> Matrix {
        let mut k = Matrix::zeros(2 * self.nodes.len(), 2 * self.nodes.len());
        for member in &self.members {
            let (length, c, s) = geometry(&self.nodes, member);
            let ea_l = member.modulus * member.area / length;
            let block = [[c * c, c * s], [c * s, s * s]];
            let [i, j] = member.nodes;
            for a in 0..2 {
                for b in 0..2 {
                    let v = ea_l * block[a][b];
                    k[(2 * i + a, 2 * i + b)] += v;
                    k[(2 * j + a, 2 * j + b)] += v;
                    k[(2 * i + a, 2 * j + b)] -= v;
                    k[(2 * j + a, 2 * i + b)] -= v;
                }
            }
        }
        k
    }

    fn free_dofs(&self) -> Vec<usize> {
        let mut fixed = vec![false; 2 * self.nodes.len()];
        for support in &self.supports {
            for axis in 0..2 {
                fixed[2 * support.node + axis] |= support.fix[axis];
            }
        }
        (0..fixed.len()).filter(|d| !fixed[*d]).collect()
    }

    /// Full displacement vector, or `NotPositiveDefinite` for a mechanism.
    fn displacements(&self, k: &Matrix) -> Result<Vec<f64>, NumericsError> {
        let free = self.free_dofs();
        let mut u = vec![0.0; 2 * self.nodes.len()];
        if free.is_empty() {
            return Ok(u);
        }
        let diag: Vec<f64> = free.iter().map(|&d| k[(d, d)]).collect();
        if diag.iter().any(|v| *v <= 0.0) {
            return Err(NumericsError::NotPositiveDefinite);
        }
        let root: Vec<f64> = diag.iter().map(|v| v.sqrt()).collect();
        let mut reduced = Matrix::zeros(free.len(), free.len());
        for (r, &dr) in free.iter().enumerate() {
            for (c, &dc) in free.iter().enumerate() {
                reduced[(r, c)] = k[(dr, dc)] / (root[r] * root[c]);
            }
        }
        let rhs: Vec<f64> = free
            .iter()
            .zip(&root)
            .map(|(&d, s)| self.loads[d] / s)
            .collect();
        let l = reduced.cholesky()?;
        let scaled = Matrix::cholesky_solve(&l, &rhs)?;
        for ((&d, v), s) in free.iter().zip(scaled).zip(&root) {
            u[d] = v / s;
        }
        Ok(u)
    }
}

fn parse_node(
    params: &mut ParamReader<'_>,
    field: &str,
    item: &Value,
    path: &str,
    node_count: usize,
) -> Option<usize> {
    nested_index(params, field, item, "node", path, node_count)
}

fn signed(params: &mut ParamReader<'_>, field: &str, item: &Value, key: &str, path: &str) -> f64 {
    match item.get(key) {
        None => 0.0,
        Some(v) => match v.as_f64().filter(|x| in_numeric_range(*x)) {
            Some(x) => x,
            None => {
                params.error(
                    field,
                    format!("{path}.{key} must be a finite number within ±{MAX_MAGNITUDE:e}"),
                );
                0.0
            }
        },
    }
}

impl Algorithm for TrussFea {
    type Input = TrussInput;
    type Output = TrussOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        // Fixture bracket: pinned and roller supported triangle, 10 kN down at the apex.
        json!({
            "nodes": [[0.0, 0.0], [4.0, 0.0], [2.0, 2.0]],
            "elements": [
                {"nodes": [0, 1], "area": 5e-4},
                {"nodes": [1, 2], "area": 5e-4},
                {"nodes": [0, 2], "area": 5e-4}
            ],
            "supports": [
                {"node": 0},
                {"node": 1, "fix_x": false}
            ],
            "loads": [{"node": 2, "fy": -10000.0}],
            "elastic_modulus": 210e9,
            "yield_strength": 250e6
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> TrussInput {
        let nodes = params.required_matrix("nodes");
        if params.has("nodes") && params.ensure_count("nodes", nodes.len(), 2, MAX_NODES) {
            params.ensure_rectangular("nodes", &nodes, 2);
        }
        let node_count = if params.failed("nodes") { 0 } else { nodes.len() };
        let default_modulus = params.optional_f64("elastic_modulus", DEFAULT_MODULUS);
        params.ensure_positive("elastic_modulus", default_modulus);

        let mut members = Vec::new();
        let elements = params.required_array("elements");
        if params.has("elements") {
            params.ensure_count("elements", elements.len(), 1, MAX_ELEMENTS);
        }
        for (e, item) in elements.iter().enumerate() {
            let path = format!("elements[{e}]");
            let ends: Option<Vec<usize>> = item.get("nodes").and_then(Value::as_array).and_then(|a| {
                a.iter()
                    .map(|v| v.as_u64().and_then(|i| usize::try_from(i).ok()))
                    .collect()
            });
            let ends = match ends {
                Some(ends) if ends.len() == 2 => [ends[0], ends[1]],
                _ => {
                    params.error("elements", format!("{path}.nodes must be two node indices"));
                    continue;
                }
            };
            let area = nested_number(params, "elements", item, "area", &path);
            let modulus = match item.get("elastic_modulus") {
                None => Some(default_modulus),
                Some(_) => nested_number(params, "elements", item, "elastic_modulus", &path),
            };
            let (Some(area), Some(modulus)) = (area, modulus) else {
                continue;
            };
            if area < MIN_POSITIVE || modulus < MIN_POSITIVE {
                params.error(
                    "elements",
                    format!("{path} needs area and elastic_modulus of at least {MIN_POSITIVE:e}"),
                );
                continue;
            }
            if node_count == 0 {
                continue;
            }
            if let Some(bad) = ends.iter().find(|i| **i >= node_count) {
                params.error("elements", format!("{path}.nodes refers to missing node {bad}"));
                continue;
            }
            let member = Member {
                nodes: ends,
                area,
                modulus,
            };
            if ends[0] == ends[1] || geometry(&nodes, &member).0 < EPSILON {
                params.error("elements", format!("{path} has zero length"));
                continue;
            }
            members.push(member);
        }

        let mut supports = Vec::new();
        let items = params.required_array("supports");
        if params.has("supports") {
            params.ensure_min_len("supports", items.len(), 1);
        }
        for (s, item) in items.iter().enumerate() {
            let path = format!("supports[{s}]");
            let fix_x = item.get("fix_x").and_then(Value::as_bool).unwrap_or(true);
            let fix_y = item.get("fix_y").and_then(Value::as_bool).unwrap_or(true);
            if let Some(node) = parse_node(params, "supports", item, &path, node_count) {
                supports.push(Support {
                    node,
                    fix: [fix_x, fix_y],
                });
            }
        }

        let mut loads = vec![0.0; 2 * node_count];
        let items = params.required_array("loads");
        if params.has("loads") {
            params.ensure_min_len("loads", items.len(), 1);
        }
        for (l, item) in items.iter().enumerate() {
            let path = format!("loads[{l}]");
            let fx = signed(params, "loads", item, "fx", &path);
            let fy = signed(params, "loads", item, "fy", &path);
            if let Some(node) = parse_node(params, "loads", item, &path, node_count) {
                loads[2 * node] += fx;
                loads[2 * node + 1] += fy;
            }
        }

        let yield_strength = params.maybe_f64("yield_strength");
        if let Some(y) = yield_strength {
            params.ensure_positive("yield_strength", y);
        }

        let input = TrussInput {
            nodes,
            members,
            supports,
            loads,
            yield_strength,
        };
        if !params.has_errors() && input.displacements(&input.stiffness()).is_err() {
            params.error(
                "supports",
                "structure is a mechanism: the stiffness matrix is singular; add supports or members",
            );
        }
        input
    }

    fn calculate(&self, input: &TrussInput) -> Result<ResultEnvelope<TrussOutput>, AlgorithmError> {
        let n = input.nodes.len();
        if n < 2 || input.members.is_empty() || input.loads.len() != 2 * n {
            return Err(AlgorithmError::InvalidInput(
                "truss needs nodes, members and a load vector".into(),
            ));
        }
        let k = input.stiffness();
        let u = input.displacements(&k).map_err(|_| {
            AlgorithmError::InvalidInput("structure is a mechanism".into())
        })?;
        let ku = k.mul_vec(&u)?;

        let displacements: Vec<NodeDisplacement> = (0..n)
            .map(|node| NodeDisplacement {
                node,
                ux: u[2 * node],
                uy: u[2 * node + 1],
            })
            .collect();
        let max_displacement = displacements
            .iter()
            .map(|d| d.ux.hypot(d.uy))
            .fold(0.0, f64::max);

        let mut warnings = Vec::new();
        let mut element_results = Vec::with_capacity(input.members.len());
        for (element, member) in input.members.iter().enumerate() {
            let (length, c, s) = geometry(&input.nodes, member);
            let [i, j] = member.nodes;
            let elongation = c * (u[2 * j] - u[2 * i]) + s * (u[2 * j + 1] - u[2 * i + 1]);
            let strain = elongation / length;
            let stress = member.modulus * strain;
            let axial_force = stress * member.area;
            let utilization = input.yield_strength.map(|y| stress.abs() / y);
            if utilization.is_some_and(|ratio| ratio > 1.0) {
                warnings.push(format!(
                    "element {element} exceeds yield: |σ| = {:.3e} Pa",
                    stress.abs()
                ));
            }
            let state = if axial_force.abs() < EPSILON {
                "zero"
            } else if axial_force > 0.0 {
                "tension"
            } else {
                "compression"
            };
            element_results.push(ElementResult {
                element,
                length,
                axial_force,
                stress,
                strain,
                state,
                utilization,
            });
        }

        let mut reactions: Vec<Reaction> = Vec::new();
        for support in &input.supports {
            if reactions.iter().any(|r| r.node == support.node) {
                continue;
            }
            let d = 2 * support.node;
            reactions.push(Reaction {
                node: support.node,
                rx: ku[d] - input.loads[d],
                ry: ku[d + 1] - input.loads[d + 1],
            });
        }
        // Free dofs carry no reaction, so the global sum is the imbalance.
        let total_x: f64 = reactions.iter().map(|r| r.rx).sum::<f64>()
            + (0..n).map(|i| input.loads[2 * i]).sum::<f64>();
        let total_y: f64 = reactions.iter().map(|r| r.ry).sum::<f64>()
            + (0..n).map(|i| input.loads[2 * i + 1]).sum::<f64>();
        let equilibrium_residual = vector::norm(&[total_x, total_y]);

        let max_stress = element_results
            .iter()
            .map(|e| e.stress.abs())
            .fold(0.0, f64::max);
        let safety_factor = input
            .yield_strength
            .filter(|_| max_stress > EPSILON)
            .map(|y| y / max_stress);
        if let Some(sf) = safety_factor
            && sf < MIN_SAFETY_FACTOR
        {
            warnings.push(format!(
                "safety factor {sf:.2} is below {MIN_SAFETY_FACTOR}"
            ));
        }

        Ok(ResultEnvelope::with_warnings(
            TrussOutput {
                displacements,
                element_results,
                reactions,
                max_displacement,
                max_stress,
                safety_factor,
                equilibrium_residual,
            },
            warnings,
        ))
    }
}
