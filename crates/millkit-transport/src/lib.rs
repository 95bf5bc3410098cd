//! # Millkit transport
//!
//! A JSON-in/JSON-out adapter over [`Engine`]. A request is
//! `{"action": ..., "payload": ...}`; every response, accepted or rejected,
//! carries the same header (`schema`, `dispatchKind`, `result`, `action`,
//! `actionId`, `semanticDigest`) so a caller can route on it without knowing
//! the action.
//!
//! The adapter owns no framing or authentication. Whatever carries the JSON
//! (a CLI pipe, a socket, an FFI call) sits outside this crate.
//!
//! [`registry_check`] is the companion self-test: it inspects a catalogue
//! before it is frozen into a registry and reports duplicate or empty ids,
//! incomplete metadata and examples that fail their own validation, together
//! with a digest over the catalogue rows.

use millkit_kernel::{
    AlgorithmMeta, CalculateRequest, DynAlgorithm, Engine, EngineError, Registry, RegistryError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const DISPATCH_KIND: &str = "millkit.transport_dispatch.v1";
const REGISTRY_CHECK_KIND: &str = "millkit.registry_check.v1";
const SEMANTIC_DIGEST_PREFIX: &str = "mk1_";
const ACTION_ID_INVALID_REQUEST: &str = "transport.action.invalid_request";
const ACTION_ID_UNKNOWN: &str = "transport.action.unknown";

const FAILURE_INVALID_REQUEST: &str = "transport_invalid_request";
const FAILURE_UNKNOWN_ACTION: &str = "transport_unknown_action";
const FAILURE_INVALID_PAYLOAD: &str = "transport_invalid_payload";
const FAILURE_REGISTRY_UNAVAILABLE: &str = "transport_registry_unavailable";
const FAILURE_REGISTRY_EMPTY_ID: &str = "registry_empty_id";
const FAILURE_REGISTRY_DUPLICATE_ID: &str = "registry_duplicate_id";
const FAILURE_REGISTRY_EMPTY_FIELD: &str = "registry_empty_field";
const FAILURE_REGISTRY_DUPLICATE_FIELD: &str = "registry_duplicate_field";
const FAILURE_REGISTRY_EXAMPLE_INVALID: &str = "registry_example_invalid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportAction {
    List,
    Describe,
    Validate,
    Calculate,
    Benchmark,
}

const TRANSPORT_ACTIONS: [(TransportAction, &str); 5] = [
    (TransportAction::List, "list"),
    (TransportAction::Describe, "describe"),
    (TransportAction::Validate, "validate"),
    (TransportAction::Calculate, "calculate"),
    (TransportAction::Benchmark, "benchmark"),
];

impl TransportAction {
    fn from_action(value: &str) -> Option<Self> {
        let action = value.trim();
        TRANSPORT_ACTIONS
            .iter()
            .find(|(_, name)| *name == action)
            .map(|(id, _)| *id)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::List => "transport.action.list",
            Self::Describe => "transport.action.describe",
            Self::Validate => "transport.action.validate",
            Self::Calculate => "transport.action.calculate",
            Self::Benchmark => "transport.action.benchmark",
        }
    }
}

/// The action names a dispatcher accepts, in declaration order.
pub fn transport_actions() -> Vec<&'static str> {
    TRANSPORT_ACTIONS.iter().map(|(_, name)| *name).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportDispatchRequest {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct DescribeRequest {
    algorithm_id: String,
}

fn semantic_digest(material: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in material {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{SEMANTIC_DIGEST_PREFIX}{:x}", hasher.finalize())
}

fn dispatch_digest(action: &str, action_id: &str) -> String {
    semantic_digest(&[DISPATCH_KIND, action, action_id])
}

fn accepted(action: &str, action_id: &str, payload: Value) -> Value {
    json!({
        "schema": 1,
        "dispatchKind": DISPATCH_KIND,
        "result": "accepted",
        "action": action,
        "actionId": action_id,
        "semanticDigest": dispatch_digest(action, action_id),
        "payload": payload,
    })
}

fn rejected(
    action: &str,
    action_id: &str,
    failure_class: &str,
    diagnostic: impl Into<String>,
) -> Value {
    json!({
        "schema": 1,
        "dispatchKind": DISPATCH_KIND,
        "result": "rejected",
        "action": action,
        "actionId": action_id,
        "semanticDigest": dispatch_digest(action, action_id),
        "failureClass": failure_class,
        "diagnostic": diagnostic.into(),
    })
}

/// Engine failures keep their structured body under `error`.
fn rejected_by_engine(action: &str, action_id: &str, err: &EngineError) -> Value {
    let mut response = rejected(action, action_id, err.kind(), err.to_string());
    if let (Some(obj), Some(body)) = (response.as_object_mut(), err.to_envelope().get("error")) {
        obj.insert("error".to_string(), body.clone());
    }
    response
}

/// One row of the `list` payload.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmSummary {
    pub id: &'static str,
    pub name: &'static str,
    pub domain: millkit_kernel::Domain,
    pub safety_class: millkit_kernel::SafetyClass,
}

/// The `describe` payload: static metadata plus a known-good example.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmDescription {
    #[serde(flatten)]
    pub meta: &'static AlgorithmMeta,
    pub example: Value,
}

pub fn list_payload(engine: &Engine) -> Vec<AlgorithmSummary> {
    engine
        .registry()
        .describe_all()
        .into_iter()
        .map(|meta| AlgorithmSummary {
            id: meta.id,
            name: meta.name,
            domain: meta.domain,
            safety_class: meta.safety_class,
        })
        .collect()
}

pub fn describe_payload(engine: &Engine, id: &str) -> Result<AlgorithmDescription, EngineError> {
    let meta = engine.describe(id)?;
    let example = engine
        .registry()
        .lookup(meta.id)
        .map(|algorithm| algorithm.example())
        .unwrap_or(Value::Null);
    Ok(AlgorithmDescription { meta, example })
}

/// Dispatcher bound to one engine.
#[derive(Debug, Clone)]
pub struct Transport {
    engine: Engine,
}

impl Transport {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn dispatch_json(&self, request_json: &str) -> String {
        let response = match serde_json::from_str::<TransportDispatchRequest>(request_json) {
            Ok(request) => self.dispatch(request),
            Err(source) => rejected(
                "transport.dispatch",
                ACTION_ID_INVALID_REQUEST,
                FAILURE_INVALID_REQUEST,
                format!("invalid transport request: {source}"),
            ),
        };
        // `Value` holds only JSON-safe data, so this cannot fail.
        serde_json::to_string(&response).unwrap_or_default()
    }

    pub fn dispatch(&self, request: TransportDispatchRequest) -> Value {
        let action = request.action.trim().to_string();
        let Some(kind) = TransportAction::from_action(&action) else {
            return rejected(
                &action,
                ACTION_ID_UNKNOWN,
                FAILURE_UNKNOWN_ACTION,
                format!(
                    "unsupported transport action: {action} (expected one of {})",
                    transport_actions().join(", ")
                ),
            );
        };
        let action_id = kind.as_str();
        tracing::debug!(action = %action, "transport dispatch");

        match kind {
            TransportAction::List => {
                let payload = json!({ "algorithms": list_payload(&self.engine) });
                accepted(&action, action_id, payload)
            }
            TransportAction::Describe => {
                let request = match serde_json::from_value::<DescribeRequest>(request.payload) {
                    Ok(request) => request,
                    Err(source) => {
                        return rejected(
                            &action,
                            action_id,
                            FAILURE_INVALID_PAYLOAD,
                            format!("invalid describe payload: {source}"),
                        );
                    }
                };
                match describe_payload(&self.engine, &request.algorithm_id) {
                    Ok(description) => match serde_json::to_value(description) {
                        Ok(payload) => accepted(&action, action_id, payload),
                        Err(source) => {
                            rejected(&action, action_id, FAILURE_INVALID_PAYLOAD, source.to_string())
                        }
                    },
                    Err(err) => rejected_by_engine(&action, action_id, &err),
                }
            }
            TransportAction::Validate | TransportAction::Calculate | TransportAction::Benchmark => {
                let request = match serde_json::from_value::<CalculateRequest>(request.payload) {
                    Ok(request) => request,
                    Err(source) => {
                        return rejected(
                            &action,
                            action_id,
                            FAILURE_INVALID_PAYLOAD,
                            format!("invalid {action} payload: {source}"),
                        );
                    }
                };
                let id = request.algorithm_id.as_str();
                let params = &request.params;
                let outcome = match kind {
                    TransportAction::Validate => {
                        self.engine.validate(id, params).map(serde_json::to_value)
                    }
                    TransportAction::Calculate => {
                        self.engine.calculate(id, params).map(serde_json::to_value)
                    }
                    _ => self.engine.benchmark(id, params).map(serde_json::to_value),
                };
                match outcome {
                    Ok(Ok(payload)) => accepted(&action, action_id, payload),
                    Ok(Err(source)) => {
                        rejected(&action, action_id, FAILURE_INVALID_PAYLOAD, source.to_string())
                    }
                    Err(err) => rejected_by_engine(&action, action_id, &err),
                }
            }
        }
    }
}

fn default_transport() -> Result<&'static Transport, &'static RegistryError> {
    static TRANSPORT: OnceLock<Result<Transport, RegistryError>> = OnceLock::new();
    TRANSPORT
        .get_or_init(|| {
            millkit_algorithms::default_registry()
                .map(|registry| Transport::new(Engine::new(Arc::new(registry))))
        })
        .as_ref()
}

/// Dispatch against the default catalogue with default engine settings.
pub fn transport_dispatch_json(request_json: &str) -> String {
    match default_transport() {
        Ok(transport) => transport.dispatch_json(request_json),
        Err(err) => serde_json::to_string(&rejected(
            "transport.dispatch",
            ACTION_ID_INVALID_REQUEST,
            FAILURE_REGISTRY_UNAVAILABLE,
            err.to_string(),
        ))
        .unwrap_or_default(),
    }
}

// ─── Registry check ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRow {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub semantic_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCheckIssue {
    pub failure_class: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCheckReport {
    pub schema: u32,
    pub check_kind: String,
    pub result: String,
    pub failure_classes: Vec<String>,
    pub issues: Vec<RegistryCheckIssue>,
    pub algorithm_count: usize,
    pub algorithms: Vec<RegistryRow>,
    pub semantic_digest: String,
}

impl RegistryCheckReport {
    pub fn accepted(&self) -> bool {
        self.result == "accepted"
    }
}

fn registry_row(meta: &AlgorithmMeta) -> RegistryRow {
    let domain = meta.domain.as_str();
    RegistryRow {
        id: meta.id.to_string(),
        name: meta.name.to_string(),
        domain: domain.to_string(),
        semantic_digest: semantic_digest(&[meta.id, meta.name, domain]),
    }
}

fn check_digest(result: &str, failure_classes: &[String], rows: &[RegistryRow]) -> String {
    let mut material: Vec<&str> = vec![REGISTRY_CHECK_KIND, result];
    material.extend(failure_classes.iter().map(String::as_str));
    for row in rows {
        material.extend([row.id.as_str(), row.name.as_str(), row.domain.as_str()]);
    }
    semantic_digest(&material)
}

fn issue(failure_class: &str, path: String, message: impl Into<String>) -> RegistryCheckIssue {
    RegistryCheckIssue {
        failure_class: failure_class.to_string(),
        path,
        message: message.into(),
    }
}

fn check_metadata(meta: &AlgorithmMeta, path: &str, issues: &mut Vec<RegistryCheckIssue>) {
    let texts = [
        ("name", meta.name),
        ("description", meta.description),
        ("formula", meta.formula),
        ("reference", meta.reference),
    ];
    for (field, text) in texts {
        if text.trim().is_empty() {
            issues.push(issue(
                FAILURE_REGISTRY_EMPTY_FIELD,
                format!("{path}/{field}"),
                format!("{field} must not be empty"),
            ));
        }
    }
    for (section, fields) in [("inputs", meta.inputs), ("outputs", meta.outputs)] {
        if fields.is_empty() {
            issues.push(issue(
                FAILURE_REGISTRY_EMPTY_FIELD,
                format!("{path}/{section}"),
                format!("{section} must declare at least one field"),
            ));
        }
        let mut seen = BTreeMap::new();
        for field in fields {
            if seen.insert(field.name, ()).is_some() {
                issues.push(issue(
                    FAILURE_REGISTRY_DUPLICATE_FIELD,
                    format!("{path}/{section}/{}", field.name),
                    "field declared twice",
                ));
            }
        }
    }
}

/// Inspect a catalogue before it becomes a [`Registry`].
pub fn registry_check(catalogue: &[Box<dyn DynAlgorithm>]) -> RegistryCheckReport {
    let mut issues = Vec::new();
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (index, algorithm) in catalogue.iter().enumerate() {
        let meta = algorithm.describe();
        let path = format!("algorithms/{}", meta.id);
        if meta.id.trim().is_empty() {
            issues.push(issue(
                FAILURE_REGISTRY_EMPTY_ID,
                format!("algorithms[{index}]"),
                format!("`{}` is registered with an empty id", meta.name),
            ));
        } else if let Some(first) = seen.insert(meta.id, index) {
            issues.push(issue(
                FAILURE_REGISTRY_DUPLICATE_ID,
                path.clone(),
                format!("id registered at positions {first} and {index}"),
            ));
        }
        check_metadata(meta, &path, &mut issues);
        let example = algorithm.example();
        let verdict = match example.as_object() {
            Some(params) => algorithm.validate(params),
            None => {
                issues.push(issue(
                    FAILURE_REGISTRY_EXAMPLE_INVALID,
                    format!("{path}/example"),
                    "example must be a JSON object",
                ));
                continue;
            }
        };
        for error in verdict.errors() {
            issues.push(issue(
                FAILURE_REGISTRY_EXAMPLE_INVALID,
                format!("{path}/example/{}", error.field),
                error.message.clone(),
            ));
        }
    }
    issues.sort_by(|a, b| {
        (&a.failure_class, &a.path, &a.message).cmp(&(&b.failure_class, &b.path, &b.message))
    });

    let mut algorithms: Vec<RegistryRow> = catalogue
        .iter()
        .map(|algorithm| registry_row(algorithm.describe()))
        .collect();
    algorithms.sort_by(|a, b| (&a.id, &a.name).cmp(&(&b.id, &b.name)));

    let mut failure_classes: Vec<String> =
        issues.iter().map(|i| i.failure_class.clone()).collect();
    failure_classes.sort();
    failure_classes.dedup();
    let result = if issues.is_empty() { "accepted" } else { "rejected" };
    let semantic_digest = check_digest(result, &failure_classes, &algorithms);
    if !issues.is_empty() {
        tracing::warn!(issues = issues.len(), "registry check rejected the catalogue");
    }

    RegistryCheckReport {
        schema: 1,
        check_kind: REGISTRY_CHECK_KIND.to_string(),
        result: result.to_string(),
        failure_classes,
        issues,
        algorithm_count: algorithms.len(),
        algorithms,
        semantic_digest,
    }
}

/// [`registry_check`] over the shipped catalogue.
pub fn default_registry_check() -> RegistryCheckReport {
    registry_check(&millkit_algorithms::catalogue())
}

/// Freeze a catalogue that passed [`registry_check`].
pub fn build_registry(catalogue: Vec<Box<dyn DynAlgorithm>>) -> Result<Registry, RegistryError> {
    Registry::new(catalogue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_algorithms::signal::fft::Fft;
    use millkit_kernel::{
        Algorithm, AlgorithmError, Domain, EngineConfig, FieldSpec, ParamReader, ResultEnvelope,
        SafetyClass,
    };

    fn call(request: Value) -> Value {
        let text = transport_dispatch_json(&request.to_string());
        serde_json::from_str(&text).expect("response is JSON")
    }

    #[test]
    fn list_reports_the_whole_catalogue() {
        let response = call(json!({"action": "list"}));
        assert_eq!(response["result"], "accepted");
        assert_eq!(response["actionId"], "transport.action.list");
        let algorithms = response["payload"]["algorithms"].as_array().unwrap();
        assert_eq!(algorithms.len(), 26);
        assert_eq!(algorithms[0]["id"], "ant_colony");
        assert!(
            response["semanticDigest"]
                .as_str()
                .unwrap()
                .starts_with("mk1_")
        );
    }

    #[test]
    fn describe_includes_the_example() {
        let response = call(json!({"action": "describe", "payload": {"algorithm_id": "tsp"}}));
        assert_eq!(response["result"], "accepted");
        assert_eq!(response["payload"]["id"], "tsp");
        assert!(response["payload"]["example"].is_object());
        assert!(response["payload"]["inputs"].is_array());
    }

    #[test]
    fn calculate_accepts_and_wraps_the_engine_response() {
        let response = call(json!({
            "action": "calculate",
            "payload": {
                "algorithm_id": "kienzle_force",
                "params": {"specific_cutting_force": 1700.0, "mc": 0.25, "feed": 0.2, "depth_of_cut": 2.0}
            }
        }));
        assert_eq!(response["result"], "accepted", "{response}");
        assert_eq!(response["payload"]["algorithm_id"], "kienzle_force");
        assert!(response["payload"]["result"]["warnings"].is_array());
    }

    #[test]
    fn validation_failures_keep_their_issues() {
        let response = call(json!({
            "action": "calculate",
            "payload": {"algorithm_id": "taylor_tool_life", "params": {}}
        }));
        assert_eq!(response["result"], "rejected");
        assert_eq!(response["failureClass"], "validation");
        assert_eq!(response["error"]["issues"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn unknown_algorithm_and_action_are_rejected() {
        let response = call(json!({"action": "validate", "payload": {"algorithm_id": "nope"}}));
        assert_eq!(response["failureClass"], "unknown_algorithm");
        assert!(response["error"]["known_ids"].is_array());

        let response = call(json!({"action": "teleport"}));
        assert_eq!(response["failureClass"], "transport_unknown_action");
        assert_eq!(response["actionId"], "transport.action.unknown");
    }

    #[test]
    fn rejection_envelope_shape() {
        let mut response = call(json!({"action": " teleport "}));
        let digest = response
            .as_object_mut()
            .and_then(|obj| obj.remove("semanticDigest"))
            .expect("digest present");
        assert!(digest.as_str().unwrap().starts_with(SEMANTIC_DIGEST_PREFIX));
        insta::assert_json_snapshot!(response, @r#"
        {
          "action": "teleport",
          "actionId": "transport.action.unknown",
          "diagnostic": "unsupported transport action: teleport (expected one of list, describe, validate, calculate, benchmark)",
          "dispatchKind": "millkit.transport_dispatch.v1",
          "failureClass": "transport_unknown_action",
          "result": "rejected",
          "schema": 1
        }
        "#);
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let text = transport_dispatch_json("{not json");
        let response: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(response["failureClass"], "transport_invalid_request");

        let response = call(json!({"action": "calculate", "payload": {"params": {}}}));
        assert_eq!(response["failureClass"], "transport_invalid_payload");
    }

    #[test]
    fn benchmark_respects_engine_config() {
        let registry = millkit_algorithms::default_registry().unwrap();
        let config = EngineConfig {
            benchmark_enabled: false,
            ..EngineConfig::default()
        };
        let transport = Transport::new(Engine::with_config(Arc::new(registry), config));
        let response = transport.dispatch(TransportDispatchRequest {
            action: "benchmark".into(),
            payload: json!({"algorithm_id": "fft"}),
        });
        assert_eq!(response["failureClass"], "benchmark_disabled");
    }

    #[test]
    fn shipped_catalogue_passes_the_check() {
        let report = default_registry_check();
        assert!(report.accepted(), "{:?}", report.issues);
        assert_eq!(report.algorithm_count, 26);
        assert_eq!(report.semantic_digest, default_registry_check().semantic_digest);
        assert_eq!(report.semantic_digest.len(), 4 + 64);
    }

    struct Nameless;

    static NAMELESS: AlgorithmMeta = AlgorithmMeta {
        id: "",
        name: "Nameless",
        description: "",
        formula: "x",
        reference: "none",
        safety_class: SafetyClass::Standard,
        domain: Domain::NumericLearning,
        inputs: &[
            FieldSpec::required("x", "-", "value"),
            FieldSpec::optional("x", "-", "again"),
        ],
        outputs: &[],
    };

    impl Algorithm for Nameless {
        type Input = f64;
        type Output = BTreeMap<String, f64>;

        fn meta(&self) -> &'static AlgorithmMeta {
            &NAMELESS
        }

        fn example(&self) -> Value {
            json!({})
        }

        fn parse(&self, params: &mut ParamReader<'_>) -> f64 {
            params.required_f64("x")
        }

        fn calculate(&self, x: &f64) -> Result<ResultEnvelope<Self::Output>, AlgorithmError> {
            Ok(ResultEnvelope::new(BTreeMap::from([("x".to_string(), *x)])))
        }
    }

    #[test]
    fn broken_catalogue_is_rejected_with_every_issue() {
        let catalogue: Vec<Box<dyn DynAlgorithm>> =
            vec![Box::new(Fft), Box::new(Fft), Box::new(Nameless)];
        let report = registry_check(&catalogue);
        assert!(!report.accepted());
        assert_eq!(
            report.failure_classes,
            vec![
                "registry_duplicate_field",
                "registry_duplicate_id",
                "registry_empty_field",
                "registry_empty_id",
                "registry_example_invalid",
            ]
        );
        assert!(build_registry(catalogue).is_err());
    }
}
