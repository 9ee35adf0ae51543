//! Execution state carried on the wire for every attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::StateError;

/// Dynamic parameters of an execution.
///
/// Values round-trip through JSON, so numbers lose their int/float
/// distinction; use the typed accessors on [`State`] to read them back.
pub type Parameters = serde_json::Map<String, Value>;

/// Lifecycle status of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Constructed, not yet delivered
    #[default]
    Pending,
    /// Delivery received, action in progress
    Running,
    /// Action returned without error
    Success,
    /// Action returned an error or panicked
    Failed,
}

impl Status {
    /// Check if the attempt has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed)
    }

    /// Get the string representation used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution attempt.
///
/// `task_id` identifies the lineage and survives retries, `id` is replaced on
/// every publish.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub id: Uuid,
    pub task_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub parameters: Parameters,
    pub initialized_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub iterations: u32,
    pub status: Status,
    pub last_error: String,
}

impl State {
    /// Create the first state of a new lineage
    pub fn new(parameters: Parameters) -> Self {
        Self {
            id: Uuid::nil(),
            task_id: Uuid::new_v4(),
            parent_id: None,
            parameters,
            initialized_at: Utc::now(),
            started_at: None,
            iterations: 0,
            status: Status::Pending,
            last_error: String::new(),
        }
    }

    /// Create a new lineage linked to the lineage of `parent`
    pub fn child_of(parameters: Parameters, parent: &State) -> Self {
        Self {
            parent_id: Some(parent.task_id),
            ..Self::new(parameters)
        }
    }

    /// Decode a delivery body
    pub fn deserialize(body: &[u8]) -> Result<Self, StateError> {
        serde_json::from_slice(body).map_err(StateError::Deserialize)
    }

    /// Encode the state for the broker
    pub fn serialize(&self) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec(self).map_err(StateError::Serialize)
    }

    /// Encode only the parameters, as stored in the task history
    pub fn encode_parameters(&self) -> Result<String, StateError> {
        serde_json::to_string(&self.parameters).map_err(StateError::Serialize)
    }

    /// Mark the state as delivered and running
    pub fn begin_attempt(&mut self) {
        self.status = Status::Running;
        self.started_at = Some(Utc::now());
        self.iterations = self.iterations.saturating_add(1);
    }

    /// Raw parameter lookup
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// String parameter, or `default` (empty when `None`) if absent or not a string
    pub fn get_str(&self, name: &str, default: Option<&str>) -> String {
        match self.get(name) {
            Some(Value::String(s)) => s.clone(),
            _ => default.unwrap_or_default().to_string(),
        }
    }

    /// Integer parameter. Any JSON number is read as `f64` and truncated.
    pub fn get_int(&self, name: &str, default: Option<i64>) -> i64 {
        self.get(name)
            .and_then(Value::as_f64)
            .map(|f| f as i64)
            .unwrap_or_else(|| default.unwrap_or_default())
    }

    /// Float parameter
    pub fn get_float(&self, name: &str, default: Option<f64>) -> f64 {
        self.get(name)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| default.unwrap_or_default())
    }

    /// Boolean parameter
    pub fn get_bool(&self, name: &str, default: Option<bool>) -> bool {
        self.get(name)
            .and_then(Value::as_bool)
            .unwrap_or_else(|| default.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_new_state_defaults() {
        let state = State::new(params(json!({"name": "World"})));
        assert!(state.id.is_nil());
        assert!(!state.task_id.is_nil());
        assert_eq!(state.status, Status::Pending);
        assert_eq!(state.iterations, 0);
        assert!(state.parent_id.is_none());
        assert!(state.last_error.is_empty());
    }

    #[test]
    fn test_child_links_to_parent_lineage() {
        let parent = State::new(Parameters::new());
        let child = State::child_of(Parameters::new(), &parent);
        assert_eq!(child.parent_id, Some(parent.task_id));
        assert_ne!(child.task_id, parent.task_id);
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let mut plain = State::new(params(json!({"a": 1, "b": [true, null], "c": {"d": "e"}})));
        plain.id = Uuid::new_v4();

        let mut child = State::child_of(params(json!({"x": 1.5})), &plain);
        child.id = Uuid::new_v4();
        child.begin_attempt();
        child.status = Status::Failed;
        child.last_error = "boom".to_string();

        for state in [plain, child, State::default()] {
            let first = state.serialize().unwrap();
            let decoded = State::deserialize(&first).unwrap();
            let second = decoded.serialize().unwrap();
            assert_eq!(first, second);
            assert_eq!(decoded, state);
        }
    }

    #[test]
    fn test_parent_id_omitted_when_empty() {
        let state = State::new(Parameters::new());
        let value: Value = serde_json::from_slice(&state.serialize().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("parent_id"));
        for key in [
            "id",
            "task_id",
            "parameters",
            "initialized_at",
            "started_at",
            "iterations",
            "status",
            "last_error",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object["status"], json!("pending"));
    }

    #[test]
    fn test_get_int_defaults_and_narrowing() {
        let state = State::deserialize(br#"{"parameters":{"x":7}}"#).unwrap();
        assert_eq!(state.get_int("x", Some(5)), 7);
        assert_eq!(state.get_int("missing", Some(5)), 5);
        assert_eq!(state.get_int("missing", None), 0);

        let state = State::deserialize(br#"{"parameters":{"x":7.9,"s":"7"}}"#).unwrap();
        assert_eq!(state.get_int("x", None), 7);
        assert_eq!(state.get_int("s", Some(1)), 1);
    }

    #[test]
    fn test_typed_accessors_fall_back_on_wrong_type() {
        let state = State::new(params(json!({"name": "World", "ratio": 2, "flag": true})));
        assert_eq!(state.get_str("name", None), "World");
        assert_eq!(state.get_str("ratio", Some("n/a")), "n/a");
        assert_eq!(state.get_float("ratio", None), 2.0);
        assert_eq!(state.get_float("name", Some(0.5)), 0.5);
        assert!(state.get_bool("flag", None));
        assert!(state.get_bool("name", Some(true)));
    }

    #[test]
    fn test_begin_attempt_increments_iterations() {
        let mut state = State::new(Parameters::new());
        state.begin_attempt();
        state.begin_attempt();
        assert_eq!(state.iterations, 2);
        assert_eq!(state.status, Status::Running);
        assert!(state.started_at.is_some());
    }

    #[test]
    fn test_begin_attempt_saturates_at_max_iterations() {
        let mut state = State::new(Parameters::new());
        state.iterations = u32::MAX;
        let body = state.serialize().unwrap();

        let mut delivered = State::deserialize(&body).unwrap();
        delivered.begin_attempt();
        assert_eq!(delivered.iterations, u32::MAX);
        assert_eq!(delivered.status, Status::Running);
    }

    #[test]
    fn test_invalid_body_is_rejected() {
        assert!(matches!(
            State::deserialize(b"not json"),
            Err(StateError::Deserialize(_))
        ));
    }
}
