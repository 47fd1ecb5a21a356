//! The internal state vector the model self-reports.
//!
//! Five bounded dimensions plus a derived `intrinsicValue`. Every stored
//! value lies in `[0.0, 1.0]`; updates are applied per field, so a partially
//! valid update changes only its valid fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One named dimension of the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Coherence,
    Complexity,
    Novelty,
    Efficiency,
    EthicalAlignment,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Coherence,
        Dimension::Complexity,
        Dimension::Novelty,
        Dimension::Efficiency,
        Dimension::EthicalAlignment,
    ];

    /// The wire name of this dimension.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::Coherence => "coherence",
            Dimension::Complexity => "complexity",
            Dimension::Novelty => "novelty",
            Dimension::Efficiency => "efficiency",
            Dimension::EthicalAlignment => "ethicalAlignment",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "coherence" => Some(Dimension::Coherence),
            "complexity" => Some(Dimension::Complexity),
            "novelty" => Some(Dimension::Novelty),
            "efficiency" => Some(Dimension::Efficiency),
            "ethicalAlignment" | "ethical_alignment" => Some(Dimension::EthicalAlignment),
            _ => None,
        }
    }
}

/// Key of the derived aggregate; never writable.
pub const INTRINSIC_VALUE_KEY: &str = "intrinsicValue";

/// The bounded score vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "StateSnapshot")]
pub struct InternalState {
    coherence: f64,
    complexity: f64,
    novelty: f64,
    efficiency: f64,
    ethical_alignment: f64,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            coherence: 0.85,
            complexity: 0.70,
            novelty: 0.60,
            efficiency: 0.90,
            ethical_alignment: 0.95,
        }
    }
}

/// Why a single field of an update was not applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedField {
    pub key: String,
    pub reason: String,
}

/// Outcome of a per-field merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub applied: Vec<String>,
    pub rejected: Vec<RejectedField>,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

impl InternalState {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Coherence => self.coherence,
            Dimension::Complexity => self.complexity,
            Dimension::Novelty => self.novelty,
            Dimension::Efficiency => self.efficiency,
            Dimension::EthicalAlignment => self.ethical_alignment,
        }
    }

    fn slot(&mut self, dimension: Dimension) -> &mut f64 {
        match dimension {
            Dimension::Coherence => &mut self.coherence,
            Dimension::Complexity => &mut self.complexity,
            Dimension::Novelty => &mut self.novelty,
            Dimension::Efficiency => &mut self.efficiency,
            Dimension::EthicalAlignment => &mut self.ethical_alignment,
        }
    }

    /// Set one dimension. Returns `false` and leaves the state untouched
    /// when the value is outside `[0, 1]` or not finite.
    pub fn set(&mut self, dimension: Dimension, value: f64) -> bool {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return false;
        }
        *self.slot(dimension) = value;
        true
    }

    /// Mean of the five dimensions.
    pub fn intrinsic_value(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum::<f64>() / Dimension::ALL.len() as f64
    }

    /// Merge a JSON object into the state, field by field.
    pub fn merge(&mut self, delta: &Map<String, Value>) -> MergeReport {
        let mut report = MergeReport::default();
        for (key, value) in delta {
            let reject = |reason: &str| RejectedField {
                key: key.clone(),
                reason: reason.to_string(),
            };
            if key == INTRINSIC_VALUE_KEY {
                report.rejected.push(reject("derived value is read-only"));
                continue;
            }
            let Some(dimension) = Dimension::from_key(key) else {
                report.rejected.push(reject("unknown dimension"));
                continue;
            };
            let Some(number) = value.as_f64() else {
                report.rejected.push(reject("not a number"));
                continue;
            };
            if self.set(dimension, number) {
                report.applied.push(dimension.key().to_string());
            } else {
                report.rejected.push(reject("outside [0, 1]"));
            }
        }
        report
    }

    /// The state as a JSON object including `intrinsicValue`.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Map<String, Value>> for InternalState {
    fn from(map: Map<String, Value>) -> Self {
        let mut state = InternalState::default();
        state.merge(&map);
        state
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateSnapshot {
    coherence: f64,
    complexity: f64,
    novelty: f64,
    efficiency: f64,
    ethical_alignment: f64,
    intrinsic_value: f64,
}

impl From<InternalState> for StateSnapshot {
    fn from(state: InternalState) -> Self {
        Self {
            coherence: state.coherence,
            complexity: state.complexity,
            novelty: state.novelty,
            efficiency: state.efficiency,
            ethical_alignment: state.ethical_alignment,
            intrinsic_value: state.intrinsic_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults() {
        let state = InternalState::default();
        assert_eq!(state.get(Dimension::Coherence), 0.85);
        assert_eq!(state.get(Dimension::EthicalAlignment), 0.95);
        assert!((state.intrinsic_value() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn partial_update_applies_only_valid_fields() {
        let mut state = InternalState::default();
        let report = state.merge(&obj(json!({"coherence": 0.42, "novelty": 1.7})));
        assert_eq!(report.applied, vec!["coherence"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].key, "novelty");
        assert_eq!(state.get(Dimension::Coherence), 0.42);
        assert_eq!(state.get(Dimension::Novelty), 0.60);
    }

    #[test]
    fn rejects_unknown_keys_strings_and_derived_value() {
        let mut state = InternalState::default();
        let before = state;
        let report = state.merge(&obj(json!({
            "mood": 0.5,
            "complexity": "high",
            "intrinsicValue": 0.1,
            "efficiency": -0.01
        })));
        assert!(report.is_noop());
        assert_eq!(report.rejected.len(), 4);
        assert_eq!(state, before);
    }

    #[test]
    fn accepts_bounds_and_snake_case_alias() {
        let mut state = InternalState::default();
        let report = state.merge(&obj(json!({"ethical_alignment": 0.0, "coherence": 1})));
        assert_eq!(report.applied.len(), 2);
        assert_eq!(state.get(Dimension::EthicalAlignment), 0.0);
        assert_eq!(state.get(Dimension::Coherence), 1.0);
    }

    #[test]
    fn every_field_stays_in_bounds() {
        let mut state = InternalState::default();
        for value in [-1.0, 0.0, 0.3, 1.0, 1.0001, 42.0, f64::MAX] {
            for d in Dimension::ALL {
                state.merge(&obj(json!({ d.key(): value })));
            }
        }
        for d in Dimension::ALL {
            assert!((0.0..=1.0).contains(&state.get(d)));
        }
        assert!((0.0..=1.0).contains(&state.intrinsic_value()));
    }

    #[test]
    fn serializes_with_intrinsic_value() {
        let json = InternalState::default().to_json();
        assert_eq!(json["ethicalAlignment"], json!(0.95));
        assert!(json["intrinsicValue"].as_f64().is_some());
    }

    #[test]
    fn deserialization_is_lenient_per_field() {
        let state: InternalState =
            serde_json::from_value(json!({"coherence": 0.1, "novelty": 9, "intrinsicValue": 0.2}))
                .unwrap();
        assert_eq!(state.get(Dimension::Coherence), 0.1);
        assert_eq!(state.get(Dimension::Novelty), 0.60);
    }
}
