//! Per-student measure records.
//!
//! Field names serialize in camelCase; the aliases let snapshots written with the
//! Spanish field names (`alumnoId`, `medidas`, `fechaInicioISO`, ...) load unchanged.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A follow-up note attached to a measure instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(alias = "texto")]
    pub text: String,
    #[serde(alias = "fechaISO")]
    pub created_at: DateTime<Utc>,
}

/// One measure applied to one student, with its activation history and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureInstance {
    pub id: String,
    /// Catalog name at the time of the first activation.
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "activa")]
    pub active: bool,
    #[serde(alias = "fechaInicioISO")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        alias = "fechaFinISO",
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<DateTime<Utc>>,
    /// Newest first.
    #[serde(default, alias = "comentarios")]
    pub comments: Vec<Comment>,
}

/// All measure instances of a student, newest activation first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentState {
    #[serde(alias = "alumnoId")]
    pub student_id: String,
    #[serde(default, alias = "medidas")]
    pub measures: Vec<MeasureInstance>,
}

impl StudentState {
    pub fn empty(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            measures: Vec::new(),
        }
    }

    pub fn position(&self, measure_id: &str) -> Option<usize> {
        self.measures.iter().position(|m| m.id == measure_id)
    }

    pub fn find(&self, measure_id: &str) -> Option<&MeasureInstance> {
        self.measures.iter().find(|m| m.id == measure_id)
    }

    /// Active instances in stored order.
    pub fn active(&self) -> impl Iterator<Item = &MeasureInstance> {
        self.measures.iter().filter(|m| m.active)
    }

    /// Inactive instances in stored order.
    pub fn history(&self) -> impl Iterator<Item = &MeasureInstance> {
        self.measures.iter().filter(|m| !m.active)
    }
}

/// Student id → state, for every student with recorded measures.
pub type SharedState = BTreeMap<String, StudentState>;

/// The stored state of a student, or an empty one when nothing was recorded yet.
pub fn state_for<'a>(shared: &'a SharedState, student_id: &str) -> Cow<'a, StudentState> {
    match shared.get(student_id) {
        Some(state) => Cow::Borrowed(state),
        None => Cow::Owned(StudentState::empty(student_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loads_spanish_snapshot() {
        let raw = json!({
            "alumnoId": "A1",
            "medidas": [{
                "id": "M1",
                "nombre": "Medida 1",
                "activa": false,
                "fechaInicioISO": "2025-01-01T00:00:00.000Z",
                "fechaFinISO": "2025-02-01T00:00:00.000Z",
                "comentarios": [{ "id": "c1", "texto": "hola", "fechaISO": "2025-01-15T10:00:00.000Z" }]
            }]
        });
        let state: StudentState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.student_id, "A1");
        let m = &state.measures[0];
        assert_eq!(m.name, "Medida 1");
        assert!(!m.active);
        assert!(m.ended_at.is_some());
        assert_eq!(m.comments[0].text, "hola");
    }

    #[test]
    fn test_serializes_camel_case_without_end_date() {
        let state = StudentState {
            student_id: "A1".to_string(),
            measures: vec![MeasureInstance {
                id: "M1".to_string(),
                name: "Medida 1".to_string(),
                active: true,
                started_at: "2025-01-01T00:00:00Z".parse().unwrap(),
                ended_at: None,
                comments: vec![],
            }],
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["studentId"], "A1");
        assert_eq!(json["measures"][0]["startedAt"], "2025-01-01T00:00:00Z");
        assert!(json["measures"][0].get("endedAt").is_none());
    }

    #[test]
    fn test_state_for_missing_student_is_empty() {
        let shared = SharedState::new();
        let state = state_for(&shared, "A7");
        assert_eq!(state.student_id, "A7");
        assert!(state.measures.is_empty());
    }
}
