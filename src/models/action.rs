//! Write actions mirrored to the remote endpoint as form fields.

use std::collections::HashMap;

use crate::errors::AppError;

use super::StudentState;

/// Form field names understood by the remote endpoint.
pub mod fields {
    pub const ACTION: &str = "action";
    pub const STUDENT_ID: &str = "alumno_id";
    pub const MEASURE_ID: &str = "medida_id";
    pub const MEASURE_NAME: &str = "medida_nombre";
    pub const TEXT: &str = "texto";
    pub const STATE_JSON: &str = "estado_json";
    pub const KEY: &str = "key";
}

/// A single mutation of one student's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Activate {
        student_id: String,
        measure_id: String,
        measure_name: String,
    },
    Toggle {
        student_id: String,
        measure_id: String,
    },
    Remove {
        student_id: String,
        measure_id: String,
    },
    Comment {
        student_id: String,
        measure_id: String,
        text: String,
    },
    /// Replace the student's whole state.
    Save {
        student_id: String,
        state: StudentState,
    },
}

impl Action {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Activate { .. } => "activar",
            Action::Toggle { .. } => "toggle",
            Action::Remove { .. } => "remove",
            Action::Comment { .. } => "comentar",
            Action::Save { .. } => "save",
        }
    }

    pub fn student_id(&self) -> &str {
        match self {
            Action::Activate { student_id, .. }
            | Action::Toggle { student_id, .. }
            | Action::Remove { student_id, .. }
            | Action::Comment { student_id, .. }
            | Action::Save { student_id, .. } => student_id,
        }
    }

    /// Flatten into form fields (without the API key).
    pub fn to_form(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut form = vec![
            (fields::ACTION, self.name().to_string()),
            (fields::STUDENT_ID, self.student_id().to_string()),
        ];
        match self {
            Action::Activate {
                measure_id,
                measure_name,
                ..
            } => {
                form.push((fields::MEASURE_ID, measure_id.clone()));
                form.push((fields::MEASURE_NAME, measure_name.clone()));
            }
            Action::Toggle { measure_id, .. } | Action::Remove { measure_id, .. } => {
                form.push((fields::MEASURE_ID, measure_id.clone()));
            }
            Action::Comment {
                measure_id, text, ..
            } => {
                form.push((fields::MEASURE_ID, measure_id.clone()));
                form.push((fields::TEXT, text.clone()));
            }
            Action::Save { state, .. } => {
                form.push((fields::STATE_JSON, serde_json::to_string(state)?));
            }
        }
        Ok(form)
    }

    /// Rebuild an action from submitted form fields.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, AppError> {
        let action = required(form, fields::ACTION)?;
        let student_id = required(form, fields::STUDENT_ID)?;

        match action.as_str() {
            "activar" => {
                let measure_id = required(form, fields::MEASURE_ID)?;
                let measure_name = form
                    .get(fields::MEASURE_NAME)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| measure_id.clone());
                Ok(Action::Activate {
                    student_id,
                    measure_id,
                    measure_name,
                })
            }
            "toggle" => Ok(Action::Toggle {
                student_id,
                measure_id: required(form, fields::MEASURE_ID)?,
            }),
            "remove" => Ok(Action::Remove {
                student_id,
                measure_id: required(form, fields::MEASURE_ID)?,
            }),
            "comentar" => Ok(Action::Comment {
                student_id,
                measure_id: required(form, fields::MEASURE_ID)?,
                // Trimming and the empty check belong to the transition.
                text: form.get(fields::TEXT).cloned().unwrap_or_default(),
            }),
            "save" => {
                let raw = required(form, fields::STATE_JSON)?;
                let mut state: StudentState = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Validation(format!("Invalid {}: {}", fields::STATE_JSON, e))
                })?;
                state.student_id = student_id.clone();
                Ok(Action::Save { student_id, state })
            }
            other => Err(AppError::Validation(format!("Unknown action '{}'", other))),
        }
    }
}

fn required(form: &HashMap<String, String>, field: &str) -> Result<String, AppError> {
    form.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("Field '{}' is required", field)))
}
