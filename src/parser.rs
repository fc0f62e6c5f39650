//! Strict validation of catalog payloads coming from the network or pasted by hand.
//!
//! The top-level shape is a hard requirement: `classes` and `measures` must both be arrays.
//! Individual entries are lenient: anything without a usable `id` and `name` is dropped
//! silently and the surviving entries keep their input order. An object or array in `id` or
//! `name` counts as empty, so such entries are dropped rather than stringified.

use serde_json::{Map, Value};

use crate::models::{Catalog, ClassGroup, MeasureDefinition, Student};

const CLASSES: &[&str] = &["classes", "clases"];
const MEASURES: &[&str] = &["measures", "medidas"];
const STUDENTS: &[&str] = &["students", "alumnos"];
const NAME: &[&str] = &["name", "nombre"];
const DESCRIPTION: &[&str] = &["description", "descripcion"];

/// The payload cannot be used as a catalog at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedDataError {
    /// Not an object with array-typed `classes` and `measures`.
    MissingArrays,
    /// The text is not JSON.
    InvalidJson(String),
}

impl std::fmt::Display for MalformedDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedDataError::MissingArrays => {
                write!(f, "payload must be an object with `classes: []` and `measures: []`")
            }
            MalformedDataError::InvalidJson(err) => write!(f, "pasted JSON is invalid: {}", err),
        }
    }
}

impl std::error::Error for MalformedDataError {}

/// Validate and normalize a raw JSON value into a [`Catalog`].
pub fn parse_catalog(raw: &Value) -> Result<Catalog, MalformedDataError> {
    let obj = raw.as_object().ok_or(MalformedDataError::MissingArrays)?;
    let classes = array_field(obj, CLASSES).ok_or(MalformedDataError::MissingArrays)?;
    let measures = array_field(obj, MEASURES).ok_or(MalformedDataError::MissingArrays)?;

    Ok(Catalog {
        classes: classes.iter().filter_map(parse_class).collect(),
        measures: measures.iter().filter_map(parse_measure).collect(),
    })
}

/// Parse JSON text (the manual paste path) and validate it.
pub fn parse_catalog_str(text: &str) -> Result<Catalog, MalformedDataError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| MalformedDataError::InvalidJson(e.to_string()))?;
    parse_catalog(&raw)
}

fn parse_class(raw: &Value) -> Option<ClassGroup> {
    let (id, name) = id_and_name(raw)?;
    let students = raw
        .as_object()
        .and_then(|obj| array_field(obj, STUDENTS))
        .map(|list| list.iter().filter_map(parse_student).collect())
        .unwrap_or_default();
    Some(ClassGroup { id, name, students })
}

fn parse_student(raw: &Value) -> Option<Student> {
    let (id, name) = id_and_name(raw)?;
    Some(Student { id, name })
}

fn parse_measure(raw: &Value) -> Option<MeasureDefinition> {
    let (id, name) = id_and_name(raw)?;
    let description = raw
        .as_object()
        .and_then(|obj| field(obj, DESCRIPTION))
        .filter(|v| is_truthy(v))
        .map(stringify);
    Some(MeasureDefinition {
        id,
        name,
        description,
    })
}

fn id_and_name(raw: &Value) -> Option<(String, String)> {
    let obj = raw.as_object()?;
    let id = coerce_trimmed(obj.get("id"));
    let name = coerce_trimmed(field(obj, NAME));
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some((id, name))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn array_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Vec<Value>> {
    field(obj, names).and_then(Value::as_array)
}

/// Falsy values and containers become empty; scalars become their text.
fn coerce_trimmed(value: Option<&Value>) -> String {
    match value {
        Some(v) if is_truthy(v) && !v.is_object() && !v.is_array() => {
            stringify(v).trim().to_string()
        }
        _ => String::new(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_missing_arrays() {
        assert_eq!(
            parse_catalog(&json!({ "classes": [] })),
            Err(MalformedDataError::MissingArrays)
        );
        assert_eq!(
            parse_catalog(&json!({ "classes": {}, "measures": [] })),
            Err(MalformedDataError::MissingArrays)
        );
        assert_eq!(
            parse_catalog(&json!([1, 2, 3])),
            Err(MalformedDataError::MissingArrays)
        );
        assert_eq!(parse_catalog(&Value::Null), Err(MalformedDataError::MissingArrays));
    }

    #[test]
    fn test_drops_incomplete_entries_and_keeps_order() {
        let raw = json!({
            "classes": [
                { "id": "1A", "name": " 1ºA ", "students": [
                    { "id": "A1", "name": "Ana" },
                    { "id": "", "name": "Nadie" },
                    { "id": "A2" },
                    { "id": " A3 ", "name": "Carla" }
                ]},
                { "id": "  ", "name": "Sin id" },
                { "id": "2B", "name": "2ºB", "students": "not a list" },
                { "id": "3C", "name": "3ºC" }
            ],
            "measures": [
                { "id": "M1", "name": "Apoyo PT" },
                { "name": "Sin id" },
                { "id": "M2", "name": "Tutoria", "description": "extra" },
                { "id": "M3", "name": "Refuerzo", "description": "" }
            ]
        });
        let catalog = parse_catalog(&raw).unwrap();

        let ids: Vec<_> = catalog.classes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1A", "2B", "3C"]);
        assert_eq!(catalog.classes[0].name, "1ºA");
        let students: Vec<_> = catalog.classes[0]
            .students
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(students, vec!["A1", "A3"]);
        assert!(catalog.classes[1].students.is_empty());

        let measures: Vec<_> = catalog.measures.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(measures, vec!["M1", "M2", "M3"]);
        assert_eq!(catalog.measures[1].description.as_deref(), Some("extra"));
        assert_eq!(catalog.measures[2].description, None);
    }

    #[test]
    fn test_accepts_spanish_field_names() {
        let raw = json!({
            "clases": [{ "id": "1A", "nombre": "1ºA", "alumnos": [{ "id": "A1", "nombre": "Ana" }] }],
            "medidas": [{ "id": "M1", "nombre": "Medida 1", "descripcion": "Apoyo" }]
        });
        let catalog = parse_catalog(&raw).unwrap();
        assert_eq!(catalog.classes[0].students[0].name, "Ana");
        assert_eq!(catalog.measures[0].description.as_deref(), Some("Apoyo"));
    }

    #[test]
    fn test_coerces_scalar_ids() {
        let raw = json!({
            "classes": [{ "id": 12, "name": "Doce" }, { "id": 0, "name": "Cero" }],
            "measures": [{ "id": 7, "name": "Siete", "description": 3 }]
        });
        let catalog = parse_catalog(&raw).unwrap();
        assert_eq!(catalog.classes.len(), 1);
        assert_eq!(catalog.classes[0].id, "12");
        assert_eq!(catalog.measures[0].id, "7");
        assert_eq!(catalog.measures[0].description.as_deref(), Some("3"));
    }

    #[test]
    fn test_drops_object_and_array_fields() {
        let raw = json!({
            "classes": [
                { "id": { "n": 1 }, "name": "Objeto" },
                { "id": "1A", "name": ["1º", "A"] },
                { "id": "1B", "name": "1º B" }
            ],
            "measures": [{ "id": [7], "name": "Lista" }]
        });
        let catalog = parse_catalog(&raw).unwrap();
        assert_eq!(catalog.classes.len(), 1);
        assert_eq!(catalog.classes[0].id, "1B");
        assert!(catalog.measures.is_empty());
    }

    #[test]
    fn test_parse_str_reports_invalid_json() {
        assert!(matches!(
            parse_catalog_str("{ not json"),
            Err(MalformedDataError::InvalidJson(_))
        ));
        let catalog = parse_catalog_str(r#"{"classes":[],"measures":[]}"#).unwrap();
        assert!(catalog.is_empty());
    }
}
