//! Reference data loaded from the remote source: classes, rosters and the measure catalog.

use serde::{Deserialize, Serialize};

/// A student on a class roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    #[serde(alias = "nombre")]
    pub name: String,
}

/// A class and its ordered roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassGroup {
    pub id: String,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "alumnos")]
    pub students: Vec<Student>,
}

impl ClassGroup {
    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }
}

/// An entry of the measure catalog shared by every class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureDefinition {
    pub id: String,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(
        default,
        alias = "descripcion",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

/// The validated `{classes, measures}` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, alias = "clases")]
    pub classes: Vec<ClassGroup>,
    #[serde(default, alias = "medidas")]
    pub measures: Vec<MeasureDefinition>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.measures.is_empty()
    }

    pub fn class(&self, class_id: &str) -> Option<&ClassGroup> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    /// First class whose roster contains the student.
    pub fn class_of(&self, student_id: &str) -> Option<(&ClassGroup, &Student)> {
        self.classes
            .iter()
            .find_map(|c| c.student(student_id).map(|s| (c, s)))
    }
}

/// The `{id, name}` pair carried by an activation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

impl<'a> From<&'a MeasureDefinition> for MeasureRef<'a> {
    fn from(def: &'a MeasureDefinition) -> Self {
        Self {
            id: &def.id,
            name: &def.name,
        }
    }
}
