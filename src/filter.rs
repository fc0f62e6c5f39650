//! Case-insensitive substring search over the catalog and rosters.

use crate::models::{MeasureDefinition, Student};

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Measures whose name or description contains the query. An empty query keeps everything.
pub fn filter_measures<'a>(
    catalog: &'a [MeasureDefinition],
    query: &str,
) -> Vec<&'a MeasureDefinition> {
    let needle = normalize(query);
    if needle.is_empty() {
        return catalog.iter().collect();
    }
    catalog
        .iter()
        .filter(|m| {
            m.name.to_lowercase().contains(&needle)
                || m
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Students whose name contains the query.
pub fn filter_students<'a>(roster: &'a [Student], query: &str) -> Vec<&'a Student> {
    let needle = normalize(query);
    roster
        .iter()
        .filter(|s| needle.is_empty() || s.name.to_lowercase().contains(&needle))
        .collect()
}
