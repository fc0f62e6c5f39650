//! Printable HTML report endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::auth::authorize;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::models::StudentState;
use crate::report::{default_format_date, ReportDocument, ReportOptions};
use crate::AppState;

#[derive(Debug, Default, serde::Deserialize)]
pub struct ReportQuery {
    pub key: Option<String>,
    /// Any non-empty value other than `0`/`false` serves the page for in-browser printing.
    pub inline: Option<String>,
}

impl ReportQuery {
    fn is_inline(&self) -> bool {
        matches!(self.inline.as_deref(), Some(v) if !v.is_empty() && v != "0" && v != "false")
    }
}

/// GET /reports/students/{student_id}
pub async fn student_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(student_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppErrorWithRevision> {
    authorize(
        state.config.api_key.as_deref(),
        &headers,
        query.key.as_deref(),
    )?;

    let catalog = state.repo.get_catalog().await?;
    let (class, student) = catalog
        .class_of(&student_id)
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;
    let student_state = state
        .repo
        .get_student_state(&student_id)
        .await?
        .unwrap_or_else(|| StudentState::empty(student_id.as_str()));

    let opts = ReportOptions {
        format_date: &default_format_date,
        generated_at: Utc::now(),
    };
    let doc = ReportDocument::for_student(&class.name, &student.name, &student_state, &opts);

    Ok(html_response(doc, query.is_inline()))
}

/// GET /reports/classes/{class_id}
pub async fn class_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(class_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppErrorWithRevision> {
    authorize(
        state.config.api_key.as_deref(),
        &headers,
        query.key.as_deref(),
    )?;

    let catalog = state.repo.get_catalog().await?;
    let class = catalog
        .class(&class_id)
        .ok_or_else(|| AppError::NotFound(format!("Class {} not found", class_id)))?;
    let shared = state.repo.get_shared_state().await?;

    let opts = ReportOptions {
        format_date: &default_format_date,
        generated_at: Utc::now(),
    };
    let doc = ReportDocument::for_class(&class.name, &class.students, &shared, &opts);

    Ok(html_response(doc, query.is_inline()))
}

fn html_response(doc: ReportDocument, inline: bool) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        doc.html,
    )
        .into_response();

    if !inline {
        if let Ok(value) = HeaderValue::from_str(&content_disposition(&doc.filename)) {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8 name (RFC 5987).
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        percent_encode(filename)
    )
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_non_ascii() {
        assert_eq!(
            content_disposition("informe-clase-1ºA.html"),
            "attachment; filename=\"informe-clase-1_A.html\"; filename*=UTF-8''informe-clase-1%C2%BAA.html"
        );
    }

    #[test]
    fn test_inline_flag() {
        let query = |v: Option<&str>| ReportQuery {
            key: None,
            inline: v.map(str::to_string),
        };
        assert!(query(Some("1")).is_inline());
        assert!(query(Some("true")).is_inline());
        assert!(!query(Some("0")).is_inline());
        assert!(!query(Some("")).is_inline());
        assert!(!query(None).is_inline());
    }
}
