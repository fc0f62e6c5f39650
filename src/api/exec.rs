//! Remote read/write endpoint.
//!
//! GET answers plain JSON, or JSONP when a `callback` is given. POST takes one form-encoded
//! write action and answers with the student's resulting state.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::{json, Value};

use super::{success, ApiResult};
use crate::auth::authorize;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::gateway::is_valid_callback;
use crate::models::{fields, Action, StudentState};
use crate::AppState;

/// Query parameters accepted by the read endpoint.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ReadQuery {
    pub action: Option<String>,
    pub key: Option<String>,
    pub callback: Option<String>,
}

/// GET /exec - catalog (default, `init`, `catalogo`) or shared state (`estado`).
pub async fn read_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReadQuery>,
) -> Result<Response, AppErrorWithRevision> {
    authorize(
        state.config.api_key.as_deref(),
        &headers,
        query.key.as_deref(),
    )?;

    if let Some(callback) = &query.callback {
        if !is_valid_callback(callback) {
            return Err(AppError::BadRequest(format!("Invalid callback name: {}", callback)).into());
        }
    }

    let body: Value = match query.action.as_deref().unwrap_or("init") {
        "" | "init" | "catalogo" => serde_json::to_value(state.repo.get_catalog().await?)
            .map_err(AppError::from)?,
        "estado" => json!({ "estado": state.repo.get_shared_state().await? }),
        other => {
            return Err(AppError::BadRequest(format!("Unknown read action: {}", other)).into());
        }
    };

    Ok(match query.callback {
        Some(callback) => jsonp_response(&callback, &body),
        None => Json(body).into_response(),
    })
}

/// POST /exec - apply one write action.
pub async fn write_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> ApiResult<StudentState> {
    authorize(
        state.config.api_key.as_deref(),
        &headers,
        form.get(fields::KEY).map(String::as_str),
    )?;

    let action = Action::from_form(&form)?;
    let (student_state, revision_id) = state.repo.apply_action(&action).await?;

    success(student_state, revision_id)
}

fn jsonp_response(callback: &str, body: &Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        format!("{}({});", callback, body),
    )
        .into_response()
}
