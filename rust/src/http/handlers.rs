use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::error::{ApiError, Operation};
use super::{loadstring, AppState};
use crate::vault::record::timestamp;
use crate::vault::{InvalidField, ScriptId, Vault, VaultError};

const LINK_NOT_FOUND: &str = "Invalid or expired link!";
const GATE_CLOSED: &str = "Access denied: This endpoint is for Roblox execution only.";

/// Body of `/generate` and `PUT /my-scripts/:id`. Fields stay loosely typed so a
/// wrong type is reported like a missing field.
#[derive(Debug, Default, Deserialize)]
pub struct ScriptBody {
    #[serde(default)]
    script: Option<Value>,
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
}

/// Body of `POST /my-scripts` and `DELETE /my-scripts/:id`.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerBody {
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptQuery {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub loadstring: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ListedScript {
    pub id: String,
    pub script: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub loadstring: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn text_field(value: &Option<Value>) -> &str {
    value.as_ref().and_then(Value::as_str).unwrap_or_default()
}

/// Runs a vault call on the blocking pool; snapshot writes are synchronous file I/O.
async fn with_vault<T, F>(state: &AppState, op: F) -> Result<T, VaultError>
where
    F: FnOnce(&Vault) -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    let vault = state.vault.clone();
    tokio::task::spawn_blocking(move || op(&vault))
        .await
        .map_err(|e| VaultError::Internal(format!("vault task failed: {e}")))?
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ScriptBody>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(body) = payload.map_err(ApiError::from_rejection)?;
    let script = text_field(&body.script).to_string();
    let user_id = text_field(&body.user_id).to_string();
    let base = state.base_url(&headers);

    match with_vault(&state, move |vault| vault.create(&script, &user_id)).await {
        Ok(id) => Ok(Json(GenerateResponse {
            loadstring: loadstring(&base, &id),
            id: id.to_string(),
        })),
        Err(VaultError::DuplicateScript {
            existing: Some(existing),
        }) => {
            let link = loadstring(&base, &existing);
            Err(ApiError::from_vault(
                Operation::Generate,
                VaultError::DuplicateScript {
                    existing: Some(existing),
                },
            )
            .with_loadstring(link))
        }
        Err(err) => Err(ApiError::from_vault(Operation::Generate, err)),
    }
}

pub async fn raw_script(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ScriptQuery>, QueryRejection>,
) -> Response {
    // A query string that does not decode names no script.
    let id = query.ok().and_then(|Query(query)| query.id);
    let Some(id) = id.filter(|id| !id.is_empty()).map(ScriptId::new) else {
        return (StatusCode::NOT_FOUND, LINK_NOT_FOUND).into_response();
    };
    let identity = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match with_vault(&state, move |vault| vault.gated_read(&id, &identity)).await {
        Ok(content) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(VaultError::NotFound) => (StatusCode::NOT_FOUND, LINK_NOT_FOUND).into_response(),
        Err(VaultError::AccessDenied) => (StatusCode::FORBIDDEN, GATE_CLOSED).into_response(),
        Err(err) => {
            error!(error = %err, "raw script read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error.").into_response()
        }
    }
}

pub async fn list_scripts(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<OwnerBody>, JsonRejection>,
) -> Result<Json<Vec<ListedScript>>, ApiError> {
    let Json(body) = payload.map_err(ApiError::from_rejection)?;
    let user_id = text_field(&body.user_id).to_string();
    if user_id.is_empty() {
        return Err(ApiError::invalid(InvalidField::UserId));
    }
    let base = state.base_url(&headers);

    let records = with_vault(&state, move |vault| vault.list_by_owner(&user_id))
        .await
        .map_err(|err| ApiError::from_vault(Operation::List, err))?;

    Ok(Json(
        records
            .into_iter()
            .map(|record| ListedScript {
                loadstring: loadstring(&base, &record.id),
                id: record.id.to_string(),
                script: record.content,
                created_at: timestamp::format(&record.created_at),
            })
            .collect(),
    ))
}

pub async fn update_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ScriptBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = payload.map_err(ApiError::from_rejection)?;
    let script = text_field(&body.script).to_string();
    let user_id = text_field(&body.user_id).to_string();
    let id = ScriptId::new(id);

    with_vault(&state, move |vault| vault.update(&id, &script, &user_id))
        .await
        .map_err(|err| ApiError::from_vault(Operation::Update, err))?;

    Ok(Json(MessageResponse {
        message: "Script updated successfully.",
    }))
}

pub async fn delete_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<OwnerBody>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = payload.map_err(ApiError::from_rejection)?;
    let user_id = text_field(&body.user_id).to_string();
    let id = ScriptId::new(id);

    with_vault(&state, move |vault| vault.delete(&id, &user_id))
        .await
        .map_err(|err| ApiError::from_vault(Operation::Delete, err))?;

    Ok(Json(MessageResponse {
        message: "Script deleted successfully.",
    }))
}

pub async fn stats(State(state): State<AppState>) -> Response {
    match with_vault(&state, |vault| vault.len()).await {
        Ok(count) => Json(serde_json::json!({ "scriptCount": count })).into_response(),
        Err(err) => {
            error!(error = %err, "stats read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
