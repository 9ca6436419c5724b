//! JSON error bodies and the mapping from vault errors to HTTP statuses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::vault::{InvalidField, VaultError};

/// Endpoint an error came from; picks the wording of server errors.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    Generate,
    List,
    Update,
    Delete,
}

impl Operation {
    fn server_error_message(self) -> &'static str {
        match self {
            Operation::Generate => "Server error while generating link.",
            Operation::List => "Server error while fetching scripts.",
            Operation::Update => "Server error while updating script.",
            Operation::Delete => "Server error while deleting script.",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loadstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: message.into(),
                loadstring: None,
                id: None,
            },
        }
    }

    pub fn invalid(field: InvalidField) -> Self {
        let message = match field {
            InvalidField::Script => "Invalid or missing script.",
            InvalidField::UserId => "Invalid or missing user ID.",
        };
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn from_vault(op: Operation, err: VaultError) -> Self {
        match err {
            VaultError::InvalidInput(field) => Self::invalid(field),
            VaultError::DuplicateScript { existing } => {
                let message = if existing.is_some() {
                    "This script is already protected!"
                } else {
                    "This script is already protected by you!"
                };
                let mut api = Self::new(StatusCode::BAD_REQUEST, message);
                api.body.id = existing.map(|id| id.to_string());
                api
            }
            VaultError::NotFound => Self::new(StatusCode::NOT_FOUND, "Script not found."),
            VaultError::Forbidden => Self::new(StatusCode::FORBIDDEN, "Unauthorized access."),
            VaultError::AccessDenied => Self::new(StatusCode::FORBIDDEN, "Access denied."),
            err @ (VaultError::Persist(_) | VaultError::Internal(_)) => {
                error!(operation = ?op, error = %err, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, op.server_error_message())
            }
        }
    }

    pub fn from_rejection(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large.")
            }
            _ => Self::new(StatusCode::BAD_REQUEST, "Invalid request body."),
        }
    }

    pub fn with_loadstring(mut self, loadstring: String) -> Self {
        self.body.loadstring = Some(loadstring);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
