//! HTTP boundary for the vault.
//!
//! ```text
//! POST   /generate          create a script link
//! GET    /script.lua?id=    gated raw read (identity from User-Agent)
//! POST   /my-scripts        list the caller's scripts
//! PUT    /my-scripts/:id    update a script
//! DELETE /my-scripts/:id    delete a script
//! GET    /stats             script count
//! GET    /healthz           liveness
//! ```

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderMap};
use axum::routing::{get, post, put};
use axum::Router;

use crate::vault::{ScriptId, Vault};

pub mod error;
pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    /// Overrides the `Host`-derived base of generated links.
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(vault: Arc<Vault>, public_base_url: Option<String>) -> Self {
        Self {
            vault,
            public_base_url,
        }
    }

    /// Base URL for links handed back to the caller of this request.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(base) = &self.public_base_url {
            return base.clone();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}")
    }
}

/// Lua one-liner that fetches and runs the script behind `id`.
pub fn loadstring(base_url: &str, id: &ScriptId) -> String {
    format!("loadstring(game:HttpGet(\"{base_url}/script.lua?id={id}\"))()")
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/script.lua", get(handlers::raw_script))
        .route("/my-scripts", post(handlers::list_scripts))
        .route(
            "/my-scripts/:id",
            put(handlers::update_script).delete(handlers::delete_script),
        )
        .route("/stats", get(handlers::stats))
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}
