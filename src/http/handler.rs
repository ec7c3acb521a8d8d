//! Request dispatch against the current site snapshot.
//!
//! Every inbound request resolves in three steps:
//! 1. exact lookup in the snapshot's route table (assets and templates),
//! 2. Git passthrough prefix match (delegated to [`super::git_http`]),
//! 3. otherwise 404.
//!
//! The snapshot is read once per request; a rebuild swapping in a new
//! snapshot mid-request never mixes old routes with new templates.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, error, instrument};

use crate::content::site::{Route, SiteSnapshot};
use crate::AppState;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`].  All paths go through the fallback: the
/// route table is data in the snapshot, not axum routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[instrument(skip(state, req), fields(method = %req.method(), path = %req.uri().path()))]
async fn handle_request(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let snapshot = state.site.load_full();
    let path = req.uri().path().to_owned();

    if let Some(route) = snapshot.route(&path) {
        return match route {
            Route::Asset { body, content_type } => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.clone())],
                body.clone(),
            )
                .into_response(),
            Route::Template { name } => render_template(&snapshot, name),
        };
    }

    if let Some(passthrough) = snapshot.passthrough_for(&path) {
        return super::git_http::dispatch(passthrough, req).await;
    }

    debug!("no route matched");
    StatusCode::NOT_FOUND.into_response()
}

/// Execute a template against the snapshot it was compiled into.  Output is
/// rendered per request; there is no cache of rendered pages.
fn render_template(snapshot: &SiteSnapshot, name: &str) -> Response {
    match snapshot.render(name) {
        Ok(html) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
            html,
        )
            .into_response(),
        Err(e) => {
            error!(template = %name, error = %e, "template execution failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
