//! HTTP API: routing and the handlers assembled under it.

pub mod admin;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod ready;

use axum::http::header;
use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::Controller;

/// Assemble the full router. No CORS layer: every caller here is either the
/// in-guest agent reaching back over the bridge, or an operator on the host
/// itself, never a browser.
pub fn create_router(controller: Controller) -> Router {
    let request_id_header = header::HeaderName::from_static("x-request-id");
    let set_request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid);
    let propagate_request_id = PropagateRequestIdLayer::new(request_id_header);

    Router::new()
        .route("/function/:name", get(dispatch::handle).post(dispatch::handle))
        .route("/ready", get(ready::handle).post(ready::handle))
        .route("/system/functions", get(observability::list_functions))
        .route(
            "/system/functions/:name",
            get(observability::get_function),
        )
        .route("/stats", get(observability::stats))
        .route("/preBoot/:name", post(admin::pre_boot))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(controller)
}
