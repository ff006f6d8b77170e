pub mod auth;
pub mod cache;
pub mod config;
pub mod editor;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod indexnow;
pub mod markup;
pub mod metrics;
pub mod models;
pub mod quota;
pub mod rate_limit;
pub mod state;
pub mod store;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_project_handler, create_schemas_handler, delete_schema_handler, health_handler,
    issue_key_handler, list_schemas_handler, logs_handler, metrics_handler, public_rate_limit,
    quota_handler, schema_html_handler, schema_json_handler, submit_handler, toggle_schema_handler,
    update_schema_handler, verify_handler,
};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    // embeds run on arbitrary customer origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    let public = Router::new()
        .route("/schema", get(schema_json_handler))
        .route("/schema-html", get(schema_html_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), public_rate_limit))
        .layer(cors);

    let admin = Router::new()
        .route("/projects", post(create_project_handler))
        .route("/projects/{id}/quota", get(quota_handler))
        .route(
            "/projects/{id}/schemas",
            get(list_schemas_handler).post(create_schemas_handler),
        )
        .route(
            "/projects/{id}/schemas/{schema_id}",
            put(update_schema_handler).delete(delete_schema_handler),
        )
        .route("/projects/{id}/schemas/{schema_id}/toggle", post(toggle_schema_handler))
        .route("/indexnow", post(submit_handler))
        .route("/indexnow/key", post(issue_key_handler))
        .route("/indexnow/verify", post(verify_handler))
        .route("/indexnow/logs", get(logs_handler));

    Router::new()
        .merge(public)
        .merge(admin)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
