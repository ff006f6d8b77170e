use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn metrics_handler() -> Response {
    match crate::metrics::gather() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error gathering metrics: {e}")).into_response()
        }
    }
}
