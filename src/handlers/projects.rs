use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::editor::{QuotaStatus, SchemaEditor};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::models::Project;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub domain: String,
}

pub async fn create_project_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<NewProject>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = SchemaEditor::new(&state).create_project(user, &body.domain).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn quota_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<QuotaStatus>, AppError> {
    let status = SchemaEditor::new(&state)
        .quota_status(user, project_id, Utc::now())
        .await?;
    Ok(Json(status))
}
