use axum::{
    Json,
    extract::State,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::indexnow::{IndexNow, IssuedKey};
use crate::models::{Project, SubmissionLog};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub project_id: Uuid,
}

pub async fn issue_key_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<ProjectRef>,
) -> Result<Json<IssuedKey>, AppError> {
    let issued = IndexNow::new(&state).issue_key(user, body.project_id).await?;
    Ok(Json(issued))
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<ProjectRef>,
) -> Result<Json<Project>, AppError> {
    let project = IndexNow::new(&state).verify(user, body.project_id).await?;
    Ok(Json(project))
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(body): ApiJson<ProjectRef>,
) -> Result<Json<SubmissionLog>, AppError> {
    let log = IndexNow::new(&state)
        .submit(user, body.project_id, Utc::now())
        .await?;
    Ok(Json(log))
}

pub async fn logs_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ProjectRef>,
) -> Result<Json<Vec<SubmissionLog>>, AppError> {
    let logs = IndexNow::new(&state).logs(user, query.project_id).await?;
    Ok(Json(logs))
}
