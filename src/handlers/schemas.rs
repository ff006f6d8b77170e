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
use crate::editor::{NewSchema, SchemaEditor, SchemaUpdate};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::models::MarkupRecord;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSchemas {
    pub schemas: Vec<NewSchema>,
}

#[derive(Debug, Deserialize)]
pub struct Toggle {
    pub enabled: bool,
}

pub async fn list_schemas_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(project_id): ApiPath<Uuid>,
) -> Result<Json<Vec<MarkupRecord>>, AppError> {
    let records = SchemaEditor::new(&state).list(user, project_id).await?;
    Ok(Json(records))
}

pub async fn create_schemas_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(project_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<CreateSchemas>,
) -> Result<(StatusCode, Json<Vec<MarkupRecord>>), AppError> {
    let records = SchemaEditor::new(&state)
        .create(user, project_id, body.schemas, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(records)))
}

pub async fn update_schema_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((project_id, schema_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<SchemaUpdate>,
) -> Result<Json<MarkupRecord>, AppError> {
    let record = SchemaEditor::new(&state)
        .update(user, project_id, schema_id, body, Utc::now())
        .await?;
    Ok(Json(record))
}

pub async fn toggle_schema_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((project_id, schema_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<Toggle>,
) -> Result<Json<MarkupRecord>, AppError> {
    let record = SchemaEditor::new(&state)
        .toggle(user, project_id, schema_id, body.enabled, Utc::now())
        .await?;
    Ok(Json(record))
}

pub async fn delete_schema_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((project_id, schema_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    SchemaEditor::new(&state)
        .delete(user, project_id, schema_id, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
