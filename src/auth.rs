use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Project;
use crate::state::AppState;
use crate::store::Store;

// caller behind an `Authorization: Bearer <token>` session
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        match state.store.session_user(token).await? {
            Some(id) => Ok(AuthUser { id }),
            None => Err(AppError::Unauthorized),
        }
    }
}

// Same error whether the project is missing or owned by someone else
pub async fn owned_project(store: &dyn Store, user: AuthUser, project_id: Uuid) -> Result<Project, AppError> {
    match store.get_project(project_id).await? {
        Some(project) if project.owner_id == user.id => Ok(project),
        _ => {
            tracing::debug!(%project_id, user = %user.id, "project access refused");
            Err(AppError::Forbidden)
        }
    }
}
