// Create and update run under the project's edit lock: quota check, write and
// edit record happen as one unit per process. Across processes the quota is
// still soft. Toggle and delete never consult it.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{AuthUser, owned_project};
use crate::error::AppError;
use crate::markup::MarkupPayload;
use crate::models::{EditAction, MarkupRecord, Page, Project};
use crate::quota::{month_start, next_month_start};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub payload: Value,
    #[serde(default)]
    pub page_path: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaUpdate {
    #[serde(rename = "type", default)]
    pub schema_type: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub page_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

pub struct SchemaEditor<'a> {
    state: &'a AppState,
}

impl<'a> SchemaEditor<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn create_project(&self, user: AuthUser, domain: &str) -> Result<Project, AppError> {
        let project = Project::new(user.id, normalize_domain(domain)?);
        self.state.store.insert_project(project.clone()).await?;
        tracing::info!(project_id = %project.id, domain = %project.domain, "project created");
        Ok(project)
    }

    pub async fn list(&self, user: AuthUser, project_id: Uuid) -> Result<Vec<MarkupRecord>, AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;
        Ok(self.state.store.list_records(project_id).await?)
    }

    pub async fn quota_status(
        &self,
        user: AuthUser,
        project_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;
        let local = now.with_timezone(&Local);
        let usage = self.state.quota.usage(project_id, month_start(&local)).await?;
        Ok(QuotaStatus {
            used: usage.used,
            limit: usage.limit,
            remaining: usage.remaining(),
            resets_at: next_month_start(&local),
        })
    }

    // every section in one submission consumes one edit
    pub async fn create(
        &self,
        user: AuthUser,
        project_id: Uuid,
        schemas: Vec<NewSchema>,
        now: DateTime<Utc>,
    ) -> Result<Vec<MarkupRecord>, AppError> {
        if schemas.is_empty() {
            return Err(AppError::validation("schemas", "at least one schema is required"));
        }

        let mut records = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let payload = MarkupPayload::parse(&schema.schema_type, schema.payload)?;
            records.push(MarkupRecord {
                id: Uuid::new_v4(),
                project_id,
                page_path: normalize_path(schema.page_path)?,
                payload,
                enabled: schema.enabled,
                created_at: now,
                updated_at: now,
            });
        }

        owned_project(self.state.store.as_ref(), user, project_id).await?;

        let lock = self.state.edit_lock(project_id);
        let _guard = lock.lock().await;

        let start = month_start(&now.with_timezone(&Local));
        self.state
            .quota
            .ensure_available(project_id, records.len() as u32, start)
            .await?;

        self.ensure_pages(project_id, &records).await?;
        self.state.store.insert_records(&records).await?;
        self.state.cache.invalidate_project(project_id);

        if let Err(e) = self
            .state
            .quota
            .record_edits(project_id, user.id, EditAction::Create, records.len(), now)
            .await
        {
            // an unrecorded edit would be free; take the records back out
            tracing::error!(%project_id, count = records.len(), "failed to record edits, rolling back create: {e}");
            for record in &records {
                if let Err(undo) = self.state.store.delete_record(project_id, record.id).await {
                    tracing::error!(%project_id, record_id = %record.id, "rollback failed: {undo}");
                }
            }
            self.state.cache.invalidate_project(project_id);
            return Err(e);
        }

        tracing::info!(%project_id, count = records.len(), "markup records created");
        Ok(records)
    }

    pub async fn update(
        &self,
        user: AuthUser,
        project_id: Uuid,
        schema_id: Uuid,
        update: SchemaUpdate,
        now: DateTime<Utc>,
    ) -> Result<MarkupRecord, AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;

        let lock = self.state.edit_lock(project_id);
        let _guard = lock.lock().await;

        let previous = self
            .state
            .store
            .get_record(project_id, schema_id)
            .await?
            .ok_or(AppError::NotFound("schema"))?;
        let mut record = previous.clone();

        let schema_type = update
            .schema_type
            .unwrap_or_else(|| record.schema_type().to_string());
        record.payload = MarkupPayload::parse(&schema_type, update.payload)?;
        if update.page_path.is_some() {
            record.page_path = normalize_path(update.page_path)?;
        }
        record.updated_at = now;

        let start = month_start(&now.with_timezone(&Local));
        self.state.quota.ensure_available(project_id, 1, start).await?;

        self.ensure_pages(project_id, std::slice::from_ref(&record)).await?;
        self.state.store.update_record(&record).await?;
        self.state.cache.invalidate_project(project_id);

        if let Err(e) = self
            .state
            .quota
            .record_edit(project_id, user.id, EditAction::Update, now)
            .await
        {
            tracing::error!(%project_id, %schema_id, "failed to record edit, restoring previous payload: {e}");
            if let Err(undo) = self.state.store.update_record(&previous).await {
                tracing::error!(%project_id, %schema_id, "rollback failed: {undo}");
            }
            self.state.cache.invalidate_project(project_id);
            return Err(e);
        }

        tracing::info!(%project_id, %schema_id, "markup record updated");
        Ok(record)
    }

    pub async fn toggle(
        &self,
        user: AuthUser,
        project_id: Uuid,
        schema_id: Uuid,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<MarkupRecord, AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;

        let mut record = self
            .state
            .store
            .get_record(project_id, schema_id)
            .await?
            .ok_or(AppError::NotFound("schema"))?;

        record.enabled = enabled;
        record.updated_at = now;
        self.state.store.update_record(&record).await?;
        self.state.cache.invalidate_project(project_id);
        self.log_exempt(project_id, user.id, EditAction::Toggle, now).await;

        tracing::info!(%project_id, %schema_id, enabled, "markup record toggled");
        Ok(record)
    }

    pub async fn delete(
        &self,
        user: AuthUser,
        project_id: Uuid,
        schema_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;

        if !self.state.store.delete_record(project_id, schema_id).await? {
            return Err(AppError::NotFound("schema"));
        }
        self.state.cache.invalidate_project(project_id);
        self.log_exempt(project_id, user.id, EditAction::Delete, now).await;

        tracing::info!(%project_id, %schema_id, "markup record deleted");
        Ok(())
    }

    // history only; a failure here must not undo a toggle or delete
    async fn log_exempt(&self, project_id: Uuid, actor_id: Uuid, action: EditAction, now: DateTime<Utc>) {
        if let Err(e) = self.state.quota.record_edit(project_id, actor_id, action, now).await {
            tracing::warn!(%project_id, ?action, "failed to record edit history: {e}");
        }
    }

    async fn ensure_pages(&self, project_id: Uuid, records: &[MarkupRecord]) -> Result<(), AppError> {
        let mut known: Vec<String> = self
            .state
            .store
            .list_pages(project_id)
            .await?
            .into_iter()
            .map(|p| p.path)
            .collect();

        for path in records.iter().filter_map(|r| r.page_path.as_ref()) {
            if known.contains(path) {
                continue;
            }
            self.state
                .store
                .insert_page(Page {
                    id: Uuid::new_v4(),
                    project_id,
                    path: path.clone(),
                })
                .await?;
            known.push(path.clone());
        }
        Ok(())
    }
}

fn normalize_path(path: Option<String>) -> Result<Option<String>, AppError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let path = path.trim();
    if path.is_empty() {
        return Ok(None);
    }
    if !path.starts_with('/') || path.chars().any(char::is_whitespace) {
        return Err(AppError::validation("pagePath", "must be an absolute path like /menu"));
    }
    Ok(Some(path.to_string()))
}

pub fn normalize_domain(input: &str) -> Result<String, AppError> {
    let domain = input.trim();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain)
        .trim_end_matches('/')
        .to_ascii_lowercase();

    let valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if !valid {
        return Err(AppError::validation("domain", "must be a bare host name like example.com"));
    }
    Ok(domain)
}
