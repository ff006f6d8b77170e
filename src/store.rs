// Store mirrors the select/insert/update/delete surface of the hosted
// datastore; MemoryStore is the in-process backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{EditAction, EditRecord, MarkupRecord, Page, Profile, Project, SubmissionLog};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} {1} not found")]
    Missing(&'static str, Uuid),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed data: {0}")]
    Seed(#[from] serde_json::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn session_user(&self, token: &str) -> Result<Option<Uuid>, StoreError>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn insert_project(&self, project: Project) -> Result<(), StoreError>;
    async fn update_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn list_pages(&self, project_id: Uuid) -> Result<Vec<Page>, StoreError>;
    async fn insert_page(&self, page: Page) -> Result<(), StoreError>;

    async fn list_records(&self, project_id: Uuid) -> Result<Vec<MarkupRecord>, StoreError>;
    async fn list_enabled_records(&self, project_id: Uuid) -> Result<Vec<MarkupRecord>, StoreError>;
    async fn get_record(&self, project_id: Uuid, id: Uuid) -> Result<Option<MarkupRecord>, StoreError>;
    async fn insert_records(&self, records: &[MarkupRecord]) -> Result<(), StoreError>;
    async fn update_record(&self, record: &MarkupRecord) -> Result<(), StoreError>;
    async fn delete_record(&self, project_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    async fn count_edits_since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        actions: &[EditAction],
    ) -> Result<u32, StoreError>;
    async fn insert_edits(&self, edits: &[EditRecord]) -> Result<(), StoreError>;

    async fn insert_submission_log(&self, log: SubmissionLog) -> Result<(), StoreError>;
    async fn list_submission_logs(&self, project_id: Uuid) -> Result<Vec<SubmissionLog>, StoreError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Seed {
    pub sessions: HashMap<String, Uuid>,
    pub profiles: Vec<Profile>,
    pub projects: Vec<Project>,
    pub pages: Vec<Page>,
    pub records: Vec<MarkupRecord>,
}

impl Seed {
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Uuid>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    pages: RwLock<Vec<Page>>,
    records: RwLock<HashMap<Uuid, MarkupRecord>>,
    edits: RwLock<Vec<EditRecord>>,
    submissions: RwLock<Vec<SubmissionLog>>,
    fail_writes: AtomicBool,
    fail_edits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        Self {
            sessions: RwLock::new(seed.sessions),
            profiles: RwLock::new(seed.profiles.into_iter().map(|p| (p.user_id, p)).collect()),
            projects: RwLock::new(seed.projects.into_iter().map(|p| (p.id, p)).collect()),
            pages: RwLock::new(seed.pages),
            records: RwLock::new(seed.records.into_iter().map(|r| (r.id, r)).collect()),
            ..Self::default()
        }
    }

    pub async fn add_session(&self, token: impl Into<String>, user_id: Uuid) {
        self.sessions.write().await.insert(token.into(), user_id);
    }

    pub async fn put_profile(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.user_id, profile);
    }

    // every write fails while set; reads are unaffected
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    // only edit history writes fail while set
    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn session_user(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.sessions.read().await.get(token).copied())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn insert_project(&self, project: Project) -> Result<(), StoreError> {
        self.check_writable()?;
        self.projects.write().await.insert(project.id, project);
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut projects = self.projects.write().await;
        match projects.get_mut(&project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(())
            }
            None => Err(StoreError::Missing("project", project.id)),
        }
    }

    async fn list_pages(&self, project_id: Uuid) -> Result<Vec<Page>, StoreError> {
        let pages = self.pages.read().await;
        Ok(pages.iter().filter(|p| p.project_id == project_id).cloned().collect())
    }

    async fn insert_page(&self, page: Page) -> Result<(), StoreError> {
        self.check_writable()?;
        self.pages.write().await.push(page);
        Ok(())
    }

    async fn list_records(&self, project_id: Uuid) -> Result<Vec<MarkupRecord>, StoreError> {
        let records = self.records.read().await;
        let mut out: Vec<MarkupRecord> = records
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_enabled_records(&self, project_id: Uuid) -> Result<Vec<MarkupRecord>, StoreError> {
        let mut records = self.list_records(project_id).await?;
        records.retain(|r| r.enabled);
        Ok(records)
    }

    async fn get_record(&self, project_id: Uuid, id: Uuid) -> Result<Option<MarkupRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&id).filter(|r| r.project_id == project_id).cloned())
    }

    async fn insert_records(&self, new_records: &[MarkupRecord]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        for record in new_records {
            records.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn update_record(&self, record: &MarkupRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) if existing.project_id == record.project_id => {
                *existing = record.clone();
                Ok(())
            }
            _ => Err(StoreError::Missing("markup record", record.id)),
        }
    }

    async fn delete_record(&self, project_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        if records.get(&id).is_some_and(|r| r.project_id == project_id) {
            records.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn count_edits_since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        actions: &[EditAction],
    ) -> Result<u32, StoreError> {
        let edits = self.edits.read().await;
        let count = edits
            .iter()
            .filter(|e| e.project_id == project_id && e.occurred_at >= since && actions.contains(&e.action))
            .count();
        Ok(count as u32)
    }

    async fn insert_edits(&self, new_edits: &[EditRecord]) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("edit history writes disabled".to_string()));
        }
        self.edits.write().await.extend_from_slice(new_edits);
        Ok(())
    }

    async fn insert_submission_log(&self, log: SubmissionLog) -> Result<(), StoreError> {
        self.check_writable()?;
        self.submissions.write().await.push(log);
        Ok(())
    }

    async fn list_submission_logs(&self, project_id: Uuid) -> Result<Vec<SubmissionLog>, StoreError> {
        let logs = self.submissions.read().await;
        let mut out: Vec<SubmissionLog> = logs.iter().filter(|l| l.project_id == project_id).cloned().collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(out)
    }
}
