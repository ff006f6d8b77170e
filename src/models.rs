use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::markup::MarkupPayload;

// A customer site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub domain: String,
    #[serde(default)]
    pub verification_key: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub indexnow_enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner_id: Uuid, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            domain: domain.into(),
            verification_key: None,
            verified: false,
            indexnow_enabled: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    pub project_id: Uuid,
    pub path: String,
}

// Owner's account settings; plan_limit None means the configured baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Update,
    Toggle,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub actor_id: Uuid,
    pub action: EditAction,
    pub occurred_at: DateTime<Utc>,
}

// structured-data document, optionally scoped to a single page path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default)]
    pub page_path: Option<String>,
    #[serde(flatten)]
    pub payload: MarkupPayload,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarkupRecord {
    pub fn schema_type(&self) -> &str {
        self.payload.schema_type()
    }

    // project-level records apply to every page
    pub fn applies_to(&self, path: Option<&str>) -> bool {
        match (&self.page_path, path) {
            (None, _) => true,
            (Some(scoped), Some(path)) => scoped == path,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionLog {
    pub id: Uuid,
    pub project_id: Uuid,
    pub url_count: usize,
    pub status: SubmissionStatus,
    pub response_code: Option<u16>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}
