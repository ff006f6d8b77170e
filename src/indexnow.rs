// A project proves it owns its domain by serving /<key>.txt containing the
// issued key. Only verified projects may notify IndexNow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthUser, owned_project};
use crate::error::AppError;
use crate::metrics::INDEXNOW_SUBMISSIONS;
use crate::models::{MarkupRecord, Page, Project, SubmissionLog, SubmissionStatus};
use crate::state::AppState;

const MAX_ERROR_DETAIL: usize = 500;
// keys are 32 hex characters
const MAX_KEY_FILE_BYTES: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedKey {
    pub project_id: Uuid,
    pub key: String,
    pub key_location: String,
}

pub fn key_file_url(scheme: &str, domain: &str, key: &str) -> String {
    format!("{scheme}://{domain}/{key}.txt")
}

// root URL plus every page that has at least one enabled record
pub fn submission_urls(base: &str, pages: &[Page], records: &[MarkupRecord]) -> Vec<String> {
    let mut urls = vec![format!("{base}/")];
    let mut paths: Vec<&str> = pages
        .iter()
        .map(|p| p.path.as_str())
        .filter(|path| {
            records
                .iter()
                .any(|r| r.enabled && r.page_path.as_deref() == Some(*path))
        })
        .filter(|path| *path != "/")
        .collect();
    paths.sort_unstable();
    paths.dedup();
    urls.extend(paths.into_iter().map(|path| format!("{base}{path}")));
    urls
}

pub struct IndexNow<'a> {
    state: &'a AppState,
}

impl<'a> IndexNow<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn base_url(&self, project: &Project) -> String {
        format!("{}://{}", self.state.settings.verify_scheme, project.domain)
    }

    // a fresh key invalidates any earlier verification
    pub async fn issue_key(&self, user: AuthUser, project_id: Uuid) -> Result<IssuedKey, AppError> {
        let mut project = owned_project(self.state.store.as_ref(), user, project_id).await?;

        let key = Uuid::new_v4().simple().to_string();
        project.verification_key = Some(key.clone());
        project.verified = false;
        project.indexnow_enabled = false;
        self.state.store.update_project(&project).await?;

        tracing::info!(%project_id, "issued verification key");
        Ok(IssuedKey {
            project_id,
            key_location: key_file_url(&self.state.settings.verify_scheme, &project.domain, &key),
            key,
        })
    }

    pub async fn verify(&self, user: AuthUser, project_id: Uuid) -> Result<Project, AppError> {
        let mut project = owned_project(self.state.store.as_ref(), user, project_id).await?;
        let key = project
            .verification_key
            .clone()
            .ok_or_else(|| AppError::validation("projectId", "no verification key has been issued"))?;

        let url = key_file_url(&self.state.settings.verify_scheme, &project.domain, &key);
        let body = self.fetch_key_file(&url).await.map_err(|reason| {
            tracing::info!(%project_id, %url, %reason, "domain verification failed");
            AppError::VerificationFailed(reason)
        })?;

        if body.trim() != key {
            tracing::info!(%project_id, %url, "verification key mismatch");
            return Err(AppError::VerificationFailed(format!(
                "{url} does not contain the expected key"
            )));
        }

        project.verified = true;
        project.indexnow_enabled = true;
        self.state.store.update_project(&project).await?;

        tracing::info!(%project_id, domain = %project.domain, "domain verified");
        Ok(project)
    }

    async fn fetch_key_file(&self, url: &str) -> Result<String, String> {
        let mut response = self
            .state
            .client
            .get(url)
            .timeout(self.state.settings.verify_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out fetching {url}")
                } else {
                    format!("could not reach {url}: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{url} returned HTTP {}", status.as_u16()));
        }

        if response.content_length().is_some_and(|len| len > MAX_KEY_FILE_BYTES as u64) {
            return Err(format!("{url} is larger than {MAX_KEY_FILE_BYTES} bytes"));
        }

        // the header can be absent or wrong, so the cap also holds while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("failed to read {url}: {e}"))?
        {
            if body.len() + chunk.len() > MAX_KEY_FILE_BYTES {
                return Err(format!("{url} is larger than {MAX_KEY_FILE_BYTES} bytes"));
            }
            body.extend_from_slice(&chunk);
        }
        String::from_utf8(body).map_err(|_| format!("{url} is not valid UTF-8"))
    }

    pub async fn submit(
        &self,
        user: AuthUser,
        project_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubmissionLog, AppError> {
        let project = owned_project(self.state.store.as_ref(), user, project_id).await?;
        let key = match (&project.verification_key, project.verified) {
            (Some(key), true) => key.clone(),
            _ => {
                return Err(AppError::validation(
                    "projectId",
                    "domain must be verified before submitting to IndexNow",
                ));
            }
        };

        let pages = self.state.store.list_pages(project_id).await?;
        let records = self.state.store.list_enabled_records(project_id).await?;
        let base = self.base_url(&project);
        let urls = submission_urls(&base, &pages, &records);

        let body = json!({
            "host": project.domain,
            "key": key,
            "keyLocation": key_file_url(&self.state.settings.verify_scheme, &project.domain, &key),
            "urlList": urls,
        });

        let result = self
            .state
            .client
            .post(&self.state.settings.indexnow_endpoint)
            .json(&body)
            .timeout(self.state.settings.verify_timeout)
            .send()
            .await;

        let (code, error) = match result {
            Ok(response) if response.status().is_success() => (Some(response.status().as_u16()), None),
            Ok(response) => {
                let code = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                let detail = if text.trim().is_empty() {
                    format!("HTTP {code}")
                } else {
                    truncate(text.trim(), MAX_ERROR_DETAIL)
                };
                (Some(code), Some(detail))
            }
            Err(e) => (None, Some(e.to_string())),
        };

        let log = SubmissionLog {
            id: Uuid::new_v4(),
            project_id,
            url_count: urls.len(),
            status: if error.is_none() {
                SubmissionStatus::Success
            } else {
                SubmissionStatus::Failed
            },
            response_code: code,
            error: error.clone(),
            submitted_at: now,
        };
        // logged before surfacing any upstream failure
        self.state.store.insert_submission_log(log.clone()).await?;

        match error {
            None => {
                INDEXNOW_SUBMISSIONS.with_label_values(&["success"]).inc();
                tracing::info!(%project_id, urls = urls.len(), "submitted urls to IndexNow");
                Ok(log)
            }
            Some(detail) => {
                INDEXNOW_SUBMISSIONS.with_label_values(&["failed"]).inc();
                tracing::warn!(%project_id, status = ?code, %detail, "IndexNow submission failed");
                Err(AppError::Upstream {
                    service: "IndexNow",
                    status: code,
                    detail,
                })
            }
        }
    }

    pub async fn logs(&self, user: AuthUser, project_id: Uuid) -> Result<Vec<SubmissionLog>, AppError> {
        owned_project(self.state.store.as_ref(), user, project_id).await?;
        Ok(self.state.store.list_submission_logs(project_id).await?)
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
