// Monthly edit quota. Only create and update count, and the month starts on
// the 1st at 00:00 in the timezone of the `now` handed in.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::{EDITS_RECORDED, QUOTA_REJECTIONS};
use crate::models::{EditAction, EditRecord};
use crate::store::Store;

pub const COUNTED_ACTIONS: [EditAction; 2] = [EditAction::Create, EditAction::Update];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub used: u32,
    pub limit: u32,
}

impl QuotaUsage {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

pub fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    first_of_month(&now.timezone(), now.year(), now.month())
}

// when the quota resets
pub fn next_month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    first_of_month(&now.timezone(), year, month)
}

fn first_of_month<Tz: TimeZone>(tz: &Tz, year: i32, month: u32) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    // a few zones skip midnight on DST days; take the earliest valid mapping
    match tz.from_local_datetime(&first).earliest() {
        Some(start) => start.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&first),
    }
}

pub struct QuotaTracker {
    store: Arc<dyn Store>,
    default_limit: u32,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn Store>, default_limit: u32) -> Self {
        Self { store, default_limit }
    }

    // plan limit comes from the project owner's profile
    pub async fn plan_limit(&self, project_id: Uuid) -> Result<u32, AppError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(AppError::NotFound("project"))?;

        let profile = self.store.get_profile(project.owner_id).await?;
        Ok(profile
            .and_then(|p| p.plan_limit)
            .unwrap_or(self.default_limit))
    }

    pub async fn usage(&self, project_id: Uuid, month_start: DateTime<Utc>) -> Result<QuotaUsage, AppError> {
        let limit = self.plan_limit(project_id).await?;
        let used = self
            .store
            .count_edits_since(project_id, month_start, &COUNTED_ACTIONS)
            .await?;
        Ok(QuotaUsage { used, limit })
    }

    pub async fn remaining(&self, project_id: Uuid, month_start: DateTime<Utc>) -> Result<u32, AppError> {
        Ok(self.usage(project_id, month_start).await?.remaining())
    }

    pub async fn ensure_available(
        &self,
        project_id: Uuid,
        requested: u32,
        month_start: DateTime<Utc>,
    ) -> Result<QuotaUsage, AppError> {
        let usage = self.usage(project_id, month_start).await?;
        if requested > usage.remaining() {
            QUOTA_REJECTIONS.inc();
            tracing::info!(
                %project_id,
                used = usage.used,
                limit = usage.limit,
                requested,
                "edit quota exceeded"
            );
            return Err(AppError::QuotaExceeded {
                used: usage.used,
                limit: usage.limit,
            });
        }
        Ok(usage)
    }

    // call only after the write it describes has been persisted
    pub async fn record_edit(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        action: EditAction,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.record_edits(project_id, actor_id, action, 1, at).await
    }

    pub async fn record_edits(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        action: EditAction,
        count: usize,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if count == 0 {
            return Ok(());
        }

        let edits: Vec<EditRecord> = (0..count)
            .map(|_| EditRecord {
                id: Uuid::new_v4(),
                project_id,
                actor_id,
                action,
                occurred_at: at,
            })
            .collect();

        self.store.insert_edits(&edits).await?;
        EDITS_RECORDED.inc_by(count as f64);
        tracing::debug!(%project_id, ?action, count, "recorded edits");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Profile, Project};
    use crate::store::MemoryStore;
    use chrono::{Duration, FixedOffset};

    async fn setup(plan_limit: Option<u32>) -> (Arc<MemoryStore>, QuotaTracker, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "example.com");
        let project_id = project.id;
        store.insert_project(project).await.unwrap();
        store
            .put_profile(Profile {
                user_id: owner,
                email: None,
                plan_limit,
            })
            .await;
        let tracker = QuotaTracker::new(store.clone(), 5);
        (store, tracker, project_id, owner)
    }

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn month_start_is_first_at_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(month_start(&now), march());

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2026, 4, 1, 1, 0, 0).unwrap();
        // 01:00 on Apr 1 at +02:00 is still Mar 31 in UTC, but the month is April locally
        assert_eq!(month_start(&local), Utc.with_ymd_and_hms(2026, 3, 31, 22, 0, 0).unwrap());
    }

    #[test]
    fn next_month_wraps_year() {
        let december = Utc.with_ymd_and_hms(2026, 12, 15, 8, 0, 0).unwrap();
        assert_eq!(next_month_start(&december), Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn toggle_and_delete_never_consume() {
        let (_store, tracker, project, actor) = setup(None).await;
        let at = march() + Duration::days(2);

        assert_eq!(tracker.remaining(project, march()).await.unwrap(), 5);

        tracker.record_edit(project, actor, EditAction::Toggle, at).await.unwrap();
        tracker.record_edit(project, actor, EditAction::Delete, at).await.unwrap();
        assert_eq!(tracker.remaining(project, march()).await.unwrap(), 5);

        tracker.record_edit(project, actor, EditAction::Create, at).await.unwrap();
        assert_eq!(tracker.remaining(project, march()).await.unwrap(), 4);
        tracker.record_edit(project, actor, EditAction::Update, at).await.unwrap();
        assert_eq!(tracker.remaining(project, march()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn remaining_never_goes_negative() {
        let (_store, tracker, project, actor) = setup(Some(2)).await;
        let at = march() + Duration::hours(1);

        tracker.record_edits(project, actor, EditAction::Create, 4, at).await.unwrap();
        let usage = tracker.usage(project, march()).await.unwrap();
        assert_eq!(usage, QuotaUsage { used: 4, limit: 2 });
        assert_eq!(usage.remaining(), 0);
    }

    #[tokio::test]
    async fn previous_month_edits_are_ignored() {
        let (_store, tracker, project, actor) = setup(None).await;

        tracker
            .record_edits(project, actor, EditAction::Create, 5, march() - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(tracker.remaining(project, march()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn profile_limit_overrides_baseline() {
        let (_store, tracker, project, _) = setup(Some(50)).await;
        assert_eq!(tracker.plan_limit(project).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn ensure_available_checks_the_batch_size() {
        let (_store, tracker, project, actor) = setup(None).await;
        let at = march() + Duration::days(1);
        tracker.record_edits(project, actor, EditAction::Create, 3, at).await.unwrap();

        assert!(tracker.ensure_available(project, 2, march()).await.is_ok());
        let err = tracker.ensure_available(project, 3, march()).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { used: 3, limit: 5 }));
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (_store, tracker, _, _) = setup(None).await;
        let err = tracker.remaining(Uuid::new_v4(), march()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("project")));
    }
}
