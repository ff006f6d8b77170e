use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::quota::QuotaTracker;
use crate::rate_limit::RateLimiter;
use crate::store::Store;

// app's shared state, built once at startup and handed to every handler
pub struct AppState {
    pub client: reqwest::Client,
    pub store: Arc<dyn Store>,
    pub cache: ResponseCache,
    pub limiter: RateLimiter,
    pub quota: QuotaTracker,
    pub settings: Settings,
    edit_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            cache: ResponseCache::new(
                settings.cache_ttl,
                settings.cache_max_entries,
                settings.purge_probability,
            ),
            limiter: RateLimiter::new(settings.presets, settings.purge_probability),
            quota: QuotaTracker::new(store.clone(), settings.default_plan_limit),
            store,
            settings,
            edit_locks: DashMap::new(),
        })
    }

    // one lock per project, held across quota check, write and edit record
    pub fn edit_lock(&self, project_id: Uuid) -> Arc<Mutex<()>> {
        self.edit_locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
