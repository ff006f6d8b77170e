use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::metrics::{CACHE_HITS, CACHE_MISSES};

// Rendered public response with timestamp
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub body: String,
    pub etag: String,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn new(body: String) -> Self {
        Self {
            etag: make_etag(&body),
            body,
            created_at: Instant::now(),
        }
    }
}

// Key layout: "<format>:<project>:<path>"
pub fn make_cache_key(format: &str, project_id: Uuid, path: Option<&str>) -> String {
    format!("{}:{}:{}", format, project_id, path.unwrap_or(""))
}

// Strong ETag from the body hash
pub fn make_etag(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("\"{:x}\"", hasher.finalize())
}

pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    purge_probability: f64,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize, purge_probability: f64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            purge_probability: purge_probability.clamp(0.0, 1.0),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            if entry.created_at.elapsed() < self.ttl {
                CACHE_HITS.inc();
                return Some(entry.clone());
            }
        }
        CACHE_MISSES.inc();
        // stale or absent
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: String, body: String) -> CacheEntry {
        let entry = CacheEntry::new(body);
        if self.ttl.is_zero() || self.max_entries == 0 {
            return entry;
        }

        if self.purge_probability > 0.0 && fastrand::f64() < self.purge_probability {
            self.purge_expired();
        }
        // full even after dropping stale entries: serve uncached
        if self.entries.len() >= self.max_entries
            && !self.entries.contains_key(&key)
            && self.purge_expired() == 0
        {
            tracing::debug!(max_entries = self.max_entries, "response cache full, not storing");
            return entry;
        }

        self.entries.insert(key, entry.clone());
        entry
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    // every format and path of the project
    pub fn invalidate_project(&self, project_id: Uuid) {
        let needle = project_id.to_string();
        self.entries
            .retain(|key, _| key.split(':').nth(1) != Some(needle.as_str()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_then_invalidate() {
        let cache = ResponseCache::new(Duration::from_secs(60), 100, 0.0);
        let project = Uuid::new_v4();
        let other = Uuid::new_v4();

        cache.insert(make_cache_key("json", project, None), "[]".to_string());
        cache.insert(make_cache_key("html", project, Some("/menu")), "<!-- -->".to_string());
        cache.insert(make_cache_key("json", other, None), "[1]".to_string());

        let hit = cache.get(&make_cache_key("json", project, None)).unwrap();
        assert_eq!(hit.body, "[]");
        assert_eq!(hit.etag, make_etag("[]"));

        cache.invalidate_project(project);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&make_cache_key("json", other, None)).is_some());
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = ResponseCache::new(Duration::ZERO, 100, 0.0);
        let key = make_cache_key("json", Uuid::nil(), None);
        let entry = cache.insert(key.clone(), "[]".to_string());
        assert!(entry.etag.starts_with('"'));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn full_cache_stops_storing_new_keys() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2, 0.0);
        let project = Uuid::new_v4();
        for path in ["/a", "/b", "/c"] {
            cache.insert(make_cache_key("json", project, Some(path)), "[]".to_string());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&make_cache_key("json", project, Some("/c"))).is_none());

        // existing keys can still be refreshed
        cache.insert(make_cache_key("json", project, Some("/a")), "[1]".to_string());
        assert_eq!(cache.get(&make_cache_key("json", project, Some("/a"))).unwrap().body, "[1]");
    }

    #[test]
    fn stale_entries_are_purged_to_make_room() {
        let cache = ResponseCache::new(Duration::from_millis(20), 2, 0.0);
        let project = Uuid::new_v4();
        cache.insert(make_cache_key("json", project, Some("/a")), "[]".to_string());
        cache.insert(make_cache_key("json", project, Some("/b")), "[]".to_string());
        std::thread::sleep(Duration::from_millis(40));

        cache.insert(make_cache_key("json", project, Some("/c")), "[]".to_string());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&make_cache_key("json", project, Some("/c"))).is_some());
    }

    #[test]
    fn inserts_purge_stale_entries_when_sampled() {
        let cache = ResponseCache::new(Duration::from_millis(200), 100, 1.0);
        let project = Uuid::new_v4();
        for i in 0..10 {
            cache.insert(make_cache_key("html", project, Some(&format!("/x{i}"))), "".to_string());
        }
        assert_eq!(cache.len(), 10);
        std::thread::sleep(Duration::from_millis(300));

        cache.insert(make_cache_key("html", project, None), "".to_string());
        assert_eq!(cache.len(), 1);
    }
}
