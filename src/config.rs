use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::RatePresets;

// CLI argument structure; every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "markup-gateway")]
#[command(about = "Serves and manages schema.org markup for customer sites")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "MARKUP_PORT", default_value_t = 8080)]
    pub port: u16,

    // Edge cache max-age and in-process response cache TTL, in seconds
    #[arg(short, long, env = "MARKUP_CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl: u64,

    // Most rendered responses held in memory at once
    #[arg(long, env = "MARKUP_CACHE_MAX_ENTRIES", default_value_t = 10000)]
    pub cache_max_entries: usize,

    // stale-while-revalidate window, in seconds
    #[arg(long, env = "MARKUP_STALE_TTL", default_value_t = 86400)]
    pub stale_ttl: u64,

    // Public requests per IP per minute
    #[arg(long, env = "MARKUP_PUBLIC_PER_MINUTE", default_value_t = 100)]
    pub public_per_minute: u32,

    // Public requests per IP per hour
    #[arg(long, env = "MARKUP_PUBLIC_PER_HOUR", default_value_t = 1000)]
    pub public_per_hour: u32,

    // Public requests per project per day
    #[arg(long, env = "MARKUP_PROJECT_PER_DAY", default_value_t = 10000)]
    pub project_per_day: u32,

    // Webhook deliveries per IP per minute
    #[arg(long, env = "MARKUP_WEBHOOK_PER_MINUTE", default_value_t = 30)]
    pub webhook_per_minute: u32,

    // Chance that a limiter check also purges expired windows
    #[arg(long, env = "MARKUP_PURGE_PROBABILITY", default_value_t = 0.01)]
    pub purge_probability: f64,

    // Monthly edits for accounts without a plan limit of their own
    #[arg(long, env = "MARKUP_DEFAULT_PLAN_LIMIT", default_value_t = 5)]
    pub default_plan_limit: u32,

    // Timeout for fetching the verification key file, in seconds
    #[arg(long, env = "MARKUP_VERIFY_TIMEOUT", default_value_t = 10)]
    pub verify_timeout: u64,

    // Scheme used to reach customer domains
    #[arg(long, env = "MARKUP_VERIFY_SCHEME", default_value = "https")]
    pub verify_scheme: String,

    // IndexNow submission endpoint
    #[arg(long, env = "MARKUP_INDEXNOW_ENDPOINT", default_value = "https://api.indexnow.org/indexnow")]
    pub indexnow_endpoint: String,

    // JSON file to preload the in-memory store from
    #[arg(long, env = "MARKUP_SEED")]
    pub seed: Option<PathBuf>,
}

impl Args {
    pub fn rate_presets(&self) -> RatePresets {
        RatePresets {
            public_per_minute: self.public_per_minute,
            public_per_hour: self.public_per_hour,
            project_per_day: self.project_per_day,
            webhook_per_minute: self.webhook_per_minute,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            cache_ttl: Duration::from_secs(self.cache_ttl),
            cache_max_entries: self.cache_max_entries,
            stale_ttl: Duration::from_secs(self.stale_ttl),
            purge_probability: self.purge_probability,
            default_plan_limit: self.default_plan_limit,
            verify_timeout: Duration::from_secs(self.verify_timeout),
            verify_scheme: self.verify_scheme.clone(),
            indexnow_endpoint: self.indexnow_endpoint.clone(),
            presets: self.rate_presets(),
        }
    }
}

// Runtime settings, separated from the CLI so tests can build them directly
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub stale_ttl: Duration,
    pub purge_probability: f64,
    pub default_plan_limit: u32,
    pub verify_timeout: Duration,
    pub verify_scheme: String,
    pub indexnow_endpoint: String,
    pub presets: RatePresets,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 10000,
            stale_ttl: Duration::from_secs(86400),
            purge_probability: 0.01,
            default_plan_limit: 5,
            verify_timeout: Duration::from_secs(10),
            verify_scheme: "https".to_string(),
            indexnow_endpoint: "https://api.indexnow.org/indexnow".to_string(),
            presets: RatePresets::default(),
        }
    }
}
