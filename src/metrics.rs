use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_histogram,
};

lazy_static! {
    pub static ref MARKUP_REQUESTS: CounterVec = register_counter_vec!(
        "markup_requests_total",
        "Public markup requests by format",
        &["format"]
    )
    .unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("markup_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref RATE_LIMIT_ENTRIES: Gauge =
        register_gauge!("markup_rate_limit_entries", "Live rate limiter windows after the last purge").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("markup_cache_hits_total", "Total response cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("markup_cache_misses_total", "Total response cache misses").unwrap();
    pub static ref RENDER_LATENCY: Histogram = register_histogram!(
        "markup_render_latency_seconds",
        "Time to load and render public markup"
    )
    .unwrap();
    pub static ref QUOTA_REJECTIONS: Counter =
        register_counter!("markup_quota_rejections_total", "Edits refused by the monthly quota").unwrap();
    pub static ref EDITS_RECORDED: Counter =
        register_counter!("markup_edits_recorded_total", "Edit history rows written").unwrap();
    pub static ref INDEXNOW_SUBMISSIONS: CounterVec = register_counter_vec!(
        "markup_indexnow_submissions_total",
        "IndexNow submissions by outcome",
        &["status"]
    )
    .unwrap();
}

pub fn gather() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
