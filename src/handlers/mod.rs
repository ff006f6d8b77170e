mod health;
mod indexnow;
mod markup;
mod metrics;
mod projects;
mod schemas;

pub use health::health_handler;
pub use indexnow::{issue_key_handler, logs_handler, submit_handler, verify_handler};
pub use markup::{public_rate_limit, schema_html_handler, schema_json_handler};
pub use metrics::metrics_handler;
pub use projects::{create_project_handler, quota_handler};
pub use schemas::{
    create_schemas_handler, delete_schema_handler, list_schemas_handler, toggle_schema_handler,
    update_schema_handler,
};
