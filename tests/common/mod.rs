#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use markup_gateway::build_router;
use markup_gateway::config::Settings;
use markup_gateway::markup::MarkupPayload;
use markup_gateway::models::{MarkupRecord, Project};
use markup_gateway::state::AppState;
use markup_gateway::store::{MemoryStore, Store};

pub const TOKEN: &str = "owner-session";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: Arc<AppState>,
    pub router: Router,
    pub owner: Uuid,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn spawn_app(settings: Settings) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    store.add_session(TOKEN, owner).await;

    let state = AppState::new(store.clone(), settings);
    let router = build_router(state.clone());
    TestApp {
        store,
        state,
        router,
        owner,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn authed(&self, method: &str, uri: &str, body: Option<Value>) -> Reply {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {TOKEN}"));
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn project(&self, domain: &str) -> Project {
        let project = Project::new(self.owner, domain);
        self.store.insert_project(project.clone()).await.unwrap();
        project
    }

    pub async fn record(&self, project_id: Uuid, schema_type: &str, payload: Value, enabled: bool) -> MarkupRecord {
        let now = Utc::now();
        let record = MarkupRecord {
            id: Uuid::new_v4(),
            project_id,
            page_path: None,
            payload: MarkupPayload::parse(schema_type, payload).unwrap(),
            enabled,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_records(std::slice::from_ref(&record)).await.unwrap();
        record
    }
}
