mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::{Value, json};

use common::{TestApp, spawn_app};
use markup_gateway::config::Settings;
use markup_gateway::models::{Profile, Project};
use markup_gateway::store::Store;

fn schemas(name: &str) -> Value {
    json!({"schemas": [{"type": "LocalBusiness", "payload": {"name": name}}]})
}

async fn new_project(app: &TestApp) -> Value {
    let reply = app
        .authed("POST", "/projects", Some(json!({"domain": "https://Example.com/"})))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json()
}

#[tokio::test]
async fn sixth_edit_in_a_month_is_rejected() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    assert_eq!(project["domain"], "example.com");
    let id = project["id"].as_str().unwrap();

    for i in 0..5 {
        let reply = app
            .authed("POST", &format!("/projects/{id}/schemas"), Some(schemas(&format!("Shop {i}"))))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "edit {i}");
    }

    let rejected = app
        .authed("POST", &format!("/projects/{id}/schemas"), Some(schemas("One too many")))
        .await;
    assert_eq!(rejected.status, StatusCode::TOO_MANY_REQUESTS);
    let body = rejected.json();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["used"], 5);
    assert_eq!(body["limit"], 5);

    let quota = app.authed("GET", &format!("/projects/{id}/quota"), None).await;
    assert_eq!(quota.status, StatusCode::OK);
    assert_eq!(quota.json()["used"], 5);
    assert_eq!(quota.json()["remaining"], 0);
    assert!(quota.json()["resetsAt"].is_string());

    let listed = app.authed("GET", &format!("/projects/{id}/schemas"), None).await;
    assert_eq!(listed.json().as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn toggle_and_delete_work_with_no_quota_left() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();

    let batch: Vec<Value> = (0..5)
        .map(|i| json!({"type": "Organization", "payload": {"name": format!("Org {i}")}}))
        .collect();
    let created = app
        .authed("POST", &format!("/projects/{id}/schemas"), Some(json!({"schemas": batch})))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let records = created.json();
    let first = records[0]["id"].as_str().unwrap();
    let second = records[1]["id"].as_str().unwrap();

    let toggled = app
        .authed(
            "POST",
            &format!("/projects/{id}/schemas/{first}/toggle"),
            Some(json!({"enabled": false})),
        )
        .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.json()["enabled"], false);

    let deleted = app
        .authed("DELETE", &format!("/projects/{id}/schemas/{second}"), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    // an update still counts
    let update = app
        .authed(
            "PUT",
            &format!("/projects/{id}/schemas/{first}"),
            Some(json!({"payload": {"name": "Renamed"}})),
        )
        .await;
    assert_eq!(update.status, StatusCode::TOO_MANY_REQUESTS);

    let public = app.get(&format!("/schema?projectId={id}")).await;
    assert_eq!(public.json().as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn edits_invalidate_the_public_cache() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();
    let uri = format!("/schema?projectId={id}");

    assert_eq!(app.get(&uri).await.body, "[]");

    app.authed("POST", &format!("/projects/{id}/schemas"), Some(schemas("Fresh")))
        .await;
    let after = app.get(&uri).await;
    assert_eq!(after.json()[0]["name"], "Fresh");
}

#[tokio::test]
async fn plan_limit_comes_from_the_owner_profile() {
    let app = spawn_app(Settings::default()).await;
    app.store
        .put_profile(Profile {
            user_id: app.owner,
            email: None,
            plan_limit: Some(2),
        })
        .await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();

    let batch = json!({"schemas": [
        {"type": "Organization", "payload": {"name": "A"}},
        {"type": "Organization", "payload": {"name": "B"}},
        {"type": "Organization", "payload": {"name": "C"}},
    ]});
    let reply = app
        .authed("POST", &format!("/projects/{id}/schemas"), Some(batch))
        .await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.json()["used"], 0);
    assert_eq!(reply.json()["limit"], 2);
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_quota() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();

    let reply = app
        .authed(
            "POST",
            &format!("/projects/{id}/schemas"),
            Some(json!({"schemas": [{"type": "LocalBusiness", "payload": {"name": ""}}]})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["field"], "payload.name");

    let quota = app.authed("GET", &format!("/projects/{id}/quota"), None).await;
    assert_eq!(quota.json()["used"], 0);
}

#[tokio::test]
async fn requires_a_session() {
    let app = spawn_app(Settings::default()).await;
    let project = app.project("example.com").await;

    let anonymous = app
        .send(
            Request::get(format!("/projects/{}/schemas", project.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let bad_token = app
        .send(
            Request::get(format!("/projects/{}/schemas", project.id))
                .header("authorization", "Bearer nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad_token.json()["error"], "unauthorized");
}

#[tokio::test]
async fn other_owners_projects_are_forbidden() {
    let app = spawn_app(Settings::default()).await;
    let foreign = Project::new(uuid::Uuid::new_v4(), "other.example");
    app.store.insert_project(foreign.clone()).await.unwrap();

    let reply = app
        .authed("POST", &format!("/projects/{}/schemas", foreign.id), Some(schemas("Mine now")))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // indistinguishable from a project that does not exist
    let missing = app
        .authed("GET", &format!("/projects/{}/quota", uuid::Uuid::new_v4()), None)
        .await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert_eq!(missing.json()["message"], reply.json()["message"]);
}

#[tokio::test]
async fn unknown_schema_is_not_found() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();

    let reply = app
        .authed(
            "DELETE",
            &format!("/projects/{id}/schemas/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_gets_a_structured_error() {
    let app = spawn_app(Settings::default()).await;
    let project = new_project(&app).await;
    let id = project["id"].as_str().unwrap();

    let bad_id = app.authed("GET", "/projects/not-a-uuid/schemas", None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_id.header("content-type"), Some("application/json"));
    assert_eq!(bad_id.json()["error"], "validation_error");
    assert_eq!(bad_id.json()["field"], "path");

    let no_payload = app
        .authed(
            "POST",
            &format!("/projects/{id}/schemas"),
            Some(json!({"schemas": [{"type": "LocalBusiness"}]})),
        )
        .await;
    assert_eq!(no_payload.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_payload.json()["error"], "validation_error");
    assert_eq!(no_payload.json()["field"], "body");

    let no_project = app.authed("GET", "/indexnow/logs", None).await;
    assert_eq!(no_project.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_project.json()["field"], "query");

    // nothing above consumed an edit
    let quota = app.authed("GET", &format!("/projects/{id}/quota"), None).await;
    assert_eq!(quota.json()["used"], 0);
}
