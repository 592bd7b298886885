use authz_openfga::{
    AuthorizationModel, HttpBackend, OpenFgaConfig, OpenFgaError, RelationshipStore, TupleKey,
};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

impl Recorded {
    fn push(&self, route: &str, headers: &HeaderMap, body: Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push((route.to_string(), auth, body));
    }

    fn take(&self) -> Vec<(String, Option<String>, Value)> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

async fn check(
    State(rec): State<Recorded>,
    Path(store): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push(&format!("{store}/check"), &headers, body.clone());
    let allowed = body["tuple_key"]["object"] == "project:default";
    Json(json!({ "allowed": allowed, "resolution": "" }))
}

async fn list_objects(
    State(rec): State<Recorded>,
    Path(store): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.push(&format!("{store}/list-objects"), &headers, body);
    Json(json!({ "objects": ["instance:default/c1", "instance:p1/c2"] }))
}

async fn write(
    State(rec): State<Recorded>,
    Path(store): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    rec.push(&format!("{store}/write"), &headers, body.clone());
    if body["writes"]["tuple_keys"][0]["object"] == "certificate:dup" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "write_failed_due_to_invalid_input",
                "message": "cannot write a tuple which already exists"
            })),
        );
    }
    (StatusCode::OK, Json(json!({})))
}

async fn read_models(
    State(rec): State<Recorded>,
    Path(store): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    rec.push(&format!("{store}/read-models"), &headers, Value::Null);
    Json(json!({
        "authorization_models": [
            { "id": "01HVMODEL", "schema_version": "1.1", "type_definitions": [{ "type": "user" }] }
        ],
        "continuation_token": ""
    }))
}

async fn write_model(
    State(rec): State<Recorded>,
    Path(store): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    rec.push(&format!("{store}/write-model"), &headers, body);
    (StatusCode::CREATED, Json(json!({ "authorization_model_id": "01HWNEW" })))
}

async fn spawn_server() -> (String, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/stores/{store}/check", post(check))
        .route("/stores/{store}/list-objects", post(list_objects))
        .route("/stores/{store}/write", post(write))
        .route("/stores/{store}/authorization-models", get(read_models).post(write_model))
        .with_state(rec.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/"), rec)
}

fn backend(endpoint: &str) -> HttpBackend {
    let config = OpenFgaConfig::new(endpoint, "store1").with_api_token("s3cret");
    HttpBackend::new(&config).unwrap()
}

#[tokio::test]
async fn test_check_sends_tuple_and_bearer_token() {
    let (endpoint, rec) = spawn_server().await;
    let backend = backend(&endpoint);

    assert!(backend.check("user:alice", "can_view", "project:default").await.unwrap());
    assert!(!backend.check("user:alice", "can_view", "project:other").await.unwrap());

    let requests = rec.take();
    assert_eq!(requests.len(), 2);
    let (route, auth, body) = &requests[0];
    assert_eq!(route, "store1/check");
    assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
    assert_eq!(
        body["tuple_key"],
        json!({ "user": "user:alice", "relation": "can_view", "object": "project:default" })
    );
    assert!(body.get("authorization_model_id").is_none());
}

#[tokio::test]
async fn test_list_objects() {
    let (endpoint, rec) = spawn_server().await;
    let backend = backend(&endpoint);

    let objects = backend.list_objects("user:alice", "can_view", "instance").await.unwrap();
    assert_eq!(objects, vec!["instance:default/c1", "instance:p1/c2"]);

    let (_, _, body) = &rec.take()[0];
    assert_eq!(body["type"], "instance");
    assert_eq!(body["relation"], "can_view");
    assert_eq!(body["user"], "user:alice");
}

#[tokio::test]
async fn test_write_omits_empty_sections() {
    let (endpoint, rec) = spawn_server().await;
    let backend = backend(&endpoint);

    let writes = vec![TupleKey::new("server:incus", "server", "certificate:fp1")];
    backend.write(&writes, &[]).await.unwrap();

    let (route, _, body) = &rec.take()[0];
    assert_eq!(route, "store1/write");
    assert_eq!(body["writes"]["tuple_keys"][0]["object"], "certificate:fp1");
    assert!(body.get("deletes").is_none());
}

#[tokio::test]
async fn test_server_error_carries_message() {
    let (endpoint, _rec) = spawn_server().await;
    let backend = backend(&endpoint);

    let writes = vec![TupleKey::new("server:incus", "server", "certificate:dup")];
    let err = backend.write(&writes, &[]).await.unwrap_err();
    match err {
        OpenFgaError::ServerError { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "cannot write a tuple which already exists");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_model_read_and_upload() {
    let (endpoint, rec) = spawn_server().await;
    let backend = backend(&endpoint);

    let latest = backend.read_latest_model().await.unwrap().unwrap();
    assert_eq!(latest.id.as_deref(), Some("01HVMODEL"));
    assert_eq!(latest.schema_version, "1.1");

    let builtin = AuthorizationModel::builtin().unwrap();
    let id = backend.write_model(&builtin).await.unwrap();
    assert_eq!(id, "01HWNEW");

    let requests = rec.take();
    let (_, _, uploaded) = &requests[1];
    assert_eq!(uploaded["schema_version"], "1.1");
    assert!(uploaded.get("id").is_none());
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = backend(&format!("http://{addr}"));
    let err = backend.check("user:alice", "can_view", "project:default").await.unwrap_err();
    assert!(matches!(err, OpenFgaError::ConnectionFailed(_)), "got {err:?}");
}
