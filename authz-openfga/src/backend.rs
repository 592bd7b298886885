//! Backend trait and implementations for the relationship store.
//!
//! [`RelationshipStore`] is the core abstraction: the operations the
//! authorizer consumes from OpenFGA (check, list objects, tuple writes and
//! model management).
//!
//! Provided implementations:
//! - [`HttpBackend`]: production client for the OpenFGA HTTP API
//! - [`MockBackend`]: in-memory mock for tests

use crate::config::OpenFgaConfig;
use crate::error::OpenFgaError;
use crate::model::AuthorizationModel;
use crate::tuple::TupleKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Boxed future returned by [`RelationshipStore`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations consumed from a relationship-based permission service.
pub trait RelationshipStore: Send + Sync + 'static {
    /// Check if `user` has `relation` to `object`, as evaluated by the model.
    fn check(
        &self,
        user: &str,
        relation: &str,
        object: &str,
    ) -> BoxFuture<'_, Result<bool, OpenFgaError>>;

    /// List all objects of `object_type` that `user` has `relation` to.
    fn list_objects(
        &self,
        user: &str,
        relation: &str,
        object_type: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, OpenFgaError>>;

    /// Write and delete tuples in a single request.
    fn write<'a>(
        &'a self,
        writes: &'a [TupleKey],
        deletes: &'a [TupleKey],
    ) -> BoxFuture<'a, Result<(), OpenFgaError>>;

    /// Read the most recent authorization model, if any.
    fn read_latest_model(&self) -> BoxFuture<'_, Result<Option<AuthorizationModel>, OpenFgaError>>;

    /// Upload a new authorization model, returning its ID.
    fn write_model<'a>(
        &'a self,
        model: &'a AuthorizationModel,
    ) -> BoxFuture<'a, Result<String, OpenFgaError>>;
}

// ── HttpBackend ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CheckBody<'a> {
    tuple_key: &'a TupleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

#[derive(Serialize)]
struct ListObjectsBody<'a> {
    #[serde(rename = "type")]
    object_type: &'a str,
    relation: &'a str,
    user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ListObjectsResponse {
    #[serde(default)]
    objects: Vec<String>,
}

#[derive(Serialize)]
struct TupleKeys<'a> {
    tuple_keys: &'a [TupleKey],
}

#[derive(Serialize)]
struct WriteBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ReadModelsResponse {
    #[serde(default)]
    authorization_models: Vec<AuthorizationModel>,
}

#[derive(Deserialize)]
struct WriteModelResponse {
    authorization_model_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Production backend speaking the OpenFGA HTTP API.
///
/// The underlying `reqwest::Client` is cheap to clone (it shares its
/// connection pool), so the backend is too.
///
/// # Example
///
/// ```ignore
/// use authz_openfga::{HttpBackend, OpenFgaConfig, RelationshipStore};
///
/// let config = OpenFgaConfig::new("http://localhost:8080", "store-id")
///     .with_api_token("secret");
/// let backend = HttpBackend::new(&config)?;
///
/// let allowed = backend.check("user:alice", "can_view", "instance:default/c1").await?;
/// ```
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    store_id: String,
    model_id: Option<String>,
    api_token: Option<String>,
}

impl HttpBackend {
    /// Build a client for the given config. No request is made.
    pub fn new(config: &OpenFgaConfig) -> Result<Self, OpenFgaError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                OpenFgaError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            store_id: config.store_id.clone(),
            model_id: config.model_id.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// Returns the store ID.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/stores/{}/{}", self.endpoint, self.store_id, path)
    }

    /// Inject the bearer token if configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, OpenFgaError> {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, OpenFgaError> {
        let response = self.authorize(self.client.get(self.url(path))).send().await?;
        decode(response).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, OpenFgaError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        return Err(OpenFgaError::ServerError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}

impl RelationshipStore for HttpBackend {
    fn check(
        &self,
        user: &str,
        relation: &str,
        object: &str,
    ) -> BoxFuture<'_, Result<bool, OpenFgaError>> {
        let tuple = TupleKey::new(user, relation, object);

        Box::pin(async move {
            let body = CheckBody {
                tuple_key: &tuple,
                authorization_model_id: self.model_id.as_deref(),
            };
            let response: CheckResponse = self.post("check", &body).await?;
            tracing::trace!(
                user = %tuple.user,
                relation = %tuple.relation,
                object = %tuple.object,
                allowed = response.allowed,
                "relationship check"
            );
            Ok(response.allowed)
        })
    }

    fn list_objects(
        &self,
        user: &str,
        relation: &str,
        object_type: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, OpenFgaError>> {
        let (user, relation, object_type) =
            (user.to_string(), relation.to_string(), object_type.to_string());

        Box::pin(async move {
            let body = ListObjectsBody {
                object_type: &object_type,
                relation: &relation,
                user: &user,
                authorization_model_id: self.model_id.as_deref(),
            };
            let response: ListObjectsResponse = self.post("list-objects", &body).await?;
            Ok(response.objects)
        })
    }

    fn write<'a>(
        &'a self,
        writes: &'a [TupleKey],
        deletes: &'a [TupleKey],
    ) -> BoxFuture<'a, Result<(), OpenFgaError>> {
        Box::pin(async move {
            let body = WriteBody {
                writes: (!writes.is_empty()).then_some(TupleKeys { tuple_keys: writes }),
                deletes: (!deletes.is_empty()).then_some(TupleKeys { tuple_keys: deletes }),
                authorization_model_id: self.model_id.as_deref(),
            };
            let _: serde::de::IgnoredAny = self.post("write", &body).await?;
            tracing::trace!(writes = writes.len(), deletes = deletes.len(), "tuples written");
            Ok(())
        })
    }

    fn read_latest_model(&self) -> BoxFuture<'_, Result<Option<AuthorizationModel>, OpenFgaError>> {
        Box::pin(async move {
            let response: ReadModelsResponse = self.get("authorization-models?page_size=1").await?;
            Ok(response.authorization_models.into_iter().next())
        })
    }

    fn write_model<'a>(
        &'a self,
        model: &'a AuthorizationModel,
    ) -> BoxFuture<'a, Result<String, OpenFgaError>> {
        Box::pin(async move {
            let response: WriteModelResponse = self.post("authorization-models", model).await?;
            Ok(response.authorization_model_id)
        })
    }
}

// ── MockBackend ────────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    tuples: dashmap::DashSet<(String, String, String)>,
    model: Mutex<Option<AuthorizationModel>>,
    offline: AtomicBool,
    failing_objects: dashmap::DashSet<String>,
    checks: AtomicUsize,
    lists: AtomicUsize,
    writes: AtomicUsize,
    model_writes: AtomicUsize,
    write_log: Mutex<Vec<(Vec<TupleKey>, Vec<TupleKey>)>>,
}

/// In-memory mock backend for testing.
///
/// Stores tuples as `(user, relation, object)` triples in a `DashSet`.
/// Only performs direct tuple lookups and does **not** model transitive
/// relationships like a real OpenFGA server would. Like a real server, it
/// rejects writing a tuple that already exists and deleting one that does
/// not.
///
/// Clones share the same state, so a test can keep a handle on a mock that
/// was handed to an authorizer.
///
/// # Example
///
/// ```
/// use authz_openfga::MockBackend;
///
/// let mock = MockBackend::new();
/// mock.add_tuple("user:alice", "can_view", "instance:default/c1");
/// assert!(mock.has_tuple("user:alice", "can_view", "instance:default/c1"));
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relationship tuple.
    pub fn add_tuple(&self, user: &str, relation: &str, object: &str) {
        self.state
            .tuples
            .insert((user.to_string(), relation.to_string(), object.to_string()));
    }

    /// Remove a relationship tuple.
    pub fn remove_tuple(&self, user: &str, relation: &str, object: &str) {
        self.state
            .tuples
            .remove(&(user.to_string(), relation.to_string(), object.to_string()));
    }

    /// Check if a tuple exists (direct lookup only, no transitive evaluation).
    pub fn has_tuple(&self, user: &str, relation: &str, object: &str) -> bool {
        self.state
            .tuples
            .contains(&(user.to_string(), relation.to_string(), object.to_string()))
    }

    /// Number of stored tuples.
    pub fn tuple_count(&self) -> usize {
        self.state.tuples.len()
    }

    /// Make every call fail with a connection error while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Make any write request touching `object` fail.
    pub fn fail_object(&self, object: &str) {
        self.state.failing_objects.insert(object.to_string());
    }

    /// Stop failing writes touching `object`.
    pub fn heal_object(&self, object: &str) {
        self.state.failing_objects.remove(object);
    }

    /// Set the model returned by `read_latest_model`.
    pub fn set_model(&self, model: Option<AuthorizationModel>) {
        *lock(&self.state.model) = model;
    }

    /// The model currently held.
    pub fn model(&self) -> Option<AuthorizationModel> {
        lock(&self.state.model).clone()
    }

    /// Number of `check` calls received.
    pub fn check_calls(&self) -> usize {
        self.state.checks.load(Ordering::SeqCst)
    }

    /// Number of `list_objects` calls received.
    pub fn list_calls(&self) -> usize {
        self.state.lists.load(Ordering::SeqCst)
    }

    /// Number of `write` calls received, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    /// Number of `write_model` calls received.
    pub fn model_writes(&self) -> usize {
        self.state.model_writes.load(Ordering::SeqCst)
    }

    /// Every successful `write` call as `(writes, deletes)`, in arrival order.
    pub fn write_log(&self) -> Vec<(Vec<TupleKey>, Vec<TupleKey>)> {
        lock(&self.state.write_log).clone()
    }

    /// List all objects of a given type that a user has a relation to.
    pub fn objects_for(&self, user: &str, relation: &str, object_type: &str) -> Vec<String> {
        let prefix = format!("{}:", object_type);
        let mut objects: Vec<String> = self
            .state
            .tuples
            .iter()
            .filter(|t| t.0 == user && t.1 == relation && t.2.starts_with(&prefix))
            .map(|t| t.2.clone())
            .collect();
        objects.sort();
        objects
    }

    fn ensure_online(&self) -> Result<(), OpenFgaError> {
        if self.state.offline.load(Ordering::SeqCst) {
            return Err(OpenFgaError::ConnectionFailed("mock backend is offline".into()));
        }
        Ok(())
    }

    fn apply(&self, writes: &[TupleKey], deletes: &[TupleKey]) -> Result<(), OpenFgaError> {
        self.ensure_online()?;

        if let Some(tuple) = writes
            .iter()
            .chain(deletes)
            .find(|t| self.state.failing_objects.contains(&t.object))
        {
            return Err(OpenFgaError::ServerError {
                status: 400,
                message: format!("injected failure for {}", tuple.object),
            });
        }

        // Writes are all-or-nothing within one request.
        if let Some(tuple) = writes
            .iter()
            .find(|t| self.has_tuple(&t.user, &t.relation, &t.object))
        {
            return Err(OpenFgaError::ServerError {
                status: 400,
                message: format!("cannot write a tuple which already exists: {}", tuple.object),
            });
        }
        if let Some(tuple) = deletes
            .iter()
            .find(|t| !self.has_tuple(&t.user, &t.relation, &t.object))
        {
            return Err(OpenFgaError::ServerError {
                status: 400,
                message: format!("cannot delete a tuple which does not exist: {}", tuple.object),
            });
        }

        for tuple in writes {
            self.add_tuple(&tuple.user, &tuple.relation, &tuple.object);
        }
        for tuple in deletes {
            self.remove_tuple(&tuple.user, &tuple.relation, &tuple.object);
        }
        lock(&self.state.write_log).push((writes.to_vec(), deletes.to_vec()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RelationshipStore for MockBackend {
    fn check(
        &self,
        user: &str,
        relation: &str,
        object: &str,
    ) -> BoxFuture<'_, Result<bool, OpenFgaError>> {
        self.state.checks.fetch_add(1, Ordering::SeqCst);
        let result = self
            .ensure_online()
            .map(|()| self.has_tuple(user, relation, object));
        Box::pin(async move { result })
    }

    fn list_objects(
        &self,
        user: &str,
        relation: &str,
        object_type: &str,
    ) -> BoxFuture<'_, Result<Vec<String>, OpenFgaError>> {
        self.state.lists.fetch_add(1, Ordering::SeqCst);
        let result = self
            .ensure_online()
            .map(|()| self.objects_for(user, relation, object_type));
        Box::pin(async move { result })
    }

    fn write<'a>(
        &'a self,
        writes: &'a [TupleKey],
        deletes: &'a [TupleKey],
    ) -> BoxFuture<'a, Result<(), OpenFgaError>> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        let result = self.apply(writes, deletes);
        Box::pin(async move { result })
    }

    fn read_latest_model(&self) -> BoxFuture<'_, Result<Option<AuthorizationModel>, OpenFgaError>> {
        let result = self.ensure_online().map(|()| self.model());
        Box::pin(async move { result })
    }

    fn write_model<'a>(
        &'a self,
        model: &'a AuthorizationModel,
    ) -> BoxFuture<'a, Result<String, OpenFgaError>> {
        let result = self.ensure_online().map(|()| {
            let count = self.state.model_writes.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("mock-model-{}", count);
            let mut stored = model.clone();
            stored.id = Some(id.clone());
            self.set_model(Some(stored));
            id
        });
        Box::pin(async move { result })
    }
}
