//! The contract every authorization driver implements.

use crate::certificate::CertificateCache;
use crate::driver::openfga::FgaSettings;
use crate::driver::scriptlet::PolicyScript;
use crate::entitlement::Entitlement;
use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use crate::request::RequestDetails;
use authz_openfga::RelationshipStore;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub use authz_openfga::BoxFuture;

/// Predicate returned by [`Authorizer::get_permission_checker`], used to
/// filter candidate objects without one authorization call per object.
pub type PermissionChecker = Box<dyn Fn(&Object) -> bool + Send + Sync>;

/// A checker with a fixed answer.
pub fn allow_all(allowed: bool) -> PermissionChecker {
    Box::new(move |_| allowed)
}

fn done<'a>() -> BoxFuture<'a, Result<(), AuthError>> {
    Box::pin(std::future::ready(Ok(())))
}

fn no_access<'a>() -> BoxFuture<'a, Result<Vec<AccessEntry>, AuthError>> {
    Box::pin(std::future::ready(Ok(Vec::new())))
}

/// One entity with access to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub identifier: String,
    pub role: String,
    pub provider: String,
}

/// Point-in-time inventory of the authorizable objects known locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub certificates: Vec<Object>,
    pub storage_pools: Vec<Object>,
    pub projects: Vec<Object>,
    pub images: Vec<Object>,
    pub image_aliases: Vec<Object>,
    pub instances: Vec<Object>,
    pub networks: Vec<Object>,
    pub network_acls: Vec<Object>,
    pub network_zones: Vec<Object>,
    pub network_integrations: Vec<Object>,
    pub profiles: Vec<Object>,
    pub storage_volumes: Vec<Object>,
    pub storage_buckets: Vec<Object>,
}

/// Returns all projects by ID.
pub type ProjectsGetFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<HashMap<i64, String>, AuthError>> + Send + Sync>;

/// Returns the local inventory, or `None` on members that must not sync.
pub type ResourcesFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<Resources>, AuthError>> + Send + Sync>;

/// Options handed to [`Driver::load`]. Each driver reads only the fields it
/// understands.
#[derive(Clone, Default)]
pub struct Opts {
    pub config: HashMap<String, serde_json::Value>,
    pub projects_get: Option<ProjectsGetFn>,
    pub resources: Option<ResourcesFn>,
    pub certificates: Option<Arc<CertificateCache>>,
    pub script: Option<Arc<dyn PolicyScript>>,
    /// Relationship store to use instead of one built from `config`.
    pub store: Option<Arc<dyn RelationshipStore>>,
    pub fga: FgaSettings,
}

impl Opts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver specific configuration.
    pub fn with_config(mut self, config: HashMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_projects_get_func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<i64, String>, AuthError>> + Send + 'static,
    {
        self.projects_get = Some(Arc::new(
            move || -> BoxFuture<'static, Result<HashMap<i64, String>, AuthError>> {
                Box::pin(f())
            },
        ));
        self
    }

    /// Inventory callback driving background reconciliation.
    pub fn with_resources_func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Resources>, AuthError>> + Send + 'static,
    {
        self.resources = Some(Arc::new(
            move || -> BoxFuture<'static, Result<Option<Resources>, AuthError>> { Box::pin(f()) },
        ));
        self
    }

    pub fn with_certificate_cache(mut self, cache: Arc<CertificateCache>) -> Self {
        self.certificates = Some(cache);
        self
    }

    pub fn with_script(mut self, script: Arc<dyn PolicyScript>) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_relationship_store(mut self, store: Arc<dyn RelationshipStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fga_settings(mut self, settings: FgaSettings) -> Self {
        self.fga = settings;
        self
    }

    pub(crate) fn certificate_cache(
        &self,
        driver: &str,
    ) -> Result<Arc<CertificateCache>, AuthError> {
        self.certificates
            .clone()
            .ok_or_else(|| {
                AuthError::Config(format!(
                    "The {driver} authorization driver requires a certificate cache"
                ))
            })
    }
}

/// The authorization interface consumed by request handlers.
///
/// `check_permission` returns `Ok(())` when allowed. Lifecycle notifications
/// keep external state current and default to no-ops.
pub trait Authorizer: Send + Sync {
    /// Name the driver was registered under.
    fn driver(&self) -> &str;

    /// Cancel background work. Safe to call at any time, more than once.
    fn stop_service(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        done()
    }

    fn check_permission<'a>(
        &'a self,
        request: &'a Parts,
        object: &'a Object,
        entitlement: Entitlement,
    ) -> BoxFuture<'a, Result<(), AuthError>>;

    fn get_permission_checker<'a>(
        &'a self,
        request: &'a Parts,
        entitlement: Entitlement,
        object_type: ObjectType,
    ) -> BoxFuture<'a, Result<PermissionChecker, AuthError>>;

    fn add_project<'a>(
        &'a self,
        _project_id: i64,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_project<'a>(
        &'a self,
        _project_id: i64,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_project<'a>(
        &'a self,
        _project_id: i64,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_certificate<'a>(
        &'a self,
        _fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_certificate<'a>(
        &'a self,
        _fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_storage_pool<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_storage_pool<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_image<'a>(
        &'a self,
        _project: &'a str,
        _fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_image<'a>(
        &'a self,
        _project: &'a str,
        _fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_image_alias<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_image_alias<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_image_alias<'a>(
        &'a self,
        _project: &'a str,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_instance<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_instance<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_instance<'a>(
        &'a self,
        _project: &'a str,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_network<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_network<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_network<'a>(
        &'a self,
        _project: &'a str,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_network_zone<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_network_zone<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_network_integration<'a>(
        &'a self,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_network_integration<'a>(
        &'a self,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_network_integration<'a>(
        &'a self,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_network_acl<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_network_acl<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_network_acl<'a>(
        &'a self,
        _project: &'a str,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_profile<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_profile<'a>(
        &'a self,
        _project: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_profile<'a>(
        &'a self,
        _project: &'a str,
        _old_name: &'a str,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_storage_volume<'a>(
        &'a self,
        _volume: VolumeRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_storage_volume<'a>(
        &'a self,
        _volume: VolumeRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn rename_storage_volume<'a>(
        &'a self,
        _volume: VolumeRef<'a>,
        _new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn add_storage_bucket<'a>(
        &'a self,
        _bucket: BucketRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    fn delete_storage_bucket<'a>(
        &'a self,
        _bucket: BucketRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        done()
    }

    /// Entities with access to an instance.
    fn get_instance_access<'a>(
        &'a self,
        _project: &'a str,
        _instance: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AccessEntry>, AuthError>> {
        no_access()
    }

    /// Entities with access to a project.
    fn get_project_access<'a>(
        &'a self,
        _project: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AccessEntry>, AuthError>> {
        no_access()
    }
}

/// Identifies a storage volume in lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeRef<'a> {
    pub project: &'a str,
    pub pool: &'a str,
    pub volume_type: &'a str,
    pub name: &'a str,
    /// Cluster member, empty when not pinned.
    pub location: &'a str,
}

impl VolumeRef<'_> {
    pub fn object(&self) -> Object {
        Object::storage_volume(self.project, self.pool, self.volume_type, self.name, self.location)
    }

    pub(crate) fn renamed_object(&self, new_name: &str) -> Object {
        Object::storage_volume(self.project, self.pool, self.volume_type, new_name, self.location)
    }
}

/// Identifies a storage bucket in lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRef<'a> {
    pub project: &'a str,
    pub pool: &'a str,
    pub name: &'a str,
    /// Cluster member, empty when not pinned.
    pub location: &'a str,
}

impl BucketRef<'_> {
    pub fn object(&self) -> Object {
        Object::storage_bucket(self.project, self.pool, self.name, self.location)
    }
}

/// Construction side of a driver, used by the registry.
pub trait Driver: Authorizer {
    /// Record the registered name and set up logging.
    fn init(&mut self, name: &str);

    /// Driver specific setup. May spawn background tasks, so it must run
    /// inside a Tokio runtime.
    fn load(&mut self, opts: Opts) -> Result<(), AuthError>;

    fn into_authorizer(self: Box<Self>) -> Arc<dyn Authorizer>;
}

/// State shared by every driver: its name and its log span.
#[derive(Debug, Clone)]
pub struct Common {
    driver_name: String,
    span: tracing::Span,
}

impl Default for Common {
    fn default() -> Self {
        Self {
            driver_name: String::new(),
            span: tracing::Span::none(),
        }
    }
}

impl Common {
    pub fn init(&mut self, name: &str) {
        self.driver_name = name.to_string();
        self.span = tracing::info_span!("authorizer", driver = %name);
    }

    pub fn driver(&self) -> &str {
        &self.driver_name
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Request details, with extraction failures reported as Forbidden.
    pub fn request_details(&self, request: &Parts) -> Result<RequestDetails, AuthError> {
        RequestDetails::from_parts(request)
            .map_err(|e| AuthError::Forbidden(format!("Failed to extract request details: {e}")))
    }
}
