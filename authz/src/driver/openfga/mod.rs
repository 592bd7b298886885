//! Relationship based authorization backed by an OpenFGA server.
//!
//! Loading the driver starts a background connect loop. Until it has reached
//! the server and reconciled the authorization model, every decision fails
//! with [`AuthError::ServiceOffline`]. Once connected, an hourly sync keeps
//! the ownership tuples in line with the local inventory.
//!
//! Callers authenticated with a TLS client certificate are always decided by
//! the embedded certificate driver.

mod sync;

pub use sync::SyncReport;

use crate::authorizer::{
    allow_all, Authorizer, BoxFuture, BucketRef, Common, Driver, Opts, PermissionChecker, Resources,
    ResourcesFn, VolumeRef,
};
use crate::driver::tls::Tls;
use crate::entitlement::Entitlement;
use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use crate::request::protocol;
use authz_openfga::{
    write_tuples, AuthorizationModel, HttpBackend, ModelAction, OpenFgaConfig, OpenFgaError,
    RelationshipStore, TupleKey, WriteOptions,
};
use http::request::Parts;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Relation tying server-scoped objects to the server.
pub const RELATION_SERVER: &str = "server";
/// Relation tying project-scoped objects to their project.
pub const RELATION_PROJECT: &str = "project";
/// Relation granting users access to the server.
pub const RELATION_USER: &str = "user";

/// Timing and batching of the OpenFGA driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FgaSettings {
    /// Bound on every individual call to the store.
    pub request_timeout: Duration,
    /// Delay between connection attempts.
    pub retry_interval: Duration,
    /// Delay between resource syncs.
    pub sync_interval: Duration,
    pub write: WriteOptions,
}

impl Default for FgaSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60 * 60),
            write: WriteOptions::default(),
        }
    }
}

/// The ownership tuple of `object`: the server owns server-scoped objects and
/// projects, a project owns everything inside it.
pub fn ownership_tuple(object: &Object) -> TupleKey {
    match object.object_type() {
        t if t.requires_project() && t != ObjectType::Project => TupleKey::new(
            Object::new_project(&object.project()).as_str(),
            RELATION_PROJECT,
            object.as_str(),
        ),
        _ => TupleKey::new(Object::server().as_str(), RELATION_SERVER, object.as_str()),
    }
}

/// State shared between the driver and its background tasks.
pub(crate) struct FgaState {
    pub(crate) store: Arc<dyn RelationshipStore>,
    pub(crate) online: AtomicBool,
    pub(crate) settings: FgaSettings,
    pub(crate) span: tracing::Span,
    pub(crate) shutdown: CancellationToken,
}

impl FgaState {
    /// Run one store call under the request timeout.
    pub(crate) async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, OpenFgaError>>,
    ) -> Result<T, OpenFgaError> {
        tokio::time::timeout(self.settings.request_timeout, fut)
            .await
            .map_err(|_| OpenFgaError::Timeout)?
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Reconcile the model and start the sync loop.
    async fn connect(self: &Arc<Self>, resources: Option<ResourcesFn>) -> Result<(), AuthError> {
        let builtin = AuthorizationModel::builtin()?;

        let remote = self.call(self.store.read_latest_model()).await?;

        if AuthorizationModel::reconcile(remote.as_ref(), &builtin)? == ModelAction::Upload {
            if remote.is_some() {
                tracing::info!(
                    parent: &self.span,
                    "The OpenFGA model has changed, uploading new model"
                );
            } else {
                tracing::info!(parent: &self.span, "Uploading OpenFGA model");
            }

            let id = self.call(self.store.write_model(&builtin)).await?;
            tracing::debug!(parent: &self.span, model_id = %id, "OpenFGA model uploaded");
        }

        if let Some(resources) = resources {
            tokio::spawn(sync_loop(Arc::clone(self), resources));
        }

        Ok(())
    }

    /// Apply lifecycle tuple changes. Skipped while offline; the next full
    /// sync catches up.
    async fn update_tuples(
        &self,
        writes: Vec<TupleKey>,
        deletes: Vec<TupleKey>,
    ) -> Result<(), AuthError> {
        if !self.is_online() {
            tracing::debug!(
                parent: &self.span,
                writes = writes.len(),
                deletes = deletes.len(),
                "OpenFGA offline, skipping tuple update"
            );
            return Ok(());
        }

        if writes.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        self.call(write_tuples(&*self.store, writes, deletes, self.settings.write))
            .await?;
        Ok(())
    }
}

async fn connect_loop(state: Arc<FgaState>, resources: Option<ResourcesFn>) {
    let mut first = true;

    loop {
        if state.shutdown.is_cancelled() {
            return;
        }

        match state.connect(resources.clone()).await {
            Ok(()) => {
                state.online.store(true, Ordering::Release);
                // A stop that raced the connect wins.
                if state.shutdown.is_cancelled() {
                    state.online.store(false, Ordering::Release);
                    return;
                }
                if first {
                    tracing::debug!(parent: &state.span, "Connected to OpenFGA");
                } else {
                    tracing::info!(parent: &state.span, "Connection with OpenFGA established");
                }
                return;
            }
            Err(e) if first => {
                tracing::warn!(
                    parent: &state.span,
                    error = %e,
                    "Unable to connect to the OpenFGA server, will retry every {}s",
                    state.settings.retry_interval.as_secs()
                );
                first = false;
            }
            Err(e) => {
                tracing::debug!(
                    parent: &state.span,
                    error = %e,
                    "OpenFGA connection attempt failed"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(state.settings.retry_interval) => {}
            _ = state.shutdown.cancelled() => return,
        }
    }
}

async fn sync_loop(state: Arc<FgaState>, resources: ResourcesFn) {
    loop {
        match resources().await {
            Ok(Some(resources)) => match state.sync_resources(&resources).await {
                Ok(report) => tracing::debug!(
                    parent: &state.span,
                    writes = report.writes.len(),
                    deletes = report.deletes.len(),
                    "OpenFGA resource sync complete"
                ),
                Err(e) => tracing::error!(
                    parent: &state.span,
                    error = %e,
                    "Failed background OpenFGA resource sync"
                ),
            },
            // This member does not perform syncs.
            Ok(None) => {}
            Err(e) => tracing::error!(
                parent: &state.span,
                error = %e,
                "Failed getting local OpenFGA resources"
            ),
        }

        tokio::select! {
            _ = tokio::time::sleep(state.settings.sync_interval) => {}
            _ = state.shutdown.cancelled() => return,
        }
    }
}

/// The `openfga` driver.
#[derive(Default)]
pub struct OpenFga {
    common: Common,
    tls: Option<Tls>,
    state: Option<Arc<FgaState>>,
}

impl OpenFga {
    /// Whether the connect loop has completed.
    pub fn is_online(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_online())
    }

    /// Run one reconciliation against `resources` now.
    pub async fn sync_resources(&self, resources: &Resources) -> Result<SyncReport, AuthError> {
        self.state()?.sync_resources(resources).await
    }

    fn state(&self) -> Result<&Arc<FgaState>, AuthError> {
        self.state
            .as_ref()
            .ok_or_else(|| {
                AuthError::Config("The OpenFGA authorization driver is not loaded".into())
            })
    }

    fn tls(&self) -> Result<&Tls, AuthError> {
        self.tls
            .as_ref()
            .ok_or_else(|| {
                AuthError::Config("The OpenFGA authorization driver is not loaded".into())
            })
    }

    fn update<'a>(
        &'a self,
        writes: Vec<Object>,
        deletes: Vec<Object>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let writes = writes.iter().map(ownership_tuple).collect();
            let deletes = deletes.iter().map(ownership_tuple).collect();
            self.state()?.update_tuples(writes, deletes).await
        })
    }

    fn add(&self, object: Object) -> BoxFuture<'_, Result<(), AuthError>> {
        self.update(vec![object], vec![])
    }

    fn delete(&self, object: Object) -> BoxFuture<'_, Result<(), AuthError>> {
        self.update(vec![], vec![object])
    }

    fn rename(&self, old: Object, new: Object) -> BoxFuture<'_, Result<(), AuthError>> {
        self.update(vec![new], vec![old])
    }
}

impl Authorizer for OpenFga {
    fn driver(&self) -> &str {
        self.common.driver()
    }

    fn stop_service(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        if let Some(state) = &self.state {
            state.shutdown.cancel();
            state.online.store(false, Ordering::Release);
        }
        Box::pin(std::future::ready(Ok(())))
    }

    fn check_permission<'a>(
        &'a self,
        request: &'a Parts,
        object: &'a Object,
        entitlement: Entitlement,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async move {
            let details = self.common.request_details(request)?;
            if details.is_internal_or_unix() {
                return Ok(());
            }

            if details.authentication_protocol() == protocol::TLS {
                return self.tls()?.check(&details, object, entitlement);
            }

            let state = self.state()?;
            if !state.is_online() {
                return Err(AuthError::ServiceOffline);
            }

            let user = Object::user(details.username());
            tracing::debug!(
                parent: &state.span,
                username = details.username(),
                protocol = details.authentication_protocol(),
                object = %object,
                entitlement = %entitlement,
                url = %request.uri,
                method = %request.method,
                "Checking OpenFGA relation"
            );

            let allowed = state
                .call(state.store.check(user.as_str(), entitlement.as_str(), object.as_str()))
                .await?;

            if !allowed {
                return Err(AuthError::Forbidden(format!(
                    "User does not have entitlement {:?} on object {:?}",
                    entitlement.as_str(),
                    object.as_str()
                )));
            }

            Ok(())
        })
    }

    fn get_permission_checker<'a>(
        &'a self,
        request: &'a Parts,
        entitlement: Entitlement,
        object_type: ObjectType,
    ) -> BoxFuture<'a, Result<PermissionChecker, AuthError>> {
        Box::pin(async move {
            let details = self.common.request_details(request)?;
            if details.is_internal_or_unix() {
                return Ok(allow_all(true));
            }

            if details.authentication_protocol() == protocol::TLS {
                return self.tls()?.checker(&details, entitlement, object_type);
            }

            let state = self.state()?;
            if !state.is_online() {
                return Err(AuthError::ServiceOffline);
            }

            let user = Object::user(details.username());
            tracing::debug!(
                parent: &state.span,
                username = details.username(),
                protocol = details.authentication_protocol(),
                object_type = %object_type,
                entitlement = %entitlement,
                url = %request.uri,
                method = %request.method,
                "Listing related objects for user"
            );

            let objects: HashSet<String> = state
                .call(state.store.list_objects(
                    user.as_str(),
                    entitlement.as_str(),
                    object_type.as_str(),
                ))
                .await?
                .into_iter()
                .collect();

            let checker: PermissionChecker =
                Box::new(move |object: &Object| objects.contains(object.as_str()));
            Ok(checker)
        })
    }

    fn add_project<'a>(
        &'a self,
        _project_id: i64,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.update(vec![Object::new_project(name), Object::profile(name, "default")], vec![])
    }

    // Only empty projects can be deleted or renamed, so nothing else hangs
    // off them.
    fn delete_project<'a>(
        &'a self,
        _project_id: i64,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.update(vec![], vec![Object::profile(name, "default"), Object::new_project(name)])
    }

    fn rename_project<'a>(
        &'a self,
        _project_id: i64,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.update(
            vec![Object::new_project(new_name), Object::profile(new_name, "default")],
            vec![Object::profile(old_name, "default"), Object::new_project(old_name)],
        )
    }

    fn add_certificate<'a>(&'a self, fingerprint: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::certificate(fingerprint))
    }

    fn delete_certificate<'a>(
        &'a self,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::certificate(fingerprint))
    }

    fn add_storage_pool<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::storage_pool(name))
    }

    fn delete_storage_pool<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::storage_pool(name))
    }

    fn add_image<'a>(
        &'a self,
        project: &'a str,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::image(project, fingerprint))
    }

    fn delete_image<'a>(
        &'a self,
        project: &'a str,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::image(project, fingerprint))
    }

    fn add_image_alias<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::image_alias(project, name))
    }

    fn delete_image_alias<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::image_alias(project, name))
    }

    fn rename_image_alias<'a>(
        &'a self,
        project: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::image_alias(project, old_name), Object::image_alias(project, new_name))
    }

    fn add_instance<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::instance(project, name))
    }

    fn delete_instance<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::instance(project, name))
    }

    fn rename_instance<'a>(
        &'a self,
        project: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::instance(project, old_name), Object::instance(project, new_name))
    }

    fn add_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::network(project, name))
    }

    fn delete_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::network(project, name))
    }

    fn rename_network<'a>(
        &'a self,
        project: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::network(project, old_name), Object::network(project, new_name))
    }

    fn add_network_zone<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::network_zone(project, name))
    }

    fn delete_network_zone<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::network_zone(project, name))
    }

    fn add_network_integration<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::network_integration(name))
    }

    fn delete_network_integration<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::network_integration(name))
    }

    fn rename_network_integration<'a>(
        &'a self,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::network_integration(old_name), Object::network_integration(new_name))
    }

    fn add_network_acl<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::network_acl(project, name))
    }

    fn delete_network_acl<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::network_acl(project, name))
    }

    fn rename_network_acl<'a>(
        &'a self,
        project: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::network_acl(project, old_name), Object::network_acl(project, new_name))
    }

    fn add_profile<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(Object::profile(project, name))
    }

    fn delete_profile<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(Object::profile(project, name))
    }

    fn rename_profile<'a>(
        &'a self,
        project: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(Object::profile(project, old_name), Object::profile(project, new_name))
    }

    fn add_storage_volume<'a>(
        &'a self,
        volume: VolumeRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(volume.object())
    }

    fn delete_storage_volume<'a>(
        &'a self,
        volume: VolumeRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(volume.object())
    }

    fn rename_storage_volume<'a>(
        &'a self,
        volume: VolumeRef<'a>,
        new_name: &'a str,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.rename(volume.object(), volume.renamed_object(new_name))
    }

    fn add_storage_bucket<'a>(
        &'a self,
        bucket: BucketRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.add(bucket.object())
    }

    fn delete_storage_bucket<'a>(
        &'a self,
        bucket: BucketRef<'a>,
    ) -> BoxFuture<'a, Result<(), AuthError>> {
        self.delete(bucket.object())
    }
}

impl Driver for OpenFga {
    fn init(&mut self, name: &str) {
        self.common.init(name);
    }

    fn load(&mut self, opts: Opts) -> Result<(), AuthError> {
        let store: Arc<dyn RelationshipStore> = match opts.store.clone() {
            Some(store) => store,
            None => {
                let config = OpenFgaConfig::from_map(&opts.config)?;
                Arc::new(HttpBackend::new(&config)?)
            }
        };

        self.tls = Some(Tls::embedded(self.common.clone(), opts.certificate_cache("OpenFGA")?));

        let state = Arc::new(FgaState {
            store,
            online: AtomicBool::new(false),
            settings: opts.fga,
            span: self.common.span().clone(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(connect_loop(Arc::clone(&state), opts.resources.clone()));
        self.state = Some(state);
        Ok(())
    }

    fn into_authorizer(self: Box<Self>) -> Arc<dyn Authorizer> {
        Arc::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_follows_scope() {
        assert_eq!(
            ownership_tuple(&Object::certificate("fp1")),
            TupleKey::new("server:incus", "server", "certificate:fp1")
        );
        assert_eq!(
            ownership_tuple(&Object::new_project("p1")),
            TupleKey::new("server:incus", "server", "project:p1")
        );
        assert_eq!(
            ownership_tuple(&Object::network_integration("ic")),
            TupleKey::new("server:incus", "server", "network_integration:ic")
        );
        assert_eq!(
            ownership_tuple(&Object::storage_volume("p1", "local", "custom", "v", "")),
            TupleKey::new("project:p1", "project", "storage_volume:p1/local/custom/v")
        );
    }

    #[test]
    fn default_settings() {
        let settings = FgaSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.retry_interval, Duration::from_secs(30));
        assert_eq!(settings.sync_interval, Duration::from_secs(3600));
        assert_eq!(settings.write.max_per_chunk, 50);
        assert_eq!(settings.write.max_parallel_requests, 5);
    }
}
