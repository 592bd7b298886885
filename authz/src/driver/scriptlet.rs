//! Authorization delegated to an externally loaded policy script.

use crate::authorizer::{
    allow_all, AccessEntry, Authorizer, BoxFuture, Common, Driver, Opts, PermissionChecker,
};
use crate::entitlement::Entitlement;
use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use crate::request::EffectiveDetails;
use http::request::Parts;
use std::sync::Arc;

/// Error raised by a policy script.
pub type ScriptError = Box<dyn std::error::Error + Send + Sync>;

/// A loaded policy script.
pub trait PolicyScript: Send + Sync {
    /// Decide whether the caller has `entitlement` on `object`.
    fn authorize(
        &self,
        details: &EffectiveDetails,
        object: &str,
        entitlement: &str,
    ) -> Result<bool, ScriptError>;

    /// Identifiers with access to an instance, if the script reports them.
    fn instance_access(&self, _project: &str, _instance: &str) -> Result<Vec<String>, ScriptError> {
        Ok(Vec::new())
    }

    /// Identifiers with access to a project, if the script reports them.
    fn project_access(&self, _project: &str) -> Result<Vec<String>, ScriptError> {
        Ok(Vec::new())
    }
}

fn access_entries(identifiers: Vec<String>) -> Vec<AccessEntry> {
    identifiers
        .into_iter()
        .map(|identifier| AccessEntry {
            identifier,
            role: "unknown".into(),
            provider: "scriptlet".into(),
        })
        .collect()
}

/// The `scriptlet` driver.
#[derive(Default)]
pub struct Scriptlet {
    common: Common,
    script: Option<Arc<dyn PolicyScript>>,
}

impl Scriptlet {
    fn script(&self) -> Result<&Arc<dyn PolicyScript>, AuthError> {
        self.script
            .as_ref()
            .ok_or_else(|| AuthError::Script("no policy script loaded".into()))
    }
}

impl Authorizer for Scriptlet {
    fn driver(&self) -> &str {
        self.common.driver()
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

            let authorized = self
                .script()
                .and_then(|script| {
                    script
                        .authorize(&details.effective(), object.as_str(), entitlement.as_str())
                        .map_err(|e| AuthError::Script(e.to_string()))
                })
                .map_err(|e| AuthError::Forbidden(e.to_string()))?;

            if !authorized {
                return Err(AuthError::forbidden("Permission denied"));
            }

            Ok(())
        })
    }

    fn get_permission_checker<'a>(
        &'a self,
        request: &'a Parts,
        entitlement: Entitlement,
        _object_type: ObjectType,
    ) -> BoxFuture<'a, Result<PermissionChecker, AuthError>> {
        Box::pin(async move {
            let details = self.common.request_details(request)?;
            if details.is_internal_or_unix() {
                return Ok(allow_all(true));
            }

            let script = Arc::clone(self.script()?);
            let effective = details.effective();
            let span = self.common.span().clone();

            let checker: PermissionChecker = Box::new(move |object: &Object| {
                match script.authorize(&effective, object.as_str(), entitlement.as_str()) {
                    Ok(authorized) => authorized,
                    Err(e) => {
                        tracing::error!(
                            parent: &span,
                            error = %e,
                            object = %object,
                            "Authorization scriptlet execution failed"
                        );
                        false
                    }
                }
            });

            Ok(checker)
        })
    }

    fn get_instance_access<'a>(
        &'a self,
        project: &'a str,
        instance: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AccessEntry>, AuthError>> {
        Box::pin(async move {
            let identifiers = self
                .script()?
                .instance_access(project, instance)
                .map_err(|e| AuthError::Script(e.to_string()))?;
            Ok(access_entries(identifiers))
        })
    }

    fn get_project_access<'a>(
        &'a self,
        project: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AccessEntry>, AuthError>> {
        Box::pin(async move {
            let identifiers = self
                .script()?
                .project_access(project)
                .map_err(|e| AuthError::Script(e.to_string()))?;
            Ok(access_entries(identifiers))
        })
    }
}

impl Driver for Scriptlet {
    fn init(&mut self, name: &str) {
        self.common.init(name);
    }

    fn load(&mut self, opts: Opts) -> Result<(), AuthError> {
        let script = opts.script.ok_or_else(|| {
            AuthError::Config("The scriptlet authorization driver requires a policy script".into())
        })?;
        self.script = Some(script);
        Ok(())
    }

    fn into_authorizer(self: Box<Self>) -> Arc<dyn Authorizer> {
        Arc::new(*self)
    }
}
