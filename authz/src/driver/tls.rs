//! Certificate based authorization.
//!
//! Decisions are made locally from the trusted certificate cache: clients
//! with unrestricted certificates are administrators, restricted ones only
//! reach the projects they are listed for.

use crate::authorizer::{allow_all, Authorizer, BoxFuture, Common, Driver, Opts, PermissionChecker};
use crate::certificate::{CertificateAccess, CertificateCache, CertificateType};
use crate::entitlement::Entitlement;
use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use crate::request::{protocol, RequestDetails};
use http::request::Parts;
use std::sync::Arc;

const RESTRICTED: &str = "Certificate is restricted";

/// The `tls` driver.
#[derive(Default)]
pub struct Tls {
    common: Common,
    certificates: Arc<CertificateCache>,
}

impl Tls {
    /// A driver sharing another driver's identity, for delegation.
    pub(crate) fn embedded(common: Common, certificates: Arc<CertificateCache>) -> Self {
        Self { common, certificates }
    }

    fn access(&self, fingerprint: &str) -> Result<CertificateAccess, AuthError> {
        self.certificates
            .access(fingerprint)
            .ok_or_else(|| AuthError::forbidden("Client certificate not found"))
    }

    /// Whether a non-TLS caller should be waved through.
    fn foreign_protocol(&self, details: &RequestDetails) -> bool {
        let protocol = details.authentication_protocol();
        if protocol == protocol::TLS {
            return false;
        }

        // Without a matching authorization driver, authenticated users get
        // full access.
        tracing::warn!(
            parent: self.common.span(),
            protocol = %protocol,
            "Authentication protocol is not compatible with authorization driver"
        );
        true
    }

    pub(crate) fn check(
        &self,
        details: &RequestDetails,
        object: &Object,
        entitlement: Entitlement,
    ) -> Result<(), AuthError> {
        if details.is_internal_or_unix() || self.foreign_protocol(details) {
            return Ok(());
        }

        let (certificate_type, projects) = match self.access(details.username())? {
            CertificateAccess::Unrestricted => return Ok(()),
            CertificateAccess::Restricted {
                certificate_type,
                projects,
            } => (certificate_type, projects),
        };

        if certificate_type == CertificateType::Metrics
            && entitlement == Entitlement::CanViewMetrics
        {
            return Ok(());
        }

        // Only administrators may use all-projects.
        if details.is_all_projects_request {
            return Err(AuthError::forbidden(RESTRICTED));
        }

        match object.object_type() {
            ObjectType::Server if entitlement.is_server_view() => return Ok(()),
            ObjectType::StoragePool | ObjectType::Certificate
                if entitlement == Entitlement::CanView =>
            {
                return Ok(())
            }
            ObjectType::Server | ObjectType::StoragePool | ObjectType::Certificate => {
                return Err(AuthError::forbidden(RESTRICTED))
            }
            ObjectType::Project if entitlement == Entitlement::CanEdit => {
                return Err(AuthError::forbidden(RESTRICTED))
            }
            _ => {}
        }

        let project = object.project();
        if !projects.contains(&project) {
            return Err(AuthError::Forbidden(format!(
                "User does not have permission for project {project:?}"
            )));
        }

        Ok(())
    }

    pub(crate) fn checker(
        &self,
        details: &RequestDetails,
        entitlement: Entitlement,
        object_type: ObjectType,
    ) -> Result<PermissionChecker, AuthError> {
        if details.is_internal_or_unix() || self.foreign_protocol(details) {
            return Ok(allow_all(true));
        }

        let (certificate_type, projects) = match self.access(details.username())? {
            CertificateAccess::Unrestricted => return Ok(allow_all(true)),
            CertificateAccess::Restricted {
                certificate_type,
                projects,
            } => (certificate_type, projects),
        };

        let in_request_project = projects.contains(&details.project_name);
        let in_projects = move |object: &Object| projects.contains(&object.project());

        if certificate_type == CertificateType::Metrics
            && entitlement == Entitlement::CanViewMetrics
        {
            return Ok(Box::new(in_projects));
        }

        match object_type {
            ObjectType::Server if entitlement.is_server_view() => return Ok(allow_all(true)),
            ObjectType::StoragePool | ObjectType::Certificate
                if entitlement == Entitlement::CanView =>
            {
                return Ok(allow_all(true))
            }
            ObjectType::Server | ObjectType::StoragePool | ObjectType::Certificate => {
                return Err(AuthError::forbidden(RESTRICTED))
            }
            _ => {}
        }

        // Project listings are filtered rather than refused.
        if !details.is_all_projects_request
            && object_type != ObjectType::Project
            && !in_request_project
        {
            return Err(AuthError::Forbidden(format!(
                "User does not have permissions for project {:?}",
                details.project_name
            )));
        }

        Ok(Box::new(in_projects))
    }
}

impl Authorizer for Tls {
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
            self.check(&details, object, entitlement)
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
            self.checker(&details, entitlement, object_type)
        })
    }
}

impl Driver for Tls {
    fn init(&mut self, name: &str) {
        self.common.init(name);
    }

    fn load(&mut self, opts: Opts) -> Result<(), AuthError> {
        self.certificates = opts.certificate_cache("TLS")?;
        Ok(())
    }

    fn into_authorizer(self: Box<Self>) -> Arc<dyn Authorizer> {
        Arc::new(*self)
    }
}
