//! Authorization core: decides whether a caller may perform an action on a
//! resource.
//!
//! # Overview
//!
//! - **[`Object`]**: canonical `type:project/elem/...` identity of a resource
//! - **[`Entitlement`]**: the permission verbs
//! - **[`Authorizer`]**: the contract every driver implements: single object
//!   checks, bulk permission checkers and lifecycle notifications
//! - **[`DriverRegistry`]**: builds a driver by name
//!
//! Three drivers are provided:
//!
//! - `tls`: local decisions from the trusted certificate cache
//! - `openfga`: relationship based decisions from an OpenFGA server, with
//!   background model reconciliation and hourly tuple sync
//! - `scriptlet`: decisions delegated to a policy script
//!
//! # Usage
//!
//! ```ignore
//! use authz::{DriverRegistry, Entitlement, Object, Opts};
//!
//! let authorizer = DriverRegistry::builtin().load(
//!     "openfga",
//!     Opts::new()
//!         .with_config(server_config)
//!         .with_certificate_cache(certificates.clone())
//!         .with_resources_func(move || inventory.snapshot()),
//! )?;
//!
//! // In a handler, after authentication has attached an AuthenticatedRequest:
//! authorizer
//!     .check_permission(&parts, &Object::instance("default", "c1"), Entitlement::CanExec)
//!     .await?;
//!
//! // Filtering a listing:
//! let allowed = authorizer
//!     .get_permission_checker(&parts, Entitlement::CanView, ObjectType::Instance)
//!     .await?;
//! instances.retain(|i| allowed(&Object::instance(&i.project, &i.name)));
//! ```

pub mod authorizer;
pub mod certificate;
pub mod driver;
pub mod entitlement;
pub mod error;
pub mod object;
pub mod registry;
pub mod request;

// Re-exports
pub use authorizer::{
    allow_all, AccessEntry, Authorizer, BucketRef, Common, Driver, Opts, PermissionChecker,
    Resources, VolumeRef,
};
pub use certificate::{CertificateAccess, CertificateCache, CertificateType};
pub use driver::openfga::{FgaSettings, OpenFga, SyncReport};
pub use driver::scriptlet::{PolicyScript, Scriptlet, ScriptError};
pub use driver::tls::Tls;
pub use entitlement::Entitlement;
pub use error::{AuthError, ObjectError};
pub use object::{Object, ObjectType};
pub use registry::{load_authorizer, DriverRegistry};
pub use request::{
    object_from_request, AuthenticatedRequest, NoExpansion, ObjectExpander, RequestDetails,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::authorizer::{Authorizer, Opts};
    pub use crate::entitlement::Entitlement;
    pub use crate::error::AuthError;
    pub use crate::object::{Object, ObjectType};
    pub use crate::registry::DriverRegistry;
}
