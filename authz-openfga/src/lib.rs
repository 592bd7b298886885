//! OpenFGA relationship store client.
//!
//! This crate talks to an [OpenFGA](https://openfga.dev/) server, the
//! Zanzibar-style store backing the `openfga` authorization driver:
//!
//! - **Users** have **relations** to **objects**
//! - Example: `user:alice` has `can_view` on `instance:default/c1`
//!
//! # Architecture
//!
//! - **[`RelationshipStore`]**: the operations the authorizer consumes
//!   (check, list objects, tuple writes, model read/upload). Object-safe so
//!   drivers can hold an `Arc<dyn RelationshipStore>`.
//! - **[`HttpBackend`]**: the production implementation over the OpenFGA
//!   HTTP API.
//! - **[`MockBackend`]**: an in-memory store for tests, with failure
//!   injection.
//! - **[`write_tuples`]**: non-transactional batched writer: chunked
//!   requests, bounded parallelism, per-tuple failure reporting.
//! - **[`AuthorizationModel`]**: the built-in model and drift detection
//!   against whatever the store currently holds.
//!
//! # Setup
//!
//! ```ignore
//! use authz_openfga::{HttpBackend, OpenFgaConfig, RelationshipStore};
//!
//! let config = OpenFgaConfig::from_map(&server_config)?;
//! let backend = HttpBackend::new(&config)?;
//!
//! let allowed = backend.check("user:alice", "can_view", "project:default").await?;
//! ```
//!
//! # Testing
//!
//! ```
//! use authz_openfga::MockBackend;
//!
//! let mock = MockBackend::new();
//! mock.add_tuple("server:incus", "server", "certificate:abcd");
//! assert_eq!(mock.objects_for("server:incus", "server", "certificate"), vec!["certificate:abcd"]);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod tuple;

// Re-exports
pub use backend::{BoxFuture, HttpBackend, MockBackend, RelationshipStore};
pub use config::OpenFgaConfig;
pub use error::{OpenFgaError, TupleFailure};
pub use model::{AuthorizationModel, ModelAction};
pub use tuple::{write_tuples, TupleKey, WriteOptions};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::RelationshipStore;
    pub use crate::config::OpenFgaConfig;
    pub use crate::error::OpenFgaError;
    pub use crate::tuple::TupleKey;
}
