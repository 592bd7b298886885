//! Driver lookup by name.

use crate::authorizer::{Authorizer, Driver, Opts};
use crate::driver::openfga::OpenFga;
use crate::driver::scriptlet::Scriptlet;
use crate::driver::tls::Tls;
use crate::driver::{DRIVER_OPENFGA, DRIVER_SCRIPTLET, DRIVER_TLS};
use crate::error::AuthError;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an unloaded driver.
pub type DriverConstructor = fn() -> Box<dyn Driver>;

/// Maps driver names to constructors.
///
/// Built once at startup and passed to whoever loads the authorizer.
///
/// # Example
///
/// ```ignore
/// use authz::{DriverRegistry, Opts};
///
/// let registry = DriverRegistry::builtin();
/// let authorizer = registry.load("tls", Opts::new().with_certificate_cache(cache))?;
/// authorizer.check_permission(&parts, &object, Entitlement::CanView).await?;
/// ```
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// A registry holding the `tls`, `openfga` and `scriptlet` drivers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DRIVER_TLS, || -> Box<dyn Driver> { Box::new(Tls::default()) });
        registry.register(DRIVER_OPENFGA, || -> Box<dyn Driver> { Box::new(OpenFga::default()) });
        registry.register(DRIVER_SCRIPTLET, || -> Box<dyn Driver> {
            Box::new(Scriptlet::default())
        });
        registry
    }

    /// Register (or replace) a driver.
    pub fn register(&mut self, name: impl Into<String>, constructor: DriverConstructor) {
        self.drivers.insert(name.into(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct, initialize and load the named driver.
    ///
    /// Drivers with background work spawn it here, so this must run inside a
    /// Tokio runtime.
    pub fn load(&self, name: &str, opts: Opts) -> Result<Arc<dyn Authorizer>, AuthError> {
        let constructor = self
            .drivers
            .get(name)
            .ok_or_else(|| AuthError::UnknownDriver(name.to_string()))?;

        let mut driver = constructor();
        driver.init(name);
        driver.load(opts)?;

        tracing::debug!(driver = name, "Authorizer loaded");
        Ok(driver.into_authorizer())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Load `name` from the built-in drivers.
pub fn load_authorizer(name: &str, opts: Opts) -> Result<Arc<dyn Authorizer>, AuthError> {
    DriverRegistry::builtin().load(name, opts)
}
