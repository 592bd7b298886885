//! Built-in authorization drivers.

pub mod openfga;
pub mod scriptlet;
pub mod tls;

/// Name of the certificate driver.
pub const DRIVER_TLS: &str = "tls";
/// Name of the relationship store driver.
pub const DRIVER_OPENFGA: &str = "openfga";
/// Name of the policy script driver.
pub const DRIVER_SCRIPTLET: &str = "scriptlet";
