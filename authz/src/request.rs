//! Per-request authentication context and object extraction.
//!
//! The authentication middleware stores an [`AuthenticatedRequest`] in the
//! request extensions. Authorizers derive [`RequestDetails`] from it once per
//! permission evaluation.

use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use http::request::Parts;
use serde::Serialize;
use std::collections::HashMap;

/// API version prefix used by request paths.
pub const API_VERSION: &str = "1.0";

/// Project used when a request names none.
pub const DEFAULT_PROJECT: &str = "default";

/// Authentication protocols.
pub mod protocol {
    /// Local unix socket.
    pub const UNIX: &str = "unix";
    /// Request forwarded by another cluster member.
    pub const CLUSTER: &str = "cluster";
    /// TLS client certificate.
    pub const TLS: &str = "tls";
    /// OpenID Connect bearer token.
    pub const OIDC: &str = "oidc";
}

/// Identity attached to a request by the authentication middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedRequest {
    /// Username, or certificate fingerprint for TLS.
    pub username: String,
    pub protocol: String,
    /// Original username when the request was forwarded within the cluster.
    pub forwarded_username: Option<String>,
    /// Original protocol when the request was forwarded within the cluster.
    pub forwarded_protocol: Option<String>,
}

impl AuthenticatedRequest {
    pub fn new(username: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            protocol: protocol.into(),
            forwarded_username: None,
            forwarded_protocol: None,
        }
    }

    /// Mark the request as forwarded on behalf of another caller.
    pub fn forwarded(mut self, username: impl Into<String>, protocol: impl Into<String>) -> Self {
        self.forwarded_username = Some(username.into());
        self.forwarded_protocol = Some(protocol.into());
        self
    }
}

/// Authentication and scope details of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    pub username: String,
    pub protocol: String,
    pub forwarded_username: String,
    pub forwarded_protocol: String,
    pub project_name: String,
    pub is_all_projects_request: bool,
}

/// The effective caller, as handed to policy scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveDetails {
    pub username: String,
    pub protocol: String,
    pub is_all_projects_request: bool,
    pub project_name: String,
}

impl RequestDetails {
    /// Extract the details from request parts.
    pub fn from_parts(parts: &Parts) -> Result<Self, AuthError> {
        let identity = parts
            .extensions
            .get::<AuthenticatedRequest>()
            .ok_or_else(|| AuthError::Request("Username not present in request context".into()))?;

        let query = query_pairs(parts);

        Ok(Self {
            username: identity.username.clone(),
            protocol: identity.protocol.clone(),
            forwarded_username: identity.forwarded_username.clone().unwrap_or_default(),
            forwarded_protocol: identity.forwarded_protocol.clone().unwrap_or_default(),
            project_name: project_param(&query),
            is_all_projects_request: query.get("all-projects").is_some_and(|v| is_true(v)),
        })
    }

    /// Requests from the local socket, or forwarded by a cluster member on
    /// behalf of one, bypass all checks.
    pub fn is_internal_or_unix(&self) -> bool {
        if self.protocol == protocol::UNIX {
            return true;
        }

        self.protocol == protocol::CLUSTER
            && matches!(
                self.forwarded_protocol.as_str(),
                "" | protocol::UNIX | protocol::CLUSTER
            )
    }

    /// The effective username.
    pub fn username(&self) -> &str {
        if self.protocol == protocol::CLUSTER && !self.forwarded_username.is_empty() {
            return &self.forwarded_username;
        }
        &self.username
    }

    /// The protocol the original caller authenticated with.
    pub fn authentication_protocol(&self) -> &str {
        if self.protocol == protocol::CLUSTER {
            return &self.forwarded_protocol;
        }
        &self.protocol
    }

    pub fn effective(&self) -> EffectiveDetails {
        EffectiveDetails {
            username: self.username().to_string(),
            protocol: self.authentication_protocol().to_string(),
            is_all_projects_request: self.is_all_projects_request,
            project_name: self.project_name.clone(),
        }
    }
}

fn query_pairs(parts: &Parts) -> HashMap<String, String> {
    // First occurrence wins.
    let mut pairs = HashMap::new();
    for (key, value) in form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes()) {
        pairs.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    pairs
}

fn project_param(query: &HashMap<String, String>) -> String {
    match query.get("project") {
        Some(project) if !project.is_empty() => project.clone(),
        _ => DEFAULT_PROJECT.to_string(),
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Resolves request values that may not name the real resource.
///
/// All methods default to returning their input unchanged.
pub trait ObjectExpander: Send + Sync {
    /// Map a project name to the project whose resources it uses.
    fn project(&self, name: &str) -> String {
        name.to_string()
    }

    /// Expand a possibly shortened image fingerprint.
    fn fingerprint(&self, _project: &str, fingerprint: &str) -> String {
        fingerprint.to_string()
    }

    /// Cluster member holding a storage volume, or empty if not pinned.
    fn volume_location(
        &self,
        _project: &str,
        _pool: &str,
        _volume_type: &str,
        _volume_name: &str,
    ) -> String {
        String::new()
    }
}

/// An [`ObjectExpander`] that changes nothing.
pub struct NoExpansion;

impl ObjectExpander for NoExpansion {}

fn path_var<'a>(path_vars: &'a HashMap<String, String>, name: &str) -> &'a str {
    path_vars.get(name).map(String::as_str).unwrap_or("")
}

/// Build the object a request targets.
///
/// `var_names` lists the path variables identifying the resource, in the
/// order they appear in the endpoint path; `path_vars` holds their decoded
/// values. The project comes from the `project` query parameter, except on
/// the projects endpoint where it is the first path variable. The pseudo
/// variable `location` is taken from the `target` query parameter.
pub fn object_from_request(
    parts: &Parts,
    object_type: ObjectType,
    expander: &dyn ObjectExpander,
    path_vars: &HashMap<String, String>,
    var_names: &[&str],
) -> Result<Object, AuthError> {
    if object_type == ObjectType::Server {
        return Ok(Object::server());
    }

    let query = query_pairs(parts);

    let mut project = project_param(&query);
    if project != DEFAULT_PROJECT {
        project = expander.project(&project);
    }

    let location = query.get("target").cloned().unwrap_or_default();

    let mut values: Vec<String> = Vec::with_capacity(var_names.len());
    for &name in var_names {
        if name == "location" {
            let value = if !location.is_empty() {
                location.clone()
            } else if object_type == ObjectType::StorageVolume {
                expander.volume_location(
                    &project,
                    path_var(path_vars, "poolName"),
                    path_var(path_vars, "type"),
                    path_var(path_vars, "volumeName"),
                )
            } else {
                String::new()
            };

            if !value.is_empty() {
                values.push(value);
            }
            continue;
        }

        let value = path_var(path_vars, name);
        if value.is_empty() {
            return Err(AuthError::Request(format!(
                "Path variable {name:?} not found for object type {:?}",
                object_type.as_str()
            )));
        }

        if name == "fingerprint" {
            values.push(expander.fingerprint(&project, value));
        } else {
            values.push(value.to_string());
        }
    }

    if object_type == ObjectType::Project
        && parts.uri.path().starts_with(&format!("/{API_VERSION}/projects"))
    {
        let name = values
            .first()
            .ok_or_else(|| AuthError::Request("Missing project name path variable".into()))?;
        return Ok(Object::new_project(name));
    }

    let elements: Vec<&str> = values.iter().map(String::as_str).collect();
    Ok(Object::new(object_type, &project, &elements)?)
}
