//! Canonical string identities of authorizable resources.
//!
//! An [`Object`] is always of the form `<type>:<identifier>` where the
//! identifier is a `/` delimited path of elements. For project-scoped types the
//! first element is the project. A literal `/` inside an element is written as
//! `%2F`.
//!
//! - `instance:default/c1`: instance `c1` in project `default`
//! - `storage_pool:local`: storage pool `local`
//! - `storage_volume:default/local/custom/vol1`: custom volume `vol1` on pool
//!   `local` in project `default`

use crate::error::ObjectError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TYPE_DELIMITER: char = ':';
const ELEMENT_DELIMITER: char = '/';
const ESCAPED_DELIMITER: &str = "%2F";

/// Fixed name of the single server object.
pub const SERVER_NAME: &str = "incus";

/// The kind of resource an [`Object`] identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    User,
    Server,
    Certificate,
    StoragePool,
    Project,
    Image,
    ImageAlias,
    Instance,
    Network,
    NetworkAcl,
    NetworkIntegration,
    NetworkZone,
    Profile,
    StorageBucket,
    StorageVolume,
}

/// Arity and project rule of an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    pub min_elements: usize,
    pub max_elements: usize,
    pub requires_project: bool,
}

const fn rule(min_elements: usize, max_elements: usize, requires_project: bool) -> Validator {
    Validator {
        min_elements,
        max_elements,
        requires_project,
    }
}

impl ObjectType {
    /// Every object type.
    pub const ALL: [ObjectType; 15] = [
        ObjectType::User,
        ObjectType::Server,
        ObjectType::Certificate,
        ObjectType::StoragePool,
        ObjectType::Project,
        ObjectType::Image,
        ObjectType::ImageAlias,
        ObjectType::Instance,
        ObjectType::Network,
        ObjectType::NetworkAcl,
        ObjectType::NetworkIntegration,
        ObjectType::NetworkZone,
        ObjectType::Profile,
        ObjectType::StorageBucket,
        ObjectType::StorageVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Server => "server",
            ObjectType::Certificate => "certificate",
            ObjectType::StoragePool => "storage_pool",
            ObjectType::Project => "project",
            ObjectType::Image => "image",
            ObjectType::ImageAlias => "image_alias",
            ObjectType::Instance => "instance",
            ObjectType::Network => "network",
            ObjectType::NetworkAcl => "network_acl",
            ObjectType::NetworkIntegration => "network_integration",
            ObjectType::NetworkZone => "network_zone",
            ObjectType::Profile => "profile",
            ObjectType::StorageBucket => "storage_bucket",
            ObjectType::StorageVolume => "storage_volume",
        }
    }

    pub fn validator(&self) -> Validator {
        match self {
            ObjectType::User
            | ObjectType::Server
            | ObjectType::Certificate
            | ObjectType::StoragePool
            | ObjectType::NetworkIntegration => rule(1, 1, false),
            ObjectType::Project => rule(0, 0, true),
            ObjectType::Image
            | ObjectType::ImageAlias
            | ObjectType::Instance
            | ObjectType::Network
            | ObjectType::NetworkAcl
            | ObjectType::NetworkZone
            | ObjectType::Profile => rule(1, 1, true),
            ObjectType::StorageBucket => rule(2, 3, true),
            ObjectType::StorageVolume => rule(3, 4, true),
        }
    }

    pub fn requires_project(&self) -> bool {
        self.validator().requires_project
    }

    fn check(&self, project: &str, elements: usize) -> Result<(), ObjectError> {
        let v = self.validator();
        if v.requires_project && project.is_empty() {
            return Err(ObjectError::MissingProject(self.as_str()));
        }

        if elements < v.min_elements || elements > v.max_elements {
            return Err(ObjectError::InvalidArity {
                object_type: self.as_str(),
                min: v.min_elements,
                max: v.max_elements,
                actual: elements,
            });
        }

        Ok(())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ObjectError::UnknownObjectType(s.to_string()))
    }
}

/// An authorization object: an immutable, validated `type:identifier` string.
///
/// Build with [`Object::new`] or the typed constructors; parse with
/// [`Object::from_string`]. Serializes as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Object {
    raw: String,
    object_type: ObjectType,
}

fn escape(s: &str) -> String {
    s.replace(ELEMENT_DELIMITER, ESCAPED_DELIMITER)
}

fn unescape(s: &str) -> String {
    s.replace(ESCAPED_DELIMITER, "/")
}

impl Object {
    /// Build an object of the given type, escaping each element.
    ///
    /// `project` is ignored for types that are not project-scoped.
    ///
    /// ```
    /// use authz::{Object, ObjectType};
    ///
    /// let obj = Object::new(ObjectType::Instance, "default", &["c1"]).unwrap();
    /// assert_eq!(obj.as_str(), "instance:default/c1");
    /// ```
    pub fn new(
        object_type: ObjectType,
        project: &str,
        elements: &[&str],
    ) -> Result<Self, ObjectError> {
        object_type.check(project, elements.len())?;
        Ok(Self::build(object_type, project, elements))
    }

    /// Join without validating. Used by the typed constructors whose shape is
    /// fixed by their signature.
    fn build(object_type: ObjectType, project: &str, elements: &[&str]) -> Self {
        let mut raw = String::from(object_type.as_str());
        raw.push(TYPE_DELIMITER);

        let mut parts: Vec<String> = Vec::with_capacity(elements.len() + 1);
        if object_type.requires_project() {
            parts.push(escape(project));
        }
        parts.extend(elements.iter().map(|e| escape(e)));
        raw.push_str(&parts.join("/"));

        Self { raw, object_type }
    }

    /// Parse and validate an object string.
    ///
    /// Escaping is not re-checked: a string is accepted as given as long as
    /// its type is known and its arity and project rule hold.
    pub fn from_string(s: &str) -> Result<Self, ObjectError> {
        let (type_str, _) = s.split_once(TYPE_DELIMITER).unwrap_or((s, ""));
        let object_type: ObjectType = type_str.parse()?;

        let object = Self {
            raw: s.to_string(),
            object_type,
        };
        let (project, elements) = object.project_and_elements();
        object_type.check(&project, elements.len())?;

        Ok(object)
    }

    fn identifier(&self) -> &str {
        self.raw
            .split_once(TYPE_DELIMITER)
            .map(|(_, identifier)| identifier)
            .unwrap_or("")
    }

    fn project_and_elements(&self) -> (String, Vec<String>) {
        let mut components = self.identifier().split(ELEMENT_DELIMITER);
        let project = if self.object_type.requires_project() {
            components.next().map(unescape).unwrap_or_default()
        } else {
            String::new()
        };

        (project, components.map(unescape).collect())
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// The project, or an empty string for types that are not project-scoped.
    pub fn project(&self) -> String {
        self.project_and_elements().0
    }

    /// The unescaped elements following the project.
    pub fn elements(&self) -> Vec<String> {
        self.project_and_elements().1
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn user(name: &str) -> Self {
        Self::build(ObjectType::User, "", &[name])
    }

    /// The single server object, `server:incus`.
    pub fn server() -> Self {
        Self::build(ObjectType::Server, "", &[SERVER_NAME])
    }

    pub fn certificate(fingerprint: &str) -> Self {
        Self::build(ObjectType::Certificate, "", &[fingerprint])
    }

    pub fn storage_pool(name: &str) -> Self {
        Self::build(ObjectType::StoragePool, "", &[name])
    }

    pub fn network_integration(name: &str) -> Self {
        Self::build(ObjectType::NetworkIntegration, "", &[name])
    }

    /// The object for project `name` (`project:<name>`).
    ///
    /// `name` must be non-empty. Use [`Object::new`] for names that have not
    /// been validated.
    pub fn new_project(name: &str) -> Self {
        Self::build(ObjectType::Project, name, &[])
    }

    pub fn image(project: &str, fingerprint: &str) -> Self {
        Self::build(ObjectType::Image, project, &[fingerprint])
    }

    pub fn image_alias(project: &str, name: &str) -> Self {
        Self::build(ObjectType::ImageAlias, project, &[name])
    }

    pub fn instance(project: &str, name: &str) -> Self {
        Self::build(ObjectType::Instance, project, &[name])
    }

    pub fn network(project: &str, name: &str) -> Self {
        Self::build(ObjectType::Network, project, &[name])
    }

    pub fn network_acl(project: &str, name: &str) -> Self {
        Self::build(ObjectType::NetworkAcl, project, &[name])
    }

    pub fn network_zone(project: &str, name: &str) -> Self {
        Self::build(ObjectType::NetworkZone, project, &[name])
    }

    pub fn profile(project: &str, name: &str) -> Self {
        Self::build(ObjectType::Profile, project, &[name])
    }

    /// A storage bucket. An empty `location` is left out.
    pub fn storage_bucket(project: &str, pool: &str, bucket: &str, location: &str) -> Self {
        if location.is_empty() {
            Self::build(ObjectType::StorageBucket, project, &[pool, bucket])
        } else {
            Self::build(ObjectType::StorageBucket, project, &[pool, bucket, location])
        }
    }

    /// A storage volume. An empty `location` is left out.
    pub fn storage_volume(
        project: &str,
        pool: &str,
        volume_type: &str,
        name: &str,
        location: &str,
    ) -> Self {
        if location.is_empty() {
            Self::build(ObjectType::StorageVolume, project, &[pool, volume_type, name])
        } else {
            Self::build(ObjectType::StorageVolume, project, &[pool, volume_type, name, location])
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Object {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Object {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Object::from_string(s)
    }
}

impl TryFrom<String> for Object {
    type Error = ObjectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Object::from_string(&s)
    }
}

impl From<Object> for String {
    fn from(object: Object) -> Self {
        object.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_names_are_required() {
        assert!(matches!(
            Object::new(ObjectType::Project, "", &[]),
            Err(ObjectError::MissingProject(_))
        ));
        assert!(Object::from_string("project:").is_err());

        let project = Object::new_project("p1");
        assert_eq!(Object::from_string(project.as_str()).unwrap(), project);
    }

    #[test]
    fn instance_example() {
        let obj = Object::new(ObjectType::Instance, "default", &["c1"]).unwrap();
        assert_eq!(obj.as_str(), "instance:default/c1");

        let parsed = Object::from_string(obj.as_str()).unwrap();
        assert_eq!(parsed.object_type(), ObjectType::Instance);
        assert_eq!(parsed.project(), "default");
        assert_eq!(parsed.elements(), vec!["c1"]);
    }

    #[test]
    fn slashes_are_escaped_and_recovered() {
        let obj = Object::new(
            ObjectType::StorageVolume,
            "proj1",
            &["pool1", "custom", "vol/with/slash"],
        )
        .unwrap();
        assert_eq!(obj.as_str(), "storage_volume:proj1/pool1/custom/vol%2Fwith%2Fslash");

        let parsed = Object::from_string(obj.as_str()).unwrap();
        assert_eq!(parsed.project(), "proj1");
        assert_eq!(parsed.elements(), vec!["pool1", "custom", "vol/with/slash"]);
    }

    #[test]
    fn round_trip_every_type() {
        let cases: Vec<(ObjectType, &str, Vec<&str>)> = vec![
            (ObjectType::User, "", vec!["alice"]),
            (ObjectType::Server, "", vec!["incus"]),
            (ObjectType::Certificate, "", vec!["abcdef"]),
            (ObjectType::StoragePool, "", vec!["local/fast"]),
            (ObjectType::NetworkIntegration, "", vec!["ovn-ic"]),
            (ObjectType::Project, "my/project", vec![]),
            (ObjectType::Image, "p", vec!["fp"]),
            (ObjectType::ImageAlias, "p", vec!["ubuntu/24.04"]),
            (ObjectType::Instance, "p", vec!["c1"]),
            (ObjectType::Network, "p", vec!["br0"]),
            (ObjectType::NetworkAcl, "p", vec!["acl"]),
            (ObjectType::NetworkZone, "p", vec!["example.org"]),
            (ObjectType::Profile, "p", vec!["default"]),
            (ObjectType::StorageBucket, "p", vec!["pool", "bucket"]),
            (ObjectType::StorageBucket, "p", vec!["pool", "bucket", "node1"]),
            (ObjectType::StorageVolume, "p", vec!["pool", "custom", "v"]),
            (ObjectType::StorageVolume, "p", vec!["pool", "custom", "v/1", "node1"]),
        ];

        for (object_type, project, elements) in cases {
            let obj = Object::new(object_type, project, &elements).unwrap();
            let parsed: Object = obj.as_str().parse().unwrap();
            assert_eq!(parsed, obj);
            assert_eq!(parsed.object_type(), object_type);
            assert_eq!(parsed.project(), project);
            assert_eq!(parsed.elements(), elements);
        }
    }

    #[test]
    fn project_requires_a_name() {
        let err = Object::new(ObjectType::Project, "", &[]).unwrap_err();
        assert_eq!(err, ObjectError::MissingProject("project"));
        assert_eq!(err.to_string(), "Authorization objects of type \"project\" require a project");
    }

    #[test]
    fn storage_volume_arity() {
        assert!(matches!(
            Object::new(ObjectType::StorageVolume, "p", &["pool", "custom"]),
            Err(ObjectError::InvalidArity { min: 3, actual: 2, .. })
        ));
        assert!(matches!(
            Object::new(ObjectType::StorageVolume, "p", &["pool", "custom", "v", "node", "extra"]),
            Err(ObjectError::InvalidArity { max: 4, actual: 5, .. })
        ));
    }

    #[test]
    fn parsing_rejects_unknown_types_and_bad_arity() {
        assert_eq!(
            Object::from_string("document:1").unwrap_err(),
            ObjectError::UnknownObjectType("document".into())
        );
        assert!(Object::from_string("no-delimiter").is_err());
        assert!(Object::from_string("project:").is_err());
        assert!(Object::from_string("project:default/extra").is_err());
        assert!(Object::from_string("storage_volume:p/pool/custom").is_err());
    }

    #[test]
    fn project_is_ignored_for_server_scoped_types() {
        let obj = Object::new(ObjectType::Certificate, "ignored", &["fp"]).unwrap();
        assert_eq!(obj.as_str(), "certificate:fp");
        assert_eq!(obj.project(), "");
    }

    #[test]
    fn typed_constructors() {
        assert_eq!(Object::server().as_str(), "server:incus");
        assert_eq!(Object::user("alice").as_str(), "user:alice");
        assert_eq!(Object::new_project("default").as_str(), "project:default");
        assert_eq!(
            Object::storage_volume("default", "local", "custom", "vol1", "").as_str(),
            "storage_volume:default/local/custom/vol1"
        );
        assert_eq!(
            Object::storage_bucket("default", "local", "b1", "node2").as_str(),
            "storage_bucket:default/local/b1/node2"
        );
    }

    #[test]
    fn serde_uses_the_string_form() {
        let obj = Object::instance("default", "c1");
        assert_eq!(serde_json::to_string(&obj).unwrap(), "\"instance:default/c1\"");

        let back: Object = serde_json::from_str("\"instance:default/c1\"").unwrap();
        assert_eq!(back, obj);

        assert!(serde_json::from_str::<Object>("\"instance:default\"").is_err());
    }

    #[test]
    fn object_type_parsing() {
        for t in ObjectType::ALL {
            assert_eq!(t.as_str().parse::<ObjectType>().unwrap(), t);
        }
        assert!("volume".parse::<ObjectType>().is_err());
    }
}
