use authz::prelude::*;
use authz::request::{protocol, EffectiveDetails};
use authz::{AccessEntry, AuthenticatedRequest, PolicyScript, ScriptError};
use http::request::Parts;
use std::sync::{Arc, Mutex};

fn parts(uri: &str, identity: AuthenticatedRequest) -> Parts {
    http::Request::builder()
        .uri(uri)
        .extension(identity)
        .body(())
        .unwrap()
        .into_parts()
        .0
}

/// Lets `alice` view anything, fails on `instance:p1/broken`, and records
/// what it was asked.
#[derive(Default)]
struct Policy {
    seen: Mutex<Vec<(EffectiveDetails, String, String)>>,
}

impl PolicyScript for Policy {
    fn authorize(
        &self,
        details: &EffectiveDetails,
        object: &str,
        entitlement: &str,
    ) -> Result<bool, ScriptError> {
        self.seen
            .lock()
            .unwrap()
            .push((details.clone(), object.to_string(), entitlement.to_string()));

        if object == "instance:p1/broken" {
            return Err("policy crashed".into());
        }
        Ok(details.username == "alice" && entitlement == "can_view")
    }

    fn instance_access(&self, _project: &str, instance: &str) -> Result<Vec<String>, ScriptError> {
        Ok(vec![format!("owner-of-{instance}")])
    }

    fn project_access(&self, project: &str) -> Result<Vec<String>, ScriptError> {
        if project == "secret" {
            return Err("not allowed to say".into());
        }
        Ok(vec!["alice".into(), "bob".into()])
    }
}

fn load(policy: Arc<Policy>) -> Arc<dyn Authorizer> {
    DriverRegistry::builtin()
        .load("scriptlet", Opts::new().with_script(policy))
        .unwrap()
}

#[tokio::test]
async fn script_decides() {
    let policy = Arc::new(Policy::default());
    let authz = load(Arc::clone(&policy));
    let alice = parts(
        "/1.0/instances?project=p1",
        AuthenticatedRequest::new("alice", protocol::OIDC),
    );

    authz
        .check_permission(&alice, &Object::instance("p1", "c1"), Entitlement::CanView)
        .await
        .unwrap();

    let err = authz
        .check_permission(&alice, &Object::instance("p1", "c1"), Entitlement::CanEdit)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Permission denied");

    let seen = policy.seen.lock().unwrap();
    let (details, object, entitlement) = &seen[0];
    assert_eq!(details.username, "alice");
    assert_eq!(details.protocol, "oidc");
    assert_eq!(details.project_name, "p1");
    assert_eq!(object, "instance:p1/c1");
    assert_eq!(entitlement, "can_view");
}

#[tokio::test]
async fn script_sees_the_forwarded_caller() {
    let policy = Arc::new(Policy::default());
    let authz = load(Arc::clone(&policy));
    let forwarded = parts(
        "/1.0",
        AuthenticatedRequest::new("member", protocol::CLUSTER).forwarded("alice", protocol::OIDC),
    );

    authz
        .check_permission(&forwarded, &Object::server(), Entitlement::CanView)
        .await
        .unwrap();

    let seen = policy.seen.lock().unwrap();
    assert_eq!(seen[0].0.username, "alice");
    assert_eq!(seen[0].0.protocol, "oidc");
}

#[tokio::test]
async fn script_errors_are_forbidden() {
    let authz = load(Arc::new(Policy::default()));
    let alice = parts("/1.0", AuthenticatedRequest::new("alice", protocol::OIDC));

    let err = authz
        .check_permission(&alice, &Object::instance("p1", "broken"), Entitlement::CanView)
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(
        err.to_string(),
        "Authorization scriptlet execution failed with error: policy crashed"
    );
}

#[tokio::test]
async fn unix_callers_bypass_the_script() {
    let policy = Arc::new(Policy::default());
    let authz = load(Arc::clone(&policy));
    let unix = parts("/1.0", AuthenticatedRequest::new("root", protocol::UNIX));

    authz
        .check_permission(&unix, &Object::server(), Entitlement::CanEdit)
        .await
        .unwrap();
    assert!(policy.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn checker_denies_on_script_error() {
    let authz = load(Arc::new(Policy::default()));
    let alice = parts("/1.0", AuthenticatedRequest::new("alice", protocol::OIDC));

    let allowed = authz
        .get_permission_checker(&alice, Entitlement::CanView, ObjectType::Instance)
        .await
        .unwrap();
    assert!(allowed(&Object::instance("p1", "c1")));
    assert!(!allowed(&Object::instance("p1", "broken")));

    let bob = parts("/1.0", AuthenticatedRequest::new("bob", protocol::OIDC));
    let allowed = authz
        .get_permission_checker(&bob, Entitlement::CanView, ObjectType::Instance)
        .await
        .unwrap();
    assert!(!allowed(&Object::instance("p1", "c1")));
}

#[tokio::test]
async fn access_lists_come_from_the_script() {
    let authz = load(Arc::new(Policy::default()));

    let entries = authz.get_instance_access("p1", "c1").await.unwrap();
    assert_eq!(
        entries,
        vec![AccessEntry {
            identifier: "owner-of-c1".into(),
            role: "unknown".into(),
            provider: "scriptlet".into(),
        }]
    );

    let entries = authz.get_project_access("p1").await.unwrap();
    let identifiers: Vec<&str> = entries.iter().map(|e| e.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["alice", "bob"]);

    let err = authz.get_project_access("secret").await.unwrap_err();
    assert!(matches!(err, AuthError::Script(_)));
}

#[tokio::test]
async fn script_is_required() {
    let err = DriverRegistry::builtin().load("scriptlet", Opts::new()).err().unwrap();
    assert!(matches!(err, AuthError::Config(_)));
}
