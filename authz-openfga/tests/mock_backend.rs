use authz_openfga::{AuthorizationModel, MockBackend, OpenFgaError, RelationshipStore, TupleKey};

#[test]
fn test_mock_backend_tuples() {
    let backend = MockBackend::new();
    backend.add_tuple("user:alice", "can_view", "project:default");

    assert!(backend.has_tuple("user:alice", "can_view", "project:default"));
    assert!(!backend.has_tuple("user:bob", "can_view", "project:default"));

    backend.remove_tuple("user:alice", "can_view", "project:default");
    assert_eq!(backend.tuple_count(), 0);
}

#[tokio::test]
async fn test_mock_backend_check_and_list() {
    let backend = MockBackend::new();
    backend.add_tuple("user:alice", "can_view", "instance:default/c1");
    backend.add_tuple("user:alice", "can_view", "instance:p1/c2");
    backend.add_tuple("user:alice", "can_edit", "instance:p1/c3");

    assert!(backend.check("user:alice", "can_view", "instance:default/c1").await.unwrap());
    assert!(!backend.check("user:alice", "can_edit", "instance:default/c1").await.unwrap());

    let objects = backend.list_objects("user:alice", "can_view", "instance").await.unwrap();
    assert_eq!(objects, vec!["instance:default/c1", "instance:p1/c2"]);
    assert_eq!(backend.check_calls(), 2);
    assert_eq!(backend.list_calls(), 1);
}

#[tokio::test]
async fn test_mock_backend_rejects_duplicate_write_and_missing_delete() {
    let backend = MockBackend::new();
    let tuple = TupleKey::new("server:incus", "server", "certificate:fp1");

    backend.write(std::slice::from_ref(&tuple), &[]).await.unwrap();
    assert!(backend.write(std::slice::from_ref(&tuple), &[]).await.is_err());

    backend.write(&[], std::slice::from_ref(&tuple)).await.unwrap();
    assert!(backend.write(&[], std::slice::from_ref(&tuple)).await.is_err());

    assert_eq!(backend.write_calls(), 4);
    assert_eq!(backend.write_log().len(), 2);
}

#[tokio::test]
async fn test_mock_backend_offline() {
    let backend = MockBackend::new();
    backend.set_offline(true);

    let err = backend.check("user:alice", "can_view", "project:default").await.unwrap_err();
    assert!(matches!(err, OpenFgaError::ConnectionFailed(_)));
    assert!(backend.read_latest_model().await.is_err());

    backend.set_offline(false);
    assert!(backend.read_latest_model().await.unwrap().is_none());
}

#[tokio::test]
async fn test_mock_backend_model_upload() {
    let backend = MockBackend::new();
    let builtin = AuthorizationModel::builtin().unwrap();

    let id = backend.write_model(&builtin).await.unwrap();
    assert_eq!(id, "mock-model-1");

    let stored = backend.read_latest_model().await.unwrap().unwrap();
    assert_eq!(stored.id.as_deref(), Some("mock-model-1"));
    assert_eq!(stored.type_definitions, builtin.type_definitions);
    assert_eq!(backend.model_writes(), 1);
}

#[tokio::test]
async fn test_mock_backend_clones_share_state() {
    let backend = MockBackend::new();
    let handle = backend.clone();

    backend
        .write(&[TupleKey::new("server:incus", "server", "storage_pool:local")], &[])
        .await
        .unwrap();
    assert!(handle.has_tuple("server:incus", "server", "storage_pool:local"));
}
