//! Reconciliation of ownership tuples against the local inventory.
//!
//! Each run lists what the store currently ties to the server and to every
//! known project, diffs it against the inventory and applies the difference
//! in one non-transactional batch. Nothing is remembered between runs.

use super::{ownership_tuple, FgaState, RELATION_PROJECT, RELATION_SERVER, RELATION_USER};
use crate::authorizer::Resources;
use crate::error::AuthError;
use crate::object::{Object, ObjectType};
use authz_openfga::{write_tuples, TupleKey};
use std::collections::HashSet;

/// Project-scoped types enumerated for every remote project.
const PROJECT_TYPES: [ObjectType; 9] = [
    ObjectType::Instance,
    ObjectType::Image,
    ObjectType::ImageAlias,
    ObjectType::Network,
    ObjectType::NetworkAcl,
    ObjectType::NetworkZone,
    ObjectType::Profile,
    ObjectType::StorageVolume,
    ObjectType::StorageBucket,
];

/// Tuples written and deleted by one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub writes: Vec<TupleKey>,
    pub deletes: Vec<TupleKey>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    /// Record the difference between `remote` object strings and `local`
    /// objects of one category.
    fn diff(&mut self, remote: &[String], local: &[&Object]) -> Result<(), AuthError> {
        let remote_set: HashSet<&str> = remote.iter().map(String::as_str).collect();
        let local_set: HashSet<&str> = local.iter().map(|o| o.as_str()).collect();

        let mut seen = HashSet::new();
        for object in local {
            if !remote_set.contains(object.as_str()) && seen.insert(object.as_str()) {
                self.writes.push(ownership_tuple(object));
            }
        }

        for remote_object in remote {
            if local_set.contains(remote_object.as_str()) {
                continue;
            }

            let object = Object::from_string(remote_object)?;
            self.deletes.push(ownership_tuple(&object));
        }

        Ok(())
    }
}

impl FgaState {
    async fn list(
        &self,
        user: &Object,
        relation: &str,
        object_type: ObjectType,
    ) -> Result<Vec<String>, AuthError> {
        let objects = self
            .call(self.store.list_objects(user.as_str(), relation, object_type.as_str()))
            .await?;
        Ok(objects)
    }

    /// Compute the difference between the store and `resources`.
    pub(crate) async fn plan_sync(&self, resources: &Resources) -> Result<SyncReport, AuthError> {
        let server = Object::server();
        let mut report = SyncReport::default();

        // Every authenticated user may view the server.
        let public = Object::user("*");
        let has_public = self
            .call(self.store.check(public.as_str(), RELATION_USER, server.as_str()))
            .await?;
        if !has_public {
            report
                .writes
                .push(TupleKey::new(public.as_str(), RELATION_USER, server.as_str()));
        }

        let server_scoped = [
            (ObjectType::Certificate, &resources.certificates),
            (ObjectType::StoragePool, &resources.storage_pools),
            (ObjectType::NetworkIntegration, &resources.network_integrations),
            (ObjectType::Project, &resources.projects),
        ];

        let mut remote_projects = Vec::new();
        for (object_type, local) in server_scoped {
            let remote = self.list(&server, RELATION_SERVER, object_type).await?;
            let local: Vec<&Object> = local.iter().collect();
            report.diff(&remote, &local)?;

            if object_type == ObjectType::Project {
                remote_projects = remote;
            }
        }

        let mut remote_resources = Vec::new();
        for project in &remote_projects {
            let project = Object::from_string(project)?;
            for object_type in PROJECT_TYPES {
                remote_resources.extend(self.list(&project, RELATION_PROJECT, object_type).await?);
            }
        }

        let local_resources: Vec<&Object> = [
            &resources.images,
            &resources.image_aliases,
            &resources.instances,
            &resources.networks,
            &resources.network_zones,
            &resources.network_acls,
            &resources.profiles,
            &resources.storage_volumes,
            &resources.storage_buckets,
        ]
        .into_iter()
        .flatten()
        .collect();

        report.diff(&remote_resources, &local_resources)?;
        Ok(report)
    }

    /// Diff the store against `resources` and apply the difference.
    ///
    /// Individual tuple failures abort the run with an aggregated error; the
    /// next run re-diffs from scratch.
    pub(crate) async fn sync_resources(
        &self,
        resources: &Resources,
    ) -> Result<SyncReport, AuthError> {
        let report = self
            .plan_sync(resources)
            .await
        .map_err(|e| AuthError::SyncFailure(e.to_string()))?;

        if report.is_empty() {
            return Ok(report);
        }

        tracing::debug!(
            parent: &self.span,
            writes = report.writes.len(),
            deletes = report.deletes.len(),
            "Applying OpenFGA resource changes"
        );

        write_tuples(
            &*self.store,
            report.writes.clone(),
            report.deletes.clone(),
            self.settings.write,
        )
        .await
        .map_err(|e| AuthError::SyncFailure(e.to_string()))?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_writes_missing_and_deletes_stale() {
        let local = [Object::certificate("fp1"), Object::certificate("fp2")];
        let local: Vec<&Object> = local.iter().collect();
        let remote = vec!["certificate:fp2".to_string(), "certificate:old".to_string()];

        let mut report = SyncReport::default();
        report.diff(&remote, &local).unwrap();

        assert_eq!(report.writes, vec![TupleKey::new("server:incus", "server", "certificate:fp1")]);
        assert_eq!(
            report.deletes,
            vec![TupleKey::new("server:incus", "server", "certificate:old")]
        );
    }

    #[test]
    fn diff_derives_owner_per_object() {
        let local = [Object::instance("p1", "c1"), Object::instance("p2", "c1")];
        let local: Vec<&Object> = local.iter().collect();
        let remote = vec!["instance:p3/gone".to_string()];

        let mut report = SyncReport::default();
        report.diff(&remote, &local).unwrap();

        let owners: Vec<&str> = report.writes.iter().map(|t| t.user.as_str()).collect();
        assert_eq!(owners, vec!["project:p1", "project:p2"]);
        assert_eq!(
            report.deletes,
            vec![TupleKey::new("project:p3", "project", "instance:p3/gone")]
        );
    }

    #[test]
    fn diff_of_equal_sets_is_empty() {
        let local = [Object::storage_pool("local")];
        let local: Vec<&Object> = local.iter().collect();
        let remote = vec!["storage_pool:local".to_string()];

        let mut report = SyncReport::default();
        report.diff(&remote, &local).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn duplicate_local_objects_are_written_once() {
        let object = Object::certificate("fp1");
        let local = vec![&object, &object];

        let mut report = SyncReport::default();
        report.diff(&[], &local).unwrap();
        assert_eq!(report.writes.len(), 1);
    }

    #[test]
    fn malformed_remote_objects_fail_the_diff() {
        let mut report = SyncReport::default();
        assert!(report.diff(&["bogus:thing".to_string()], &[]).is_err());
    }
}
