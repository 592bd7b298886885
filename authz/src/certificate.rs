//! Shared cache of trusted certificates and their project restrictions.
//!
//! The cache is owned and refreshed by the rest of the daemon. Authorizers
//! only read it, through cheap immutable snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Kind of trusted certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    Client,
    Metrics,
}

/// Point-in-time view of the trust store.
#[derive(Debug, Clone, Default)]
pub struct CertificateSnapshot {
    /// Trusted fingerprints by certificate type.
    pub certificates: HashMap<CertificateType, HashSet<String>>,
    /// Project allow-list of each restricted fingerprint. Absent means
    /// unrestricted.
    pub projects: HashMap<String, Vec<String>>,
}

impl CertificateSnapshot {
    pub fn contains(&self, certificate_type: CertificateType, fingerprint: &str) -> bool {
        self.certificates
            .get(&certificate_type)
            .is_some_and(|set| set.contains(fingerprint))
    }
}

/// Restriction state of one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateAccess {
    /// Full access.
    Unrestricted,
    /// Limited to the listed projects.
    Restricted {
        certificate_type: CertificateType,
        projects: Vec<String>,
    },
}

/// Concurrently readable certificate trust store.
#[derive(Debug, Default)]
pub struct CertificateCache {
    snapshot: RwLock<Arc<CertificateSnapshot>>,
    ca_trusted: AtomicBool,
}

impl CertificateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached certificates.
    pub fn set_certificates(
        &self,
        certificates: HashMap<CertificateType, HashSet<String>>,
        projects: HashMap<String, Vec<String>>,
    ) {
        let snapshot = Arc::new(CertificateSnapshot {
            certificates,
            projects,
        });
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Add or replace one certificate.
    pub fn insert(
        &self,
        certificate_type: CertificateType,
        fingerprint: &str,
        projects: Option<Vec<String>>,
    ) {
        let mut next = (*self.get_certificates_and_projects()).clone();
        next.certificates
            .entry(certificate_type)
            .or_default()
            .insert(fingerprint.to_string());
        match projects {
            Some(projects) => next.projects.insert(fingerprint.to_string(), projects),
            None => next.projects.remove(fingerprint),
        };
        self.set_certificates(next.certificates, next.projects);
    }

    /// The current snapshot.
    pub fn get_certificates_and_projects(&self) -> Arc<CertificateSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Trust certificates signed by the configured CA even when they are not
    /// in the store.
    pub fn set_ca_trusted(&self, trusted: bool) {
        self.ca_trusted.store(trusted, Ordering::Release);
    }

    pub fn ca_trusted(&self) -> bool {
        self.ca_trusted.load(Ordering::Acquire)
    }

    /// Restriction state of `fingerprint`, or `None` if it is not trusted.
    pub fn access(&self, fingerprint: &str) -> Option<CertificateAccess> {
        let snapshot = self.get_certificates_and_projects();

        for certificate_type in [CertificateType::Client, CertificateType::Metrics] {
            if !snapshot.contains(certificate_type, fingerprint) {
                continue;
            }

            return Some(match snapshot.projects.get(fingerprint) {
                Some(projects) => CertificateAccess::Restricted {
                    certificate_type,
                    projects: projects.clone(),
                },
                None => CertificateAccess::Unrestricted,
            });
        }

        // Validity against the CA was established during authentication.
        if self.ca_trusted() {
            return Some(CertificateAccess::Unrestricted);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels() {
        let cache = CertificateCache::new();
        cache.insert(CertificateType::Client, "admin", None);
        cache.insert(CertificateType::Client, "restricted", Some(vec!["p1".into()]));
        cache.insert(CertificateType::Metrics, "metrics", Some(vec!["p2".into()]));

        assert_eq!(cache.access("admin"), Some(CertificateAccess::Unrestricted));
        assert_eq!(
            cache.access("restricted"),
            Some(CertificateAccess::Restricted {
                certificate_type: CertificateType::Client,
                projects: vec!["p1".into()],
            })
        );
        assert!(matches!(
            cache.access("metrics"),
            Some(CertificateAccess::Restricted {
                certificate_type: CertificateType::Metrics,
                ..
            })
        ));
        assert_eq!(cache.access("unknown"), None);
    }

    #[test]
    fn ca_trust_admits_unknown_certificates() {
        let cache = CertificateCache::new();
        cache.set_ca_trusted(true);
        assert_eq!(cache.access("anything"), Some(CertificateAccess::Unrestricted));
    }

    #[test]
    fn snapshots_are_stable_across_updates() {
        let cache = CertificateCache::new();
        cache.insert(CertificateType::Client, "a", None);
        let before = cache.get_certificates_and_projects();

        cache.set_certificates(HashMap::new(), HashMap::new());
        assert!(before.contains(CertificateType::Client, "a"));
        assert!(!cache.get_certificates_and_projects().contains(CertificateType::Client, "a"));
    }
}
