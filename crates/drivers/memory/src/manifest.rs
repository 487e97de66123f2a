//! In-memory manifest repository.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use quasar_core::{Implementation, Interface, ManifestRef};
use quasar_ports::{ImplementationFilter, ManifestRepository, PortsError};
use semver::Version;

type Revisions<T> = DashMap<String, BTreeMap<Version, T>>;

/// Manifest store keyed by path, then by semantic-version revision.
///
/// Publishing a revision lower than the latest stored one for the same path
/// is ignored, so out-of-order publication can never roll a path back.
#[derive(Default)]
pub struct MemoryManifests {
    interfaces: Revisions<Interface>,
    implementations: Revisions<Implementation>,
    failing_lookups: AtomicUsize,
}

impl MemoryManifests {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `interface`. Returns `false` if a newer revision is already stored.
    pub fn publish_interface(&self, interface: Interface) -> Result<bool, PortsError> {
        let (path, revision) = (interface.path.clone(), interface.revision.clone());
        publish(&self.interfaces, &path, &revision, interface)
    }

    /// Store `implementation`. Returns `false` if a newer revision is already stored.
    pub fn publish_implementation(
        &self,
        implementation: Implementation,
    ) -> Result<bool, PortsError> {
        let (path, revision) = (implementation.path.clone(), implementation.revision.clone());
        publish(&self.implementations, &path, &revision, implementation)
    }

    /// Make the next `count` interface lookups fail with a connection error.
    pub fn fail_next_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> Option<PortsError> {
        self.failing_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| PortsError::Connection("injected manifest lookup failure".to_owned()))
    }
}

fn publish<T>(store: &Revisions<T>, path: &str, revision: &str, doc: T) -> Result<bool, PortsError> {
    let version = parse(revision)?;
    let mut revisions = store.entry(path.to_owned()).or_default();
    if let Some((latest, _)) = revisions.last_key_value()
        && version < *latest
    {
        tracing::debug!(path, revision, latest = %latest, "Skipping stale manifest revision");
        return Ok(false);
    }
    revisions.insert(version, doc);
    Ok(true)
}

fn resolve<T: Clone>(store: &Revisions<T>, kind: &str, reference: &ManifestRef) -> Result<T, PortsError> {
    let not_found = || PortsError::not_found(kind, reference.to_string());
    let revisions = store.get(&reference.path).ok_or_else(not_found)?;
    let found = match &reference.revision {
        Some(revision) => revisions.get(&parse(revision)?),
        None => revisions.last_key_value().map(|(_, doc)| doc),
    };
    found.cloned().ok_or_else(not_found)
}

fn parse(revision: &str) -> Result<Version, PortsError> {
    Version::parse(revision)
        .map_err(|e| PortsError::Serialization(format!("invalid revision {revision}: {e}")))
}

#[async_trait]
impl ManifestRepository for MemoryManifests {
    async fn resolve_interface(&self, reference: &ManifestRef) -> Result<Interface, PortsError> {
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }
        resolve(&self.interfaces, "Interface", reference)
    }

    async fn resolve_implementation(
        &self,
        reference: &ManifestRef,
    ) -> Result<Implementation, PortsError> {
        resolve(&self.implementations, "Implementation", reference)
    }

    async fn list_implementations(
        &self,
        interface: &ManifestRef,
        filter: &ImplementationFilter,
    ) -> Result<Vec<Implementation>, PortsError> {
        let mut found: Vec<Implementation> = self
            .implementations
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .values()
                    .rev()
                    .find(|imp| imp.implements(interface))
                    .cloned()
            })
            .filter(|imp| filter.accepts(imp))
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quasar_core::{ImplementationAction, WORKFLOW_RUNNER};

    fn implementation(path: &str, revision: &str, implements: &str) -> Implementation {
        Implementation {
            path: path.into(),
            revision: revision.into(),
            implements: vec![ManifestRef::new(implements)],
            requires: vec![],
            imports: vec![],
            attributes: vec![],
            action: ImplementationAction {
                runner: WORKFLOW_RUNNER.into(),
                args: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn unpinned_reference_resolves_latest_revision() {
        let repo = MemoryManifests::new();
        assert!(repo.publish_interface(Interface::new("cap.interface.db", "0.1.0")).unwrap());
        assert!(repo.publish_interface(Interface::new("cap.interface.db", "0.10.0")).unwrap());

        let latest = repo
            .resolve_interface(&ManifestRef::new("cap.interface.db"))
            .await
            .unwrap();
        assert_eq!(latest.revision, "0.10.0");

        let pinned = repo
            .resolve_interface(&ManifestRef::new("cap.interface.db").with_revision("0.1.0"))
            .await
            .unwrap();
        assert_eq!(pinned.revision, "0.1.0");
    }

    #[tokio::test]
    async fn stale_revisions_are_skipped() {
        let repo = MemoryManifests::new();
        assert!(repo.publish_interface(Interface::new("cap.interface.db", "0.2.0")).unwrap());
        assert!(!repo.publish_interface(Interface::new("cap.interface.db", "0.1.0")).unwrap());

        let err = repo
            .resolve_interface(&ManifestRef::new("cap.interface.db").with_revision("0.1.0"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_revision_is_rejected() {
        let repo = MemoryManifests::new();
        let err = repo
            .publish_interface(Interface::new("cap.interface.db", "latest"))
            .unwrap_err();
        assert!(matches!(err, PortsError::Serialization(_)));
    }

    #[tokio::test]
    async fn list_is_sorted_and_filtered() {
        let repo = MemoryManifests::new();
        let mut gcp = implementation("cap.implementation.b", "0.1.0", "cap.interface.db");
        gcp.attributes.push("cap.attribute.cloud.gcp".into());
        repo.publish_implementation(gcp).unwrap();
        repo.publish_implementation(implementation("cap.implementation.a", "0.1.0", "cap.interface.db"))
            .unwrap();
        repo.publish_implementation(implementation("cap.implementation.c", "0.1.0", "cap.interface.other"))
            .unwrap();

        let all = repo
            .list_implementations(&ManifestRef::new("cap.interface.db"), &ImplementationFilter::default())
            .await
            .unwrap();
        let paths: Vec<_> = all.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["cap.implementation.a", "cap.implementation.b"]);

        let filter = ImplementationFilter {
            required_attributes: vec!["cap.attribute.cloud.gcp".into()],
            ..ImplementationFilter::default()
        };
        let gcp_only = repo
            .list_implementations(&ManifestRef::new("cap.interface.db"), &filter)
            .await
            .unwrap();
        assert_eq!(gcp_only.len(), 1);
        assert_eq!(gcp_only[0].path, "cap.implementation.b");
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let repo = MemoryManifests::new();
        repo.publish_interface(Interface::new("cap.interface.db", "0.1.0")).unwrap();
        repo.fail_next_lookups(1);

        let reference = ManifestRef::new("cap.interface.db");
        assert!(repo.resolve_interface(&reference).await.unwrap_err().is_retryable());
        assert!(repo.resolve_interface(&reference).await.is_ok());
    }
}
