//! Manifest repository port.
//!
//! Read-only capability resolution. The renderer receives an implementation
//! of this trait at call time; there is no process-wide manifest cache.

use async_trait::async_trait;
use quasar_core::{Implementation, Interface, ManifestRef};
use serde::{Deserialize, Serialize};

use crate::error::PortsError;

/// Narrows the implementations returned by
/// [`ManifestRepository::list_implementations`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationFilter {
    /// Every listed attribute path must be present on the implementation.
    #[serde(default)]
    pub required_attributes: Vec<String>,
    /// Implementations with these paths are dropped.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

impl ImplementationFilter {
    /// Returns `true` if `implementation` passes the filter.
    #[must_use]
    pub fn accepts(&self, implementation: &Implementation) -> bool {
        !self.excluded_paths.contains(&implementation.path)
            && self
                .required_attributes
                .iter()
                .all(|a| implementation.attributes.contains(a))
    }
}

/// Source of Interface and Implementation manifests.
#[async_trait]
pub trait ManifestRepository: Send + Sync {
    /// Resolve an interface. An omitted revision means the latest one.
    async fn resolve_interface(&self, reference: &ManifestRef) -> Result<Interface, PortsError>;

    /// Resolve an implementation by its own path.
    async fn resolve_implementation(
        &self,
        reference: &ManifestRef,
    ) -> Result<Implementation, PortsError>;

    /// All implementations declaring `implements` on `interface` and passing
    /// `filter`, in a stable order.
    async fn list_implementations(
        &self,
        interface: &ManifestRef,
        filter: &ImplementationFilter,
    ) -> Result<Vec<Implementation>, PortsError>;
}
