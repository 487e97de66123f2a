//! Capability manifest model.
//!
//! A manifest repository serves two kinds of documents: abstract
//! [`Interface`]s and concrete [`Implementation`]s that realize them. Both are
//! addressed by a [`ManifestRef`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runner interface path of the built-in workflow runner.
///
/// Only implementations using this runner embed a Workflow document under
/// `action.args.workflow` and can be inlined by the renderer.
pub const WORKFLOW_RUNNER: &str = "quasar.interface.runner.workflow.run";

/// Reference to a capability manifest.
///
/// An omitted revision means "latest compatible".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestRef {
    /// Dotted capability path, e.g. `cap.interface.database.postgres.install`.
    pub path: String,
    /// Semantic-version revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl ManifestRef {
    /// Reference to the latest revision of `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: None,
        }
    }

    /// Pin the reference to a revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Returns `true` if `other` names the same path and, when this reference
    /// is pinned, the same revision.
    #[must_use]
    pub fn matches(&self, other: &ManifestRef) -> bool {
        if self.path != other.path {
            return false;
        }
        match (&self.revision, &other.revision) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        }
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}:{rev}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Abstract capability contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    /// Capability path.
    pub path: String,
    /// Semantic-version revision.
    pub revision: String,
}

impl Interface {
    /// Create an interface manifest.
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: revision.into(),
        }
    }

    /// Pinned reference to this interface.
    #[must_use]
    pub fn reference(&self) -> ManifestRef {
        ManifestRef::new(self.path.clone()).with_revision(self.revision.clone())
    }
}

/// Method imported from an interface group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMethod {
    /// Method name, appended to the group path.
    pub name: String,
    /// Revision of the resolved interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// Alias for an interface group used by workflow steps.
///
/// A step referencing `<alias>.<method>` resolves to
/// `<interface_group_path>.<method>` at the method's revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Short name used in step references.
    pub alias: String,
    /// Interface group the alias stands for.
    pub interface_group_path: String,
    /// Methods of the group available through the alias.
    #[serde(default)]
    pub methods: Vec<ImportMethod>,
}

impl Import {
    /// Expand an `<alias>.<method>` reference against `imports`.
    #[must_use]
    pub fn resolve(imports: &[Import], reference: &str) -> Option<ManifestRef> {
        let (alias, method) = reference.split_once('.')?;
        let import = imports.iter().find(|i| i.alias == alias)?;
        let method = import.methods.iter().find(|m| m.name == method)?;
        Some(ManifestRef {
            path: format!("{}.{}", import.interface_group_path, method.name),
            revision: method.revision.clone(),
        })
    }
}

/// Executable part of an implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationAction {
    /// Runner interface path, see [`WORKFLOW_RUNNER`].
    pub runner: String,
    /// Runner-specific payload.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Concrete, versioned realization of one or more interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Capability path.
    pub path: String,
    /// Semantic-version revision.
    pub revision: String,
    /// Interfaces this implementation satisfies.
    #[serde(default)]
    pub implements: Vec<ManifestRef>,
    /// Type constraints the environment must satisfy.
    #[serde(default)]
    pub requires: Vec<ManifestRef>,
    /// Interface aliases usable from embedded workflow steps.
    #[serde(default)]
    pub imports: Vec<Import>,
    /// Free-form attribute paths used by implementation filters.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// What runs when this implementation is selected.
    pub action: ImplementationAction,
}

impl Implementation {
    /// Pinned reference to this implementation.
    #[must_use]
    pub fn reference(&self) -> ManifestRef {
        ManifestRef::new(self.path.clone()).with_revision(self.revision.clone())
    }

    /// Returns `true` if this implementation declares `implements` on `interface`.
    #[must_use]
    pub fn implements(&self, interface: &ManifestRef) -> bool {
        self.implements.iter().any(|i| interface.matches(i))
    }

    /// Returns `true` if the action is run by the built-in workflow runner.
    #[must_use]
    pub fn uses_workflow_runner(&self) -> bool {
        self.action.runner == WORKFLOW_RUNNER
    }

    /// Expand an `<alias>.<method>` step reference through [`Self::imports`].
    ///
    /// Returns `None` when no import matches.
    #[must_use]
    pub fn resolve_import(&self, reference: &str) -> Option<ManifestRef> {
        Import::resolve(&self.imports, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn postgres_impl() -> Implementation {
        Implementation {
            path: "cap.implementation.bitnami.postgresql.install".into(),
            revision: "0.1.0".into(),
            implements: vec![
                ManifestRef::new("cap.interface.database.postgresql.install").with_revision("0.1.0"),
            ],
            requires: vec![],
            imports: vec![Import {
                alias: "helm".into(),
                interface_group_path: "cap.interface.runner.helm".into(),
                methods: vec![ImportMethod {
                    name: "install".into(),
                    revision: Some("0.2.0".into()),
                }],
            }],
            attributes: vec![],
            action: ImplementationAction {
                runner: WORKFLOW_RUNNER.into(),
                args: serde_json::json!({}),
            },
        }
    }

    #[rstest]
    #[case(ManifestRef::new("a.b"), ManifestRef::new("a.b").with_revision("1.0.0"), true)]
    #[case(ManifestRef::new("a.b").with_revision("1.0.0"), ManifestRef::new("a.b").with_revision("1.0.0"), true)]
    #[case(ManifestRef::new("a.b").with_revision("1.0.0"), ManifestRef::new("a.b").with_revision("2.0.0"), false)]
    #[case(ManifestRef::new("a.b"), ManifestRef::new("a.c"), false)]
    fn manifest_ref_matching(
        #[case] want: ManifestRef,
        #[case] have: ManifestRef,
        #[case] expected: bool,
    ) {
        assert_eq!(want.matches(&have), expected);
    }

    #[test]
    fn manifest_ref_display() {
        assert_eq!(ManifestRef::new("a.b").to_string(), "a.b");
        assert_eq!(
            ManifestRef::new("a.b").with_revision("0.1.0").to_string(),
            "a.b:0.1.0"
        );
    }

    #[test]
    fn implements_ignores_unpinned_revision() {
        let imp = postgres_impl();
        assert!(imp.implements(&ManifestRef::new("cap.interface.database.postgresql.install")));
        assert!(!imp.implements(
            &ManifestRef::new("cap.interface.database.postgresql.install").with_revision("9.9.9")
        ));
    }

    #[test]
    fn resolve_import_expands_alias() {
        let imp = postgres_impl();
        assert_eq!(
            imp.resolve_import("helm.install"),
            Some(ManifestRef::new("cap.interface.runner.helm.install").with_revision("0.2.0"))
        );
        assert_eq!(imp.resolve_import("helm.delete"), None);
        assert_eq!(imp.resolve_import("kubectl.install"), None);
        assert_eq!(imp.resolve_import("noalias"), None);
    }

    #[test]
    fn implementation_deserializes_with_defaults() {
        let imp: Implementation = serde_json::from_value(serde_json::json!({
            "path": "cap.implementation.x",
            "revision": "1.0.0",
            "action": { "runner": "custom.runner" }
        }))
        .unwrap();
        assert!(imp.implements.is_empty());
        assert!(!imp.uses_workflow_runner());
        assert_eq!(imp.action.args, serde_json::Value::Null);
    }
}
