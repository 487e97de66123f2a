//! Core workflow document types.

use quasar_core::ManifestRef;
use serde::{Deserialize, Serialize};

/// Steps within one group run concurrently; groups run in order.
pub type ParallelSteps = Vec<WorkflowStep>;

/// An executable workflow graph.
///
/// `entrypoint` names the template execution starts from. Template names are
/// unique within a workflow, and so are the global names of exported
/// artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Name of the template execution starts from.
    pub entrypoint: String,
    /// All templates of the workflow.
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Workflow-level input artifacts.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub arguments: Artifacts,
}

impl Workflow {
    /// Look up a template by name.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Mutable lookup of a template by name.
    pub fn template_mut(&mut self, name: &str) -> Option<&mut Template> {
        self.templates.iter_mut().find(|t| t.name == name)
    }

    /// Returns `true` if a template called `name` exists.
    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.template(name).is_some()
    }

    /// Iterate over every step of every template, paired with its template name.
    pub fn steps(&self) -> impl Iterator<Item = (&str, &WorkflowStep)> {
        self.templates.iter().flat_map(|t| {
            t.steps
                .iter()
                .flatten()
                .map(move |step| (t.name.as_str(), step))
        })
    }

    /// Iterate mutably over every step of every template.
    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut WorkflowStep> {
        self.templates
            .iter_mut()
            .flat_map(|t| t.steps.iter_mut().flatten())
    }

    /// Global names of all artifacts exported by any template.
    pub fn global_artifacts(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().flat_map(Template::global_artifacts)
    }

    /// Number of steps still carrying an unresolved action reference.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.steps().filter(|(_, s)| s.action.is_some()).count()
    }
}

/// A named unit of work.
///
/// A composite template has step groups; a leaf template has an opaque
/// execution unit and no steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Template name, unique within a workflow.
    pub name: String,
    /// Sequential groups of concurrent steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<ParallelSteps>,
    /// Input artifacts.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub inputs: Artifacts,
    /// Output artifacts; those with a `globalName` are exported.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub outputs: Artifacts,
    /// Opaque leaf action understood by the execution backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_unit: Option<serde_json::Value>,
}

impl Template {
    /// Create an empty template.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if this template has an exec unit and no steps.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.steps.is_empty() && self.exec_unit.is_some()
    }

    /// Global names of artifacts this template exports.
    pub fn global_artifacts(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .artifacts
            .iter()
            .filter_map(|a| a.global_name.as_deref())
    }
}

/// Reference to a capability that still has to be inlined.
///
/// Either a full manifest reference or an `<alias>.<method>` string resolved
/// through the owning implementation's imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionRef {
    /// Fully qualified interface reference.
    Manifest(ManifestRef),
    /// Import alias, e.g. `postgres.install`.
    Alias(String),
}

impl std::fmt::Display for ActionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest(r) => write!(f, "{r}"),
            Self::Alias(a) => f.write_str(a),
        }
    }
}

/// Declares that a step consumes a Type-instance as an input artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInstanceBinding {
    /// Artifact name the step receives the instance under.
    pub local_name: String,
    /// Where the value comes from; defaults to the global artifact named
    /// `local_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_artifact: Option<String>,
}

/// Declares that an output artifact of a step is a Type-instance to capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInstanceOutput {
    /// Name of the produced Type-instance.
    pub name: String,
    /// Output artifact of the step holding the value.
    pub from: String,
    /// Type of the produced instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<ManifestRef>,
}

/// One call inside a composite template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Step name, unique within its template.
    pub name: String,
    /// Template this step invokes, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Capability still pending inline expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRef>,
    /// Artifacts passed to the invoked template.
    #[serde(default, skip_serializing_if = "Artifacts::is_empty")]
    pub arguments: Artifacts,
    /// Type-instance this step produces; the step is dropped when the
    /// instance is already provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_instance: Option<String>,
    /// Type-instances the step consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_type_instances: Vec<TypeInstanceBinding>,
    /// Output artifacts to capture as Type-instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_instance_outputs: Vec<TypeInstanceOutput>,
}

impl WorkflowStep {
    /// Step calling `template`.
    pub fn calling(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: Some(template.into()),
            ..Self::default()
        }
    }

    /// Step pending expansion of `action`.
    pub fn pending(name: impl Into<String>, action: ActionRef) -> Self {
        Self {
            name: name.into(),
            action: Some(action),
            ..Self::default()
        }
    }
}

/// A list of artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    /// The artifacts, in declaration order.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Artifacts {
    /// Returns `true` if there are no artifacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Look up an artifact by local name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

impl From<Vec<Artifact>> for Artifacts {
    fn from(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }
}

/// Inline artifact content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawArtifact {
    /// Literal content.
    pub data: String,
}

/// Named piece of data flowing between steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Local name.
    pub name: String,
    /// Exported name, unique across the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    /// Placeholder the value is taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Filesystem path inside the exec unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Inline content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawArtifact>,
    /// Whether the artifact may be absent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Artifact {
    /// Artifact called `name` with no source.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the placeholder the value is taken from.
    #[must_use]
    pub fn source(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Export the artifact under `global_name`.
    #[must_use]
    pub fn exported_as(mut self, global_name: impl Into<String>) -> Self {
        self.global_name = Some(global_name.into());
        self
    }

    /// Set the path inside the exec unit.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach inline content.
    #[must_use]
    pub fn raw(mut self, data: impl Into<String>) -> Self {
        self.raw = Some(RawArtifact { data: data.into() });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Workflow {
        serde_json::from_value(serde_json::json!({
            "entrypoint": "main",
            "templates": [
                {
                    "name": "main",
                    "steps": [[
                        { "name": "install", "action": "postgres.install" },
                        { "name": "render", "template": "render-config" }
                    ]]
                },
                {
                    "name": "render-config",
                    "execUnit": { "image": "alpine" },
                    "outputs": { "artifacts": [
                        { "name": "config", "globalName": "config", "path": "/out" }
                    ]}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn untagged_action_ref_parses_both_forms() {
        let alias: ActionRef = serde_json::from_value(serde_json::json!("pg.install")).unwrap();
        assert_eq!(alias, ActionRef::Alias("pg.install".into()));

        let full: ActionRef =
            serde_json::from_value(serde_json::json!({ "path": "cap.interface.x", "revision": "0.1.0" }))
                .unwrap();
        assert_eq!(
            full,
            ActionRef::Manifest(ManifestRef::new("cap.interface.x").with_revision("0.1.0"))
        );
    }

    #[test]
    fn steps_iterates_every_template() {
        let wf = sample();
        let names: Vec<_> = wf.steps().map(|(t, s)| format!("{t}/{}", s.name)).collect();
        assert_eq!(names, vec!["main/install", "main/render"]);
        assert_eq!(wf.pending_actions(), 1);
    }

    #[test]
    fn global_artifacts_lists_exports() {
        let wf = sample();
        assert_eq!(wf.global_artifacts().collect::<Vec<_>>(), vec!["config"]);
    }

    #[test]
    fn leaf_and_composite() {
        let wf = sample();
        assert!(!wf.template("main").unwrap().is_leaf());
        assert!(wf.template("render-config").unwrap().is_leaf());
    }

    #[test]
    fn empty_collections_are_not_serialized() {
        let step = WorkflowStep::calling("a", "b");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "a", "template": "b" }));
    }
}
