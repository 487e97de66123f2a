//! Render inputs, resumable state and results.

use std::collections::BTreeMap;

use quasar_core::{Import, InputTypeInstance, ManifestRef, TypeInstanceId};
use quasar_workflow::Workflow;
use serde::{Deserialize, Serialize};

/// What to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInput {
    /// Interface to resolve at the root.
    pub action_ref: ManifestRef,
    /// Input parameters, attached to the workflow as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Type-instances the caller already has and wants wired in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_type_instances: Vec<InputTypeInstance>,
}

impl RenderInput {
    /// Render `action_ref` with no parameters or Type-instances.
    #[must_use]
    pub fn new(action_ref: ManifestRef) -> Self {
        Self {
            action_ref,
            parameters: None,
            input_type_instances: Vec::new(),
        }
    }

    /// Attach input parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Add an input Type-instance.
    #[must_use]
    pub fn with_type_instance(mut self, binding: InputTypeInstance) -> Self {
        self.input_type_instances.push(binding);
        self
    }
}

/// Where a template of the working graph came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContext {
    /// Nesting depth; root templates are at depth 1.
    pub depth: usize,
    /// Namespace prefix of the inlined fragment, `root` for the seed workflow.
    pub fragment: String,
    /// Implementation the template was inlined from.
    pub implementation: String,
    /// Imports of that implementation, for alias resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    /// Template containing the step that inlined this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// A Type-instance the rendered workflow will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    /// Instance name as declared by the producing step.
    pub name: String,
    /// Global artifact holding the value in the flattened workflow.
    pub global_artifact: String,
    /// Declared type, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<ManifestRef>,
    /// Producing step, after renaming.
    pub step: String,
}

/// Complete state of an in-progress render.
///
/// Everything needed to continue lives here, so a render can be stopped
/// after any iteration, persisted and resumed by another process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    /// Interface the render started from.
    pub action_ref: ManifestRef,
    /// Implementation selected for it.
    pub implementation: ManifestRef,
    /// The working graph.
    pub workflow: Workflow,
    /// Provided Type-instances by local name.
    pub provided: BTreeMap<String, TypeInstanceId>,
    /// Origin of every template in the working graph.
    pub contexts: BTreeMap<String, TemplateContext>,
    /// Type-instance outputs declared so far.
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
    /// Completed fixpoint iterations.
    pub iterations: usize,
}

impl RenderState {
    /// Steps still waiting for inline expansion.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.workflow.pending_actions()
    }
}

/// A finished render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    /// The flattened workflow.
    pub workflow: Workflow,
    /// Implementation selected for the root interface.
    pub implementation: ManifestRef,
    /// Fixpoint iterations it took, equal to the nesting depth inlined.
    pub iterations: usize,
    /// Type-instances the workflow produces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_type_instances: Vec<OutputBinding>,
    /// Type-instances the workflow consumes, to be locked while it runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_instances_to_lock: Vec<TypeInstanceId>,
}

/// Result of advancing a render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderProgress {
    /// More iterations are needed.
    InProgress(RenderState),
    /// The fixpoint was reached.
    Complete(RenderOutput),
}

impl RenderProgress {
    /// Returns `true` for [`RenderProgress::Complete`].
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_state_survives_json_round_trip() {
        let mut state = RenderState {
            action_ref: ManifestRef::new("cap.interface.app.install"),
            implementation: ManifestRef::new("cap.implementation.app.install").with_revision("0.1.0"),
            workflow: Workflow {
                entrypoint: "main".into(),
                ..Workflow::default()
            },
            provided: BTreeMap::new(),
            contexts: BTreeMap::new(),
            outputs: Vec::new(),
            iterations: 2,
        };
        state.provided.insert("db".into(), TypeInstanceId::new("abc"));
        state.contexts.insert(
            "main".into(),
            TemplateContext {
                depth: 1,
                fragment: "root".into(),
                implementation: "cap.implementation.app.install".into(),
                imports: vec![],
                parent: None,
            },
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["provided"]["db"], "abc");
        let back: RenderState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
