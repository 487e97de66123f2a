//! Fluent builders for workflow documents.
//!
//! Manifests embed workflows as JSON, so these builders mostly serve the
//! renderer's synthesized templates and tests.

use quasar_core::ManifestRef;

use crate::definition::{
    ActionRef, Artifact, Template, TypeInstanceBinding, TypeInstanceOutput, Workflow,
    WorkflowStep,
};
use crate::error::WorkflowError;
use crate::validate::validate_workflow;

/// Accumulates templates, then validates and produces a [`Workflow`].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    /// Start a workflow whose execution begins at `entrypoint`.
    #[must_use]
    pub fn new(entrypoint: impl Into<String>) -> Self {
        Self {
            workflow: Workflow {
                entrypoint: entrypoint.into(),
                ..Workflow::default()
            },
        }
    }

    /// Add a template.
    #[must_use]
    pub fn template(mut self, template: impl Into<Template>) -> Self {
        self.workflow.templates.push(template.into());
        self
    }

    /// Add a workflow-level argument.
    #[must_use]
    pub fn argument(mut self, artifact: Artifact) -> Self {
        self.workflow.arguments.artifacts.push(artifact);
        self
    }

    /// Validate and return the workflow, failing on the first structural error.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        match validate_workflow(&self.workflow).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.workflow),
        }
    }
}

/// Builds a single [`Template`].
#[derive(Debug)]
pub struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    /// Start a template called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            template: Template::new(name),
        }
    }

    /// Append a group of concurrent steps.
    #[must_use]
    pub fn group<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<WorkflowStep>,
    {
        self.template
            .steps
            .push(steps.into_iter().map(Into::into).collect());
        self
    }

    /// Append a group holding a single step.
    #[must_use]
    pub fn step(self, step: impl Into<WorkflowStep>) -> Self {
        self.group([step])
    }

    /// Declare an input artifact.
    #[must_use]
    pub fn input(mut self, artifact: Artifact) -> Self {
        self.template.inputs.artifacts.push(artifact);
        self
    }

    /// Declare an output artifact.
    #[must_use]
    pub fn output(mut self, artifact: Artifact) -> Self {
        self.template.outputs.artifacts.push(artifact);
        self
    }

    /// Make this a leaf template with the given exec unit.
    #[must_use]
    pub fn exec_unit(mut self, unit: serde_json::Value) -> Self {
        self.template.exec_unit = Some(unit);
        self
    }

    /// Finish the template.
    #[must_use]
    pub fn build(self) -> Template {
        self.template
    }
}

impl From<TemplateBuilder> for Template {
    fn from(builder: TemplateBuilder) -> Self {
        builder.build()
    }
}

/// Builds a single [`WorkflowStep`].
#[derive(Debug)]
pub struct StepBuilder {
    step: WorkflowStep,
}

impl StepBuilder {
    /// Step calling `template`.
    #[must_use]
    pub fn calling(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            step: WorkflowStep::calling(name, template),
        }
    }

    /// Step pending expansion of the interface `interface`.
    #[must_use]
    pub fn action(name: impl Into<String>, interface: ManifestRef) -> Self {
        Self {
            step: WorkflowStep::pending(name, ActionRef::Manifest(interface)),
        }
    }

    /// Step pending expansion of an `<alias>.<method>` import.
    #[must_use]
    pub fn import(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            step: WorkflowStep::pending(name, ActionRef::Alias(alias.into())),
        }
    }

    /// Pass an argument artifact.
    #[must_use]
    pub fn argument(mut self, artifact: Artifact) -> Self {
        self.step.arguments.artifacts.push(artifact);
        self
    }

    /// Mark the step as producing Type-instance `name`.
    #[must_use]
    pub fn provides(mut self, name: impl Into<String>) -> Self {
        self.step.provides_instance = Some(name.into());
        self
    }

    /// Request Type-instance `local_name` as an input artifact.
    #[must_use]
    pub fn requests(mut self, local_name: impl Into<String>) -> Self {
        self.step.requested_type_instances.push(TypeInstanceBinding {
            local_name: local_name.into(),
            source_artifact: None,
        });
        self
    }

    /// Capture output artifact `from` as Type-instance `name`.
    #[must_use]
    pub fn captures(mut self, name: impl Into<String>, from: impl Into<String>) -> Self {
        self.step.type_instance_outputs.push(TypeInstanceOutput {
            name: name.into(),
            from: from.into(),
            type_ref: None,
        });
        self
    }

    /// Finish the step.
    #[must_use]
    pub fn build(self) -> WorkflowStep {
        self.step
    }
}

impl From<StepBuilder> for WorkflowStep {
    fn from(builder: StepBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::workflow_artifact;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_valid_workflow() {
        let wf = WorkflowBuilder::new("main")
            .template(
                TemplateBuilder::new("main")
                    .step(StepBuilder::calling("produce", "leaf"))
                    .group([
                        StepBuilder::action("install", ManifestRef::new("cap.interface.db.install")),
                        StepBuilder::import("configure", "db.configure"),
                    ]),
            )
            .template(
                TemplateBuilder::new("leaf")
                    .exec_unit(serde_json::json!({ "image": "busybox" }))
                    .output(Artifact::named("out").exported_as("result")),
            )
            .build()
            .unwrap();

        assert_eq!(wf.templates.len(), 2);
        assert_eq!(wf.templates[0].steps.len(), 2);
        assert_eq!(wf.templates[0].steps[1].len(), 2);
        assert_eq!(wf.pending_actions(), 2);
        assert_eq!(wf.global_artifacts().collect::<Vec<_>>(), vec!["result"]);
    }

    #[test]
    fn build_rejects_unknown_entrypoint() {
        let err = WorkflowBuilder::new("main")
            .template(TemplateBuilder::new("other"))
            .build()
            .unwrap_err();
        assert_eq!(err, WorkflowError::UnknownEntrypoint("main".into()));
    }

    #[test]
    fn step_builder_sets_markers() {
        let step = StepBuilder::calling("install-db", "db")
            .provides("db")
            .requests("config")
            .captures("db", "connection")
            .argument(Artifact::named("cfg").source(workflow_artifact("config")))
            .build();

        assert_eq!(step.provides_instance.as_deref(), Some("db"));
        assert_eq!(step.requested_type_instances[0].local_name, "config");
        assert_eq!(step.type_instance_outputs[0].from, "connection");
        assert_eq!(
            step.arguments.get("cfg").and_then(|a| a.from.as_deref()),
            Some("{{workflow.outputs.artifacts.config}}")
        );
    }
}
