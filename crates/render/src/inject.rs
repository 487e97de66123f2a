//! Synthetic templates for Type-instance handling.
//!
//! - [`compile_injection`] turns "provide instance X as `name`" into a leaf
//!   template exporting the global artifact `name`
//! - [`bind_type_instances`] wires a workflow fragment's requested inputs to
//!   global artifacts and appends capture steps for its declared outputs
//! - [`parameters_artifact`] carries the serialized input parameters

use quasar_core::{InputTypeInstance, ManifestRef};
use quasar_workflow::reference::{step_artifact, workflow_artifact};
use quasar_workflow::{Artifact, Template, Workflow, WorkflowStep};

use crate::config::RenderConfig;

/// Name of the workflow argument holding the serialized input parameters.
pub const PARAMETERS_ARTIFACT: &str = "input-parameters";

/// A Type-instance output declared by a step, before the renderer knows the
/// final global artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBinding {
    /// Instance name.
    pub name: String,
    /// Global artifact the capture step exports.
    pub global_artifact: String,
    /// Declared type, if any.
    pub type_ref: Option<ManifestRef>,
    /// Step whose output is captured.
    pub step: String,
}

/// Name of the template and step injecting `binding`.
#[must_use]
pub fn injection_name(binding: &InputTypeInstance) -> String {
    format!("inject-{}", binding.name)
}

/// Compile an injection binding into a leaf template.
///
/// The template has no inputs; its exec unit downloads the instance by id
/// and exposes the value as the global artifact `binding.name`.
#[must_use]
pub fn compile_injection(binding: &InputTypeInstance, config: &RenderConfig) -> Template {
    let path = format!("/type-instances/{}", binding.name);
    Template {
        name: injection_name(binding),
        outputs: vec![
            Artifact::named(binding.name.clone())
                .exported_as(binding.name.clone())
                .at(path.clone()),
        ]
        .into(),
        exec_unit: Some(serde_json::json!({
            "image": config.helper_image,
            "args": ["download"],
            "env": {
                "TYPE_INSTANCE_ID": binding.id.as_str(),
                "OUTPUT_PATH": path,
            },
        })),
        ..Template::default()
    }
}

/// Step invoking the template compiled for `binding`.
#[must_use]
pub fn injection_step(binding: &InputTypeInstance) -> WorkflowStep {
    let name = injection_name(binding);
    WorkflowStep::calling(name.clone(), name)
}

/// Workflow argument carrying `parameters` as raw JSON.
pub fn parameters_artifact(parameters: &serde_json::Value) -> Result<Artifact, serde_json::Error> {
    Ok(Artifact::named(PARAMETERS_ARTIFACT)
        .at("/parameters.json")
        .raw(serde_json::to_string(parameters)?))
}

/// Resolve Type-instance declarations of every step in `workflow`.
///
/// Requested instances become argument artifacts sourced from the global
/// artifact of the same name (unless the step already passes one). Declared
/// outputs get a capture step in a new trailing group of the step's template,
/// calling a leaf `output-<name>` template that exports the global artifact
/// `<name>`. The declarations are consumed.
pub fn bind_type_instances(workflow: &mut Workflow, config: &RenderConfig) -> Vec<CaptureBinding> {
    let mut captures = Vec::new();
    let mut capture_templates = Vec::new();

    for template in &mut workflow.templates {
        let mut capture_steps = Vec::new();
        for step in template.steps.iter_mut().flatten() {
            for request in std::mem::take(&mut step.requested_type_instances) {
                if step.arguments.get(&request.local_name).is_some() {
                    continue;
                }
                let source = request.source_artifact.as_deref().unwrap_or(&request.local_name);
                step.arguments
                    .artifacts
                    .push(Artifact::named(request.local_name.clone()).source(workflow_artifact(source)));
            }

            for output in std::mem::take(&mut step.type_instance_outputs) {
                let name = format!("output-{}", output.name);
                let mut capture = WorkflowStep::calling(name.clone(), name.clone());
                capture.arguments.artifacts.push(
                    Artifact::named(output.name.clone()).source(step_artifact(&step.name, &output.from)),
                );
                capture_steps.push(capture);
                capture_templates.push(capture_template(&name, &output.name, config));
                captures.push(CaptureBinding {
                    name: output.name.clone(),
                    global_artifact: output.name,
                    type_ref: output.type_ref,
                    step: step.name.clone(),
                });
            }
        }
        if !capture_steps.is_empty() {
            template.steps.push(capture_steps);
        }
    }

    workflow.templates.extend(capture_templates);
    captures
}

fn capture_template(template: &str, instance: &str, config: &RenderConfig) -> Template {
    let path = format!("/type-instances/{instance}");
    Template {
        name: template.to_owned(),
        inputs: vec![Artifact::named(instance).at(path.clone())].into(),
        outputs: vec![Artifact::named(instance).exported_as(instance).at(path.clone())].into(),
        exec_unit: Some(serde_json::json!({
            "image": config.helper_image,
            "args": ["capture"],
            "env": { "INPUT_PATH": path },
        })),
        ..Template::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quasar_workflow::{StepBuilder, TemplateBuilder, WorkflowBuilder};

    #[test]
    fn injection_template_is_an_input_less_leaf() {
        let template = compile_injection(&InputTypeInstance::new("db", "abc"), &RenderConfig::default());
        assert_eq!(template.name, "inject-db");
        assert!(template.is_leaf());
        assert!(template.inputs.is_empty());
        assert_eq!(template.global_artifacts().collect::<Vec<_>>(), vec!["db"]);
        assert_eq!(
            template.exec_unit.as_ref().unwrap()["env"]["TYPE_INSTANCE_ID"],
            "abc"
        );
    }

    #[test]
    fn parameters_are_raw_json() {
        let artifact = parameters_artifact(&serde_json::json!({ "key": true })).unwrap();
        assert_eq!(artifact.name, PARAMETERS_ARTIFACT);
        assert_eq!(artifact.raw.unwrap().data, r#"{"key":true}"#);
    }

    fn workflow() -> Workflow {
        WorkflowBuilder::new("main")
            .template(
                TemplateBuilder::new("main").step(
                    StepBuilder::calling("install", "helm")
                        .requests("cluster")
                        .captures("release", "release-out"),
                ),
            )
            .template(TemplateBuilder::new("helm").exec_unit(serde_json::json!({})))
            .build()
            .unwrap()
    }

    #[test]
    fn requested_instances_become_arguments() {
        let mut wf = workflow();
        bind_type_instances(&mut wf, &RenderConfig::default());
        let step = &wf.templates[0].steps[0][0];
        assert!(step.requested_type_instances.is_empty());
        assert_eq!(
            step.arguments.get("cluster").and_then(|a| a.from.as_deref()),
            Some("{{workflow.outputs.artifacts.cluster}}")
        );
    }

    #[test]
    fn outputs_get_capture_steps() {
        let mut wf = workflow();
        let captures = bind_type_instances(&mut wf, &RenderConfig::default());

        assert_eq!(
            captures,
            vec![CaptureBinding {
                name: "release".into(),
                global_artifact: "release".into(),
                type_ref: None,
                step: "install".into(),
            }]
        );
        let main = &wf.templates[0];
        assert_eq!(main.steps.len(), 2);
        let capture = &main.steps[1][0];
        assert_eq!(capture.template.as_deref(), Some("output-release"));
        assert_eq!(
            capture.arguments.get("release").and_then(|a| a.from.as_deref()),
            Some("{{steps.install.outputs.artifacts.release-out}}")
        );
        let template = wf.template("output-release").unwrap();
        assert_eq!(template.global_artifacts().collect::<Vec<_>>(), vec!["release"]);
        assert!(main.steps[0][0].type_instance_outputs.is_empty());
    }
}
