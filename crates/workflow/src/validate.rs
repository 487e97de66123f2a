//! Workflow validation that collects all errors.

use std::collections::HashSet;

use crate::definition::Workflow;
use crate::error::WorkflowError;
use crate::graph::TemplateGraph;
use crate::reference::{step_artifact_refs, workflow_artifact_refs};

/// Validate the structure of a workflow document.
///
/// Steps may still carry unresolved action references, and placeholders may
/// point at artifacts provided by an enclosing workflow. Every issue found is
/// reported, not just the first.
#[must_use]
pub fn validate_workflow(workflow: &Workflow) -> Vec<WorkflowError> {
    let mut errors = Vec::new();

    // 1. Entrypoint
    if workflow.entrypoint.is_empty() {
        errors.push(WorkflowError::EmptyEntrypoint);
    } else if !workflow.has_template(&workflow.entrypoint) {
        errors.push(WorkflowError::UnknownEntrypoint(workflow.entrypoint.clone()));
    }

    // 2. Unique template names
    let mut templates = HashSet::new();
    for template in &workflow.templates {
        if !templates.insert(template.name.as_str()) {
            errors.push(WorkflowError::DuplicateTemplate(template.name.clone()));
        }
    }

    // 3. Unique global artifact names
    let mut globals = HashSet::new();
    for name in workflow.global_artifacts() {
        if !globals.insert(name) {
            errors.push(WorkflowError::DuplicateGlobalArtifact(name.to_owned()));
        }
    }

    // 4. Step targets
    for (owner, step) in workflow.steps() {
        match (&step.template, &step.action) {
            (Some(target), _) if !templates.contains(target.as_str()) => {
                errors.push(WorkflowError::UnknownTemplate {
                    template: owner.to_owned(),
                    step: step.name.clone(),
                    target: target.clone(),
                });
            }
            (None, None) => errors.push(WorkflowError::MissingStepTarget {
                template: owner.to_owned(),
                step: step.name.clone(),
            }),
            _ => {}
        }
    }

    // 5. Acyclic call graph
    if TemplateGraph::from_workflow(workflow).has_cycle() {
        errors.push(WorkflowError::CycleDetected);
    }

    errors
}

/// Validate a fully rendered workflow.
///
/// On top of [`validate_workflow`], no step may carry an action reference and
/// every `{{workflow.outputs.artifacts.X}}` placeholder must name an artifact
/// some template exports. `{{steps.S.outputs.artifacts.X}}` placeholders must
/// name a step of the template that owns them.
#[must_use]
pub fn validate_rendered(workflow: &Workflow) -> Vec<WorkflowError> {
    let mut errors = validate_workflow(workflow);
    let globals: HashSet<&str> = workflow.global_artifacts().collect();

    for (owner, step) in workflow.steps() {
        if let Some(action) = &step.action {
            errors.push(WorkflowError::UnresolvedAction {
                template: owner.to_owned(),
                step: step.name.clone(),
                action: action.to_string(),
            });
        }
        let placeholders = step
            .arguments
            .artifacts
            .iter()
            .filter_map(|a| a.from.as_deref())
            .flat_map(workflow_artifact_refs);
        for artifact in placeholders {
            if !globals.contains(artifact) {
                errors.push(WorkflowError::DanglingArtifactReference {
                    template: owner.to_owned(),
                    step: step.name.clone(),
                    artifact: artifact.to_owned(),
                });
            }
        }
    }

    for template in &workflow.templates {
        let steps: HashSet<&str> = template.steps.iter().flatten().map(|s| s.name.as_str()).collect();
        let step_sources = template.steps.iter().flatten().flat_map(|step| {
            step.arguments
                .artifacts
                .iter()
                .map(move |a| (step.name.as_str(), a.from.as_deref()))
        });
        let output_sources = template
            .outputs
            .artifacts
            .iter()
            .map(|a| (a.name.as_str(), a.from.as_deref()));
        for (referrer, from) in step_sources.chain(output_sources) {
            for (target, _) in from.map(step_artifact_refs).unwrap_or_default() {
                if !steps.contains(target) {
                    errors.push(WorkflowError::UnknownStepReference {
                        template: template.name.clone(),
                        referrer: referrer.to_owned(),
                        target: target.to_owned(),
                    });
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ActionRef, Artifact, Template, WorkflowStep};
    use crate::reference::{step_artifact, workflow_artifact};
    use pretty_assertions::assert_eq;

    fn exporter(name: &str, global: &str) -> Template {
        let mut t = Template::new(name);
        t.exec_unit = Some(serde_json::json!({ "image": "alpine" }));
        t.outputs = vec![Artifact::named("out").exported_as(global)].into();
        t
    }

    fn consumer_step(name: &str, artifact: &str) -> WorkflowStep {
        let mut step = WorkflowStep::calling(name, "sink");
        step.arguments = vec![Artifact::named("in").source(workflow_artifact(artifact))].into();
        step
    }

    fn valid() -> Workflow {
        let mut main = Template::new("main");
        main.steps = vec![
            vec![WorkflowStep::calling("produce", "producer")],
            vec![consumer_step("consume", "result")],
        ];
        let mut sink = Template::new("sink");
        sink.exec_unit = Some(serde_json::json!({}));
        Workflow {
            entrypoint: "main".into(),
            templates: vec![main, exporter("producer", "result"), sink],
            ..Workflow::default()
        }
    }

    #[test]
    fn valid_workflow_has_no_errors() {
        let wf = valid();
        assert!(validate_workflow(&wf).is_empty());
        assert!(validate_rendered(&wf).is_empty());
    }

    #[test]
    fn reports_entrypoint_problems() {
        let mut wf = valid();
        wf.entrypoint = String::new();
        assert_eq!(validate_workflow(&wf), vec![WorkflowError::EmptyEntrypoint]);

        wf.entrypoint = "nope".into();
        assert_eq!(
            validate_workflow(&wf),
            vec![WorkflowError::UnknownEntrypoint("nope".into())]
        );
    }

    #[test]
    fn collects_all_duplicates() {
        let mut wf = valid();
        wf.templates.push(exporter("producer", "result"));
        let errors = validate_workflow(&wf);
        assert!(errors.contains(&WorkflowError::DuplicateTemplate("producer".into())));
        assert!(errors.contains(&WorkflowError::DuplicateGlobalArtifact("result".into())));
    }

    #[test]
    fn structural_validation_tolerates_pending_actions() {
        let mut wf = valid();
        wf.templates[0].steps[0].push(WorkflowStep::pending(
            "nested",
            ActionRef::Alias("pg.install".into()),
        ));
        assert!(validate_workflow(&wf).is_empty());

        let errors = validate_rendered(&wf);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], WorkflowError::UnresolvedAction { step, .. } if step == "nested"));
    }

    #[test]
    fn rendered_validation_reports_dangling_placeholders() {
        let mut wf = valid();
        wf.templates[0].steps[1].push(consumer_step("late", "missing"));
        assert_eq!(
            validate_rendered(&wf),
            vec![WorkflowError::DanglingArtifactReference {
                template: "main".into(),
                step: "late".into(),
                artifact: "missing".into(),
            }]
        );
    }

    #[test]
    fn rendered_validation_reports_unknown_step_outputs() {
        let mut wf = valid();
        let mut late = WorkflowStep::calling("late", "sink");
        late.arguments = vec![Artifact::named("in").source(step_artifact("produce", "out"))].into();
        wf.templates[0].steps[1].push(late);
        assert!(validate_rendered(&wf).is_empty());

        wf.templates[0].steps[1][1].arguments = vec![Artifact::named("in").source(step_artifact("gone", "out"))].into();
        wf.templates[0].outputs = vec![Artifact::named("final").source(step_artifact("vanished", "out"))].into();
        assert_eq!(
            validate_rendered(&wf),
            vec![
                WorkflowError::UnknownStepReference {
                    template: "main".into(),
                    referrer: "late".into(),
                    target: "gone".into(),
                },
                WorkflowError::UnknownStepReference {
                    template: "main".into(),
                    referrer: "final".into(),
                    target: "vanished".into(),
                },
            ]
        );
    }

    #[test]
    fn reports_missing_targets_and_cycles() {
        let mut wf = valid();
        wf.templates[0].steps[0].push(WorkflowStep {
            name: "empty".into(),
            ..WorkflowStep::default()
        });
        wf.templates[0].steps[0].push(WorkflowStep::calling("loop", "main"));
        wf.templates[0].steps[0].push(WorkflowStep::calling("ghost", "ghost"));
        let errors = validate_workflow(&wf);
        assert!(errors.contains(&WorkflowError::CycleDetected));
        assert!(errors.iter().any(|e| matches!(e, WorkflowError::MissingStepTarget { step, .. } if step == "empty")));
        assert!(errors.iter().any(|e| matches!(e, WorkflowError::UnknownTemplate { target, .. } if target == "ghost")));
    }
}
