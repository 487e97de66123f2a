//! Deterministic renaming of a nested workflow before it is merged.
//!
//! Every template name, every exported artifact name and every step name of
//! the nested workflow becomes `<prefix>-<name>`. The prefix is derived from
//! the step path that inlines the workflow, so two inlined implementations
//! that both define `main` land as `<pathA>-main` and `<pathB>-main`.

use std::collections::HashMap;

use quasar_workflow::reference::{rename_step_refs, rename_workflow_artifacts};
use quasar_workflow::{Artifacts, Template, Workflow};

/// Old-to-new name mappings produced by [`namespace`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renames {
    /// Template renames.
    pub templates: HashMap<String, String>,
    /// Exported (global) artifact renames.
    pub artifacts: HashMap<String, String>,
}

impl Renames {
    /// Rewrite global artifact placeholders in every `from` of `artifacts`.
    ///
    /// Returns `true` if anything changed.
    pub fn rewrite_artifacts(&self, artifacts: &mut Artifacts) -> bool {
        rewrite_from(artifacts, |from| rename_workflow_artifacts(from, &self.artifacts))
    }

    /// Rewrite every global artifact placeholder used by `template`'s steps
    /// and outputs.
    pub fn rewrite_template(&self, template: &mut Template) -> bool {
        let mut changed = self.rewrite_artifacts(&mut template.outputs);
        for step in template.steps.iter_mut().flatten() {
            changed |= self.rewrite_artifacts(&mut step.arguments);
        }
        changed
    }
}

/// Prefix `name`.
#[must_use]
pub fn prefixed(prefix: &str, name: &str) -> String {
    format!("{prefix}-{name}")
}

/// Rename `workflow` under `prefix`.
///
/// Placeholders referring to names the nested workflow does not export
/// itself are left alone: they point at artifacts of the enclosing graph.
/// Workflow-level arguments are returned unchanged.
#[must_use]
pub fn namespace(prefix: &str, mut workflow: Workflow) -> (Workflow, Renames) {
    let mut renames = Renames::default();
    for template in &workflow.templates {
        renames
            .templates
            .insert(template.name.clone(), prefixed(prefix, &template.name));
    }
    for global in workflow.global_artifacts() {
        renames
            .artifacts
            .insert(global.to_owned(), prefixed(prefix, global));
    }

    for template in &mut workflow.templates {
        template.name = prefixed(prefix, &template.name);

        for artifact in &mut template.outputs.artifacts {
            if let Some(global) = artifact.global_name.as_mut() {
                *global = prefixed(prefix, global);
            }
        }

        let steps: HashMap<String, String> = template
            .steps
            .iter()
            .flatten()
            .map(|s| (s.name.clone(), prefixed(prefix, &s.name)))
            .collect();

        rewrite_from(&mut template.outputs, |from| rename_step_refs(from, &steps));
        for step in template.steps.iter_mut().flatten() {
            step.name = prefixed(prefix, &step.name);
            if let Some(target) = step.template.as_mut()
                && let Some(new) = renames.templates.get(target.as_str())
            {
                target.clone_from(new);
            }
            rewrite_from(&mut step.arguments, |from| rename_step_refs(from, &steps));
        }

        renames.rewrite_template(template);
    }

    workflow.entrypoint = prefixed(prefix, &workflow.entrypoint);
    (workflow, renames)
}

/// Apply `rewrite` to every `from` of `artifacts`. Returns `true` if anything changed.
pub(crate) fn rewrite_from(artifacts: &mut Artifacts, rewrite: impl Fn(&str) -> Option<String>) -> bool {
    let mut changed = false;
    for artifact in &mut artifacts.artifacts {
        if let Some(new) = artifact.from.as_deref().and_then(&rewrite) {
            artifact.from = Some(new);
            changed = true;
        }
    }
    changed
}
