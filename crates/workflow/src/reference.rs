//! Artifact placeholder parsing and rewriting.
//!
//! Two placeholder forms appear in artifact `from` fields:
//!
//! - `{{workflow.outputs.artifacts.<globalName>}}` -- an exported artifact,
//!   visible anywhere in the workflow
//! - `{{steps.<step>.outputs.artifacts.<name>}}` -- an output of a sibling
//!   step in the same template

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static WORKFLOW_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*workflow\.outputs\.artifacts\.([^}\s]+)\s*\}\}")
        .expect("workflow artifact pattern is valid")
});

static STEP_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*steps\.([^.}\s]+)\.outputs\.artifacts\.([^}\s]+)\s*\}\}")
        .expect("step artifact pattern is valid")
});

/// Placeholder referencing the exported artifact `global_name`.
#[must_use]
pub fn workflow_artifact(global_name: &str) -> String {
    format!("{{{{workflow.outputs.artifacts.{global_name}}}}}")
}

/// Placeholder referencing output `artifact` of sibling step `step`.
#[must_use]
pub fn step_artifact(step: &str, artifact: &str) -> String {
    format!("{{{{steps.{step}.outputs.artifacts.{artifact}}}}}")
}

/// Global artifact names referenced in `text`.
#[must_use]
pub fn workflow_artifact_refs(text: &str) -> Vec<&str> {
    WORKFLOW_ARTIFACT
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Sibling-step outputs referenced in `text`, as `(step, artifact)` pairs.
#[must_use]
pub fn step_artifact_refs(text: &str) -> Vec<(&str, &str)> {
    STEP_ARTIFACT
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}

/// Replace outputs of the steps in `globals` by a global artifact.
///
/// `globals` maps a step name to the global artifact now standing in for
/// every output of that step. Returns `None` if nothing changed.
#[must_use]
pub fn redirect_step_refs(text: &str, globals: &HashMap<String, String>) -> Option<String> {
    let mut changed = false;
    let out = STEP_ARTIFACT.replace_all(text, |caps: &Captures<'_>| match globals.get(&caps[1]) {
        Some(global) => {
            changed = true;
            workflow_artifact(global)
        }
        None => caps[0].to_owned(),
    });
    changed.then(|| out.into_owned())
}

/// Rewrite global artifact placeholders through `renames`.
///
/// Names missing from `renames` are left untouched. Returns `None` if nothing
/// changed.
#[must_use]
pub fn rename_workflow_artifacts(text: &str, renames: &HashMap<String, String>) -> Option<String> {
    let mut changed = false;
    let out = WORKFLOW_ARTIFACT.replace_all(text, |caps: &Captures<'_>| match renames.get(&caps[1]) {
        Some(new) => {
            changed = true;
            workflow_artifact(new)
        }
        None => caps[0].to_owned(),
    });
    changed.then(|| out.into_owned())
}

/// Rewrite sibling-step placeholders through `renames` (old step name to new).
///
/// Returns `None` if nothing changed.
#[must_use]
pub fn rename_step_refs(text: &str, renames: &HashMap<String, String>) -> Option<String> {
    let mut changed = false;
    let out = STEP_ARTIFACT.replace_all(text, |caps: &Captures<'_>| match renames.get(&caps[1]) {
        Some(new) => {
            changed = true;
            step_artifact(new, &caps[2])
        }
        None => caps[0].to_owned(),
    });
    changed.then(|| out.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| ((*a).to_owned(), (*b).to_owned()))
            .collect()
    }

    #[test]
    fn builds_placeholders() {
        assert_eq!(workflow_artifact("db"), "{{workflow.outputs.artifacts.db}}");
        assert_eq!(
            step_artifact("install", "out"),
            "{{steps.install.outputs.artifacts.out}}"
        );
    }

    #[test]
    fn extracts_workflow_refs() {
        let refs = workflow_artifact_refs(
            "{{workflow.outputs.artifacts.a}} and {{ workflow.outputs.artifacts.b-c }}",
        );
        assert_eq!(refs, vec!["a", "b-c"]);
        assert!(workflow_artifact_refs("{{steps.x.outputs.artifacts.y}}").is_empty());
    }

    #[test]
    fn renames_only_known_names() {
        let renames = map(&[("out", "main-install-out")]);
        assert_eq!(
            rename_workflow_artifacts("{{workflow.outputs.artifacts.out}}", &renames).as_deref(),
            Some("{{workflow.outputs.artifacts.main-install-out}}")
        );
        assert_eq!(
            rename_workflow_artifacts("{{workflow.outputs.artifacts.db}}", &renames),
            None
        );
    }

    #[test]
    fn extracts_step_refs() {
        assert_eq!(
            step_artifact_refs("{{steps.db.outputs.artifacts.cfg}} {{workflow.outputs.artifacts.x}}"),
            vec![("db", "cfg")]
        );
    }

    #[test]
    fn redirects_step_refs_to_globals() {
        let globals = map(&[("db", "db")]);
        assert_eq!(
            redirect_step_refs("{{steps.db.outputs.artifacts.conn}}", &globals).as_deref(),
            Some("{{workflow.outputs.artifacts.db}}")
        );
        assert_eq!(
            redirect_step_refs("{{steps.app.outputs.artifacts.conn}}", &globals),
            None
        );
    }

    #[test]
    fn renames_step_refs() {
        let renames = map(&[("install", "p-install")]);
        assert_eq!(
            rename_step_refs("{{steps.install.outputs.artifacts.cfg}}", &renames).as_deref(),
            Some("{{steps.p-install.outputs.artifacts.cfg}}")
        );
        assert_eq!(
            rename_step_refs("{{steps.other.outputs.artifacts.cfg}}", &renames),
            None
        );
    }
}
