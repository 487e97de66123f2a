//! Fixpoint renderer.
//!
//! The working graph starts as the root implementation's embedded workflow.
//! Each iteration collects every step still carrying an [`ActionRef`],
//! resolves it to one implementation, namespaces that implementation's
//! workflow under the step path and merges it in place of the step. The loop
//! ends when no pending step remains, so the number of iterations equals the
//! nesting depth that was inlined.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use quasar_core::{Implementation, Import, InputTypeInstance, ManifestRef, TypeInstanceId};
use quasar_ports::{ManifestRepository, TypeInstanceRepository};
use quasar_workflow::reference::redirect_step_refs;
use quasar_workflow::{
    ActionRef, Artifacts, TemplateGraph, Workflow, validate_rendered, validate_workflow,
};
use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::inject::{
    self, CaptureBinding, PARAMETERS_ARTIFACT, compile_injection, injection_step,
    parameters_artifact,
};
use crate::namespace::{Renames, namespace, prefixed, rewrite_from};
use crate::policy::{ImplementationPolicy, PolicyDecision, SelectionError, StrictPolicy};
use crate::state::{
    OutputBinding, RenderInput, RenderOutput, RenderProgress, RenderState, TemplateContext,
};

/// Step path and fragment name of the seed workflow.
const ROOT: &str = "root";

/// Flattens nested capability workflows.
///
/// Repositories and the selection policy are injected; the renderer keeps no
/// state between calls.
pub struct Renderer {
    manifests: Arc<dyn ManifestRepository>,
    type_instances: Arc<dyn TypeInstanceRepository>,
    policy: Arc<dyn ImplementationPolicy>,
    config: RenderConfig,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Renderer using [`StrictPolicy`] and the default [`RenderConfig`].
    pub fn new(
        manifests: Arc<dyn ManifestRepository>,
        type_instances: Arc<dyn TypeInstanceRepository>,
    ) -> Self {
        Self {
            manifests,
            type_instances,
            policy: Arc::new(StrictPolicy),
            config: RenderConfig::default(),
        }
    }

    /// Replace the implementation selection policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ImplementationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `input` to completion under the configured timeout.
    pub async fn render(&self, input: RenderInput) -> Result<RenderOutput, RenderError> {
        self.bounded(async {
            let mut state = self.seed(input).await?;
            loop {
                match self.iterate(state, usize::MAX).await? {
                    RenderProgress::Complete(output) => return Ok(output),
                    RenderProgress::InProgress(next) => state = next,
                }
            }
        })
        .await
    }

    /// Resolve the root implementation and build the initial working graph.
    ///
    /// Parameters and input Type-instances are wired in; no nested reference
    /// is expanded yet.
    pub async fn start(&self, input: RenderInput) -> Result<RenderState, RenderError> {
        self.bounded(self.seed(input)).await
    }

    /// Run at most `budget` fixpoint iterations on `state`.
    ///
    /// Returns [`RenderProgress::Complete`] as soon as no pending step
    /// remains, even with budget left. A budget of zero only checks for
    /// completion.
    pub async fn advance(
        &self,
        state: RenderState,
        budget: usize,
    ) -> Result<RenderProgress, RenderError> {
        self.bounded(self.iterate(state, budget)).await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, RenderError>>,
    ) -> Result<T, RenderError> {
        let after = self.config.timeout();
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| RenderError::Timeout { after })?
    }

    async fn seed(&self, input: RenderInput) -> Result<RenderState, RenderError> {
        let decision = self.select_root(&input.action_ref).await?;
        let implementation = decision.implementation;
        let mut workflow = extract_workflow(&implementation)?;

        let parameters = input
            .parameters
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        let artifact =
            parameters_artifact(&parameters).map_err(|e| RenderError::Parameters(e.to_string()))?;
        workflow
            .arguments
            .artifacts
            .retain(|a| a.name != PARAMETERS_ARTIFACT);
        workflow.arguments.artifacts.push(artifact);

        let context = TemplateContext {
            depth: 1,
            fragment: ROOT.to_owned(),
            implementation: implementation.path.clone(),
            imports: implementation.imports.clone(),
            parent: None,
        };
        let contexts = workflow
            .templates
            .iter()
            .map(|t| (t.name.clone(), context.clone()))
            .collect();

        let mut state = RenderState {
            action_ref: input.action_ref,
            implementation: implementation.reference(),
            workflow,
            provided: BTreeMap::new(),
            contexts,
            outputs: Vec::new(),
            iterations: 0,
        };

        for binding in input.input_type_instances.iter().chain(&decision.inject) {
            self.provide(&mut state, binding).await?;
        }

        let pruned = prune_provided(&mut state.workflow, &state.provided);
        let collected = collect_garbage(&mut state.workflow);
        state
            .contexts
            .retain(|name, _| state.workflow.has_template(name));

        let captures = inject::bind_type_instances(&mut state.workflow, &self.config);
        for template in &state.workflow.templates {
            state
                .contexts
                .entry(template.name.clone())
                .or_insert_with(|| context.clone());
        }
        state
            .outputs
            .extend(captures.into_iter().map(|c| output_binding(c, None)));

        info!(
            action_ref = %state.action_ref,
            implementation = %state.implementation,
            pending = state.pending(),
            pruned,
            collected,
            "Render started"
        );
        Ok(state)
    }

    async fn iterate(
        &self,
        mut state: RenderState,
        mut budget: usize,
    ) -> Result<RenderProgress, RenderError> {
        loop {
            prune_provided(&mut state.workflow, &state.provided);

            let pending: Vec<(String, String, ActionRef)> = state
                .workflow
                .steps()
                .filter_map(|(template, step)| {
                    step.action
                        .clone()
                        .map(|action| (template.to_owned(), step.name.clone(), action))
                })
                .collect();

            if pending.is_empty() {
                return self.finish(state).map(RenderProgress::Complete);
            }
            if budget == 0 {
                debug!(
                    iterations = state.iterations,
                    pending = pending.len(),
                    "Render budget spent"
                );
                return Ok(RenderProgress::InProgress(state));
            }
            budget -= 1;
            state.iterations += 1;

            debug!(
                iteration = state.iterations,
                pending = pending.len(),
                "Expanding pending steps"
            );
            for (template, step, action) in pending {
                self.expand(&mut state, &template, &step, &action).await?;
            }
        }
    }

    async fn expand(
        &self,
        state: &mut RenderState,
        template: &str,
        step: &str,
        action: &ActionRef,
    ) -> Result<(), RenderError> {
        let path = format!("{template}/{step}");
        let parent = state
            .contexts
            .get(template)
            .cloned()
            .ok_or_else(|| RenderError::InvalidWorkflow {
                implementation: state.implementation.path.clone(),
                reason: format!("template {template} has no render context"),
            })?;

        let depth = parent.depth + 1;
        if depth > self.config.max_depth {
            return Err(RenderError::MaxDepthExceeded {
                depth,
                max: self.config.max_depth,
                step: path,
            });
        }

        let interface = match action {
            ActionRef::Manifest(reference) => reference.clone(),
            ActionRef::Alias(alias) => Import::resolve(&parent.imports, alias).ok_or_else(|| {
                RenderError::UnresolvedImport {
                    step: path.clone(),
                    reference: alias.clone(),
                    implementation: parent.implementation.clone(),
                }
            })?,
        };

        let decision = self.select(&interface, &path).await?;
        for binding in &decision.inject {
            self.provide(state, binding).await?;
        }
        let implementation = decision.implementation;

        let mut nested = extract_workflow(&implementation)?;
        nested.arguments = Artifacts::default();
        prune_provided(&mut nested, &state.provided);
        collect_garbage(&mut nested);
        let captures = inject::bind_type_instances(&mut nested, &self.config);

        let prefix = prefixed(template, step);
        let (nested, renames) = namespace(&prefix, nested);

        if let Some(t) = nested
            .templates
            .iter()
            .find(|t| state.workflow.has_template(&t.name))
        {
            return Err(RenderError::TemplateNameCollision {
                name: t.name.clone(),
            });
        }
        {
            let existing: HashSet<&str> = state.workflow.global_artifacts().collect();
            if let Some(name) = nested.global_artifacts().find(|g| existing.contains(g)) {
                return Err(RenderError::ArtifactNameCollision {
                    name: name.to_owned(),
                });
            }
        }

        let context = TemplateContext {
            depth,
            fragment: prefix.clone(),
            implementation: implementation.path.clone(),
            imports: implementation.imports.clone(),
            parent: Some(template.to_owned()),
        };
        for t in &nested.templates {
            state.contexts.insert(t.name.clone(), context.clone());
        }
        state.outputs.extend(
            captures
                .into_iter()
                .map(|c| output_binding(c, Some((&prefix, &renames)))),
        );

        let merged = nested.templates.len();
        let entrypoint = nested.entrypoint;
        state.workflow.templates.extend(nested.templates);

        let Some(target) = state
            .workflow
            .template_mut(template)
            .and_then(|t| {
                t.steps
                    .iter_mut()
                    .flatten()
                    .find(|s| s.name == step && s.action.is_some())
            })
        else {
            return Err(RenderError::InvalidWorkflow {
                implementation: parent.implementation,
                reason: format!("pending step {path} disappeared during expansion"),
            });
        };
        target.template = Some(entrypoint);
        target.action = None;

        // References the enclosing fragment made to the nested exports.
        let exported: HashSet<String> = state
            .workflow
            .global_artifacts()
            .map(str::to_owned)
            .collect();
        let visible = Renames {
            templates: Default::default(),
            artifacts: renames
                .artifacts
                .into_iter()
                .filter(|(old, _)| !exported.contains(old))
                .collect(),
        };
        let mut rewritten = 0;
        for t in &mut state.workflow.templates {
            // Only the parent fragment saw the nested names; other fragments map their own.
            let in_fragment = state
                .contexts
                .get(&t.name)
                .is_some_and(|c| c.fragment == parent.fragment);
            if in_fragment && visible.rewrite_template(t) {
                rewritten += 1;
            }
        }

        debug!(
            step = %path,
            interface = %interface,
            implementation = %implementation.path,
            depth,
            merged,
            rewritten,
            "Inlined implementation"
        );
        Ok(())
    }

    /// Select the implementation for the root reference, which may name an
    /// interface or one implementation directly.
    async fn select_root(&self, reference: &ManifestRef) -> Result<PolicyDecision, RenderError> {
        let not_found = match self.select(reference, ROOT).await {
            Err(err @ RenderError::InterfaceNotFound { .. }) => err,
            other => return other,
        };
        match self.manifests.resolve_implementation(reference).await {
            Ok(implementation) => {
                debug!(implementation = %implementation.path, "Root references an implementation");
                Ok(PolicyDecision::new(implementation))
            }
            Err(err) if err.is_not_found() => Err(not_found),
            Err(err) => Err(RenderError::repository(reference.to_string(), err)),
        }
    }

    async fn select(
        &self,
        interface: &ManifestRef,
        step: &str,
    ) -> Result<PolicyDecision, RenderError> {
        let resolved = self
            .manifests
            .resolve_interface(interface)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    RenderError::InterfaceNotFound {
                        interface: interface.to_string(),
                        step: step.to_owned(),
                    }
                } else {
                    RenderError::repository(interface.to_string(), err)
                }
            })?;

        let reference = resolved.reference();
        let filter = self.policy.filter(&reference);
        let candidates = self
            .manifests
            .list_implementations(&reference, &filter)
            .await
            .map_err(|err| RenderError::repository(reference.to_string(), err))?;
        debug!(
            interface = %reference,
            step,
            candidates = candidates.len(),
            "Listed implementations"
        );

        self.policy
            .select(&reference, candidates)
            .map_err(|err| match err {
                SelectionError::NotFound => RenderError::ImplementationNotFound {
                    interface: interface.path.clone(),
                    step: step.to_owned(),
                },
                SelectionError::Ambiguous { candidates } => {
                    RenderError::AmbiguousImplementation {
                        interface: interface.path.clone(),
                        step: step.to_owned(),
                        candidates,
                    }
                }
            })
    }

    /// Wire `binding` into the working graph.
    ///
    /// A repeated binding with the same id is skipped; the same name bound to
    /// a different id is a collision.
    async fn provide(
        &self,
        state: &mut RenderState,
        binding: &InputTypeInstance,
    ) -> Result<(), RenderError> {
        match state.provided.get(&binding.name) {
            Some(id) if *id == binding.id => {
                debug!(name = %binding.name, id = %binding.id, "Type-instance already provided");
                return Ok(());
            }
            Some(_) => {
                return Err(RenderError::ArtifactNameCollision {
                    name: binding.name.clone(),
                });
            }
            None => {}
        }

        self.type_instances
            .get(&binding.id)
            .await
            .map_err(|source| RenderError::TypeInstanceUnavailable {
                name: binding.name.clone(),
                id: binding.id.clone(),
                source,
            })?;

        let template = compile_injection(binding, &self.config);
        if state.workflow.has_template(&template.name) {
            return Err(RenderError::TemplateNameCollision {
                name: template.name,
            });
        }

        let entrypoint = state.workflow.entrypoint.clone();
        if let Some(entry) = state.workflow.template_mut(&entrypoint) {
            entry.steps.insert(0, vec![injection_step(binding)]);
        }
        state.contexts.insert(
            template.name.clone(),
            TemplateContext {
                depth: 1,
                fragment: ROOT.to_owned(),
                implementation: state.implementation.path.clone(),
                imports: Vec::new(),
                parent: None,
            },
        );
        state.workflow.templates.push(template);
        state
            .provided
            .insert(binding.name.clone(), binding.id.clone());

        debug!(name = %binding.name, id = %binding.id, "Type-instance injected");
        Ok(())
    }

    fn finish(&self, mut state: RenderState) -> Result<RenderOutput, RenderError> {
        for step in state.workflow.steps_mut() {
            step.provides_instance = None;
        }
        collect_garbage(&mut state.workflow);

        let errors = validate_rendered(&state.workflow);
        if !errors.is_empty() {
            return Err(RenderError::from_validation(errors));
        }

        let globals: HashSet<&str> = state.workflow.global_artifacts().collect();
        let output_type_instances: Vec<OutputBinding> = state
            .outputs
            .into_iter()
            .filter(|o| globals.contains(o.global_artifact.as_str()))
            .collect();
        let type_instances_to_lock: Vec<TypeInstanceId> = state.provided.into_values().collect();

        info!(
            implementation = %state.implementation,
            iterations = state.iterations,
            templates = state.workflow.templates.len(),
            outputs = output_type_instances.len(),
            "Render complete"
        );

        Ok(RenderOutput {
            workflow: state.workflow,
            implementation: state.implementation,
            iterations: state.iterations,
            output_type_instances,
            type_instances_to_lock,
        })
    }
}

fn output_binding(capture: CaptureBinding, namespaced: Option<(&str, &Renames)>) -> OutputBinding {
    match namespaced {
        None => OutputBinding {
            name: capture.name,
            global_artifact: capture.global_artifact,
            type_ref: capture.type_ref,
            step: capture.step,
        },
        Some((prefix, renames)) => OutputBinding {
            global_artifact: renames
                .artifacts
                .get(&capture.global_artifact)
                .cloned()
                .unwrap_or(capture.global_artifact),
            step: prefixed(prefix, &capture.step),
            name: capture.name,
            type_ref: capture.type_ref,
        },
    }
}

/// Embedded workflow of an implementation run by the workflow runner.
fn extract_workflow(implementation: &Implementation) -> Result<Workflow, RenderError> {
    if !implementation.uses_workflow_runner() {
        return Err(RenderError::UnsupportedRunner {
            implementation: implementation.path.clone(),
            runner: implementation.action.runner.clone(),
        });
    }

    let invalid = |reason: String| RenderError::InvalidWorkflow {
        implementation: implementation.path.clone(),
        reason,
    };
    let raw = implementation
        .action
        .args
        .get("workflow")
        .cloned()
        .ok_or_else(|| invalid("action.args.workflow is missing".to_owned()))?;
    let workflow: Workflow = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;

    let errors = validate_workflow(&workflow);
    if !errors.is_empty() {
        let reason = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(invalid(reason));
    }
    Ok(workflow)
}

/// Drop steps producing an already provided Type-instance, along with step
/// groups left empty. Returns the number of removed steps.
fn prune_provided(workflow: &mut Workflow, provided: &BTreeMap<String, TypeInstanceId>) -> usize {
    let mut removed = 0;
    for template in &mut workflow.templates {
        // Pruned step name to the global artifact of the instance it provided.
        let mut redirects = HashMap::new();
        for group in &mut template.steps {
            group.retain(|s| match &s.provides_instance {
                Some(name) if provided.contains_key(name) => {
                    redirects.insert(s.name.clone(), name.clone());
                    false
                }
                _ => true,
            });
        }
        template.steps.retain(|group| !group.is_empty());
        if redirects.is_empty() {
            continue;
        }
        removed += redirects.len();

        let redirect = |from: &str| redirect_step_refs(from, &redirects);
        rewrite_from(&mut template.outputs, redirect);
        for step in template.steps.iter_mut().flatten() {
            rewrite_from(&mut step.arguments, redirect);
        }
    }
    removed
}

/// Drop templates unreachable from the entrypoint. Returns how many went.
fn collect_garbage(workflow: &mut Workflow) -> usize {
    let reachable = TemplateGraph::from_workflow(workflow).reachable_from(&workflow.entrypoint);
    let before = workflow.templates.len();
    workflow.templates.retain(|t| reachable.contains(&t.name));
    before - workflow.templates.len()
}
