//! Implementation selection policy.
//!
//! The renderer never guesses between candidate implementations: the policy
//! either picks exactly one, or selection fails.

use std::collections::HashMap;

use quasar_core::{Implementation, InputTypeInstance, ManifestRef};
use quasar_ports::ImplementationFilter;

/// Outcome of a successful selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    /// The chosen implementation.
    pub implementation: Implementation,
    /// Type-instances the policy wants injected for this implementation.
    pub inject: Vec<InputTypeInstance>,
}

impl PolicyDecision {
    /// Decision for `implementation` with nothing to inject.
    #[must_use]
    pub fn new(implementation: Implementation) -> Self {
        Self {
            implementation,
            inject: Vec::new(),
        }
    }
}

/// Why a policy could not select an implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// No candidate remained.
    NotFound,
    /// More than one candidate remained and nothing broke the tie.
    Ambiguous {
        /// Paths of the competing implementations.
        candidates: Vec<String>,
    },
}

/// Chooses one implementation for an interface.
pub trait ImplementationPolicy: Send + Sync {
    /// Filter applied when listing candidates for `interface`.
    fn filter(&self, _interface: &ManifestRef) -> ImplementationFilter {
        ImplementationFilter::default()
    }

    /// Pick one of `candidates`.
    fn select(
        &self,
        interface: &ManifestRef,
        candidates: Vec<Implementation>,
    ) -> Result<PolicyDecision, SelectionError>;
}

/// Accepts exactly one candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl ImplementationPolicy for StrictPolicy {
    fn select(
        &self,
        _interface: &ManifestRef,
        candidates: Vec<Implementation>,
    ) -> Result<PolicyDecision, SelectionError> {
        single(candidates)
    }
}

fn single(mut candidates: Vec<Implementation>) -> Result<PolicyDecision, SelectionError> {
    match candidates.len() {
        0 => Err(SelectionError::NotFound),
        1 => Ok(PolicyDecision::new(candidates.remove(0))),
        _ => Err(SelectionError::Ambiguous {
            candidates: candidates.into_iter().map(|c| c.path).collect(),
        }),
    }
}

/// Rule-based policy.
///
/// Candidates are narrowed by `required_attributes`, then the first path in
/// `preferred` that is among them wins. Without a preferred match the policy
/// behaves like [`StrictPolicy`]. Type-instances listed under an interface
/// path in `inject` are handed to the renderer whenever that interface is
/// resolved.
#[derive(Debug, Clone, Default)]
pub struct PreferencePolicy {
    /// Implementation paths in order of preference.
    pub preferred: Vec<String>,
    /// Attribute paths every candidate must carry.
    pub required_attributes: Vec<String>,
    /// Type-instances to inject, keyed by interface path.
    pub inject: HashMap<String, Vec<InputTypeInstance>>,
}

impl PreferencePolicy {
    /// Empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer `path` after all previously added preferences.
    #[must_use]
    pub fn prefer(mut self, path: impl Into<String>) -> Self {
        self.preferred.push(path.into());
        self
    }

    /// Require attribute `path` on every candidate.
    #[must_use]
    pub fn require_attribute(mut self, path: impl Into<String>) -> Self {
        self.required_attributes.push(path.into());
        self
    }

    /// Inject `binding` whenever `interface` is resolved.
    #[must_use]
    pub fn inject_for(mut self, interface: impl Into<String>, binding: InputTypeInstance) -> Self {
        self.inject.entry(interface.into()).or_default().push(binding);
        self
    }
}

impl ImplementationPolicy for PreferencePolicy {
    fn filter(&self, _interface: &ManifestRef) -> ImplementationFilter {
        ImplementationFilter {
            required_attributes: self.required_attributes.clone(),
            excluded_paths: Vec::new(),
        }
    }

    fn select(
        &self,
        interface: &ManifestRef,
        mut candidates: Vec<Implementation>,
    ) -> Result<PolicyDecision, SelectionError> {
        let preferred = self
            .preferred
            .iter()
            .find_map(|path| candidates.iter().position(|c| &c.path == path));

        let mut decision = match preferred {
            Some(idx) => PolicyDecision::new(candidates.swap_remove(idx)),
            None => single(candidates)?,
        };
        if let Some(inject) = self.inject.get(&interface.path) {
            decision.inject.clone_from(inject);
        }
        Ok(decision)
    }
}
