//! Template call graph built on `petgraph`.

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::definition::Workflow;
use crate::error::WorkflowError;

/// Directed graph with one node per template and an edge for every step that
/// calls another template.
#[derive(Debug)]
pub struct TemplateGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
}

impl TemplateGraph {
    /// Build the call graph of `workflow`.
    ///
    /// Steps with an unresolved action or an unknown template are skipped;
    /// [`validate_workflow`](crate::validate_workflow) reports those.
    #[must_use]
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for template in &workflow.templates {
            index_map
                .entry(template.name.clone())
                .or_insert_with(|| graph.add_node(template.name.clone()));
        }

        for (owner, step) in workflow.steps() {
            let Some(target) = step.template.as_deref() else {
                continue;
            };
            if let (Some(from), Some(to)) = (index_map.get(owner), index_map.get(target)) {
                graph.update_edge(*from, *to, ());
            }
        }

        Self { graph, index_map }
    }

    /// Returns `true` if some template (transitively) calls itself.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Templates in call order: callers before callees.
    pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
        let sorted = algo::toposort(&self.graph, None).map_err(|_| WorkflowError::CycleDetected)?;
        Ok(sorted
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Names of all templates reachable from `root`, including `root`.
    #[must_use]
    pub fn reachable_from(&self, root: &str) -> HashSet<String> {
        let Some(start) = self.index_map.get(root) else {
            return HashSet::new();
        };
        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, *start);
        while let Some(idx) = dfs.next(&self.graph) {
            reachable.insert(self.graph[idx].clone());
        }
        reachable
    }

    /// Number of templates in the graph.
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Template, WorkflowStep};
    use pretty_assertions::assert_eq;

    fn composite(name: &str, calls: &[&str]) -> Template {
        let mut t = Template::new(name);
        t.steps = vec![
            calls
                .iter()
                .map(|c| WorkflowStep::calling(format!("call-{c}"), *c))
                .collect(),
        ];
        t
    }

    fn workflow(templates: Vec<Template>) -> Workflow {
        Workflow {
            entrypoint: templates[0].name.clone(),
            templates,
            ..Workflow::default()
        }
    }

    #[test]
    fn linear_chain_is_acyclic() {
        let wf = workflow(vec![
            composite("main", &["a"]),
            composite("a", &["b"]),
            Template::new("b"),
        ]);
        let graph = TemplateGraph::from_workflow(&wf);
        assert!(!graph.has_cycle());
        assert_eq!(graph.topological_order().unwrap(), vec!["main", "a", "b"]);
    }

    #[test]
    fn self_call_is_a_cycle() {
        let wf = workflow(vec![composite("main", &["main"])]);
        let graph = TemplateGraph::from_workflow(&wf);
        assert!(graph.has_cycle());
        assert_eq!(
            graph.topological_order().unwrap_err(),
            WorkflowError::CycleDetected
        );
    }

    #[test]
    fn reachability_skips_orphans() {
        let wf = workflow(vec![
            composite("main", &["a"]),
            Template::new("a"),
            Template::new("orphan"),
        ]);
        let graph = TemplateGraph::from_workflow(&wf);
        let reachable = graph.reachable_from("main");
        assert_eq!(reachable.len(), 2);
        assert!(!reachable.contains("orphan"));
        assert!(graph.reachable_from("missing").is_empty());
        assert_eq!(graph.template_count(), 3);
    }
}
