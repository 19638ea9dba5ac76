//! Validation reports, and the local canvas validator.
//!
//! The backend exposes `POST /workflows/{id}/validate`; the same report shape
//! is produced locally so editors can flag problems before saving.

use std::collections::{HashMap, HashSet};

use petgraph::{
    algo::is_cyclic_directed,
    graph::{DiGraph, NodeIndex},
    visit::Dfs,
};
use serde::{Deserialize, Serialize};

use crate::model::{canvas::CanvasData, node::NodeType};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_findings(
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl CanvasData {
    /// Validates the canvas as a runnable workflow.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.nodes.is_empty() {
            warnings.push("workflow has no nodes".to_string());
            return ValidationReport::from_findings(errors, warnings);
        }

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for node in &self.nodes {
            if indices.contains_key(node.id().as_str()) {
                errors.push(format!("duplicate node id {}", node.id()));
                continue;
            }
            indices.insert(node.id().as_str(), graph.add_node(node.id().as_str()));

            match node.node_type().check_data(&node.data) {
                Ok(violations) => {
                    for v in violations {
                        errors.push(format!("node {} ({}): {}", node.id(), node.node_type(), v));
                    }
                }
                Err(e) => errors.push(format!("node {} ({}): {}", node.id(), node.node_type(), e)),
            }
        }

        let types: HashMap<&str, NodeType> = self.nodes.iter().map(|n| (n.id().as_str(), n.node_type())).collect();
        let mut edge_ids = HashSet::new();
        let mut connections = HashSet::new();

        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                errors.push(format!("duplicate edge id {}", edge.id));
                continue;
            }

            let (Some(source), Some(target)) = (indices.get(edge.source.as_str()), indices.get(edge.target.as_str())) else {
                errors.push(format!("edge {} references a missing node ({} -> {})", edge.id, edge.source, edge.target));
                continue;
            };

            if edge.source == edge.target {
                errors.push(format!("edge {} connects node {} to itself", edge.id, edge.source));
                continue;
            }
            if types.get(edge.target.as_str()).is_some_and(|t| !t.spec().accepts_input) {
                errors.push(format!("edge {} points into {} node {}", edge.id, NodeType::Start, edge.target));
            }
            if types.get(edge.source.as_str()).is_some_and(|t| !t.spec().produces_output) {
                errors.push(format!("edge {} leaves {} node {}", edge.id, NodeType::End, edge.source));
            }
            if !connections.insert((edge.source.as_str(), edge.target.as_str())) {
                warnings.push(format!("nodes {} and {} are connected more than once", edge.source, edge.target));
            }

            graph.add_edge(*source, *target, ());
        }

        let starts: Vec<&str> = self.nodes.iter().filter(|n| n.node_type() == NodeType::Start).map(|n| n.id().as_str()).collect();
        match starts.len() {
            0 => errors.push("workflow has no start node".to_string()),
            1 => {}
            n => errors.push(format!("workflow has {} start nodes, expected one", n)),
        }

        if !self.nodes.iter().any(|n| n.node_type() == NodeType::End) {
            warnings.push("workflow has no end node".to_string());
        }

        if let [start] = starts.as_slice() {
            if let Some(root) = indices.get(start) {
                let mut reached = HashSet::new();
                let mut dfs = Dfs::new(&graph, *root);
                while let Some(idx) = dfs.next(&graph) {
                    reached.insert(idx);
                }
                for idx in graph.node_indices() {
                    if !reached.contains(&idx) {
                        warnings.push(format!("node {} is not reachable from start", graph[idx]));
                    }
                }
            }
        }

        if is_cyclic_directed(&graph) {
            warnings.push("workflow contains a cycle".to_string());
        }

        ValidationReport::from_findings(errors, warnings)
    }
}
