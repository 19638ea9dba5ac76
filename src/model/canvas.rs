//! The node/edge graph a workflow persists.
//!
//! `CanvasData` mirrors what the canvas editor saves: nodes with positions and
//! free-form data, and directed edges between node ids. Editing goes through
//! the methods below so that the node-type tag never changes after creation
//! and no edge can point at a missing node.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    FlowsyncError, Result,
    model::node::{NodeConfig, NodeData, NodeId, NodeType},
    utils,
};

/// edge id
pub type EdgeId = String;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// One step in the workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanvasNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

impl CanvasNode {
    /// Creates a node with a generated id and the type's default config.
    pub fn new(
        node_type: NodeType,
        position: Position,
    ) -> Result<Self> {
        Self::with_id(utils::shortid(), node_type, position)
    }

    pub fn with_id(
        id: impl Into<NodeId>,
        node_type: NodeType,
        position: Position,
    ) -> Result<Self> {
        let data = NodeConfig::default_for(node_type).to_data()?;
        Ok(Self {
            id: id.into(),
            node_type,
            position,
            data,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Typed view of this node's data.
    pub fn config(&self) -> Result<NodeConfig> {
        NodeConfig::parse(self.node_type, &self.data)
    }

    /// Replaces the config, keeping unrelated keys of the data map.
    pub fn set_config(
        &mut self,
        config: NodeConfig,
    ) -> Result<()> {
        if config.node_type() != self.node_type {
            return Err(FlowsyncError::Node(format!(
                "node {} is of type {}, cannot apply {} config",
                self.id,
                self.node_type,
                config.node_type()
            )));
        }
        for (key, value) in config.to_data()? {
            self.data.insert(key, value);
        }
        Ok(())
    }
}

/// A directed connection between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanvasEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CanvasData {
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl CanvasData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<CanvasData>(s).map_err(|e| FlowsyncError::Canvas(format!("{}", e)))
    }

    pub fn get_node(
        &self,
        id: &str,
    ) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_edge(
        &self,
        id: &str,
    ) -> Option<&CanvasEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// add a node of `node_type` and return its id
    pub fn add_node(
        &mut self,
        node_type: NodeType,
        position: Position,
    ) -> Result<NodeId> {
        let node = CanvasNode::new(node_type, position)?;
        let id = node.id.clone();
        self.insert_node(node)?;
        Ok(id)
    }

    /// insert a prepared node, rejecting duplicate ids
    pub fn insert_node(
        &mut self,
        node: CanvasNode,
    ) -> Result<()> {
        if self.get_node(&node.id).is_some() {
            return Err(FlowsyncError::Node(format!("node {} already exists", node.id)));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// remove a node together with every edge touching it
    pub fn remove_node(
        &mut self,
        id: &str,
    ) -> Result<CanvasNode> {
        let idx = self.nodes.iter().position(|n| n.id == id).ok_or(FlowsyncError::Node(format!("node {} not found", id)))?;
        self.edges.retain(|e| e.source != id && e.target != id);
        Ok(self.nodes.remove(idx))
    }

    pub fn move_node(
        &mut self,
        id: &str,
        position: Position,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        node.position = position;
        Ok(())
    }

    pub fn set_node_config(
        &mut self,
        id: &str,
        config: NodeConfig,
    ) -> Result<()> {
        self.node_mut(id)?.set_config(config)
    }

    /// connect two existing nodes and return the new edge id
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        label: Option<String>,
    ) -> Result<EdgeId> {
        if self.get_node(source).is_none() {
            return Err(FlowsyncError::Edge(format!("source node {} not found", source)));
        }
        if self.get_node(target).is_none() {
            return Err(FlowsyncError::Edge(format!("target node {} not found", target)));
        }

        let id = format!("e-{}-{}-{}", source, target, utils::shortid());
        self.edges.push(CanvasEdge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            label,
            source_handle: None,
        });
        Ok(id)
    }

    pub fn disconnect(
        &mut self,
        edge_id: &str,
    ) -> Result<CanvasEdge> {
        let idx = self.edges.iter().position(|e| e.id == edge_id).ok_or(FlowsyncError::Edge(format!("edge {} not found", edge_id)))?;
        Ok(self.edges.remove(idx))
    }

    /// Structural invariants every persisted canvas must hold: unique node and
    /// edge ids, and no edge referencing a node outside this canvas.
    pub fn check_integrity(&self) -> Result<()> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(FlowsyncError::Node(format!("duplicate node id {}", node.id)));
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(FlowsyncError::Edge(format!("duplicate edge id {}", edge.id)));
            }
            if !node_ids.contains(edge.source.as_str()) {
                return Err(FlowsyncError::Edge(format!("edge {}: source node {} not found", edge.id, edge.source)));
            }
            if !node_ids.contains(edge.target.as_str()) {
                return Err(FlowsyncError::Edge(format!("edge {}: target node {} not found", edge.id, edge.target)));
            }
        }

        Ok(())
    }

    fn node_mut(
        &mut self,
        id: &str,
    ) -> Result<&mut CanvasNode> {
        self.nodes.iter_mut().find(|n| n.id == id).ok_or(FlowsyncError::Node(format!("node {} not found", id)))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::{
        FlowsyncError,
        model::{
            canvas::{CanvasData, Position},
            node::{AnalysisConfig, AnalysisType, NodeConfig, NodeType, PersonaGenerationConfig},
        },
    };

    fn sample() -> (CanvasData, String, String) {
        let mut canvas = CanvasData::new();
        let start = canvas.add_node(NodeType::Start, Position::new(0.0, 0.0)).unwrap();
        let analysis = canvas.add_node(NodeType::Analysis, Position::new(200.0, 0.0)).unwrap();
        canvas.connect(&start, &analysis, None).unwrap();
        (canvas, start, analysis)
    }

    #[test]
    fn test_canvas_deserialize() {
        let canvas = CanvasData::from_json(
            r#"{
            "nodes": [
                { "id": "n1", "type": "start", "position": { "x": 0, "y": 0 }, "data": { "label": "Start" } },
                { "id": "n2", "type": "persona_generation", "position": { "x": 250, "y": 40 }, "data": { "count": 8 } }
            ],
            "edges": [
                { "id": "e1", "source": "n1", "target": "n2", "sourceHandle": "out" }
            ],
            "viewport": { "x": 0, "y": 0, "zoom": 1.0 }
        }"#,
        )
        .unwrap();

        assert_eq!(canvas.nodes.len(), 2);
        assert_eq!(canvas.nodes[1].node_type(), NodeType::PersonaGeneration);
        assert_eq!(canvas.edges[0].source_handle.as_deref(), Some("out"));
        assert!(canvas.check_integrity().is_ok());
        match canvas.nodes[1].config().unwrap() {
            NodeConfig::PersonaGeneration(c) => assert_eq!(c.count, 8),
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_canvas_rejects_unknown_node_type() {
        let err = CanvasData::from_json(r#"{ "nodes": [{ "id": "n1", "type": "teleport", "position": { "x": 0, "y": 0 } }] }"#).unwrap_err();
        assert!(matches!(err, FlowsyncError::Canvas(_)));
    }

    #[test]
    fn test_connect_requires_existing_nodes() {
        let (mut canvas, start, _) = sample();
        let err = canvas.connect(&start, "ghost", None).unwrap_err();
        assert!(matches!(err, FlowsyncError::Edge(_)));
        assert_eq!(canvas.edges.len(), 1);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let (mut canvas, _, analysis) = sample();
        canvas.remove_node(&analysis).unwrap();
        assert_eq!(canvas.nodes.len(), 1);
        assert!(canvas.edges.is_empty());
        assert!(canvas.check_integrity().is_ok());
    }

    #[test]
    fn test_dangling_edge_is_an_error() {
        let (mut canvas, _, analysis) = sample();
        canvas.nodes.retain(|n| n.id() != &analysis);
        let err = canvas.check_integrity().unwrap_err();
        assert!(matches!(err, FlowsyncError::Edge(_)));
    }

    #[test]
    fn test_duplicate_node_id_is_an_error() {
        let (mut canvas, start, _) = sample();
        let copy = canvas.get_node(&start).unwrap().clone();
        assert!(canvas.insert_node(copy.clone()).is_err());
        canvas.nodes.push(copy);
        assert!(matches!(canvas.check_integrity().unwrap_err(), FlowsyncError::Node(_)));
    }

    #[test]
    fn test_set_config_must_match_type() {
        let (mut canvas, _, analysis) = sample();
        let err = canvas.set_node_config(&analysis, NodeConfig::PersonaGeneration(PersonaGenerationConfig::default())).unwrap_err();
        assert!(matches!(err, FlowsyncError::Node(_)));

        canvas
            .set_node_config(
                &analysis,
                NodeConfig::Analysis(AnalysisConfig {
                    analysis_type: AnalysisType::Themes,
                    include_raw: true,
                }),
            )
            .unwrap();
        let node = canvas.get_node(&analysis).unwrap();
        assert_eq!(node.data.get("analysis_type"), Some(&json!("themes")));
        assert_eq!(node.node_type(), NodeType::Analysis);
    }

    #[test]
    fn test_move_and_disconnect() {
        let (mut canvas, start, _) = sample();
        canvas.move_node(&start, Position::new(10.0, 20.0)).unwrap();
        assert_eq!(canvas.get_node(&start).unwrap().position, Position::new(10.0, 20.0));

        let edge_id = canvas.edges[0].id.clone();
        canvas.disconnect(&edge_id).unwrap();
        assert!(canvas.get_edge(&edge_id).is_none());
        assert!(canvas.disconnect(&edge_id).is_err());
    }
}
