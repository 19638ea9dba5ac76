//! Canvas node types and their typed configuration.
//!
//! On the wire a node carries a free-form `data` map. Its shape is fixed by
//! the node's [`NodeType`]: every type has a [`NodeSpec`], a JSON schema and
//! a [`NodeConfig`] variant. All three are resolved with exhaustive matches,
//! so a new node type cannot be added without its table entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::{FlowsyncError, Result};

/// node id
pub type NodeId = String;

/// Raw per-node data map as stored on the canvas.
pub type NodeData = Map<String, JsonValue>;

/// The 14 kinds of canvas node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    PersonaGeneration,
    SurveyCreation,
    SurveyDistribution,
    FocusGroupCreation,
    FocusGroupRun,
    Analysis,
    AiSummary,
    Decision,
    Delay,
    Loop,
    Webhook,
    Export,
}

/// Palette grouping used by editors.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeCategory {
    Flow,
    Research,
    Insight,
    Logic,
    Integration,
}

/// Static description of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    pub label: &'static str,
    pub category: NodeCategory,
    /// whether edges may point at this node
    pub accepts_input: bool,
    /// whether edges may leave this node
    pub produces_output: bool,
}

impl NodeType {
    pub fn spec(self) -> NodeSpec {
        use NodeCategory::*;

        let (label, category) = match self {
            NodeType::Start => ("Start", Flow),
            NodeType::End => ("End", Flow),
            NodeType::PersonaGeneration => ("Generate Personas", Research),
            NodeType::SurveyCreation => ("Create Survey", Research),
            NodeType::SurveyDistribution => ("Distribute Survey", Research),
            NodeType::FocusGroupCreation => ("Create Focus Group", Research),
            NodeType::FocusGroupRun => ("Run Focus Group", Research),
            NodeType::Analysis => ("Analysis", Insight),
            NodeType::AiSummary => ("AI Summary", Insight),
            NodeType::Decision => ("Decision", Logic),
            NodeType::Delay => ("Delay", Logic),
            NodeType::Loop => ("Loop", Logic),
            NodeType::Webhook => ("Webhook", Integration),
            NodeType::Export => ("Export", Integration),
        };

        NodeSpec {
            label,
            category,
            accepts_input: self != NodeType::Start,
            produces_output: self != NodeType::End,
        }
    }

    /// JSON schema the node's `data` map must satisfy.
    pub fn schema(self) -> JsonValue {
        match self {
            NodeType::Start => json!({
                "type": "object",
                "properties": {
                    "trigger": { "type": "string", "enum": ["manual", "scheduled"] },
                    "schedule": { "type": ["string", "null"] }
                }
            }),
            NodeType::End => json!({
                "type": "object",
                "properties": {
                    "output_key": { "type": ["string", "null"] }
                }
            }),
            NodeType::PersonaGeneration => json!({
                "type": "object",
                "properties": {
                    "count": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "description": { "type": ["string", "null"] },
                    "demographics": { "type": "object" }
                }
            }),
            NodeType::SurveyCreation => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "questions": { "type": "array", "items": { "type": "string" } }
                }
            }),
            NodeType::SurveyDistribution => json!({
                "type": "object",
                "properties": {
                    "survey_id": { "type": ["string", "null"] },
                    "target_responses": { "type": "integer", "minimum": 1 }
                }
            }),
            NodeType::FocusGroupCreation => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "topic": { "type": ["string", "null"] },
                    "persona_count": { "type": "integer", "minimum": 1, "maximum": 20 }
                }
            }),
            NodeType::FocusGroupRun => json!({
                "type": "object",
                "properties": {
                    "focus_group_id": { "type": ["string", "null"] },
                    "questions": { "type": "array", "items": { "type": "string" } },
                    "mode": { "type": "string", "enum": ["normal", "debate"] }
                }
            }),
            NodeType::Analysis => json!({
                "type": "object",
                "properties": {
                    "analysis_type": { "type": "string", "enum": ["sentiment", "themes", "statistics", "comparison"] },
                    "include_raw": { "type": "boolean" }
                }
            }),
            NodeType::AiSummary => json!({
                "type": "object",
                "properties": {
                    "style": { "type": "string", "enum": ["brief", "detailed"] },
                    "max_words": { "type": ["integer", "null"], "minimum": 1 }
                }
            }),
            NodeType::Decision => json!({
                "type": "object",
                "properties": {
                    "condition": { "type": "string" },
                    "true_label": { "type": ["string", "null"] },
                    "false_label": { "type": ["string", "null"] }
                }
            }),
            NodeType::Delay => json!({
                "type": "object",
                "properties": {
                    "seconds": { "type": "integer", "minimum": 0 }
                }
            }),
            NodeType::Loop => json!({
                "type": "object",
                "properties": {
                    "max_iterations": { "type": "integer", "minimum": 1 }
                }
            }),
            NodeType::Webhook => json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "method": { "type": "string", "enum": ["GET", "POST", "PUT"] }
                }
            }),
            NodeType::Export => json!({
                "type": "object",
                "properties": {
                    "format": { "type": "string", "enum": ["csv", "json", "pdf"] }
                }
            }),
        }
    }

    /// Checks a raw data map against the type's schema, returning every violation.
    pub fn check_data(
        self,
        data: &NodeData,
    ) -> Result<Vec<String>> {
        let schema = self.schema();
        let validator = jsonschema::validator_for(&schema)?;
        let instance = JsonValue::Object(data.clone());
        Ok(validator.iter_errors(&instance).map(|e| e.to_string()).collect())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartTrigger {
    #[default]
    Manual,
    Scheduled,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StartConfig {
    pub trigger: StartTrigger,
    pub schedule: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EndConfig {
    pub output_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PersonaGenerationConfig {
    pub count: u32,
    pub description: Option<String>,
    pub demographics: Map<String, JsonValue>,
}

impl Default for PersonaGenerationConfig {
    fn default() -> Self {
        Self {
            count: 5,
            description: None,
            demographics: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SurveyCreationConfig {
    pub title: String,
    pub questions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SurveyDistributionConfig {
    pub survey_id: Option<String>,
    pub target_responses: u32,
}

impl Default for SurveyDistributionConfig {
    fn default() -> Self {
        Self {
            survey_id: None,
            target_responses: 50,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FocusGroupCreationConfig {
    pub name: String,
    pub topic: Option<String>,
    pub persona_count: u32,
}

impl Default for FocusGroupCreationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            topic: None,
            persona_count: 6,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionMode {
    #[default]
    Normal,
    Debate,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FocusGroupRunConfig {
    pub focus_group_id: Option<String>,
    pub questions: Vec<String>,
    pub mode: DiscussionMode,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Sentiment,
    Themes,
    Statistics,
    Comparison,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub analysis_type: AnalysisType,
    pub include_raw: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStyle {
    #[default]
    Brief,
    Detailed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AiSummaryConfig {
    pub style: SummaryStyle,
    pub max_words: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    pub condition: String,
    pub true_label: Option<String>,
    pub false_label: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    pub seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    pub max_iterations: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Get,
    #[default]
    Post,
    Put,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    pub method: WebhookMethod,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    #[default]
    Json,
    Pdf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
}

/// Typed view over a node's data map, one variant per [`NodeType`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Start(StartConfig),
    End(EndConfig),
    PersonaGeneration(PersonaGenerationConfig),
    SurveyCreation(SurveyCreationConfig),
    SurveyDistribution(SurveyDistributionConfig),
    FocusGroupCreation(FocusGroupCreationConfig),
    FocusGroupRun(FocusGroupRunConfig),
    Analysis(AnalysisConfig),
    AiSummary(AiSummaryConfig),
    Decision(DecisionConfig),
    Delay(DelayConfig),
    Loop(LoopConfig),
    Webhook(WebhookConfig),
    Export(ExportConfig),
}

impl NodeConfig {
    /// Default configuration for a freshly placed node.
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Start => NodeConfig::Start(StartConfig::default()),
            NodeType::End => NodeConfig::End(EndConfig::default()),
            NodeType::PersonaGeneration => NodeConfig::PersonaGeneration(PersonaGenerationConfig::default()),
            NodeType::SurveyCreation => NodeConfig::SurveyCreation(SurveyCreationConfig::default()),
            NodeType::SurveyDistribution => NodeConfig::SurveyDistribution(SurveyDistributionConfig::default()),
            NodeType::FocusGroupCreation => NodeConfig::FocusGroupCreation(FocusGroupCreationConfig::default()),
            NodeType::FocusGroupRun => NodeConfig::FocusGroupRun(FocusGroupRunConfig::default()),
            NodeType::Analysis => NodeConfig::Analysis(AnalysisConfig::default()),
            NodeType::AiSummary => NodeConfig::AiSummary(AiSummaryConfig::default()),
            NodeType::Decision => NodeConfig::Decision(DecisionConfig::default()),
            NodeType::Delay => NodeConfig::Delay(DelayConfig::default()),
            NodeType::Loop => NodeConfig::Loop(LoopConfig::default()),
            NodeType::Webhook => NodeConfig::Webhook(WebhookConfig::default()),
            NodeType::Export => NodeConfig::Export(ExportConfig::default()),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Start(_) => NodeType::Start,
            NodeConfig::End(_) => NodeType::End,
            NodeConfig::PersonaGeneration(_) => NodeType::PersonaGeneration,
            NodeConfig::SurveyCreation(_) => NodeType::SurveyCreation,
            NodeConfig::SurveyDistribution(_) => NodeType::SurveyDistribution,
            NodeConfig::FocusGroupCreation(_) => NodeType::FocusGroupCreation,
            NodeConfig::FocusGroupRun(_) => NodeType::FocusGroupRun,
            NodeConfig::Analysis(_) => NodeType::Analysis,
            NodeConfig::AiSummary(_) => NodeType::AiSummary,
            NodeConfig::Decision(_) => NodeType::Decision,
            NodeConfig::Delay(_) => NodeType::Delay,
            NodeConfig::Loop(_) => NodeType::Loop,
            NodeConfig::Webhook(_) => NodeType::Webhook,
            NodeConfig::Export(_) => NodeType::Export,
        }
    }

    /// Parses a node's data map as the config of `node_type`.
    ///
    /// The map is checked against the type's schema first; keys the config
    /// does not know about (labels, editor state) are ignored.
    pub fn parse(
        node_type: NodeType,
        data: &NodeData,
    ) -> Result<Self> {
        let errors = node_type.check_data(data)?;
        if !errors.is_empty() {
            return Err(FlowsyncError::Node(format!("invalid {} config: {}", node_type, errors.join("; "))));
        }

        let value = JsonValue::Object(data.clone());
        let config = match node_type {
            NodeType::Start => NodeConfig::Start(serde_json::from_value(value)?),
            NodeType::End => NodeConfig::End(serde_json::from_value(value)?),
            NodeType::PersonaGeneration => NodeConfig::PersonaGeneration(serde_json::from_value(value)?),
            NodeType::SurveyCreation => NodeConfig::SurveyCreation(serde_json::from_value(value)?),
            NodeType::SurveyDistribution => NodeConfig::SurveyDistribution(serde_json::from_value(value)?),
            NodeType::FocusGroupCreation => NodeConfig::FocusGroupCreation(serde_json::from_value(value)?),
            NodeType::FocusGroupRun => NodeConfig::FocusGroupRun(serde_json::from_value(value)?),
            NodeType::Analysis => NodeConfig::Analysis(serde_json::from_value(value)?),
            NodeType::AiSummary => NodeConfig::AiSummary(serde_json::from_value(value)?),
            NodeType::Decision => NodeConfig::Decision(serde_json::from_value(value)?),
            NodeType::Delay => NodeConfig::Delay(serde_json::from_value(value)?),
            NodeType::Loop => NodeConfig::Loop(serde_json::from_value(value)?),
            NodeType::Webhook => NodeConfig::Webhook(serde_json::from_value(value)?),
            NodeType::Export => NodeConfig::Export(serde_json::from_value(value)?),
        };
        Ok(config)
    }

    /// Serializes the config back into a data map.
    pub fn to_data(&self) -> Result<NodeData> {
        let value = match self {
            NodeConfig::Start(c) => serde_json::to_value(c)?,
            NodeConfig::End(c) => serde_json::to_value(c)?,
            NodeConfig::PersonaGeneration(c) => serde_json::to_value(c)?,
            NodeConfig::SurveyCreation(c) => serde_json::to_value(c)?,
            NodeConfig::SurveyDistribution(c) => serde_json::to_value(c)?,
            NodeConfig::FocusGroupCreation(c) => serde_json::to_value(c)?,
            NodeConfig::FocusGroupRun(c) => serde_json::to_value(c)?,
            NodeConfig::Analysis(c) => serde_json::to_value(c)?,
            NodeConfig::AiSummary(c) => serde_json::to_value(c)?,
            NodeConfig::Decision(c) => serde_json::to_value(c)?,
            NodeConfig::Delay(c) => serde_json::to_value(c)?,
            NodeConfig::Loop(c) => serde_json::to_value(c)?,
            NodeConfig::Webhook(c) => serde_json::to_value(c)?,
            NodeConfig::Export(c) => serde_json::to_value(c)?,
        };

        match value {
            JsonValue::Object(map) => Ok(map),
            other => Err(FlowsyncError::Convert(format!("node config serialized to non-object: {}", other))),
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    fn data(value: JsonValue) -> NodeData {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_fourteen_node_types() {
        assert_eq!(NodeType::iter().count(), 14);
    }

    #[test]
    fn test_node_type_tags() {
        assert_eq!(NodeType::FocusGroupRun.as_ref(), "focus_group_run");
        assert_eq!(NodeType::from_str("persona_generation").unwrap(), NodeType::PersonaGeneration);
        assert_eq!(serde_json::to_value(NodeType::AiSummary).unwrap(), json!("ai_summary"));
        assert!(serde_json::from_value::<NodeType>(json!("teleport")).is_err());
    }

    #[test]
    fn test_every_default_config_passes_its_schema() {
        for node_type in NodeType::iter() {
            let config = NodeConfig::default_for(node_type);
            assert_eq!(config.node_type(), node_type);
            let data = config.to_data().unwrap();
            assert!(node_type.check_data(&data).unwrap().is_empty(), "{} default config is invalid", node_type);
            assert_eq!(NodeConfig::parse(node_type, &data).unwrap(), config);
        }
    }

    #[test]
    fn test_parse_ignores_editor_keys() {
        let config = NodeConfig::parse(NodeType::PersonaGeneration, &data(json!({ "label": "Gen", "count": 12 }))).unwrap();
        match config {
            NodeConfig::PersonaGeneration(c) => {
                assert_eq!(c.count, 12);
                assert!(c.description.is_none());
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_schema_violation() {
        let err = NodeConfig::parse(NodeType::PersonaGeneration, &data(json!({ "count": 500 }))).unwrap_err();
        assert!(matches!(err, FlowsyncError::Node(_)));

        let err = NodeConfig::parse(NodeType::Export, &data(json!({ "format": "xlsx" }))).unwrap_err();
        assert!(matches!(err, FlowsyncError::Node(_)));
    }

    #[test]
    fn test_webhook_method_wire_names() {
        assert_eq!(serde_json::to_value(WebhookMethod::Put).unwrap(), json!("PUT"));
        let config = NodeConfig::parse(NodeType::Webhook, &data(json!({ "url": "https://hooks.example.com/x", "method": "GET" }))).unwrap();
        match config {
            NodeConfig::Webhook(c) => assert_eq!(c.method, WebhookMethod::Get),
            other => panic!("unexpected config {:?}", other),
        }
        assert_eq!(WebhookConfig::default().method, WebhookMethod::Post);
        assert!(serde_json::from_value::<WebhookMethod>(json!("get")).is_err());
    }

    #[test]
    fn test_spec_io() {
        assert!(!NodeType::Start.spec().accepts_input);
        assert!(NodeType::Start.spec().produces_output);
        assert!(!NodeType::End.spec().produces_output);
        assert!(NodeType::Decision.spec().accepts_input);
        assert_eq!(NodeType::Analysis.spec().category, NodeCategory::Insight);
    }
}
