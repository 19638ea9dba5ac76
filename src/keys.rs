//! Hierarchical cache keys for workflow data.
//!
//! Keys are ordered segment lists. A key scopes every key it is a prefix of,
//! so invalidating `["workflows"]` reaches every list, detail and execution
//! entry, and removing a detail entry reaches that workflow's executions.
//!
//! ```text
//! ["workflows"]
//! ├── ["workflows", "list"]
//! │   └── ["workflows", "list", {project, templates}]
//! └── ["workflows", "detail", id]
//!     └── ["workflows", "detail", id, "executions"]
//! ["workflow-templates"]
//! ```

use std::fmt;

const WORKFLOWS: &str = "workflows";
const LIST: &str = "list";
const DETAIL: &str = "detail";
const EXECUTIONS: &str = "executions";
const TEMPLATES: &str = "workflow-templates";

/// One segment of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
    /// Fixed scope name.
    Scope(&'static str),
    /// Resource identifier.
    Id(String),
    /// Listing filter; `None` project means "all projects".
    Filter {
        project_id: Option<String>,
        include_templates: bool,
    },
}

/// Stable, hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    fn root(scope: &'static str) -> Self {
        Self(vec![KeySegment::Scope(scope)])
    }

    fn child(
        &self,
        segment: KeySegment,
    ) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Whether `self` scopes `other`. Every key scopes itself.
    pub fn is_prefix_of(
        &self,
        other: &QueryKey,
    ) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| match s {
                KeySegment::Scope(name) => name.to_string(),
                KeySegment::Id(id) => id.clone(),
                KeySegment::Filter {
                    project_id,
                    include_templates,
                } => format!("{{project={},templates={}}}", project_id.as_deref().unwrap_or("*"), include_templates),
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Key factory for every workflow-related cache entry.
pub struct WorkflowKeys;

impl WorkflowKeys {
    /// Root scope for every workflow entry.
    pub fn all() -> QueryKey {
        QueryKey::root(WORKFLOWS)
    }

    /// Parent of every filtered listing.
    pub fn lists() -> QueryKey {
        Self::all().child(KeySegment::Scope(LIST))
    }

    /// One filtered listing.
    pub fn list(
        project_id: Option<&str>,
        include_templates: bool,
    ) -> QueryKey {
        Self::lists().child(KeySegment::Filter {
            project_id: project_id.map(str::to_string),
            include_templates,
        })
    }

    /// One workflow's metadata and canvas.
    pub fn detail(workflow_id: &str) -> QueryKey {
        Self::all().child(KeySegment::Scope(DETAIL)).child(KeySegment::Id(workflow_id.to_string()))
    }

    /// One workflow's run history, nested under its detail key.
    pub fn executions(workflow_id: &str) -> QueryKey {
        Self::detail(workflow_id).child(KeySegment::Scope(EXECUTIONS))
    }

    /// Template catalogue.
    pub fn templates() -> QueryKey {
        QueryKey::root(TEMPLATES)
    }
}
