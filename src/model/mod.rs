mod canvas;
mod execution;
mod node;
mod template;
mod validation;
mod workflow;

pub use canvas::{CanvasData, CanvasEdge, CanvasNode, EdgeId, Position, Viewport};
pub use execution::{ExecuteWorkflow, ExecutionMode, ExecutionOutcome, ExecutionStatus, WorkflowExecution};
pub use node::*;
pub use template::{InstantiateTemplate, WorkflowTemplate};
pub use validation::ValidationReport;
pub use workflow::{CreateWorkflow, UpdateWorkflow, Workflow, WorkflowFilter, WorkflowStatus};
