use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityRef;

/// Lifecycle of a single task within one crew run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

/// A unit of work bound to exactly one agent, referenced by role.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    id: String,
    description: String,
    expected_output: String,
    agent: String,
    capabilities: Vec<CapabilityRef>,
    upstream: Vec<String>,
}

impl TaskSpec {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent_role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent_role.into(),
            capabilities: Vec::new(),
            upstream: Vec::new(),
        }
    }

    /// Capabilities usable for this task only. A non-empty list replaces the
    /// agent's own capabilities while the task runs.
    pub fn with_capability(mut self, capability: CapabilityRef) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Declare a task whose output becomes part of this task's context.
    pub fn with_upstream(mut self, task_id: impl Into<String>) -> Self {
        self.upstream.push(task_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    pub fn agent_role(&self) -> &str {
        &self.agent
    }

    pub fn capabilities(&self) -> &[CapabilityRef] {
        &self.capabilities
    }

    pub fn upstream(&self) -> &[String] {
        &self.upstream
    }

    pub(crate) fn context_key(task_id: &str) -> String {
        format!("task.{task_id}.output")
    }
}

/// Output of a completed task. Written once, read by downstream tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: String,
    pub agent_role: String,
    pub raw: String,
}

/// Substitute `{name}` placeholders with run inputs; unknown names stay as-is.
pub fn interpolate(template: &str, inputs: &BTreeMap<String, String>) -> String {
    inputs
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}
