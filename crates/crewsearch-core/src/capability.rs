//! Capability contract: the external actions an agent may take during a task.
//!
//! A capability is handed to the model as a tool definition. When the model
//! asks for it, the agent executor invokes it and feeds the outcome back as
//! plain text, so a failing capability degrades an answer instead of failing
//! the task.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Argument key holding tool input that was not a JSON object.
pub const RAW_INPUT_ARGUMENT: &str = "input";

/// Failure raised by a capability provider.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl CapabilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential(_) => ErrorKind::Configuration,
            _ => ErrorKind::Capability,
        }
    }
}

/// Tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique tool name (letters, digits, `_` and `-` only).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, CapabilityError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Shared handle to a capability; cheap to clone into agents and tasks.
#[derive(Clone)]
pub struct CapabilityRef(Arc<dyn Capability>);

impl CapabilityRef {
    pub fn new<C>(capability: C) -> Self
    where
        C: Capability + 'static,
    {
        Self(Arc::new(capability))
    }

    pub fn from_arc(capability: Arc<dyn Capability>) -> Self {
        Self(capability)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn definition(&self) -> ToolDefinition {
        self.0.to_definition()
    }

    pub async fn invoke(&self, arguments: serde_json::Value) -> Result<String, CapabilityError> {
        self.0.invoke(arguments).await
    }
}

impl fmt::Debug for CapabilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapabilityRef").field(&self.name()).finish()
    }
}

/// Find a capability by tool name.
pub fn find<'a>(capabilities: &'a [CapabilityRef], name: &str) -> Option<&'a CapabilityRef> {
    capabilities.iter().find(|cap| cap.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        async fn invoke(&self, arguments: serde_json::Value) -> Result<String, CapabilityError> {
            arguments["text"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| CapabilityError::InvalidArguments("missing 'text'".into()))
        }
    }

    #[tokio::test]
    async fn capability_ref_dispatches_to_inner() {
        let caps = vec![CapabilityRef::new(Echo)];
        let echo = find(&caps, "echo").expect("echo registered");

        let out = echo
            .invoke(serde_json::json!({ "text": "hello" }))
            .await
            .unwrap();
        assert_eq!(out, "hello");
        assert!(find(&caps, "missing").is_none());
    }

    #[test]
    fn definition_mirrors_capability() {
        let def = CapabilityRef::new(Echo).definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["required"][0], "text");
    }

    #[test]
    fn missing_credential_is_configuration_kind() {
        assert_eq!(
            CapabilityError::MissingCredential("API_KEY".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            CapabilityError::Network("reset".into()).kind(),
            ErrorKind::Capability
        );
    }
}
