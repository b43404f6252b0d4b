//! CrewSearch core: role-specialised agents, tasks and a sequential crew
//! executor built on top of `graph_flow`.
//!
//! The crate is generic over the model runtime ([`ModelRuntime`]) and the
//! capabilities agents may invoke ([`Capability`]); the LinkUp web search and
//! an OpenAI-compatible runtime are provided.

mod agent;
mod capability;
mod config;
mod crew;
mod error;
mod executor;
mod metrics;
mod model;
pub mod redaction;
mod search;
mod security;
mod task;
mod telemetry;
mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use agent::{Agent, DelegationMode, DelegationPolicy};
pub use capability::{
    Capability, CapabilityError, CapabilityRef, RAW_INPUT_ARGUMENT, ToolCall, ToolDefinition,
};
pub use config::{
    Config, ConfigLoader, LoggingConfig, ModelConfig, PipelineConfig, SearchConfig,
};
pub use crew::{Crew, CrewOutput, CrewSettings, CrewState, Process};
pub use error::{CrewSearchError, ErrorKind, TaskError};
pub use executor::{
    ASK_QUESTION_TOOL, AgentExecutor, Assignment, DELEGATE_WORK_TOOL, ExecutorSettings,
    join_context,
};
pub use metrics::init_metrics_from_env;
pub use model::{
    ChatMessage, Completion, CompletionRequest, ModelError, ModelRuntime, OpenAiCompatRuntime,
    Role, strip_reasoning,
};
pub use redaction::{ERROR_PREFIX, error_text, is_error_text};
pub use search::{
    LinkupProvider, OutputType, SEARCH_TOOL_NAME, SearchCapability, SearchDepth, SearchProvider,
    SearchQuery,
};
pub use security::{CredentialSource, SecretValue, require_env};
pub use task::{TaskOutput, TaskSpec, TaskState, interpolate};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceHandle, TraceStep, TraceSummary, persist_trace};
