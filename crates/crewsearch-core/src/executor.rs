//! Agent executor: a bounded tool-calling loop against the model runtime.
//!
//! Capability failures never leave the loop as errors. They are handed back to
//! the model as `"Error: <message>"` tool results so it can recover or report
//! them. Only model-runtime failures and empty answers fail a task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::{Agent, DelegationMode, normalize_role};
use crate::capability::{self, CapabilityRef, ToolCall, ToolDefinition};
use crate::metrics::record_capability;
use crate::model::{ChatMessage, CompletionRequest, ModelRuntime, strip_reasoning};
use crate::redaction::error_text;
use crate::trace::TraceHandle;
use crate::{ErrorKind, TaskError};

pub const DELEGATE_WORK_TOOL: &str = "delegate_work";
pub const ASK_QUESTION_TOOL: &str = "ask_question";

const CONTEXT_DIVIDER: &str = "\n\n----------\n\n";
const FORCE_ANSWER_PROMPT: &str = "You have used the maximum number of tool calls for this task. Do not call any more tools. Give your best Final Answer now, based on what you already know.";
const COWORKER_EXPECTED_OUTPUT: &str =
    "Your best answer to your coworker asking you this, accounting for the context shared.";

/// Knobs of the executor loop, shared by every task in a crew.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_iterations: u32,
    pub temperature: f32,
    pub delegation: DelegationMode,
    pub max_delegations: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            temperature: 0.7,
            delegation: DelegationMode::Enforced,
            max_delegations: 3,
        }
    }
}

/// What one agent is asked to do.
pub struct Assignment<'a> {
    pub task_id: &'a str,
    pub description: &'a str,
    pub expected_output: &'a str,
    pub context: &'a str,
    /// Task-bound capabilities; empty falls back to the agent's own.
    pub capabilities: &'a [CapabilityRef],
}

type BoxedInvocation<'a> = Pin<Box<dyn Future<Output = Result<String, TaskError>> + Send + 'a>>;

pub struct AgentExecutor {
    runtime: Arc<dyn ModelRuntime>,
    settings: ExecutorSettings,
}

impl AgentExecutor {
    pub fn new(runtime: Arc<dyn ModelRuntime>, settings: ExecutorSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run `agent` on `assignment`; `roster` is every agent of the crew and is
    /// only consulted for delegation.
    pub async fn execute(
        &self,
        agent: &Agent,
        assignment: Assignment<'_>,
        roster: &[Arc<Agent>],
        trace: &TraceHandle,
    ) -> Result<String, TaskError> {
        let capabilities = if assignment.capabilities.is_empty() {
            agent.capabilities()
        } else {
            assignment.capabilities
        };

        let coworkers: Vec<&Agent> = roster
            .iter()
            .map(Arc::as_ref)
            .filter(|candidate| {
                candidate.role() != agent.role() && agent.delegation().allows(candidate.role())
            })
            .collect();

        let delegation = (self.settings.delegation == DelegationMode::Enforced
            && agent.can_delegate())
        .then(|| Delegation {
            policy_roles: agent.delegation().coworkers().to_vec(),
            coworkers,
            remaining: self.settings.max_delegations,
        });

        let messages = vec![
            ChatMessage::system(system_prompt(
                agent,
                self.settings.delegation,
                !capabilities.is_empty(),
            )),
            ChatMessage::user(task_prompt(
                assignment.description,
                assignment.expected_output,
                assignment.context,
            )),
        ];

        self.run_loop(
            agent,
            assignment.task_id,
            messages,
            capabilities,
            delegation,
            trace,
        )
        .await
    }

    async fn run_loop(
        &self,
        agent: &Agent,
        task_id: &str,
        mut messages: Vec<ChatMessage>,
        capabilities: &[CapabilityRef],
        mut delegation: Option<Delegation<'_>>,
        trace: &TraceHandle,
    ) -> Result<String, TaskError> {
        let mut tools: Vec<ToolDefinition> =
            capabilities.iter().map(CapabilityRef::definition).collect();
        if let Some(scope) = &delegation {
            tools.extend(delegation_tools(&scope.policy_roles));
        }

        for iteration in 0..self.settings.max_iterations {
            let completion = self
                .runtime
                .complete(CompletionRequest {
                    messages: messages.clone(),
                    tools: tools.clone(),
                    temperature: self.settings.temperature,
                })
                .await
                .map_err(|err| {
                    TaskError::invocation(format!("{} runtime: {err}", self.runtime.name()))
                })?;

            if completion.tool_calls.is_empty() {
                return final_answer(&completion.content, agent.role());
            }

            debug!(
                role = agent.role(),
                iteration,
                calls = completion.tool_calls.len(),
                "agent requested tools"
            );
            messages.push(ChatMessage::assistant_with_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));

            for call in &completion.tool_calls {
                let result = self
                    .dispatch(call, capabilities, delegation.as_mut(), task_id, trace)
                    .await;
                messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }

        warn!(
            role = agent.role(),
            max_iterations = self.settings.max_iterations,
            "iteration limit reached; forcing final answer"
        );
        trace.record(task_id, format!("{} hit the iteration limit", agent.role()));
        messages.push(ChatMessage::user(FORCE_ANSWER_PROMPT));

        let completion = self
            .runtime
            .complete(CompletionRequest {
                messages,
                tools: Vec::new(),
                temperature: self.settings.temperature,
            })
            .await
            .map_err(|err| {
                TaskError::invocation(format!("{} runtime: {err}", self.runtime.name()))
            })?;

        final_answer(&completion.content, agent.role())
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        capabilities: &[CapabilityRef],
        delegation: Option<&mut Delegation<'_>>,
        task_id: &str,
        trace: &TraceHandle,
    ) -> String {
        if call.name == DELEGATE_WORK_TOOL || call.name == ASK_QUESTION_TOOL {
            return match delegation {
                Some(scope) => self.delegate(call, scope, task_id, trace).await,
                None => error_text(format!("tool '{}' is not available to you", call.name)),
            };
        }

        let Some(capability) = capability::find(capabilities, &call.name) else {
            trace.record(task_id, format!("unknown tool {}", call.name));
            return error_text(format!("unknown tool '{}'", call.name));
        };

        match capability.invoke(call.arguments.clone()).await {
            Ok(text) => {
                record_capability(capability.name(), true);
                trace.record(task_id, format!("tool {} ok", capability.name()));
                text
            }
            Err(err) => {
                record_capability(capability.name(), false);
                warn!(capability = capability.name(), error = %err, "capability failed");
                trace.record(task_id, format!("tool {} failed", capability.name()));
                error_text(err)
            }
        }
    }

    async fn delegate(
        &self,
        call: &ToolCall,
        scope: &mut Delegation<'_>,
        task_id: &str,
        trace: &TraceHandle,
    ) -> String {
        let request = match DelegationRequest::parse(&call.name, &call.arguments) {
            Ok(request) => request,
            Err(message) => return error_text(message),
        };

        if scope.remaining == 0 {
            return error_text(format!(
                "delegation limit reached for this task ({} per task)",
                self.settings.max_delegations
            ));
        }

        let Some(coworker) = scope
            .coworkers
            .iter()
            .find(|agent| normalize_role(agent.role()) == normalize_role(&request.coworker))
            .copied()
        else {
            trace.record(task_id, format!("delegation to {} rejected", request.coworker));
            return error_text(format!(
                "coworker '{}' is not available; choose one of: {}",
                request.coworker,
                scope.policy_roles.join(", ")
            ));
        };

        scope.remaining -= 1;
        info!(coworker = coworker.role(), tool = %call.name, "delegating to coworker");
        trace.record(task_id, format!("{} -> {}", call.name, coworker.role()));

        match self
            .invoke_coworker(coworker, request.work, request.context, task_id, trace)
            .await
        {
            Ok(answer) => answer,
            Err(err) => error_text(err),
        }
    }

    /// One bounded sub-invocation; the coworker keeps its own capabilities but
    /// cannot delegate further.
    fn invoke_coworker<'a>(
        &'a self,
        coworker: &'a Agent,
        work: String,
        context: String,
        task_id: &'a str,
        trace: &'a TraceHandle,
    ) -> BoxedInvocation<'a> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(system_prompt(
                    coworker,
                    DelegationMode::Advisory,
                    !coworker.capabilities().is_empty(),
                )),
                ChatMessage::user(task_prompt(&work, COWORKER_EXPECTED_OUTPUT, &context)),
            ];
            self.run_loop(
                coworker,
                task_id,
                messages,
                coworker.capabilities(),
                None,
                trace,
            )
            .await
        })
    }
}

struct Delegation<'a> {
    policy_roles: Vec<String>,
    coworkers: Vec<&'a Agent>,
    remaining: u32,
}

struct DelegationRequest {
    coworker: String,
    work: String,
    context: String,
}

impl DelegationRequest {
    fn parse(tool: &str, arguments: &Value) -> Result<Self, String> {
        let field = if tool == ASK_QUESTION_TOOL {
            "question"
        } else {
            "task"
        };
        let coworker = arguments["coworker"]
            .as_str()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| format!("{tool} requires a 'coworker' argument"))?;
        let work = arguments[field]
            .as_str()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| format!("{tool} requires a '{field}' argument"))?;

        Ok(Self {
            coworker: coworker.to_string(),
            work: work.to_string(),
            context: arguments["context"].as_str().unwrap_or_default().to_string(),
        })
    }
}

fn final_answer(content: &str, role: &str) -> Result<String, TaskError> {
    let answer = strip_reasoning(content);
    if answer.is_empty() {
        return Err(TaskError::new(
            format!("{role} returned an empty answer"),
            ErrorKind::AgentInvocation,
        ));
    }
    Ok(answer)
}

fn delegation_tools(coworkers: &[String]) -> [ToolDefinition; 2] {
    let roster = coworkers.join(", ");
    [
        ToolDefinition {
            name: DELEGATE_WORK_TOOL.into(),
            description: format!(
                "Delegate a specific task to one of the following coworkers: {roster}. \
                 The input to this tool should be the coworker, the task you want them to do, \
                 and ALL necessary context to execute the task; they know nothing about the task, \
                 so share everything you know."
            ),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "coworker": { "type": "string", "description": "Role of the coworker" },
                    "task": { "type": "string", "description": "The task to delegate" },
                    "context": { "type": "string", "description": "Everything the coworker needs to know" }
                },
                "required": ["coworker", "task"]
            }),
        },
        ToolDefinition {
            name: ASK_QUESTION_TOOL.into(),
            description: format!(
                "Ask a specific question to one of the following coworkers: {roster}. \
                 The input to this tool should be the coworker, the question you have for them, \
                 and ALL necessary context to answer it."
            ),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "coworker": { "type": "string", "description": "Role of the coworker" },
                    "question": { "type": "string", "description": "The question to ask" },
                    "context": { "type": "string", "description": "Everything the coworker needs to know" }
                },
                "required": ["coworker", "question"]
            }),
        },
    ]
}

pub(crate) fn system_prompt(agent: &Agent, mode: DelegationMode, has_tools: bool) -> String {
    let mut prompt = format!(
        "You are {}. {}\nYour personal goal is: {}",
        agent.role(),
        agent.backstory(),
        agent.goal()
    );
    if agent.can_delegate() {
        let roster = agent.delegation().coworkers().join(", ");
        match mode {
            DelegationMode::Enforced => prompt.push_str(&format!(
                "\nYou can hand work to these coworkers with the delegation tools: {roster}."
            )),
            DelegationMode::Advisory => {
                prompt.push_str(&format!("\nYour coworkers are: {roster}."))
            }
        }
    }
    if has_tools {
        prompt.push_str(
            "\nUse the available tools when they help, then give your final answer without calling more tools.",
        );
    }
    prompt
}

pub(crate) fn task_prompt(description: &str, expected_output: &str, context: &str) -> String {
    let mut prompt = format!(
        "Current Task: {description}\n\nThis is the expected criteria for your final answer: {expected_output}\nYou MUST return the actual complete content as the final answer, not a summary."
    );
    if !context.trim().is_empty() {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        prompt.push_str(context);
    }
    prompt.push_str(
        "\n\nBegin! This is VERY important to you, use the tools available and give your best Final Answer, your job depends on it!",
    );
    prompt
}

/// Join upstream outputs, in declaration order, into one context block.
pub fn join_context<S: AsRef<str>>(outputs: &[S]) -> String {
    outputs
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_DIVIDER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DelegationPolicy;
    use crate::capability::RAW_INPUT_ARGUMENT;
    use crate::model::{Completion, Role};
    use crate::testing::{ScriptedRuntime, StaticSearch, scripted_call};

    fn searcher() -> Agent {
        Agent::new("Web Searcher", "find things", "An expert at search.")
            .with_capability(StaticSearch::capability(
                "Water boils at 100 °C https://example.org/water",
            ))
            .with_delegation(DelegationPolicy::to(["Research Analyst"]))
    }

    fn analyst() -> Agent {
        Agent::new("Research Analyst", "analyze", "An expert analyst.")
            .with_delegation(DelegationPolicy::to(["Web Searcher"]))
    }

    fn assignment<'a>(context: &'a str) -> Assignment<'a> {
        Assignment {
            task_id: "t",
            description: "Do the thing",
            expected_output: "A thing",
            context,
            capabilities: &[],
        }
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_before_final_answer() {
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    "linkup_search",
                    serde_json::json!({ "query": "water" }),
                )],
            }),
            Ok(Completion::text("<think>hmm</think>Found: https://example.org/water")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        let answer = executor
            .execute(&searcher(), assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "Found: https://example.org/water");
        let requests = runtime.requests();
        assert_eq!(requests.len(), 2);
        let tool_message = requests[1].messages.last().unwrap();
        assert!(tool_message.content.contains("Water boils at 100 °C"));
    }

    #[tokio::test]
    async fn failing_capability_is_reported_in_band() {
        let agent = Agent::new("Web Searcher", "find", "search")
            .with_capability(StaticSearch::failing_capability(503));
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    "linkup_search",
                    serde_json::json!({ "query": "x" }),
                )],
            }),
            Ok(Completion::text("search unavailable")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        let answer = executor
            .execute(&agent, assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "search unavailable");
        let requests = runtime.requests();
        let fed_back = &requests[1].messages.last().unwrap().content;
        assert!(fed_back.starts_with("Error: provider returned 503"));
    }

    #[tokio::test]
    async fn iteration_limit_forces_answer_without_tools() {
        let call = || {
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    "linkup_search",
                    serde_json::json!({ "query": "x" }),
                )],
            })
        };
        let runtime = ScriptedRuntime::new(vec![call(), call(), Ok(Completion::text("final"))]);
        let settings = ExecutorSettings {
            max_iterations: 2,
            ..ExecutorSettings::default()
        };
        let executor = AgentExecutor::new(runtime.clone(), settings);

        let answer = executor
            .execute(&searcher(), assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "final");
        let requests = runtime.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].tools.is_empty());
    }

    #[tokio::test]
    async fn bare_text_arguments_still_reach_search() {
        let search = StaticSearch::new("Water boils at 100 °C");
        let agent = Agent::new("Web Searcher", "find", "search")
            .with_capability(search.clone().into_capability());
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    "linkup_search",
                    serde_json::json!({ RAW_INPUT_ARGUMENT: "boiling point of water" }),
                )],
            }),
            Ok(Completion::text("100 °C")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        executor
            .execute(&agent, assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(search.queries(), ["boiling point of water"]);
        let requests = runtime.requests();
        let fed_back = &requests[1].messages.last().unwrap().content;
        assert_eq!(fed_back, "Water boils at 100 °C");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_band() {
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call("browse_web", serde_json::json!({ "url": "x" }))],
            }),
            Ok(Completion::text("gave up browsing")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        let answer = executor
            .execute(&searcher(), assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "gave up browsing");
        let requests = runtime.requests();
        let fed_back = &requests[1].messages.last().unwrap().content;
        assert!(fed_back.starts_with("Error: unknown tool 'browse_web'"), "{fed_back}");
    }

    #[tokio::test]
    async fn delegations_stop_at_the_per_task_limit() {
        let roster = vec![Arc::new(searcher()), Arc::new(analyst())];
        let runtime = ScriptedRuntime::from_fn(|request| {
            if request.messages[0].content.starts_with("You are Web Searcher.") {
                return Ok(Completion::text("coworker answer"));
            }
            let tool_results = request
                .messages
                .iter()
                .filter(|message| message.role == Role::Tool)
                .count();
            if tool_results < 3 {
                return Ok(Completion {
                    content: String::new(),
                    tool_calls: vec![scripted_call(
                        ASK_QUESTION_TOOL,
                        serde_json::json!({ "coworker": "Web Searcher", "question": "again?" }),
                    )],
                });
            }
            Ok(Completion::text("done asking"))
        });
        let settings = ExecutorSettings {
            max_delegations: 2,
            ..ExecutorSettings::default()
        };
        let executor = AgentExecutor::new(runtime.clone(), settings);

        let answer = executor
            .execute(&analyst(), assignment("raw"), &roster, &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "done asking");
        let requests = runtime.requests();
        let coworker_runs = requests
            .iter()
            .filter(|request| request.messages[0].content.starts_with("You are Web Searcher."))
            .count();
        assert_eq!(coworker_runs, 2);
        let last = &requests.last().unwrap().messages;
        assert_eq!(last[last.len() - 2].content, "coworker answer");
        assert!(
            last.last()
                .unwrap()
                .content
                .starts_with("Error: delegation limit reached")
        );
    }

    #[tokio::test]
    async fn empty_answer_is_an_invocation_failure() {
        let runtime = ScriptedRuntime::new(vec![Ok(Completion::text("<think>only</think>  "))]);
        let executor = AgentExecutor::new(runtime, ExecutorSettings::default());

        let err = executor
            .execute(&analyst(), assignment("ctx"), &[], &TraceHandle::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AgentInvocation);
    }

    #[tokio::test]
    async fn delegation_outside_policy_is_rejected_in_band() {
        let writer = Arc::new(Agent::new("Technical Writer", "write", "writes"));
        let roster = vec![Arc::new(searcher()), Arc::new(analyst()), writer];
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    DELEGATE_WORK_TOOL,
                    serde_json::json!({ "coworker": "Technical Writer", "task": "write it" }),
                )],
            }),
            Ok(Completion::text("analysis done")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        let answer = executor
            .execute(&analyst(), assignment("raw"), &roster, &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "analysis done");
        assert_eq!(runtime.calls(), 2);
        let requests = runtime.requests();
        let rejection = &requests[1].messages.last().unwrap().content;
        assert!(rejection.starts_with("Error: coworker 'Technical Writer' is not available"));
    }

    #[tokio::test]
    async fn allowed_delegation_runs_coworker_without_further_delegation() {
        let roster = vec![Arc::new(searcher()), Arc::new(analyst())];
        let runtime = ScriptedRuntime::new(vec![
            // analyst asks the searcher to verify
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    ASK_QUESTION_TOOL,
                    serde_json::json!({ "coworker": "web searcher", "question": "Is it 100 °C?", "context": "sea level" }),
                )],
            }),
            // searcher answers directly
            Ok(Completion::text("Yes, at sea level.")),
            // analyst concludes
            Ok(Completion::text("Verified: 100 °C at sea level.")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        let answer = executor
            .execute(&analyst(), assignment("raw"), &roster, &TraceHandle::default())
            .await
            .unwrap();

        assert_eq!(answer, "Verified: 100 °C at sea level.");
        let requests = runtime.requests();
        assert_eq!(requests.len(), 3);
        let coworker_tools: Vec<_> = requests[1].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(coworker_tools, ["linkup_search"]);
        assert!(requests[1].messages[0].content.starts_with("You are Web Searcher."));
        assert!(requests[1].messages[1].content.contains("sea level"));
        assert_eq!(requests[2].messages.last().unwrap().content, "Yes, at sea level.");
    }

    #[tokio::test]
    async fn advisory_mode_offers_no_delegation_tools() {
        let runtime = ScriptedRuntime::new(vec![Ok(Completion::text("done"))]);
        let settings = ExecutorSettings {
            delegation: DelegationMode::Advisory,
            ..ExecutorSettings::default()
        };
        let executor = AgentExecutor::new(runtime.clone(), settings);

        executor
            .execute(&analyst(), assignment(""), &[], &TraceHandle::default())
            .await
            .unwrap();

        let request = &runtime.requests()[0];
        assert!(request.tools.is_empty());
        assert!(request.messages[0].content.contains("Your coworkers are: Web Searcher."));
    }

    #[tokio::test]
    async fn task_capabilities_replace_agent_capabilities() {
        let task_caps = vec![StaticSearch::capability("task scoped")];
        let agent = Agent::new("Web Searcher", "find", "search")
            .with_capability(StaticSearch::failing_capability(500));
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![scripted_call(
                    "linkup_search",
                    serde_json::json!({ "query": "x" }),
                )],
            }),
            Ok(Completion::text("ok")),
        ]);
        let executor = AgentExecutor::new(runtime.clone(), ExecutorSettings::default());

        executor
            .execute(
                &agent,
                Assignment {
                    capabilities: &task_caps,
                    ..assignment("")
                },
                &[],
                &TraceHandle::default(),
            )
            .await
            .unwrap();

        assert_eq!(runtime.requests()[1].messages.last().unwrap().content, "task scoped");
    }

    #[test]
    fn prompts_follow_role_and_context() {
        let prompt = system_prompt(&searcher(), DelegationMode::Enforced, true);
        assert!(prompt.starts_with(
            "You are Web Searcher. An expert at search.\nYour personal goal is: find things"
        ));

        let with_context = task_prompt("Analyze", "Insights", "raw results");
        assert!(with_context.contains("This is the context you're working with:\nraw results"));
        assert!(!task_prompt("Search", "Results", "").contains("context you're working with"));

        assert_eq!(join_context(&["a", "b"]), "a\n\n----------\n\nb");
    }
}
