//! Sequential crew executor built on `graph-flow`.
//!
//! Every task becomes a graph node; edges follow declaration order. Outputs
//! travel through the session context under `task.<id>.output`, and task
//! states are kept in a ledger owned by the run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use graph_flow::{
    Context, ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, NextAction,
    Session, SessionStorage, Task, TaskResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::agent::{Agent, normalize_role};
use crate::config::Config;
use crate::executor::{AgentExecutor, Assignment, ExecutorSettings, join_context};
use crate::metrics::{record_crew_run, record_task};
use crate::model::ModelRuntime;
use crate::task::{TaskOutput, TaskSpec, TaskState, interpolate};
use crate::trace::{TraceCollector, TraceHandle};
use crate::{CrewSearchError, TaskError};

/// Execution discipline of a crew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    #[default]
    Sequential,
}

/// Lifecycle of one crew run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewState {
    Built,
    Running,
    Complete,
    Failed,
}

impl CrewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrewSettings {
    pub process: Process,
    pub executor: ExecutorSettings,
}

impl CrewSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            process: Process::Sequential,
            executor: ExecutorSettings {
                max_iterations: config.pipeline.max_iterations,
                temperature: config.model.temperature,
                delegation: config.pipeline.delegation,
                max_delegations: config.pipeline.max_delegations,
            },
        }
    }
}

/// Result of a completed crew run.
#[derive(Debug, Clone)]
pub struct CrewOutput {
    pub run_id: Uuid,
    pub state: CrewState,
    /// Raw output of the final task.
    pub raw: String,
    pub task_outputs: Vec<TaskOutput>,
    pub task_states: Vec<(String, TaskState)>,
    pub trace: TraceCollector,
}

pub struct Crew {
    name: String,
    agents: Vec<Arc<Agent>>,
    tasks: Vec<Arc<TaskSpec>>,
    settings: CrewSettings,
    executor: Arc<AgentExecutor>,
}

impl Crew {
    /// Validate the crew invariants; nothing runs until [`Crew::kickoff`].
    pub fn new(
        name: impl Into<String>,
        agents: Vec<Agent>,
        tasks: Vec<TaskSpec>,
        runtime: Arc<dyn ModelRuntime>,
        settings: CrewSettings,
    ) -> Result<Self, CrewSearchError> {
        validate(&agents, &tasks)?;
        let executor = Arc::new(AgentExecutor::new(runtime, settings.executor.clone()));

        Ok(Self {
            name: name.into(),
            agents: agents.into_iter().map(Arc::new).collect(),
            tasks: tasks.into_iter().map(Arc::new).collect(),
            settings,
            executor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Arc<TaskSpec>] {
        &self.tasks
    }

    pub fn settings(&self) -> &CrewSettings {
        &self.settings
    }

    fn enter(&self, trace: &TraceHandle, state: CrewState) {
        debug!(crew = %self.name, state = state.as_str(), "crew state");
        trace.record(self.name.as_str(), format!("crew {}", state.as_str()));
    }

    fn agent_for(&self, task: &TaskSpec) -> Result<Arc<Agent>, CrewSearchError> {
        self.agents
            .iter()
            .find(|agent| agent.role() == task.agent_role())
            .cloned()
            .ok_or_else(|| {
                CrewSearchError::construction(format!(
                    "task '{}' is assigned to unknown agent '{}'",
                    task.id(),
                    task.agent_role()
                ))
            })
    }

    /// Run every task in order with `{name}` placeholders filled from `inputs`.
    #[instrument(name = "crew.kickoff", skip(self, inputs), fields(crew = %self.name))]
    pub async fn kickoff(
        &self,
        inputs: &BTreeMap<String, String>,
    ) -> Result<CrewOutput, CrewSearchError> {
        let run_id = Uuid::new_v4();
        let ledger: Arc<DashMap<String, TaskState>> = Arc::new(DashMap::new());
        let failures: Arc<DashMap<String, TaskError>> = Arc::new(DashMap::new());
        let trace = TraceHandle::default();
        let roster = Arc::new(self.agents.clone());
        let inputs = Arc::new(inputs.clone());

        let mut builder = GraphBuilder::new(self.name.as_str());
        let mut nodes = Vec::with_capacity(self.tasks.len());
        for (idx, spec) in self.tasks.iter().enumerate() {
            ledger.insert(spec.id().to_string(), TaskState::Pending);
            let node = Arc::new(CrewTaskNode {
                spec: spec.clone(),
                agent: self.agent_for(spec)?,
                roster: roster.clone(),
                executor: self.executor.clone(),
                inputs: inputs.clone(),
                ledger: ledger.clone(),
                failures: failures.clone(),
                trace: trace.clone(),
                is_last: idx + 1 == self.tasks.len(),
            });
            builder = builder.add_task(node.clone());
            nodes.push(node);
        }
        for pair in nodes.windows(2) {
            builder = builder.add_edge(pair[0].id(), pair[1].id());
        }
        let first = nodes
            .first()
            .ok_or_else(|| CrewSearchError::construction("a crew needs at least one task"))?;
        let graph = Arc::new(builder.set_start_task(first.id()).build());

        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());
        let session_id = run_id.to_string();
        let session = Session::new_from_task(session_id.clone(), first.id());
        storage
            .save(session)
            .await
            .map_err(|err| anyhow!("failed to persist crew session: {err}"))?;

        self.enter(&trace, CrewState::Built);
        info!(%run_id, tasks = self.tasks.len(), "crew run started");
        self.enter(&trace, CrewState::Running);

        let mut rounds = 0;
        loop {
            let result = runner
                .run(&session_id)
                .await
                .map_err(|err| anyhow!("graph execution failure: {err}"))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::WaitingForInput => {
                    rounds += 1;
                    if rounds > self.tasks.len() {
                        return Err(anyhow!("crew run {run_id} stalled").into());
                    }
                    continue;
                }
                ExecutionStatus::Error(message) => return Err(anyhow!(message).into()),
            }
        }

        let task_states: Vec<(String, TaskState)> = self
            .tasks
            .iter()
            .map(|spec| {
                let state = ledger
                    .get(spec.id())
                    .map(|entry| *entry.value())
                    .unwrap_or(TaskState::Pending);
                (spec.id().to_string(), state)
            })
            .collect();
        let completed = task_states
            .iter()
            .filter(|(_, state)| *state == TaskState::Done)
            .count();

        let failed = task_states
            .iter()
            .find(|(_, state)| *state == TaskState::Failed)
            .map(|(task_id, _)| task_id.clone());
        if let Some(task_id) = failed {
            let source = failures
                .remove(&task_id)
                .map(|(_, err)| err)
                .unwrap_or_else(|| TaskError::invocation("task failed without a reason"));
            warn!(%run_id, task = %task_id, error = %source, "crew run failed");
            self.enter(&trace, CrewState::Failed);
            record_crew_run(CrewState::Failed.as_str(), completed);
            return Err(CrewSearchError::TaskFailed {
                task_id,
                source,
                task_states,
            });
        }

        let session = storage
            .get(&session_id)
            .await
            .map_err(|err| anyhow!("failed to reload crew session: {err}"))?
            .ok_or_else(|| anyhow!("crew session missing after execution"))?;

        let mut task_outputs = Vec::with_capacity(self.tasks.len());
        for spec in &self.tasks {
            let key = TaskSpec::context_key(spec.id());
            let raw: String = session
                .context
                .get(key.as_str())
                .await
                .ok_or_else(|| anyhow!("task '{}' finished without output", spec.id()))?;
            task_outputs.push(TaskOutput {
                task_id: spec.id().to_string(),
                agent_role: spec.agent_role().to_string(),
                raw,
            });
        }

        let raw = task_outputs
            .last()
            .map(|output| output.raw.clone())
            .ok_or_else(|| anyhow!("crew produced no output"))?;

        record_crew_run(CrewState::Complete.as_str(), completed);
        self.enter(&trace, CrewState::Complete);
        info!(%run_id, "crew run complete");

        Ok(CrewOutput {
            run_id,
            state: CrewState::Complete,
            raw,
            task_outputs,
            task_states,
            trace: trace.snapshot(),
        })
    }
}

fn validate(agents: &[Agent], tasks: &[TaskSpec]) -> Result<(), CrewSearchError> {
    if tasks.is_empty() {
        return Err(CrewSearchError::construction(
            "a crew needs at least one task",
        ));
    }

    let mut roles = HashSet::new();
    for agent in agents {
        if agent.role().trim().is_empty() {
            return Err(CrewSearchError::construction("agent role must not be empty"));
        }
        if !roles.insert(normalize_role(agent.role())) {
            return Err(CrewSearchError::construction(format!(
                "duplicate agent role '{}'",
                agent.role()
            )));
        }
    }

    for agent in agents {
        for coworker in agent.delegation().coworkers() {
            if !roles.contains(&normalize_role(coworker)) {
                return Err(CrewSearchError::construction(format!(
                    "agent '{}' delegates to unknown role '{}'",
                    agent.role(),
                    coworker
                )));
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for task in tasks {
        if task.id().trim().is_empty() {
            return Err(CrewSearchError::construction("task id must not be empty"));
        }
        if !agents.iter().any(|agent| agent.role() == task.agent_role()) {
            return Err(CrewSearchError::construction(format!(
                "task '{}' is assigned to unknown agent '{}'",
                task.id(),
                task.agent_role()
            )));
        }
        for upstream in task.upstream() {
            if !seen.contains(upstream.as_str()) {
                return Err(CrewSearchError::construction(format!(
                    "task '{}' depends on '{}', which does not run before it",
                    task.id(),
                    upstream
                )));
            }
        }
        if !seen.insert(task.id()) {
            return Err(CrewSearchError::construction(format!(
                "duplicate task id '{}'",
                task.id()
            )));
        }
    }

    Ok(())
}

struct CrewTaskNode {
    spec: Arc<TaskSpec>,
    agent: Arc<Agent>,
    roster: Arc<Vec<Arc<Agent>>>,
    executor: Arc<AgentExecutor>,
    inputs: Arc<BTreeMap<String, String>>,
    ledger: Arc<DashMap<String, TaskState>>,
    failures: Arc<DashMap<String, TaskError>>,
    trace: TraceHandle,
    is_last: bool,
}

impl CrewTaskNode {
    async fn upstream_context(&self, context: &Context) -> Result<String, TaskError> {
        let mut outputs = Vec::with_capacity(self.spec.upstream().len());
        for upstream in self.spec.upstream() {
            let key = TaskSpec::context_key(upstream);
            let output: String = context.get(key.as_str()).await.ok_or_else(|| {
                TaskError::new(
                    format!("upstream task '{upstream}' has no output"),
                    crate::ErrorKind::Internal,
                )
            })?;
            outputs.push(output);
        }
        Ok(join_context(&outputs))
    }

    fn fail(&self, err: TaskError, started: Instant) -> TaskResult {
        warn!(task = %self.spec.id(), error = %err, "task failed");
        self.ledger.insert(self.spec.id().to_string(), TaskState::Failed);
        self.trace.record(self.spec.id(), format!("failed: {}", err.reason));
        record_task(
            self.agent.role(),
            "failed",
            started.elapsed().as_millis() as u64,
        );
        let summary = format!("task '{}' failed", self.spec.id());
        self.failures.insert(self.spec.id().to_string(), err);
        TaskResult::new(Some(summary), NextAction::End)
    }
}

#[async_trait]
impl Task for CrewTaskNode {
    fn id(&self) -> &str {
        self.spec.id()
    }

    #[instrument(
        name = "crew.task",
        skip(self, context),
        fields(task = %self.spec.id(), role = %self.agent.role())
    )]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let started = Instant::now();
        self.ledger.insert(self.spec.id().to_string(), TaskState::Running);
        self.trace.record(self.spec.id(), format!("started ({})", self.agent.role()));

        let upstream = match self.upstream_context(&context).await {
            Ok(text) => text,
            Err(err) => return Ok(self.fail(err, started)),
        };

        let description = interpolate(self.spec.description(), &self.inputs);
        let expected_output = interpolate(self.spec.expected_output(), &self.inputs);
        let assignment = Assignment {
            task_id: self.spec.id(),
            description: &description,
            expected_output: &expected_output,
            context: &upstream,
            capabilities: self.spec.capabilities(),
        };

        let output = match self
            .executor
            .execute(&self.agent, assignment, &self.roster, &self.trace)
            .await
        {
            Ok(output) => output,
            Err(err) => return Ok(self.fail(err, started)),
        };

        context
            .set(TaskSpec::context_key(self.spec.id()), output.clone())
            .await;
        self.ledger.insert(self.spec.id().to_string(), TaskState::Done);
        self.trace.record(
            self.spec.id(),
            format!("completed ({} chars)", output.chars().count()),
        );
        record_task(
            self.agent.role(),
            "done",
            started.elapsed().as_millis() as u64,
        );
        info!(chars = output.len(), "task completed");

        let next = if self.is_last {
            NextAction::End
        } else {
            NextAction::ContinueAndExecute
        };
        Ok(TaskResult::new(
            Some(format!("task '{}' completed", self.spec.id())),
            next,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DelegationPolicy;
    use crate::model::{Completion, ModelError};
    use crate::testing::ScriptedRuntime;
    use crate::{ErrorKind, agent::DelegationMode};

    fn agents() -> Vec<Agent> {
        vec![
            Agent::new("Searcher", "search", "searches"),
            Agent::new("Analyst", "analyze", "analyzes"),
            Agent::new("Writer", "write", "writes"),
        ]
    }

    fn chain() -> Vec<TaskSpec> {
        vec![
            TaskSpec::new("search", "Search for {query}.", "raw results", "Searcher"),
            TaskSpec::new("analysis", "Analyze.", "analysis", "Analyst").with_upstream("search"),
            TaskSpec::new("writing", "Write.", "answer", "Writer").with_upstream("analysis"),
        ]
    }

    fn settings() -> CrewSettings {
        CrewSettings {
            process: Process::Sequential,
            executor: ExecutorSettings {
                delegation: DelegationMode::Advisory,
                ..ExecutorSettings::default()
            },
        }
    }

    fn inputs(query: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("query".to_string(), query.to_string())])
    }

    fn construction_error(agents: Vec<Agent>, tasks: Vec<TaskSpec>) -> String {
        let runtime = ScriptedRuntime::new(Vec::new());
        match Crew::new("test", agents, tasks, runtime, settings()) {
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Construction);
                err.to_string()
            }
            Ok(_) => panic!("crew should be rejected"),
        }
    }

    #[test]
    fn rejects_unknown_agent() {
        let tasks = vec![TaskSpec::new("t", "d", "e", "Ghost")];
        assert!(construction_error(agents(), tasks).contains("unknown agent 'Ghost'"));
    }

    #[test]
    fn rejects_forward_and_self_references() {
        let forward = vec![
            TaskSpec::new("a", "d", "e", "Searcher").with_upstream("b"),
            TaskSpec::new("b", "d", "e", "Analyst"),
        ];
        assert!(construction_error(agents(), forward).contains("does not run before it"));

        let selfish = vec![TaskSpec::new("a", "d", "e", "Searcher").with_upstream("a")];
        assert!(construction_error(agents(), selfish).contains("does not run before it"));
    }

    #[test]
    fn rejects_empty_and_duplicate_definitions() {
        assert!(construction_error(agents(), Vec::new()).contains("at least one task"));

        let dup_tasks = vec![
            TaskSpec::new("a", "d", "e", "Searcher"),
            TaskSpec::new("a", "d", "e", "Analyst"),
        ];
        assert!(construction_error(agents(), dup_tasks).contains("duplicate task id"));

        let mut dup_agents = agents();
        dup_agents.push(Agent::new("searcher", "again", "again"));
        assert!(construction_error(dup_agents, chain()).contains("duplicate agent role"));
    }

    #[test]
    fn rejects_delegation_to_unknown_role() {
        let mut crew_agents = agents();
        crew_agents[0] = Agent::new("Searcher", "search", "searches")
            .with_delegation(DelegationPolicy::to(["Editor"]));
        assert!(construction_error(crew_agents, chain()).contains("unknown role 'Editor'"));
    }

    #[tokio::test]
    async fn outputs_flow_through_context_in_order() {
        let runtime = ScriptedRuntime::from_fn(|request| {
            let system = &request.messages[0].content;
            let text = if system.starts_with("You are Searcher.") {
                "RAW: water boils at 100 °C"
            } else if system.starts_with("You are Analyst.") {
                "ANALYSIS of [RAW]"
            } else {
                "# Answer\n100 °C"
            };
            Ok(Completion::text(text))
        });
        let crew = Crew::new("test", agents(), chain(), runtime.clone(), settings()).unwrap();

        let output = crew.kickoff(&inputs("boiling point")).await.unwrap();

        assert_eq!(output.raw, "# Answer\n100 °C");
        assert_eq!(output.state, CrewState::Complete);
        let steps: Vec<_> = output
            .trace
            .events()
            .iter()
            .filter(|event| event.task_id == "test")
            .map(|event| event.message.as_str())
            .collect();
        assert_eq!(steps, ["crew built", "crew running", "crew complete"]);
        assert_eq!(output.task_outputs.len(), 3);
        assert_eq!(output.task_outputs[1].agent_role, "Analyst");
        assert!(output
            .task_states
            .iter()
            .all(|(_, state)| *state == TaskState::Done));
        assert!(!output.trace.is_empty());

        let requests = runtime.requests();
        assert_eq!(requests.len(), 3);
        let search_prompt = &requests[0].messages[1].content;
        assert!(search_prompt.contains("Search for boiling point."));
        assert!(!search_prompt.contains("context you're working with"));
        assert!(requests[1].messages[1].content.contains("RAW: water boils at 100 °C"));
        assert!(requests[2].messages[1].content.contains("ANALYSIS of [RAW]"));
        assert!(!requests[2].messages[1].content.contains("RAW: water"));
    }

    #[tokio::test]
    async fn failure_stops_downstream_tasks() {
        let runtime = ScriptedRuntime::new(vec![
            Ok(Completion::text("raw")),
            Err(ModelError::Network("connection refused".into())),
        ]);
        let crew = Crew::new("test", agents(), chain(), runtime.clone(), settings()).unwrap();

        let err = crew.kickoff(&inputs("x")).await.unwrap_err();

        assert_eq!(runtime.calls(), 2);
        assert_eq!(err.kind(), ErrorKind::AgentInvocation);
        match err {
            CrewSearchError::TaskFailed {
                task_id,
                task_states,
                ..
            } => {
                assert_eq!(task_id, "analysis");
                assert_eq!(
                    task_states,
                    [
                        ("search".to_string(), TaskState::Done),
                        ("analysis".to_string(), TaskState::Failed),
                        ("writing".to_string(), TaskState::Pending),
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn settings_follow_config() {
        let config = crate::ConfigLoader::parse(
            "[pipeline]\ndelegation = \"advisory\"\nmax_iterations = 3\n[model]\ntemperature = 0.2\n",
        )
        .unwrap();
        let settings = CrewSettings::from_config(&config);
        assert_eq!(settings.executor.max_iterations, 3);
        assert_eq!(settings.executor.delegation, DelegationMode::Advisory);
        assert!((settings.executor.temperature - 0.2).abs() < f32::EPSILON);
    }
}
