//! Research crew assembly and the `ResearchService` entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use crewsearch_core::{
    CapabilityRef, Config, CredentialSource, Crew, CrewSearchError, CrewSettings, LinkupProvider,
    ModelRuntime, OpenAiCompatRuntime, OutputType, SearchCapability, SearchDepth, SearchProvider,
    SecretValue, TaskOutput, TaskSpec, TraceCollector, error_text,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::roles::{
    RESEARCH_ANALYST, TECHNICAL_WRITER, WEB_SEARCHER, research_analyst, technical_writer,
    web_searcher,
};

pub const CREW_NAME: &str = "research_crew";
pub const SEARCH_TASK: &str = "search";
pub const ANALYSIS_TASK: &str = "analysis";
pub const WRITING_TASK: &str = "writing";

/// Search -> analysis -> writing, each reading the previous task's output.
pub fn research_tasks(search: CapabilityRef) -> Vec<TaskSpec> {
    vec![
        TaskSpec::new(
            SEARCH_TASK,
            "Search for comprehensive information about: {query}.",
            "Detailed raw search results including sources (urls).",
            WEB_SEARCHER,
        )
        .with_capability(search),
        TaskSpec::new(
            ANALYSIS_TASK,
            "Analyze the raw search results, identify key information, verify facts and prepare \
             a structured analysis.",
            "A structured analysis of the information with verified facts and key insights, \
             along with source links",
            RESEARCH_ANALYST,
        )
        .with_upstream(SEARCH_TASK),
        TaskSpec::new(
            WRITING_TASK,
            "Create a comprehensive, well-organized response based on the research analysis.",
            "A clear, comprehensive response that directly answers the query with proper \
             citations/source links (urls).",
            TECHNICAL_WRITER,
        )
        .with_upstream(ANALYSIS_TASK),
    ]
}

/// Build a fresh research crew around `search`.
pub fn research_crew(
    runtime: Arc<dyn ModelRuntime>,
    search: CapabilityRef,
    settings: CrewSettings,
) -> Result<Crew, CrewSearchError> {
    let agents = vec![
        web_searcher(search.clone()),
        research_analyst(),
        technical_writer(),
    ];
    Crew::new(CREW_NAME, agents, research_tasks(search), runtime, settings)
}

/// Outcome of a successful research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub run_id: Uuid,
    pub query: String,
    /// Markdown answer produced by the Technical Writer.
    pub answer: String,
    pub task_outputs: Vec<TaskOutput>,
    #[serde(skip)]
    pub trace: TraceCollector,
}

/// Single entry point: query in, cited markdown answer (or error) out.
///
/// Every call builds its own agents, tasks and crew; nothing is shared between
/// calls except the model runtime and the search provider clients.
#[derive(Clone)]
pub struct ResearchService {
    runtime: Arc<dyn ModelRuntime>,
    search_provider: Arc<dyn SearchProvider>,
    credential: CredentialSource,
    settings: CrewSettings,
    depth: SearchDepth,
    output_type: OutputType,
}

impl ResearchService {
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        search_provider: Arc<dyn SearchProvider>,
        credential: CredentialSource,
        settings: CrewSettings,
    ) -> Self {
        Self {
            runtime,
            search_provider,
            credential,
            settings,
            depth: SearchDepth::default(),
            output_type: OutputType::default(),
        }
    }

    /// Wire the OpenAI-compatible runtime and LinkUp from configuration.
    pub fn from_config(config: &Config) -> Result<Self, CrewSearchError> {
        let runtime = OpenAiCompatRuntime::from_config(&config.model, config.model_api_key()?)?;
        let provider = LinkupProvider::from_config(&config.search)?;

        Ok(Self::new(
            Arc::new(runtime),
            Arc::new(provider),
            config.search_credential(),
            CrewSettings::from_config(config),
        )
        .with_search_defaults(
            SearchDepth::parse(&config.search.depth),
            OutputType::parse(&config.search.output_type),
        ))
    }

    pub fn with_search_defaults(mut self, depth: SearchDepth, output_type: OutputType) -> Self {
        self.depth = depth;
        self.output_type = output_type;
        self
    }

    pub fn settings(&self) -> &CrewSettings {
        &self.settings
    }

    /// Typed research using the service's configured credential.
    pub async fn try_research(&self, query: &str) -> Result<ResearchReport, CrewSearchError> {
        self.run(query, self.credential.clone()).await
    }

    /// Typed research with a caller-supplied search credential.
    pub async fn try_research_with_credential(
        &self,
        query: &str,
        credential: SecretValue,
    ) -> Result<ResearchReport, CrewSearchError> {
        self.run(query, CredentialSource::Static(credential)).await
    }

    /// The final answer, or `"Error: <message>"`. Never empty.
    pub async fn research(&self, query: &str) -> String {
        render(self.try_research(query).await)
    }

    pub async fn research_with_credential(&self, query: &str, credential: SecretValue) -> String {
        render(self.try_research_with_credential(query, credential).await)
    }

    #[instrument(name = "research", skip(self, query, credential), fields(query_len = query.len()))]
    async fn run(
        &self,
        query: &str,
        credential: CredentialSource,
    ) -> Result<ResearchReport, CrewSearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CrewSearchError::InvalidInput(
                "query must not be empty".into(),
            ));
        }
        credential.resolve()?;

        let search = SearchCapability::new(self.search_provider.clone(), credential)
            .with_defaults(self.depth.clone(), self.output_type.clone());
        let crew = research_crew(
            self.runtime.clone(),
            CapabilityRef::new(search),
            self.settings.clone(),
        )?;

        let inputs = BTreeMap::from([("query".to_string(), query.to_string())]);
        let output = crew.kickoff(&inputs).await?;
        info!(run_id = %output.run_id, "research complete");

        Ok(ResearchReport {
            run_id: output.run_id,
            query: query.to_string(),
            answer: output.raw,
            task_outputs: output.task_outputs,
            trace: output.trace,
        })
    }
}

fn render(result: Result<ResearchReport, CrewSearchError>) -> String {
    match result {
        Ok(report) => report.answer,
        Err(err) => {
            warn!(kind = %err.kind(), error = %err, "research failed");
            error_text(err)
        }
    }
}
