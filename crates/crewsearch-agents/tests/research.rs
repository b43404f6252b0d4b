use std::sync::Arc;

use crewsearch_agents::{
    ANALYSIS_TASK, ResearchService, SEARCH_TASK, WRITING_TASK, research_crew,
};
use crewsearch_core::testing::{ScriptedRuntime, StaticSearch, scripted_call};
use crewsearch_core::{
    Completion, CompletionRequest, CredentialSource, CrewSearchError, CrewSettings, ErrorKind,
    ModelError, Role, SEARCH_TOOL_NAME, SecretValue,
};

const SEARCH_PAYLOAD: &str = "Water boils at 100 °C (212 °F) at sea level. \
                              Source: https://en.wikipedia.org/wiki/Boiling_point";

fn is_role(request: &CompletionRequest, role: &str) -> bool {
    request.messages[0]
        .content
        .starts_with(&format!("You are {role}."))
}

fn last_tool_result(request: &CompletionRequest) -> Option<&str> {
    request
        .messages
        .last()
        .filter(|message| message.role == Role::Tool)
        .map(|message| message.content.as_str())
}

/// Searcher calls the search tool once and reports what it got back; the
/// analyst and writer transform their context.
fn happy_crew() -> Arc<ScriptedRuntime> {
    ScriptedRuntime::from_fn(|request| {
        if is_role(request, "Web Searcher") {
            return Ok(match last_tool_result(request) {
                None => Completion {
                    content: String::new(),
                    tool_calls: vec![scripted_call(
                        SEARCH_TOOL_NAME,
                        serde_json::json!({ "query": "boiling point of water" }),
                    )],
                },
                Some(result) => Completion::text(format!("RAW RESULTS:\n{result}")),
            });
        }
        if is_role(request, "Research Analyst") {
            return Ok(Completion::text(
                "<think>checking facts</think>ANALYSIS: 100 °C at sea level \
                 [https://en.wikipedia.org/wiki/Boiling_point]",
            ));
        }
        Ok(Completion::text(
            "# Boiling point of water\n\nWater boils at **100 °C** at sea level \
             ([Wikipedia](https://en.wikipedia.org/wiki/Boiling_point)).",
        ))
    })
}

fn service(runtime: Arc<ScriptedRuntime>, search: Arc<StaticSearch>, key: &str) -> ResearchService {
    ResearchService::new(
        runtime,
        search,
        CredentialSource::Static(SecretValue::new(key)),
        CrewSettings::default(),
    )
}

#[tokio::test]
async fn boiling_point_query_yields_cited_markdown() {
    let runtime = happy_crew();
    let search = StaticSearch::new(SEARCH_PAYLOAD);
    let service = service(runtime.clone(), search.clone(), "lk-test");

    let answer = service
        .research("What is the boiling point of water at sea level?")
        .await;

    assert!(answer.starts_with("# Boiling point of water"));
    assert!(answer.contains("https://en.wikipedia.org/wiki/Boiling_point"));
    assert_eq!(search.calls(), 1);

    let requests = runtime.requests();
    let search_prompt = &requests[0].messages[1].content;
    assert!(search_prompt.contains(
        "Search for comprehensive information about: What is the boiling point of water at sea level?."
    ));

    let analyst = requests
        .iter()
        .find(|request| is_role(request, "Research Analyst"))
        .expect("analyst invoked");
    assert!(analyst.messages[1].content.contains("RAW RESULTS:"));
    assert!(analyst.messages[1].content.contains(SEARCH_PAYLOAD));

    let writer = requests
        .iter()
        .find(|request| is_role(request, "Technical Writer"))
        .expect("writer invoked");
    let writer_prompt = &writer.messages[1].content;
    assert!(writer_prompt.contains(
        "ANALYSIS: 100 °C at sea level [https://en.wikipedia.org/wiki/Boiling_point]"
    ));
    assert!(!writer_prompt.contains("checking facts"));
}

#[tokio::test]
async fn report_exposes_every_task_output_in_order() {
    let service = service(happy_crew(), StaticSearch::new(SEARCH_PAYLOAD), "lk-test");

    let report = service.try_research("boiling point").await.unwrap();

    let ids: Vec<_> = report
        .task_outputs
        .iter()
        .map(|output| output.task_id.as_str())
        .collect();
    assert_eq!(ids, [SEARCH_TASK, ANALYSIS_TASK, WRITING_TASK]);
    assert_eq!(report.answer, report.task_outputs[2].raw);
    assert!(report.task_outputs[1].raw.starts_with("ANALYSIS"));
    assert!(!report.trace.is_empty());
}

#[tokio::test]
async fn missing_credential_fails_before_any_task() {
    unsafe {
        std::env::remove_var("CREWSEARCH_TEST_UNSET_SEARCH_KEY");
    }
    let runtime = happy_crew();
    let search = StaticSearch::new(SEARCH_PAYLOAD);
    let service = ResearchService::new(
        runtime.clone(),
        search.clone(),
        CredentialSource::env("CREWSEARCH_TEST_UNSET_SEARCH_KEY"),
        CrewSettings::default(),
    );

    let answer = service.research("test").await;
    assert!(answer.starts_with("Error:"), "{answer}");
    assert!(answer.contains("CREWSEARCH_TEST_UNSET_SEARCH_KEY"));
    assert_eq!(runtime.calls(), 0);
    assert_eq!(search.calls(), 0);

    let err = service.try_research("test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn blank_query_is_invalid_input() {
    let runtime = happy_crew();
    let service = service(runtime.clone(), StaticSearch::new(SEARCH_PAYLOAD), "lk-test");

    let err = service.try_research("   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(service.research("").await, "Error: invalid input: query must not be empty");
    assert_eq!(runtime.calls(), 0);
}

#[tokio::test]
async fn explicit_credential_overrides_configured_source() {
    unsafe {
        std::env::remove_var("CREWSEARCH_TEST_UNSET_OVERRIDE_KEY");
    }
    let service = ResearchService::new(
        happy_crew(),
        StaticSearch::new(SEARCH_PAYLOAD),
        CredentialSource::env("CREWSEARCH_TEST_UNSET_OVERRIDE_KEY"),
        CrewSettings::default(),
    );

    let answer = service
        .research_with_credential("boiling point", SecretValue::new("lk-session"))
        .await;
    assert!(answer.starts_with("# Boiling point of water"));

    let blank = service
        .research_with_credential("boiling point", SecretValue::new("  "))
        .await;
    assert!(blank.starts_with("Error:"));
}

#[tokio::test]
async fn search_fault_reaches_analyst_as_in_band_error() {
    let runtime = happy_crew();
    let search = StaticSearch::failing(503);
    let service = service(runtime.clone(), search.clone(), "lk-test");

    let answer = service.research("boiling point").await;

    // The pipeline still finishes with the writer's (degraded) artifact.
    assert!(answer.starts_with("# Boiling point of water"));
    assert_eq!(search.calls(), 1);

    let requests = runtime.requests();
    let analyst = requests
        .iter()
        .find(|request| is_role(request, "Research Analyst"))
        .expect("analyst invoked");
    assert!(
        analyst.messages[1]
            .content
            .contains("Error: provider returned 503")
    );
}

#[tokio::test]
async fn failed_task_stops_the_pipeline() {
    let runtime = ScriptedRuntime::from_fn(|request| {
        if is_role(request, "Research Analyst") {
            return Err(ModelError::Network("connection reset by peer".into()));
        }
        Ok(Completion::text("raw results"))
    });
    let service = service(runtime.clone(), StaticSearch::new(SEARCH_PAYLOAD), "lk-test");

    let answer = service.research("boiling point").await;
    assert!(answer.starts_with("Error: task 'analysis' failed"), "{answer}");

    // one searcher turn plus the failing analyst turn; the writer never runs
    assert_eq!(runtime.calls(), 2);
    assert!(
        !runtime
            .requests()
            .iter()
            .any(|request| is_role(request, "Technical Writer"))
    );

    let err = service.try_research("boiling point").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AgentInvocation);
    assert!(matches!(
        err,
        CrewSearchError::TaskFailed { ref task_id, .. } if task_id == ANALYSIS_TASK
    ));
}

#[tokio::test]
async fn repeated_calls_are_independent_runs() {
    let runtime = happy_crew();
    let search = StaticSearch::new(SEARCH_PAYLOAD);
    let service = service(runtime.clone(), search.clone(), "lk-test");

    let first = service.try_research("boiling point").await.unwrap();
    let second = service.try_research("boiling point").await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.answer, second.answer);
    assert_eq!(search.calls(), 2);
    // every run starts from a clean conversation for the first task
    let fresh_starts = runtime
        .requests()
        .iter()
        .filter(|request| is_role(request, "Web Searcher") && request.messages.len() == 2)
        .count();
    assert_eq!(fresh_starts, 2);
}

#[test]
fn research_crew_is_the_fixed_three_task_chain() {
    let crew = research_crew(
        ScriptedRuntime::new(Vec::new()),
        StaticSearch::capability(SEARCH_PAYLOAD),
        CrewSettings::default(),
    )
    .unwrap();

    let tasks = crew.tasks();
    assert_eq!(tasks.len(), 3);
    assert!(tasks[0].upstream().is_empty());
    assert_eq!(tasks[1].upstream(), [SEARCH_TASK]);
    assert_eq!(tasks[2].upstream(), [ANALYSIS_TASK]);
    assert_eq!(tasks[0].capabilities().len(), 1);
    assert!(crew.agents()[2].capabilities().is_empty());
}
