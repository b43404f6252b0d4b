//! The three fixed roles of the research crew.

use crewsearch_core::{Agent, CapabilityRef, DelegationPolicy};
use serde::Serialize;

pub const WEB_SEARCHER: &str = "Web Searcher";
pub const RESEARCH_ANALYST: &str = "Research Analyst";
pub const TECHNICAL_WRITER: &str = "Technical Writer";

/// Static description of a crew role, independent of any run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoleDefinition {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub uses_search: bool,
    pub delegates_to: &'static [&'static str],
}

impl RoleDefinition {
    fn agent(&self) -> Agent {
        Agent::new(self.role, self.goal, self.backstory)
            .with_delegation(DelegationPolicy::to(self.delegates_to.iter().copied()))
    }
}

pub const ROLES: [RoleDefinition; 3] = [
    RoleDefinition {
        role: WEB_SEARCHER,
        goal: "Find the most relevant information on the web, along with source links (urls).",
        backstory: "An expert at formulating search queries and retrieving relevant information. \
                    Passes the results to the 'Research Analyst' only.",
        uses_search: true,
        delegates_to: &[RESEARCH_ANALYST],
    },
    RoleDefinition {
        role: RESEARCH_ANALYST,
        goal: "Analyze and synthesize raw information into structured insights, along with \
               source links (urls) as citations.",
        backstory: "An expert at analyzing information, identifying patterns, and extracting key \
                    insights. If required, can delegate the task of fact checking/verification to \
                    'Web Searcher' only. Passes the final results to the 'Technical Writer' only.",
        uses_search: false,
        delegates_to: &[WEB_SEARCHER],
    },
    RoleDefinition {
        role: TECHNICAL_WRITER,
        goal: "Create well-structured, clear, and comprehensive responses in markdown format, \
               with citations/source links (urls).",
        backstory: "An expert at communicating complex information in an accessible way.",
        uses_search: false,
        delegates_to: &[],
    },
];

pub fn web_searcher(search: CapabilityRef) -> Agent {
    ROLES[0].agent().with_capability(search)
}

pub fn research_analyst() -> Agent {
    ROLES[1].agent()
}

pub fn technical_writer() -> Agent {
    ROLES[2].agent()
}
