//! The research crew: Web Searcher, Research Analyst and Technical Writer
//! working in sequence, plus the [`ResearchService`] that runs them.

mod research;
mod roles;

pub use research::{
    ANALYSIS_TASK, CREW_NAME, ResearchReport, ResearchService, SEARCH_TASK, WRITING_TASK,
    research_crew, research_tasks,
};
pub use roles::{
    RESEARCH_ANALYST, ROLES, RoleDefinition, TECHNICAL_WRITER, WEB_SEARCHER, research_analyst,
    technical_writer, web_searcher,
};
