use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crewsearch_agents::{ROLES, ResearchReport, ResearchService};
use crewsearch_core::{
    ConfigLoader, OutputType, SearchDepth, TelemetryOptions, init_metrics_from_env,
    init_telemetry, persist_trace,
};
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "crewsearch",
    version,
    about = "Answer a question with a web-searching research crew"
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, env = "CREWSEARCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a query and print the markdown answer.
    Run(RunArgs),
    /// List the crew roles, their goals and delegation rules.
    Roles,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Question to research.
    query: String,

    /// Ask the search provider for a deep search.
    #[arg(long)]
    deep: bool,

    /// Search output shape (searchResults, sourcedAnswer, structured).
    #[arg(long)]
    output_type: Option<String>,

    /// Print the run trace after the answer.
    #[arg(long, value_enum)]
    explain: Option<ExplainFormat>,

    /// Write the run trace as JSON into this directory.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Print the full report as JSON instead of the markdown answer.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExplainFormat {
    Markdown,
    Mermaid,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions {
        default_filter: Some(config.logging.level.clone()),
        to_stderr: true,
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("crewsearch-cli");

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(&config, args).await,
            Command::Roles => roles_command(),
        }
    })
}

async fn run_command(config: &crewsearch_core::Config, args: RunArgs) -> Result<()> {
    let mut service = ResearchService::from_config(config)?;
    if args.deep || args.output_type.is_some() {
        let depth = if args.deep {
            SearchDepth::Deep
        } else {
            SearchDepth::parse(&config.search.depth)
        };
        let output_type = OutputType::parse(
            args.output_type
                .as_deref()
                .unwrap_or(&config.search.output_type),
        );
        service = service.with_search_defaults(depth, output_type);
    }

    info!(model = %config.model.model, "starting research run");
    let report = service
        .try_research(&args.query)
        .await
        .context("research run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.answer);
    }

    explain(&report, args.explain);

    if let Some(dir) = args.trace_dir {
        let path = persist_trace(&dir, &report.run_id.to_string(), report.trace.events())?;
        info!(path = %path.display(), "trace written");
    }

    Ok(())
}

fn explain(report: &ResearchReport, format: Option<ExplainFormat>) {
    let summary = report.trace.summary();
    match format {
        Some(ExplainFormat::Markdown) => println!("\n{}", summary.render_markdown()),
        Some(ExplainFormat::Mermaid) => println!("\n```mermaid\n{}```", summary.render_mermaid()),
        None => {}
    }
}

fn roles_command() -> Result<()> {
    for role in ROLES {
        println!("## {}", role.role);
        println!("Goal: {}", role.goal);
        println!("Backstory: {}", role.backstory);
        if role.uses_search {
            println!("Tools: web search");
        }
        if role.delegates_to.is_empty() {
            println!("Delegation: none");
        } else {
            println!("Delegation: {}", role.delegates_to.join(", "));
        }
        println!();
    }
    Ok(())
}
