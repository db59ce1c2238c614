// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! scanflow main entry point - CLI and commands.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;

use scanflow::analysis::{AnalysisOrchestrator, SonarBackend, TaskSnapshot};
use scanflow::cache::TtlCache;
use scanflow::config::{self, CliOptions, ResolvedConfig};
use scanflow::monitor::{CallContext, Dashboard, Monitor, RECENT_EVENTS};
use scanflow::telemetry::{init_telemetry, TelemetryConfig};
use scanflow::tools::ToolRegistry;
use scanflow::workflow::{
    parse_design_url, GitHubClient, OverallStatus, StaticDesignSource, Workflow, WorkflowOptions,
    WorkflowReport,
};

/// scanflow version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// scanflow - instrumented remote code analysis.
#[derive(Parser)]
#[command(name = "scanflow")]
#[command(author, version, about = "Instrumented remote code analysis", long_about = None)]
struct Cli {
    /// Workspace directory to load configuration from
    #[arg(short, long, env = "SCANFLOW_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Seconds task records stay cached
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Concurrency cap per operation
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Status polls before giving up on an analysis
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Milliseconds between status polls
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Seconds an event stream may run
    #[arg(long)]
    stream_timeout: Option<u64>,

    /// Multiplier for simulated analysis delays
    #[arg(long)]
    simulation_scale: Option<f64>,

    /// Analysis server URL; without one, analyses are simulated
    #[arg(long)]
    sonar_url: Option<String>,

    /// Analysis server token
    #[arg(long)]
    sonar_token: Option<String>,

    /// Analysis project key
    #[arg(long)]
    project: Option<String>,

    /// GitHub token for opening pull requests
    #[arg(long)]
    github_token: Option<String>,

    /// Repository for pull requests (owner/name)
    #[arg(long)]
    repo: Option<String>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    output_format: OutputFormat,

    /// Suppress spinners and progress output
    #[arg(short, long)]
    quiet: bool,

    /// Show debug output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show trace output
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for scanflow.
#[derive(Subcommand)]
enum Commands {
    /// Run the design-to-pull-request workflow
    Run {
        /// Design URL (https://figma.com/design/FILE_KEY/NAME?node-id=NODE_ID)
        design_url: String,

        /// Skip opening a pull request
        #[arg(long)]
        no_review: bool,
    },

    /// Analyze local files and wait for the findings
    Scan {
        /// Files to analyze, relative to the current directory
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Follow the server's event stream (real backend only)
        #[arg(long)]
        watch: bool,
    },

    /// Show the project's quality gate (real backend only)
    Gate,

    /// List the available tools
    Tools,

    /// Show the resolved configuration
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = if cli.trace {
        TelemetryConfig::development().with_level(Level::TRACE)
    } else if cli.verbose {
        TelemetryConfig::development()
    } else {
        TelemetryConfig::default().with_level(Level::WARN)
    };
    let _telemetry = init_telemetry(&telemetry.with_ansi(cli.output_format != OutputFormat::Json))?;

    let workspace_root = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let cli_options = CliOptions {
        cache_ttl_secs: cli.cache_ttl,
        max_parallel: cli.max_parallel,
        max_attempts: cli.max_attempts,
        backoff_ms: cli.backoff_ms,
        stream_timeout_secs: cli.stream_timeout,
        simulation_scale: cli.simulation_scale,
        sonar_base_url: cli.sonar_url.clone(),
        sonar_token: cli.sonar_token.clone(),
        sonar_project: cli.project.clone(),
        github_token: cli.github_token.clone(),
        github_repo: cli.repo.clone(),
    };
    let config = config::load_config(&workspace_root, cli_options)?;

    match &cli.command {
        Commands::Run { design_url, no_review } => run_workflow(&cli, &config, design_url, *no_review).await,
        Commands::Scan { files, watch } => scan_files(&cli, &config, files, *watch).await,
        Commands::Gate => quality_gate(&config).await,
        Commands::Tools => {
            let registry = ToolRegistry::with_analysis_tools(build_orchestrator(&config)?);
            println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Version => {
            println!("scanflow {VERSION}");
            Ok(())
        }
    }
}

fn build_orchestrator(config: &ResolvedConfig) -> anyhow::Result<Arc<AnalysisOrchestrator>> {
    let monitor = Arc::new(Monitor::with_limiter(config.limiter()));
    let cache = Arc::new(TtlCache::with_ttl(config.cache_ttl()));
    let mut orchestrator = AnalysisOrchestrator::new(monitor, cache)
        .with_simulation(config.simulation_config())
        .with_stream_timeout(config.stream_timeout());

    if config.sonar_base_url.is_some() {
        let backend = SonarBackend::new(config.sonar_url(), config.sonar_token.clone().unwrap_or_default())?
            .with_organization(config.sonar_organization.clone().unwrap_or_default())
            .with_scanner(config.sonar_scanner.clone());
        orchestrator = orchestrator.with_backend(Arc::new(backend));
    }

    Ok(Arc::new(orchestrator))
}

fn spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

async fn run_workflow(
    cli: &Cli,
    config: &ResolvedConfig,
    design_url: &str,
    no_review: bool,
) -> anyhow::Result<()> {
    let design = parse_design_url(design_url)?;
    let orchestrator = build_orchestrator(config)?;

    let options = WorkflowOptions::new(&config.github_repo, &config.sonar_project).with_poll(config.poll_budget());
    let mut workflow = Workflow::new(
        Arc::clone(&orchestrator),
        Arc::new(StaticDesignSource::default()),
        options,
    );
    match (&config.github_token, no_review) {
        (Some(token), false) => {
            let mut client = GitHubClient::new(token)?;
            if let Some(api_url) = &config.github_api_url {
                client = client.with_api_url(api_url);
            }
            workflow = workflow.with_source_control(Arc::new(client));
        }
        (None, false) => {
            if !cli.quiet {
                eprintln!("{}", "GITHUB_TOKEN not set; the pull request step will be skipped".yellow());
            }
        }
        _ => {}
    }

    let bar = spinner(cli.quiet || cli.output_format == OutputFormat::Json, &format!("Running workflow for {design}"));
    let report = workflow.run(design).await;
    bar.finish_and_clear();
    orchestrator.shutdown().await;

    match cli.output_format {
        OutputFormat::Json => {
            let dashboard = Dashboard::collect(orchestrator.monitor(), orchestrator.cache(), RECENT_EVENTS);
            let out = serde_json::json!({ "report": report, "dashboard": dashboard });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => print_summary(&report, &orchestrator),
    }

    if report.overall_status == OverallStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &WorkflowReport, orchestrator: &AnalysisOrchestrator) {
    let monitor = orchestrator.monitor();

    println!("\n{}", "Workflow summary".bright_blue().bold());
    let status = match report.overall_status {
        OverallStatus::Completed => "completed".green(),
        OverallStatus::Failed => "failed".red(),
        OverallStatus::Started => "started".yellow(),
    };
    println!("Overall status: {status}");
    if let Some(error) = &report.error {
        println!("Error: {}", error.red());
    }
    println!("Steps completed: {}/{}", report.succeeded_steps(), report.steps.len());
    for step in &report.steps {
        println!("  {} {}: {}", step.status.icon(), step.step, step.status);
        if let Some(url) = step.details.get("pr_url").and_then(|v| v.as_str()) {
            println!("    {}", url.bright_blue());
        }
    }

    let metrics = monitor.metrics_snapshot();
    println!("\n{}", "Tool performance".bright_blue().bold());
    for (name, stats) in &metrics.tools {
        println!("  {name}: {} calls, avg {:.1}ms", stats.count, stats.avg_ms);
    }

    println!("\n{}", "Correlation chain".bright_blue().bold());
    let mut records = monitor.chain().records();
    records.sort_by_key(|r| r.started_at);
    for record in records {
        let parent = record
            .parent
            .as_ref()
            .map(|p| format!(" <- {p}"))
            .unwrap_or_default();
        println!(
            "  [{}] {} {} {:.1}ms{}",
            record.correlation_id,
            record.operation,
            record.status,
            record.elapsed_ms.unwrap_or(0.0),
            parent.dimmed()
        );
    }

    let events = monitor.events().summary(0);
    if events.total_events > 0 {
        println!("\n{}", "Events".bright_blue().bold());
        for (stream, count) in &events.events_by_stream {
            println!("  {stream}: {count} events");
        }
    }
}

async fn scan_files(cli: &Cli, config: &ResolvedConfig, paths: &[PathBuf], watch: bool) -> anyhow::Result<()> {
    let mut files = BTreeMap::new();
    for path in paths {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.insert(path.to_string_lossy().replace('\\', "/"), contents);
    }

    let orchestrator = build_orchestrator(config)?;
    let registry = ToolRegistry::with_analysis_tools(Arc::clone(&orchestrator));
    let bar = spinner(cli.quiet || cli.output_format == OutputFormat::Json, "Submitting analysis");

    let submitted = registry
        .dispatch(
            "sonar.scan",
            serde_json::json!({ "project_key": config.sonar_project, "files": files }),
            CallContext::new().with_request_id("cli-scan"),
        )
        .await?;
    if submitted.is_error {
        bar.finish_and_clear();
        anyhow::bail!("Scan failed: {}", submitted.output["error"]);
    }
    let task_id = submitted.output["taskId"].as_str().unwrap_or_default().to_string();
    bar.set_message(format!("Waiting for {task_id}"));

    if watch && orchestrator.has_backend() {
        if let Some(parent) = submitted.correlation_id.clone() {
            match orchestrator.watch(&task_id, parent).await {
                Ok(outcome) => bar.set_message(format!("{} events from {task_id}", outcome.events)),
                Err(e) => tracing::warn!(task_id = %task_id, error = %e, "Event stream unavailable"),
            }
        }
    }

    let snapshot: TaskSnapshot = orchestrator
        .wait_for_completion(&task_id, config.poll_budget())
        .await?;
    bar.finish_and_clear();
    orchestrator.shutdown().await;

    match cli.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => {
            println!("{} {} ({})", "Task".bright_blue().bold(), snapshot.task_id, snapshot.status);
            for issue in snapshot.issues() {
                let patch = issue.suggested_patch.as_deref().unwrap_or("-");
                println!("  {} {} {} [{}]", issue.id.yellow(), issue.location, issue.message, patch.dimmed());
            }
            if snapshot.issues().is_empty() {
                println!("  {}", "No issues".green());
            }
        }
    }
    Ok(())
}

async fn quality_gate(config: &ResolvedConfig) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let gate = orchestrator.quality_gate(&config.sonar_project).await?;
    println!("{}", serde_json::to_string_pretty(&gate)?);
    Ok(())
}
