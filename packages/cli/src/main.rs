//! Command-line interface for legacy website analysis.
//!
//! Exit codes: 0 success, 2 configuration error, 3 discovery error
//! (seed unreachable or empty), 4 terminal analysis error (no pages
//! completed), 130 interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use site_analysis::discovery::UrlFilterMode;
use site_analysis::orchestrator::WorkflowAction;
use site_analysis::{
    AnalysisError, AnalysisMode, AnalysisOutcome, CostPriority, Orchestrator, Settings,
    SiteAnalysisOptions, UrlFilters,
};

mod render;

const EXIT_CONFIG: u8 = 2;
const EXIT_DISCOVERY: u8 = 3;
const EXIT_ANALYSIS: u8 = 4;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "site-analysis", about = "Analyze legacy websites into rebuild-ready documentation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full site analysis: discovery, capture, two-step analysis, report
    Analyze {
        /// Seed URL
        url: String,

        /// Analysis depth: quick, recommended, comprehensive, targeted
        #[arg(long, default_value = "recommended")]
        mode: AnalysisMode,

        /// Page budget (defaults to the mode preset; applied after filters)
        #[arg(long)]
        max_pages: Option<usize>,

        /// Skip the feature-analysis pass
        #[arg(long)]
        no_step2: bool,

        /// Ask for confirmation at workflow checkpoints
        #[arg(long)]
        interactive: bool,

        /// Project identifier for artifact layout
        #[arg(long, default_value = "legacy-analysis")]
        project_id: String,

        /// Cost/speed trade-off: speed, balanced, cost_efficient
        #[arg(long, default_value = "balanced")]
        cost_priority: CostPriority,

        /// Glob patterns to include (path + query)
        #[arg(long = "include")]
        include_patterns: Vec<String>,

        /// Glob patterns to exclude (path + query)
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,

        /// Which list wins when both are present: include or exclude
        #[arg(long, default_value = "exclude")]
        filter_mode: String,

        /// Keywords biasing page selection (targeted mode)
        #[arg(long = "focus")]
        focus_areas: Vec<String>,

        /// Capture safe page interactions
        #[arg(long)]
        interactions: bool,

        /// Capture page screenshots
        #[arg(long)]
        screenshots: bool,
    },

    /// Discover a site's URL inventory without analyzing it
    Discover {
        url: String,

        #[arg(long = "include")]
        include_patterns: Vec<String>,

        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
    },

    /// Analyze an explicit list of URLs
    AnalyzePages {
        /// Page URLs
        urls: Vec<String>,

        #[arg(long, default_value = "page-list")]
        project_id: String,

        #[arg(long)]
        no_step2: bool,
    },

    /// Resume a stopped workflow from its checkpoint
    Resume {
        /// Path to progress/checkpoint.json
        checkpoint: PathBuf,

        /// Also re-queue pages the checkpoint lists as failed
        #[arg(long)]
        retry_failed: bool,
    },

    /// Control a running workflow from another process entry point
    Control {
        workflow_id: String,

        /// pause, resume, stop, or skip
        action: String,

        /// URL to skip (skip action only)
        #[arg(long)]
        url: Option<String>,
    },

    /// Show analysis status for a project
    Status { project_id: String },

    /// Recommend an analysis strategy for a seed URL
    Recommend { url: String },

    /// List artifacts for a project
    Resources { project_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(cli.command, settings).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &AnalysisError) -> u8 {
    match error {
        AnalysisError::Config(_) => EXIT_CONFIG,
        AnalysisError::InvalidUrl { .. } | AnalysisError::Discovery { .. } => EXIT_DISCOVERY,
        _ => EXIT_ANALYSIS,
    }
}

/// Exit code from a finished run: 0 unless nothing completed.
fn exit_code_for_outcome(outcome: &AnalysisOutcome) -> ExitCode {
    if outcome.counts.completed == 0 && outcome.counts.total() > 0 {
        ExitCode::from(EXIT_ANALYSIS)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(command: Command, settings: Settings) -> Result<ExitCode, AnalysisError> {
    match command {
        Command::Analyze {
            url,
            mode,
            max_pages,
            no_step2,
            interactive,
            project_id,
            cost_priority,
            include_patterns,
            exclude_patterns,
            filter_mode,
            focus_areas,
            interactions,
            screenshots,
        } => {
            let filter_mode = match filter_mode.as_str() {
                "include" => UrlFilterMode::Include,
                _ => UrlFilterMode::Exclude,
            };
            let opts = SiteAnalysisOptions {
                analysis_mode: mode,
                max_pages,
                include_step2: no_step2.then_some(false),
                interactive_mode: interactive,
                project_id,
                cost_priority,
                filters: UrlFilters {
                    include_patterns,
                    exclude_patterns,
                    mode: filter_mode,
                },
                focus_areas,
                browser_engine: None,
                capture_interactions: interactions,
                enable_screenshots: screenshots,
            };

            let orchestrator = Arc::new(Orchestrator::new(settings)?);
            let outcome = run_interruptible(orchestrator.clone(), async move {
                orchestrator.analyze_legacy_site(&url, &opts).await
            })
            .await?;

            match outcome {
                Some(outcome) => {
                    render::print_outcome(&outcome);
                    Ok(exit_code_for_outcome(&outcome))
                }
                None => Ok(ExitCode::from(EXIT_INTERRUPTED)),
            }
        }

        Command::Discover {
            url,
            include_patterns,
            exclude_patterns,
        } => {
            let orchestrator = Orchestrator::new(settings)?;
            let filters = UrlFilters {
                include_patterns,
                exclude_patterns,
                ..Default::default()
            };
            let inventory = orchestrator.discover_website(&url, &filters).await?;
            render::print_inventory(&inventory);
            Ok(ExitCode::SUCCESS)
        }

        Command::AnalyzePages {
            urls,
            project_id,
            no_step2,
        } => {
            let opts = SiteAnalysisOptions {
                project_id,
                include_step2: no_step2.then_some(false),
                ..Default::default()
            };
            let orchestrator = Arc::new(Orchestrator::new(settings)?);
            let outcome = run_interruptible(orchestrator.clone(), async move {
                orchestrator.analyze_page_list(&urls, &opts).await
            })
            .await?;

            match outcome {
                Some(outcome) => {
                    render::print_outcome(&outcome);
                    Ok(exit_code_for_outcome(&outcome))
                }
                None => Ok(ExitCode::from(EXIT_INTERRUPTED)),
            }
        }

        Command::Resume {
            checkpoint,
            retry_failed,
        } => {
            let opts = SiteAnalysisOptions::default();
            let orchestrator = Arc::new(Orchestrator::new(settings)?);
            let outcome = run_interruptible(orchestrator.clone(), async move {
                orchestrator
                    .resume_workflow_from_checkpoint(&checkpoint, retry_failed, &opts)
                    .await
            })
            .await?;

            match outcome {
                Some(outcome) => {
                    render::print_outcome(&outcome);
                    Ok(exit_code_for_outcome(&outcome))
                }
                None => Ok(ExitCode::from(EXIT_INTERRUPTED)),
            }
        }

        Command::Control {
            workflow_id,
            action,
            url,
        } => {
            let action = match action.as_str() {
                "pause" => WorkflowAction::Pause,
                "resume" => WorkflowAction::Resume,
                "stop" => WorkflowAction::Stop,
                "skip" => WorkflowAction::Skip {
                    url: url.ok_or_else(|| {
                        AnalysisError::Config("skip requires --url".into())
                    })?,
                },
                other => {
                    return Err(AnalysisError::Config(format!(
                        "unknown workflow action: {other}"
                    )))
                }
            };
            let orchestrator = Orchestrator::new(settings)?;
            let state = orchestrator.control_workflow(&workflow_id, action).await?;
            println!("workflow {workflow_id}: {state:?}");
            Ok(ExitCode::SUCCESS)
        }

        Command::Status { project_id } => {
            let orchestrator = Orchestrator::new(settings)?;
            let status = orchestrator.get_analysis_status(&project_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Recommend { url } => {
            let orchestrator = Orchestrator::new(settings)?;
            let recommendation = orchestrator.recommend(&url).await?;
            println!("{}", serde_json::to_string_pretty(&recommendation)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Resources { project_id } => {
            let exposer = site_analysis::ResourceExposer::new(settings.output_root.clone());
            let entries = exposer.list(&project_id).await?;
            for entry in entries {
                println!("{}\t{}\t{}", entry.uri, entry.mime, entry.size_bytes);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run an analysis future, stopping workflows cooperatively on Ctrl-C.
///
/// Returns `None` when interrupted (the workflow persisted its state
/// before the future settled).
async fn run_interruptible<T>(
    orchestrator: Arc<Orchestrator>,
    fut: impl std::future::Future<Output = Result<T, AnalysisError>>,
) -> Result<Option<T>, AnalysisError> {
    tokio::pin!(fut);

    let mut interrupted = false;
    loop {
        tokio::select! {
            result = &mut fut => {
                return if interrupted {
                    // The run settled after a stop request; report interrupt.
                    result.map(|_| None)
                } else {
                    result.map(Some)
                };
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                if signal.is_ok() {
                    eprintln!("interrupt received, stopping after in-flight pages persist...");
                    interrupted = true;
                    orchestrator.stop_all().await;
                }
            }
        }
    }
}
