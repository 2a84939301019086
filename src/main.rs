use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use guidepost::fixture::Fixture;
use guidepost::overlay::describe_content;
use guidepost::{
    logging, Config, ConsoleOverlay, EventBus, LifecycleHooks, MemoryDocument,
    MissingTargetPolicy, StepSequencer, TourDefinition, TourOptions,
};

#[derive(Parser)]
#[command(name = "guidepost")]
#[command(about = "Guided-tour sequencer for live documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a tour file and list its steps
    Validate {
        /// Tour file (json, yaml or toml)
        tour: PathBuf,
    },

    /// Play a tour against a scripted document
    Run(RunArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Tour file (json, yaml or toml)
    tour: PathBuf,

    /// Element mounts to play into the document
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// Per-step wait timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Advance automatically after this many milliseconds instead of reading stdin
    #[arg(long)]
    auto_advance_ms: Option<u64>,

    /// End the tour at the first step whose targets never appear
    #[arg(long)]
    strict: bool,

    /// Print lifecycle events as JSON on stderr
    #[arg(long)]
    events: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;
    if let Some(path) = &logging_handle.log_file_path {
        tracing::debug!(path = %path.display(), "logging to file");
    }

    match cli.command {
        Commands::Validate { tour } => cmd_validate(&tour),
        Commands::Run(args) => cmd_run(config, args).await,
        Commands::Config => cmd_config(&config),
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let tour = TourDefinition::load(path)?;

    println!(
        "{}: {} step(s)",
        tour.name.as_deref().unwrap_or("tour"),
        tour.steps.len()
    );
    for (i, step) in tour.steps.iter().enumerate() {
        let targets = if step.selector.is_empty() {
            "(page)".to_string()
        } else {
            step.selector.join(", ")
        };
        let timeout = step
            .timeout_ms
            .map(|ms| format!(" [timeout {ms}ms]"))
            .unwrap_or_default();
        println!(
            "  {:>2}. {} -> {}{}",
            i + 1,
            targets,
            describe_content(&step.content),
            timeout
        );
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    let tour = TourDefinition::load(&args.tour)?;
    if let Some(ms) = args.timeout_ms {
        config.tour.timeout_ms = ms;
    }

    let doc = MemoryDocument::new();
    if let Some(path) = &args.fixture {
        Fixture::load(path)?.apply(&doc);
    }

    let events = EventBus::new();
    if args.events {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => eprintln!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                }
            }
        });
    }

    let sequencer = StepSequencer::from_config(
        Arc::new(doc.clone()),
        Arc::new(ConsoleOverlay::stdout()),
        &config,
    )
    .with_events(events);

    let total = tour.steps.len();
    let hooks = LifecycleHooks::new()
        .on_start(move || println!("Tour started ({total} steps)"))
        .on_step_change(move |i, _| println!("  step {}/{}", i + 1, total))
        .on_finish(|| println!("Tour finished"));

    let mut options = TourOptions::new().with_hooks(hooks);
    if args.strict {
        options = options.with_missing_target(MissingTargetPolicy::Finish);
    } else if let Some(policy) = tour.missing_target {
        options = options.with_missing_target(policy);
    }

    sequencer.set_steps(tour.steps, options);
    sequencer.start();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        sequencer.settled().await;
        if !sequencer.is_active() {
            break;
        }

        if let Some(ms) = args.auto_advance_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        } else {
            eprintln!("[enter] next, [q] quit");
            match input.next_line().await? {
                Some(line) if line.trim().eq_ignore_ascii_case("q") => {
                    sequencer.finish();
                    break;
                }
                Some(_) => {}
                None => {
                    sequencer.finish();
                    break;
                }
            }
        }

        sequencer.next();
    }

    Ok(())
}
