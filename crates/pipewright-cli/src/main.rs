//! Pipewright CLI - run, resume and approve checkpointed pipelines.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pipewright_agent::{ClaudeAgentExecutor, PermissionMode};
use pipewright_core::{EffectId, PipelineResult, RunId, RunRecord, RunState};
use pipewright_engine::{
    ApprovalGate, AutoApprove, DeferredGate, EffectStore, FsStore, ProcessDefinition, ProcessRunner, RunContext,
    RunStore,
};

mod config;
mod gate;
mod inputs;

use config::Config;
use gate::PromptGate;

/// Pipewright CLI - checkpointed CLI tooling pipelines
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Run checkpointed CLI tooling pipelines", long_about = None)]
struct Cli {
    /// State directory holding task effects and run records [default: .pipewright]
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Claude CLI binary [default: claude]
    #[arg(long, global = true)]
    claude_path: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or continue) a pipeline run
    Run {
        /// Pipeline name, see `pipewright processes`
        process: String,

        /// Run id; generated when omitted. Reuse it to resume.
        #[arg(long)]
        run_id: Option<String>,

        /// Pipeline input as key=value (repeatable)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// JSON object file with pipeline inputs
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Continue a failed, interrupted or waiting run with its recorded inputs
    Resume {
        run_id: String,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Approve a run that is awaiting approval
    Approve {
        run_id: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Reject a run that is awaiting approval
    Reject {
        run_id: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Show a run and the status of each task
    Status {
        run_id: String,

        /// Print the run record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recorded runs
    List,

    /// List available pipelines
    Processes,

    /// Repair mojibake and byte order marks in a text file
    #[command(name = "repair-json")]
    RepairJson {
        /// File to read
        #[arg(long = "in", value_name = "FILE")]
        input: PathBuf,

        /// File to write; stdout when omitted
        #[arg(long = "out", value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Options for commands that dispatch tasks.
#[derive(Args)]
struct ExecArgs {
    /// How the end-of-run breakpoint is answered
    #[arg(long, value_enum, default_value_t = Approval::Prompt)]
    approval: Approval,

    /// Working directory for the agent
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,

    /// Agent permission mode (default, acceptEdits, plan, bypassPermissions)
    #[arg(long, default_value = "default")]
    permission_mode: PermissionMode,

    /// Agent model
    #[arg(long)]
    model: Option<String>,

    /// Extra system prompt appended for every task
    #[arg(long)]
    system_prompt: Option<String>,

    /// Per-task timeout in seconds
    #[arg(long)]
    dispatch_timeout: Option<u64>,

    /// Seconds before a pending task left by a dead run may be reclaimed
    #[arg(long)]
    reclaim_after: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Approval {
    /// Approve automatically
    Auto,
    /// Ask on the terminal
    Prompt,
    /// Leave the run awaiting an `approve` or `reject` command
    Defer,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = Config::default();
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }
    if let Some(path) = cli.claude_path {
        config.claude_path = path;
    }

    match cli.command {
        Commands::Run {
            process,
            run_id,
            inputs,
            inputs_file,
            exec,
        } => {
            let process = find_process(&process)?;
            let raw = inputs::collect(inputs_file.as_deref(), &inputs)?;
            let run_id = match run_id {
                Some(id) => RunId::parse(id)?,
                None => RunId::generate(),
            };
            execute(&mut config, process, run_id, &raw, exec).await?;
        }
        Commands::Resume { run_id, exec } => {
            let record = load_record(&config, &run_id).await?;
            let process = find_process(&record.process)?;
            execute(&mut config, process, record.run_id.clone(), &record.inputs, exec).await?;
        }
        Commands::Approve { run_id, notes } => {
            decide(&config, &run_id, true, notes).await?;
        }
        Commands::Reject { run_id, notes } => {
            decide(&config, &run_id, false, notes).await?;
        }
        Commands::Status { run_id, json } => {
            status(&config, &run_id, json).await?;
        }
        Commands::List => {
            list_runs(&config).await?;
        }
        Commands::Processes => {
            list_processes();
        }
        Commands::RepairJson { input, output } => {
            repair_json(&input, output.as_deref())?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<(), Box<dyn Error>> {
    let filter = if verbose {
        EnvFilter::new("warn,pipewright=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,pipewright=info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn find_process(name: &str) -> Result<&'static dyn ProcessDefinition, Box<dyn Error>> {
    pipewright_processes::find(name).ok_or_else(|| {
        let known: Vec<_> = pipewright_processes::all().iter().map(|p| p.name()).collect();
        format!("unknown pipeline '{}' (available: {})", name, known.join(", ")).into()
    })
}

async fn load_record(config: &Config, run_id: &str) -> Result<RunRecord, Box<dyn Error>> {
    let run_id = RunId::parse(run_id)?;
    FsStore::new(&config.state_dir)
        .load_run(&run_id)
        .await?
        .ok_or_else(|| format!("no run '{}' in {}", run_id, config.state_dir.display()).into())
}

async fn execute(
    config: &mut Config,
    process: &dyn ProcessDefinition,
    run_id: RunId,
    raw_inputs: &serde_json::Value,
    exec: ExecArgs,
) -> Result<(), Box<dyn Error>> {
    if let Some(secs) = exec.dispatch_timeout {
        config.dispatch_timeout_secs = Some(secs);
    }
    if let Some(secs) = exec.reclaim_after {
        config.reclaim_after_secs = secs;
    }

    let mut executor = ClaudeAgentExecutor::new(config.claude_path.clone())
        .with_working_dir(&exec.working_dir)
        .with_permission_mode(exec.permission_mode);
    if let Some(model) = exec.model {
        executor = executor.with_model(model);
    }
    if let Some(system_prompt) = exec.system_prompt {
        executor = executor.with_system_prompt(system_prompt);
    }

    let gate: Arc<dyn ApprovalGate> = match exec.approval {
        Approval::Auto => Arc::new(AutoApprove::new()),
        Approval::Prompt => Arc::new(PromptGate::stdio()),
        Approval::Defer => Arc::new(DeferredGate),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let store = Arc::new(FsStore::new(&config.state_dir));
    let ctx = RunContext::new(run_id.clone(), store).with_cancellation(cancel);
    let runner = ProcessRunner::new(Arc::new(executor), gate).with_config(config.runner_config());

    info!(
        run_id = %run_id,
        process = process.name(),
        state_dir = %config.state_dir.display(),
        "Running pipeline"
    );

    match runner.run(process, raw_inputs, &ctx).await {
        Ok(result) => {
            print_result(&result, exec.json)?;
            Ok(())
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Run halted");
            eprintln!("Resume with: pipewright resume {}", run_id);
            Err(e.into())
        }
    }
}

async fn decide(config: &Config, run_id: &str, approved: bool, notes: Option<String>) -> Result<(), Box<dyn Error>> {
    let run_id = RunId::parse(run_id)?;
    let store = Arc::new(FsStore::new(&config.state_dir));
    let ctx = RunContext::new(run_id, store);

    // Resolving never dispatches; the executor is only there to build a runner.
    let runner = ProcessRunner::new(
        Arc::new(ClaudeAgentExecutor::new(config.claude_path.clone())),
        Arc::new(DeferredGate),
    );

    let result = runner.resolve(&ctx, approved, notes).await?;
    print_result(&result, false)?;
    Ok(())
}

async fn status(config: &Config, run_id: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let record = load_record(config, run_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("  Run:        {}", record.run_id);
    println!("  Pipeline:   {}", record.process);
    println!("  State:      {}", record.state);
    println!("  Started:    {}", format_timestamp(record.started_at));
    println!("  Updated:    {}", format_timestamp(record.updated_at));

    if let Some(halt) = &record.halted_at {
        println!("  Halted at:  {} ({}): {}", halt.task, halt.kind, halt.message);
    }

    if let Some(process) = pipewright_processes::find(&record.process) {
        let store = FsStore::new(&config.state_dir);
        println!("  Tasks:");
        for (index, task) in process.tasks().iter().enumerate() {
            let id = EffectId::derive(&record.run_id, index, task.name());
            let state = match store.get(&id).await? {
                Some(effect) => match effect.error {
                    Some(message) => format!("{} - {}", effect.status, message),
                    None => effect.status.to_string(),
                },
                None => "not started".to_string(),
            };
            println!("    {:>2}. {:<30}  {}", index + 1, task.name(), state);
        }
    }

    if let Some(result) = record.to_result() {
        print_breakpoint(&result);
    }
    Ok(())
}

async fn list_runs(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut runs = FsStore::new(&config.state_dir).list_runs().await?;
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    println!("Runs ({}):", runs.len());
    println!("{:<36}  {:<18}  {:<28}  {}", "ID", "STATE", "PIPELINE", "STARTED");
    println!("{}", "-".repeat(100));

    for run in runs {
        println!(
            "{:<36}  {:<18}  {:<28}  {}",
            run.run_id.as_str(),
            run.state.to_string(),
            run.process,
            format_timestamp(run.started_at)
        );
    }
    Ok(())
}

fn list_processes() {
    for process in pipewright_processes::all() {
        println!("{} - {}", process.name(), process.description());
        let names: Vec<_> = process.tasks().iter().map(|t| t.name()).collect();
        println!("    {}", names.join(" -> "));
    }
}

fn repair_json(input: &std::path::Path, output: Option<&std::path::Path>) -> Result<(), Box<dyn Error>> {
    let raw = std::fs::read(input)?;
    let repaired = pipewright_agent::repair::repair_bytes(&raw);
    match output {
        Some(path) => {
            std::fs::write(path, repaired)?;
            info!(input = %input.display(), output = %path.display(), "Repaired");
        }
        None => print!("{}", repaired),
    }
    Ok(())
}

fn print_result(result: &PipelineResult, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("  Run:        {}", result.metadata.run_id);
    println!("  Pipeline:   {}", result.metadata.pipeline_id);
    println!("  State:      {}", result.state);
    println!("  Duration:   {} ms", result.duration_ms);

    println!("  Artifacts ({}):", result.artifacts.len());
    for artifact in &result.artifacts {
        println!("    - {} ({}) from {}", artifact.path, artifact.kind, artifact.produced_by);
    }

    print_breakpoint(result);
    Ok(())
}

fn print_breakpoint(result: &PipelineResult) {
    println!("  Breakpoint: {}", result.breakpoint.title);
    println!("              {}", result.breakpoint.question);

    match &result.decision {
        Some(decision) => {
            let verdict = if decision.approved { "approved" } else { "rejected" };
            println!(
                "  Decision:   {} ({:?}) at {}",
                verdict,
                decision.method,
                format_timestamp(decision.decided_at)
            );
            if let Some(notes) = &decision.notes {
                println!("  Notes:      {}", notes);
            }
        }
        None if result.state == RunState::AwaitingApproval => {
            println!(
                "  Decide with: pipewright approve {0}  |  pipewright reject {0}",
                result.metadata.run_id
            );
        }
        None => {}
    }
}

fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
