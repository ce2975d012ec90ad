use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wf_core::types::{
    BuildJob, GateOutcome, JobFilter, JobId, JobStatus, NoticeLevel, OwnerId, PhaseReportInput,
    ProjectFile, ProjectId, StatusChangeInput,
};
use wf_core::{
    BuildOutcome, Forge, ForgeConfig, ForgeError, ModePolicy, RequestContext, Session,
    VersionedFileStore,
};
use wf_db::{DbStore, SnapshotRepo, schema};
use wf_events::bus::EventBus;
use wf_events::types::EventSource;

#[derive(Parser)]
#[command(name = "wf", about = "Build orchestration for generated web projects")]
struct Cli {
    /// Project root holding the `.webforge` directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the stale-job sweep.
    Serve,
    /// Print the OpenAPI document.
    Openapi,
    /// Plan and build a prompt for one project.
    Build(BuildArgs),
    /// Re-attach to active jobs and apply recent results.
    Resume {
        #[command(flatten)]
        target: Target,
        /// Keep polling until the active job settles.
        #[arg(long)]
        wait: bool,
    },
    /// List build jobs.
    Jobs {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        active: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show the snapshot history of a project.
    History { project: String },
    Undo { project: String },
    Redo { project: String },
    /// Flag a job as cancelled.
    Cancel { job_id: String },
    /// Worker-side job reporting.
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },
}

#[derive(Subcommand)]
enum JobCommand {
    /// Record the files of a finished phase. `files` is a JSON array path, or `-` for stdin.
    Phase {
        job_id: String,
        phase: u8,
        files: PathBuf,
    },
    Status {
        job_id: String,
        status: String,
        #[arg(long)]
        error: Option<String>,
    },
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    project: String,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    target: Target,
    prompt: String,
    /// Overrides the configured mode policy (`auto`, `client`, `server`).
    #[arg(long)]
    mode: Option<String>,
    /// After queueing a server job, poll until it settles.
    #[arg(long)]
    wait: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), ForgeError> {
    if matches!(cli.command, Command::Openapi) {
        println!("{}", wf_serve::openapi::generate_spec());
        return Ok(());
    }

    let config = ForgeConfig::load(&cli.root)?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).map_err(internal)?;
    }

    match cli.command {
        Command::Openapi => Ok(()),
        Command::Serve => serve(config).await,
        Command::Build(args) => build(config, args).await,
        Command::Resume { target, wait } => resume(&config, &target, wait).await,
        Command::Jobs {
            owner,
            project,
            active,
            json,
        } => {
            let forge = open_forge(&config)?;
            let filter = JobFilter {
                owner_id: owner.as_deref().map(parse_id::<OwnerId>).transpose()?,
                project_id: project.as_deref().map(parse_id::<ProjectId>).transpose()?,
                status: None,
                active: active.then_some(true),
            };
            let jobs = forge.jobs().list(&filter)?;
            if json {
                print_json(&jobs)
            } else {
                jobs.iter().for_each(print_job_line);
                Ok(())
            }
        }
        Command::History { project } => {
            let vfs = open_history(&config, &project)?;
            let current = vfs.history().current_index();
            for (index, snapshot) in vfs.snapshots().iter().enumerate() {
                let marker = if index == current { "*" } else { " " };
                println!(
                    "{marker} v{:<4} {}  {:>3} files  {}",
                    snapshot.version,
                    snapshot.at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.files.len(),
                    snapshot.message.dimmed()
                );
            }
            Ok(())
        }
        Command::Undo { project } => {
            let mut vfs = open_history(&config, &project)?;
            match vfs.undo()? {
                Some(snapshot) => println!("now at v{}", snapshot.version),
                None => println!("{}", "nothing to undo".dimmed()),
            }
            Ok(())
        }
        Command::Redo { project } => {
            let mut vfs = open_history(&config, &project)?;
            match vfs.redo()? {
                Some(snapshot) => println!("now at v{}", snapshot.version),
                None => println!("{}", "nothing to redo".dimmed()),
            }
            Ok(())
        }
        Command::Cancel { job_id } => {
            let forge = open_forge(&config)?;
            let ctx = RequestContext::new(EventSource::Cli, None);
            let job = forge.jobs().cancel(&ctx, &parse_id::<JobId>(&job_id)?)?;
            print_job_line(&job);
            Ok(())
        }
        Command::Job { command } => job_command(&config, command),
    }
}

async fn serve(config: ForgeConfig) -> Result<(), ForgeError> {
    wf_serve::openapi::ensure_initialized();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.port);
    let state = wf_serve::AppState::new(config, EventBus::new(1024));
    wf_serve::serve(state, addr).await.map_err(internal)
}

async fn build(mut config: ForgeConfig, args: BuildArgs) -> Result<(), ForgeError> {
    if let Some(mode) = &args.mode {
        config.mode = mode.parse::<ModePolicy>()?;
    }
    let forge = open_forge(&config)?.with_commands(&config)?;
    let mut session = open_session(&config, &args.target)?;
    let ctx = RequestContext::new(EventSource::Cli, None);

    let cancel = session.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let outcome = forge.engine().submit(&ctx, &mut session, &args.prompt).await;
    interrupt.abort();
    print_notices(&mut session);

    let outcome = outcome?;
    print_outcome(&outcome);
    if args.wait && matches!(outcome, BuildOutcome::Queued { .. }) {
        wait_for_job(&forge, &ctx, &mut session).await?;
    }
    Ok(())
}

async fn resume(config: &ForgeConfig, target: &Target, wait: bool) -> Result<(), ForgeError> {
    let forge = open_forge(config)?.with_commands(config)?;
    let mut session = open_session(config, target)?;
    let ctx = RequestContext::new(EventSource::Cli, None);

    let report = forge.reconciler().resume(&ctx, &mut session).await?;
    print_notices(&mut session);
    info!(
        resumed = ?report.resumed,
        applied = report.applied.len(),
        surfaced = report.surfaced.len(),
        "resume finished"
    );
    if wait {
        wait_for_job(&forge, &ctx, &mut session).await?;
    }
    Ok(())
}

/// Polls the active job until it settles. Ctrl-C cancels it.
async fn wait_for_job(
    forge: &Forge<DbStore>,
    ctx: &RequestContext,
    session: &mut Session<SnapshotRepo>,
) -> Result<(), ForgeError> {
    let mut interval = tokio::time::interval(forge.config().poll_interval());
    while session.state.has_active_job() {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                forge.engine().cancel(ctx, session);
                print_notices(session);
                return Ok(());
            }
        }
        let check = forge
            .reconciler()
            .check_staleness_at(ctx, session, Utc::now())
            .await?;
        debug!(?check, progress = ?session.state.phase_progress, "polled active job");
        print_notices(session);
    }
    Ok(())
}

fn job_command(config: &ForgeConfig, command: JobCommand) -> Result<(), ForgeError> {
    let forge = open_forge(config)?;
    let ctx = RequestContext::new(EventSource::Worker, None);
    let job = match command {
        JobCommand::Phase {
            job_id,
            phase,
            files,
        } => {
            let input = PhaseReportInput {
                phase,
                files: read_files(&files)?,
            };
            forge
                .jobs()
                .record_phase(&ctx, &parse_id::<JobId>(&job_id)?, input)?
        }
        JobCommand::Status {
            job_id,
            status,
            error,
        } => {
            let status = status.parse::<JobStatus>().map_err(invalid_input)?;
            forge.jobs().transition(
                &ctx,
                &parse_id::<JobId>(&job_id)?,
                StatusChangeInput { status, error },
            )?
        }
    };
    print_job_line(&job);
    Ok(())
}

fn open_forge(config: &ForgeConfig) -> Result<Forge<DbStore>, ForgeError> {
    let conn = schema::open_and_migrate(&config.db_path).map_err(internal)?;
    Ok(Forge::new(DbStore::new(conn), EventBus::new(256)).with_config(config.clone()))
}

fn open_history(
    config: &ForgeConfig,
    project: &str,
) -> Result<VersionedFileStore<SnapshotRepo>, ForgeError> {
    let repo = SnapshotRepo::open(&config.db_path_string(), parse_id::<ProjectId>(project)?)?;
    Ok(VersionedFileStore::open(repo)?)
}

fn open_session(config: &ForgeConfig, target: &Target) -> Result<Session<SnapshotRepo>, ForgeError> {
    let owner_id = parse_id::<OwnerId>(&target.owner)?;
    let vfs = open_history(config, &target.project)?;
    let project_id = parse_id::<ProjectId>(&target.project)?;
    Ok(Session::new(owner_id, project_id, vfs).with_locale(config.locale))
}

fn read_files(path: &Path) -> Result<Vec<ProjectFile>, ForgeError> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).map_err(internal)?
    } else {
        std::fs::read_to_string(path).map_err(internal)?
    };
    serde_json::from_str(&content).map_err(invalid_input)
}

fn parse_id<T>(value: &str) -> Result<T, ForgeError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(invalid_input)
}

fn invalid_input(err: impl std::fmt::Display) -> ForgeError {
    ForgeError::Job(wf_core::error::JobError::InvalidInput {
        message: err.to_string(),
    })
}

fn internal(err: impl std::fmt::Display) -> ForgeError {
    ForgeError::Internal {
        message: err.to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ForgeError> {
    println!("{}", serde_json::to_string_pretty(value).map_err(internal)?);
    Ok(())
}

fn print_job_line(job: &BuildJob) {
    let status = job.status.to_string();
    let status = match job.status {
        JobStatus::Completed => status.green().to_string(),
        JobStatus::FailedPhase(_) | JobStatus::FailedTimeout => status.red().to_string(),
        JobStatus::Cancelled => status.dimmed().to_string(),
        JobStatus::Planning | JobStatus::Building(_) => status.yellow().to_string(),
    };
    println!(
        "{}  {:<18}  {}  {}",
        job.id,
        status,
        job.updated_at.format("%Y-%m-%d %H:%M:%S"),
        job.directive.label()
    );
}

fn print_outcome(outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Applied {
            version,
            changed,
            review,
        } => {
            if *changed {
                println!("{} v{version}", "applied".green().bold());
            } else {
                println!("{} v{version}", "unchanged".dimmed());
            }
            match review {
                Some(GateOutcome::Approved { summary }) => {
                    println!("{} {summary}", "review approved:".green());
                }
                Some(GateOutcome::NeedsFix { issues, .. } | GateOutcome::Rejected { issues }) => {
                    for issue in issues {
                        println!("  {} {}: {}", "-".yellow(), issue.file, issue.issue);
                    }
                }
                None => {}
            }
        }
        BuildOutcome::Queued { job_id } => println!("{} {job_id}", "queued".yellow().bold()),
        BuildOutcome::Failed { message } => println!("{} {message}", "failed:".red().bold()),
        BuildOutcome::Cancelled => println!("{}", "cancelled".dimmed()),
    }
}

fn print_notices(session: &mut Session<SnapshotRepo>) {
    for notice in session.take_notices() {
        let label = match notice.level {
            NoticeLevel::Info => "info".blue().to_string(),
            NoticeLevel::Success => "done".green().to_string(),
            NoticeLevel::Warning => "warn".yellow().to_string(),
            NoticeLevel::Error => "error".red().to_string(),
        };
        println!("[{label}] {}", notice.message);
    }
}
