//! Flowdesk server binary.
//!
//! `flowdesk serve` runs the HTTP and realtime server. `flowdesk task-host`
//! is the sandbox child: it evaluates one request from stdin and exits.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowdesk::adapters::background::LocalBackgroundTaskManager;
use flowdesk::adapters::http::{build_router, ApiState};
use flowdesk::adapters::realtime::{AdmissionController, Broadcaster, RealtimeState};
use flowdesk::adapters::repository::{FileTaskRepository, InMemoryTaskRepository};
use flowdesk::adapters::sandbox::{run_task_host, EmbeddedHost, ProcessHost, SandboxLimits};
use flowdesk::application::{FlowInterpreter, TaskRunner};
use flowdesk::config::{AppConfig, HostKind};
use flowdesk::ports::{ExecutionHost, TaskRepository};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "flowdesk", version, about = "Flow orchestration server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP and realtime server (default)
    Serve,
    /// Evaluate one task request from stdin (sandbox child mode)
    TaskHost(TaskHostArgs),
}

#[derive(Debug, Args)]
struct TaskHostArgs {
    #[arg(long, default_value_t = 0)]
    max_operations: u64,
    #[arg(long, default_value_t = 32)]
    max_call_levels: usize,
    #[arg(long, default_value_t = 64)]
    max_expr_depth: usize,
    #[arg(long, default_value_t = 1_048_576)]
    max_string_size: usize,
    #[arg(long, default_value_t = 100_000)]
    max_array_size: usize,
    #[arg(long, default_value_t = 100_000)]
    max_map_size: usize,
}

impl From<TaskHostArgs> for SandboxLimits {
    fn from(args: TaskHostArgs) -> Self {
        SandboxLimits {
            max_operations: args.max_operations,
            max_call_levels: args.max_call_levels,
            max_expr_depth: args.max_expr_depth,
            max_string_size: args.max_string_size,
            max_array_size: args.max_array_size,
            max_map_size: args.max_map_size,
        }
    }
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        // stdout belongs to the response line; no logging in this mode
        Command::TaskHost(args) => std::process::exit(run_task_host(&args.into())),
        Command::Serve => {
            let config = AppConfig::load_validated()?;
            init_tracing(&config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(config))
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.server.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: AppConfig) -> Result<(), BoxError> {
    let tasks: Arc<dyn TaskRepository> = match &config.tasks.directory {
        Some(dir) => {
            tracing::info!(directory = %dir.display(), "Loading tasks from directory");
            Arc::new(FileTaskRepository::new(dir))
        }
        None => {
            tracing::warn!("No task directory configured, using in-memory task store");
            Arc::new(InMemoryTaskRepository::new())
        }
    };

    let limits = config.runner.sandbox_limits();
    let host: Arc<dyn ExecutionHost> = match config.runner.host {
        HostKind::Process => {
            let host = match &config.runner.host_binary {
                Some(path) => ProcessHost::new(path.clone()),
                None => ProcessHost::current_exe()?,
            };
            Arc::new(host.with_limits(limits))
        }
        HostKind::Embedded => Arc::new(EmbeddedHost::new(limits)),
    };
    if config.is_production() && config.runner.host == HostKind::Embedded {
        tracing::warn!("Embedded task host shares the server process; prefer the process host in production");
    }
    tracing::info!(host = ?config.runner.host, "Task sandbox ready");

    let runner = Arc::new(TaskRunner::new(host, config.runner.task_runner_config()));
    let background = Arc::new(LocalBackgroundTaskManager::new(runner.clone(), tasks.clone()));
    let broadcaster = Arc::new(Broadcaster::new());
    let interpreter = Arc::new(
        FlowInterpreter::new(
            runner.clone(),
            tasks.clone(),
            background,
            config.flow.interpreter_config(),
        )
        .with_progress(broadcaster.clone()),
    );

    let admission = Arc::new(AdmissionController::new(
        config.realtime.max_connections_per_address,
    ));
    admission.start(config.realtime.sweep_interval()).await;

    let router = build_router(
        ApiState::new(interpreter, runner, tasks),
        RealtimeState::new(broadcaster, admission.clone(), config.realtime.send_buffer),
        &config.server,
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Flowdesk listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    admission.stop().await;
    tracing::info!("Flowdesk stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
