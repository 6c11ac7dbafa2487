mod dashboard;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use panedeck_core::cli_mode::CliModeTransport;
use panedeck_core::control_mode::ControlModeEngine;
use panedeck_core::{
    executor, Error, ErrorKind, EventType, Logger, Router, TransportConfig, TransportHandle,
    DEFAULT_TMUX_PROGRAM, QUEUE_CAPACITY,
};

use dashboard::{Dashboard, Outcome};

/// Requests the tmux transports answer
const TRANSPORT_SUBSCRIPTIONS: [EventType; 3] = [
    EventType::ListTree,
    EventType::CapturePane,
    EventType::FetchCurrentWindow,
];

#[derive(Parser)]
#[command(
    name = "panedeck",
    about = "panedeck: tmux sessions, windows and pane contents at a glance"
)]
struct Cli {
    /// Run each tmux command as its own process instead of attaching in control mode
    #[arg(long)]
    legacy: bool,

    /// tmux binary used by the dashboard transports
    #[arg(long, default_value = DEFAULT_TMUX_PROGRAM)]
    tmux: String,

    /// Log filter directives (falls back to PANEDECK_LOG, then "info")
    #[arg(long)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch the attached client to a session, window or pane
    Switch { target: String },

    /// Kill a session, or a window with --window
    Kill {
        target: String,
        #[arg(long)]
        window: bool,
    },

    /// Rename a session, or a window with --window
    Rename {
        target: String,
        name: String,
        #[arg(long)]
        window: bool,
    },

    /// Create a detached session, or a window inside an existing session
    New {
        name: String,
        /// Starting directory (defaults to the current one)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Create a window in this session instead of a new session
        #[arg(long = "in")]
        session: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),

    #[error("failed to write the session tree: {0}")]
    Output(#[from] serde_json::Error),

    #[error("cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

impl CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            CliError::Core(err) => err.kind(),
            CliError::Output(_) => ErrorKind::Invariant,
            CliError::Telemetry(_) | CliError::CurrentDir(_) => ErrorKind::External,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match telemetry::initialise(cli.log_filter.as_deref()) {
        Ok(_) => run(cli).await,
        Err(err) => Err(err.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = match err.kind() {
                ErrorKind::Invariant => "internal",
                ErrorKind::External => "tmux",
            };
            tracing::error!(?kind, error = %err, "panedeck failed");
            eprintln!("panedeck: {} error: {}", kind, err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Some(command) => run_command(command),
        None => {
            let config = TransportConfig {
                program: cli.tmux,
                ..TransportConfig::default()
            };
            run_dashboard(config, cli.legacy).await
        }
    }
}

fn run_command(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Switch { target } => executor::switch_client(&target)?,
        Commands::Kill { target, window } => {
            if window {
                executor::kill_window(&target)?
            } else {
                executor::kill_session(&target)?
            }
        }
        Commands::Rename {
            target,
            name,
            window,
        } => {
            if window {
                executor::rename_window(&target, &name)?
            } else {
                executor::rename_session(&target, &name)?
            }
        }
        Commands::New { name, dir, session } => {
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir().map_err(CliError::CurrentDir)?,
            };
            match session {
                Some(session) => executor::create_window(&session, &name, &dir)?,
                None => executor::create_session(&name, &dir)?,
            }
        }
    }
    Ok(())
}

async fn run_dashboard(config: TransportConfig, legacy: bool) -> Result<(), CliError> {
    let logger = Logger::new("panedeck");
    tracing::info!(program = %config.program, legacy, "starting dashboard");

    let mut router = Router::new(QUEUE_CAPACITY, &logger);
    let mut dashboard = Dashboard::new(QUEUE_CAPACITY, &logger);
    router.register_consumer(&dashboard::SUBSCRIPTIONS, &dashboard);
    router.register_producer(&mut dashboard);

    if legacy {
        let mut transport = CliModeTransport::new(config, &logger);
        router.register_consumer(&TRANSPORT_SUBSCRIPTIONS, &transport);
        router.register_producer(&mut transport);
        let transport = transport.start()?;
        drive(router, dashboard, transport).await
    } else {
        let mut engine = ControlModeEngine::new(config, &logger);
        router.register_consumer(&TRANSPORT_SUBSCRIPTIONS, &engine);
        router.register_producer(&mut engine);
        let (connection, transport) = engine.attach()?;
        let result = drive(router, dashboard, transport).await;
        connection.shutdown().await;
        result
    }
}

/// Run the bus until the dashboard finishes or a component fails.
async fn drive(
    router: Router,
    dashboard: Dashboard,
    transport: TransportHandle,
) -> Result<(), CliError> {
    let mut bus = router.start();
    let dashboard = dashboard.start()?;
    let transport = transport.wait();
    tokio::pin!(transport);

    let outcome = tokio::select! {
        outcome = dashboard => outcome.map_err(|e| Error::WorkerPanicked {
            name: "dashboard",
            message: e.to_string(),
        })??,
        result = &mut transport => {
            result?;
            let reason = "transport stopped before the dashboard finished".to_string();
            return Err(Error::Exited(reason).into());
        }
        result = &mut bus => {
            result.map_err(|e| Error::WorkerPanicked {
                name: "router",
                message: e.to_string(),
            })??;
            return Err(Error::QueueClosed("router inbound").into());
        }
    };

    // Dropping the routing table closes the transport's inbound queue, which
    // winds the transport down and detaches the control client.
    bus.abort();

    match outcome {
        Outcome::Completed(sessions) => {
            transport.await?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        Outcome::Quit => {
            tracing::info!("dashboard quit before completing");
            // Responses still in flight have nowhere to go once the bus is gone.
            if let Err(err) = transport.await {
                tracing::debug!(error = %err, "transport stopped after quit");
            }
        }
    }
    Ok(())
}
