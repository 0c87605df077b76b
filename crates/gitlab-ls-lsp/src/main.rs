//! gitlab-ls - GitLab issue and merge request completion over LSP

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, ValueEnum};
use gitlab_ls_lsp::{LspServer, MessageTransport};
use tracing::{error, info};

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Language server completing GitLab issues (#) and merge requests (!)
#[derive(Debug, Parser)]
#[command(name = "gitlab-ls", version, about)]
struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Stdout carries LSP frames, so logs go to stderr or a file
fn init_logging(cli: &Cli) -> Result<(), String> {
    use tracing_subscriber::fmt;

    let level = tracing::Level::from(cli.log_level);
    let result = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
            fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    result.map_err(|e| format!("cannot initialize logging: {}", e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("gitlab-ls: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("gitlab-ls: cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting gitlab-ls {}", env!("CARGO_PKG_VERSION"));
    let mut server = LspServer::new(MessageTransport::stdio());
    let outcome = runtime.block_on(server.run());
    // The stdin reader may still be blocked on a read after `exit`
    runtime.shutdown_background();

    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!("gitlab-ls failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
