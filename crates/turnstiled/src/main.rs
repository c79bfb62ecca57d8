//! turnstile - command admission gateway
//!
//! Each invocation serves one request:
//! - Configuration loading
//! - Store initialization
//! - Bootstrap (first admin, seed rules)
//! - Executor selection (shell or dry run)
//! - Authentication and dispatch through the gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use turnstile_api::{
    Command, CreatedPrincipal, DefaultPolicy, ErrorInfo, Request, Response, ResponsePayload, Role,
    RuleAction,
};
use turnstile_config::{load_config, ExecutorMode, ExecutorSettings, GatewayConfig};
use turnstile_core::Gateway;
use turnstile_host_api::{CommandExecutor, DryRunExecutor, ExecutionLimits};
use turnstile_host_linux::ShellExecutor;
use turnstile_store::{SqliteStore, Store};
use turnstile_util::{
    default_config_path, default_data_dir, DATABASE_FILENAME, TURNSTILE_ADMIN_API_KEY_ENV,
    TURNSTILE_API_KEY_ENV, TURNSTILE_CONFIG_ENV, TURNSTILE_DATA_DIR_ENV,
};

/// turnstile - Rule-based admission gateway for shell commands
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
#[command(about = "Rule-based admission gateway for shell commands", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/turnstile/config.toml)
    #[arg(short, long, env = TURNSTILE_CONFIG_ENV, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set TURNSTILE_DATA_DIR env var)
    #[arg(short, long, env = TURNSTILE_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Caller API key (or set TURNSTILE_API_KEY env var)
    #[arg(short = 'k', long, env = TURNSTILE_API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Op,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Op {
    /// Create the first admin and seed the rule set
    Init,

    /// Submit a command for admission and execution
    Submit {
        /// Command text, handed to the shell exactly as given (quote it)
        #[arg(allow_hyphen_values = true)]
        command: String,
    },

    /// List rules in evaluation order
    Rules,

    /// Append a rule (admin only)
    AddRule {
        pattern: String,

        /// AUTO_ACCEPT or AUTO_REJECT
        #[arg(short, long)]
        action: RuleAction,
    },

    /// Show the audit log, most recent first (admin only)
    Audit,

    /// Show your own submissions, most recent first
    History,

    /// Show your credit balance
    Credits,

    /// Create a principal and print its API key once (admin only)
    CreatePrincipal {
        name: String,

        #[arg(short, long, default_value = "member")]
        role: Role,

        /// Initial credits (default from config)
        #[arg(long)]
        credits: Option<u64>,
    },

    /// Report component health
    Health,
}

impl Op {
    /// The gateway request for operations that need an authenticated caller
    fn into_command(self) -> Option<Command> {
        match self {
            Op::Init | Op::Health => None,
            Op::Submit { command } => Some(Command::SubmitCommand {
                command_text: command,
            }),
            Op::Rules => Some(Command::ListRules),
            Op::AddRule { pattern, action } => Some(Command::AddRule { pattern, action }),
            Op::Audit => Some(Command::ListAuditLog),
            Op::History => Some(Command::ListHistory),
            Op::Credits => Some(Command::GetCredits),
            Op::CreatePrincipal {
                name,
                role,
                credits,
            } => Some(Command::CreatePrincipal {
                name,
                role,
                initial_credits: credits,
            }),
        }
    }
}

/// Output of `turnstile init`
#[derive(Serialize)]
struct InitReport {
    default_policy: DefaultPolicy,
    /// Present only on the run that created the admin
    admin: Option<CreatedPrincipal>,
    seeded_rules: usize,
    rule_count: usize,
}

fn build_executor(settings: &ExecutorSettings) -> Arc<dyn CommandExecutor> {
    match settings.mode {
        ExecutorMode::Shell => Arc::new(ShellExecutor::new(
            settings.shell.clone(),
            ExecutionLimits {
                timeout: settings.timeout,
                max_output_bytes: settings.max_output_bytes,
            },
        )),
        ExecutorMode::DryRun => Arc::new(DryRunExecutor::new()),
    }
}

fn open_gateway(args: &Args, config: &GatewayConfig) -> Result<Gateway> {
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.gateway.data_dir.clone())
        .unwrap_or_else(default_data_dir);

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join(DATABASE_FILENAME);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );
    debug!(db_path = %db_path.display(), "Store initialized");

    let executor = build_executor(&config.executor);
    Gateway::new(config.gateway.clone(), store, executor).context("Failed to start gateway")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn print_response(response: &Response) -> Result<ExitCode> {
    print_json(response)?;
    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        default_policy = %config.gateway.default_policy,
        "Configuration loaded"
    );

    let gateway = open_gateway(&args, &config)?;

    let admin_key = std::env::var(TURNSTILE_ADMIN_API_KEY_ENV).ok();
    let report = gateway
        .bootstrap(&config.bootstrap, &config.seed_rules(), admin_key.as_deref())
        .context("Bootstrap failed")?;

    let command = match args.command {
        Op::Init => {
            print_json(&InitReport {
                default_policy: config.gateway.default_policy,
                admin: report.admin,
                seeded_rules: report.seeded_rules,
                rule_count: gateway.list_rules().len(),
            })?;
            return Ok(ExitCode::SUCCESS);
        }
        Op::Health => {
            let health = gateway.health();
            let code = if health.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            };
            print_json(&Response::success(0, ResponsePayload::Health(health)))?;
            return Ok(code);
        }
        other => {
            if let Some(created) = &report.admin {
                eprintln!(
                    "Created admin '{}'. API key (shown once): {}",
                    created.principal.name, created.api_key
                );
            }
            other.into_command()
        }
    };

    let Some(command) = command else {
        return Ok(ExitCode::SUCCESS);
    };

    let caller = match gateway.authenticate(args.api_key.as_deref().unwrap_or_default()) {
        Ok(caller) => caller,
        Err(e) => return print_response(&Response::error(0, ErrorInfo::from(&e))),
    };
    debug!(principal_id = %caller.principal_id(), role = %caller.role(), "Caller authenticated");

    let response = gateway.handle(&caller, Request::new(1, command)).await;
    print_response(&response)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only the JSON response
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    debug!(version = env!("CARGO_PKG_VERSION"), "turnstile starting");

    run(args).await
}
