//! Config validation CLI tool
//!
//! Validates a turnstile configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use turnstile_config::{ConfigError, ExecutorMode, CURRENT_CONFIG_VERSION};
use turnstile_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a turnstile configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match turnstile_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Default policy: {}", config.gateway.default_policy);
            println!("  Command cost: {}", config.gateway.command_cost);
            let mode = match config.executor.mode {
                ExecutorMode::Shell => format!("shell ({})", config.executor.shell.display()),
                ExecutorMode::DryRun => "dry run".to_string(),
            };
            println!("  Executor: {}", mode);
            println!("  Timeout: {}s", config.executor.timeout.as_secs());

            let seeds = config.seed_rules();
            if !seeds.is_empty() {
                println!();
                println!("Seed rules (evaluation order):");
                for (i, rule) in seeds.iter().enumerate() {
                    println!("  {}. [{}] {}", i + 1, rule.action, rule.pattern);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
