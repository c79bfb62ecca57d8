//! Validated configuration structures

use crate::schema::{RawBootstrapConfig, RawConfig, RawExecutorConfig, RawGatewayConfig, RawRule};
use crate::validation::parse_default_policy;
use std::path::PathBuf;
use std::time::Duration;
use turnstile_api::{DefaultPolicy, RuleAction};

pub const DEFAULT_COMMAND_COST: u64 = 1;
pub const DEFAULT_INITIAL_CREDITS: u64 = 100;
pub const DEFAULT_AUDIT_PAGE_SIZE: usize = 200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_ADMIN_NAME: &str = "admin";
pub const DEFAULT_ADMIN_CREDITS: u64 = 9999;

/// Validated configuration ready for use by the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateway: GatewaySettings,
    pub executor: ExecutorSettings,
    pub bootstrap: BootstrapSettings,
    /// Extra seed rules from the config file, in order
    pub rules: Vec<SeedRule>,
}

impl GatewayConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            gateway: GatewaySettings::from_raw(raw.gateway),
            executor: ExecutorSettings::from_raw(raw.executor),
            bootstrap: BootstrapSettings::from_raw(raw.bootstrap),
            rules: raw.rules.into_iter().filter_map(SeedRule::from_raw).collect(),
        }
    }

    /// Rules to insert into an empty rule store, in evaluation order
    pub fn seed_rules(&self) -> Vec<SeedRule> {
        let mut rules = if self.bootstrap.seed_default_rules {
            default_seed_rules()
        } else {
            Vec::new()
        };
        rules.extend(self.rules.iter().cloned());
        rules
    }
}

/// Admission settings
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// What happens to commands no rule matches
    pub default_policy: DefaultPolicy,
    /// Credits charged per attempted execution
    pub command_cost: u64,
    pub default_initial_credits: u64,
    pub audit_page_size: usize,
    pub data_dir: Option<PathBuf>,
}

impl GatewaySettings {
    /// Settings with every optional value at its default
    pub fn new(default_policy: DefaultPolicy) -> Self {
        Self {
            default_policy,
            command_cost: DEFAULT_COMMAND_COST,
            default_initial_credits: DEFAULT_INITIAL_CREDITS,
            audit_page_size: DEFAULT_AUDIT_PAGE_SIZE,
            data_dir: None,
        }
    }

    pub fn with_command_cost(mut self, cost: u64) -> Self {
        self.command_cost = cost;
        self
    }

    fn from_raw(raw: RawGatewayConfig) -> Self {
        // Validation guarantees the policy is present and parses
        let default_policy = raw
            .default_policy
            .as_deref()
            .and_then(|p| parse_default_policy(p).ok())
            .unwrap_or(DefaultPolicy::Deny);

        Self {
            default_policy,
            command_cost: raw.command_cost.unwrap_or(DEFAULT_COMMAND_COST),
            default_initial_credits: raw
                .default_initial_credits
                .unwrap_or(DEFAULT_INITIAL_CREDITS),
            audit_page_size: raw.audit_page_size.unwrap_or(DEFAULT_AUDIT_PAGE_SIZE),
            data_dir: raw.data_dir,
        }
    }
}

/// Which executor implementation runs accepted commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorMode {
    /// Run through the configured shell
    Shell,
    /// Report what would run without running it
    DryRun,
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub mode: ExecutorMode,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub shell: PathBuf,
}

impl ExecutorSettings {
    fn from_raw(raw: RawExecutorConfig) -> Self {
        let mode = match raw.mode.as_deref() {
            Some("dry_run") => ExecutorMode::DryRun,
            _ => ExecutorMode::Shell,
        };

        Self {
            mode,
            timeout: raw
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            max_output_bytes: raw.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
            shell: raw.shell.unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL)),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_raw(RawExecutorConfig::default())
    }
}

/// Bootstrap settings
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub admin_name: String,
    pub admin_credits: u64,
    pub seed_default_rules: bool,
}

impl BootstrapSettings {
    fn from_raw(raw: RawBootstrapConfig) -> Self {
        Self {
            admin_name: raw
                .admin_name
                .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            admin_credits: raw.admin_credits.unwrap_or(DEFAULT_ADMIN_CREDITS),
            seed_default_rules: raw.seed_default_rules.unwrap_or(true),
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self::from_raw(RawBootstrapConfig::default())
    }
}

/// A rule to insert at bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRule {
    pub pattern: String,
    pub action: RuleAction,
}

impl SeedRule {
    pub fn new(pattern: impl Into<String>, action: RuleAction) -> Self {
        Self {
            pattern: pattern.into(),
            action,
        }
    }

    fn from_raw(raw: RawRule) -> Option<Self> {
        let action = raw.action.parse().ok()?;
        Some(Self {
            pattern: raw.pattern,
            action,
        })
    }
}

/// The stock rule set: destructive commands first, then read-only ones
pub fn default_seed_rules() -> Vec<SeedRule> {
    vec![
        SeedRule::new(r":\(\)\s*\{\s*:\|:&\s*\};\s*:", RuleAction::AutoReject),
        SeedRule::new(r"rm\s+-rf\s+/", RuleAction::AutoReject),
        SeedRule::new(r"mkfs\.", RuleAction::AutoReject),
        SeedRule::new(r"git\s+(status|log|diff)", RuleAction::AutoAccept),
        SeedRule::new(r"^(ls|cat|pwd|echo)", RuleAction::AutoAccept),
    ]
}
