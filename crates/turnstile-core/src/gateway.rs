//! External operations: authentication, authorization, dispatch

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use turnstile_api::{
    AuditAction, AuditEntry, Command, CommandSubmission, CreatedPrincipal, ErrorInfo,
    HealthStatus, Principal, Request, Response, ResponsePayload, Role, Rule, RuleAction,
};
use turnstile_config::{BootstrapSettings, GatewaySettings, SeedRule};
use turnstile_host_api::CommandExecutor;
use turnstile_store::{Store, StoreError};
use turnstile_util::{
    generate_api_key, hash_api_key, sanitize_api_key, GatewayError, PrincipalId, Result,
};

use crate::{AdmissionPipeline, AuditLog, CreditLedger, DebitError, PipelineSettings, RuleBook};

/// Most submissions returned by one history listing
pub const HISTORY_LIMIT: usize = 1000;

/// An authenticated principal and the role it was authenticated with.
///
/// Only [`Gateway::authenticate`] creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    principal_id: PrincipalId,
    name: String,
    role: Role,
}

impl Caller {
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            warn!(principal_id = %self.principal_id, "Admin operation refused");
            Err(GatewayError::NotAuthorized)
        }
    }
}

/// What [`Gateway::bootstrap`] did
#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Set only when an admin was created; its key is not shown again
    pub admin: Option<CreatedPrincipal>,
    pub seeded_rules: usize,
}

/// The admission gateway
pub struct Gateway {
    settings: GatewaySettings,
    store: Arc<dyn Store>,
    rules: Arc<RuleBook>,
    ledger: Arc<CreditLedger>,
    audit: Arc<AuditLog>,
    executor: Arc<dyn CommandExecutor>,
    pipeline: AdmissionPipeline,
}

impl Gateway {
    pub fn new(
        settings: GatewaySettings,
        store: Arc<dyn Store>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let audit = Arc::new(AuditLog::new(store.clone()));
        let rules = Arc::new(RuleBook::load(store.clone(), audit.clone())?);
        let ledger = Arc::new(CreditLedger::new(store.clone()));

        let pipeline = AdmissionPipeline::new(
            PipelineSettings {
                default_policy: settings.default_policy,
                command_cost: settings.command_cost,
            },
            store.clone(),
            rules.clone(),
            ledger.clone(),
            executor.clone(),
            audit.clone(),
        );

        info!(
            default_policy = %settings.default_policy,
            rule_count = rules.len(),
            "Gateway initialized"
        );

        Ok(Self {
            settings,
            store,
            rules,
            ledger,
            audit,
            executor,
            pipeline,
        })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Create the first admin and seed an empty rule book. Idempotent.
    ///
    /// `admin_key` fixes the admin's credential instead of generating one.
    pub fn bootstrap(
        &self,
        bootstrap: &BootstrapSettings,
        seeds: &[SeedRule],
        admin_key: Option<&str>,
    ) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        let admin_id = match self.store.first_admin()? {
            Some(admin) => admin.id,
            None => {
                let api_key = match admin_key {
                    Some(key) => sanitize_api_key(key).ok_or_else(|| {
                        GatewayError::invalid_request("supplied admin key is empty")
                    })?,
                    None => generate_api_key(),
                };
                let created = self.insert_principal(
                    None,
                    &bootstrap.admin_name,
                    Role::Admin,
                    bootstrap.admin_credits,
                    api_key,
                )?;
                info!(
                    principal_id = %created.principal.id,
                    name = %created.principal.name,
                    "Bootstrap admin created"
                );
                let id = created.principal.id;
                report.admin = Some(created);
                id
            }
        };

        if self.rules.is_empty() {
            for seed in seeds {
                self.rules.add_rule(&seed.pattern, seed.action, admin_id)?;
                report.seeded_rules += 1;
            }
            if report.seeded_rules > 0 {
                info!(count = report.seeded_rules, "Seed rules inserted");
            }
        }

        Ok(report)
    }

    /// Resolve a presented API key to a caller with its role claim
    pub fn authenticate(&self, api_key: &str) -> Result<Caller> {
        let key = sanitize_api_key(api_key).ok_or(GatewayError::Unauthenticated)?;
        let principal = self
            .store
            .find_principal_by_key_hash(&hash_api_key(&key))?
            .ok_or(GatewayError::Unauthenticated)?;

        Ok(Caller {
            principal_id: principal.id,
            name: principal.name,
            role: principal.role,
        })
    }

    /// Run a command through the admission pipeline
    pub async fn submit_command(
        &self,
        caller: &Caller,
        command_text: &str,
    ) -> Result<CommandSubmission> {
        self.pipeline.submit(caller.principal_id, command_text).await
    }

    /// Rules in evaluation order
    pub fn list_rules(&self) -> Vec<Rule> {
        self.rules.list()
    }

    pub fn add_rule(&self, caller: &Caller, pattern: &str, action: RuleAction) -> Result<Rule> {
        caller.require_admin()?;
        self.rules.add_rule(pattern, action, caller.principal_id)
    }

    /// Most recent first, at most `audit_page_size` entries
    pub fn list_audit_log(&self, caller: &Caller) -> Result<Vec<AuditEntry>> {
        caller.require_admin()?;
        self.audit.recent(self.settings.audit_page_size)
    }

    /// The caller's own submissions, most recent first
    pub fn list_history(&self, caller: &Caller) -> Result<Vec<CommandSubmission>> {
        Ok(self
            .store
            .list_submissions_for(&caller.principal_id, HISTORY_LIMIT)?)
    }

    /// Create a principal. The returned key is never retrievable again.
    pub fn create_principal(
        &self,
        caller: &Caller,
        name: &str,
        role: Role,
        initial_credits: Option<u64>,
    ) -> Result<CreatedPrincipal> {
        caller.require_admin()?;
        let credits = initial_credits.unwrap_or(self.settings.default_initial_credits);
        self.insert_principal(
            Some(caller.principal_id),
            name,
            role,
            credits,
            generate_api_key(),
        )
    }

    pub fn get_credits(&self, caller: &Caller) -> Result<u64> {
        Ok(self.ledger.balance(&caller.principal_id)?)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            store_ok: self.store.is_healthy(),
            executor_ok: self.executor.is_available(),
            rule_count: self.rules.len(),
            audit_failures: self.audit.failure_count(),
            last_audit_failure: self.audit.last_failure(),
        }
    }

    /// Serve one request envelope
    pub async fn handle(&self, caller: &Caller, request: Request) -> Response {
        let request_id = request.request_id;
        match self.dispatch(caller, request.command).await {
            Ok(payload) => Response::success(request_id, payload),
            Err(e) => Response::error(request_id, ErrorInfo::from(&e)),
        }
    }

    async fn dispatch(&self, caller: &Caller, command: Command) -> Result<ResponsePayload> {
        match command {
            Command::SubmitCommand { command_text } => self
                .submit_command(caller, &command_text)
                .await
                .map(ResponsePayload::Submission),
            Command::ListRules => Ok(ResponsePayload::Rules(self.list_rules())),
            Command::AddRule { pattern, action } => self
                .add_rule(caller, &pattern, action)
                .map(ResponsePayload::RuleAdded),
            Command::ListAuditLog => self.list_audit_log(caller).map(ResponsePayload::AuditLog),
            Command::ListHistory => self.list_history(caller).map(ResponsePayload::History),
            Command::CreatePrincipal {
                name,
                role,
                initial_credits,
            } => self
                .create_principal(caller, &name, role, initial_credits)
                .map(ResponsePayload::PrincipalCreated),
            Command::GetCredits => self
                .get_credits(caller)
                .map(|balance| ResponsePayload::Credits { balance }),
            Command::GetHealth => Ok(ResponsePayload::Health(self.health())),
        }
    }

    fn insert_principal(
        &self,
        actor: Option<PrincipalId>,
        name: &str,
        role: Role,
        credits: u64,
        api_key: String,
    ) -> Result<CreatedPrincipal> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GatewayError::invalid_request("principal name is empty"));
        }

        let principal = Principal {
            id: PrincipalId::new(),
            name: name.to_string(),
            role,
            credit_balance: 0,
            api_key_hash: hash_api_key(&api_key),
        };

        let principal = match self.ledger.grant(principal, credits) {
            Ok(principal) => principal,
            Err(DebitError::Store(StoreError::Conflict(_))) => {
                return Err(GatewayError::invalid_request(format!(
                    "principal '{}' already exists",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            principal_id = %principal.id,
            name = %principal.name,
            role = %role,
            "Principal created"
        );
        self.audit.append(
            actor,
            AuditAction::UserCreated,
            json!({
                "principal_id": principal.id,
                "name": principal.name,
                "role": role,
                "initial_credits": credits,
            }),
        );

        Ok(CreatedPrincipal { principal, api_key })
    }
}
