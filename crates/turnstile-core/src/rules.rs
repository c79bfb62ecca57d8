//! Ordered rule book and first-match classifier

use regex::Regex;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};
use turnstile_api::{AuditAction, Classification, Rule, RuleAction};
use turnstile_config::compile_pattern;
use turnstile_store::Store;
use turnstile_util::{GatewayError, PrincipalId, Result, RuleId};

use crate::AuditLog;

/// A rule together with its compiled pattern
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    regex: Regex,
}

impl CompiledRule {
    pub fn compile(rule: Rule) -> Result<Self> {
        let regex = compile_pattern(&rule.pattern)
            .map_err(|message| GatewayError::invalid_pattern(&rule.pattern, message))?;
        Ok(Self { rule, regex })
    }

    pub fn is_match(&self, command_text: &str) -> bool {
        self.regex.is_match(command_text)
    }
}

/// Result of classifying one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The first rule, in insertion order, whose pattern matched
    Matched {
        rule_id: RuleId,
        pattern: String,
        action: RuleAction,
    },
    NoMatch,
}

impl MatchOutcome {
    pub fn classification(&self) -> Classification {
        match self {
            MatchOutcome::Matched { action, .. } => (*action).into(),
            MatchOutcome::NoMatch => Classification::NoMatch,
        }
    }
}

/// Immutable snapshot of every rule in insertion order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        Self { rules }
    }

    /// First match wins. Matching is a search anywhere in the text.
    pub fn classify(&self, command_text: &str) -> MatchOutcome {
        self.rules
            .iter()
            .find(|compiled| compiled.is_match(command_text))
            .map(|compiled| MatchOutcome::Matched {
                rule_id: compiled.rule.id,
                pattern: compiled.rule.pattern.clone(),
                action: compiled.rule.action,
            })
            .unwrap_or(MatchOutcome::NoMatch)
    }

    /// A copy of this set with one more rule at the end
    fn with(&self, rule: CompiledRule) -> Self {
        let mut rules = self.rules.clone();
        rules.push(rule);
        Self { rules }
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rule store and matcher.
///
/// Readers take an `Arc` snapshot and never see a partially added rule.
/// Writers are serialized so persisted order and in-memory order agree.
pub struct RuleBook {
    store: Arc<dyn Store>,
    audit: Arc<AuditLog>,
    current: RwLock<Arc<RuleSet>>,
    writer: Mutex<()>,
}

impl RuleBook {
    /// Load every persisted rule, in insertion order
    pub fn load(store: Arc<dyn Store>, audit: Arc<AuditLog>) -> Result<Self> {
        let stored = store.list_rules()?;
        let compiled = stored
            .into_iter()
            .map(|rule| {
                CompiledRule::compile(rule).map_err(|e| {
                    GatewayError::internal(format!("stored rule no longer compiles: {}", e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(rule_count = compiled.len(), "Rule book loaded");

        Ok(Self {
            store,
            audit,
            current: RwLock::new(Arc::new(RuleSet::new(compiled))),
            writer: Mutex::new(()),
        })
    }

    /// Current rule set
    pub fn snapshot(&self) -> Arc<RuleSet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn classify(&self, command_text: &str) -> MatchOutcome {
        self.snapshot().classify(command_text)
    }

    /// Rules in evaluation order
    pub fn list(&self) -> Vec<Rule> {
        self.snapshot().rules().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Validate, persist and publish a new rule at the end of the order.
    ///
    /// An invalid pattern leaves both the store and the live set untouched.
    pub fn add_rule(
        &self,
        pattern: &str,
        action: RuleAction,
        created_by: PrincipalId,
    ) -> Result<Rule> {
        let rule = Rule {
            id: RuleId::new(),
            pattern: pattern.to_string(),
            action,
            created_by,
            created_at: turnstile_util::now(),
        };
        let compiled = CompiledRule::compile(rule.clone())?;

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        self.store.insert_rule(&rule)?;

        let next = Arc::new(self.snapshot().with(compiled));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;

        info!(
            rule_id = %rule.id,
            pattern = %rule.pattern,
            action = %rule.action,
            created_by = %created_by,
            "Rule created"
        );
        self.audit.append(
            Some(created_by),
            AuditAction::RuleCreated,
            json!({
                "rule_id": rule.id,
                "pattern": rule.pattern,
                "action": rule.action,
            }),
        );
        debug!(rule_count = self.len(), "Rule set swapped");

        Ok(rule)
    }
}
