//! Integration tests for turnstile
//!
//! These tests drive the gateway end to end: config, store, rules, ledger,
//! executor and audit log together.

use std::sync::Arc;
use std::time::Duration;
use turnstile_api::{
    AuditAction, Command, DefaultPolicy, PipelineState, Request, ResponsePayload, ResponseResult,
    Role, RuleAction, SubmissionStatus,
};
use turnstile_config::{parse_config, BootstrapSettings, GatewaySettings};
use turnstile_core::{Caller, Gateway};
use turnstile_host_api::{ExecutionLimits, ExecutionOutcome, MockExecutor};
use turnstile_host_linux::ShellExecutor;
use turnstile_store::{SqliteStore, Store};
use turnstile_util::GatewayError;

const ADMIN_KEY: &str = "integration-admin-key";

struct Harness {
    gateway: Arc<Gateway>,
    executor: MockExecutor,
    admin: Caller,
}

fn harness(settings: GatewaySettings) -> Harness {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let executor = MockExecutor::new();
    let gateway = Gateway::new(settings, store, Arc::new(executor.clone())).unwrap();
    gateway
        .bootstrap(&BootstrapSettings::default(), &[], Some(ADMIN_KEY))
        .unwrap();
    let admin = gateway.authenticate(ADMIN_KEY).unwrap();

    Harness {
        gateway: Arc::new(gateway),
        executor,
        admin,
    }
}

fn member(h: &Harness, name: &str, credits: u64) -> Caller {
    let created = h
        .gateway
        .create_principal(&h.admin, name, Role::Member, Some(credits))
        .unwrap();
    h.gateway.authenticate(&created.api_key).unwrap()
}

fn audit_actions(h: &Harness) -> Vec<AuditAction> {
    let mut log = h.gateway.list_audit_log(&h.admin).unwrap();
    log.reverse();
    log.into_iter().map(|e| e.action).collect()
}

#[tokio::test]
async fn test_rejected_by_rule_is_not_charged() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    h.gateway
        .add_rule(&h.admin, "^rm -rf", RuleAction::AutoReject)
        .unwrap();
    let bob = member(&h, "bob", 5);

    let sub = h.gateway.submit_command(&bob, "rm -rf /tmp").await.unwrap();

    assert_eq!(sub.status, SubmissionStatus::Rejected);
    assert_eq!(h.gateway.get_credits(&bob).unwrap(), 5);
    assert_eq!(h.executor.invocation_count(), 0);

    let rejections: Vec<_> = audit_actions(&h)
        .into_iter()
        .filter(|a| a.is_terminal())
        .collect();
    assert_eq!(rejections, [AuditAction::RejectedByRule]);
}

#[tokio::test]
async fn test_default_allow_executes_and_debits() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    h.executor.script("echo hi", ExecutionOutcome::succeeded("hi"));
    let bob = member(&h, "bob", 5);

    let sub = h.gateway.submit_command(&bob, "echo hi").await.unwrap();

    assert_eq!(sub.status, SubmissionStatus::Executed);
    assert_eq!(sub.result.as_deref(), Some("hi"));
    assert_eq!(h.gateway.get_credits(&bob).unwrap(), 4);
    assert_eq!(h.executor.invocations(), vec!["echo hi".to_string()]);
}

#[tokio::test]
async fn test_zero_balance_is_rejected() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    let bob = member(&h, "bob", 0);

    let sub = h.gateway.submit_command(&bob, "ls").await.unwrap();

    assert_eq!(sub.status, SubmissionStatus::Rejected);
    assert_eq!(sub.result.as_deref(), Some("insufficient credits"));
    assert_eq!(h.gateway.get_credits(&bob).unwrap(), 0);
    assert_eq!(
        audit_actions(&h).last(),
        Some(&AuditAction::RejectedInsufficientCredits)
    );
}

#[tokio::test]
async fn test_invalid_pattern_is_refused() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    let before = h.gateway.list_rules();

    let err = h
        .gateway
        .add_rule(&h.admin, "(", RuleAction::AutoReject)
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidPattern { .. }));
    assert_eq!(h.gateway.list_rules(), before);
}

#[tokio::test]
async fn test_rule_order_decides() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Deny));
    let bob = member(&h, "bob", 10);

    h.gateway
        .add_rule(&h.admin, "^git", RuleAction::AutoAccept)
        .unwrap();
    h.gateway
        .add_rule(&h.admin, "--force", RuleAction::AutoReject)
        .unwrap();

    let sub = h
        .gateway
        .submit_command(&bob, "git push --force")
        .await
        .unwrap();
    assert_eq!(sub.status, SubmissionStatus::Executed);

    let listed: Vec<_> = h
        .gateway
        .list_rules()
        .into_iter()
        .map(|r| r.pattern)
        .collect();
    assert_eq!(listed, ["^git", "--force"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_never_overdraw() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow).with_command_cost(2));
    h.executor.set_delay(Some(Duration::from_millis(20)));
    let bob = member(&h, "bob", 11);

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let gateway = Arc::clone(&h.gateway);
            let bob = bob.clone();
            tokio::spawn(async move {
                gateway
                    .submit_command(&bob, &format!("echo {}", i))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut charged = 0;
    let mut rejected = 0;
    for task in tasks {
        let sub = task.await.unwrap();
        match sub.state {
            PipelineState::Executed => charged += 1,
            PipelineState::Rejected => rejected += 1,
            other => panic!("unexpected terminal state {:?}", other),
        }
    }

    // floor(11 / 2) attempts can be paid for
    assert_eq!(charged, 5);
    assert_eq!(rejected, 15);
    assert_eq!(h.gateway.get_credits(&bob).unwrap(), 1);

    let history = h.gateway.list_history(&bob).unwrap();
    assert_eq!(history.len(), 20);
    assert!(history.iter().all(|s| s.is_terminal()));

    let debits = audit_actions(&h)
        .into_iter()
        .filter(|a| *a == AuditAction::CreditDebited)
        .count();
    assert_eq!(debits, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_principals_run_independently() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    h.executor.set_delay(Some(Duration::from_millis(100)));
    let bob = member(&h, "bob", 1);
    let alice = member(&h, "alice", 1);

    let g1 = Arc::clone(&h.gateway);
    let g2 = Arc::clone(&h.gateway);
    let (a, b) = tokio::join!(
        async move { g1.submit_command(&bob, "sleep").await },
        async move { g2.submit_command(&alice, "sleep").await },
    );

    assert_eq!(a.unwrap().status, SubmissionStatus::Executed);
    assert_eq!(b.unwrap().status, SubmissionStatus::Executed);
    assert_eq!(h.executor.max_concurrency(), 2);
}

#[tokio::test]
async fn test_every_terminal_submission_is_audited() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Deny));
    h.gateway
        .add_rule(&h.admin, "^ok", RuleAction::AutoAccept)
        .unwrap();
    h.gateway
        .add_rule(&h.admin, "^bad", RuleAction::AutoReject)
        .unwrap();
    h.executor.script("ok fail", ExecutionOutcome::failed("boom"));
    let bob = member(&h, "bob", 2);

    let mut ids = Vec::new();
    for text in ["ok one", "bad", "unknown", "ok fail", "ok broke"] {
        ids.push(h.gateway.submit_command(&bob, text).await.unwrap());
    }

    let log = h.gateway.list_audit_log(&h.admin).unwrap();
    for sub in &ids {
        let terminal: Vec<_> = log
            .iter()
            .filter(|e| e.action.is_terminal())
            .filter(|e| {
                e.details_json()
                    .map(|d| d["submission_id"] == sub.id.to_string())
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(terminal.len(), 1, "submission {:?}", sub.command_text);
        assert!(terminal[0].timestamp >= sub.created_at);
    }

    let states: Vec<_> = ids.iter().map(|s| s.state).collect();
    assert_eq!(
        states,
        [
            PipelineState::Executed,
            PipelineState::Rejected,
            PipelineState::Rejected,
            PipelineState::ExecutionFailed,
            PipelineState::Rejected,
        ]
    );
}

#[tokio::test]
async fn test_handle_round_trip() {
    let h = harness(GatewaySettings::new(DefaultPolicy::Allow));
    let bob = member(&h, "bob", 3);

    let request: Request = serde_json::from_str(
        r#"{"request_id":9,"api_version":1,"command":{"type":"submit_command","command_text":"pwd"}}"#,
    )
    .unwrap();
    let response = h.gateway.handle(&bob, request).await;
    assert_eq!(response.request_id, 9);
    assert!(response.is_ok());

    let response = h
        .gateway
        .handle(&bob, Request::new(10, Command::ListHistory))
        .await;
    match response.result {
        ResponseResult::Ok(ResponsePayload::History(items)) => assert_eq!(items.len(), 1),
        other => panic!("unexpected {:?}", other),
    }

    let json = serde_json::to_string(&response_for_key(&h).await).unwrap();
    assert!(!json.contains("api_key_hash"));
}

async fn response_for_key(h: &Harness) -> turnstile_api::Response {
    h.gateway
        .handle(
            &h.admin,
            Request::new(
                11,
                Command::CreatePrincipal {
                    name: "dave".into(),
                    role: Role::Member,
                    initial_credits: None,
                },
            ),
        )
        .await
}

#[tokio::test]
async fn test_configured_gateway_with_seed_rules() {
    let config = parse_config(
        r#"
        config_version = 1

        [gateway]
        default_policy = "deny"

        [executor]
        mode = "dry_run"

        [[rules]]
        pattern = "^uptime$"
        action = "AUTO_ACCEPT"
        "#,
    )
    .unwrap();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let gateway = Gateway::new(
        config.gateway.clone(),
        store,
        Arc::new(turnstile_host_api::DryRunExecutor::new()),
    )
    .unwrap();
    let report = gateway
        .bootstrap(&config.bootstrap, &config.seed_rules(), None)
        .unwrap();
    let admin = report.admin.unwrap();
    let caller = gateway.authenticate(&admin.api_key).unwrap();

    assert_eq!(gateway.list_rules().len(), 6);
    assert_eq!(gateway.list_rules()[5].pattern, "^uptime$");

    let sub = gateway.submit_command(&caller, "uptime").await.unwrap();
    assert_eq!(
        sub.result.as_deref(),
        Some("[dry-run] would execute: uptime")
    );

    let sub = gateway.submit_command(&caller, "rm -rf /").await.unwrap();
    assert_eq!(sub.status, SubmissionStatus::Rejected);

    let sub = gateway.submit_command(&caller, "whoami").await.unwrap();
    assert_eq!(sub.result.as_deref(), Some("rejected by default policy"));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("turnstile.db");
    let executor = MockExecutor::new();

    let bob_key = {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
        let gateway = Gateway::new(
            GatewaySettings::new(DefaultPolicy::Allow),
            store,
            Arc::new(executor.clone()),
        )
        .unwrap();
        gateway
            .bootstrap(&BootstrapSettings::default(), &[], Some(ADMIN_KEY))
            .unwrap();
        let admin = gateway.authenticate(ADMIN_KEY).unwrap();
        gateway.add_rule(&admin, "^b", RuleAction::AutoReject).unwrap();
        gateway.add_rule(&admin, "^a", RuleAction::AutoAccept).unwrap();
        let bob = gateway
            .create_principal(&admin, "bob", Role::Member, Some(3))
            .unwrap();
        let caller = gateway.authenticate(&bob.api_key).unwrap();
        gateway.submit_command(&caller, "ls").await.unwrap();
        bob.api_key
    };

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
    let gateway = Gateway::new(
        GatewaySettings::new(DefaultPolicy::Allow),
        store,
        Arc::new(executor),
    )
    .unwrap();
    let report = gateway
        .bootstrap(&BootstrapSettings::default(), &[], Some(ADMIN_KEY))
        .unwrap();
    assert!(report.admin.is_none());

    let bob = gateway.authenticate(&bob_key).unwrap();
    assert_eq!(gateway.get_credits(&bob).unwrap(), 2);
    assert_eq!(gateway.list_history(&bob).unwrap().len(), 1);

    let patterns: Vec<_> = gateway.list_rules().into_iter().map(|r| r.pattern).collect();
    assert_eq!(patterns, ["^b", "^a"]);
}

#[tokio::test]
async fn test_shell_executor_end_to_end() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let executor = ShellExecutor::new(
        "/bin/sh",
        ExecutionLimits {
            timeout: Duration::from_millis(300),
            max_output_bytes: 1024,
        },
    );
    let gateway = Gateway::new(
        GatewaySettings::new(DefaultPolicy::Allow),
        store,
        Arc::new(executor),
    )
    .unwrap();
    gateway
        .bootstrap(&BootstrapSettings::default(), &[], Some(ADMIN_KEY))
        .unwrap();
    let admin = gateway.authenticate(ADMIN_KEY).unwrap();
    let before = gateway.get_credits(&admin).unwrap();

    let sub = gateway.submit_command(&admin, "echo hi").await.unwrap();
    assert_eq!(sub.state, PipelineState::Executed);
    assert_eq!(sub.result.as_deref(), Some("hi\n"));

    let sub = gateway.submit_command(&admin, "sleep 5").await.unwrap();
    assert_eq!(sub.state, PipelineState::ExecutionFailed);
    assert_eq!(sub.result.as_deref(), Some("timeout"));

    // Both attempts were charged, including the one that timed out
    assert_eq!(gateway.get_credits(&admin).unwrap(), before - 2);
}
