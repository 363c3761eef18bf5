//! End-to-end registration policy tests over the filesystem store.
//!
//! Mirrors the documented operator setup: an allowlist schema on disk, a
//! store directory shared with the (external) submission API, and the
//! engine polling in the background. Two claims are submitted before the
//! engine starts; after settling, the allowlisted claim has a retrievable
//! success result and the blocked claim's operation record carries the
//! exact denial document the validator rendered.

use std::sync::Arc;
use std::time::{Duration, Instant};

use claimgate_core::claim::{ClaimRef, Operation, OperationStatus};
use claimgate_core::enforcer::StoreEnforcer;
use claimgate_core::policy::{AllowlistValidator, SchemaRef};
use claimgate_core::store::{ClaimStore, FsClaimStore};
use claimgate_daemon::engine::{EngineConfig, EngineHandle, PolicyEngine};

const ALLOWLISTED_ISSUER: &str = "did:web:example.org";
const NON_ALLOWLISTED_ISSUER: &str = "did:web:example.com";

const ALLOWLIST_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "issuer": {"enum": ["did:web:example.org"], "type": "string"}
    },
    "required": ["issuer"]
}"#;

/// The denial document for the blocked issuer, byte-for-byte.
const BLOCKED_DETAIL: &str = "'did:web:example.com' is not one of ['did:web:example.org']\n\nFailed validating 'enum' in schema['properties']['issuer']:\n    {'enum': ['did:web:example.org'], 'type': 'string'}\n\nOn instance['issuer']:\n    'did:web:example.com'\n";

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<FsClaimStore>,
    handle: EngineHandle,
}

fn claim_bytes(issuer: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "issuer": issuer,
        "content_type": "application/json",
        "payload": "eyJrZXkiOiAidmFsdWUifQ==",
    }))
    .unwrap()
}

fn start_engine(dir: tempfile::TempDir, store: Arc<FsClaimStore>) -> Harness {
    let schema_path = dir.path().join("allowlist.schema.json");
    std::fs::write(&schema_path, ALLOWLIST_SCHEMA).unwrap();

    let config = EngineConfig::new(SchemaRef::new(schema_path))
        .with_poll_interval(Duration::from_millis(10));
    let handle = PolicyEngine::spawn(
        config,
        Arc::clone(&store) as Arc<dyn ClaimStore>,
        Arc::new(AllowlistValidator::new()),
        Arc::new(StoreEnforcer::new(
            Arc::clone(&store) as Arc<dyn ClaimStore>
        )),
    );

    Harness {
        _dir: dir,
        store,
        handle,
    }
}

fn setup() -> (tempfile::TempDir, Arc<FsClaimStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsClaimStore::open(dir.path().join("store")).unwrap());
    (dir, store)
}

async fn wait_terminal(store: &FsClaimStore, claim: &ClaimRef) -> Operation {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let op = store.operation(claim).expect("operation must exist");
        if op.status.is_terminal() {
            return op;
        }
        assert!(Instant::now() < deadline, "claim {claim} never settled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn claims_submitted_before_start_settle_to_exact_results() {
    let (dir, store) = setup();

    let admitted = store.submit(&claim_bytes(ALLOWLISTED_ISSUER)).unwrap();
    let blocked = store.submit(&claim_bytes(NON_ALLOWLISTED_ISSUER)).unwrap();

    let harness = start_engine(dir, store);
    let admitted_op = wait_terminal(&harness.store, &admitted).await;
    let blocked_op = wait_terminal(&harness.store, &blocked).await;
    harness.handle.stop().await.unwrap();

    // Allowlisted issuer: inserted, payload visible to the ledger path.
    assert_eq!(admitted_op.status, OperationStatus::Inserted);
    assert!(admitted_op.error.is_none());
    assert_eq!(
        harness.store.read_claim(&admitted).unwrap(),
        claim_bytes(ALLOWLISTED_ISSUER)
    );

    // Blocked issuer: denied with the exact rendered diagnostic.
    assert_eq!(blocked_op.status, OperationStatus::Denied);
    let error = blocked_op.error.expect("denied claim must carry error");
    let as_json = serde_json::to_value(&error).unwrap();
    assert_eq!(
        as_json,
        serde_json::json!({"type": "denied", "detail": BLOCKED_DETAIL})
    );
}

#[tokio::test]
async fn claims_submitted_mid_run_are_picked_up_on_a_later_pass() {
    let (dir, store) = setup();
    let harness = start_engine(dir, store);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let claim = harness
        .store
        .submit(&claim_bytes(ALLOWLISTED_ISSUER))
        .unwrap();

    let op = wait_terminal(&harness.store, &claim).await;
    harness.handle.stop().await.unwrap();
    assert_eq!(op.status, OperationStatus::Inserted);
}

#[tokio::test]
async fn engine_stops_processing_after_shutdown() {
    let (dir, store) = setup();
    let harness = start_engine(dir, store);
    harness.handle.stop().await.unwrap();

    // Submitted after stop: nothing polls anymore, the claim stays pending.
    let claim = harness
        .store
        .submit(&claim_bytes(ALLOWLISTED_ISSUER))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        harness.store.operation(&claim).unwrap().status,
        OperationStatus::Pending
    );
}

#[tokio::test]
async fn settled_claims_survive_an_engine_restart_untouched() {
    let (dir, store) = setup();

    let blocked = store.submit(&claim_bytes(NON_ALLOWLISTED_ISSUER)).unwrap();
    let harness = start_engine(dir, store);
    let first = wait_terminal(&harness.store, &blocked).await;
    harness.handle.stop().await.unwrap();

    // Restart against the same directory: no second decision appears.
    let store = harness.store;
    let dir2 = tempfile::tempdir().unwrap();
    let restarted = start_engine(dir2, Arc::clone(&store));
    tokio::time::sleep(Duration::from_millis(50)).await;
    restarted.handle.stop().await.unwrap();

    let second = store.operation(&blocked).unwrap();
    assert_eq!(first, second);
}
