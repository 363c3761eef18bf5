//! Tests for the claim store backends: submission, pending snapshots,
//! transition atomicity, and the no-re-entry invariant.

use super::*;
use crate::claim::OperationStatus;

fn fs_store() -> (tempfile::TempDir, FsClaimStore) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = FsClaimStore::open(dir.path().join("store")).expect("failed to open store");
    (dir, store)
}

fn reason() -> DenialReason {
    DenialReason::denied("issuer not allowlisted")
}

// =============================================================================
// Submission and Discovery
// =============================================================================

#[test]
fn fs_submit_creates_pending_claim_and_record() {
    let (_dir, store) = fs_store();

    let claim = store.submit(b"claim-a").unwrap();
    assert_eq!(store.pending().unwrap(), vec![claim.clone()]);
    assert_eq!(store.read_claim(&claim).unwrap(), b"claim-a");

    let op = store.operation(&claim).unwrap();
    assert_eq!(op.operation_id, claim);
    assert_eq!(op.status, OperationStatus::Pending);
    assert!(op.error.is_none());
}

#[test]
fn fs_submit_is_idempotent_while_pending() {
    let (_dir, store) = fs_store();

    let first = store.submit(b"claim-a").unwrap();
    let submitted_at = store.operation(&first).unwrap().submitted_at;
    let second = store.submit(b"claim-a").unwrap();

    assert_eq!(first, second);
    assert_eq!(store.pending().unwrap().len(), 1);
    // The original record survives re-submission.
    assert_eq!(store.operation(&first).unwrap().submitted_at, submitted_at);
}

#[test]
fn fs_pending_snapshot_ignores_stray_files() {
    let (_dir, store) = fs_store();
    store.submit(b"claim-a").unwrap();

    std::fs::write(store.root().join("pending/notes.txt"), b"scratch").unwrap();
    std::fs::write(store.root().join("pending/bogus.claim"), b"bad stem").unwrap();

    assert_eq!(store.pending().unwrap().len(), 1);
}

#[test]
fn fs_unknown_claim_errors() {
    let (_dir, store) = fs_store();
    let ghost = ClaimRef::from_payload(b"never submitted");

    assert!(matches!(
        store.read_claim(&ghost),
        Err(StoreError::UnknownClaim(_))
    ));
    assert!(matches!(
        store.operation(&ghost),
        Err(StoreError::UnknownClaim(_))
    ));
}

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn fs_insert_transition_moves_claim_out_of_pending() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-a").unwrap();

    store.apply(&claim, PolicyDecision::Insert, None).unwrap();

    assert!(store.pending().unwrap().is_empty());
    let op = store.operation(&claim).unwrap();
    assert_eq!(op.status, OperationStatus::Inserted);
    assert!(op.error.is_none());
    // The payload is still retrievable for the ledger-insertion path.
    assert_eq!(store.read_claim(&claim).unwrap(), b"claim-a");
    assert!(store
        .root()
        .join(format!("inserted/{}.claim", claim.as_str()))
        .exists());
}

#[test]
fn fs_denied_transition_records_reason_verbatim() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-b").unwrap();

    store
        .apply(&claim, PolicyDecision::Denied, Some(&reason()))
        .unwrap();

    assert!(store.pending().unwrap().is_empty());
    let op = store.operation(&claim).unwrap();
    assert_eq!(op.status, OperationStatus::Denied);
    assert_eq!(op.error, Some(reason()));
}

#[test]
fn fs_denied_transition_requires_reason() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-b").unwrap();

    let err = store.apply(&claim, PolicyDecision::Denied, None).unwrap_err();
    assert!(matches!(err, StoreError::ReasonRequired(_)));

    // The failed transition left the claim pending.
    assert_eq!(store.pending().unwrap(), vec![claim.clone()]);
    assert_eq!(
        store.operation(&claim).unwrap().status,
        OperationStatus::Pending
    );
}

#[test]
fn fs_transitioned_claim_is_not_pending() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-a").unwrap();
    store.apply(&claim, PolicyDecision::Insert, None).unwrap();

    let err = store.apply(&claim, PolicyDecision::Insert, None).unwrap_err();
    assert!(matches!(err, StoreError::NotPending(_)));
}

#[test]
fn fs_resubmission_never_resurrects_transitioned_claim() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-a").unwrap();
    store
        .apply(&claim, PolicyDecision::Denied, Some(&reason()))
        .unwrap();

    let resubmitted = store.submit(b"claim-a").unwrap();
    assert_eq!(resubmitted, claim);
    assert!(store.pending().unwrap().is_empty());
    assert_eq!(
        store.operation(&claim).unwrap().status,
        OperationStatus::Denied
    );
}

#[test]
fn fs_failed_commit_rename_is_never_visible_as_a_denial() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-b").unwrap();

    // Break the denied partition so the commit rename cannot land: apply
    // writes the staged record, then fails moving the payload.
    let denied_dir = store.root().join("denied");
    std::fs::remove_dir_all(&denied_dir).unwrap();
    std::fs::write(&denied_dir, b"not a directory").unwrap();

    let err = store
        .apply(&claim, PolicyDecision::Denied, Some(&reason()))
        .unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));

    // The claim is still pending and the staged decision is invisible to
    // the submitter: an enforcement failure is not a denial.
    assert_eq!(store.pending().unwrap(), vec![claim.clone()]);
    let op = store.operation(&claim).unwrap();
    assert_eq!(op.status, OperationStatus::Pending);
    assert!(op.error.is_none());

    // Re-submission during the window does not treat the claim as
    // transitioned.
    assert_eq!(store.submit(b"claim-b").unwrap(), claim);
    assert_eq!(store.pending().unwrap(), vec![claim.clone()]);

    // Once the partition is repaired a retry commits normally.
    std::fs::remove_file(&denied_dir).unwrap();
    std::fs::create_dir(&denied_dir).unwrap();
    store
        .apply(&claim, PolicyDecision::Denied, Some(&reason()))
        .unwrap();
    assert!(store.pending().unwrap().is_empty());
    let op = store.operation(&claim).unwrap();
    assert_eq!(op.status, OperationStatus::Denied);
    assert_eq!(op.error, Some(reason()));
}

#[test]
fn fs_operation_record_is_valid_json_on_disk() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-b").unwrap();
    store
        .apply(&claim, PolicyDecision::Denied, Some(&reason()))
        .unwrap();

    let path = store.root().join(format!("operations/{}.json", claim.as_str()));
    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(value["status"], "denied");
    assert_eq!(value["error"]["type"], "denied");
    assert_eq!(value["error"]["detail"], "issuer not allowlisted");
}

#[test]
fn fs_store_leaves_no_temp_files_behind() {
    let (_dir, store) = fs_store();
    let claim = store.submit(b"claim-a").unwrap();
    store.apply(&claim, PolicyDecision::Insert, None).unwrap();

    for partition in ["pending", "inserted", "denied", "operations"] {
        for entry in std::fs::read_dir(store.root().join(partition)).unwrap() {
            let name = entry.unwrap().file_name();
            let name = name.to_string_lossy().into_owned();
            assert!(
                name.ends_with(".claim") || name.ends_with(".json"),
                "unexpected file in {partition}: {name}"
            );
        }
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

#[test]
fn memory_store_mirrors_fs_semantics() {
    let store = MemoryClaimStore::new();

    let admitted = store.submit(b"claim-a").unwrap();
    let denied = store.submit(b"claim-b").unwrap();
    assert_eq!(store.pending().unwrap().len(), 2);

    store.apply(&admitted, PolicyDecision::Insert, None).unwrap();
    store
        .apply(&denied, PolicyDecision::Denied, Some(&reason()))
        .unwrap();

    assert!(store.pending().unwrap().is_empty());
    assert_eq!(
        store.operation(&admitted).unwrap().status,
        OperationStatus::Inserted
    );
    assert_eq!(store.operation(&denied).unwrap().error, Some(reason()));

    assert!(matches!(
        store.apply(&admitted, PolicyDecision::Insert, None),
        Err(StoreError::NotPending(_))
    ));
    assert!(matches!(
        store.apply(&denied, PolicyDecision::Denied, None),
        Err(StoreError::NotPending(_))
    ));
}

#[test]
fn memory_resubmission_never_resurrects_transitioned_claim() {
    let store = MemoryClaimStore::new();
    let claim = store.submit(b"claim-a").unwrap();
    store.apply(&claim, PolicyDecision::Insert, None).unwrap();

    assert_eq!(store.submit(b"claim-a").unwrap(), claim);
    assert!(store.pending().unwrap().is_empty());
}
