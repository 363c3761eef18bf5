//! Filesystem claim store: directory-as-queue with atomic rename commits.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{ClaimStore, StoreError};
use crate::claim::{ClaimRef, DenialReason, Operation, OperationStatus};
use crate::policy::PolicyDecision;

const PENDING_DIR: &str = "pending";
const INSERTED_DIR: &str = "inserted";
const DENIED_DIR: &str = "denied";
const OPERATIONS_DIR: &str = "operations";

/// File extension for claim payloads.
const CLAIM_EXT: &str = "claim";

/// Directory-backed claim store.
///
/// Layout under the root:
///
/// ```text
/// <root>/pending/<ref>.claim      payloads awaiting a decision
/// <root>/inserted/<ref>.claim     admitted payloads (ledger-insertion input)
/// <root>/denied/<ref>.claim       refused payloads
/// <root>/operations/<ref>.json    one lifecycle record per claim
/// ```
///
/// Every write goes to a temp file in the destination directory followed by
/// a `rename`, so a record is either fully present or absent. A transition
/// writes the updated operation record first, then renames the payload out
/// of `pending/`; that rename is the commit point. A crash between the two
/// leaves the claim pending, and re-running the pipeline rewrites the same
/// record, so nothing is lost and nothing is decided twice.
///
/// Because the record lands before the commit rename, a record with a
/// terminal status is only a *staged* decision until the payload has left
/// `pending/`. Reads therefore derive the submitter-visible status from
/// partition membership: while `pending/<ref>.claim` exists the claim is
/// pending, whatever the staged record says. An enforcement failure in the
/// window between the two writes is never surfaced as a denial.
pub struct FsClaimStore {
    root: PathBuf,
}

impl FsClaimStore {
    /// Opens (creating if needed) a store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [PENDING_DIR, INSERTED_DIR, DENIED_DIR, OPERATIONS_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self { root })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn claim_path(&self, partition: &str, claim: &ClaimRef) -> PathBuf {
        self.root
            .join(partition)
            .join(format!("{}.{CLAIM_EXT}", claim.as_str()))
    }

    fn record_path(&self, claim: &ClaimRef) -> PathBuf {
        self.root
            .join(OPERATIONS_DIR)
            .join(format!("{}.json", claim.as_str()))
    }

    /// Writes `bytes` to `dest` atomically: temp file in the same
    /// directory, flush, rename.
    fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = dest.parent().ok_or_else(|| {
            StoreError::Io(std::io::Error::other("destination has no parent directory"))
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(dest).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }

    fn read_record(&self, claim: &ClaimRef) -> Result<Option<Operation>, StoreError> {
        let path = self.record_path(claim);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record =
            serde_json::from_slice(&bytes).map_err(|err| StoreError::MalformedRecord {
                path,
                detail: err.to_string(),
            })?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &Operation) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|err| StoreError::Io(std::io::Error::other(err)))?;
        Self::write_atomic(&self.record_path(&record.operation_id), &bytes)
    }
}

impl ClaimStore for FsClaimStore {
    fn submit(&self, payload: &[u8]) -> Result<ClaimRef, StoreError> {
        let claim = ClaimRef::from_payload(payload);

        // A transitioned reference never re-enters pending, even when the
        // identical payload is submitted again. A staged terminal record
        // whose payload is still in pending/ does not count: that claim has
        // not transitioned.
        if let Some(record) = self.read_record(&claim)? {
            if record.status.is_terminal() && !self.claim_path(PENDING_DIR, &claim).exists() {
                debug!(claim = %claim, status = %record.status, "re-submission of transitioned claim ignored");
                return Ok(claim);
            }
        } else {
            self.write_record(&Operation::pending(claim.clone()))?;
        }

        Self::write_atomic(&self.claim_path(PENDING_DIR, &claim), payload)?;
        debug!(claim = %claim, "claim submitted");
        Ok(claim)
    }

    fn pending(&self) -> Result<Vec<ClaimRef>, StoreError> {
        let mut snapshot = Vec::new();
        for entry in fs::read_dir(self.root.join(PENDING_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CLAIM_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match ClaimRef::parse(stem) {
                Ok(claim) => snapshot.push(claim),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring stray file in pending partition");
                },
            }
        }
        Ok(snapshot)
    }

    fn read_claim(&self, claim: &ClaimRef) -> Result<Vec<u8>, StoreError> {
        for partition in [PENDING_DIR, INSERTED_DIR, DENIED_DIR] {
            match fs::read(self.claim_path(partition, claim)) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::UnknownClaim(claim.clone()))
    }

    fn operation(&self, claim: &ClaimRef) -> Result<Operation, StoreError> {
        let mut record = self
            .read_record(claim)?
            .ok_or_else(|| StoreError::UnknownClaim(claim.clone()))?;

        // A decision is staged, not committed, until the payload leaves
        // pending/. Until then the submitter sees a pending operation.
        if record.status.is_terminal() && self.claim_path(PENDING_DIR, claim).exists() {
            record.status = OperationStatus::Pending;
            record.error = None;
        }
        Ok(record)
    }

    fn apply(
        &self,
        claim: &ClaimRef,
        decision: PolicyDecision,
        reason: Option<&DenialReason>,
    ) -> Result<(), StoreError> {
        let pending_path = self.claim_path(PENDING_DIR, claim);
        if !pending_path.exists() {
            return Err(StoreError::NotPending(claim.clone()));
        }

        let (status, error, dest_partition) = match decision {
            PolicyDecision::Insert => (OperationStatus::Inserted, None, INSERTED_DIR),
            PolicyDecision::Denied => {
                let reason = reason.ok_or_else(|| StoreError::ReasonRequired(claim.clone()))?;
                (OperationStatus::Denied, Some(reason.clone()), DENIED_DIR)
            },
        };

        let mut record = self
            .read_record(claim)?
            .unwrap_or_else(|| Operation::pending(claim.clone()));
        record.status = status;
        record.error = error;
        self.write_record(&record)?;

        // Commit point: once the payload leaves pending/ the claim is out of
        // the pending set. Until then, a crash leaves it re-processable.
        fs::rename(&pending_path, self.claim_path(dest_partition, claim))?;
        debug!(claim = %claim, decision = %decision, "claim transitioned");
        Ok(())
    }
}
