//! In-memory claim store, the test-side twin of [`super::FsClaimStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use super::{ClaimStore, StoreError};
use crate::claim::{ClaimRef, DenialReason, Operation, OperationStatus};
use crate::policy::PolicyDecision;

#[derive(Default)]
struct Inner {
    /// Payload bytes for every submitted claim, pending or transitioned.
    payloads: HashMap<ClaimRef, Vec<u8>>,
    /// One lifecycle record per claim; `Pending` status marks membership in
    /// the pending set.
    operations: HashMap<ClaimRef, Operation>,
}

/// `Mutex<HashMap>`-backed claim store with the same transition semantics
/// as the filesystem backend. Intended for tests and embedding.
#[derive(Default)]
pub struct MemoryClaimStore {
    inner: Mutex<Inner>,
}

impl MemoryClaimStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStore for MemoryClaimStore {
    fn submit(&self, payload: &[u8]) -> Result<ClaimRef, StoreError> {
        let claim = ClaimRef::from_payload(payload);
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;

        if let Some(record) = inner.operations.get(&claim) {
            if record.status.is_terminal() {
                return Ok(claim);
            }
        } else {
            inner
                .operations
                .insert(claim.clone(), Operation::pending(claim.clone()));
        }
        inner.payloads.insert(claim.clone(), payload.to_vec());
        Ok(claim)
    }

    fn pending(&self) -> Result<Vec<ClaimRef>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .operations
            .values()
            .filter(|record| record.status == OperationStatus::Pending)
            .map(|record| record.operation_id.clone())
            .collect())
    }

    fn read_claim(&self, claim: &ClaimRef) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner
            .payloads
            .get(claim)
            .cloned()
            .ok_or_else(|| StoreError::UnknownClaim(claim.clone()))
    }

    fn operation(&self, claim: &ClaimRef) -> Result<Operation, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner
            .operations
            .get(claim)
            .cloned()
            .ok_or_else(|| StoreError::UnknownClaim(claim.clone()))
    }

    fn apply(
        &self,
        claim: &ClaimRef,
        decision: PolicyDecision,
        reason: Option<&DenialReason>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;

        match inner.operations.get(claim) {
            Some(record) if record.status == OperationStatus::Pending => {},
            _ => return Err(StoreError::NotPending(claim.clone())),
        }

        let (status, error) = match decision {
            PolicyDecision::Insert => (OperationStatus::Inserted, None),
            PolicyDecision::Denied => {
                let reason = reason.ok_or_else(|| StoreError::ReasonRequired(claim.clone()))?;
                (OperationStatus::Denied, Some(reason.clone()))
            },
        };

        let record = inner
            .operations
            .get_mut(claim)
            .ok_or_else(|| StoreError::NotPending(claim.clone()))?;
        record.status = status;
        record.error = error;
        Ok(())
    }
}
