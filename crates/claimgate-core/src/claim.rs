//! Claim identifiers, envelopes, operation records, and denial documents.
//!
//! A claim is an opaque signed payload submitted for inclusion in the
//! transparency ledger. The store keys every claim by a content-addressed
//! [`ClaimRef`]; the submitter-visible lifecycle of one claim is tracked by
//! its [`Operation`] record, and a denied claim carries a [`DenialReason`]
//! surfaced verbatim on that record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length in characters of a hex-encoded SHA-256 claim reference.
const CLAIM_REF_HEX_LEN: usize = 64;

/// Errors produced when parsing a [`ClaimRef`] from its textual form.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimRefError {
    /// The textual form has the wrong length.
    #[error("claim reference must be {CLAIM_REF_HEX_LEN} hex characters, got {0}")]
    BadLength(usize),

    /// The textual form contains a non-hex or uppercase character.
    #[error("claim reference contains invalid character {0:?}")]
    BadCharacter(char),
}

/// Content-addressed claim identifier.
///
/// A `ClaimRef` is the lowercase hex SHA-256 digest of the claim payload
/// bytes. It names the claim in every store partition and on its operation
/// record, so a given payload always maps to the same reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimRef(String);

impl ClaimRef {
    /// Derives the reference for a claim payload.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(payload)))
    }

    /// Parses a reference from its textual form (a store file stem, for
    /// example).
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 64 lowercase hex
    /// characters.
    pub fn parse(text: &str) -> Result<Self, ClaimRefError> {
        if text.len() != CLAIM_REF_HEX_LEN {
            return Err(ClaimRefError::BadLength(text.len()));
        }
        if let Some(bad) = text.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(ClaimRefError::BadCharacter(bad));
        }
        Ok(Self(text.to_string()))
    }

    /// Returns the textual form of the reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed claim envelope as produced by the client tooling.
///
/// The engine and the store treat claim bytes as opaque; only the validator
/// parses them into this shape to evaluate schema constraints against the
/// issuer and friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEnvelope {
    /// The DID of the party that signed the claim.
    pub issuer: String,
    /// Media type of the embedded payload.
    pub content_type: String,
    /// The claim payload, as encoded by the client.
    pub payload: String,
}

/// Structured reason attached to a denied claim.
///
/// Constructed fresh per denied claim and immutable once handed to the
/// enforcer; the submitter observes it byte-for-byte as the `error` field of
/// the operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialReason {
    /// Short machine category. Defaults to [`DenialReason::GENERIC`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-text diagnostic, surfaced verbatim to the submitter.
    pub detail: String,
}

impl DenialReason {
    /// The generic denial category.
    pub const GENERIC: &'static str = "denied";

    /// Builds a generic denial carrying the given diagnostic.
    #[must_use]
    pub fn denied(detail: impl Into<String>) -> Self {
        Self {
            kind: Self::GENERIC.to_string(),
            detail: detail.into(),
        }
    }
}

/// Admission lifecycle state of one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Submitted, awaiting a policy decision.
    Pending,
    /// Admitted; visible to the ledger-insertion path.
    Inserted,
    /// Refused by policy; the denial reason is on the record.
    Denied,
}

impl OperationStatus {
    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Inserted => "inserted",
            Self::Denied => "denied",
        };
        f.write_str(text)
    }
}

/// Submitter-visible lifecycle record for one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// The claim this operation tracks.
    pub operation_id: ClaimRef,
    /// Current lifecycle state.
    pub status: OperationStatus,
    /// When the claim was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Denial document; present iff `status` is [`OperationStatus::Denied`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DenialReason>,
}

impl Operation {
    /// Builds the initial pending record for a freshly submitted claim.
    #[must_use]
    pub fn pending(operation_id: ClaimRef) -> Self {
        Self {
            operation_id,
            status: OperationStatus::Pending,
            submitted_at: Utc::now(),
            error: None,
        }
    }
}
