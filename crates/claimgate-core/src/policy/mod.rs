//! Validation stage of the admission pipeline.
//!
//! The [`Validator`] capability performs the pure, side-effect-free check of
//! one claim against a schema reference. It produces a [`ValidationOutcome`]
//! which maps directly to a [`PolicyDecision`]; rendering the diagnostic and
//! building the per-claim denial document is the engine's job, not the
//! validator's.
//!
//! The validator is deliberately a seam: the in-process
//! [`AllowlistValidator`] is the primary implementation, but the engine must
//! not assume any particular execution boundary, so a subprocess or remote
//! validator can stand in behind the same trait.

mod allowlist;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use allowlist::AllowlistValidator;

/// Reference to the schema document a validator enforces.
///
/// Today this is a filesystem path; validators resolve it themselves so a
/// remote implementation is free to interpret it differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef(PathBuf);

impl SchemaRef {
    /// Builds a schema reference from a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The referenced path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Terminal decision for one claim, a pure function of the validation
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Admit the claim for ledger insertion.
    Insert,
    /// Refuse the claim; a denial reason must accompany the transition.
    Denied,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Insert => "insert",
            Self::Denied => "denied",
        };
        f.write_str(text)
    }
}

/// Result of checking one claim against the schema.
///
/// Produced fresh per claim; never persisted beyond the current pipeline
/// pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether every schema constraint held.
    pub passed: bool,
    /// Rendered description of the violated constraint; empty on pass.
    pub diagnostic: String,
}

impl ValidationOutcome {
    /// Outcome for a claim that satisfied every constraint.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostic: String::new(),
        }
    }

    /// Outcome for a claim that violated a constraint.
    #[must_use]
    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostic: diagnostic.into(),
        }
    }

    /// The decision this outcome maps to.
    #[must_use]
    pub const fn decision(&self) -> PolicyDecision {
        if self.passed {
            PolicyDecision::Insert
        } else {
            PolicyDecision::Denied
        }
    }
}

/// Errors that prevent a validator from producing an outcome at all.
///
/// These are transient pipeline failures, distinct from a failed outcome:
/// the claim stays pending and is retried on a later pass. Anything wrong
/// with the claim itself — including bytes that cannot be parsed — is a
/// failed [`ValidationOutcome`], never an error here, so a bad claim
/// reaches a terminal denial instead of being retried forever.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidatorError {
    /// The schema document could not be read.
    #[error("failed to read schema {path}: {source}")]
    SchemaRead {
        /// Path of the schema document.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The schema document is not the expected JSON shape.
    #[error("malformed schema document {path}: {detail}")]
    SchemaParse {
        /// Path of the schema document.
        path: PathBuf,
        /// What was wrong with it.
        detail: String,
    },
}

/// Pure structural/policy check of one claim.
///
/// Implementations must not mutate the claim, the store, or any shared
/// state: the same claim checked twice yields the same outcome.
pub trait Validator: Send + Sync {
    /// Checks the claim bytes against the referenced schema.
    ///
    /// # Errors
    ///
    /// Returns an error only when the check could not run at all
    /// (unreadable or malformed schema); a violated constraint or an
    /// unparseable claim is a failed [`ValidationOutcome`], not an error.
    fn check(&self, claim: &[u8], schema: &SchemaRef) -> Result<ValidationOutcome, ValidatorError>;
}
