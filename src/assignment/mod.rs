//! Deterministic experiment assignment.
//!
//! ```text
//! assign(identity, experiment)
//!    ↓
//! AssignmentStore::get ── hit ──→ Stored
//!    ↓ miss
//! identity_hash → bucket gate → weighted pick
//!    ↓
//! AssignmentStore::put → Bucketed | Excluded
//! ```
//!
//! # Example
//!
//! ```rust
//! use abtrack::assignment::{Identity, VariantAssignor};
//! use abtrack::experiment::{Experiment, Variant};
//! use abtrack::kv::MemoryKvStore;
//!
//! # async fn example() -> abtrack::Result<()> {
//! let experiment = Experiment::builder("exp_1")
//!     .variant(Variant::new("control", 1.0))
//!     .variant(Variant::new("b", 1.0))
//!     .build()?;
//!
//! let assignor = VariantAssignor::new(MemoryKvStore::new());
//! let visitor = Identity::anonymous("session-abc");
//!
//! let first = assignor.assign(&visitor, &experiment).await;
//! let again = assignor.assign(&visitor, &experiment).await;
//! assert_eq!(first.variant_id, again.variant_id);
//! # Ok(())
//! # }
//! ```

mod assignor;
pub mod hash;
mod store;

pub use assignor::{resolve, Resolution, VariantAssignor};
pub use store::{durable_key, session_key, AssignmentMap, AssignmentStore};

use serde::{Deserialize, Serialize};

/// Who is being assigned.
///
/// The stable user id is preferred when known; anonymous visitors are keyed
/// by their session id, which lasts only as long as the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    user_id: Option<String>,
    session_id: String,
}

impl Identity {
    /// Identity with an optional stable user id.
    #[must_use]
    pub fn new(user_id: Option<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.is_empty()),
            session_id: session_id.into(),
        }
    }

    /// Identity for a visitor who is not signed in.
    #[must_use]
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self::new(None, session_id)
    }

    /// Stable user id, if known.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The id fed to the hasher: user id when known, else session id.
    #[must_use]
    pub fn key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.session_id)
    }
}

/// How an assignment was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentSource {
    /// Read back from the assignment store.
    Stored,
    /// Freshly computed; visitor is inside the traffic allocation.
    Bucketed,
    /// Freshly computed; visitor is outside the allocation and gets control.
    Excluded,
}

/// A visitor's variant in one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Experiment the assignment belongs to
    pub experiment_id: String,
    /// Assigned variant
    pub variant_id: String,
    /// Identity key that was hashed
    pub identity: String,
    /// Where the answer came from
    pub source: AssignmentSource,
    /// Traffic bucket, present for freshly computed assignments
    pub bucket: Option<u32>,
}

impl Assignment {
    /// Whether this call created the assignment (as opposed to reading it back).
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.source != AssignmentSource::Stored
    }

    /// Whether the visitor was known to be outside the traffic allocation.
    ///
    /// Only fresh assignments can tell; a stored control assignment reports
    /// `false` whichever way it was reached.
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        self.source == AssignmentSource::Excluded
    }
}
