//! Variant assignment: traffic gate, weighted pick, write-back.

use tracing::{debug, warn};

use super::hash::{bucket, identity_hash};
use super::{Assignment, AssignmentSource, AssignmentStore, Identity};
use crate::experiment::{Experiment, Variant};
use crate::kv::KvStore;

/// Pure bucketing decision for one visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Index into `experiment.variants()`
    pub variant_index: usize,
    /// Traffic bucket in `[1, 100]`
    pub bucket: u32,
    /// `false` when the bucket fell outside the traffic allocation
    pub included: bool,
}

/// Decide a variant without touching storage.
///
/// 1. `bucket = hash % 100 + 1`; above the allocation → control, excluded.
/// 2. Weights are scaled to whole numbers (`[0.3, 0.7]` → `[3, 7]`), then
///    `target = hash % total_weight + 1`; first variant whose cumulative
///    weight reaches the target.
/// 3. No match (unreachable with positive weights) → control.
#[must_use]
pub fn resolve(identity: &str, experiment: &Experiment) -> Resolution {
    let hash = identity_hash(identity, experiment.id());
    let bucket = bucket(hash);

    if f64::from(bucket) > experiment.traffic_allocation() {
        return Resolution {
            variant_index: 0,
            bucket,
            included: false,
        };
    }

    let scale = experiment.weight_scale();
    let whole = |variant: &Variant| (variant.weight() * scale).round();
    let total: f64 = experiment.variants().iter().map(whole).sum();

    let target = f64::from(hash) % total + 1.0;
    let mut cumulative = 0.0;
    let variant_index = experiment
        .variants()
        .iter()
        .position(|variant| {
            cumulative += whole(variant);
            cumulative >= target
        })
        .unwrap_or(0);

    Resolution {
        variant_index,
        bucket,
        included: true,
    }
}

/// Assigns visitors to variants, caching decisions in an [`AssignmentStore`].
///
/// Once stored, an assignment is returned as-is even if the experiment's
/// weights or allocation change later.
#[derive(Debug)]
pub struct VariantAssignor<S> {
    store: AssignmentStore<S>,
}

impl<S: KvStore> VariantAssignor<S> {
    /// Create an assignor over a key-value backend.
    pub fn new(kv: S) -> Self {
        Self {
            store: AssignmentStore::new(kv),
        }
    }

    /// Read access to the assignment cache.
    pub const fn store(&self) -> &AssignmentStore<S> {
        &self.store
    }

    /// Assignment for `identity` in `experiment`.
    ///
    /// Never fails: a store that cannot be read counts as a miss, and a store
    /// that cannot be written still yields the computed assignment.
    pub async fn assign(&self, identity: &Identity, experiment: &Experiment) -> Assignment {
        if let Some(variant_id) = self.store.get(identity, experiment.id()).await {
            return Assignment {
                experiment_id: experiment.id().to_string(),
                variant_id,
                identity: identity.key().to_string(),
                source: AssignmentSource::Stored,
                bucket: None,
            };
        }

        let resolution = resolve(identity.key(), experiment);
        let variant_id = experiment.variants()[resolution.variant_index].id().to_string();
        let source = if resolution.included {
            AssignmentSource::Bucketed
        } else {
            debug!(
                experiment_id = experiment.id(),
                bucket = resolution.bucket,
                allocation = experiment.traffic_allocation(),
                "visitor outside traffic allocation, serving control"
            );
            AssignmentSource::Excluded
        };

        if let Err(error) = self.store.put(identity, experiment.id(), &variant_id).await {
            warn!(
                experiment_id = experiment.id(),
                %error,
                "could not persist assignment; it will be recomputed next time"
            );
        }

        Assignment {
            experiment_id: experiment.id().to_string(),
            variant_id,
            identity: identity.key().to_string(),
            source,
            bucket: Some(resolution.bucket),
        }
    }
}
