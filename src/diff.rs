//! Class-of-service baseline pruning.
//!
//! Accounts inherit most attributes from their class-of-service profile;
//! only the overrides travel with the account. Replaying inherited values
//! onto the destination would freeze them there, detached from future
//! profile changes, so anything equal to the baseline is dropped before
//! the snapshot is built.

use crate::types::{AttrMap, AttrValue};

/// Result of pruning an account map against its baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosDiff {
    /// Attributes that differ from the baseline (the override set).
    pub overrides: AttrMap,
    /// Number of inherited attributes dropped, for observability only.
    pub dropped: usize,
}

/// Drop every attribute whose value equals the baseline profile's.
///
/// Comparison rules:
/// - both scalars: string equality;
/// - both lists: order-insensitive — equal length and equal sorted
///   contents (duplicate counts participate through the length check,
///   inherited source behavior);
/// - key absent from the baseline, or scalar-vs-list kind mismatch: always
///   retained.
pub fn prune_inherited(account: &AttrMap, baseline: &AttrMap) -> CosDiff {
    let mut overrides = AttrMap::new();
    let mut dropped = 0usize;

    for (name, value) in account {
        let inherited = match baseline.get(name) {
            Some(base) => values_equal(value, base),
            None => false,
        };
        if inherited {
            dropped += 1;
        } else {
            overrides.insert(name.clone(), value.clone());
        }
    }

    tracing::debug!(
        dropped = dropped,
        retained = overrides.len(),
        "pruned inherited attributes"
    );
    CosDiff { overrides, dropped }
}

fn values_equal(account: &AttrValue, baseline: &AttrValue) -> bool {
    match (account, baseline) {
        (AttrValue::Scalar(a), AttrValue::Scalar(b)) => a == b,
        (AttrValue::List(a), AttrValue::List(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut a_sorted = a.clone();
            let mut b_sorted = b.clone();
            a_sorted.sort();
            b_sorted.sort();
            a_sorted == b_sorted
        }
        // Kind mismatch is always an override.
        (AttrValue::Scalar(_), AttrValue::List(_)) | (AttrValue::List(_), AttrValue::Scalar(_)) => {
            false
        }
    }
}
