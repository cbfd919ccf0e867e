//! Per-search scoring context of a query node.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader};
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;

/// Normalized scoring state built from one rewritten query node.
///
/// A weight goes through two phases before it can produce scorers:
/// [`sum_of_squared_weights`](Weight::sum_of_squared_weights) exactly once,
/// then [`normalize`](Weight::normalize) exactly once. Composite weights drive
/// both phases on their children.
pub trait Weight: Send + Sync + Debug {
    /// The final multiplicative weight applied to document scores.
    fn value(&self) -> f32;

    /// First phase: squared, boosted idf summed across the subtree.
    fn sum_of_squared_weights(&mut self) -> Result<f32>;

    /// Second phase: fold the query norm into every weight of the subtree.
    fn normalize(&mut self, norm: f32) -> Result<()>;

    /// A scorer over one segment, or None when nothing there can match.
    ///
    /// `score_docs_in_order` demands strictly increasing ids;
    /// `top_scorer` means the caller will drive collection through
    /// [`Scorer::score_all`] instead of `next`/`advance`.
    fn scorer(
        &self,
        reader: &Arc<dyn IndexReader>,
        score_docs_in_order: bool,
        top_scorer: bool,
    ) -> Result<Option<Box<dyn Scorer>>>;

    /// Explain the score of a segment-local document.
    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation>;

    /// Whether a top scorer from this weight may emit ids out of order.
    fn scores_docs_out_of_order(&self) -> bool {
        false
    }
}

/// Where a weight stands in the sum/normalize protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightPhase {
    /// Constructed; nothing computed yet.
    Created,
    /// `sum_of_squared_weights` ran.
    Summed,
    /// `normalize` ran; scorers may be built.
    Normalized,
}

/// Tracks a weight's phase and rejects out-of-order protocol calls.
#[derive(Debug, Clone, Copy)]
pub struct PhaseGuard {
    phase: WeightPhase,
}

impl Default for PhaseGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseGuard {
    /// A guard in the `Created` phase.
    pub fn new() -> Self {
        PhaseGuard {
            phase: WeightPhase::Created,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> WeightPhase {
        self.phase
    }

    /// Record the summing phase.
    pub fn summed(&mut self) -> Result<()> {
        match self.phase {
            WeightPhase::Created => {
                self.phase = WeightPhase::Summed;
                Ok(())
            }
            other => Err(TesseraError::illegal_state(format!(
                "sum_of_squared_weights called in phase {other:?}"
            ))),
        }
    }

    /// Record the normalization phase.
    pub fn normalized(&mut self) -> Result<()> {
        match self.phase {
            WeightPhase::Summed => {
                self.phase = WeightPhase::Normalized;
                Ok(())
            }
            other => Err(TesseraError::illegal_state(format!(
                "normalize called in phase {other:?}"
            ))),
        }
    }

    /// Fail unless both phases have run.
    pub fn ensure_normalized(&self) -> Result<()> {
        if self.phase == WeightPhase::Normalized {
            Ok(())
        } else {
            Err(TesseraError::illegal_state(format!(
                "weight used before normalization (phase {:?})",
                self.phase
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_enforced() {
        let mut guard = PhaseGuard::new();
        assert!(guard.ensure_normalized().is_err());
        assert!(guard.normalized().is_err());
        guard.summed().unwrap();
        assert!(guard.summed().is_err());
        guard.normalized().unwrap();
        assert_eq!(guard.phase(), WeightPhase::Normalized);
        assert!(guard.ensure_normalized().is_ok());
        assert!(guard.normalized().is_err());
    }
}
