// ABOUTME: Owned view of the routing layer: applies rendered rules and detects drift.
// ABOUTME: Rules are only submitted when they differ from what is already in effect.

use crate::backend::{BackendError, RoutingOps};

use super::rules::RoutingRules;

/// Result of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The routing layer already had the desired rules.
    Unchanged,
    /// New rules were submitted.
    Applied,
}

/// Rules in effect differ from what was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub expected: RoutingRules,
    pub actual: Option<RoutingRules>,
    pub differences: Vec<String>,
}

/// The orchestrator's handle on the routing layer's rules.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    applied: Option<RoutingRules>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last rules this process applied or confirmed.
    pub fn applied(&self) -> Option<&RoutingRules> {
        self.applied.as_ref()
    }

    /// Make the routing layer match `desired`.
    pub async fn reconcile<R: RoutingOps + ?Sized>(
        &mut self,
        ops: &R,
        desired: &RoutingRules,
    ) -> Result<ReconcileOutcome, BackendError> {
        let current = ops.current_routing_rules().await?;
        if current.as_ref() == Some(desired) {
            tracing::debug!("routing rules already current");
            self.applied = Some(desired.clone());
            return Ok(ReconcileOutcome::Unchanged);
        }

        ops.apply_routing_rules(desired).await?;
        tracing::info!(
            rules = desired.rules.len(),
            "routing rules applied"
        );
        self.applied = Some(desired.clone());
        Ok(ReconcileOutcome::Applied)
    }

    /// Compare the routing layer's rules against `expected` without changing anything.
    pub async fn detect_drift<R: RoutingOps + ?Sized>(
        &self,
        ops: &R,
        expected: &RoutingRules,
    ) -> Result<Option<Drift>, BackendError> {
        let actual = ops.current_routing_rules().await?;
        let differences = match &actual {
            Some(rules) => rules.differences(expected),
            None => vec!["no routing rules applied".to_string()],
        };

        if differences.is_empty() {
            return Ok(None);
        }

        tracing::warn!(count = differences.len(), "routing drift detected");
        Ok(Some(Drift {
            expected: expected.clone(),
            actual,
            differences,
        }))
    }
}
