//! Failure type → ordered remedial actions

use std::collections::BTreeMap;

use crate::types::{FailureType, RecoveryAction};

/// Built-in action menu for a failure type, most targeted action first.
pub fn default_actions(failure_type: FailureType) -> &'static [RecoveryAction] {
    use RecoveryAction::*;
    match failure_type {
        FailureType::ApiTimeout => &[RestartService, ClearCache, ResetConnectionPool],
        FailureType::ApiError => &[RestartService, ReloadConfig],
        FailureType::DatabaseConnection => &[ReconnectDatabase, RestartService, CleanupResources],
        FailureType::ServerUnresponsive => &[RestartService, ClearCache, ScaleUp],
        FailureType::WorkflowFailed => &[RestartWorkflow, ClearTempFiles, RestartService],
        FailureType::HighErrorRate => &[ClearCache, RestartService, ScaleUp],
        FailureType::ResourceExhausted => &[CleanupResources, ClearCache, ClearTempFiles, ScaleUp],
        FailureType::WorkflowEngineError => &[RestartWorkflowEngine, RestartWorkflow, ClearTempFiles],
        FailureType::AcceleratorError => &[RestartAcceleratorService, CleanupResources, RestartService],
        FailureType::ExternalApiError => &[ClearCache, ResetConnectionPool, RestartService],
    }
}

/// Strategy lookup: built-in table plus per-type overrides from config.
///
/// An override with an empty list removes the strategy for that type, which
/// sends its failures straight to escalation.
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    overrides: BTreeMap<FailureType, Vec<RecoveryAction>>,
}

impl StrategyTable {
    pub fn new(overrides: BTreeMap<FailureType, Vec<RecoveryAction>>) -> Self {
        Self { overrides }
    }

    pub fn actions_for(&self, failure_type: FailureType) -> Vec<RecoveryAction> {
        match self.overrides.get(&failure_type) {
            Some(actions) => actions.clone(),
            None => default_actions(failure_type).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_type_has_a_default_strategy() {
        for t in FailureType::ALL {
            assert!(!default_actions(t).is_empty(), "{t} has no actions");
        }
    }

    #[test]
    fn database_strategy_reconnects_first() {
        assert_eq!(
            default_actions(FailureType::DatabaseConnection),
            &[
                RecoveryAction::ReconnectDatabase,
                RecoveryAction::RestartService,
                RecoveryAction::CleanupResources
            ]
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert(FailureType::ApiError, vec![RecoveryAction::Failover]);
        overrides.insert(FailureType::HighErrorRate, vec![]);
        let table = StrategyTable::new(overrides);
        assert_eq!(table.actions_for(FailureType::ApiError), vec![RecoveryAction::Failover]);
        assert!(table.actions_for(FailureType::HighErrorRate).is_empty());
        assert_eq!(
            table.actions_for(FailureType::ApiTimeout),
            default_actions(FailureType::ApiTimeout).to_vec()
        );
    }
}
