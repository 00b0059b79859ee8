//! Client synchronization modes

use thiserror::Error;

/// How the client combines local prediction with server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No server; inputs are only applied locally
    Offline,
    /// Position comes from the server alone
    Authoritative,
    /// Local prediction; pending inputs are dropped on every update
    Predicted,
    /// Local prediction corrected by replaying unacknowledged inputs
    #[default]
    Reconciled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncModeError {
    #[error("Reconciliation requires client-side prediction")]
    ReconciliationWithoutPrediction,

    #[error("Reconciliation requires server-side processing")]
    ReconciliationWithoutServer,

    #[error("Without a server, client-side prediction is the only source of movement")]
    OfflineWithoutPrediction,
}

impl SyncMode {
    /// Build a mode from the three legacy toggles, rejecting combinations
    /// that have no meaning.
    pub fn from_flags(
        prediction: bool,
        reconciliation: bool,
        server_processing: bool,
    ) -> Result<Self, SyncModeError> {
        match (prediction, reconciliation, server_processing) {
            (false, true, _) => Err(SyncModeError::ReconciliationWithoutPrediction),
            (true, true, false) => Err(SyncModeError::ReconciliationWithoutServer),
            (false, false, false) => Err(SyncModeError::OfflineWithoutPrediction),
            (true, false, false) => Ok(SyncMode::Offline),
            (false, false, true) => Ok(SyncMode::Authoritative),
            (true, false, true) => Ok(SyncMode::Predicted),
            (true, true, true) => Ok(SyncMode::Reconciled),
        }
    }

    pub fn predicts(self) -> bool {
        !matches!(self, SyncMode::Authoritative)
    }

    pub fn reconciles(self) -> bool {
        matches!(self, SyncMode::Reconciled)
    }

    pub fn uses_server(self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_flag_combinations() {
        assert_eq!(SyncMode::from_flags(true, false, false), Ok(SyncMode::Offline));
        assert_eq!(SyncMode::from_flags(false, false, true), Ok(SyncMode::Authoritative));
        assert_eq!(SyncMode::from_flags(true, false, true), Ok(SyncMode::Predicted));
        assert_eq!(SyncMode::from_flags(true, true, true), Ok(SyncMode::Reconciled));
    }

    #[test]
    fn test_invalid_flag_combinations() {
        assert_eq!(
            SyncMode::from_flags(false, true, true),
            Err(SyncModeError::ReconciliationWithoutPrediction)
        );
        assert_eq!(
            SyncMode::from_flags(false, true, false),
            Err(SyncModeError::ReconciliationWithoutPrediction)
        );
        assert_eq!(
            SyncMode::from_flags(true, true, false),
            Err(SyncModeError::ReconciliationWithoutServer)
        );
        assert_eq!(
            SyncMode::from_flags(false, false, false),
            Err(SyncModeError::OfflineWithoutPrediction)
        );
    }

    #[test]
    fn test_mode_capabilities() {
        assert!(SyncMode::Offline.predicts() && !SyncMode::Offline.uses_server());
        assert!(!SyncMode::Authoritative.predicts());
        assert!(SyncMode::Predicted.predicts() && !SyncMode::Predicted.reconciles());
        assert!(SyncMode::Reconciled.reconciles() && SyncMode::Reconciled.uses_server());
    }
}
