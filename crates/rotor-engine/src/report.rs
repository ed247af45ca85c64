//! Result of one rotation attempt.

use crate::state::RotationState;
use rotor_types::{RotationError, RotationRecord, Secret};

/// Everything the caller learns from a rotation attempt.
///
/// The rotation outcome and the audit outcome are reported separately: a
/// rotation that succeeded stays successful even if its record could not
/// be written.
#[derive(Debug)]
pub struct RotationReport {
    /// Audit record describing the attempt
    pub record: RotationRecord,
    /// Rotation outcome
    pub outcome: Result<(), RotationError>,
    /// Outcome of writing `record` to the audit log
    pub audit: Result<(), RotationError>,
    /// States entered, in order
    pub states: Vec<RotationState>,
    /// New secret, when it is in effect for the principal or its shadow
    pub secret: Option<Secret>,
}

impl RotationReport {
    /// Whether the rotation succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The rotation error, if any.
    pub fn error(&self) -> Option<&RotationError> {
        self.outcome.as_ref().err()
    }

    /// The audit error, if any.
    pub fn audit_error(&self) -> Option<&RotationError> {
        self.audit.as_ref().err()
    }

    /// Last state entered.
    pub fn final_state(&self) -> Option<RotationState> {
        self.states.last().copied()
    }

    /// Whether the attempt passed through `state`.
    pub fn visited(&self, state: RotationState) -> bool {
        self.states.contains(&state)
    }
}
