//! Detection of unfinished dual rotations.

use rotor_types::{
    FailureKind, PartialState, Principal, PrincipalName, RotationRecord, RotationStep, RotationType,
};
use std::fmt;

/// What a leftover shadow principal means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Left by a cleanly aborted rotation; the original is intact and the
    /// next dual rotation replaces the shadow
    StaleShadow,
    /// Retirement stopped part-way; the rotation must be resumed
    Partial(PartialState),
}

impl fmt::Display for PendingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingState::StaleShadow => write!(f, "stale-shadow"),
            PendingState::Partial(state) => write!(f, "{}", state),
        }
    }
}

/// A shadow principal found in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRotation {
    /// Original principal name
    pub principal: PrincipalName,
    /// Shadow principal name
    pub shadow: PrincipalName,
    /// Whether the original principal exists
    pub original_exists: bool,
    /// Whether the shadow principal exists
    pub shadow_exists: bool,
    /// Classification
    pub state: PendingState,
}

impl PendingRotation {
    /// Whether the rotation must be resumed.
    pub fn needs_resume(&self) -> bool {
        matches!(self.state, PendingState::Partial(_))
    }
}

/// Whether a dual record settles if a retirement is outstanding.
///
/// Attempts that stopped before reading backend state (generation, session
/// or inspection failures, invalid names, nothing to resume) say nothing
/// about it. Any attempt that got past inspection found no partial
/// rotation, so its record clears the marker.
fn is_decisive(record: &RotationRecord) -> bool {
    match record.failure {
        None => true,
        Some(FailureKind::PartialRotation) | Some(FailureKind::ResumeRequired) => true,
        Some(_) => !matches!(
            record.step,
            None | Some(RotationStep::Generate) | Some(RotationStep::Inspect)
        ),
    }
}

/// The newest dual record that decides whether a rotation is partial.
///
/// `records` must be ordered newest first.
pub fn decisive_record<'a, I>(records: I) -> Option<&'a RotationRecord>
where
    I: IntoIterator<Item = &'a RotationRecord>,
{
    records
        .into_iter()
        .filter(|r| r.rotation_type == RotationType::Dual)
        .find(|r| is_decisive(r))
}

/// Whether the decisive dual record leaves a retirement outstanding.
fn left_partial(decisive: Option<&RotationRecord>) -> bool {
    decisive.map_or(false, |record| {
        matches!(
            record.failure,
            Some(FailureKind::PartialRotation) | Some(FailureKind::ResumeRequired)
        )
    })
}

/// Classify the backend state around a principal and its shadow.
///
/// `latest` is the principal's [`decisive_record`].
/// Returns `None` when no shadow exists.
///
/// The rotation is partial when the original is gone, when the original
/// holds no privileges while the shadow does, or when the last dual attempt
/// ended in a partial rotation that has not been resumed.
pub fn classify(
    original: Option<&Principal>,
    shadow: Option<&Principal>,
    latest: Option<&RotationRecord>,
) -> Option<PendingState> {
    let shadow = shadow?;

    let state = match original {
        None => PendingState::Partial(PartialState::OldDropped),
        Some(original) if original.is_revoked() && !shadow.is_revoked() => {
            PendingState::Partial(PartialState::OldRevoked)
        }
        Some(original) if left_partial(latest) => {
            if original.is_revoked() {
                PendingState::Partial(PartialState::OldRevoked)
            } else {
                PendingState::Partial(PartialState::RevokeIncomplete)
            }
        }
        Some(_) => PendingState::StaleShadow,
    };
    Some(state)
}
