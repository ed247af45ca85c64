//! Rotation states and the handle callers use to observe or cancel a
//! running rotation.

use rotor_types::Outcome;
use std::fmt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A state of the single or dual rotation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationState {
    /// Nothing done yet
    Start,
    /// New secret generated (single)
    SecretGenerated,
    /// New secret active on the principal (single)
    SecretApplied,
    /// New secret authenticated (single)
    Verified,
    /// Shadow principal created with the new secret (dual)
    ShadowCreated,
    /// Old and new credentials both valid (dual)
    TransitionOpen,
    /// New secret authenticated through the shadow (dual)
    TransitionVerified,
    /// Old principal's privileges revoked (dual)
    OldRevoked,
    /// Old principal dropped (dual)
    OldDropped,
    /// Shadow renamed to the original name (dual)
    OldRetired,
    /// Outcome written to the audit log
    Recorded(Outcome),
}

impl RotationState {
    /// Whether the protocol has concluded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RotationState::Recorded(_))
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationState::Start => write!(f, "start"),
            RotationState::SecretGenerated => write!(f, "secret-generated"),
            RotationState::SecretApplied => write!(f, "secret-applied"),
            RotationState::Verified => write!(f, "verified"),
            RotationState::ShadowCreated => write!(f, "shadow-created"),
            RotationState::TransitionOpen => write!(f, "transition-open"),
            RotationState::TransitionVerified => write!(f, "transition-verified"),
            RotationState::OldRevoked => write!(f, "old-revoked"),
            RotationState::OldDropped => write!(f, "old-dropped"),
            RotationState::OldRetired => write!(f, "old-retired"),
            RotationState::Recorded(outcome) => write!(f, "recorded({})", outcome),
        }
    }
}

/// Observation and cancellation handle for one rotation.
///
/// The engine publishes every state it enters; callers may poll
/// [`state`](Self::state) or await changes through [`subscribe`](Self::subscribe).
/// Cancelling only has an effect while the transition window is open.
#[derive(Debug)]
pub struct RotationControl {
    cancel: CancellationToken,
    state: watch::Sender<RotationState>,
}

impl Default for RotationControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationControl {
    /// Create a handle in the `Start` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(RotationState::Start);
        Self {
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Create a handle cancelled through an existing token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::new()
        }
    }

    /// Request cancellation of the transition window.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this rotation.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The most recently entered state.
    pub fn state(&self) -> RotationState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RotationState> {
        self.state.subscribe()
    }

    pub(crate) fn publish(&self, state: RotationState) {
        self.state.send_replace(state);
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
