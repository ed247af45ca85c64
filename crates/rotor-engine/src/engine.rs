//! The rotation engine.
//!
//! Runs the single and dual rotation protocols against a credential store.
//! Every rotation attempt, whether it succeeds or fails, ends with exactly
//! one audit record. The engine does not lock principals; callers must not
//! rotate the same principal concurrently.

use crate::audit::AuditLog;
use crate::expiry::ExpiryTracker;
use crate::reconcile::{classify, decisive_record, PendingRotation, PendingState};
use crate::report::RotationReport;
use crate::state::{RotationControl, RotationState};
use rotor_core::time::{parse_duration, to_std};
use rotor_secrets::SecretGenerator;
use rotor_types::config::RotationSettings;
use rotor_types::{
    BackendError, BackendResult, CredentialSession, CredentialStore, FailureKind, Grant,
    HistoryOrder, PartialState, Principal, PrincipalName, Result, RotationError, RotationRecord,
    RotationStep, RotationType, Secret, StoreOp,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Engine settings, resolved from [`RotationSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Suffix forming the shadow principal name
    pub shadow_suffix: String,
    /// Verify single rotations by authenticating with the new secret
    pub verify_single: bool,
    /// Drop the shadow when a dual rotation aborts cleanly
    pub rollback_shadow_on_abort: bool,
    /// Default transition window
    pub transition_window: Duration,
    /// Default expiry TTL
    pub default_ttl: chrono::Duration,
    /// Default expiry scan horizon
    pub expiry_horizon: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shadow_suffix: "_new".to_string(),
            verify_single: true,
            rollback_shadow_on_abort: true,
            transition_window: Duration::from_secs(30),
            default_ttl: chrono::Duration::days(90),
            expiry_horizon: chrono::Duration::days(7),
        }
    }
}

impl EngineSettings {
    /// Resolve configured settings, parsing durations.
    pub fn from_settings(settings: &RotationSettings) -> Result<Self> {
        if settings.shadow_suffix.is_empty() {
            return Err(RotationError::Config("shadow_suffix must not be empty".to_string()));
        }

        Ok(Self {
            shadow_suffix: settings.shadow_suffix.clone(),
            verify_single: settings.verify_single,
            rollback_shadow_on_abort: settings.rollback_shadow_on_abort,
            transition_window: to_std(parse_duration(&settings.transition_window)?),
            default_ttl: parse_duration(&settings.default_ttl)?,
            expiry_horizon: parse_duration(&settings.expiry_horizon)?,
        })
    }
}

/// Bookkeeping for one rotation attempt.
struct Attempt<'a> {
    principal: &'a PrincipalName,
    rotation_type: RotationType,
    control: Option<&'a RotationControl>,
    states: Vec<RotationState>,
    secret: Option<Secret>,
    notes: Vec<String>,
}

impl<'a> Attempt<'a> {
    fn new(
        principal: &'a PrincipalName,
        rotation_type: RotationType,
        control: Option<&'a RotationControl>,
    ) -> Self {
        let mut attempt = Self {
            principal,
            rotation_type,
            control,
            states: Vec::new(),
            secret: None,
            notes: Vec::new(),
        };
        attempt.enter(RotationState::Start);
        attempt
    }

    fn enter(&mut self, state: RotationState) {
        info!(
            principal = %self.principal,
            rotation = %self.rotation_type,
            state = %state,
            "Rotation state"
        );
        self.states.push(state);
        if let Some(control) = self.control {
            control.publish(state);
        }
    }

    fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Set `secret` on `principal` again and check that it authenticates.
async fn reapply_secret(
    session: &mut dyn CredentialSession,
    principal: &PrincipalName,
    secret: &Secret,
) -> BackendResult<()> {
    session.alter_secret(principal, secret).await?;
    if session.test_authenticate(principal, secret).await? {
        Ok(())
    } else {
        Err(BackendError::new(
            StoreOp::Authenticate,
            format!("new secret does not authenticate as \"{}\" after rename", principal),
        ))
    }
}

fn inspect_err(e: BackendError) -> RotationError {
    RotationError::backend(RotationStep::Inspect, e)
}

/// Coordinates secret generation, the credential store, and the audit log.
pub struct RotationEngine {
    store: Arc<dyn CredentialStore>,
    generator: SecretGenerator,
    audit: AuditLog,
    expiry: ExpiryTracker,
    settings: EngineSettings,
}

impl RotationEngine {
    /// Create an engine with the default generator and settings.
    pub fn new(store: Arc<dyn CredentialStore>, audit: AuditLog, expiry: ExpiryTracker) -> Self {
        Self {
            store,
            generator: SecretGenerator::default(),
            audit,
            expiry,
            settings: EngineSettings::default(),
        }
    }

    /// Use a specific secret generator.
    pub fn with_generator(mut self, generator: SecretGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Use specific settings.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The expiry tracker.
    pub fn expiry(&self) -> &ExpiryTracker {
        &self.expiry
    }

    /// Backend type of the credential store.
    pub fn backend_type(&self) -> &'static str {
        self.store.backend_type()
    }

    /// Rotate a principal's secret in place, verifying per settings.
    pub async fn rotate_single(&self, principal: &PrincipalName) -> RotationReport {
        self.rotate_single_with(principal, self.settings.verify_single).await
    }

    /// Rotate a principal's secret in place.
    ///
    /// A failed verification is not rolled back: the new secret stays
    /// active and is returned in the report.
    pub async fn rotate_single_with(&self, principal: &PrincipalName, verify: bool) -> RotationReport {
        let mut attempt = Attempt::new(principal, RotationType::Single, None);
        let outcome = self.run_single(&mut attempt, verify).await;
        self.finish(attempt, outcome).await
    }

    /// Rotate through a shadow principal with the given transition window.
    pub async fn rotate_dual(&self, principal: &PrincipalName, window: Duration) -> RotationReport {
        let control = RotationControl::new();
        self.rotate_dual_with(principal, window, &control).await
    }

    /// Rotate through a shadow principal, observable and cancellable
    /// through `control`.
    pub async fn rotate_dual_with(
        &self,
        principal: &PrincipalName,
        window: Duration,
        control: &RotationControl,
    ) -> RotationReport {
        let mut attempt = Attempt::new(principal, RotationType::Dual, Some(control));
        let outcome = self.run_dual(&mut attempt, window, control).await;
        self.finish(attempt, outcome).await
    }

    /// Complete the retirement steps of an interrupted dual rotation.
    ///
    /// Uses the existing shadow; no new secret is generated, so the report
    /// carries none. The secret issued by the interrupted attempt becomes
    /// the principal's secret.
    pub async fn resume_dual(&self, principal: &PrincipalName) -> RotationReport {
        let mut attempt = Attempt::new(principal, RotationType::Dual, None);
        let outcome = self.run_resume(&mut attempt).await;
        self.finish(attempt, outcome).await
    }

    /// Find shadow principals left in the backend and classify them.
    pub async fn reconcile_scan(&self) -> Result<Vec<PendingRotation>> {
        let mut session = self.session(RotationStep::Inspect).await?;
        let names = session.list_principals().await.map_err(inspect_err)?;
        let history = self.dual_history().await;

        let mut pending = Vec::new();
        for name in &names {
            let Some(original_name) = name.shadow_of(&self.settings.shadow_suffix) else {
                continue;
            };

            let original = session.describe_principal(&original_name).await.map_err(inspect_err)?;
            let shadow = session.describe_principal(name).await.map_err(inspect_err)?;
            let latest = decisive_record(history.iter().filter(|r| r.principal == original_name.as_str()));

            if let Some(state) = classify(original.as_ref(), shadow.as_ref(), latest) {
                pending.push(PendingRotation {
                    principal: original_name,
                    shadow: name.clone(),
                    original_exists: original.is_some(),
                    shadow_exists: shadow.is_some(),
                    state,
                });
            }
        }

        info!(principals = names.len(), pending = pending.len(), "Reconciliation scan complete");
        Ok(pending)
    }

    /// Create (or replace) a principal with a fresh secret and the given grants.
    pub async fn provision(&self, principal: &PrincipalName, grants: &[Grant]) -> Result<Secret> {
        let secret = self.generator.generate()?;

        let mut session = self.session(RotationStep::Provision).await?;
        session
            .create_principal(principal, &secret, grants)
            .await
            .map_err(|e| RotationError::backend(RotationStep::Provision, e))?;

        info!(principal = %principal, grants = grants.len(), "Provisioned principal");
        Ok(secret)
    }

    async fn session(&self, step: RotationStep) -> Result<Box<dyn CredentialSession>> {
        self.store
            .session()
            .await
            .map_err(|e| RotationError::backend(step, e))
    }

    fn shadow_name(&self, principal: &PrincipalName) -> Result<PrincipalName> {
        principal.shadow(&self.settings.shadow_suffix)
    }

    /// Dual rotation records, newest first. Unreadable history is treated
    /// as empty so detection falls back to backend state.
    async fn dual_history(&self) -> Vec<RotationRecord> {
        match self.audit.history(HistoryOrder::Descending).await {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.rotation_type == RotationType::Dual)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Audit history unavailable; using backend state only");
                Vec::new()
            }
        }
    }

    /// The principal's newest dual record that decides partial state.
    async fn latest_dual_record(&self, principal: &PrincipalName) -> Option<RotationRecord> {
        match self.audit.history_for(principal.as_str(), HistoryOrder::Descending).await {
            Ok(records) => decisive_record(&records).cloned(),
            Err(e) => {
                warn!(principal = %principal, error = %e, "Audit history unavailable; using backend state only");
                None
            }
        }
    }

    async fn run_single(&self, attempt: &mut Attempt<'_>, verify: bool) -> Result<()> {
        let principal = attempt.principal;

        let secret = self.generator.generate()?;
        attempt.enter(RotationState::SecretGenerated);

        let mut session = self.session(RotationStep::Alter).await?;
        session
            .alter_secret(principal, &secret)
            .await
            .map_err(|e| RotationError::backend(RotationStep::Alter, e))?;
        attempt.secret = Some(secret.clone());
        attempt.enter(RotationState::SecretApplied);

        if !verify {
            attempt.note("secret rotated; verification skipped");
            return Ok(());
        }

        let accepted = session
            .test_authenticate(principal, &secret)
            .await
            .map_err(|e| RotationError::backend(RotationStep::Verify, e))?;
        if !accepted {
            attempt.note("new secret remains active; no automatic rollback");
            return Err(RotationError::VerificationFailed {
                principal: principal.to_string(),
            });
        }

        attempt.enter(RotationState::Verified);
        attempt.note("secret rotated and verified");
        Ok(())
    }

    async fn run_dual(
        &self,
        attempt: &mut Attempt<'_>,
        window: Duration,
        control: &RotationControl,
    ) -> Result<()> {
        let principal = attempt.principal;
        let shadow = self.shadow_name(principal)?;
        let secret = self.generator.generate()?;

        {
            let mut session = self.session(RotationStep::Inspect).await?;
            let original = self.inspect_for_dual(session.as_mut(), principal, &shadow).await?;
            session
                .create_principal(&shadow, &secret, &original.grants)
                .await
                .map_err(|e| RotationError::backend(RotationStep::CreateShadow, e))?;
            info!(
                principal = %principal,
                shadow = %shadow,
                grants = original.grants.len(),
                "Created shadow principal"
            );
        }
        attempt.secret = Some(secret.clone());
        attempt.enter(RotationState::ShadowCreated);

        attempt.enter(RotationState::TransitionOpen);
        if let Err(e) = self.hold_transition(principal, window, control).await {
            return Err(self.abort_dual(attempt, &shadow, e).await);
        }

        if let Err(e) = self.verify_shadow(&shadow, &secret).await {
            return Err(self.abort_dual(attempt, &shadow, e).await);
        }
        attempt.enter(RotationState::TransitionVerified);

        let mut session = match self.session(RotationStep::Revoke).await {
            Ok(session) => session,
            Err(e) => return Err(self.abort_dual(attempt, &shadow, e).await),
        };
        self.retire(attempt, session.as_mut(), &shadow, PartialState::RevokeIncomplete)
            .await?;

        attempt.note(format!(
            "rotated through shadow {}; transition window {}s",
            shadow,
            window.as_secs()
        ));
        Ok(())
    }

    /// Read the original principal and refuse to start over an
    /// unfinished rotation.
    async fn inspect_for_dual(
        &self,
        session: &mut dyn CredentialSession,
        principal: &PrincipalName,
        shadow: &PrincipalName,
    ) -> Result<Principal> {
        let original = session.describe_principal(principal).await.map_err(inspect_err)?;
        let existing_shadow = session.describe_principal(shadow).await.map_err(inspect_err)?;
        let latest = self.latest_dual_record(principal).await;

        match classify(original.as_ref(), existing_shadow.as_ref(), latest.as_ref()) {
            Some(PendingState::Partial(state)) => {
                return Err(RotationError::ResumeRequired {
                    principal: principal.to_string(),
                    state,
                });
            }
            Some(PendingState::StaleShadow) => {
                warn!(shadow = %shadow, "Replacing stale shadow principal");
            }
            None => {}
        }

        original.ok_or_else(|| {
            inspect_err(BackendError::new(
                StoreOp::Describe,
                format!("principal \"{}\" does not exist", principal),
            ))
        })
    }

    async fn hold_transition(
        &self,
        principal: &PrincipalName,
        window: Duration,
        control: &RotationControl,
    ) -> Result<()> {
        info!(
            principal = %principal,
            window_secs = window.as_secs(),
            "Transition window open; old and new credentials are both valid"
        );

        tokio::select! {
            biased;
            _ = control.cancelled() => Err(RotationError::Cancelled {
                principal: principal.to_string(),
            }),
            _ = tokio::time::sleep(window) => Ok(()),
        }
    }

    async fn verify_shadow(&self, shadow: &PrincipalName, secret: &Secret) -> Result<()> {
        let mut session = self.session(RotationStep::Verify).await?;
        let accepted = session
            .test_authenticate(shadow, secret)
            .await
            .map_err(|e| RotationError::backend(RotationStep::Verify, e))?;
        if !accepted {
            return Err(RotationError::VerificationFailed {
                principal: shadow.to_string(),
            });
        }

        warn!(
            shadow = %shadow,
            "Connections still using the old credential cannot be enumerated; \
             the transition window is the only drain guarantee"
        );
        Ok(())
    }

    /// Clean abort: the original principal is untouched. Drops the shadow
    /// when configured to.
    async fn abort_dual(
        &self,
        attempt: &mut Attempt<'_>,
        shadow: &PrincipalName,
        cause: RotationError,
    ) -> RotationError {
        attempt.secret = None;

        if !self.settings.rollback_shadow_on_abort {
            warn!(shadow = %shadow, error = %cause, "Dual rotation aborted; shadow left in place");
            attempt.note(format!("shadow {} left in place", shadow));
            return cause;
        }

        match self.drop_shadow(shadow).await {
            Ok(()) => {
                warn!(shadow = %shadow, error = %cause, "Dual rotation aborted; shadow dropped");
                attempt.note(format!("shadow {} dropped", shadow));
            }
            Err(e) => {
                warn!(shadow = %shadow, error = %e, "Shadow rollback failed");
                attempt.note(format!("shadow rollback failed: {}", e));
            }
        }
        cause
    }

    async fn drop_shadow(&self, shadow: &PrincipalName) -> BackendResult<()> {
        let mut session = self.store.session().await?;
        session.drop_principal(shadow).await
    }

    /// Revoke, drop and rename, starting from `from`, then make sure the
    /// original name authenticates with the issued secret.
    ///
    /// Any failure here leaves the backend between principals and is
    /// reported as a partial rotation naming the state reached.
    async fn retire(
        &self,
        attempt: &mut Attempt<'_>,
        session: &mut dyn CredentialSession,
        shadow: &PrincipalName,
        from: PartialState,
    ) -> Result<()> {
        let principal = attempt.principal;
        let partial = |step: RotationStep, state: PartialState, cause: BackendError| {
            RotationError::PartialRotation {
                step,
                principal: principal.to_string(),
                shadow: shadow.to_string(),
                state,
                message: cause.to_string(),
            }
        };

        if from <= PartialState::RevokeIncomplete {
            session
                .revoke_all(principal)
                .await
                .map_err(|e| partial(RotationStep::Revoke, PartialState::RevokeIncomplete, e))?;
            attempt.enter(RotationState::OldRevoked);
        }

        if from <= PartialState::OldRevoked {
            session
                .drop_principal(principal)
                .await
                .map_err(|e| partial(RotationStep::Drop, PartialState::OldRevoked, e))?;
            attempt.enter(RotationState::OldDropped);
        }

        if from <= PartialState::OldDropped {
            session
                .rename_principal(shadow, principal)
                .await
                .map_err(|e| partial(RotationStep::Rename, PartialState::OldDropped, e))?;
        }

        // Renaming clears MD5 password hashes; SCRAM hashes survive it.
        match attempt.secret.clone() {
            Some(secret) => {
                reapply_secret(session, principal, &secret)
                    .await
                    .map_err(|e| partial(RotationStep::Rename, PartialState::Renamed, e))?;
            }
            None => warn!(
                principal = %principal,
                "Issued secret unknown; backends that clear password hashes on rename need a single rotation"
            ),
        }
        attempt.enter(RotationState::OldRetired);
        Ok(())
    }

    async fn run_resume(&self, attempt: &mut Attempt<'_>) -> Result<()> {
        let principal = attempt.principal;
        let shadow = self.shadow_name(principal)?;

        let mut session = self.session(RotationStep::Inspect).await?;
        let original = session.describe_principal(principal).await.map_err(inspect_err)?;
        let existing_shadow = session.describe_principal(&shadow).await.map_err(inspect_err)?;
        let latest = self.latest_dual_record(principal).await;

        let state = match classify(original.as_ref(), existing_shadow.as_ref(), latest.as_ref()) {
            Some(PendingState::Partial(state)) => state,
            _ => {
                return Err(RotationError::NothingToResume {
                    principal: principal.to_string(),
                })
            }
        };

        info!(principal = %principal, shadow = %shadow, state = %state, "Resuming dual rotation");
        attempt.note(format!("resumed from {}", state));
        self.retire(attempt, session.as_mut(), &shadow, state).await?;
        attempt.note("secret issued by the interrupted rotation is now in effect");
        Ok(())
    }

    async fn finish(&self, mut attempt: Attempt<'_>, outcome: Result<()>) -> RotationReport {
        let notes = attempt.notes.join("; ");
        let record = match &outcome {
            Ok(()) => {
                info!(
                    principal = %attempt.principal,
                    rotation = %attempt.rotation_type,
                    "Rotation succeeded"
                );
                RotationRecord::success(attempt.principal, attempt.rotation_type, notes)
            }
            Err(e) => {
                error!(
                    principal = %attempt.principal,
                    rotation = %attempt.rotation_type,
                    error = %e,
                    "Rotation failed"
                );
                let note = if notes.is_empty() {
                    e.to_string()
                } else {
                    format!("{}; {}", e, notes)
                };
                RotationRecord::failed(
                    attempt.principal,
                    attempt.rotation_type,
                    FailureKind::of(e),
                    e.step(),
                    note,
                )
            }
        };

        attempt.enter(RotationState::Recorded(record.outcome));
        let audit = self.audit.record(&record).await;

        RotationReport {
            record,
            outcome,
            audit,
            states: attempt.states,
            secret: attempt.secret,
        }
    }
}
