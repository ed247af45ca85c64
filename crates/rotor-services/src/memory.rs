//! In-memory credential store.
//!
//! Keeps principals in a shared map and supports injecting failures into
//! individual operations, either before the operation takes effect or
//! after it has been applied. The rotation scenarios in the engine's test
//! suite are built on it.

use async_trait::async_trait;
use parking_lot::Mutex;
use rotor_types::{
    BackendError, BackendResult, CredentialSession, CredentialStore, Grant, Principal,
    PrincipalName, Secret, StoreOp,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// When an injected fault fires relative to the operation it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Fail without applying the operation
    Before,
    /// Apply the operation, then report failure
    After,
}

#[derive(Debug)]
struct Fault {
    operation: StoreOp,
    mode: FaultMode,
    remaining: u32,
}

#[derive(Debug, Clone)]
struct StoredPrincipal {
    secret: Secret,
    grants: Vec<Grant>,
}

#[derive(Debug, Default)]
struct State {
    principals: BTreeMap<PrincipalName, StoredPrincipal>,
    faults: Vec<Fault>,
    refuse_logins: bool,
    rename_clears_secret: bool,
}

impl State {
    /// Consume one firing of the first armed fault for `operation`.
    fn take_fault(&mut self, operation: StoreOp) -> Option<FaultMode> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.operation == operation && f.remaining > 0)?;
        fault.remaining -= 1;
        let mode = fault.mode;
        self.faults.retain(|f| f.remaining > 0);
        Some(mode)
    }
}

fn injected(operation: StoreOp) -> BackendError {
    BackendError::new(operation, "injected fault")
}

/// Credential store held entirely in process memory.
///
/// Clones share the same principals, faults, and session counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
    sessions_opened: Arc<AtomicUsize>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a principal.
    pub fn insert_principal(&self, name: &PrincipalName, secret: &str, grants: Vec<Grant>) {
        self.state.lock().principals.insert(
            name.clone(),
            StoredPrincipal {
                secret: Secret::new(secret),
                grants,
            },
        );
    }

    /// Builder form of [`insert_principal`](Self::insert_principal).
    pub fn with_principal(self, name: &PrincipalName, secret: &str, grants: Vec<Grant>) -> Self {
        self.insert_principal(name, secret, grants);
        self
    }

    /// Make the next `times` calls of `operation` fail.
    pub fn fail_on(&self, operation: StoreOp, mode: FaultMode, times: u32) {
        if times == 0 {
            return;
        }
        self.state.lock().faults.push(Fault {
            operation,
            mode,
            remaining: times,
        });
    }

    /// Reject every authentication attempt, as a backend whose login
    /// policy excludes the principals would.
    pub fn refuse_logins(&self, refuse: bool) {
        self.state.lock().refuse_logins = refuse;
    }

    /// Clear a principal's secret when it is renamed, as PostgreSQL does
    /// for MD5 password hashes.
    pub fn rename_clears_secret(&self, clears: bool) {
        self.state.lock().rename_clears_secret = clears;
    }

    /// Disarm every pending fault.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Sessions currently held by callers.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions handed out since the store was created.
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Snapshot of a principal, if present.
    pub fn principal(&self, name: &str) -> Option<Principal> {
        let state = self.state.lock();
        state
            .principals
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(n, p)| Principal {
                name: n.clone(),
                grants: p.grants.clone(),
            })
    }

    /// Names of every principal, sorted.
    pub fn principal_names(&self) -> Vec<String> {
        self.state
            .lock()
            .principals
            .keys()
            .map(|n| n.to_string())
            .collect()
    }

    /// Whether `secret` is the current secret of `name`.
    ///
    /// Ignores injected faults.
    pub fn authenticates(&self, name: &str, secret: &str) -> bool {
        self.state
            .lock()
            .principals
            .iter()
            .any(|(n, p)| n.as_str() == name && p.secret.expose() == secret)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn session(&self) -> BackendResult<Box<dyn CredentialSession>> {
        if self.state.lock().take_fault(StoreOp::Session).is_some() {
            return Err(injected(StoreOp::Session));
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        debug!(open = self.open_sessions(), "Opened memory session");

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

/// Session on a [`MemoryCredentialStore`].
pub struct MemorySession {
    state: Arc<Mutex<State>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemorySession {
    /// Run `apply` against the state, honouring any fault armed for `operation`.
    fn run<T>(
        &self,
        operation: StoreOp,
        apply: impl FnOnce(&mut State) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut state = self.state.lock();
        match state.take_fault(operation) {
            Some(FaultMode::Before) => Err(injected(operation)),
            Some(FaultMode::After) => {
                apply(&mut state)?;
                Err(injected(operation))
            }
            None => apply(&mut state),
        }
    }
}

fn missing(operation: StoreOp, name: &PrincipalName) -> BackendError {
    BackendError::new(operation, format!("principal \"{}\" does not exist", name))
}

#[async_trait]
impl CredentialSession for MemorySession {
    async fn describe_principal(&mut self, name: &PrincipalName) -> BackendResult<Option<Principal>> {
        self.run(StoreOp::Describe, |state| {
            Ok(state.principals.get(name).map(|p| Principal {
                name: name.clone(),
                grants: p.grants.clone(),
            }))
        })
    }

    async fn list_principals(&mut self) -> BackendResult<Vec<PrincipalName>> {
        self.run(StoreOp::List, |state| Ok(state.principals.keys().cloned().collect()))
    }

    async fn create_principal(
        &mut self,
        name: &PrincipalName,
        secret: &Secret,
        grants: &[Grant],
    ) -> BackendResult<()> {
        self.run(StoreOp::Create, |state| {
            state.principals.insert(
                name.clone(),
                StoredPrincipal {
                    secret: secret.clone(),
                    grants: grants.to_vec(),
                },
            );
            Ok(())
        })
    }

    async fn alter_secret(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<()> {
        self.run(StoreOp::Alter, |state| {
            let principal = state
                .principals
                .get_mut(name)
                .ok_or_else(|| missing(StoreOp::Alter, name))?;
            principal.secret = secret.clone();
            Ok(())
        })
    }

    async fn drop_principal(&mut self, name: &PrincipalName) -> BackendResult<()> {
        self.run(StoreOp::Drop, |state| {
            state.principals.remove(name);
            Ok(())
        })
    }

    async fn rename_principal(&mut self, from: &PrincipalName, to: &PrincipalName) -> BackendResult<()> {
        self.run(StoreOp::Rename, |state| {
            if state.principals.contains_key(to) {
                return Err(BackendError::new(
                    StoreOp::Rename,
                    format!("principal \"{}\" already exists", to),
                ));
            }
            let mut principal = state
                .principals
                .remove(from)
                .ok_or_else(|| missing(StoreOp::Rename, from))?;
            if state.rename_clears_secret {
                principal.secret = Secret::new("");
            }
            state.principals.insert(to.clone(), principal);
            Ok(())
        })
    }

    async fn revoke_all(&mut self, name: &PrincipalName) -> BackendResult<()> {
        self.run(StoreOp::RevokeAll, |state| {
            let principal = state
                .principals
                .get_mut(name)
                .ok_or_else(|| missing(StoreOp::RevokeAll, name))?;
            principal.grants.clear();
            Ok(())
        })
    }

    async fn test_authenticate(&mut self, name: &PrincipalName, secret: &Secret) -> BackendResult<bool> {
        self.run(StoreOp::Authenticate, |state| {
            if state.refuse_logins {
                return Ok(false);
            }
            Ok(state
                .principals
                .get(name)
                .map(|p| p.secret == *secret)
                .unwrap_or(false))
        })
    }
}
