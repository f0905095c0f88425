//! Registration gate: a global barrier around credential replacement.
//!
//! While a registration is outstanding, authenticated requests that are not
//! part of the registration flow wait for it to finish before they dispatch.
//! Only one registration may be outstanding at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use crate::error::{DispatchError, Result};

/// Token ids are unique across every gate in the process.
static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Proof of an outstanding registration; required to finish it.
#[derive(Debug)]
pub struct RegistrationToken {
    id: u64,
    done: watch::Receiver<bool>,
}

impl RegistrationToken {
    /// Identifier of this registration.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the registration has been finished.
    pub async fn completed(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

struct Active {
    id: u64,
    done: watch::Sender<bool>,
}

/// Gate state: idle, or transitioning with one outstanding token.
pub struct RegistrationGate {
    active: Mutex<Option<Active>>,
}

impl RegistrationGate {
    /// Creates an idle gate.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Enters the transitioning state.
    ///
    /// Fails with [`DispatchError::GateMisuse`] if a registration is already
    /// outstanding; the outstanding one is left untouched.
    pub fn start(&self) -> Result<RegistrationToken> {
        let mut active = self.lock()?;
        if active.is_some() {
            return Err(DispatchError::GateMisuse("registration already in progress"));
        }
        let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(false);
        *active = Some(Active { id, done: tx });
        info!("Registration {} started", id);
        Ok(RegistrationToken { id, done: rx })
    }

    /// Returns to idle and releases every waiter.
    ///
    /// Fails if idle or if `token` is not the outstanding one.
    pub fn finish(&self, token: &RegistrationToken) -> Result<()> {
        let mut active = self.lock()?;
        match active.as_ref() {
            None => Err(DispatchError::GateMisuse("no active registration")),
            Some(current) if current.id != token.id => {
                Err(DispatchError::GateMisuse("invalid registration token"))
            }
            Some(_) => {
                if let Some(current) = active.take() {
                    info!("Registration {} finished", current.id);
                    let _ = current.done.send(true);
                }
                Ok(())
            }
        }
    }

    /// Returns `true` while a registration is outstanding.
    pub fn is_active(&self) -> bool {
        self.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Waits until the gate is idle.
    ///
    /// Returns how long the caller was blocked, or `None` if it was not.
    pub async fn wait_idle(&self) -> Result<Option<Duration>> {
        let mut blocked_since: Option<Instant> = None;
        loop {
            let waiter = self.lock()?.as_ref().map(|a| a.done.subscribe());
            match waiter {
                None => return Ok(blocked_since.map(|start| start.elapsed())),
                Some(mut done) => {
                    if blocked_since.is_none() {
                        info!("Request blocked by active registration");
                        blocked_since = Some(Instant::now());
                    }
                    let _ = done.wait_for(|finished| *finished).await;
                }
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Active>>> {
        self.active
            .lock()
            .map_err(|_| DispatchError::GateMisuse("registration gate lock poisoned"))
    }
}

impl Default for RegistrationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistrationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationGate")
            .field("active", &self.is_active())
            .finish()
    }
}
