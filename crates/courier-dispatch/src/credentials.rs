//! Shared identity/secret pair read by every request build.
//!
//! Writers always swap in a whole new [`Credentials`] value, so a reader sees
//! either the old pair or the new pair, never a mix.

use std::fmt;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identity and secret used for basic authentication.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The empty pair installed by logout.
    pub fn empty() -> Self {
        Self::new("", "")
    }

    /// Identity part of the pair.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret part of the pair.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns `true` if both halves are set.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// `Authorization` header value, if both halves are set.
    pub fn basic_auth(&self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Some(format!("Basic {token}"))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Holder of the current credentials shared across concurrent requests.
pub struct CredentialStore {
    current: RwLock<Arc<Credentials>>,
}

impl CredentialStore {
    /// Creates a store holding `initial`.
    pub fn new(initial: Credentials) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Returns the current pair.
    pub fn snapshot(&self) -> Arc<Credentials> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces both halves at once.
    pub fn replace(&self, next: Credentials) {
        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Installs the empty pair.
    pub fn clear(&self) {
        self.replace(Credentials::empty());
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(Credentials::empty())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.snapshot())
            .finish()
    }
}
