use std::sync::{Arc, RwLock};

use color_eyre::{Result, eyre::WrapErr};
use tracing::{info, warn};

mod guest;
pub use guest::*;

use crate::{
    remote::{AuthSession, Scope},
    storage::LocalStorage,
};

pub const AUTH_SESSION_KEY: &str = "auth_session";

/// The signed-in account, if any, mirrored into local storage.
pub struct AuthState<S> {
    storage: Arc<S>,
    current: RwLock<Option<AuthSession>>,
}

impl<S: LocalStorage> AuthState<S> {
    pub fn load(storage: Arc<S>) -> Result<Self> {
        let current = match storage.get(AUTH_SESSION_KEY)? {
            None => None,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!("Discarding unreadable stored session: {err}");
                    None
                }
            },
        };
        Ok(Self {
            storage,
            current: RwLock::new(current),
        })
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn store(&self, session: AuthSession) -> Result<()> {
        let raw = serde_json::to_string(&session).wrap_err("serializing session")?;
        self.storage.set(AUTH_SESSION_KEY, &raw)?;
        info!("Signed in as {} ({})", session.email, session.user_id);
        *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(session);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(AUTH_SESSION_KEY)?;
        *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

/// Resolves which identity reads and writes happen under.
pub struct Identity<S> {
    pub auth: AuthState<S>,
    pub guests: Arc<GuestSessions<S>>,
}

impl<S: LocalStorage> Identity<S> {
    pub fn load(storage: Arc<S>) -> Result<Self> {
        Ok(Self {
            auth: AuthState::load(storage.clone())?,
            guests: Arc::new(GuestSessions::load(storage)?),
        })
    }

    /// Account if signed in, else an already existing guest id. Never creates a guest id.
    pub fn read_scope(&self) -> Scope {
        if let Some(session) = self.auth.current() {
            return Scope::User(session);
        }
        match self.guests.current() {
            Some(id) => Scope::Guest(id),
            None => Scope::Anonymous,
        }
    }

    /// Account if signed in, else the guest id, creating it on first use.
    pub fn write_scope(&self) -> Result<Scope> {
        if let Some(session) = self.auth.current() {
            return Ok(Scope::User(session));
        }
        Ok(Scope::Guest(self.guests.get_or_create()?))
    }

    pub fn is_guest(&self) -> bool {
        self.guests.is_guest(self.auth.current().is_some())
    }
}
