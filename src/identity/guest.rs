use std::sync::{Arc, Mutex};

use color_eyre::Result;
use tracing::{info, warn};

use crate::{remote::GuestSessionId, storage::LocalStorage};

pub const GUEST_SESSION_KEY: &str = "guest_session_id";

/// Anonymous identity used to tag writes before anyone has signed in.
///
/// This is the only place that reads or writes [GUEST_SESSION_KEY]. The id is created
/// lazily on the first write and dropped once its data has been migrated to an account.
pub struct GuestSessions<S> {
    storage: Arc<S>,
    current: Mutex<Option<GuestSessionId>>,
}

impl<S: LocalStorage> GuestSessions<S> {
    pub fn load(storage: Arc<S>) -> Result<Self> {
        let current = read_stored(storage.as_ref())?;
        Ok(Self {
            storage,
            current: Mutex::new(current),
        })
    }

    pub fn current(&self) -> Option<GuestSessionId> {
        *self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_guest(&self, authenticated: bool) -> bool {
        !authenticated && self.current().is_some()
    }

    pub fn get_or_create(&self) -> Result<GuestSessionId> {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = *current {
            return Ok(id);
        }
        let id = match read_stored(self.storage.as_ref())? {
            Some(id) => id,
            None => {
                let id = GuestSessionId::random();
                self.storage.set(GUEST_SESSION_KEY, &id.to_string())?;
                info!("Started guest session {id}");
                id
            }
        };
        *current = Some(id);
        Ok(id)
    }

    pub fn clear(&self) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.storage.remove(GUEST_SESSION_KEY)?;
        if let Some(id) = current.take() {
            info!("Cleared guest session {id}");
        }
        Ok(())
    }
}

fn read_stored<S: LocalStorage>(storage: &S) -> Result<Option<GuestSessionId>> {
    let Some(raw) = storage.get(GUEST_SESSION_KEY)? else {
        return Ok(None);
    };
    match raw.parse() {
        Ok(id) => Ok(Some(id)),
        Err(err) => {
            warn!("Ignoring corrupted guest session id {raw:?}: {err}");
            Ok(None)
        }
    }
}
