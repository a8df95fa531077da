use std::sync::Arc;

use color_eyre::Result;
use tracing::{info, warn};

use crate::{
    identity::GuestSessions,
    remote::{AuthSession, NotesBackend, Scope},
    storage::LocalStorage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// There was no guest id, so no remote call was made.
    NothingToMigrate,
    /// Guest rows now belong to the account and the guest id is gone.
    Migrated(u64),
    /// The remote call failed. The guest id is kept so the next sign-in retries.
    Deferred(String),
}

impl MigrationOutcome {
    pub fn notice(&self) -> Option<String> {
        match self {
            MigrationOutcome::NothingToMigrate | MigrationOutcome::Migrated(0) => None,
            MigrationOutcome::Migrated(1) => Some("Moved 1 guest tasting note to your account".into()),
            MigrationOutcome::Migrated(count) => {
                Some(format!("Moved {count} guest tasting notes to your account"))
            }
            MigrationOutcome::Deferred(_) => Some(
                "Could not move your guest notes yet, we'll try again next time you sign in"
                    .into(),
            ),
        }
    }
}

/// Hands rows written as a guest over to a freshly signed-in account.
pub struct GuestDataMigration<B, S> {
    backend: Arc<B>,
    guests: Arc<GuestSessions<S>>,
}

impl<B: NotesBackend, S: LocalStorage> GuestDataMigration<B, S> {
    pub fn new(backend: Arc<B>, guests: Arc<GuestSessions<S>>) -> Self {
        Self { backend, guests }
    }

    /// Only local storage failures are returned as errors; remote failures become
    /// [MigrationOutcome::Deferred].
    pub async fn migrate(&self, session: &AuthSession) -> Result<MigrationOutcome> {
        let Some(guest) = self.guests.current() else {
            return Ok(MigrationOutcome::NothingToMigrate);
        };
        let scope = Scope::User(session.clone());
        match self
            .backend
            .migrate_guest_data(&scope, guest, session.user_id)
            .await
        {
            Ok(count) => {
                info!("Migrated {count} rows from guest {guest} to {}", session.user_id);
                self.guests.clear()?;
                Ok(MigrationOutcome::Migrated(count))
            }
            Err(err) => {
                warn!("Guest data migration for {guest} failed, keeping guest id: {err}");
                Ok(MigrationOutcome::Deferred(err.to_string()))
            }
        }
    }
}
