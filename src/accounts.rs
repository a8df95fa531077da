use std::sync::Arc;

use color_eyre::{Result, eyre::WrapErr};
use tracing::info;

use crate::{
    identity::Identity,
    migration::{GuestDataMigration, MigrationOutcome},
    remote::{AuthBackend, AuthSession, NotesBackend},
    storage::LocalStorage,
};

#[derive(Debug)]
pub struct SignedIn {
    pub session: AuthSession,
    pub migration: MigrationOutcome,
}

/// Sign-in and sign-up. Whatever was written as a guest is migrated before returning.
pub struct Accounts<B, S> {
    backend: Arc<B>,
    identity: Arc<Identity<S>>,
    migration: GuestDataMigration<B, S>,
}

impl<B, S> Accounts<B, S>
where
    B: NotesBackend + AuthBackend,
    S: LocalStorage,
{
    pub fn new(backend: Arc<B>, identity: Arc<Identity<S>>) -> Self {
        let migration = GuestDataMigration::new(backend.clone(), identity.guests.clone());
        Self {
            backend,
            identity,
            migration,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn> {
        let session = self
            .backend
            .sign_in(email, password)
            .await
            .wrap_err_with(|| format!("signing in as {email}"))?;
        self.complete(session).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn> {
        let session = self
            .backend
            .sign_up(email, password)
            .await
            .wrap_err_with(|| format!("signing up as {email}"))?;
        self.complete(session).await
    }

    pub fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.identity.auth.current() {
            info!("Signing out {}", session.email);
        }
        self.identity.auth.clear()
    }

    async fn complete(&self, session: AuthSession) -> Result<SignedIn> {
        self.identity.auth.store(session.clone())?;
        let migration = self.migration.migrate(&session).await?;
        Ok(SignedIn { session, migration })
    }
}
