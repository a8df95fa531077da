use std::future::Future;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, instrument};

pub mod model;
#[cfg(test)]
pub mod fake;

pub use model::*;

use crate::config::BackendConfig;

const GUEST_HEADER: &str = "x-guest-session-id";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("not signed in or not allowed: {0}")]
    Unauthorized(String),
    #[error("conflicting row already exists: {0}")]
    Conflict(String),
    #[error("nothing found at {0}")]
    NotFound(String),
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote surface for tasting notes. Every call carries the [Scope] it is made under,
/// so the backend's access rules can tell guests, users and anonymous readers apart.
pub trait NotesBackend: Send + Sync + 'static {
    /// Looks up the note of the scope's owner for a whisky. Anonymous scopes never have one.
    fn find_note(
        &self,
        scope: &Scope,
        whisky_id: WhiskyId,
    ) -> impl Future<Output = RemoteResult<Option<TastingNote>>> + Send;

    fn insert_note(
        &self,
        scope: &Scope,
        row: &NoteRow<'_>,
    ) -> impl Future<Output = RemoteResult<TastingNote>> + Send;

    fn update_note(
        &self,
        scope: &Scope,
        id: NoteId,
        row: &NoteRow<'_>,
    ) -> impl Future<Output = RemoteResult<TastingNote>> + Send;

    fn delete_note(&self, scope: &Scope, id: NoteId) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Reassigns every row tagged with `guest` to `user`, returning how many moved.
    fn migrate_guest_data(
        &self,
        scope: &Scope,
        guest: GuestSessionId,
        user: UserId,
    ) -> impl Future<Output = RemoteResult<u64>> + Send;

    fn list_whiskies(&self, scope: &Scope) -> impl Future<Output = RemoteResult<Vec<Whisky>>> + Send;
}

pub trait AuthBackend: Send + Sync + 'static {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = RemoteResult<AuthSession>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = RemoteResult<AuthSession>> + Send;
}

trait WithScope {
    fn with_scope(self, anon_key: &str, scope: &Scope) -> Self;
}

impl WithScope for RequestBuilder {
    fn with_scope(self, anon_key: &str, scope: &Scope) -> Self {
        let req = self.header("apikey", anon_key);
        match scope {
            Scope::Anonymous => req.bearer_auth(anon_key),
            Scope::Guest(id) => req.bearer_auth(anon_key).header(GUEST_HEADER, id.to_string()),
            Scope::User(session) => req.bearer_auth(&session.access_token),
        }
    }
}

/// Client for the hosted backend, speaking its REST and auth endpoints.
pub struct RestBackend {
    client: reqwest::Client,
    url: String,
    anon_key: String,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        }
    }

    fn rest(&self, method: Method, path: &str, scope: &Scope) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{path}", self.url))
            .with_scope(&self.anon_key, scope)
    }

    fn auth(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/auth/v1/{path}", self.url))
            .header("apikey", &self.anon_key)
    }

    async fn single_row(req: RequestBuilder, what: &str) -> RemoteResult<TastingNote> {
        let rows: Vec<TastingNote> = read_json(req.send().await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(what.to_string()))
    }
}

impl NotesBackend for RestBackend {
    #[instrument(skip(self))]
    async fn find_note(&self, scope: &Scope, whisky_id: WhiskyId) -> RemoteResult<Option<TastingNote>> {
        let Some(owner) = scope.owner() else {
            return Ok(None);
        };
        let (column, filter) = owner.filter();
        let req = self
            .rest(Method::GET, "tasting_notes", scope)
            .query(&[
                ("select", "*".to_string()),
                ("whisky_id", format!("eq.{whisky_id}")),
                (column, filter),
            ])
            .query(&[("limit", "1")]);
        let rows: Vec<TastingNote> = read_json(req.send().await?).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, row))]
    async fn insert_note(&self, scope: &Scope, row: &NoteRow<'_>) -> RemoteResult<TastingNote> {
        let req = self
            .rest(Method::POST, "tasting_notes", scope)
            .header("Prefer", "return=representation")
            .json(row);
        Self::single_row(req, "inserted tasting note").await
    }

    #[instrument(skip(self, row))]
    async fn update_note(&self, scope: &Scope, id: NoteId, row: &NoteRow<'_>) -> RemoteResult<TastingNote> {
        let req = self
            .rest(Method::PATCH, "tasting_notes", scope)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(row);
        Self::single_row(req, &format!("tasting note {id}")).await
    }

    #[instrument(skip(self))]
    async fn delete_note(&self, scope: &Scope, id: NoteId) -> RemoteResult<()> {
        let req = self
            .rest(Method::DELETE, "tasting_notes", scope)
            .query(&[("id", format!("eq.{id}"))]);
        check_status(req.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn migrate_guest_data(
        &self,
        scope: &Scope,
        guest: GuestSessionId,
        user: UserId,
    ) -> RemoteResult<u64> {
        let req = self
            .rest(Method::POST, "rpc/migrate_guest_data", scope)
            .json(&json!({
                "p_guest_session_id": guest,
                "p_user_id": user,
            }));
        read_json(req.send().await?).await
    }

    #[instrument(skip(self))]
    async fn list_whiskies(&self, scope: &Scope) -> RemoteResult<Vec<Whisky>> {
        let req = self
            .rest(Method::GET, "whiskies", scope)
            .query(&[("select", "id,name,distillery,flavor_profile")]);
        read_json(req.send().await?).await
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: UserId,
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self, email: &str) -> RemoteResult<AuthSession> {
        let Some(access_token) = self.access_token else {
            return Err(RemoteError::Unauthorized(format!(
                "account {email} created, confirm the email address before signing in"
            )));
        };
        Ok(AuthSession {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_else(|| email.to_string()),
            access_token,
        })
    }
}

impl AuthBackend for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<AuthSession> {
        debug!("Signing in {email}");
        let req = self
            .auth("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let response: TokenResponse = read_json(req.send().await?).await?;
        response.into_session(email)
    }

    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<AuthSession> {
        debug!("Signing up {email}");
        let req = self
            .auth("signup")
            .json(&json!({ "email": email, "password": password }));
        let response: TokenResponse = read_json(req.send().await?).await?;
        response.into_session(email)
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body
        .message
        .or(body.msg)
        .or(body.error_description)
        .unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(url),
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        _ if body.code.as_deref() == Some(UNIQUE_VIOLATION) => RemoteError::Conflict(message),
        _ => RemoteError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    Ok(check_status(response).await?.json().await?)
}
