//! Explicit session context: populated on sign-in, cleared on sign-out,
//! re-validated whenever the ID token is refreshed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::IdentityClient;
use crate::models::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Claims the client reads from the provider's ID token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub exp: i64,
}

// The backend verifies signatures; here we only need to read the claims.
fn decode_claims(token: &str) -> AppResult<IdTokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|err| {
            debug!(error = %err, "unreadable id token");
            AppError::AuthenticationRequired
        })
}

#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
    claims: IdTokenClaims,
}

impl Session {
    /// A session is usable only with an unexpired token whose email is verified.
    pub fn establish(credentials: Credentials, now: Timestamp) -> AppResult<Self> {
        let claims = decode_claims(&credentials.id_token)?;
        if claims.exp <= now.timestamp() {
            return Err(AppError::AuthenticationRequired);
        }
        if !claims.email_verified {
            return Err(AppError::EmailNotVerified);
        }
        Ok(Self {
            credentials,
            claims,
        })
    }

    pub fn uid(&self) -> &str {
        self.claims.user_id.as_deref().unwrap_or(&self.claims.sub)
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    pub fn bearer(&self) -> &str {
        &self.credentials.id_token
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        Utc.timestamp_opt(self.claims.exp, 0).single()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Credentials persisted between invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AppResult<Option<Credentials>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, credentials: &Credentials) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(credentials)?;
        write_private(&self.path, &body)?;
        Ok(())
    }

    /// Missing file counts as already cleared.
    pub fn clear(&self) -> AppResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(body)
}

#[cfg(not(unix))]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, body)
}

/// Sign in with the provider and persist the session. An unverified account
/// is signed straight back out.
pub async fn sign_in(
    identity: &IdentityClient,
    store: &SessionStore,
    email: &str,
    password: &str,
    now: Timestamp,
) -> AppResult<Session> {
    let result = identity.sign_in(email, password).await?;
    match Session::establish(result.credentials(), now) {
        Ok(session) => {
            store.save(session.credentials())?;
            info!(uid = session.uid(), "signed in");
            Ok(session)
        }
        Err(err) => {
            store.clear()?;
            Err(err)
        }
    }
}

pub fn sign_out(store: &SessionStore) -> AppResult<()> {
    store.clear()?;
    info!("signed out");
    Ok(())
}

/// Restore the persisted session, refreshing the ID token once if it expired.
pub async fn resume(
    store: &SessionStore,
    identity: &IdentityClient,
    now: Timestamp,
) -> AppResult<Session> {
    let credentials = store.load()?.ok_or(AppError::AuthenticationRequired)?;

    match Session::establish(credentials.clone(), now) {
        Err(AppError::AuthenticationRequired) => {
            let refresh_token = credentials
                .refresh_token
                .as_deref()
                .ok_or(AppError::AuthenticationRequired)?;
            let refreshed = identity.refresh(refresh_token).await?;
            let session = Session::establish(refreshed, now)?;
            store.save(session.credentials())?;
            info!(uid = session.uid(), "session refreshed");
            Ok(session)
        }
        other => other,
    }
}
