use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VerificationError;

pub const MAX_ATTEMPTS: u32 = 5;

/// Sessions that never verify are dropped after this long.
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Signed tokens expire independently of the in-memory session record.
const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Per-session verification attempt bookkeeping. The counter only ever
/// decreases; once it reaches zero the session is locked for good and the
/// code verifier must not be consulted again.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    remaining_attempts: u32,
    verified: bool,
    opened_at: Instant,
}

impl VerificationSession {
    fn new() -> Self {
        Self {
            remaining_attempts: MAX_ATTEMPTS,
            verified: false,
            opened_at: Instant::now(),
        }
    }

    pub fn record_failure(&mut self) -> u32 {
        self.remaining_attempts = self.remaining_attempts.saturating_sub(1);
        self.remaining_attempts
    }

    pub fn is_locked(&self) -> bool {
        self.remaining_attempts == 0
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.remaining_attempts
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    fn is_expired(&self) -> bool {
        self.opened_at.elapsed() >= SESSION_TTL
    }
}

/// Server-side store of verification sessions. The client never self-reports
/// its remaining attempts; it only holds an opaque session id and, after a
/// successful check, a signed token referencing it.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<Uuid, VerificationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, VerificationSession>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a fresh session with a full attempt budget. Expired sessions
    /// are pruned lazily here rather than by a background task.
    pub fn open(&self) -> Uuid {
        let mut sessions = self.lock();
        sessions.retain(|_, s| !s.is_expired());
        let id = Uuid::new_v4();
        sessions.insert(id, VerificationSession::new());
        id
    }

    /// Discards a session outright, as when the verification modal closes.
    pub fn close(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    pub fn is_locked(&self, id: Uuid) -> Result<bool, VerificationError> {
        self.with(id, |s| s.is_locked())
    }

    pub fn is_verified(&self, id: Uuid) -> Result<bool, VerificationError> {
        self.with(id, |s| s.is_verified())
    }

    pub fn remaining_attempts(&self, id: Uuid) -> Result<u32, VerificationError> {
        self.with(id, |s| s.remaining_attempts())
    }

    /// Consumes one attempt, returning the new remainder.
    pub fn record_failure(&self, id: Uuid) -> Result<u32, VerificationError> {
        self.with(id, |s| s.record_failure())
    }

    pub fn mark_verified(&self, id: Uuid) -> Result<(), VerificationError> {
        self.with(id, |s| s.verified = true)
    }

    fn with<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut VerificationSession) -> T,
    ) -> Result<T, VerificationError> {
        let mut sessions = self.lock();
        match sessions.get_mut(&id) {
            Some(s) if !s.is_expired() => Ok(f(s)),
            Some(_) => {
                sessions.remove(&id);
                Err(VerificationError::UnknownSession)
            }
            None => Err(VerificationError::UnknownSession),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // Session id
    pub exp: usize,  // Expiration time
}

/// Issues the signed token a client presents when creating a listing after
/// a successful code check.
pub fn issue_session_token(
    session_id: Uuid,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = SessionClaims {
        sub: session_id.to_string(),
        exp: (Utc::now().timestamp() + TOKEN_TTL_SECS) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Validates a session token's signature and expiry, returning the session
/// id it references. The live session record is still checked separately.
pub fn validate_session_token(token: &str, secret: &str) -> Result<Uuid, VerificationError> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| VerificationError::UnknownSession)?;
    Uuid::parse_str(&data.claims.sub).map_err(|_| VerificationError::UnknownSession)
}
