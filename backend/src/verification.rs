use std::sync::Arc;

use log::{error, warn};
use uuid::Uuid;

use crate::error::VerificationError;
use crate::session::SessionStore;

/// Stateless check of a submitted code against the single configured
/// secret. Attempt bookkeeping lives entirely in [`SessionStore`].
#[derive(Debug, Clone)]
pub struct CodeVerifier {
    secret: Option<String>,
}

impl CodeVerifier {
    pub fn new(secret: Option<String>) -> Self {
        if secret.is_none() {
            warn!("CAR_ADD_VERIFICATION_CODE is not set; all verification attempts will be denied");
        }
        Self { secret }
    }

    /// `Ok(true)` iff the code exactly matches the secret. A missing secret
    /// fails closed with `ServerMisconfigured` rather than returning a
    /// mismatch, so it never consumes an attempt.
    pub fn verify(&self, code: &str) -> Result<bool, VerificationError> {
        let expected = self.secret.as_deref().ok_or_else(|| {
            error!("verification code is not set in environment variables");
            VerificationError::ServerMisconfigured
        })?;
        Ok(code == expected)
    }
}

/// Ties the verifier to a session's attempt budget: this is the only path
/// through which codes are checked.
pub struct VerificationGate {
    verifier: CodeVerifier,
    sessions: Arc<SessionStore>,
}

impl VerificationGate {
    pub fn new(verifier: CodeVerifier, sessions: Arc<SessionStore>) -> Self {
        Self { verifier, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// One verification attempt. The input is case-normalized here so the
    /// comparison is always against the uppercase form.
    ///
    /// A locked session returns `Locked` without consulting the verifier.
    /// Only an actual mismatch consumes an attempt; "could not check the
    /// code" conditions pass through with the budget untouched.
    pub fn attempt(&self, session_id: Uuid, raw_code: &str) -> Result<(), VerificationError> {
        if self.sessions.is_locked(session_id)? {
            return Err(VerificationError::Locked);
        }

        let code = raw_code.trim().to_uppercase();
        if self.verifier.verify(&code)? {
            self.sessions.mark_verified(session_id)?;
            Ok(())
        } else {
            let remaining = self.sessions.record_failure(session_id)?;
            if remaining == 0 {
                Err(VerificationError::Locked)
            } else {
                Err(VerificationError::InvalidCode {
                    remaining_attempts: remaining,
                })
            }
        }
    }
}
