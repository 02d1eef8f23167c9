//! Role and approval gate. This only decides what the client offers; the
//! backend enforces the same rules on every call.

use std::fmt;

use crate::error::{AppError, AppResult};
use crate::models::{Role, UserRecord};

/// Where the user should be sent next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    SignIn,
    VerifyEmail,
    PersonalInfo,
    SelfCheck,
    Regions,
}

impl Landing {
    pub fn path(self) -> &'static str {
        match self {
            Landing::SignIn => "/",
            Landing::VerifyEmail => "/verify-email",
            Landing::PersonalInfo => "/personal-info",
            Landing::SelfCheck => "/self-check",
            Landing::Regions => "/regions",
        }
    }

    /// Command that continues from this landing.
    pub fn hint(self) -> &'static str {
        match self {
            Landing::SignIn => "safety-checkin login",
            Landing::VerifyEmail => "safety-checkin resend-verification",
            Landing::PersonalInfo => "safety-checkin profile save",
            Landing::SelfCheck => "safety-checkin respond",
            Landing::Regions => "safety-checkin regions list",
        }
    }
}

impl fmt::Display for Landing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// `record` is `None` when the backend has no profile for the signed-in user.
pub fn landing_after_sign_in(record: Option<&UserRecord>) -> Landing {
    match record {
        Some(user) if user.status.is_approved() => {
            if user.role == Role::Admin {
                Landing::Regions
            } else {
                Landing::SelfCheck
            }
        }
        _ => Landing::PersonalInfo,
    }
}

/// Recovery view for errors that stem from the session or account state.
pub fn recovery_for(err: &AppError) -> Option<Landing> {
    match err {
        AppError::AuthenticationRequired => Some(Landing::SignIn),
        AppError::EmailNotVerified => Some(Landing::VerifyEmail),
        AppError::NotApproved => Some(Landing::PersonalInfo),
        _ => None,
    }
}

pub fn can_administer(user: &UserRecord) -> bool {
    user.role == Role::Admin
}

pub fn require_admin(user: &UserRecord) -> AppResult<()> {
    if can_administer(user) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_approved(user: &UserRecord) -> AppResult<()> {
    if user.status.is_approved() {
        Ok(())
    } else {
        Err(AppError::NotApproved)
    }
}
