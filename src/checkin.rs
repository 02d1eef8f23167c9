use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::info;

use crate::client::ApiClient;
use crate::error::{AppError, AppResult};
use crate::messages::Msg;
use crate::models::{NewCheckInResponse, SafetyStatus};

/// What the user entered on the self-check form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInForm {
    pub status: Option<SafetyStatus>,
    pub comment: String,
}

impl CheckInForm {
    pub fn into_submission(self) -> AppResult<NewCheckInResponse> {
        let safety_status = self
            .status
            .ok_or(AppError::Validation(Msg::PleaseSelectResponse))?;
        let safety_comment = match safety_status {
            SafetyStatus::Safe => String::new(),
            SafetyStatus::Unsafe => self.comment,
        };
        Ok(NewCheckInResponse {
            safety_status,
            safety_comment,
        })
    }
}

/// Allows one submission in flight at a time; the backend has no idempotency key.
///
/// Backed by an advisory lock file so that two CLI processes sharing a session
/// cannot both submit.
pub struct SubmissionGuard {
    lock: RwLock<File>,
}

/// Held while a submission is in flight; unlocks on drop.
pub struct SubmissionTicket<'a> {
    _held: RwLockWriteGuard<'a, File>,
}

impl fmt::Debug for SubmissionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionGuard").finish_non_exhaustive()
    }
}

impl fmt::Debug for SubmissionTicket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionTicket").finish_non_exhaustive()
    }
}

impl SubmissionGuard {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            lock: RwLock::new(file),
        })
    }

    pub fn try_begin(&mut self) -> AppResult<SubmissionTicket<'_>> {
        match self.lock.try_write() {
            Ok(held) => Ok(SubmissionTicket { _held: held }),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                Err(AppError::Validation(Msg::SubmissionInProgress))
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub async fn submit(
    api: &ApiClient,
    guard: &mut SubmissionGuard,
    form: CheckInForm,
) -> AppResult<()> {
    let submission = form.into_submission()?;
    let _ticket = guard.try_begin()?;
    api.submit_response(&submission).await?;
    info!(status = ?submission.safety_status, "check-in response saved");
    Ok(())
}
