//! Personal-information form: the profile a user submits for approval.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::{AppError, AppResult};
use crate::messages::Msg;
use crate::models::{Region, UserRecord};
use crate::session::Session;

/// Every field the backend accepts for a profile, and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileInput {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub manager_uid: String,
    #[serde(default)]
    pub manager_name: String,
}

impl ProfileInput {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            uid: record.uid.clone(),
            email: record.email.clone(),
            name: record.name.clone(),
            surname: record.surname.clone(),
            phone: record.phone.clone(),
            region: record.region.clone(),
            manager_uid: record.manager_uid.clone(),
            manager_name: record.manager_name.clone(),
        }
    }

    /// Region and manager are only required when there is something to pick,
    /// and then must be one of the offered values.
    pub fn validate(&self, regions: &[Region], managers: &[UserRecord]) -> AppResult<()> {
        let required = [
            (&self.name, Msg::NameRequired),
            (&self.surname, Msg::SurnameRequired),
            (&self.phone, Msg::PhoneRequired),
        ];
        if let Some((_, msg)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
            return Err(AppError::Validation(*msg));
        }

        if !regions.is_empty() && !regions.iter().any(|region| region.name == self.region) {
            return Err(AppError::Validation(Msg::SelectRegion));
        }
        if !managers.is_empty()
            && !managers
                .iter()
                .any(|manager| manager.uid == self.manager_uid)
        {
            return Err(AppError::Validation(Msg::SelectManager));
        }
        Ok(())
    }

    fn normalize(&mut self, session: &Session, managers: &[UserRecord]) {
        self.uid = session.uid().to_string();
        if let Some(email) = session.email() {
            self.email = email.to_string();
        }
        for field in [
            &mut self.name,
            &mut self.surname,
            &mut self.phone,
            &mut self.region,
            &mut self.manager_uid,
        ] {
            *field = field.trim().to_string();
        }
        if let Some(manager) = managers.iter().find(|m| m.uid == self.manager_uid) {
            self.manager_name = manager.full_name();
        }
    }
}

/// Choices offered on the form. Each list loads on its own; one failing does
/// not hide the other.
#[derive(Debug)]
pub struct ProfileOptions {
    pub regions: AppResult<Vec<Region>>,
    pub managers: AppResult<Vec<UserRecord>>,
}

impl ProfileOptions {
    pub fn regions(&self) -> &[Region] {
        self.regions.as_deref().unwrap_or_default()
    }

    pub fn managers(&self) -> &[UserRecord] {
        self.managers.as_deref().unwrap_or_default()
    }
}

pub async fn load_options(api: &ApiClient) -> ProfileOptions {
    let (regions, managers) = tokio::join!(api.list_regions(), api.list_managers());
    if let Err(err) = &regions {
        warn!(error = %err, "regions unavailable for profile form");
    }
    if let Err(err) = &managers {
        warn!(error = %err, "managers unavailable for profile form");
    }
    ProfileOptions { regions, managers }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated,
    /// First submission: the account now waits for an operator.
    AwaitingApproval,
}

impl SaveOutcome {
    pub fn message(self) -> Msg {
        match self {
            SaveOutcome::Updated => Msg::PersonalInfoSaved,
            SaveOutcome::AwaitingApproval => Msg::WaitingForApproval,
        }
    }
}

pub async fn save(
    api: &ApiClient,
    session: &Session,
    mut input: ProfileInput,
    options: &ProfileOptions,
) -> AppResult<SaveOutcome> {
    input.normalize(session, options.managers());
    input.validate(options.regions(), options.managers())?;

    if api.user_exists(&input.uid).await? {
        api.update_user(&input.uid, &input).await?;
        info!(uid = %input.uid, "profile updated");
        Ok(SaveOutcome::Updated)
    } else {
        api.add_user(&input).await?;
        info!(uid = %input.uid, "profile submitted for approval");
        Ok(SaveOutcome::AwaitingApproval)
    }
}
