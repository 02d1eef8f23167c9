use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::messages::Msg;

pub type Timestamp = DateTime<Utc>;

/// Answer to "are you safe?". The backend stores `Yes`/`No`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyStatus {
    #[serde(rename = "Yes", alias = "Safe")]
    Safe,
    #[serde(rename = "No", alias = "Unsafe")]
    Unsafe,
}

impl FromStr for SafetyStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "safe" | "yes" => Ok(SafetyStatus::Safe),
            "unsafe" | "no" => Ok(SafetyStatus::Unsafe),
            other => Err(format!("unknown safety status `{other}`")),
        }
    }
}

/// Timestamp exactly as the backend sent it, before parsing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
    Other(serde_json::Value),
}

impl fmt::Display for WireTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireTimestamp::Millis(ms) => write!(f, "{ms}"),
            WireTimestamp::Text(text) => f.write_str(text),
            WireTimestamp::Other(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCheckInRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "user_id", deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<WireTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCheckInResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "user_id", deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(alias = "safety_status")]
    pub safety_status: SafetyStatus,
    #[serde(default, alias = "safety_comment")]
    pub comment: Option<String>,
    #[serde(default, alias = "responded_at", alias = "createdAt", alias = "created_at")]
    pub responded_at: Option<WireTimestamp>,
}

/// Body of `GET /responses/status/{uid}`: the evaluator's raw input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default, alias = "last_request")]
    pub last_request: Option<RawCheckInRequest>,
    #[serde(default, alias = "last_response")]
    pub last_response: Option<RawCheckInResponse>,
}

/// One row of `GET /responses/statuses/{uid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    #[serde(
        default,
        alias = "userId",
        alias = "user_id",
        deserialize_with = "string_or_number"
    )]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
}

impl StatusEntry {
    pub fn full_name(&self) -> String {
        full_name(&self.name, &self.surname)
    }

    /// Decode one bulk row on its own. A row that does not fit keeps whatever
    /// identity it carries so it can still be listed.
    pub fn decode(value: &serde_json::Value) -> Result<Self, UnreadableEntry> {
        StatusEntry::deserialize(value).map_err(|err| {
            let identity = EntryIdentity::deserialize(value).unwrap_or_default();
            UnreadableEntry {
                uid: identity.uid,
                full_name: full_name(&identity.name, &identity.surname),
                reason: err.to_string(),
            }
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct EntryIdentity {
    #[serde(
        default,
        alias = "userId",
        alias = "user_id",
        deserialize_with = "string_or_number"
    )]
    uid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    surname: String,
}

/// A bulk status row that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    pub uid: String,
    pub full_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInRequest {
    pub id: String,
    pub user_id: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInResponse {
    pub id: String,
    pub user_id: String,
    pub safety_status: SafetyStatus,
    comment: Option<String>,
    pub responded_at: Timestamp,
}

impl CheckInResponse {
    /// A `Safe` response never carries a comment; an empty comment is absent.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        safety_status: SafetyStatus,
        comment: Option<String>,
        responded_at: Timestamp,
    ) -> Self {
        let comment = match safety_status {
            SafetyStatus::Safe => None,
            SafetyStatus::Unsafe => comment.filter(|text| !text.is_empty()),
        };
        Self {
            id: id.into(),
            user_id: user_id.into(),
            safety_status,
            comment,
            responded_at,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

/// Body of `POST /responses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCheckInResponse {
    pub safety_status: SafetyStatus,
    pub safety_comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    User,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Operator => "Operator",
            Role::Admin => "Admin",
        }
    }
}

// Unrecognized roles from the backend get the least privilege.
impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Admin" => Role::Admin,
            "Operator" => Role::Operator,
            _ => Role::User,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{other}` (expected user, operator or admin)")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account approval state. `Pending` and `PendingApproval` are the same state
/// under two backend spellings; unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserStatus {
    Approved,
    #[default]
    Pending,
    Unverified,
    Other(String),
}

impl UserStatus {
    pub fn as_str(&self) -> &str {
        match self {
            UserStatus::Approved => "Approved",
            UserStatus::Pending => "PendingApproval",
            UserStatus::Unverified => "Unverified",
            UserStatus::Other(value) => value,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, UserStatus::Approved)
    }
}

impl From<String> for UserStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Approved" => UserStatus::Approved,
            "Pending" | "PendingApproval" => UserStatus::Pending,
            "Unverified" => UserStatus::Unverified,
            _ => UserStatus::Other(value),
        }
    }
}

impl From<UserStatus> for String {
    fn from(status: UserStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "string_or_number")]
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
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        full_name(&self.name, &self.surname)
    }
}

pub fn sort_users(users: &mut [UserRecord]) {
    users.sort_by_cached_key(|user| user.full_name().to_lowercase());
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

pub fn sort_regions(regions: &mut [Region]) {
    regions.sort_by_cached_key(|region| region.name.to_lowercase());
}

/// Body of region create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionInput {
    pub name: String,
}

impl RegionInput {
    pub fn new(name: &str) -> AppResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(Msg::RegionNameRequired));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }
}

/// Partial profile update for `PUT /users/update-user-fields/{uid}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserFieldsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_name: Option<String>,
}

/// Some endpoints wrap their payload in `{"data": ...}`, others do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } | Envelope::Bare(data) => data,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExistResponse {
    #[serde(alias = "exists")]
    pub exist: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

fn full_name(name: &str, surname: &str) -> String {
    format!("{name} {surname}").trim().to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
