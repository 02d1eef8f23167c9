//! REST client for the check-in backend.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    sort_regions, sort_users, Envelope, ErrorBody, ExistResponse, NewCheckInResponse, Region,
    RegionInput, Role, StatusEntry, StatusSnapshot, UnreadableEntry, UserFieldsPatch, UserRecord,
    UserStatus,
};
use crate::notification::SubscriptionRegistration;
use crate::profile::ProfileInput;
use crate::session::Session;

const NOT_VERIFIED_CODE: &str = "ERR_EMAIL_IS_NOT_VERIFIED";
const NOT_APPROVED_CODE: &str = "ERR_EMAIL_IS_NOT_APPROVED";

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    bearer: Option<String>,
}

struct Call {
    builder: RequestBuilder,
    request_id: Uuid,
    path: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| AppError::Malformed(format!("base url `{base_url}`: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Malformed(format!("base url `{base_url}` cannot be a base")));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            bearer: None,
        })
    }

    /// Every call made by the returned client carries the session's credential.
    pub fn with_session(mut self, session: &Session) -> Self {
        self.bearer = Some(session.bearer().to_string());
        self
    }

    pub async fn get_user(&self, uid: &str) -> AppResult<UserRecord> {
        let user: Envelope<UserRecord> = self.get(&["users", uid]).await?;
        Ok(user.into_inner())
    }

    pub async fn user_exists(&self, uid: &str) -> AppResult<bool> {
        let exist: ExistResponse = self.get(&["users", "exist", uid]).await?;
        Ok(exist.exist)
    }

    /// Profile of `uid`, or `None` when the backend has never seen the user.
    pub async fn find_user(&self, uid: &str) -> AppResult<Option<UserRecord>> {
        if !self.user_exists(uid).await? {
            return Ok(None);
        }
        self.get_user(uid).await.map(Some)
    }

    /// All users, sorted by full name.
    pub async fn list_users(&self) -> AppResult<Vec<UserRecord>> {
        let users: Envelope<Vec<UserRecord>> = self.get(&["users"]).await?;
        let mut users = users.into_inner();
        sort_users(&mut users);
        Ok(users)
    }

    pub async fn list_managers(&self) -> AppResult<Vec<UserRecord>> {
        let managers: Envelope<Vec<UserRecord>> = self.get(&["users", "managers"]).await?;
        let mut managers = managers.into_inner();
        sort_users(&mut managers);
        Ok(managers)
    }

    pub async fn add_user(&self, profile: &ProfileInput) -> AppResult<()> {
        self.send(Method::POST, &["users", "add"], profile).await?;
        Ok(())
    }

    pub async fn update_user(&self, uid: &str, profile: &ProfileInput) -> AppResult<()> {
        self.send(Method::PUT, &["users", uid], profile).await?;
        Ok(())
    }

    pub async fn update_user_role(&self, uid: &str, role: Role) -> AppResult<()> {
        self.send(Method::PUT, &["users", "update-role", uid], &json!({ "role": role }))
            .await?;
        Ok(())
    }

    pub async fn update_user_status(&self, uid: &str, status: &UserStatus) -> AppResult<()> {
        self.send(
            Method::PUT,
            &["users", "update-status", uid],
            &json!({ "status": status }),
        )
        .await?;
        Ok(())
    }

    pub async fn update_user_fields(&self, uid: &str, patch: &UserFieldsPatch) -> AppResult<()> {
        self.send(Method::PUT, &["users", "update-user-fields", uid], patch)
            .await?;
        Ok(())
    }

    pub async fn delete_user(&self, uid: &str) -> AppResult<()> {
        self.send_empty(Method::DELETE, &["users", uid]).await?;
        Ok(())
    }

    pub async fn notify_user(&self, uid: &str) -> AppResult<()> {
        self.send_empty(Method::POST, &["users", uid, "notify"]).await?;
        Ok(())
    }

    /// All regions, sorted by name.
    pub async fn list_regions(&self) -> AppResult<Vec<Region>> {
        let regions: Envelope<Vec<Region>> = self.get(&["regions"]).await?;
        let mut regions = regions.into_inner();
        sort_regions(&mut regions);
        Ok(regions)
    }

    pub async fn add_region(&self, region: &RegionInput) -> AppResult<Region> {
        let body = self.send(Method::POST, &["regions", "add"], region).await?;
        let created: Envelope<Region> = serde_json::from_slice(&body)?;
        Ok(created.into_inner())
    }

    pub async fn update_region(&self, id: &str, region: &RegionInput) -> AppResult<()> {
        self.send(Method::PUT, &["regions", id], region).await?;
        Ok(())
    }

    pub async fn delete_region(&self, id: &str) -> AppResult<()> {
        self.send_empty(Method::DELETE, &["regions", id]).await?;
        Ok(())
    }

    /// Ask the backend to push a check-in prompt to everyone in the region.
    pub async fn notify_region(&self, id: &str) -> AppResult<()> {
        self.send_empty(Method::POST, &["regions", id, "notify"]).await?;
        Ok(())
    }

    pub async fn submit_response(&self, response: &NewCheckInResponse) -> AppResult<()> {
        self.send(Method::POST, &["responses"], response).await?;
        Ok(())
    }

    pub async fn latest_status(&self, uid: &str) -> AppResult<StatusSnapshot> {
        let snapshot: Envelope<StatusSnapshot> = self.get(&["responses", "status", uid]).await?;
        Ok(snapshot.into_inner())
    }

    /// Rows are decoded one by one so a single malformed record stays in
    /// the list as an error instead of failing the whole response.
    pub async fn statuses(
        &self,
        uid: &str,
    ) -> AppResult<Vec<Result<StatusEntry, UnreadableEntry>>> {
        let rows: Envelope<Vec<serde_json::Value>> =
            self.get(&["responses", "statuses", uid]).await?;
        Ok(rows
            .into_inner()
            .iter()
            .map(|row| {
                let entry = StatusEntry::decode(row);
                if let Err(unreadable) = &entry {
                    warn!(uid = %unreadable.uid, reason = %unreadable.reason, "unreadable status row");
                }
                entry
            })
            .collect())
    }

    pub async fn save_subscription(&self, registration: &SubscriptionRegistration<'_>) -> AppResult<()> {
        self.send(Method::POST, &["subscriptions"], registration)
            .await?;
        Ok(())
    }

    fn call(&self, method: Method, segments: &[&str]) -> AppResult<Call> {
        let bearer = self
            .bearer
            .as_deref()
            .ok_or(AppError::AuthenticationRequired)?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Malformed(format!("base url `{}` cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        let request_id = Uuid::new_v4();
        let path = url.path().to_string();
        debug!(%method, %path, %request_id, "api request");

        let builder = self
            .http
            .request(method, url)
            .bearer_auth(bearer)
            .header("x-request-id", request_id.to_string());

        Ok(Call {
            builder,
            request_id,
            path,
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> AppResult<T> {
        let call = self.call(Method::GET, segments)?;
        let body = self.execute(call).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> AppResult<Vec<u8>> {
        let mut call = self.call(method, segments)?;
        call.builder = call.builder.json(body);
        self.execute(call).await
    }

    async fn send_empty(&self, method: Method, segments: &[&str]) -> AppResult<Vec<u8>> {
        let call = self.call(method, segments)?;
        self.execute(call).await
    }

    async fn execute(&self, call: Call) -> AppResult<Vec<u8>> {
        let Call {
            builder,
            request_id,
            path,
        } = call;

        let response = builder.send().await.map_err(|err| {
            warn!(%path, %request_id, error = %err, "backend unreachable");
            AppError::from(err)
        })?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            warn!(%path, %request_id, status = status.as_u16(), "backend rejected call");
            return Err(map_failure(status, &body));
        }
        Ok(body)
    }
}

/// Translate a non-success backend reply into the error taxonomy.
fn map_failure(status: StatusCode, body: &[u8]) -> AppError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|body| body.message)
        .unwrap_or_default();

    match message.as_str() {
        NOT_VERIFIED_CODE => return AppError::EmailNotVerified,
        NOT_APPROVED_CODE => return AppError::NotApproved,
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED => AppError::AuthenticationRequired,
        StatusCode::FORBIDDEN => AppError::Forbidden,
        StatusCode::CONFLICT => AppError::Conflict(message),
        status if status.is_server_error() => AppError::RemoteUnavailable {
            reason: format!("backend returned {status}"),
        },
        status => AppError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}
