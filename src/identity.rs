//! Identity provider calls: account sign-in/sign-up, out-of-band emails and
//! ID-token refresh, against the provider's REST endpoints.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::{AppError, AppResult};
use crate::messages::Msg;
use crate::session::Credentials;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResult {
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub email: String,
}

impl SignInResult {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            id_token: self.id_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResult {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    error: ProviderErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: Client,
    auth_url: String,
    token_url: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig, timeout: std::time::Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SignInResult> {
        require_credentials(email, password)?;
        self.post_account(
            "signInWithPassword",
            json!({"email": email, "password": password, "returnSecureToken": true}),
        )
        .await
    }

    /// Create the account and immediately send the verification email.
    pub async fn sign_up(&self, email: &str, password: &str) -> AppResult<SignInResult> {
        require_credentials(email, password)?;
        let created: SignInResult = self
            .post_account(
                "signUp",
                json!({"email": email, "password": password, "returnSecureToken": true}),
            )
            .await?;
        self.send_email_verification(&created.id_token).await?;
        Ok(created)
    }

    pub async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        if email.trim().is_empty() {
            return Err(AppError::Validation(Msg::EmailRequired));
        }
        let _: serde_json::Value = self
            .post_account(
                "sendOobCode",
                json!({"requestType": "PASSWORD_RESET", "email": email.trim()}),
            )
            .await?;
        Ok(())
    }

    pub async fn send_email_verification(&self, id_token: &str) -> AppResult<()> {
        let _: serde_json::Value = self
            .post_account(
                "sendOobCode",
                json!({"requestType": "VERIFY_EMAIL", "idToken": id_token}),
            )
            .await?;
        Ok(())
    }

    /// Exchange a refresh token for a new ID token. Any rejection means the
    /// user has to sign in again.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<Credentials> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .finish();

        let response = self
            .http
            .post(format!("{}/token", self.token_url))
            .query(&[("key", &self.api_key)])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            debug!(status = status.as_u16(), "token refresh rejected");
            return Err(AppError::AuthenticationRequired);
        }
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(provider_error(status, &bytes));
        }

        let refreshed: RefreshResult = serde_json::from_slice(&bytes)?;
        Ok(Credentials {
            id_token: refreshed.id_token,
            refresh_token: Some(refreshed.refresh_token),
        })
    }

    async fn post_account<T: DeserializeOwned>(
        &self,
        action: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        debug!(action, "identity provider call");
        let response = self
            .http
            .post(format!("{}/accounts:{action}", self.auth_url))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(provider_error(status, &bytes));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn require_credentials(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::Validation(Msg::EmailRequired));
    }
    if password.is_empty() {
        return Err(AppError::Validation(Msg::PasswordRequired));
    }
    Ok(())
}

fn provider_error(status: StatusCode, body: &[u8]) -> AppError {
    if status.is_server_error() {
        return AppError::RemoteUnavailable {
            reason: format!("identity provider returned {status}"),
        };
    }
    let detail: ProviderError = serde_json::from_slice(body).unwrap_or_default();
    AppError::Remote {
        status: status.as_u16(),
        message: detail.error.message,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use axum::extract::Query;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;
    use crate::testing::serve;

    fn client(base: &str) -> IdentityClient {
        let config = IdentityConfig {
            api_key: "web-key".to_string(),
            auth_url: format!("{base}/v1"),
            token_url: format!("{base}/v1/"),
        };
        IdentityClient::new(&config, std::time::Duration::from_secs(5)).unwrap()
    }

    async fn sign_in_handler(
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (HttpStatus, Json<Value>) {
        if query.get("key").map(String::as_str) != Some("web-key") {
            return (HttpStatus::FORBIDDEN, Json(json!({"error": {"message": "API_KEY_INVALID"}})));
        }
        if body["password"] == "correct horse" {
            (
                HttpStatus::OK,
                Json(json!({"idToken": "id-1", "refreshToken": "rt-1", "localId": "u1", "email": body["email"]})),
            )
        } else {
            (
                HttpStatus::BAD_REQUEST,
                Json(json!({"error": {"code": 400, "message": "INVALID_LOGIN_CREDENTIALS"}})),
            )
        }
    }

    #[tokio::test]
    async fn sign_in_returns_credentials() {
        let base = serve(Router::new().route("/v1/accounts:signInWithPassword", post(sign_in_handler))).await;
        let result = client(&base).sign_in("a@example.com", "correct horse").await.unwrap();
        assert_eq!(result.local_id, "u1");
        assert_eq!(result.credentials().refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn provider_rejection_carries_message() {
        let base = serve(Router::new().route("/v1/accounts:signInWithPassword", post(sign_in_handler))).await;
        let err = client(&base).sign_in("a@example.com", "wrong").await.unwrap_err();
        assert_matches!(err, AppError::Remote { status: 400, message } if message == "INVALID_LOGIN_CREDENTIALS");
    }

    #[tokio::test]
    async fn blank_inputs_never_reach_the_provider() {
        let unreachable = client("http://127.0.0.1:9");
        assert_matches!(
            unreachable.sign_in(" ", "pw").await,
            Err(AppError::Validation(Msg::EmailRequired))
        );
        assert_matches!(
            unreachable.sign_in("a@example.com", "").await,
            Err(AppError::Validation(Msg::PasswordRequired))
        );
        assert_matches!(
            unreachable.send_password_reset("").await,
            Err(AppError::Validation(Msg::EmailRequired))
        );
    }

    #[tokio::test]
    async fn sign_up_sends_verification_email() {
        let router = Router::new()
            .route(
                "/v1/accounts:signUp",
                post(|| async { Json(json!({"idToken": "new-id", "localId": "u9"})) }),
            )
            .route(
                "/v1/accounts:sendOobCode",
                post(|Json(body): Json<Value>| async move {
                    if body["requestType"] == "VERIFY_EMAIL" && body["idToken"] == "new-id" {
                        (HttpStatus::OK, Json(json!({"email": "n@example.com"})))
                    } else {
                        (HttpStatus::BAD_REQUEST, Json(json!({"error": {"message": "INVALID_ID_TOKEN"}})))
                    }
                }),
            );
        let base = serve(router).await;
        let created = client(&base).sign_up("n@example.com", "secret123").await.unwrap();
        assert_eq!(created.local_id, "u9");
        assert_eq!(created.refresh_token, None);
    }

    #[tokio::test]
    async fn refresh_rejection_requires_sign_in() {
        let router = Router::new().route(
            "/v1/token",
            post(|body: String| async move {
                if body.contains("refresh_token=good") {
                    (HttpStatus::OK, Json(json!({"id_token": "id-2", "refresh_token": "rt-2", "user_id": "u1"})))
                } else {
                    (HttpStatus::BAD_REQUEST, Json(json!({"error": {"message": "INVALID_REFRESH_TOKEN"}})))
                }
            }),
        );
        let base = serve(router).await;
        let identity = client(&base);

        let fresh = identity.refresh("good").await.unwrap();
        assert_eq!(fresh.id_token, "id-2");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt-2"));

        assert_matches!(identity.refresh("stale").await, Err(AppError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn server_failure_is_unavailable() {
        let router = Router::new().route(
            "/v1/accounts:sendOobCode",
            post(|| async { HttpStatus::BAD_GATEWAY }),
        );
        let base = serve(router).await;
        assert_matches!(
            client(&base).send_password_reset("a@example.com").await,
            Err(AppError::RemoteUnavailable { .. })
        );
    }
}
