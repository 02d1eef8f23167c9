//! Push notifications: what to display when one arrives, where to go when
//! one is activated, and the subscription the backend fans out to.

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::access::Landing;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    pub fn parse(data: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| AppError::Malformed(format!("push payload: {err}")))
    }

    pub fn display(&self) -> DisplayNotification {
        DisplayNotification {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: self.icon.clone().filter(|icon| !icon.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
    Open(Url),
    /// The payload pointed outside the application; open `fallback` instead.
    Rejected { requested: String, fallback: Url },
}

impl NavigationIntent {
    pub fn target(&self) -> &Url {
        match self {
            NavigationIntent::Open(url) => url,
            NavigationIntent::Rejected { fallback, .. } => fallback,
        }
    }
}

/// Decide where an activated notification takes the user. Only URLs on the
/// application's own origin are followed.
pub fn on_activate(payload: &PushPayload, origin: &Url) -> NavigationIntent {
    let fallback = origin
        .join(Landing::SelfCheck.path())
        .unwrap_or_else(|_| origin.clone());

    let requested = match payload.url.as_deref().map(str::trim) {
        None | Some("") => return NavigationIntent::Open(fallback),
        Some(requested) => requested,
    };

    match origin.join(requested) {
        Ok(target) if target.origin() == origin.origin() => NavigationIntent::Open(target),
        _ => {
            warn!(url = requested, "notification url outside app origin");
            NavigationIntent::Rejected {
                requested: requested.to_string(),
                fallback,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

impl PushSubscription {
    pub fn parse(data: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| AppError::Malformed(format!("push subscription: {err}")))
    }
}

/// Body of `POST /subscriptions`.
#[derive(Debug, Serialize)]
pub struct SubscriptionRegistration<'a> {
    pub subscription: &'a PushSubscription,
    pub uid: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin() -> Url {
        Url::parse("https://checkin.example.org").unwrap()
    }

    fn payload(url: Option<&str>) -> PushPayload {
        PushPayload {
            title: "Safety check".to_string(),
            body: "Are you safe?".to_string(),
            icon: Some(String::new()),
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn relative_and_same_origin_urls_open() {
        let intent = on_activate(&payload(Some("/self-check?prompt=42")), &origin());
        assert_eq!(
            intent,
            NavigationIntent::Open(Url::parse("https://checkin.example.org/self-check?prompt=42").unwrap())
        );

        let absolute = on_activate(&payload(Some("https://checkin.example.org/regions")), &origin());
        assert_eq!(absolute.target().path(), "/regions");
    }

    #[test]
    fn missing_url_opens_self_check() {
        let intent = on_activate(&payload(None), &origin());
        assert_eq!(intent.target().as_str(), "https://checkin.example.org/self-check");
        assert!(matches!(on_activate(&payload(Some("  ")), &origin()), NavigationIntent::Open(_)));
    }

    #[test]
    fn foreign_urls_are_rejected() {
        let intent = on_activate(&payload(Some("https://evil.example.com/login")), &origin());
        match intent {
            NavigationIntent::Rejected { requested, fallback } => {
                assert_eq!(requested, "https://evil.example.com/login");
                assert_eq!(fallback.path(), "/self-check");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            on_activate(&payload(Some("http://checkin.example.org/self-check")), &origin()),
            NavigationIntent::Rejected { .. }
        ));
    }

    #[test]
    fn payload_parsing_and_display() {
        let parsed = PushPayload::parse(br#"{"title":"Check in","body":"Region North","icon":"/logo.png","url":"/self-check"}"#)
            .unwrap();
        let shown = parsed.display();
        assert_eq!(shown.title, "Check in");
        assert_eq!(shown.icon.as_deref(), Some("/logo.png"));
        assert_eq!(payload(None).display().icon, None);
        assert!(matches!(PushPayload::parse(b"{}"), Err(AppError::Malformed(_))));
    }

    #[test]
    fn subscription_registration_shape() {
        let subscription = PushSubscription::parse(
            br#"{"endpoint":"https://push.example/abc","expirationTime":null,"keys":{"p256dh":"BK","auth":"au"}}"#,
        )
        .unwrap();
        let body = SubscriptionRegistration {
            subscription: &subscription,
            uid: "u1",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "subscription": {"endpoint": "https://push.example/abc", "expirationTime": null, "keys": {"p256dh": "BK", "auth": "au"}},
                "uid": "u1"
            })
        );
        assert!(PushSubscription::parse(br#"{"endpoint":"e","keys":{"p256dh":"a","auth":"b"},"extra":1}"#).is_err());
    }
}
