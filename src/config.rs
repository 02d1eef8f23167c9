use std::path::PathBuf;

use anyhow::{anyhow, Context};
use url::Url;

use crate::messages::Lang;
use crate::status::DEFAULT_OVERDUE_WINDOW_MINUTES;

const DEFAULT_IDENTITY_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_IDENTITY_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Client configuration loaded from the environment (and `.env`, if present).
///
/// | Env Var                          | Default                          |
/// |----------------------------------|----------------------------------|
/// | `SAFETY_API_BASE_URL`            | required                         |
/// | `SAFETY_IDENTITY_API_KEY`        | empty                            |
/// | `SAFETY_IDENTITY_AUTH_URL`       | Identity Toolkit v1              |
/// | `SAFETY_IDENTITY_TOKEN_URL`      | Secure Token v1                  |
/// | `SAFETY_OVERDUE_WINDOW_MINUTES`  | `180`                            |
/// | `SAFETY_REQUEST_TIMEOUT_SECS`    | `30`                             |
/// | `SAFETY_SESSION_FILE`            | `.safety-checkin/session.json`   |
/// | `SAFETY_APP_ORIGIN`              | `http://localhost:3000`          |
/// | `SAFETY_LANG`                    | `en`                             |
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub identity: IdentityConfig,
    pub overdue_window: chrono::Duration,
    pub request_timeout: std::time::Duration,
    pub session_file: PathBuf,
    pub app_origin: Url,
    pub lang: Lang,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub api_key: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_base_url = lookup("SAFETY_API_BASE_URL")
            .context("SAFETY_API_BASE_URL must point at the check-in backend")?;
        Url::parse(&api_base_url).context("SAFETY_API_BASE_URL is not a valid URL")?;

        let identity = IdentityConfig {
            api_key: lookup("SAFETY_IDENTITY_API_KEY").unwrap_or_default(),
            auth_url: env_or("SAFETY_IDENTITY_AUTH_URL", DEFAULT_IDENTITY_AUTH_URL),
            token_url: env_or("SAFETY_IDENTITY_TOKEN_URL", DEFAULT_IDENTITY_TOKEN_URL),
        };

        let window_minutes: i64 = env_or(
            "SAFETY_OVERDUE_WINDOW_MINUTES",
            &DEFAULT_OVERDUE_WINDOW_MINUTES.to_string(),
        )
        .parse()
        .context("SAFETY_OVERDUE_WINDOW_MINUTES must be a whole number of minutes")?;
        if window_minutes <= 0 {
            return Err(anyhow!("SAFETY_OVERDUE_WINDOW_MINUTES must be positive"));
        }
        let overdue_window = chrono::Duration::try_minutes(window_minutes)
            .context("SAFETY_OVERDUE_WINDOW_MINUTES is too large")?;

        let timeout_secs: u64 = env_or("SAFETY_REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .context("SAFETY_REQUEST_TIMEOUT_SECS must be a whole number of seconds")?;

        let app_origin = Url::parse(&env_or("SAFETY_APP_ORIGIN", "http://localhost:3000"))
            .context("SAFETY_APP_ORIGIN is not a valid URL")?;

        let lang = env_or("SAFETY_LANG", "en")
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("SAFETY_LANG is invalid")?;

        Ok(Self {
            api_base_url,
            identity,
            overdue_window,
            request_timeout: std::time::Duration::from_secs(timeout_secs),
            session_file: PathBuf::from(env_or(
                "SAFETY_SESSION_FILE",
                ".safety-checkin/session.json",
            )),
            app_origin,
            lang,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: (&str, &str) = ("SAFETY_API_BASE_URL", "https://checkin.example.com/api");

    #[test]
    fn defaults_fill_everything_but_the_backend() {
        let config = load(&[BASE]).unwrap();
        assert_eq!(config.overdue_window, chrono::Duration::hours(3));
        assert_eq!(config.request_timeout, std::time::Duration::from_secs(30));
        assert_eq!(config.session_file, PathBuf::from(".safety-checkin/session.json"));
        assert_eq!(config.app_origin.as_str(), "http://localhost:3000/");
        assert_eq!(config.lang, Lang::En);
        assert_eq!(config.identity.auth_url, DEFAULT_IDENTITY_AUTH_URL);
    }

    #[test]
    fn backend_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("SAFETY_API_BASE_URL"));
    }

    #[test]
    fn window_must_be_positive() {
        for value in ["0", "-15"] {
            let err = load(&[BASE, ("SAFETY_OVERDUE_WINDOW_MINUTES", value)]).unwrap_err();
            assert_eq!(err.to_string(), "SAFETY_OVERDUE_WINDOW_MINUTES must be positive");
        }
        let config = load(&[BASE, ("SAFETY_OVERDUE_WINDOW_MINUTES", "45")]).unwrap();
        assert_eq!(config.overdue_window, chrono::Duration::minutes(45));
    }

    #[test]
    fn oversized_window_is_an_error() {
        let huge = i64::MAX.to_string();
        let err = load(&[BASE, ("SAFETY_OVERDUE_WINDOW_MINUTES", &huge)]).unwrap_err();
        assert_eq!(err.to_string(), "SAFETY_OVERDUE_WINDOW_MINUTES is too large");
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = load(&[BASE, ("SAFETY_LANG", "fr")]).unwrap_err();
        assert_eq!(err.to_string(), "SAFETY_LANG is invalid");
    }
}
