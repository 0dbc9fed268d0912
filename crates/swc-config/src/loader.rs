//! Credential discovery from environment-style variables.
//!
//! # Design
//! - Discovery is a pure function over a lookup closure so tests never touch
//!   the process environment.
//! - A pre-issued token and storage URL take precedence over temp-auth.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::StoreCredentials;

/// Pre-issued token variable.
pub const ENV_AUTH_TOKEN: &str = "OS_AUTH_TOKEN";
/// Storage URL paired with the pre-issued token.
pub const ENV_STORAGE_URL: &str = "OS_STORAGE_URL";
/// Temp-auth endpoint variable.
pub const ENV_AUTH_URL: &str = "ST_AUTH";
/// Temp-auth user variable.
pub const ENV_USER: &str = "ST_USER";
/// Temp-auth key variable.
pub const ENV_KEY: &str = "ST_KEY";

/// Values supplied on the command line that override the environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    /// Overrides `OS_AUTH_TOKEN`.
    pub auth_token: Option<String>,
    /// Overrides `OS_STORAGE_URL`.
    pub storage_url: Option<String>,
}

/// Resolve credentials from overrides first, then from `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCredentials`] when neither a complete token
/// pair nor a complete temp-auth triple is available, and
/// [`ConfigError::InvalidCredential`] when a URL does not parse.
pub fn discover_credentials<F>(
    lookup: F,
    overrides: &CredentialOverrides,
) -> ConfigResult<StoreCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let token = non_empty(
        overrides
            .auth_token
            .clone()
            .or_else(|| lookup(ENV_AUTH_TOKEN)),
    );
    let storage_url = non_empty(
        overrides
            .storage_url
            .clone()
            .or_else(|| lookup(ENV_STORAGE_URL)),
    );

    if let (Some(token), Some(storage_url)) = (token, storage_url) {
        return Ok(StoreCredentials::PreAuthorized {
            token,
            storage_url: parse_url(ENV_STORAGE_URL, &storage_url)?,
        });
    }

    let auth_url = non_empty(lookup(ENV_AUTH_URL));
    let user = non_empty(lookup(ENV_USER));
    let key = non_empty(lookup(ENV_KEY));
    match (auth_url, user, key) {
        (Some(auth_url), Some(user), Some(key)) => Ok(StoreCredentials::TempAuth {
            auth_url: parse_url(ENV_AUTH_URL, &auth_url)?,
            user,
            key,
        }),
        _ => Err(ConfigError::MissingCredentials),
    }
}

fn parse_url(field: &'static str, value: &str) -> ConfigResult<Url> {
    Url::parse(value.trim()).map_err(|_| ConfigError::InvalidCredential {
        field,
        reason: "not a valid URL",
    })
}
