//! Shared plumbing for provider adapters: error mapping and API-key
//! resolution.

use sa_domain::config::AuthConfig;
use sa_domain::error::{Error, Result};

/// Map a transport-level [`reqwest::Error`] onto the domain error
/// taxonomy: timeouts stay distinguishable from other HTTP failures so
/// the router's retry logic can treat them as transient.
pub(crate) fn http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve a provider's API key from its [`AuthConfig`].
///
/// Tried in order: the plaintext `key` field (discouraged, warns), the
/// OS keychain (`service` + `account`), the `env` variable, and finally
/// a headless keychain fallback env var (`{SERVICE}_{ACCOUNT}`,
/// uppercased) for machines with no keychain daemon.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(key) = &auth.key {
        tracing::warn!("API key loaded from plaintext config; prefer 'env' or keychain mode");
        return Ok(key.clone());
    }

    if let (Some(service), Some(account)) = (&auth.service, &auth.account) {
        match read_keychain(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => {
                tracing::warn!(service = %service, account = %account, error = %e, "keychain lookup failed, trying env");
            }
        }
    }

    if let Some(var) = &auth.env {
        return std::env::var(var)
            .map_err(|_| Error::Auth(format!("environment variable '{var}' is not set")));
    }

    if let (Some(service), Some(account)) = (&auth.service, &auth.account) {
        let fallback = headless_fallback_var(service, account);
        if let Ok(value) = std::env::var(&fallback) {
            tracing::info!(env_var = %fallback, "API key resolved from keychain fallback env var");
            return Ok(value);
        }
    }

    Err(Error::Auth(
        "no API key configured: set 'key', 'env', or keychain 'service'+'account'".into(),
    ))
}

fn read_keychain(service: &str, account: &str) -> Result<String> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keyring entry failed: {e}")))?;
    entry
        .get_password()
        .map_err(|e| Error::Auth(format!("keyring read failed: {e}")))
}

/// `("agentd", "venice-key")` -> `"AGENTD_VENICE_KEY"`.
fn headless_fallback_var(service: &str, account: &str) -> String {
    let norm = |s: &str| s.to_uppercase().replace('-', "_");
    format!("{}_{}", norm(service), norm(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_var_uppercases_and_underscores() {
        assert_eq!(headless_fallback_var("agentd", "venice-key"), "AGENTD_VENICE_KEY");
    }

    #[test]
    fn plaintext_key_wins() {
        let auth = AuthConfig {
            key: Some("sk-test".into()),
            env: Some("SHOULD_NOT_BE_READ_1".into()),
            ..AuthConfig::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test");
    }

    #[test]
    fn env_var_is_read() {
        std::env::set_var("SA_UTIL_TEST_KEY_1", "from-env");
        let auth = AuthConfig {
            env: Some("SA_UTIL_TEST_KEY_1".into()),
            ..AuthConfig::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "from-env");
        std::env::remove_var("SA_UTIL_TEST_KEY_1");
    }

    #[test]
    fn missing_env_var_is_an_auth_error() {
        let auth = AuthConfig {
            env: Some("SA_UTIL_TEST_MISSING_1".into()),
            ..AuthConfig::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn nothing_configured_is_an_auth_error() {
        let err = resolve_api_key(&AuthConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn keychain_mode_falls_back_to_headless_env_var() {
        std::env::set_var("AGENTD_CI_PROVIDER", "headless-secret");
        let auth = AuthConfig {
            service: Some("agentd".into()),
            account: Some("ci-provider".into()),
            ..AuthConfig::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "headless-secret");
        std::env::remove_var("AGENTD_CI_PROVIDER");
    }
}
