mod agent;
mod cache;
mod executor;
mod observability;
mod router;
mod ratelimit;
mod security;
mod server;
mod sessions;
mod tools;

pub use agent::*;
pub use cache::*;
pub use executor::*;
pub use observability::*;
pub use ratelimit::*;
pub use router::*;
pub use security::*;
pub use server::*;
pub use sessions::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration, deserialized from TOML. Every section has a
/// `Default` impl via `#[serde(default)]` so a partial config file is
/// always valid — an empty file yields an all-defaults `Config`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good; callers should still check for
    /// `ConfigSeverity::Error` entries before starting up.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.router.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "router.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        let mut seen_ids = std::collections::HashSet::new();
        for (i, provider) in self.router.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if !provider.base_url.is_empty()
                && !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("router.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }
            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("router.providers[{i}].id"),
                    message: format!("duplicate provider id \"{}\"", provider.id),
                });
            }
            let needs_credentials = matches!(provider.auth.mode, AuthMode::ApiKey);
            if needs_credentials {
                let has_env = provider.auth.env.as_ref().is_some_and(|v| !v.is_empty());
                let has_key = provider.auth.key.as_ref().is_some_and(|v| !v.is_empty());
                if !has_env && !has_key {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("router.providers[{i}].auth"),
                        message: format!(
                            "provider \"{}\" uses api_key auth but has no auth.env or auth.key configured",
                            provider.id
                        ),
                    });
                }
            }
        }

        for (i, pattern) in self.security.denied_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("security.denied_patterns[{i}]"),
                    message: format!("invalid regex \"{pattern}\": {e}"),
                });
            }
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 3210,
                host: "127.0.0.1".into(),
                ..ServerConfig::default()
            },
            router: RouterConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.openai.com/v1".into(),
                    auth: AuthConfig {
                        mode: AuthMode::ApiKey,
                        env: Some("OPENAI_API_KEY".into()),
                        ..AuthConfig::default()
                    },
                    default_model: None,
                }],
                ..RouterConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "server.port").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn no_providers_is_warning() {
        let mut cfg = valid_config();
        cfg.router.providers.clear();
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "router.providers").unwrap().severity,
            ConfigSeverity::Warning
        );
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = valid_config();
        let mut dup = cfg.router.providers[0].clone();
        dup.auth.env = Some("OPENAI_API_KEY_2".into());
        cfg.router.providers.push(dup);
        let issues = cfg.validate();
        let dup_issues: Vec<_> = issues
            .iter()
            .filter(|e| e.message.contains("duplicate provider id"))
            .collect();
        assert_eq!(dup_issues.len(), 1);
    }

    #[test]
    fn invalid_denied_pattern_is_error() {
        let mut cfg = valid_config();
        cfg.security.denied_patterns = vec![r"[invalid".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "security.denied_patterns[0]").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_config_deserializes_to_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 3210);
    }
}
