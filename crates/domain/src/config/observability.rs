use serde::{Deserialize, Serialize};

/// Logging configuration. No exporter toggle beyond format/level —
/// `tracing-subscriber`'s `EnvFilter` still takes `RUST_LOG` at
/// startup regardless of what's configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "d_level")]
    pub level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: d_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn d_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_json() {
        assert_eq!(ObservabilityConfig::default().format, LogFormat::Json);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.level, "info");
    }
}
