//! `agentd config` subcommands.

use sa_domain::config::{Config, ConfigSeverity};

/// Print every validation issue. Returns `false` when any is an error.
pub fn validate(config: &Config, source: &std::path::Path) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{}: OK", source.display());
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

/// Dump the resolved configuration (defaults applied) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
