use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("PROSPECTOR_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[database]
crm_path = "/data/crm.db"

[orchestrator]
cycle_target_secs = 120
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.database.crm_path.to_str(), Some("/data/crm.db"));
        assert_eq!(config.orchestrator.cycle_target_secs, 120);
        // Untouched sections keep their defaults.
        assert_eq!(config.budget.per_prospect_cost, 4.0);
        assert_eq!(config.nurture.max_steps, 7);
    }

    #[test]
    fn test_load_config_from_str_empty_is_all_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.billing.grace_days, 5);
        assert_eq!(config.capacity.quota_ban_offset, 500);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[billing]
grace_days = 10

[nurture]
step_interval_hours = 24
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.billing.grace_days, 10);
        assert_eq!(config.nurture.step_interval_hours, 24);
    }
}
