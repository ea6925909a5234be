use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - budget rates are positive
/// - nurture ladder and interval are sane
/// - orchestrator sleeps are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.budget.per_prospect_cost <= 0.0 {
        return Err(ConfigError::ValidationError(
            "budget.per_prospect_cost must be positive".to_string(),
        ));
    }
    if config.budget.raw_leads_per_dollar <= 0.0 {
        return Err(ConfigError::ValidationError(
            "budget.raw_leads_per_dollar must be positive".to_string(),
        ));
    }

    if config.nurture.max_steps < 1 {
        return Err(ConfigError::ValidationError(
            "nurture.max_steps must be at least 1".to_string(),
        ));
    }
    if config.nurture.step_interval_hours < 1 {
        return Err(ConfigError::ValidationError(
            "nurture.step_interval_hours must be at least 1".to_string(),
        ));
    }

    if config.orchestrator.min_sleep_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.min_sleep_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
