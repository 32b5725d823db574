use crate::config::types::{
    Config, CrawlerConfig, FetcherConfig, RawConfig, StorageConfig, MAX_WINDOW_SECS,
};
use crate::url::normalize_url;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if let Some(seed) = &config.seed {
        validate_seed(seed)?;
    }
    validate_crawler_config(&config.crawler)?;
    validate_raw_config(&config.raw)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_storage_config(&config.storage)?;
    validate_resume_lease(&config.crawler, &config.fetcher)?;
    Ok(())
}

/// Validates a seed URL
pub fn validate_seed(seed: &str) -> Result<(), ConfigError> {
    normalize_url(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    // A zero window would make every settled task eligible again immediately
    if config.expiration_window < 1 {
        return Err(ConfigError::Validation(
            "expiration_window must be >= 1 second".to_string(),
        ));
    }

    if config.expiration_window > MAX_WINDOW_SECS {
        return Err(ConfigError::Validation(format!(
            "expiration_window must be <= {}s, got {}s",
            MAX_WINDOW_SECS, config.expiration_window
        )));
    }

    if config.max_tasks == Some(0) {
        return Err(ConfigError::Validation(
            "max_tasks must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates raw storage configuration
fn validate_raw_config(config: &RawConfig) -> Result<(), ConfigError> {
    if config.freshness_window > MAX_WINDOW_SECS {
        return Err(ConfigError::Validation(format!(
            "freshness_window must be <= {}s, got {}s",
            MAX_WINDOW_SECS, config.freshness_window
        )));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    if config.connect_timeout < 1 || config.connect_timeout > config.request_timeout {
        return Err(ConfigError::Validation(format!(
            "connect_timeout must be between 1s and request_timeout ({}s), got {}s",
            config.request_timeout, config.connect_timeout
        )));
    }

    Ok(())
}

/// Validates the resume lease against the fetcher timeout
///
/// A lease shorter than one fetch would let a second run take over a task
/// that is still being fetched.
fn validate_resume_lease(
    crawler: &CrawlerConfig,
    fetcher: &FetcherConfig,
) -> Result<(), ConfigError> {
    let Some(lease) = crawler.resume_lease else {
        return Ok(());
    };

    if lease < fetcher.request_timeout || lease > MAX_WINDOW_SECS {
        return Err(ConfigError::Validation(format!(
            "resume_lease must be between request_timeout ({}s) and {}s, got {}s",
            fetcher.request_timeout, MAX_WINDOW_SECS, lease
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
