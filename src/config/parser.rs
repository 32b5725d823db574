use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates the configuration file at `path`
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use driftnet::config::load_config;
///
/// let config = load_config(Path::new("driftnet.toml")).unwrap();
/// println!("Crawling into {}", config.storage.database_path.display());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&read_source(path)?)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of the configuration file at `path`
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(source_hash(&read_source(path)?))
}

/// Loads a configuration together with the hash of the exact bytes parsed
///
/// The file is read once, so the logged hash always describes the
/// configuration the crawl actually ran with.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let source = read_source(path)?;
    let config = parse_config(&source)?;
    Ok((config, source_hash(&source)))
}

fn read_source(path: &Path) -> Result<String, ConfigError> {
    Ok(std::fs::read_to_string(path)?)
}

fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}
