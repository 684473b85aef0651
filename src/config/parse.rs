use super::types::*;
use crate::config::expand_env_vars;
use crate::record::TRUNCATION_MARKER;
use regex::Regex;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(err) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), err),
        )),
        other => other,
    })?;

    Ok(config)
}

/// Parses and validates a config from a YAML string, expanding `$env{VAR}` first.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let config: Config = serde_yaml::from_str(&yaml_string)?;
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    // Comment lines never reach serde, so placeholders in them don't matter
    let mut unexpanded_vars: Vec<String> = yaml_string
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| re.captures_iter(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.destination.group_name.trim().is_empty() {
        errors.push("destination.group_name cannot be empty".to_string());
    }

    if let Some(stream) = &config.destination.stream_name {
        if stream.trim().is_empty() {
            errors.push(
                "destination.stream_name cannot be empty (omit it to use the host name)"
                    .to_string(),
            );
        }
    }

    if config.batch.size == 0 || config.batch.size > MAX_BATCH_SIZE {
        errors.push(format!(
            "batch.size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch.size
        ));
    }

    if config.batch.period.is_zero() {
        errors.push("batch.period must be greater than zero".to_string());
    }

    if config.batch.max_attempts == 0 {
        errors.push("batch.max_attempts must be at least 1".to_string());
    }

    if config.buffer.capacity == Some(0) {
        errors.push(
            "buffer.capacity must be at least 1 (omit it for an unbounded buffer)".to_string(),
        );
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if config.max_message_length > 0 && config.max_message_length < marker_len {
        errors.push(format!(
            "max_message_length must be 0 (disabled) or at least {}, got {}",
            marker_len, config.max_message_length
        ));
    }

    if let Some(endpoint) = &config.endpoint {
        if endpoint.url.trim().is_empty() {
            errors.push("endpoint.url cannot be empty".to_string());
        } else if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
            errors.push(format!(
                "endpoint.url must start with http:// or https://, got '{}'",
                endpoint.url
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
