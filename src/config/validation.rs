//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use super::defaults::{MIN_LOGIN_TOKEN_EXPIRE, MIN_TOKEN_EXPIRE};
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("auth.token_expire must be at least {min} seconds, got {got}")]
    TokenExpireTooShort { got: u64, min: u64 },
    #[error("auth.login_token_expire must be at least {min} seconds, got {got}")]
    LoginTokenExpireTooShort { got: u64, min: u64 },
    #[error("auth.admin.username is required when admin bootstrap is enabled")]
    MissingAdminUsername,
    #[error("auth.admin.password is required when admin bootstrap is enabled")]
    MissingAdminPassword,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.token_expire < MIN_TOKEN_EXPIRE {
        errors.push(ValidationError::TokenExpireTooShort {
            got: config.auth.token_expire,
            min: MIN_TOKEN_EXPIRE,
        });
    }
    if config.auth.login_token_expire < MIN_LOGIN_TOKEN_EXPIRE {
        errors.push(ValidationError::LoginTokenExpireTooShort {
            got: config.auth.login_token_expire,
            min: MIN_LOGIN_TOKEN_EXPIRE,
        });
    }

    let admin = &config.auth.admin;
    if admin.enabled {
        if admin.username.trim().is_empty() {
            errors.push(ValidationError::MissingAdminUsername);
        }
        if admin.password.is_empty() {
            errors.push(ValidationError::MissingAdminPassword);
        }
    }

    // Database path validation
    let db_path = Path::new(&config.database.path);
    if config.database.path != ":memory:"
        && let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            config.database.path.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[listen]
address = "127.0.0.1:5140"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_short_lifetimes_fail() {
        let toml = r#"
[listen]
address = "127.0.0.1:5140"

[auth]
token_expire = 60
login_token_expire = 5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::TokenExpireTooShort { got: 60, min: 3600 }
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::LoginTokenExpireTooShort { got: 5, min: 60 }
        )));
    }

    #[test]
    fn test_minimum_lifetimes_pass() {
        let toml = r#"
[listen]
address = "127.0.0.1:5140"

[auth]
token_expire = 3600
login_token_expire = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_enabled_admin_needs_credentials() {
        let toml = r#"
[listen]
address = "127.0.0.1:5140"

[auth.admin]
enabled = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingAdminUsername)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingAdminPassword)));
    }

    #[test]
    fn test_missing_database_dir_fails() {
        let toml = r#"
[listen]
address = "127.0.0.1:5140"

[database]
path = "/nonexistent/dir/slauth.db"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DatabasePathInvalid(_))));
    }
}
