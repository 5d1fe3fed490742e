//! Input validation shared by the messenger, the host and the bridge.

use crate::secret::SecretString;
use crate::{BridgeError, Result};

pub const MAX_DOMAIN_LEN: usize = 253;
pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_USERNAME_LEN: usize = 256;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Validate a hostname and return it normalized to lowercase without a
/// trailing dot.
pub fn validate_domain(domain: &str) -> Result<String> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(BridgeError::Validation("Domain required".to_string()));
    }
    if trimmed.len() > MAX_DOMAIN_LEN {
        return Err(BridgeError::Validation(format!(
            "Domain exceeds {} characters",
            MAX_DOMAIN_LEN
        )));
    }

    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(invalid_domain(domain));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid_domain(domain));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid_domain(domain));
        }
    }

    Ok(trimmed.to_ascii_lowercase())
}

fn invalid_domain(domain: &str) -> BridgeError {
    BridgeError::Validation(format!("Invalid domain: {}", domain))
}

/// Require a non-blank field, naming it in the error.
pub fn require<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(BridgeError::Validation(format!("{} required", field))),
    }
}

pub fn validate_username(username: &str) -> Result<()> {
    let username = require("Username", Some(username))?;
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(BridgeError::Validation(format!(
            "Username exceeds {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

pub fn validate_password(password: &SecretString) -> Result<()> {
    if password.is_empty() {
        return Err(BridgeError::Validation("Password required".to_string()));
    }
    if password.expose().chars().count() > MAX_PASSWORD_LEN {
        return Err(BridgeError::Validation(format!(
            "Password exceeds {} characters",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}
