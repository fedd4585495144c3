//! Custom validation functions for configuration.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref ENDPOINT_RE: Regex =
        Regex::new(r"(?i)^https?://[^\s/?#]+[^\s]*$").expect("endpoint pattern is valid");
}

/// Every endpoint must be an absolute `http://` or `https://` URL.
pub fn validate_endpoints(endpoints: &[String]) -> Result<(), ValidationError> {
    if endpoints.iter().all(|e| ENDPOINT_RE.is_match(e)) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_endpoint_url"))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_need_http_scheme_and_host() {
        assert!(validate_endpoints(&["https://api.local/macs".into()]).is_ok());
        assert!(validate_endpoints(&["HTTP://10.0.0.2:8080".into()]).is_ok());
        assert!(validate_endpoints(&["ftp://files".into()]).is_err());
        assert!(validate_endpoints(&["https://".into()]).is_err());
        assert!(validate_endpoints(&["https://ok".into(), "bad url".into()]).is_err());
    }

    #[test]
    fn log_levels() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
