//! Error types for Tricast
//!
//! `PlatformError` is the closed taxonomy every adapter reports through. Raw
//! vendor failures are translated into it by [`crate::classify`] and never
//! escape an adapter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::types::PlatformKind;

pub type Result<T> = std::result::Result<T, TricastError>;

/// Result of a capability contract operation
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum TricastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TricastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TricastError::InvalidInput(_) => 3,
            TricastError::Platform(e) => e.exit_code(),
            TricastError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Discriminant of [`PlatformError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailed,
    PermissionDenied,
    RateLimited,
    QuotaExhausted,
    UnsupportedOperation,
    ValidationFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::QuotaExhausted => "quota_exhausted",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified platform failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    /// Invalid, missing or expired credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Valid credentials lacking the scope for the attempted action
    #[error("Permission denied: {message}")]
    PermissionDenied {
        message: String,
        remediation: Option<String>,
    },

    /// Transient throttling
    #[error("Rate limited until {}: {message}", rfc3339(.reset_at))]
    RateLimited {
        message: String,
        reset_at: DateTime<Utc>,
    },

    /// Billing or allocation exhaustion; waiting does not necessarily help
    #[error("Quota exhausted: {message}")]
    QuotaExhausted {
        message: String,
        reset_at: Option<DateTime<Utc>>,
    },

    /// The platform's API does not offer the action at all
    #[error("Unsupported operation: {} does not support {action}", platform_name(.platform))]
    UnsupportedOperation {
        platform: PlatformKind,
        action: String,
    },

    /// Caller input violates a precondition
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Unclassified vendor or transport failure
    #[error("Unknown error{}: {message}", http_status_suffix(.status))]
    Unknown {
        status: Option<u16>,
        message: String,
    },
}

fn rfc3339(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn platform_name(platform: &PlatformKind) -> &'static str {
    platform.display_name()
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}

impl PlatformError {
    pub fn unsupported(platform: PlatformKind, action: impl Into<String>) -> Self {
        PlatformError::UnsupportedOperation {
            platform,
            action: action.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            PlatformError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            PlatformError::RateLimited { .. } => ErrorKind::RateLimited,
            PlatformError::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            PlatformError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            PlatformError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            PlatformError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Only throttling is worth retrying after waiting
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::RateLimited { .. })
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PlatformError::RateLimited { reset_at, .. } => Some(*reset_at),
            PlatformError::QuotaExhausted { reset_at, .. } => *reset_at,
            _ => None,
        }
    }

    pub fn remediation(&self) -> Option<&str> {
        match self {
            PlatformError::PermissionDenied { remediation, .. } => remediation.as_deref(),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PlatformError::ValidationFailed(_) => 3,
            PlatformError::AuthenticationFailed(_) => 2,
            PlatformError::PermissionDenied { .. } => 4,
            PlatformError::RateLimited { .. } | PlatformError::QuotaExhausted { .. } => 5,
            PlatformError::UnsupportedOperation { .. } => 6,
            PlatformError::Unknown { .. } => 1,
        }
    }

    /// Serializable view for machine-readable output
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            PlatformError::AuthenticationFailed(m) | PlatformError::ValidationFailed(m) => m.clone(),
            PlatformError::PermissionDenied { message, .. }
            | PlatformError::RateLimited { message, .. }
            | PlatformError::QuotaExhausted { message, .. }
            | PlatformError::Unknown { message, .. } => message.clone(),
            PlatformError::UnsupportedOperation { .. } => self.to_string(),
        };

        ErrorReport {
            kind: self.kind(),
            message,
            remediation: self.remediation().map(str::to_string),
            reset_at: self.reset_at(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = TricastError::InvalidInput("Unknown platform".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_codes_per_kind() {
        let cases = [
            (PlatformError::AuthenticationFailed("x".to_string()), 2),
            (
                PlatformError::PermissionDenied {
                    message: "x".to_string(),
                    remediation: None,
                },
                4,
            ),
            (
                PlatformError::RateLimited {
                    message: "x".to_string(),
                    reset_at: Utc::now(),
                },
                5,
            ),
            (
                PlatformError::QuotaExhausted {
                    message: "x".to_string(),
                    reset_at: None,
                },
                5,
            ),
            (PlatformError::unsupported(PlatformKind::LinkedIn, "search"), 6),
            (PlatformError::ValidationFailed("x".to_string()), 3),
            (
                PlatformError::Unknown {
                    status: Some(500),
                    message: "x".to_string(),
                },
                1,
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.exit_code(), code, "{:?}", error);
            assert_eq!(TricastError::Platform(error).exit_code(), code);
        }
    }

    #[test]
    fn test_config_error_exit_code() {
        let error = TricastError::Config(ConfigError::MissingField("twitter.api_key".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_unsupported_names_platform_and_action() {
        let error = PlatformError::unsupported(PlatformKind::Instagram, "like");
        assert_eq!(
            error.to_string(),
            "Unsupported operation: Instagram does not support like"
        );
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_unknown_formatting() {
        let with_status = PlatformError::Unknown {
            status: Some(503),
            message: "upstream unavailable".to_string(),
        };
        assert_eq!(
            with_status.to_string(),
            "Unknown error (HTTP 503): upstream unavailable"
        );

        let without_status = PlatformError::Unknown {
            status: None,
            message: "request timed out".to_string(),
        };
        assert_eq!(without_status.to_string(), "Unknown error: request timed out");
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        let rate_limited = PlatformError::RateLimited {
            message: "slow down".to_string(),
            reset_at: Utc::now(),
        };
        assert!(rate_limited.is_retryable());

        let quota = PlatformError::QuotaExhausted {
            message: "no credits".to_string(),
            reset_at: None,
        };
        assert!(!quota.is_retryable());
        assert_eq!(quota.reset_at(), None);
    }

    #[test]
    fn test_platform_error_conversion() {
        let error: TricastError = PlatformError::ValidationFailed("empty".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Platform error: Validation failed: empty"
        );
    }

    #[test]
    fn test_report_carries_remediation() {
        let error = PlatformError::PermissionDenied {
            message: "Not enough permissions".to_string(),
            remediation: Some("Add the w_member_social scope".to_string()),
        };
        let report = error.report();
        assert_eq!(report.kind, ErrorKind::PermissionDenied);
        assert_eq!(report.message, "Not enough permissions");
        assert_eq!(
            report.remediation.as_deref(),
            Some("Add the w_member_social scope")
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "permission_denied");
        assert!(json.get("reset_at").is_none());
    }
}
