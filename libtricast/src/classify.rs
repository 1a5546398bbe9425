//! Vendor failure classification
//!
//! Each adapter parses its vendor's error body into a [`VendorFailure`] and
//! hands it, together with a per-platform rule table, to [`classify`]. The
//! result is exactly one [`PlatformError`].
//!
//! The four statuses with a fixed meaning (401, 402, 403, 429) always map to
//! the same kind regardless of the table; rules can only refine the message
//! for those. Every other status is decided by the first matching rule, then
//! by a small status baseline, and finally falls through to `Unknown`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, PlatformError};
use crate::http::{HttpResponse, TransportError};
use crate::types::PlatformKind;

/// Fallback throttling window when the vendor does not say when to come back
pub const DEFAULT_RATE_LIMIT_WINDOW_MINUTES: i64 = 15;

/// A vendor failure reduced to the fields classification looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorFailure {
    pub status: u16,
    /// Machine-readable markers found in the body (problem titles, numeric
    /// codes, subcodes, service error codes)
    pub codes: Vec<String>,
    /// Human-readable vendor message
    pub message: String,
    /// Reset time from vendor headers, when supplied
    pub reset_at: Option<DateTime<Utc>>,
    /// Remediation derived from the payload itself
    pub remediation: Option<String>,
}

impl VendorFailure {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        if !code.is_empty() && !self.codes.contains(&code) {
            self.codes.push(code);
        }
        self
    }

    fn has_code(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c.eq_ignore_ascii_case(code))
    }
}

/// One row of a platform's classification table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRule {
    pub status: Option<u16>,
    pub code: Option<&'static str>,
    pub kind: ErrorKind,
    pub hint: &'static str,
}

impl ErrorRule {
    /// Match on a vendor code regardless of status
    pub const fn code(code: &'static str, kind: ErrorKind, hint: &'static str) -> Self {
        Self {
            status: None,
            code: Some(code),
            kind,
            hint,
        }
    }

    /// Match on a status regardless of body
    pub const fn status(status: u16, kind: ErrorKind, hint: &'static str) -> Self {
        Self {
            status: Some(status),
            code: None,
            kind,
            hint,
        }
    }

    fn matches(&self, failure: &VendorFailure) -> bool {
        let status_ok = self.status.map_or(true, |s| s == failure.status);
        let code_ok = self.code.map_or(true, |c| failure.has_code(c));
        status_ok && code_ok
    }
}

/// Kinds that are fully determined by the HTTP status
fn fixed_kind(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::AuthenticationFailed),
        402 => Some(ErrorKind::QuotaExhausted),
        403 => Some(ErrorKind::PermissionDenied),
        429 => Some(ErrorKind::RateLimited),
        _ => None,
    }
}

fn baseline_kind(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::ValidationFailed,
        _ => ErrorKind::Unknown,
    }
}

/// Translate a vendor failure into the taxonomy
pub fn classify(
    platform: PlatformKind,
    rules: &[ErrorRule],
    failure: &VendorFailure,
) -> PlatformError {
    let rule = rules.iter().find(|rule| rule.matches(failure));

    let kind = match (fixed_kind(failure.status), rule) {
        (Some(kind), _) => kind,
        (None, Some(rule)) => rule.kind,
        (None, None) => baseline_kind(failure.status),
    };

    // A rule for a different kind only contributes its hint when it agrees
    let hint = rule.filter(|r| r.kind == kind).map(|r| r.hint);
    let name = platform.display_name();
    let vendor_message = if failure.message.trim().is_empty() {
        format!("HTTP {}", failure.status)
    } else {
        failure.message.trim().to_string()
    };

    match kind {
        ErrorKind::AuthenticationFailed => PlatformError::AuthenticationFailed(with_hint(
            format!("{} rejected the credentials: {}", name, vendor_message),
            hint.or(Some("Check the configured token and re-authenticate.")),
        )),
        ErrorKind::PermissionDenied => PlatformError::PermissionDenied {
            message: format!("{}: {}", name, vendor_message),
            remediation: failure
                .remediation
                .clone()
                .or_else(|| hint.map(str::to_string)),
        },
        ErrorKind::RateLimited => PlatformError::RateLimited {
            message: with_hint(format!("{} rate limit: {}", name, vendor_message), hint),
            reset_at: failure
                .reset_at
                .unwrap_or_else(|| Utc::now() + Duration::minutes(DEFAULT_RATE_LIMIT_WINDOW_MINUTES)),
        },
        ErrorKind::QuotaExhausted => PlatformError::QuotaExhausted {
            message: with_hint(
                format!("{}: {}", name, vendor_message),
                hint.or(Some(
                    "The account's API quota or billing allocation is exhausted. \
                     Check the plan and billing settings in the developer portal.",
                )),
            ),
            reset_at: failure.reset_at,
        },
        ErrorKind::ValidationFailed => PlatformError::ValidationFailed(with_hint(
            format!("{} rejected the request: {}", name, vendor_message),
            hint,
        )),
        ErrorKind::UnsupportedOperation => PlatformError::unsupported(platform, vendor_message),
        ErrorKind::Unknown => PlatformError::Unknown {
            status: Some(failure.status),
            message: format!("{}: {}", name, vendor_message),
        },
    }
}

fn with_hint(message: String, hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!("{}. {}", message.trim_end_matches('.'), hint),
        None => message,
    }
}

/// Network-level failures never reached the vendor's error vocabulary
pub fn classify_transport(platform: PlatformKind, error: &TransportError) -> PlatformError {
    PlatformError::Unknown {
        status: None,
        message: format!("{} request failed: {}", platform.display_name(), error),
    }
}

/// Decode a successful vendor body; a shape we do not recognise is `Unknown`
pub fn decode<T: DeserializeOwned>(
    platform: PlatformKind,
    response: &HttpResponse,
) -> Result<T, PlatformError> {
    response.json().map_err(|e| PlatformError::Unknown {
        status: Some(response.status),
        message: format!("Unexpected {} response: {}", platform.display_name(), e),
    })
}

/// Parse an epoch-seconds header such as `x-rate-limit-reset`
pub fn epoch_header(response: &HttpResponse, name: &str) -> Option<DateTime<Utc>> {
    let secs = response.header(name)?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Parse a `retry-after` header given in seconds
///
/// Values too large to represent are ignored so the caller's default applies.
pub fn retry_after(response: &HttpResponse) -> Option<DateTime<Utc>> {
    let secs = response.header("retry-after")?.trim().parse::<i64>().ok()?;
    Utc::now().checked_add_signed(Duration::try_seconds(secs)?)
}
