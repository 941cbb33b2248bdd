//! Error taxonomy for mail-service calls

use thiserror::Error;

/// Errors raised by a [`MailSource`](crate::email::MailSource).
///
/// Extraction never produces these: a field that cannot be recognized is
/// simply absent from the record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Consent was declined or the stored session could not be refreshed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The message disappeared between listing and fetch
    #[error("message {0} not found")]
    NotFound(String),

    /// Upstream throttling
    #[error("rate limited by mail service: {0}")]
    RateLimited(String),

    /// 5xx responses and transport failures
    #[error("transient mail service error: {0}")]
    Transient(String),

    /// The service answered but the payload could not be used
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl MailError {
    /// Whether the caller should retry the call with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::RateLimited(_) | MailError::Transient(_))
    }

    /// Map an HTTP status (plus the Google error `reason`, when known) onto the taxonomy
    pub fn from_status(code: u16, reason: Option<&str>, context: &str) -> Self {
        let detail = match reason {
            Some(reason) => format!("{} (HTTP {}, {})", context, code, reason),
            None => format!("{} (HTTP {})", context, code),
        };

        match code {
            401 => MailError::Auth(detail),
            403 => match reason {
                Some(r) if r.contains("RateLimitExceeded") || r.contains("rateLimitExceeded") => {
                    MailError::RateLimited(detail)
                }
                _ => MailError::Auth(detail),
            },
            404 | 410 => MailError::NotFound(context.to_string()),
            429 => MailError::RateLimited(detail),
            500..=599 => MailError::Transient(detail),
            _ => MailError::Malformed(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MailError::from_status(404, None, "abc"),
            MailError::NotFound("abc".to_string())
        );
        assert!(matches!(MailError::from_status(429, None, "abc"), MailError::RateLimited(_)));
        assert!(matches!(
            MailError::from_status(403, Some("userRateLimitExceeded"), "abc"),
            MailError::RateLimited(_)
        ));
        assert!(matches!(MailError::from_status(403, Some("forbidden"), "abc"), MailError::Auth(_)));
        assert!(matches!(MailError::from_status(401, None, "abc"), MailError::Auth(_)));
        assert!(matches!(MailError::from_status(503, None, "abc"), MailError::Transient(_)));
        assert!(matches!(MailError::from_status(400, None, "abc"), MailError::Malformed(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(MailError::RateLimited("x".into()).is_retryable());
        assert!(MailError::Transient("x".into()).is_retryable());
        assert!(!MailError::NotFound("x".into()).is_retryable());
        assert!(!MailError::Auth("x".into()).is_retryable());
    }
}
