use std::sync::Arc;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while reading or writing cookies.
///
/// None of these ever reach an HTTP client: the A/B handlers log them and fall back to a
/// default assignment.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The named cookie is not present on the request.
    #[error("could not find {0} cookie")]
    CookieNotFound(String),

    /// A cookie value could not be URL-unescaped.
    #[error("invalid URL escape in cookie value {0:?}")]
    InvalidEscape(String),

    /// A cookie value was unescaped but is not the expected JSON.
    #[error("invalid JSON in cookie value")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    InvalidJson(#[source] Arc<serde_json::Error>),

    /// A timestamp did not match the cookie time format.
    #[error("invalid date string ({value:?}): {reason}")]
    InvalidCookieTime {
        /// The rejected input.
        value: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The a/b test cookie is readable, but the entry for this test is not an assignment window.
    #[error("invalid a/b test assignment for {test_id:?}")]
    InvalidAssignment {
        /// Test whose entry failed to parse.
        test_id: String,
    },

    /// A rendered cookie cannot be carried in an HTTP header.
    #[error("cookie {0:?} is not a valid header value")]
    InvalidHeaderValue(String),

    /// Encoding a cookie payload as JSON failed.
    #[error("error encoding cookie payload")]
    Serialize(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// `true` for failures to decode an existing cookie, as opposed to the cookie being absent or
    /// a failure to write one.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidEscape(_)
                | Error::InvalidJson(_)
                | Error::InvalidCookieTime { .. }
                | Error::InvalidAssignment { .. }
        )
    }
}
