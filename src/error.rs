//! Error types for the Platform@Mail.Ru client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use mailru_api::{Result, Error};
//!
//! async fn example(api: &Api) -> Result<()> {
//!     let friends = api.call("friends.get", Params::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`], [`Error::UndefinedCircuit`] |
//! | Transport | [`Error::Http`], [`Error::Status`] |
//! | OAuth | [`Error::OAuth`], [`Error::TokenFieldMissing`], [`Error::InvalidGrant`], [`Error::InvalidClient`], [`Error::InvalidUser`], [`Error::ClientNotAvailable`], [`Error::LoginAttemptsExceeded`] |
//! | API | [`Error::Api`] and the empty-result sentinels |
//! | Scraper | [`Error::Scraper`], [`Error::EmptyCookieJar`], [`Error::PaginationStalled`] |
//! | External | [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. API-compatible
/// error codes (the remote platform's `error_code` values) are exposed
/// through [`Error::api_code`].
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to a method.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Signature circuit is undefined.
    ///
    /// Returned when a request must be signed but neither credential set is
    /// populated. Set `uid` and `private_key` for the client-server circuit,
    /// or `secret_key` for the server-server circuit.
    #[error(
        "Signature circuit undefined: \
         set `uid` and `private_key` for the client-server circuit, \
         or `secret_key` for the server-server circuit"
    )]
    UndefinedCircuit,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// HTTP status error.
    ///
    /// Returned for a non-success HTTP status when `raise_for_status`
    /// is enabled (the default).
    #[error("HTTP status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    // ========================================================================
    // OAuth Errors
    // ========================================================================
    /// OAuth error returned by the authorization server.
    #[error("OAuth error `{error}`: {description}")]
    OAuth {
        /// Machine-readable error code.
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// Authorization response is missing a required token field.
    #[error("authorization response missing `{field}`")]
    TokenFieldMissing {
        /// Name of the missing field.
        field: String,
    },

    /// Invalid user credentials.
    #[error("invalid_grant: invalid login or password")]
    InvalidGrant,

    /// Invalid client id.
    #[error("invalid_client: invalid client id")]
    InvalidClient,

    /// User is blocked.
    #[error("invalid_user: user is blocked")]
    InvalidUser,

    /// Application is not available (in test mode).
    #[error("client_not_available: application is in the test mode")]
    ClientNotAvailable,

    /// Interactive login retries exhausted.
    #[error("login attempts exceeded after {attempts} tries")]
    LoginAttemptsExceeded {
        /// Number of attempts made.
        attempts: u32,
    },

    // ========================================================================
    // API Errors
    // ========================================================================
    /// Remote method call returned an error object.
    ///
    /// Both observed body shapes map here: `{"error": {"error_code": ...,
    /// "error_msg": ...}}` and the bare `{"error_code": ..., "error_msg": ...}`.
    #[error("API error {code}: {message}")]
    Api {
        /// Numeric error code from the platform.
        code: i64,
        /// Human-readable error message.
        message: String,
    },

    /// Empty response from the platform.
    #[error("API error -1: empty response")]
    EmptyResponse,

    /// Every object in a fan-out call failed to resolve.
    #[error("API error 202: empty objects")]
    EmptyObjects,

    /// Every community in a fan-out call failed to resolve.
    #[error("API error 202: empty groups")]
    EmptyGroups,

    /// Access to the requested object is denied.
    #[error("API error 202: Access to this object is denied")]
    AccessDenied,

    /// Access denied because the caller is blacklisted.
    #[error("API error 202: Access to this object is denied: you are in blacklist")]
    Blacklisted,

    // ========================================================================
    // Scraper Errors
    // ========================================================================
    /// DOM/UI expectation not met.
    ///
    /// Returned when the scraped page does not match the expected markup,
    /// signaling a UI contract break rather than a data condition.
    #[error("Scraper error: {message}")]
    Scraper {
        /// Description of the markup mismatch.
        message: String,
    },

    /// Authenticated scrape attempted with no cookies set.
    ///
    /// Raised before any navigation happens.
    #[error("cookie jar is empty")]
    EmptyCookieJar,

    /// A bounded polling loop exhausted its attempt budget.
    #[error("{operation} stalled after {attempts} attempts")]
    PaginationStalled {
        /// Description of the operation that stalled.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP client error (network failure, protocol violation).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates an OAuth error.
    #[inline]
    pub fn oauth(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Creates a missing token field error.
    #[inline]
    pub fn token_field_missing(field: impl Into<String>) -> Self {
        Self::TokenFieldMissing {
            field: field.into(),
        }
    }

    /// Creates a login attempts exceeded error.
    #[inline]
    pub fn login_attempts_exceeded(attempts: u32) -> Self {
        Self::LoginAttemptsExceeded { attempts }
    }

    /// Creates an API error.
    #[inline]
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Creates a scraper error.
    #[inline]
    pub fn scraper(message: impl Into<String>) -> Self {
        Self::Scraper {
            message: message.into(),
        }
    }

    /// Creates a pagination stalled error.
    #[inline]
    pub fn pagination_stalled(operation: impl Into<String>, attempts: u32) -> Self {
        Self::PaginationStalled {
            operation: operation.into(),
            attempts,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the platform-compatible `error_code` for API errors.
    ///
    /// The empty-result sentinels carry the fixed codes the platform uses
    /// for the equivalent conditions.
    #[must_use]
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::EmptyResponse => Some(-1),
            Self::EmptyObjects | Self::EmptyGroups | Self::AccessDenied | Self::Blacklisted => {
                Some(202)
            }
            _ => None,
        }
    }

    /// Returns `true` if this is an API-level error.
    #[inline]
    #[must_use]
    pub fn is_api_error(&self) -> bool {
        self.api_code().is_some()
    }

    /// Returns `true` if this is an authorization error.
    #[inline]
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::OAuth { .. }
                | Self::TokenFieldMissing { .. }
                | Self::InvalidGrant
                | Self::InvalidClient
                | Self::InvalidUser
                | Self::ClientNotAvailable
                | Self::LoginAttemptsExceeded { .. }
        )
    }

    /// Returns `true` if this authorization outcome is terminal.
    ///
    /// The interactive login flow retries transient failures (markup or
    /// transport oddities) but never these.
    #[inline]
    #[must_use]
    pub fn is_fatal_auth(&self) -> bool {
        matches!(
            self,
            Self::OAuth { .. }
                | Self::TokenFieldMissing { .. }
                | Self::InvalidGrant
                | Self::InvalidClient
                | Self::InvalidUser
                | Self::ClientNotAvailable
                | Self::Status { .. }
        )
    }

    /// Returns `true` if this is a scraper-layer error.
    #[inline]
    #[must_use]
    pub fn is_scraper_error(&self) -> bool {
        matches!(
            self,
            Self::Scraper { .. } | Self::EmptyCookieJar | Self::PaginationStalled { .. }
        )
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
