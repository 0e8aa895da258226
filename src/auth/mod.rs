//! OAuth-style authorization grants.
//!
//! Four grant flows produce a populated token session:
//!
//! | Grant | Endpoint |
//! |-------|----------|
//! | [`Grant::AuthorizationCode`] | `POST https://connect.mail.ru/oauth/token` |
//! | [`Grant::Password`] | `POST https://appsmail.ru/oauth/token` |
//! | [`Grant::RefreshToken`] | `POST https://appsmail.ru/oauth/token` |
//! | [`ImplicitFlow`](implicit::ImplicitFlow) | interactive HTML flow against the authorize dialog |
//!
//! The first three are one-shot form POSTs handled by [`Grant::negotiate`];
//! the implicit flow drives the server-rendered login UI (see [`implicit`]).
//! Negotiators never suppress failures: an authorization error is always
//! fatal to the attempt.

// ============================================================================
// Modules
// ============================================================================

/// HTML form extraction.
pub mod form;

/// Interactive (implicit) authorization flow.
pub mod implicit;

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Token endpoint for the authorization-code grant.
pub const CONNECT_TOKEN_URL: &str = "https://connect.mail.ru/oauth/token";

/// Token endpoint for the password and refresh-token grants.
pub const APPS_TOKEN_URL: &str = "https://appsmail.ru/oauth/token";

/// Authorize dialog endpoint used by the implicit flow.
pub const AUTHORIZE_URL: &str = "https://connect.mail.ru/oauth/authorize";

/// All permissions the platform knows about.
pub const PRIVILEGES: [&str; 5] = ["photos", "guestbook", "stream", "messages", "events"];

/// Returns the full permission scope.
#[must_use]
pub fn full_scope() -> String {
    PRIVILEGES.join(" ")
}

// ============================================================================
// GrantResult
// ============================================================================

/// The outcome of a successful grant negotiation.
///
/// Created once per authorization attempt and immutable afterwards; a
/// refresh produces a new result superseding the old access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResult {
    /// Access token (`session_key` on the wire).
    pub access_token: String,

    /// Refresh token for renewing the access token.
    pub refresh_token: String,

    /// Token lifetime in seconds.
    pub expires_in: u64,

    /// User id (`x_mailru_vid`).
    pub uid: String,
}

impl GrantResult {
    /// Builds a grant result from a token endpoint response body.
    ///
    /// # Errors
    ///
    /// - [`Error::OAuth`] for an error-bearing body
    /// - [`Error::TokenFieldMissing`] when `access_token` or
    ///   `refresh_token` is absent
    pub(crate) fn from_response(body: &Value) -> Result<Self> {
        if let Some(oauth_error) = body.get("error").and_then(Value::as_str) {
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or("");
            return Err(Error::oauth(oauth_error, description));
        }

        let access_token = required_field(body, "access_token")?;
        let refresh_token = required_field(body, "refresh_token")?;

        let expires_in = match body.get("expires_in") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };

        let uid = match body.get("x_mailru_vid") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        Ok(Self {
            access_token,
            refresh_token,
            expires_in,
            uid,
        })
    }
}

fn required_field(body: &Value, field: &str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::token_field_missing(field))
}

// ============================================================================
// Grant
// ============================================================================

/// A one-shot grant negotiation strategy.
///
/// Each variant is a constructor-parameter preset over the same token
/// exchange, not a separate session type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Exchange an authorization code for an access token.
    AuthorizationCode {
        /// The authorization code.
        code: String,
        /// Redirect URI registered with the application.
        redirect_uri: String,
    },

    /// Exchange user credentials for an access token.
    Password {
        /// User e-mail.
        email: String,
        /// User password.
        password: String,
        /// Requested scope; empty means [`full_scope`].
        scope: String,
    },

    /// Exchange a refresh token for a new access token.
    RefreshToken {
        /// The refresh token.
        refresh_token: String,
    },
}

// ============================================================================
// Grant - Constructors
// ============================================================================

impl Grant {
    /// Creates an authorization-code grant.
    #[inline]
    #[must_use]
    pub fn authorization_code(code: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self::AuthorizationCode {
            code: code.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Creates a password grant.
    #[inline]
    #[must_use]
    pub fn password(
        email: impl Into<String>,
        password: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::Password {
            email: email.into(),
            password: password.into(),
            scope: scope.into(),
        }
    }

    /// Creates a refresh-token grant.
    #[inline]
    #[must_use]
    pub fn refresh_token(refresh_token: impl Into<String>) -> Self {
        Self::RefreshToken {
            refresh_token: refresh_token.into(),
        }
    }
}

// ============================================================================
// Grant - Negotiation
// ============================================================================

impl Grant {
    /// Returns the token endpoint for this grant.
    #[must_use]
    pub fn token_url(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => CONNECT_TOKEN_URL,
            Self::Password { .. } | Self::RefreshToken { .. } => APPS_TOKEN_URL,
        }
    }

    /// Returns the grant type name, as it appears on the wire.
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::Password { .. } => "password",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Builds the form body for the token request.
    fn form(&self, app_id: &str, client_secret: &str) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("grant_type", self.grant_type().to_owned()),
            ("client_id", app_id.to_owned()),
            ("client_secret", client_secret.to_owned()),
        ];

        match self {
            Self::AuthorizationCode { code, redirect_uri } => {
                fields.push(("redirect_uri", redirect_uri.clone()));
                fields.push(("code", code.clone()));
            }
            Self::Password {
                email,
                password,
                scope,
            } => {
                fields.push(("username", email.clone()));
                fields.push(("password", password.clone()));
                let scope = if scope.is_empty() {
                    full_scope()
                } else {
                    scope.clone()
                };
                fields.push(("scope", scope));
            }
            Self::RefreshToken { refresh_token } => {
                fields.push(("refresh_token", refresh_token.clone()));
            }
        }

        fields
    }

    /// Performs the token exchange.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] for transport failures
    /// - [`Error::Status`] for a non-success status without a JSON body
    /// - [`Error::OAuth`] / [`Error::TokenFieldMissing`] for error-bearing
    ///   or incomplete responses
    pub async fn negotiate(
        &self,
        http: &reqwest::Client,
        app_id: &str,
        client_secret: &str,
    ) -> Result<GrantResult> {
        self.negotiate_at(http, self.token_url(), app_id, client_secret)
            .await
    }

    /// Performs the token exchange against an explicit endpoint.
    pub(crate) async fn negotiate_at(
        &self,
        http: &reqwest::Client,
        token_url: &str,
        app_id: &str,
        client_secret: &str,
    ) -> Result<GrantResult> {
        debug!(grant = self.grant_type(), url = token_url, "negotiating grant");

        let response = http
            .post(token_url)
            .form(&self.form(app_id, client_secret))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => GrantResult::from_response(&body),
            Err(_) if !status.is_success() => {
                error!(grant = self.grant_type(), status = status.as_u16(), "token exchange failed");
                Err(Error::status(status.as_u16(), text))
            }
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
