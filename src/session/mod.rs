//! Session: the authenticated request pipeline.
//!
//! A [`Session`] owns the HTTP client, the [`Credentials`], and the error
//! policy, and performs the signed round trip behind every API call:
//!
//! 1. drop falsy caller parameters,
//! 2. merge the required parameters (`app_id`, `session_key`, `secure`),
//! 3. compute the `sig` parameter ([`signature`]),
//! 4. GET the endpoint and map the outcome to a result.
//!
//! One configuration struct replaces a hierarchy of session classes: which
//! circuit a session signs with follows from which credential fields are
//! populated, and unauthenticated (public) requests skip signing entirely.
//!
//! # Error Policy
//!
//! A JSON body carrying an error object always wins over the HTTP status:
//! it maps to [`Error::Api`] unless `pass_error` is set, in which case the
//! raw body is returned as data. A non-success status without an error body
//! maps to [`Error::Status`] unless `raise_for_status` is disabled.

// ============================================================================
// Modules
// ============================================================================

/// Cookie model shared between the HTTP client and the browser.
pub mod cookies;

/// Request signature engine.
pub mod signature;

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::auth::{Grant, GrantResult};
use crate::error::{Error, Result};
use crate::params::Params;

use cookies::Cookie;
use signature::{Credentials, SignatureCircuit};

// ============================================================================
// Constants
// ============================================================================

/// Default platform base URL.
pub const DEFAULT_BASE_URL: &str = "http://appsmail.ru/platform";

/// Path segment of the authenticated endpoint under the base URL.
const API_SEGMENT: &str = "api";

// ============================================================================
// Session
// ============================================================================

/// A session against the Platform@Mail.Ru REST API.
///
/// Credentials sit behind a lock so they can be rotated between calls
/// (e.g. after a token refresh); the signature circuit is re-derived on
/// every request.
///
/// # Example
///
/// ```no_run
/// use mailru_api::{Credentials, Params, Session};
///
/// # async fn example() -> mailru_api::Result<()> {
/// let session = Session::token(Credentials::server_server(
///     "423004",
///     "secret key",
///     "access token",
/// ))?;
///
/// let friends = session
///     .request_signed(&Params::new().set("method", "friends.get"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    /// HTTP client (redirects followed, cookie store enabled).
    http: reqwest::Client,

    /// Platform base URL.
    base_url: Url,

    /// Credentials; mutable between calls.
    credentials: RwLock<Credentials>,

    /// Cookies captured during authorization, for the scraper layer.
    cookies: RwLock<Vec<Cookie>>,

    /// Return API error bodies as data instead of raising.
    pass_error: bool,

    /// Raise on non-success HTTP status.
    raise_for_status: bool,
}

// ============================================================================
// Session - Constructors
// ============================================================================

impl Session {
    /// Creates a builder with default configuration.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a session for public (unauthenticated) API methods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be constructed.
    pub fn public() -> Result<Self> {
        Self::builder().build()
    }

    /// Creates a session for authorized requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be constructed.
    pub fn token(credentials: Credentials) -> Result<Self> {
        Self::builder().credentials(credentials).build()
    }
}

// ============================================================================
// Session - State
// ============================================================================

impl Session {
    /// Returns a copy of the current credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        self.credentials.read().clone()
    }

    /// Replaces the credentials.
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write() = credentials;
    }

    /// Returns the current access token.
    #[must_use]
    pub fn session_key(&self) -> String {
        self.credentials.read().access_token.clone()
    }

    /// Returns a copy of the stored cookies.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.read().clone()
    }

    /// Returns `true` when any cookies are stored.
    #[must_use]
    pub fn has_cookies(&self) -> bool {
        !self.cookies.read().is_empty()
    }

    /// Adds cookies to the session store.
    pub fn adopt_cookies(&self, cookies: Vec<Cookie>) {
        self.cookies.write().extend(cookies);
    }

    /// Returns `true` when API error bodies are returned as data.
    #[inline]
    #[must_use]
    pub fn pass_error(&self) -> bool {
        self.pass_error
    }
}

// ============================================================================
// Session - Authorization
// ============================================================================

impl Session {
    /// Performs a grant negotiation and adopts the result.
    ///
    /// # Errors
    ///
    /// Propagates the negotiation outcome; see [`Grant::negotiate`].
    pub async fn authorize(&self, grant: &Grant) -> Result<GrantResult> {
        let (app_id, secret) = {
            let credentials = self.credentials.read();
            (credentials.app_id.clone(), credentials.secret_key.clone())
        };

        let result = grant.negotiate(&self.http, &app_id, &secret).await?;
        self.adopt(&result);
        Ok(result)
    }

    /// Populates the credentials from a grant result.
    pub fn adopt(&self, grant: &GrantResult) {
        let mut credentials = self.credentials.write();
        credentials.access_token = grant.access_token.clone();
        if !grant.uid.is_empty() {
            credentials.uid = grant.uid.clone();
        }
        debug!(uid = %credentials.uid, "adopted grant result");
    }
}

// ============================================================================
// Session - Signing
// ============================================================================

impl Session {
    /// Returns the parameters every authorized request must carry.
    ///
    /// `secure=1` is added for the server-server circuit.
    #[must_use]
    pub fn required_params(&self) -> BTreeMap<String, String> {
        let credentials = self.credentials.read();
        let mut params = BTreeMap::new();
        params.insert("app_id".to_owned(), credentials.app_id.clone());
        params.insert("session_key".to_owned(), credentials.access_token.clone());
        if credentials.circuit() == SignatureCircuit::ServerServer {
            params.insert("secure".to_owned(), "1".to_owned());
        }
        params
    }

    /// Signs a rendered query under the current credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedCircuit`] when no credential set is
    /// populated.
    pub fn sign_params(&self, query: &BTreeMap<String, String>) -> Result<String> {
        signature::sign(query, &self.credentials.read())
    }
}

// ============================================================================
// Session - Requests
// ============================================================================

impl Session {
    /// Requests public data.
    ///
    /// Sends an unauthenticated GET to `{base}/{path segments}`.
    ///
    /// # Errors
    ///
    /// See the error policy in the module docs.
    pub async fn request(&self, path: &[&str], params: &Params) -> Result<Value> {
        self.execute(path, params.to_query()).await
    }

    /// Requests authorized data.
    ///
    /// Merges the caller parameters with the required parameters, drops
    /// falsy values, signs the query, and GETs the authenticated endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedCircuit`] when signing is impossible;
    /// otherwise see the error policy in the module docs.
    pub async fn request_signed(&self, params: &Params) -> Result<Value> {
        let mut query = params.to_query();
        query.extend(self.required_params());

        let sig = self.sign_params(&query)?;
        query.insert("sig".to_owned(), sig);

        self.execute(&[API_SEGMENT], query).await
    }

    /// Performs the GET round trip and maps the outcome.
    async fn execute(&self, path: &[&str], query: BTreeMap<String, String>) -> Result<Value> {
        let url = self.endpoint(path)?;

        let response = match self.http.get(url.clone()).query(&query).send().await {
            Ok(response) => response,
            Err(err) => {
                error!(url = %url, error = %err, "GET request failed");
                return Err(err.into());
            }
        };

        let status = response.status();
        info!(url = %response.url(), status = status.as_u16(), "GET");

        let text = response.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => self.dispatch(body, status.as_u16()),
            Err(_) if !status.is_success() && self.raise_for_status => {
                Err(Error::status(status.as_u16(), text))
            }
            Err(err) => {
                error!(url = %url, status = status.as_u16(), body = %text, "malformed response body");
                Err(err.into())
            }
        }
    }

    /// Maps a parsed response body per the session error policy.
    fn dispatch(&self, body: Value, status: u16) -> Result<Value> {
        if let Some((code, message)) = api_error_parts(&body) {
            if self.pass_error {
                return Ok(body);
            }
            return Err(Error::api(code, message));
        }

        if !(200..300).contains(&status) && self.raise_for_status {
            return Err(Error::status(status, body.to_string()));
        }

        Ok(body)
    }

    /// Builds the request URL from the base URL and path segments.
    fn endpoint(&self, path: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::config("base URL cannot be a base"))?;
            segments.pop_if_empty();
            segments.extend(
                path.iter()
                    .flat_map(|segment| segment.split('/'))
                    .filter(|segment| !segment.is_empty()),
            );
        }
        Ok(url)
    }
}

// ============================================================================
// Error Body Recognition
// ============================================================================

/// Extracts `(error_code, error_msg)` from an error-bearing body.
///
/// Both observed shapes are recognized: `{"error": {"error_code": ...}}`
/// and the bare `{"error_code": ..., "error_msg": ...}`.
pub(crate) fn api_error_parts(body: &Value) -> Option<(i64, String)> {
    let container = if body.get("error").is_some_and(Value::is_object) {
        body.get("error")?
    } else if body.get("error_code").is_some() {
        body
    } else {
        return None;
    };

    let code = container
        .get("error_code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let message = container
        .get("error_msg")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();

    Some((code, message))
}

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    base_url: String,
    credentials: Credentials,
    cookies: Vec<Cookie>,
    pass_error: bool,
    raise_for_status: bool,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            credentials: Credentials::default(),
            cookies: Vec::new(),
            pass_error: false,
            raise_for_status: true,
        }
    }
}

impl SessionBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the platform base URL.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the credentials.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Seeds the cookie store.
    #[inline]
    #[must_use]
    pub fn cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Returns API error bodies as data instead of raising.
    #[inline]
    #[must_use]
    pub fn pass_error(mut self, pass_error: bool) -> Self {
        self.pass_error = pass_error;
        self
    }

    /// Controls whether non-success HTTP status raises [`Error::Status`].
    #[inline]
    #[must_use]
    pub fn raise_for_status(mut self, raise_for_status: bool) -> Self {
        self.raise_for_status = raise_for_status;
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] for an unparsable base URL and
    /// [`Error::Http`] if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Session> {
        let base_url = Url::parse(&self.base_url)?;
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        Ok(Session {
            http,
            base_url,
            credentials: RwLock::new(self.credentials),
            cookies: RwLock::new(self.cookies),
            pass_error: self.pass_error,
            raise_for_status: self.raise_for_status,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
