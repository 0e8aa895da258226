//! Interactive (implicit) authorization flow.
//!
//! There is no headless-browser-free programmatic grant for this flow: the
//! authorize dialog is a server-rendered login UI, so the negotiator walks
//! it the way a user would — fetch the dialog, submit the login form,
//! approve the consent form when one appears, then read the token fields
//! from the final redirect's URL fragment.
//!
//! Outcome detection rests on content markers in server-rendered HTML.
//! Those substrings are brittle by nature, so they live in [`FlowMarkers`]
//! and can be overridden instead of being hard-coded invariants.
//!
//! # Example
//!
//! ```no_run
//! use mailru_api::{ImplicitFlow, Result};
//!
//! # async fn example() -> Result<()> {
//! let flow = ImplicitFlow::new("423004", "user@mail.ru", "password", "stream");
//! let grant = flow.authorize().await?;
//! println!("token: {}", grant.token.access_token);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::session::cookies::Cookie;

use super::form::parse_form;
use super::{AUTHORIZE_URL, GrantResult, full_scope};

// ============================================================================
// Constants
// ============================================================================

/// Default redirect URI registered for the implicit flow.
pub const SUCCESS_REDIRECT_URI: &str = "http://connect.mail.ru/oauth/success.html";

/// Default number of whole-sequence login attempts.
const DEFAULT_ATTEMPTS: u32 = 3;

/// Default delay between login attempts.
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// E-mail address shape: local part, domain head, rest.
const EMAIL_PATTERN: &str = r"(^[a-zA-Z0-9_.+-]+)@([a-zA-Z0-9-]+)\.([a-zA-Z0-9-.]+$)";

// ============================================================================
// FlowMarkers
// ============================================================================

/// Content markers used to classify server-rendered pages.
///
/// Matching is plain substring search over the page body. The defaults
/// carry the observed Russian-language strings; override them when the
/// remote markup changes.
#[derive(Debug, Clone)]
pub struct FlowMarkers {
    /// Marker for "application is not installed" (invalid/test-mode app).
    pub app_not_installed: String,

    /// Marker for the consent page ("data access required").
    pub access_required: String,

    /// Marker for a blocked user account.
    pub user_blocked: String,
}

impl Default for FlowMarkers {
    fn default() -> Self {
        Self {
            app_not_installed: "Приложение не установлено".to_owned(),
            access_required: "Необходим доступ к данным".to_owned(),
            user_blocked: "Пользователь заблокирован".to_owned(),
        }
    }
}

// ============================================================================
// ImplicitGrant
// ============================================================================

/// The outcome of a successful interactive authorization.
///
/// Besides the token fields this carries the cookies observed during the
/// flow; the scraper layer injects them into browser contexts so pages
/// load in an authenticated state.
#[derive(Debug, Clone)]
pub struct ImplicitGrant {
    /// Token fields read from the redirect fragment.
    pub token: GrantResult,

    /// Cookies collected from the flow responses.
    pub cookies: Vec<Cookie>,
}

// ============================================================================
// ImplicitFlow
// ============================================================================

/// Interactive authorization flow configuration.
///
/// One whole-sequence attempt walks: fetch dialog → submit credentials →
/// (submit consent) → read token fragment. Transient failures (markup or
/// transport oddities) retry up to the attempt budget; structured OAuth
/// outcomes are fatal immediately.
#[derive(Debug, Clone)]
pub struct ImplicitFlow {
    app_id: String,
    email: String,
    password: String,
    scope: String,
    redirect_uri: String,
    authorize_url: String,
    attempts: u32,
    delay: Duration,
    markers: FlowMarkers,
}

// ============================================================================
// ImplicitFlow - Configuration
// ============================================================================

impl ImplicitFlow {
    /// Creates a flow with default attempt budget and markers.
    ///
    /// An empty `scope` requests the full permission scope.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            email: email.into(),
            password: password.into(),
            scope: scope.into(),
            redirect_uri: SUCCESS_REDIRECT_URI.to_owned(),
            authorize_url: AUTHORIZE_URL.to_owned(),
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
            markers: FlowMarkers::default(),
        }
    }

    /// Sets the number of whole-sequence login attempts.
    #[inline]
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sets the delay between login attempts.
    #[inline]
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the redirect URI.
    #[inline]
    #[must_use]
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Overrides the authorize dialog endpoint.
    #[inline]
    #[must_use]
    pub fn authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }

    /// Overrides the page classification markers.
    #[inline]
    #[must_use]
    pub fn markers(mut self, markers: FlowMarkers) -> Self {
        self.markers = markers;
        self
    }
}

// ============================================================================
// ImplicitFlow - Authorization
// ============================================================================

impl ImplicitFlow {
    /// Performs the interactive authorization.
    ///
    /// # Errors
    ///
    /// - the structured outcomes: [`Error::InvalidGrant`],
    ///   [`Error::InvalidUser`], [`Error::ClientNotAvailable`],
    ///   [`Error::TokenFieldMissing`], [`Error::Status`]
    /// - [`Error::LoginAttemptsExceeded`] when transient failures exhaust
    ///   the attempt budget
    pub async fn authorize(&self) -> Result<ImplicitGrant> {
        // The collecting jar sees every Set-Cookie on every redirect hop,
        // which the final response of a followed chain does not expose.
        let jar = Arc::new(CollectingJar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        for attempt in 1..=self.attempts {
            debug!(attempt, "starting interactive authorization");

            match self.attempt(&http).await {
                Ok(token) => {
                    return Ok(ImplicitGrant {
                        token,
                        cookies: jar.drain(),
                    });
                }
                Err(err) if err.is_fatal_auth() => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, "authorization attempt failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(Error::login_attempts_exceeded(self.attempts))
    }

    /// Walks the dialog → credentials → consent → token sequence once.
    async fn attempt(&self, http: &reqwest::Client) -> Result<GrantResult> {
        let authorize_path = Url::parse(&self.authorize_url)?.path().to_owned();

        // Fetch the authorize dialog.
        debug!("fetching authorize dialog");
        let response = self.get_dialog(http).await?;

        if response.status() != StatusCode::OK {
            return Err(Error::status(response.status().as_u16(), ""));
        }

        let mut url = response.url().clone();
        let mut html = response.text().await?;

        if html.contains(&self.markers.app_not_installed) {
            return Err(Error::ClientNotAvailable);
        }

        // Still on the dialog: the page is a login form.
        if url.path() == authorize_path {
            debug!("submitting credentials");
            let response = self.submit_login(http, &url, &html).await?;
            url = response.url().clone();
            html = response.text().await?;

            // Back on the dialog: bad credentials or a consent form.
            if url.path() == authorize_path {
                if url.query().unwrap_or("").contains("fail=1") {
                    return Err(Error::InvalidGrant);
                }
                if html.contains(&self.markers.access_required) {
                    debug!("submitting consent");
                    let response = self.submit_consent(http, &url, &html).await?;
                    html = response.text().await?;
                }
            }
        }

        if html.contains(&self.markers.user_blocked) {
            return Err(Error::InvalidUser);
        }

        // Authenticated now: the dialog redirects straight to the success
        // URL whose fragment carries the token fields.
        debug!("reading token fragment");
        let response = self.get_dialog(http).await?;

        let fragment = response
            .url()
            .fragment()
            .map(str::to_owned)
            .ok_or_else(|| Error::scraper("authorization did not redirect to a token fragment"))?;

        parse_fragment(&fragment)
    }

    /// GETs the authorize dialog.
    async fn get_dialog(&self, http: &reqwest::Client) -> Result<reqwest::Response> {
        let scope = if self.scope.is_empty() {
            full_scope()
        } else {
            self.scope.clone()
        };

        let query = [
            ("client_id", self.app_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "token"),
            ("scope", scope.as_str()),
        ];

        Ok(http.get(&self.authorize_url).query(&query).send().await?)
    }

    /// Parses the login form and submits it with the user credentials.
    ///
    /// The form wants the e-mail split apart: `Login` is the local part,
    /// `Domain` is the e-mail domain plus a literal `.ru`.
    async fn submit_login(
        &self,
        http: &reqwest::Client,
        page_url: &Url,
        html: &str,
    ) -> Result<reqwest::Response> {
        let form = parse_form(html)?;
        let action = page_url.join(&form.action)?;

        let (login, domain) = split_email(&self.email)?;
        let mut fields = form.fields;
        fields.insert("Login".to_owned(), login);
        fields.insert("Domain".to_owned(), format!("{domain}.ru"));
        fields.insert("Password".to_owned(), self.password.clone());

        Ok(http.post(action).form(&fields).send().await?)
    }

    /// Parses the consent form and re-submits it as-is (auto-approve).
    async fn submit_consent(
        &self,
        http: &reqwest::Client,
        page_url: &Url,
        html: &str,
    ) -> Result<reqwest::Response> {
        let form = parse_form(html)?;
        let action = page_url.join(&form.action)?;
        Ok(http.post(action).form(&form.fields).send().await?)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits an e-mail address into `(local part, domain head)`.
fn split_email(address: &str) -> Result<(String, String)> {
    let pattern = Regex::new(EMAIL_PATTERN)
        .map_err(|err| Error::config(format!("e-mail pattern: {err}")))?;
    let captures = pattern
        .captures(address)
        .ok_or_else(|| Error::invalid_argument(format!("e-mail address `{address}` is not valid")))?;

    Ok((captures[1].to_owned(), captures[2].to_owned()))
}

/// Reads the token fields out of a redirect URL fragment.
fn parse_fragment(fragment: &str) -> Result<GrantResult> {
    let mut result = GrantResult::default();

    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => result.access_token = value.into_owned(),
            "refresh_token" => result.refresh_token = value.into_owned(),
            "expires_in" => result.expires_in = value.parse().unwrap_or(0),
            "x_mailru_vid" => result.uid = value.into_owned(),
            _ => {}
        }
    }

    if result.access_token.is_empty() {
        return Err(Error::token_field_missing("access_token"));
    }
    if result.refresh_token.is_empty() {
        return Err(Error::token_field_missing("refresh_token"));
    }

    Ok(result)
}

// ============================================================================
// CollectingJar
// ============================================================================

/// A cookie store that records every cookie it is handed.
///
/// Delegates actual request/response cookie handling to a [`Jar`], but
/// keeps a normalized [`Cookie`] copy of everything set along the way so
/// the flow can hand the authenticated cookies to the scraper layer.
#[derive(Debug, Default)]
struct CollectingJar {
    inner: Jar,
    collected: Mutex<Vec<Cookie>>,
}

impl CollectingJar {
    /// Returns the collected cookies, last write per (name, domain) wins.
    fn drain(&self) -> Vec<Cookie> {
        let collected = self.collected.lock();
        let mut cookies: Vec<Cookie> = Vec::new();
        for cookie in collected.iter() {
            if let Some(existing) = cookies
                .iter_mut()
                .find(|c| c.name == cookie.name && c.domain == cookie.domain)
            {
                *existing = cookie.clone();
            } else {
                cookies.push(cookie.clone());
            }
        }
        cookies
    }
}

impl CookieStore for CollectingJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();

        {
            let mut collected = self.collected.lock();
            for header in &headers {
                if let Ok(text) = header.to_str()
                    && let Ok(mut cookie) = Cookie::parse(text)
                {
                    if cookie.domain.is_empty() {
                        cookie.domain = url
                            .host_str()
                            .map(|host| format!(".{host}"))
                            .unwrap_or_default();
                    }
                    collected.push(cookie);
                }
            }
        }

        self.inner.set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.cookies(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_FRAGMENT: &str =
        "access_token=token123&expires_in=86400&refresh_token=refresh456&token_type=bearer&x_mailru_vid=321";

    fn login_page(server: &MockServer) -> String {
        format!(
            r#"<form method="post" action="{}/cgi-bin/auth">
                <input type="hidden" name="page" value="back">
                <input type="text" name="Login">
                <input type="password" name="Password">
                <input type="submit" value="Sign in">
            </form>"#,
            server.uri()
        )
    }

    fn flow(server: &MockServer) -> ImplicitFlow {
        ImplicitFlow::new("423004", "user@mail.ru", "password", "stream")
            .authorize_url(format!("{}/oauth/authorize", server.uri()))
            .attempts(1)
            .delay(Duration::ZERO)
    }

    #[test]
    fn test_split_email() {
        let (login, domain) = split_email("some.user@inbox.ru").unwrap();
        assert_eq!(login, "some.user");
        assert_eq!(domain, "inbox");

        assert!(split_email("not an address").is_err());
    }

    #[test]
    fn test_parse_fragment() {
        let result = parse_fragment(TOKEN_FRAGMENT).unwrap();
        assert_eq!(result.access_token, "token123");
        assert_eq!(result.refresh_token, "refresh456");
        assert_eq!(result.expires_in, 86400);
        assert_eq!(result.uid, "321");
    }

    #[test]
    fn test_parse_fragment_missing_token() {
        let err = parse_fragment("expires_in=1").unwrap_err();
        assert_eq!(err.to_string(), "authorization response missing `access_token`");
    }

    #[tokio::test]
    async fn test_full_login_sequence() {
        let server = MockServer::start().await;

        // First dialog fetch serves the login form.
        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .and(query_param("response_type", "token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(&server)))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Login submission redirects off the dialog and sets a cookie.
        Mock::given(method("POST"))
            .and(path("/cgi-bin/auth"))
            .and(body_string_contains("Login=user"))
            .and(body_string_contains("Domain=mail.ru"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/oauth/success.html")
                    .insert_header("set-cookie", "Mpop=abc; Domain=mail.ru; Path=/"),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/oauth/success.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        // Re-issued dialog fetch redirects to the token fragment.
        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "location",
                format!("/oauth/success.html#{TOKEN_FRAGMENT}").as_str(),
            ))
            .mount(&server)
            .await;

        let grant = flow(&server).authorize().await.unwrap();
        assert_eq!(grant.token.access_token, "token123");
        assert_eq!(grant.token.uid, "321");
        assert!(grant.cookies.iter().any(|c| c.name == "Mpop"));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(&server)))
            .mount(&server)
            .await;

        // Login submission bounces back to the dialog with fail=1.
        Mock::given(method("POST"))
            .and(path("/cgi-bin/auth"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/oauth/authorize?client_id=423004&fail=1"),
            )
            .mount(&server)
            .await;

        let err = flow(&server).authorize().await.unwrap_err();
        assert!(matches!(err, Error::InvalidGrant));
    }

    #[tokio::test]
    async fn test_app_not_installed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>Приложение не установлено</html>"),
            )
            .mount(&server)
            .await;

        let err = flow(&server).authorize().await.unwrap_err();
        assert!(matches!(err, Error::ClientNotAvailable));
    }

    #[tokio::test]
    async fn test_blocked_user() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string(login_page(&server)))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/cgi-bin/auth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>Пользователь заблокирован</html>"),
            )
            .mount(&server)
            .await;

        let err = flow(&server).authorize().await.unwrap_err();
        assert!(matches!(err, Error::InvalidUser));
    }

    #[tokio::test]
    async fn test_dialog_error_status_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        // Three attempts configured, but a status error must not retry.
        let err = flow(&server).attempts(3).authorize().await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let server = MockServer::start().await;

        // A dialog with no form is a transient markup failure.
        Mock::given(method("GET"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>empty</html>"))
            .mount(&server)
            .await;

        let err = flow(&server).attempts(2).authorize().await.unwrap_err();
        assert!(matches!(err, Error::LoginAttemptsExceeded { attempts: 2 }));
    }
}
