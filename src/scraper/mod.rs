//! Browser-backed scraper layer.
//!
//! [`ApiScraper`] offers the same calling convention as [`Api`], but for a
//! registered subset of method names it can substitute a browser-driven
//! page scrape when the caller opts in with a truthy `scrape` parameter:
//!
//! | Method | Scrape |
//! |--------|--------|
//! | `groups.get` | community catalog pagination |
//! | `groups.getInfo` | per-community page details |
//! | `groups.join` | join control interaction |
//! | `stream.getByAuthor` | activity feed pagination |
//!
//! Everything else — and every call without the flag — falls through to
//! the normal signed API call.
//!
//! The browser itself is an external capability (see [`browser`]); pages
//! are cached in a bounded [`PagePool`] keyed by `(url, session_key)`, and
//! every DOM polling loop runs under a [`PollBudget`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mailru_api::{Api, ApiScraper, Browser, Params};
//!
//! # async fn example(api: Api, browser: Arc<dyn Browser>) -> mailru_api::Result<()> {
//! let scraper = ApiScraper::new(api, browser);
//!
//! // Scraped: walks the rendered feed in a browser page.
//! let events = scraper
//!     .call(
//!         "stream.getByAuthor",
//!         Params::new().set("uid", "12345").set("limit", 20).set("scrape", 1),
//!     )
//!     .await?;
//!
//! // Not registered for scraping: a plain signed API call.
//! let friends = scraper.call("friends.get", Params::new()).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

/// Browser capability traits.
pub mod browser;

/// Stream event reconstruction.
pub mod event;

/// Group catalog item.
pub mod group;

/// Community catalog and membership scrapers.
mod groups;

/// Bounded DOM polling.
pub mod poll;

/// Page pool for authenticated browser contexts.
pub mod pool;

/// Activity feed scraper.
mod stream;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::Api;
use crate::error::{Error, Result};
use crate::params::Params;

use browser::{Browser, Page};
use poll::PollBudget;
use pool::PagePool;

// ============================================================================
// Constants
// ============================================================================

/// Method names with a registered scraper implementation.
pub const SCRAPER_METHODS: [&str; 4] = [
    "groups.get",
    "groups.getInfo",
    "groups.join",
    "stream.getByAuthor",
];

// ============================================================================
// ApiScraper
// ============================================================================

/// API facade with browser-backed implementations for selected methods.
pub struct ApiScraper {
    api: Api,
    pool: PagePool,
    budget: PollBudget,
}

// ============================================================================
// ApiScraper - Constructors
// ============================================================================

impl ApiScraper {
    /// Creates a scraper with default pool limits and polling budget.
    #[must_use]
    pub fn new(api: Api, browser: Arc<dyn Browser>) -> Self {
        Self {
            api,
            pool: PagePool::new(browser),
            budget: PollBudget::default(),
        }
    }

    /// Creates a builder for explicit limits.
    #[must_use]
    pub fn builder(api: Api, browser: Arc<dyn Browser>) -> ScraperBuilder {
        ScraperBuilder {
            api,
            browser,
            budget: PollBudget::default(),
            capacity: None,
            max_idle: None,
        }
    }

    /// Returns the underlying API facade.
    #[inline]
    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Returns the page pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &PagePool {
        &self.pool
    }
}

// ============================================================================
// ApiScraper - Dispatch
// ============================================================================

impl ApiScraper {
    /// Calls a platform method, scraping when requested and registered.
    ///
    /// The `scrape` and `fresh` parameters are consumed here and never
    /// reach the wire. `fresh` forces a new browser page for the scrape.
    ///
    /// # Errors
    ///
    /// For scraped calls: scraper errors on markup mismatch, plus the
    /// session error policy for the underlying lookups. For pass-through
    /// calls: the session error policy.
    pub async fn call(&self, name: &str, mut params: Params) -> Result<Value> {
        let scrape = params.take_flag("scrape");
        let fresh = params.take_flag("fresh");

        if !scrape || !SCRAPER_METHODS.contains(&name) {
            return self.api.call(name, params).await;
        }

        debug!(method = name, fresh, "scraping");
        match name {
            "groups.get" => self.groups_get(params, fresh).await,
            "groups.getInfo" => self.groups_get_info(params, fresh).await,
            "groups.join" => self.groups_join(params, fresh).await,
            "stream.getByAuthor" => self.stream_get_by_author(params, fresh).await,
            _ => self.api.call(name, params).await,
        }
    }

    /// Acquires an authenticated page for a URL.
    pub(crate) async fn acquire(&self, url: &str, fresh: bool) -> Result<Arc<dyn Page>> {
        let session = self.api.session();
        let cookies = session.cookies();
        let session_key = session.session_key();
        self.pool.acquire(url, &session_key, &cookies, fresh).await
    }
}

// ============================================================================
// ScraperBuilder
// ============================================================================

/// Builder for configuring an [`ApiScraper`].
pub struct ScraperBuilder {
    api: Api,
    browser: Arc<dyn Browser>,
    budget: PollBudget,
    capacity: Option<usize>,
    max_idle: Option<Duration>,
}

impl ScraperBuilder {
    /// Sets the polling budget for DOM loops.
    #[inline]
    #[must_use]
    pub fn poll_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the page pool capacity.
    #[inline]
    #[must_use]
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the idle age before pooled pages are evicted.
    #[inline]
    #[must_use]
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Builds the scraper.
    #[must_use]
    pub fn build(self) -> ApiScraper {
        let pool = match (self.capacity, self.max_idle) {
            (None, None) => PagePool::new(self.browser),
            (capacity, max_idle) => PagePool::with_limits(
                self.browser,
                capacity.unwrap_or(8),
                max_idle.unwrap_or(Duration::from_secs(300)),
            ),
        };

        ApiScraper {
            api: self.api,
            pool,
            budget: self.budget,
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Parses a CSS selector, mapping failures to a scraper error.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| Error::scraper(format!("invalid selector `{css}`: {err}")))
}

/// Returns the visible text of an HTML fragment.
pub(crate) fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Returns the first object of an array response.
///
/// `None` for anything else — notably error bodies returned by a session
/// in pass-through mode, which the scrapers hand back verbatim.
pub(crate) fn first_record(value: &Value) -> Option<&Map<String, Value>> {
    value.as_array()?.first()?.as_object()
}

/// Renders a scalar id value as a string.
pub(crate) fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for scraper tests.

    use super::*;

    use async_trait::async_trait;

    use crate::session::Session;
    use crate::session::cookies::Cookie;
    use crate::session::signature::Credentials;

    /// A browser that always hands out the same page.
    pub(crate) struct SinglePageBrowser {
        pub(crate) page: Arc<dyn Page>,
    }

    #[async_trait]
    impl Browser for SinglePageBrowser {
        async fn new_page(&self) -> Result<Arc<dyn Page>> {
            Ok(Arc::clone(&self.page))
        }
    }

    /// Builds a scraper over a wiremock-backed session and a fixed page.
    pub(crate) fn scraper_over(server_uri: &str, page: Arc<dyn Page>) -> ApiScraper {
        let session = Session::builder()
            .base_url(format!("{server_uri}/platform"))
            .credentials(Credentials::server_server("123", "secret key", "session key"))
            .cookies(vec![Cookie::parse("Mpop=1; Domain=mail.ru").unwrap()])
            .build()
            .unwrap();

        ApiScraper::builder(Api::new(session), Arc::new(SinglePageBrowser { page }))
            .poll_budget(PollBudget::new(10, Duration::from_millis(1)))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::session::cookies::Cookie;

    use super::pool::PageKey;

    /// An inert page for fall-through tests that never touch the browser.
    pub(crate) struct InertPage;

    #[async_trait]
    impl Page for InertPage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn set_cookies(&self, _cookies: &[Cookie]) -> Result<()> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn outer_html_all(&self, _selector: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn attribute(&self, _selector: &str, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn exists(&self, _selector: &str) -> Result<bool> {
            Ok(false)
        }
        async fn is_visible(&self, _selector: &str) -> Result<bool> {
            Ok(false)
        }
        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry() {
        assert!(SCRAPER_METHODS.contains(&"groups.get"));
        assert!(SCRAPER_METHODS.contains(&"stream.getByAuthor"));
        assert!(!SCRAPER_METHODS.contains(&"friends.get"));
    }

    #[test]
    fn test_first_record() {
        let array = json!([{"uid": 1}, {"uid": 2}]);
        assert_eq!(
            first_record(&array).and_then(|r| r.get("uid")).and_then(Value::as_i64),
            Some(1)
        );

        let error_body = json!({"error": {"error_code": 202, "error_msg": "denied"}});
        assert!(first_record(&error_body).is_none());
        assert!(first_record(&json!([])).is_none());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(Some(&json!("abc"))), Some("abc".to_owned()));
        assert_eq!(value_to_string(Some(&json!(42))), Some("42".to_owned()));
        assert_eq!(value_to_string(Some(&json!(""))), None);
        assert_eq!(value_to_string(None), None);
    }

    #[test]
    fn test_fragment_text() {
        assert_eq!(
            fragment_text("<div> hello <b>world</b> </div>"),
            "hello world"
        );
    }

    #[test]
    fn test_page_key_equality() {
        let a = PageKey {
            url: "https://my.mail.ru/a".to_owned(),
            session_key: "k".to_owned(),
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unregistered_method_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "friends.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["1"])))
            .mount(&server)
            .await;

        let scraper = testing::scraper_over(&server.uri(), Arc::new(InertPage));

        // Even with the flag set, an unregistered method is a plain call;
        // the flag itself must not reach the wire.
        let body = scraper
            .call("friends.get", Params::new().set("scrape", 1))
            .await
            .unwrap();
        assert_eq!(body, json!(["1"]));
    }

    #[tokio::test]
    async fn test_registered_method_without_flag_falls_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "groups.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let scraper = testing::scraper_over(&server.uri(), Arc::new(InertPage));

        let body = scraper.call("groups.get", Params::new()).await.unwrap();
        assert_eq!(body, json!([]));
    }
}
