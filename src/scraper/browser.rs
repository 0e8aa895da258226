//! Browser capability traits.
//!
//! The scraper coordinates a headless browser but does not implement one:
//! the process lifecycle, the DevTools/WebDriver plumbing, and page
//! teardown belong to the embedder. These traits are the surface the
//! scraper consumes — navigation, selector queries, script evaluation,
//! and cookie injection.
//!
//! Implementations wrap whatever engine the embedder runs (a CDP client,
//! a WebDriver session); tests use scripted fakes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::session::cookies::Cookie;

// ============================================================================
// Browser
// ============================================================================

/// A running browser that can open pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens a new blank page.
    async fn new_page(&self) -> Result<Arc<dyn Page>>;
}

// ============================================================================
// Page
// ============================================================================

/// A browser page.
///
/// Selector arguments are CSS selectors evaluated in the page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates the page to a URL.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Returns the page's current URL.
    async fn current_url(&self) -> Result<String>;

    /// Injects cookies into the page's context.
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Evaluates a script in the page, returning its JSON result.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Returns the outer HTML of every node matching the selector,
    /// in document order.
    async fn outer_html_all(&self, selector: &str) -> Result<Vec<String>>;

    /// Returns an attribute of the first node matching the selector.
    ///
    /// `Ok(None)` when the node or the attribute is absent.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Returns `true` when at least one node matches the selector.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Returns `true` when the first matching node exists and is visible.
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Clicks the first node matching the selector.
    async fn click(&self, selector: &str) -> Result<()>;
}
