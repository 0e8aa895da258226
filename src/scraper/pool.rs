//! Page pool for authenticated browser contexts.
//!
//! Navigating and re-authenticating a page is expensive, so pages are
//! cached by `(url, session_key)` and reused across scrape calls. The pool
//! is owned by the scraper — never a global mapping — and bounded two
//! ways: entries idle past `max_idle` are evicted on the next acquire, and
//! when the pool is full the least-recently-used entry makes room.
//!
//! Acquiring always requires cookies: an authenticated scrape with an
//! empty cookie jar fails fast, before any navigation happens.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::cookies::Cookie;

use super::browser::{Browser, Page};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of pooled pages.
const DEFAULT_CAPACITY: usize = 8;

/// Default idle age before a pooled page is evicted.
const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(300);

// ============================================================================
// PageKey
// ============================================================================

/// Pool key: one page per `(url, session_key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Page URL.
    pub url: String,

    /// Access token the page was authenticated with.
    pub session_key: String,
}

// ============================================================================
// PagePool
// ============================================================================

struct PooledPage {
    page: Arc<dyn Page>,
    last_used: Instant,
}

/// A bounded pool of authenticated browser pages.
pub struct PagePool {
    browser: Arc<dyn Browser>,
    pages: Mutex<FxHashMap<PageKey, PooledPage>>,
    capacity: usize,
    max_idle: Duration,
}

// ============================================================================
// PagePool - Constructors
// ============================================================================

impl PagePool {
    /// Creates a pool with default limits.
    #[must_use]
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self::with_limits(browser, DEFAULT_CAPACITY, DEFAULT_MAX_IDLE)
    }

    /// Creates a pool with explicit limits.
    #[must_use]
    pub fn with_limits(browser: Arc<dyn Browser>, capacity: usize, max_idle: Duration) -> Self {
        Self {
            browser,
            pages: Mutex::new(FxHashMap::default()),
            capacity: capacity.max(1),
            max_idle,
        }
    }
}

// ============================================================================
// PagePool - Acquire
// ============================================================================

impl PagePool {
    /// Acquires a page for a URL under a session key.
    ///
    /// Reuses a pooled page when one exists for the key, unless `fresh`
    /// forces a new one (isolation between concurrent scrapes of
    /// different accounts). New pages get the cookies injected before
    /// navigation so the page loads in an authenticated state.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyCookieJar`] when `cookies` is empty
    /// - browser errors from page creation, cookie injection, navigation
    pub async fn acquire(
        &self,
        url: &str,
        session_key: &str,
        cookies: &[Cookie],
        fresh: bool,
    ) -> Result<Arc<dyn Page>> {
        if cookies.is_empty() {
            return Err(Error::EmptyCookieJar);
        }

        let key = PageKey {
            url: url.to_owned(),
            session_key: session_key.to_owned(),
        };

        self.evict_idle();

        if !fresh
            && let Some(entry) = self.pages.lock().get_mut(&key)
        {
            entry.last_used = Instant::now();
            debug!(url, "reusing pooled page");
            return Ok(Arc::clone(&entry.page));
        }

        debug!(url, fresh, "opening new page");
        let page = self.browser.new_page().await?;
        page.set_cookies(cookies).await?;
        page.goto(url).await?;

        let mut pages = self.pages.lock();
        if !pages.contains_key(&key) && pages.len() >= self.capacity {
            evict_lru(&mut pages);
        }
        pages.insert(
            key,
            PooledPage {
                page: Arc::clone(&page),
                last_used: Instant::now(),
            },
        );

        Ok(page)
    }
}

// ============================================================================
// PagePool - Eviction
// ============================================================================

impl PagePool {
    /// Returns the number of pooled pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// Returns `true` when the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    /// Drops entries idle past the pool's `max_idle`.
    pub fn evict_idle(&self) {
        let mut pages = self.pages.lock();
        let before = pages.len();
        pages.retain(|_, entry| entry.last_used.elapsed() <= self.max_idle);
        let evicted = before - pages.len();
        if evicted > 0 {
            debug!(evicted, "evicted idle pages");
        }
    }

    /// Drops every pooled page.
    pub fn clear(&self) {
        self.pages.lock().clear();
    }
}

/// Removes the least-recently-used entry.
fn evict_lru(pages: &mut FxHashMap<PageKey, PooledPage>) {
    let oldest = pages
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(key, _)| key.clone());

    if let Some(key) = oldest {
        debug!(url = %key.url, "evicting least-recently-used page");
        pages.remove(&key);
    }
}

// ============================================================================
// Tests
// ============================================================================
