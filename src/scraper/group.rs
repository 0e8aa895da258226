//! Group catalog item.
//!
//! One entry of the community catalog, reconstructed from its DOM
//! fragment. Only the profile link matters: the scraper resolves it to a
//! uid through a public lookup and fetches the real record via the API.

// ============================================================================
// Imports
// ============================================================================

use scraper::Html;
use serde_json::{Value, json};

use crate::error::{Error, Result};

use super::selector;

// ============================================================================
// Selectors
// ============================================================================

/// Avatar link inside a catalog item.
const ITEM_LINK: &str = "a.groups__avatar";

// ============================================================================
// GroupItem
// ============================================================================

/// A community catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupItem {
    link: String,
}

impl GroupItem {
    /// Reconstructs a catalog item from its outer HTML.
    ///
    /// Tracking query suffixes (`?ref=...`) are stripped from the link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scraper`] when the fragment carries no avatar
    /// link.
    pub fn from_html(html: &str) -> Result<Self> {
        let fragment = Html::parse_fragment(html);
        let link_selector = selector(ITEM_LINK)?;

        let href = fragment
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| Error::scraper("catalog item without an avatar link"))?;

        let link = href.split('?').next().unwrap_or("").to_owned();
        if link.is_empty() {
            return Err(Error::scraper("catalog item with an empty link"));
        }

        Ok(Self { link })
    }

    /// Returns the community profile link.
    #[inline]
    #[must_use]
    pub fn link(&self) -> &str {
        &self.link
    }

    /// Returns the link as a path slug for the public uid lookup.
    #[inline]
    #[must_use]
    pub fn slug(&self) -> &str {
        self.link.trim_matches('/')
    }

    /// Renders the item the way the API would.
    #[must_use]
    pub fn into_value(self) -> Value {
        json!({ "link": self.link })
    }
}

// ============================================================================
// Tests
// ============================================================================
