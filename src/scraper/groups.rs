//! Community catalog and membership scrapers.
//!
//! Three registered methods live here:
//!
//! - `groups.get` — walk the infinite-scroll community catalog of a user,
//!   resolving every entry to a full API record;
//! - `groups.getInfo` — enrich API community records with details only
//!   visible on the rendered page;
//! - `groups.join` — drive the join control on a community page.
//!
//! The catalog is a `Loaded → (ClickMore → Loading → Loaded)* → Exhausted`
//! state machine: items render in batches, and a "load more" control pulls
//! the next batch until it disappears or hides. Offset/limit slicing
//! happens over the accumulated logical item sequence, never over DOM
//! pages, so results are stable regardless of batch-size variance.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::params::Params;

use super::browser::Page;
use super::group::GroupItem;
use super::stream::ACCESS_DENIED;
use super::{ApiScraper, first_record, value_to_string};

// ============================================================================
// Selectors
// ============================================================================

mod sel {
    //! DOM selectors of the catalog and community page markup.

    /// One community entry in the catalog list.
    pub const ITEM: &str = "div.groups-catalog div.groups-catalog__list div.groups__item";

    /// The "load more" control under the catalog.
    pub const MORE_BUTTON: &str =
        "div.groups-catalog div.groups-catalog__groups-more span.ui-button-main";

    /// Closed-community signage on a community page.
    pub const CLOSED_SIGNAGE: &str = "div.b-community__main-page div.mf_cc";

    /// Join control on a community page.
    pub const JOIN_BUTTON: &str = "div.b-community__main-page__signup span.ui-button-main";

    /// Joined-state marker replacing the join control.
    pub const JOINED_MARK: &str = "div.b-community__main-page__signup span.ui-button-gray";
}

/// Default number of catalog items returned by `groups.get`.
const DEFAULT_LIMIT: u64 = 10;

// ============================================================================
// CatalogState
// ============================================================================

/// Pagination state of the community catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogState {
    /// A batch of items is rendered and unread.
    Loaded,

    /// The "load more" control should be clicked.
    ClickMore,

    /// Waiting for the next batch to render.
    Loading,

    /// No further batches exist.
    Exhausted,
}

// ============================================================================
// ApiScraper - groups.get
// ============================================================================

impl ApiScraper {
    /// Scrapes the community catalog of a user.
    ///
    /// Without a `uid` parameter the current session user is used.
    pub(crate) async fn groups_get(&self, params: Params, fresh: bool) -> Result<Value> {
        let offset = params.get_u64("offset").unwrap_or(0) as usize;
        let limit = params.get_u64("limit").unwrap_or(DEFAULT_LIMIT) as usize;

        let mut lookup = Params::new();
        if let Some(uid) = value_to_string(params.get("uid")) {
            lookup.insert("uids", uid);
        }
        let response = self.api().call("users.getInfo", lookup).await?;
        let Some(user) = first_record(&response) else {
            return Ok(response);
        };

        let url = user
            .get("link")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::scraper("user record without a profile link"))?
            .to_owned();

        let page = self.acquire(&url, fresh).await?;
        let groups = self.paginate_catalog(page.as_ref(), offset + limit).await?;

        let end = groups.len().min(offset + limit);
        let slice = if offset >= groups.len() {
            Vec::new()
        } else {
            groups[offset..end].to_vec()
        };
        Ok(Value::Array(slice))
    }

    /// Accumulates up to `target` catalog items in DOM order.
    async fn paginate_catalog(&self, page: &dyn Page, target: usize) -> Result<Vec<Value>> {
        let mut groups = Vec::new();
        let mut seen = 0usize;
        let mut state = CatalogState::Loaded;

        loop {
            match state {
                CatalogState::Loaded => {
                    let items = page.outer_html_all(sel::ITEM).await?;
                    let fresh_items: Vec<String> = items[seen.min(items.len())..].to_vec();
                    seen = items.len();

                    for html in &fresh_items {
                        if groups.len() >= target {
                            break;
                        }
                        if let Some(info) = self.resolve_catalog_item(html).await? {
                            groups.push(info);
                        }
                    }

                    if groups.len() >= target {
                        break;
                    }
                    state = if page.is_visible(sel::MORE_BUTTON).await? {
                        CatalogState::ClickMore
                    } else {
                        CatalogState::Exhausted
                    };
                }

                CatalogState::ClickMore => {
                    debug!(seen, "loading next catalog batch");
                    page.click(sel::MORE_BUTTON).await?;
                    state = CatalogState::Loading;
                }

                CatalogState::Loading => {
                    let before = seen;
                    self.budget
                        .poll("groups catalog pagination", async || {
                            if page.outer_html_all(sel::ITEM).await?.len() > before {
                                return Ok(Some(()));
                            }
                            // The control can disappear instead of
                            // delivering a batch; that ends the catalog.
                            if !page.is_visible(sel::MORE_BUTTON).await? {
                                return Ok(Some(()));
                            }
                            Ok(None)
                        })
                        .await?;
                    state = CatalogState::Loaded;
                }

                CatalogState::Exhausted => break,
            }
        }

        Ok(groups)
    }

    /// Resolves one catalog entry to a full API record.
    ///
    /// The entry's profile link resolves to a uid through a public lookup
    /// keyed by the URL slug, then `users.getInfo` supplies the record.
    async fn resolve_catalog_item(&self, html: &str) -> Result<Option<Value>> {
        let item = GroupItem::from_html(html)?;

        let resolved = self
            .api()
            .session()
            .request(&[item.slug()], &Params::new())
            .await?;
        let Some(uid) = value_to_string(resolved.get("uid")) else {
            warn!(link = item.link(), "catalog item did not resolve to a uid");
            return Ok(None);
        };

        let info = self
            .api()
            .call("users.getInfo", Params::new().set("uids", uid))
            .await?;
        Ok(first_record(&info).map(|record| Value::Object(record.clone())))
    }
}

// ============================================================================
// ApiScraper - groups.getInfo
// ============================================================================

impl ApiScraper {
    /// Enriches community records with page-only details.
    ///
    /// Fans out over the comma-separated `uids`; a uid whose record or
    /// page cannot be resolved is skipped. Every uid failing maps to
    /// [`Error::EmptyObjects`], distinguishing total failure from a
    /// genuinely empty list.
    pub(crate) async fn groups_get_info(&self, params: Params, fresh: bool) -> Result<Value> {
        let uids = params
            .get_str("uids")
            .map(str::to_owned)
            .or_else(|| value_to_string(params.get("uids")))
            .ok_or_else(|| Error::invalid_argument("`uids` parameter is required"))?;

        let mut records = Vec::new();
        let mut requested = 0usize;

        for uid in uids.split(',').map(str::trim).filter(|uid| !uid.is_empty()) {
            requested += 1;
            match self.community_info(uid, fresh).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) if err.is_api_error() || err.is_scraper_error() => {
                    warn!(uid, error = %err, "skipping community");
                }
                Err(err) => return Err(err),
            }
        }

        if requested > 0 && records.is_empty() {
            return Err(Error::EmptyObjects);
        }
        Ok(Value::Array(records))
    }

    /// Fetches one community record and scrapes its page details.
    async fn community_info(&self, uid: &str, fresh: bool) -> Result<Option<Value>> {
        let response = self
            .api()
            .call("users.getInfo", Params::new().set("uids", uid))
            .await?;
        let Some(record) = first_record(&response) else {
            return Ok(None);
        };
        let mut record = record.clone();

        let Some(link) = record.get("link").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(Some(Value::Object(record)));
        };

        let page = self.acquire(&link, fresh).await?;
        if page.is_visible(ACCESS_DENIED).await? {
            warn!(uid, "community page denies access");
            return Ok(None);
        }

        let is_closed = page.exists(sel::CLOSED_SIGNAGE).await?;
        record.insert("is_closed".to_owned(), Value::Bool(is_closed));
        Ok(Some(Value::Object(record)))
    }
}

// ============================================================================
// ApiScraper - groups.join
// ============================================================================

impl ApiScraper {
    /// Joins a community through its page controls.
    ///
    /// Returns `1`, like the API method. Already being a member is a
    /// success. A join control that never appears is a markup mismatch,
    /// not a data condition, and raises [`Error::Scraper`].
    pub(crate) async fn groups_join(&self, params: Params, fresh: bool) -> Result<Value> {
        let group_id = value_to_string(params.get("group_id"))
            .ok_or_else(|| Error::invalid_argument("`group_id` parameter is required"))?;

        let response = self
            .api()
            .call("users.getInfo", Params::new().set("uids", group_id.clone()))
            .await?;
        let Some(record) = first_record(&response) else {
            return Ok(response);
        };

        let url = record
            .get("link")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::scraper("community record without a profile link"))?
            .to_owned();

        let page = self.acquire(&url, fresh).await?;

        if page.is_visible(sel::JOINED_MARK).await? {
            debug!(group_id, "already a member");
            return Ok(json!(1));
        }

        let waited = self
            .budget
            .poll("join control", async || {
                Ok(page.is_visible(sel::JOIN_BUTTON).await?.then_some(()))
            })
            .await;
        match waited {
            Ok(()) => {}
            Err(Error::PaginationStalled { .. }) => {
                return Err(Error::scraper("join control did not appear"));
            }
            Err(err) => return Err(err),
        }

        page.click(sel::JOIN_BUTTON).await?;

        self.budget
            .poll("join confirmation", async || {
                Ok(page.is_visible(sel::JOINED_MARK).await?.then_some(()))
            })
            .await?;

        debug!(group_id, "joined community");
        Ok(json!(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
