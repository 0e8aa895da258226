//! Activity feed scraper.
//!
//! `stream.getByAuthor` walks the rendered feed of a user or community:
//! read the event nodes currently in the DOM, scroll to trigger the lazy
//! load, poll the container's `data-state` until it settles, repeat until
//! the container reports `noevents` or the caller's limit is met — a
//! `Reading → Scrolling → Loading* → Ended` machine.
//!
//! A caller-supplied `skip` cursor suppresses every event up to and
//! including the given id before accumulation starts, which makes
//! pagination resumable across separate scrape calls.
//!
//! Access restrictions abort the stream instead of returning an empty
//! list: the denial marker maps to [`Error::AccessDenied`], or to
//! [`Error::Blacklisted`] when its text says so — "no access" is not
//! "no data".

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::params::Params;

use super::browser::Page;
use super::event::Event;
use super::{ApiScraper, first_record, fragment_text, value_to_string};

// ============================================================================
// Selectors
// ============================================================================

/// Feed container carrying the pagination state attribute.
const HISTORY: &str = "#history_root";

/// One rendered feed event.
const EVENT: &str = "div.b-history-event";

/// Denial marker shown instead of the feed.
pub(crate) const ACCESS_DENIED: &str = "div.b-history__access-denied";

/// Scroll script triggering the lazy load.
const SCROLL_JS: &str = "window.scroll(0, document.body.scrollHeight)";

/// Container state while the next batch renders.
const STATE_LOADING: &str = "loading";

/// Container state once the feed is exhausted.
const STATE_ENDED: &str = "noevents";

/// Blacklist wording inside the denial marker (Russian and English).
const BLACKLIST_MARKERS: [&str; 2] = ["черн", "blacklist"];

/// Default number of events returned.
const DEFAULT_LIMIT: u64 = 10;

/// Scroll rounds yielding no new nodes before the stream counts as stalled.
const MAX_EMPTY_ROUNDS: u32 = 2;

// ============================================================================
// StreamState
// ============================================================================

/// Pagination state of the activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// Unread event nodes may be in the DOM.
    Reading,

    /// Trigger the lazy load.
    Scrolling,

    /// Waiting for the container to leave its transient state.
    Loading,

    /// The container reported `noevents`.
    Ended,
}

// ============================================================================
// ApiScraper - stream.getByAuthor
// ============================================================================

impl ApiScraper {
    /// Scrapes the activity feed of a user or community.
    pub(crate) async fn stream_get_by_author(&self, params: Params, fresh: bool) -> Result<Value> {
        let uid = value_to_string(params.get("uid"))
            .ok_or_else(|| Error::invalid_argument("`uid` parameter is required"))?;
        let skip = params.get_str("skip").map(str::to_lowercase);
        let limit = params.get_u64("limit").unwrap_or(DEFAULT_LIMIT) as usize;

        let response = self
            .api()
            .call("users.getInfo", Params::new().set("uids", uid))
            .await?;
        let Some(user) = first_record(&response) else {
            return Ok(response);
        };

        let url = user
            .get("link")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::scraper("user record without a profile link"))?
            .to_owned();

        let page = self.acquire(&url, fresh).await?;
        self.paginate_stream(page.as_ref(), skip, limit).await
    }

    /// Walks the feed until `limit` events are collected or it ends.
    async fn paginate_stream(
        &self,
        page: &dyn Page,
        skip: Option<String>,
        limit: usize,
    ) -> Result<Value> {
        self.check_stream_access(page).await?;

        if limit == 0 {
            return Ok(Value::Array(Vec::new()));
        }

        let mut events = Vec::new();
        let mut seen = 0usize;
        let mut skipping = skip.is_some();
        let skip_id = skip.unwrap_or_default();
        let mut empty_rounds = 0u32;
        let mut state = StreamState::Reading;

        loop {
            match state {
                StreamState::Reading => {
                    let nodes = page.outer_html_all(EVENT).await?;
                    let fresh_nodes: Vec<String> = nodes[seen.min(nodes.len())..].to_vec();

                    if fresh_nodes.is_empty() {
                        empty_rounds += 1;
                        if empty_rounds >= MAX_EMPTY_ROUNDS {
                            return Err(Error::pagination_stalled(
                                "stream pagination",
                                empty_rounds,
                            ));
                        }
                    } else {
                        empty_rounds = 0;
                    }
                    seen = nodes.len();

                    for html in &fresh_nodes {
                        let event = Event::from_html(html)?;

                        // Resume cursor: drop everything up to and
                        // including the skipped id.
                        if skipping {
                            if event.id() == skip_id {
                                skipping = false;
                            }
                            continue;
                        }

                        events.push(event.into_value());
                        if events.len() >= limit {
                            debug!(count = events.len(), "limit satisfied");
                            return Ok(Value::Array(events));
                        }
                    }

                    state = if self.history_state(page).await? == STATE_ENDED {
                        StreamState::Ended
                    } else {
                        StreamState::Scrolling
                    };
                }

                StreamState::Scrolling => {
                    page.evaluate(SCROLL_JS).await?;
                    state = StreamState::Loading;
                }

                StreamState::Loading => {
                    // Always re-read after the container settles: the
                    // batch that flipped the state to `noevents` is still
                    // unconsumed.
                    self.budget
                        .poll("stream pagination", async || {
                            let container_state = self.history_state(page).await?;
                            Ok((container_state != STATE_LOADING).then_some(container_state))
                        })
                        .await?;
                    state = StreamState::Reading;
                }

                StreamState::Ended => {
                    debug!(count = events.len(), "stream exhausted");
                    return Ok(Value::Array(events));
                }
            }
        }
    }

    /// Returns the feed container's `data-state`.
    async fn history_state(&self, page: &dyn Page) -> Result<String> {
        Ok(page
            .attribute(HISTORY, "data-state")
            .await?
            .unwrap_or_default())
    }

    /// Aborts when the feed is behind an access restriction.
    async fn check_stream_access(&self, page: &dyn Page) -> Result<()> {
        let markers = page.outer_html_all(ACCESS_DENIED).await?;
        let Some(marker) = markers.first() else {
            return Ok(());
        };

        let text = fragment_text(marker).to_lowercase();
        if BLACKLIST_MARKERS.iter().any(|needle| text.contains(needle)) {
            return Err(Error::Blacklisted);
        }
        Err(Error::AccessDenied)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::scraper::testing::scraper_over;
    use crate::session::cookies::Cookie;

    fn event_html(id: &str) -> String {
        format!(
            r#"<div class="b-history-event" data-astat="1:5-41:{id}:2:3:E0:0:0:1600000000:">
                <div class="b-history_event_active-area b-history_event_active-area_shift">
                    <div class="b-history-event__body">
                        <div class="b-history-event__event-textbox2">text of {id}</div>
                    </div>
                </div>
            </div>"#
        )
    }

    /// A feed page revealing one batch of events per scroll.
    struct StreamPage {
        batches: Vec<Vec<String>>,
        visible_batches: Mutex<usize>,
        loading_polls: Mutex<u32>,
        denied_html: Option<String>,
        stuck_loading: bool,
    }

    impl StreamPage {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            let batches = batches
                .into_iter()
                .map(|ids| ids.into_iter().map(event_html).collect())
                .collect();
            Self {
                batches,
                visible_batches: Mutex::new(1),
                loading_polls: Mutex::new(0),
                denied_html: None,
                stuck_loading: false,
            }
        }
    }

    #[async_trait]
    impl Page for StreamPage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn set_cookies(&self, _cookies: &[Cookie]) -> Result<()> {
            Ok(())
        }
        async fn evaluate(&self, script: &str) -> Result<Value> {
            if script == SCROLL_JS {
                let mut visible = self.visible_batches.lock();
                *visible = (*visible + 1).min(self.batches.len());
                // The container reports `loading` for one poll after the
                // scroll, like the real feed does.
                *self.loading_polls.lock() = 1;
            }
            Ok(Value::Null)
        }
        async fn outer_html_all(&self, selector: &str) -> Result<Vec<String>> {
            if selector == ACCESS_DENIED {
                return Ok(self.denied_html.iter().cloned().collect());
            }
            let visible = *self.visible_batches.lock();
            Ok(self.batches[..visible].iter().flatten().cloned().collect())
        }
        async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
            if selector != HISTORY || name != "data-state" {
                return Ok(None);
            }
            if self.stuck_loading {
                return Ok(Some(STATE_LOADING.to_owned()));
            }
            let mut polls = self.loading_polls.lock();
            if *polls > 0 {
                *polls -= 1;
                return Ok(Some(STATE_LOADING.to_owned()));
            }
            let visible = *self.visible_batches.lock();
            Ok(Some(if visible >= self.batches.len() {
                STATE_ENDED.to_owned()
            } else {
                "loaded".to_owned()
            }))
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

    async fn mount_author(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "users.getInfo"))
            .and(query_param("uids", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!([{"uid": 100, "link": "https://my.mail.ru/some.author"}]),
            ))
            .mount(server)
            .await;
    }

    fn stream_params() -> Params {
        Params::new().set("uid", "100").set("scrape", 1)
    }

    #[tokio::test]
    async fn test_stream_respects_limit() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let page = Arc::new(StreamPage::new(vec![
            vec!["E1", "E2", "E3"],
            vec!["E4", "E5"],
        ]));
        let scraper = scraper_over(&server.uri(), page as Arc<dyn Page>);

        let result = scraper
            .call("stream.getByAuthor", stream_params().set("limit", 2))
            .await
            .unwrap();

        let events = result.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["id"], "e1");
        assert_eq!(events[1]["id"], "e2");
    }

    #[tokio::test]
    async fn test_stream_paginates_to_end() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let page = Arc::new(StreamPage::new(vec![
            vec!["E1", "E2"],
            vec!["E3", "E4"],
            vec!["E5"],
        ]));
        let scraper = scraper_over(&server.uri(), page as Arc<dyn Page>);

        let result = scraper
            .call("stream.getByAuthor", stream_params().set("limit", 50))
            .await
            .unwrap();

        let ids: Vec<&str> = result
            .as_array()
            .unwrap()
            .iter()
            .map(|event| event["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["e1", "e2", "e3", "e4", "e5"]);
    }

    #[tokio::test]
    async fn test_stream_skip_cursor() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let page = Arc::new(StreamPage::new(vec![
            vec!["E1", "E2", "E3"],
            vec!["E4", "E5"],
        ]));
        let scraper = scraper_over(&server.uri(), page as Arc<dyn Page>);

        // Everything up to and including E2 is suppressed.
        let result = scraper
            .call(
                "stream.getByAuthor",
                stream_params().set("skip", "E2").set("limit", 10),
            )
            .await
            .unwrap();

        let ids: Vec<&str> = result
            .as_array()
            .unwrap()
            .iter()
            .map(|event| event["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["e3", "e4", "e5"]);
    }

    #[tokio::test]
    async fn test_stream_access_denied() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let mut page = StreamPage::new(vec![vec![]]);
        page.denied_html =
            Some(r#"<div class="b-history__access-denied">Access denied</div>"#.to_owned());
        let scraper = scraper_over(&server.uri(), Arc::new(page) as Arc<dyn Page>);

        let err = scraper
            .call("stream.getByAuthor", stream_params())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied));
    }

    #[tokio::test]
    async fn test_stream_blacklisted() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let mut page = StreamPage::new(vec![vec![]]);
        page.denied_html = Some(
            r#"<div class="b-history__access-denied">Вы находитесь в черном списке</div>"#
                .to_owned(),
        );
        let scraper = scraper_over(&server.uri(), Arc::new(page) as Arc<dyn Page>);

        let err = scraper
            .call("stream.getByAuthor", stream_params())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Blacklisted));
    }

    #[tokio::test]
    async fn test_stream_stalled_container() {
        let server = MockServer::start().await;
        mount_author(&server).await;

        let mut page = StreamPage::new(vec![vec!["E1"], vec!["E2"]]);
        page.stuck_loading = true;
        let scraper = scraper_over(&server.uri(), Arc::new(page) as Arc<dyn Page>);

        let err = scraper
            .call("stream.getByAuthor", stream_params().set("limit", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaginationStalled { .. }));
    }
}
