//! Stream event reconstruction.
//!
//! Rendered feed events carry a packed `data-astat` attribute and a DOM
//! body. [`Astat`] decodes the attribute; [`Event::from_html`] combines it
//! with the scraped body into a record whose keys mirror the JSON the
//! `stream.*` API methods return, so scraped and API-returned events are
//! interchangeable for callers.
//!
//! A comment or like event nests the correspondent record under
//! `subevent`, exactly as the API does.

// ============================================================================
// Imports
// ============================================================================

use scraper::{ElementRef, Html};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

use super::selector;

// ============================================================================
// Selectors
// ============================================================================

mod sel {
    //! DOM selectors of the rendered feed markup.

    /// Main event body area (shifted variant).
    pub const EVENT: &str = "div.b-history_event_active-area_shift";

    /// Correspondent (sub-event) body area.
    pub const SUBEVENT: &str =
        "div.b-history_event_active-area:not(.b-history_event_active-area_shift)";

    /// Author link inside the event head.
    pub const AUTHOR: &str =
        "div.b-history-event_head div.b-history-event__action .b-history-event__ownername";

    /// Permalink anchor inside the event timestamp.
    pub const URL: &str =
        "div.b-history-event_head div.b-history-event__action div.b-history-event_time a";

    /// Free-text body.
    pub const TEXT: &str = "div.b-history-event__body div.b-history-event__event-textbox2";

    /// Micropost status body.
    pub const STATUS: &str = "div.b-history-event__body div.b-history-event__event-textbox_status";

    /// Links embedded in a micropost status.
    pub const LINKS: &str =
        "div.b-history-event__body div.b-history-event__event-textbox_status a";

    /// Comment thread under the event.
    pub const COMMENTS: &str = "div.b-comments__history";
}

// ============================================================================
// Type Codes
// ============================================================================

/// Event types whose body carries an outbound click URL.
pub const CLICKABLE_TYPES: [&str; 4] = ["1-1", "3-23", "5-39", "5-41"];

/// The micropost (status) event type.
pub const STATUS_TYPE: &str = "3-23";

/// Returns the human-readable name of an event type code.
///
/// Unknown codes map to an empty string.
#[must_use]
pub fn type_name(code: &str) -> &'static str {
    match code {
        "1-1" => "photo_upload",
        "1-2" => "video_upload",
        "1-7" => "music_add",
        "3-3" => "user_community_actions_enter",
        "3-5" => "user_community_actions_leave",
        "3-23" => "micropost",
        "5-7" => "avatar_change",
        "5-10" => "gift_send",
        "5-11" => "gift_received",
        "5-16" => "app_add",
        "5-26" => "share",
        "5-28" => "app_info2",
        "5-37" => "gift_receive_multi",
        "5-39" => "community_post",
        "5-41" => "user_post",
        "5-44" => "community_video_upload",
        "5-47" => "community_photo_upload",
        _ => "",
    }
}

// ============================================================================
// Astat
// ============================================================================

/// The packed `data-astat` attribute of a feed event.
///
/// Colon-delimited: world id, event type code, event id, owner world id,
/// correspondent world id, correspondent event id, likes count, comments
/// count, timestamp, region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Astat {
    /// World id of the viewing user.
    pub user_world_id: i64,

    /// Raw event type code (`5-41`, `3-23-Comment`, …).
    pub event_type: String,

    /// Event id.
    pub event_id: String,

    /// World id of the stream owner.
    pub owner_world_id: String,

    /// World id of the correspondent event's owner.
    pub corr_world_id: String,

    /// Correspondent event id.
    pub corr_event_id: String,

    /// Number of likes.
    pub likes_count: i64,

    /// Number of comments.
    pub comments_count: i64,

    /// Event timestamp (Unix seconds).
    pub event_time: i64,

    /// Region code; often empty.
    pub region: String,
}

impl Astat {
    /// Decodes a `data-astat` attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scraper`] when fewer than nine segments are
    /// present.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() < 9 {
            return Err(Error::scraper(format!("malformed astat attribute: {raw}")));
        }

        Ok(Self {
            user_world_id: int_or_zero(parts[0]),
            event_type: parts[1].to_owned(),
            event_id: parts[2].to_owned(),
            owner_world_id: parts[3].to_owned(),
            corr_world_id: parts[4].to_owned(),
            corr_event_id: parts[5].to_owned(),
            likes_count: int_or_zero(parts[6]),
            comments_count: int_or_zero(parts[7]),
            event_time: int_or_zero(parts[8]),
            region: parts.get(9).copied().unwrap_or("").to_owned(),
        })
    }

    /// Returns the event id in canonical (lower-case) form.
    #[must_use]
    pub fn id(&self) -> String {
        self.event_id.to_lowercase()
    }

    /// Returns the event subtype.
    ///
    /// `event` unless the type code carries a third segment, which
    /// lower-cases into `comment` or `like`.
    #[must_use]
    pub fn subtype(&self) -> String {
        match self.event_type.split('-').nth(2) {
            None => "event".to_owned(),
            Some(third) => third.to_lowercase(),
        }
    }

    /// Returns the two-segment type code.
    ///
    /// For a plain event this is its own type; for a comment or like it
    /// is the type of the correspondent event.
    #[must_use]
    pub fn type_code(&self) -> String {
        self.event_type
            .split('-')
            .take(2)
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Returns the human-readable type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        type_name(&self.type_code())
    }
}

fn int_or_zero(text: &str) -> i64 {
    if text.is_empty() {
        0
    } else {
        text.parse().unwrap_or(0)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A stream event reconstructed from its DOM fragment.
///
/// Loosely typed by design: the keys mirror the API's own event shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    data: Map<String, Value>,
}

impl Event {
    /// Reconstructs an event from the outer HTML of its feed node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scraper`] for a fragment without a decodable
    /// `data-astat` attribute.
    pub fn from_html(html: &str) -> Result<Self> {
        let fragment = Html::parse_fragment(html);
        let root_selector = selector("[data-astat]")?;
        let root = fragment
            .select(&root_selector)
            .next()
            .ok_or_else(|| Error::scraper("event node without a data-astat attribute"))?;

        let astat = Astat::parse(root.value().attr("data-astat").unwrap_or(""))?;
        let has_comments = root.select(&selector(sel::COMMENTS)?).next().is_some();
        let commentable = i64::from(has_comments);
        let subtype = astat.subtype();

        let data = if subtype == "comment" || subtype == "like" {
            // The visible body belongs to the correspondent event; this
            // event is just the comment/like wrapper around it.
            let mut subevent = json_map(json!({
                "authors": [],
                "type_name": astat.type_name(),
                "likes_count": astat.likes_count,
                "user_text": "",
                "subtype": "event",
                "is_commentable": commentable,
                "type": astat.type_code(),
                "is_likeable": commentable,
                "id": astat.corr_event_id.clone(),
                "comments_count": astat.comments_count,
            }));

            if let Some(element) = root.select(&selector(sel::SUBEVENT)?).next() {
                subevent.extend(scrape_body(element, &astat.type_code())?);
            }

            json_map(json!({
                "time": astat.event_time,
                "author": {},
                "subevent": Value::Object(subevent),
                "subtype": subtype,
                "is_commentable": 0,
                "id": astat.id(),
                "is_likeable": 0,
            }))
        } else {
            let mut data = json_map(json!({
                "authors": [],
                "type_name": astat.type_name(),
                "likes_count": astat.likes_count,
                "time": astat.event_time,
                "user_text": "",
                "subtype": subtype,
                "is_commentable": commentable,
                "type": astat.type_code(),
                "is_likeable": commentable,
                "id": astat.id(),
                "comments_count": astat.comments_count,
            }));

            if let Some(element) = root.select(&selector(sel::EVENT)?).next() {
                data.extend(scrape_body(element, &astat.type_code())?);
            }

            data
        };

        Ok(Self { data })
    }

    /// Returns the event id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        self.data.get("id").and_then(Value::as_str).unwrap_or("")
    }

    /// Returns a field of the record.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns the record as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

// ============================================================================
// Body Scraping
// ============================================================================

/// Scrapes the variable parts of an event body.
fn scrape_body(element: ElementRef<'_>, type_code: &str) -> Result<Map<String, Value>> {
    let mut body = Map::new();

    // Authors: everyone but the stream owner, linked from the head.
    let author_href = element
        .select(&selector(sel::AUTHOR)?)
        .next()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or("");
    let author_link = author_href.split('?').next().unwrap_or("");
    let authors = if author_link.is_empty() {
        json!([])
    } else {
        json!([{ "link": author_link }])
    };
    body.insert("authors".to_owned(), authors);

    // Outbound click URL, only for the clickable types.
    let mut click_url = String::new();
    if CLICKABLE_TYPES.contains(&type_code) {
        let href = element
            .select(&selector(sel::URL)?)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or("");
        if !href.is_empty() {
            click_url = format!("https://my.mail.ru{href}");
        }
    }
    body.insert("click_url".to_owned(), Value::String(click_url));

    // Free text; microposts overlay link hrefs onto the visible text.
    let text = if type_code == STATUS_TYPE {
        let status = element.select(&selector(sel::STATUS)?).next();
        let mut text = status.map(inner_text).unwrap_or_default();

        let links: Vec<(String, String)> = element
            .select(&selector(sel::LINKS)?)
            .map(|a| {
                (
                    a.value().attr("href").unwrap_or("").to_owned(),
                    inner_text(a),
                )
            })
            .collect();

        for (href, link_text) in &links {
            if !link_text.is_empty() {
                text = text.replace(link_text, href);
            }
        }

        let content = json!({ "type-id": "text", "contents": text.clone() });
        let mut media: Vec<Value> = links
            .iter()
            .map(|_| json!({ "object": "link", "content": content.clone() }))
            .collect();
        media.push(json!({ "object": "text", "content": text.clone() }));
        body.insert("text_media".to_owned(), Value::Array(media));

        text
    } else {
        element
            .select(&selector(sel::TEXT)?)
            .next()
            .map(inner_text)
            .unwrap_or_default()
    };
    body.insert("user_text".to_owned(), Value::String(text));

    Ok(body)
}

fn inner_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

fn json_map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event_html(astat: &str, body: &str) -> String {
        format!(
            r#"<div class="b-history-event" data-astat="{astat}">
                <div class="b-history_event_active-area b-history_event_active-area_shift">
                    {body}
                </div>
            </div>"#
        )
    }

    const POST_BODY: &str = r#"
        <div class="b-history-event_head">
            <div class="b-history-event__action">
                <a class="b-history-event__ownername" href="/some.author?ref=ho">Author</a>
                <div class="b-history-event_time"><a href="/some.author/post/1">now</a></div>
            </div>
        </div>
        <div class="b-history-event__body">
            <div class="b-history-event__event-textbox2">hello world</div>
        </div>
    "#;

    #[test]
    fn test_astat_parse() {
        let astat = Astat::parse("123:5-41:E5:456:789:E9:3:2:1600000000:ru").unwrap();
        assert_eq!(astat.user_world_id, 123);
        assert_eq!(astat.event_type, "5-41");
        assert_eq!(astat.id(), "e5");
        assert_eq!(astat.owner_world_id, "456");
        assert_eq!(astat.corr_event_id, "E9");
        assert_eq!(astat.likes_count, 3);
        assert_eq!(astat.comments_count, 2);
        assert_eq!(astat.event_time, 1_600_000_000);
        assert_eq!(astat.region, "ru");
    }

    #[test]
    fn test_astat_empty_counts() {
        let astat = Astat::parse("::E1:::::::").unwrap();
        assert_eq!(astat.user_world_id, 0);
        assert_eq!(astat.likes_count, 0);
        assert_eq!(astat.event_time, 0);
    }

    #[test]
    fn test_astat_malformed() {
        assert!(Astat::parse("1:2:3").is_err());
    }

    #[test]
    fn test_subtype_classification() {
        let event = Astat::parse("1:5-41:E1:2:3:E2:0:0:1:").unwrap();
        assert_eq!(event.subtype(), "event");
        assert_eq!(event.type_code(), "5-41");
        assert_eq!(event.type_name(), "user_post");

        let comment = Astat::parse("1:3-23-Comment:E1:2:3:E2:0:0:1:").unwrap();
        assert_eq!(comment.subtype(), "comment");
        assert_eq!(comment.type_code(), "3-23");
        assert_eq!(comment.type_name(), "micropost");

        let like = Astat::parse("1:5-39-Like:E1:2:3:E2:0:0:1:").unwrap();
        assert_eq!(like.subtype(), "like");
    }

    #[test]
    fn test_type_name_table() {
        assert_eq!(type_name("1-1"), "photo_upload");
        assert_eq!(type_name("5-39"), "community_post");
        assert_eq!(type_name("9-99"), "");
    }

    #[test]
    fn test_event_from_html_user_post() {
        let html = event_html("123:5-41:E5:456:789:E9:3:2:1600000000:ru", POST_BODY);
        let event = Event::from_html(&html).unwrap();

        assert_eq!(event.id(), "e5");
        assert_eq!(event.get("type").unwrap(), "5-41");
        assert_eq!(event.get("type_name").unwrap(), "user_post");
        assert_eq!(event.get("subtype").unwrap(), "event");
        assert_eq!(event.get("likes_count").unwrap(), 3);
        assert_eq!(event.get("user_text").unwrap(), "hello world");
        assert_eq!(
            event.get("authors").unwrap(),
            &serde_json::json!([{"link": "/some.author"}])
        );
        // 5-41 is clickable.
        assert_eq!(
            event.get("click_url").unwrap(),
            "https://my.mail.ru/some.author/post/1"
        );
        // No comment thread in the fragment.
        assert_eq!(event.get("is_commentable").unwrap(), 0);
    }

    #[test]
    fn test_event_non_clickable_type() {
        let html = event_html("123:5-7:E1:456:789:E2:0:0:1600000000:", POST_BODY);
        let event = Event::from_html(&html).unwrap();
        assert_eq!(event.get("type_name").unwrap(), "avatar_change");
        assert_eq!(event.get("click_url").unwrap(), "");
    }

    #[test]
    fn test_event_micropost_link_overlay() {
        let body = r#"
            <div class="b-history-event__body">
                <div class="b-history-event__event-textbox_status">
                    look at <a href="https://example.com/page">this page</a> now
                </div>
            </div>
        "#;
        let html = event_html("123:3-23:E7:456:789:E8:0:0:1600000000:", body);
        let event = Event::from_html(&html).unwrap();

        // Link text replaced by its href in the visible text.
        let text = event.get("user_text").unwrap().as_str().unwrap();
        assert!(text.contains("https://example.com/page"));
        assert!(!text.contains("this page"));

        let media = event.get("text_media").unwrap().as_array().unwrap();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0]["object"], "link");
        assert_eq!(media[1]["object"], "text");
    }

    #[test]
    fn test_event_comment_nests_subevent() {
        let html = format!(
            r#"<div class="b-history-event" data-astat="1:5-39-Comment:E10:2:3:E9:4:5:1600000000:">
                <div class="b-history_event_active-area">{POST_BODY}</div>
            </div>"#
        );
        let event = Event::from_html(&html).unwrap();

        assert_eq!(event.id(), "e10");
        assert_eq!(event.get("subtype").unwrap(), "comment");
        assert_eq!(event.get("is_commentable").unwrap(), 0);

        let subevent = event.get("subevent").unwrap();
        assert_eq!(subevent["id"], "E9");
        assert_eq!(subevent["type"], "5-39");
        assert_eq!(subevent["type_name"], "community_post");
        assert_eq!(subevent["likes_count"], 4);
        assert_eq!(subevent["user_text"], "hello world");
    }

    #[test]
    fn test_event_missing_astat() {
        let err = Event::from_html("<div class=\"b-history-event\"></div>").unwrap_err();
        assert!(err.is_scraper_error());
    }
}
