//! Mailru API - async client for the Platform@Mail.Ru REST API.
//!
//! This library provides the authenticated request pipeline for the
//! platform's REST API — OAuth-style grant negotiation, the dual request
//! signature scheme, and an explicit method-dispatch facade — plus a
//! browser-backed scraper layer for data the official API does not expose.
//!
//! # Architecture
//!
//! The request pipeline is one signing core behind a small set of
//! strategy values:
//!
//! - A [`Session`] owns the credentials and performs the signed HTTP
//!   round trip; which signature circuit it uses follows from which
//!   credential fields are populated.
//! - A [`Grant`] is a one-shot token exchange (authorization code,
//!   password, refresh token); [`ImplicitFlow`] walks the interactive
//!   login UI instead.
//! - An [`Api`] turns dotted method names (`"users.getInfo"`) into signed
//!   requests at call time — methods are string keys, never literal
//!   functions.
//! - An [`ApiScraper`] mirrors the [`Api`] calling convention but, for a
//!   registered subset of methods, drives a headless browser through the
//!   rendered UI when the caller opts in with a `scrape` parameter.
//!
//! The browser itself is a capability this crate consumes, not one it
//! implements: embedders provide the [`Browser`] / [`Page`] traits.
//!
//! # Quick Start
//!
//! ```no_run
//! use mailru_api::{Api, Credentials, Params, Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::token(Credentials::server_server(
//!         "423004",
//!         "secret key",
//!         "access token",
//!     ))?;
//!
//!     let api = Api::new(session);
//!     let friends = api.call("friends.get", Params::new()).await?;
//!     println!("{friends}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Method dispatch facade |
//! | [`auth`] | Grant negotiators and the interactive login flow |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`params`] | Request parameter map |
//! | [`scraper`] | Browser-backed scraper layer |
//! | [`session`] | Signed request pipeline, credentials, cookies |

// ============================================================================
// Modules
// ============================================================================

/// Method dispatch facade.
///
/// Turns dotted method names into signed requests at call time.
pub mod api;

/// Authorization grants.
///
/// One-shot token exchanges and the interactive login flow.
pub mod auth;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Request parameter map.
///
/// Order-insensitive parameters with platform falsy-value semantics.
pub mod params;

/// Browser-backed scraper layer.
///
/// Pagination state machines over a headless browser capability.
pub mod scraper;

/// Session and request signing.
///
/// Credentials, signature circuits, cookies, and the HTTP round trip.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

// Facade types
pub use api::{Api, MethodCall};

// Authorization types
pub use auth::form::Form;
pub use auth::implicit::{FlowMarkers, ImplicitFlow, ImplicitGrant};
pub use auth::{Grant, GrantResult, full_scope};

// Error types
pub use error::{Error, Result};

// Parameter types
pub use params::Params;

// Scraper types (`self::` disambiguates from the `scraper` crate)
pub use self::scraper::browser::{Browser, Page};
pub use self::scraper::event::{Astat, Event};
pub use self::scraper::group::GroupItem;
pub use self::scraper::poll::PollBudget;
pub use self::scraper::pool::{PageKey, PagePool};
pub use self::scraper::{ApiScraper, ScraperBuilder};

// Session types
pub use session::cookies::Cookie;
pub use session::signature::{Credentials, SignatureCircuit};
pub use session::{Session, SessionBuilder};
