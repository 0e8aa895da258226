//! Method dispatch facade.
//!
//! The platform exposes hundreds of hierarchically-named RPC methods
//! (`users.getInfo`, `stream.getByAuthor`, …). Rather than representing
//! each as a literal function — an unbounded maintenance burden — the
//! facade defers name resolution to call time: the method is an explicit
//! string key, either passed whole to [`Api::call`] or accumulated through
//! the [`MethodCall`] builder.
//!
//! # Example
//!
//! ```no_run
//! use mailru_api::{Api, Credentials, Params, Session};
//!
//! # async fn example() -> mailru_api::Result<()> {
//! let session = Session::token(Credentials::server_server("423004", "secret", "token"))?;
//! let api = Api::new(session);
//!
//! // Whole name at once...
//! let friends = api.call("friends.get", Params::new()).await?;
//!
//! // ...or accumulated segment by segment.
//! let info = api
//!     .method("users")
//!     .sub("getInfo")
//!     .param("uids", "12345")
//!     .send()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::params::Params;
use crate::session::Session;

// ============================================================================
// Api
// ============================================================================

/// The Platform@Mail.Ru REST API facade.
///
/// Cheap to clone; clones share the underlying [`Session`].
#[derive(Clone)]
pub struct Api {
    session: Arc<Session>,
}

// ============================================================================
// Api - Constructors
// ============================================================================

impl Api {
    /// Creates an API facade over a session.
    #[inline]
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    /// Creates an API facade over a shared session.
    #[inline]
    #[must_use]
    pub fn from_arc(session: Arc<Session>) -> Self {
        Self { session }
    }
}

// ============================================================================
// Api - Dispatch
// ============================================================================

impl Api {
    /// Returns the underlying session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Starts a method call builder.
    #[inline]
    #[must_use]
    pub fn method(&self, name: impl Into<String>) -> MethodCall<'_> {
        MethodCall {
            api: self,
            name: name.into(),
            params: Params::new(),
        }
    }

    /// Calls a platform method by its full dotted name.
    ///
    /// Injects the `method` parameter and performs a signed request.
    ///
    /// # Errors
    ///
    /// Propagates the session error policy; see [`Session::request_signed`].
    pub async fn call(&self, name: &str, params: Params) -> Result<Value> {
        debug!(method = name, "API call");

        let mut params = params;
        params.insert("method", name);
        self.session.request_signed(&params).await
    }
}

// ============================================================================
// MethodCall
// ============================================================================

/// A method call under construction.
///
/// Accumulates the dotted method name and the query parameters, then
/// dispatches through [`Api::call`].
#[derive(Clone)]
pub struct MethodCall<'a> {
    api: &'a Api,
    name: String,
    params: Params,
}

impl MethodCall<'_> {
    /// Appends a segment to the dotted method name.
    #[inline]
    #[must_use]
    pub fn sub(mut self, segment: &str) -> Self {
        self.name = format!("{}.{}", self.name, segment);
        self
    }

    /// Sets a query parameter.
    #[inline]
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Merges a parameter map into the call.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        for (key, value) in params.iter() {
            self.params.insert(key.clone(), value.clone());
        }
        self
    }

    /// Returns the accumulated dotted method name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the call.
    ///
    /// # Errors
    ///
    /// Propagates the session error policy; see [`Session::request_signed`].
    pub async fn send(self) -> Result<Value> {
        self.api.call(&self.name, self.params).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::session::signature::Credentials;

    fn api(server: &MockServer) -> Api {
        let session = Session::builder()
            .base_url(format!("{}/platform", server.uri()))
            .credentials(Credentials::server_server("123", "secret key", "session key"))
            .build()
            .unwrap();
        Api::new(session)
    }

    #[test]
    fn test_method_name_accumulation() {
        let server_api = Api::new(
            Session::token(Credentials::server_server("1", "s", "t")).unwrap(),
        );
        let call = server_api.method("users").sub("getInfo");
        assert_eq!(call.name(), "users.getInfo");

        let deep = server_api.method("stream").sub("comments").sub("get");
        assert_eq!(deep.name(), "stream.comments.get");
    }

    #[tokio::test]
    async fn test_call_injects_method_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "users.getInfo"))
            .and(query_param("uids", "12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uid": 12345}])))
            .mount(&server)
            .await;

        let api = api(&server);
        let body = api
            .call("users.getInfo", Params::new().set("uids", "12345"))
            .await
            .unwrap();
        assert_eq!(body, json!([{"uid": 12345}]));
    }

    #[tokio::test]
    async fn test_builder_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "friends.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["1", "2"])))
            .mount(&server)
            .await;

        let api = api(&server);
        let body = api.method("friends").sub("get").send().await.unwrap();
        assert_eq!(body, json!(["1", "2"]));
    }

    #[tokio::test]
    async fn test_falsy_params_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/platform/api"))
            .and(query_param("method", "friends.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let api = api(&server);
        // `ext=0` is falsy and must be dropped; the mock would not match a
        // request carrying an unexpected signature over it.
        let body = api
            .method("friends")
            .sub("get")
            .param("ext", 0)
            .send()
            .await
            .unwrap();
        assert_eq!(body, json!([]));
    }
}
