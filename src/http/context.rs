//! Per-request context
//!
//! Created by the dispatcher for every request and dropped when the response
//! has been produced. Never shared between requests.

use crate::http::response::ResponseHandle;
use crate::routing::{strip_query, strip_trailing_slash, Route};
use hyper::body::Bytes;
use hyper::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Raw request target, path plus query
    pub url: String,
    /// Path with query and trailing slash stripped
    pub path: String,
    pub headers: HeaderMap,
    /// Decoded query parameters; for repeated keys the last one wins
    pub query: HashMap<String, String>,
    /// Filled from the matched route's template
    pub params: HashMap<String, String>,
    /// Request body as read from the transport
    pub raw_body: Bytes,
    /// Parsed body, set by middleware such as [`crate::handler::JsonBody`]
    pub body: Option<Value>,
    /// Data handed forward by middleware continuations
    pub next: Value,
    pub route: Option<Arc<Route>>,
    response: ResponseHandle,
}

impl RequestContext {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, raw_body: Bytes) -> Self {
        let url = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string);
        let path = strip_trailing_slash(strip_query(&url)).to_string();
        let query = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            method,
            url,
            path,
            headers,
            query,
            params: HashMap::new(),
            raw_body,
            body: None,
            next: Value::Object(Map::new()),
            route: None,
            response: ResponseHandle::new(),
        }
    }

    /// Shorthand for a bodiless request, mostly useful in tests
    pub fn from_parts(method: Method, url: &str) -> Result<Self, hyper::http::uri::InvalidUri> {
        let uri: Uri = url.parse()?;
        Ok(Self::new(method, &uri, HeaderMap::new(), Bytes::new()))
    }

    /// Handle through which this request's response is written
    pub const fn response(&self) -> &ResponseHandle {
        &self.response
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Store a continuation payload, replacing whatever was in `next`
    pub fn store_next(&mut self, payload: Value) {
        self.next = payload;
    }
}

/// Convert a string map into a JSON object
pub fn map_to_value(map: &HashMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_parses_url() {
        let ctx = RequestContext::from_parts(Method::GET, "/posts/tech/?count=3&tag=a%20b").unwrap();
        assert_eq!(ctx.url, "/posts/tech/?count=3&tag=a%20b");
        assert_eq!(ctx.path, "/posts/tech");
        assert_eq!(ctx.query_value("count"), Some("3"));
        assert_eq!(ctx.query_value("tag"), Some("a b"));
        assert!(ctx.params.is_empty());
        assert_eq!(ctx.next, json!({}));
        assert!(ctx.route.is_none());
        assert!(!ctx.response().is_written());
    }

    #[test]
    fn test_repeated_query_key_last_wins() {
        let ctx = RequestContext::from_parts(Method::GET, "/?a=1&a=2").unwrap();
        assert_eq!(ctx.query_value("a"), Some("2"));
    }

    #[test]
    fn test_store_next_replaces() {
        let mut ctx = RequestContext::from_parts(Method::GET, "/").unwrap();
        ctx.store_next(json!({"hello": 5}));
        ctx.store_next(json!({"user": "ann"}));
        assert_eq!(ctx.next, json!({"user": "ann"}));

        ctx.store_next(json!({}));
        assert_eq!(ctx.next, json!({}));
        ctx.store_next(json!([1, 2]));
        assert_eq!(ctx.next, json!([1, 2]));
    }

    #[test]
    fn test_clone_shares_response_handle() {
        let ctx = RequestContext::from_parts(Method::GET, "/").unwrap();
        let copy = ctx.clone();
        copy.response()
            .write(crate::http::Reply::text(200, "ok"))
            .unwrap();
        assert!(ctx.response().is_written());
    }

    #[test]
    fn test_map_to_value() {
        let mut map = HashMap::new();
        map.insert("count".to_string(), "3".to_string());
        assert_eq!(map_to_value(&map), json!({"count": "3"}));
    }
}
