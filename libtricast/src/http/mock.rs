//! Scripted transport for testing
//!
//! `MockTransport` answers requests from a table of routes instead of the
//! network, and records every request it sees. It is available in all builds
//! so integration tests can drive the real adapters end to end.
//!
//! Routes match on method plus a suffix of the URL path. When several routes
//! match, the longest suffix wins. A route with several replies hands them out
//! in order and then keeps repeating the last one.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};

#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    Error(TransportError),
}

impl From<HttpResponse> for MockReply {
    fn from(response: HttpResponse) -> Self {
        MockReply::Response(response)
    }
}

impl From<TransportError> for MockReply {
    fn from(error: TransportError) -> Self {
        MockReply::Error(error)
    }
}

struct Route {
    method: Method,
    suffix: String,
    replies: VecDeque<MockReply>,
}

impl Route {
    fn matches(&self, method: Method, path: &str) -> bool {
        self.method == method && path.ends_with(&self.suffix)
    }

    fn next_reply(&mut self) -> Option<MockReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// Transport that replays scripted responses
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Path part of a URL, without scheme, host or query
fn path_of(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    after_scheme
        .find('/')
        .map_or("/", |index| &after_scheme[index..])
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` requests whose path ends with `suffix`
    pub fn on(self, method: Method, suffix: &str, reply: impl Into<MockReply>) -> Self {
        self.on_sequence(method, suffix, vec![reply.into()])
    }

    /// Answer with each reply in turn, repeating the last
    pub fn on_sequence(self, method: Method, suffix: &str, replies: Vec<MockReply>) -> Self {
        lock(&self.routes).push(Route {
            method,
            suffix: suffix.to_string(),
            replies: replies.into(),
        });
        self
    }

    /// Every request sent so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Requests sent with `method` to a path ending in `suffix`
    pub fn requests_to(&self, method: Method, suffix: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && path_of(&r.url).ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request.clone());

        let path = path_of(&request.url).to_string();
        let reply = {
            let mut routes = lock(&self.routes);
            routes
                .iter_mut()
                .filter(|route| route.matches(request.method, &path))
                .max_by_key(|route| route.suffix.len())
                .and_then(Route::next_reply)
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(TransportError::Other(format!(
                "no mock route for {} {}",
                request.method.as_str(),
                request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("https://api.x.com/2/users/me"), "/2/users/me");
        assert_eq!(path_of("https://api.x.com/2/tweets?x=1"), "/2/tweets");
        assert_eq!(path_of("https://api.x.com"), "/");
    }

    #[tokio::test]
    async fn test_longest_suffix_wins() {
        let mock = MockTransport::new()
            .on(Method::Get, "/me", HttpResponse::new(200, "me"))
            .on(Method::Get, "/123/media", HttpResponse::new(200, "media"));

        let response = mock
            .send(HttpRequest::get("https://graph.example.com/v19.0/me"))
            .await
            .unwrap();
        assert_eq!(response.body, "me");

        let response = mock
            .send(HttpRequest::get("https://graph.example.com/v19.0/123/media"))
            .await
            .unwrap();
        assert_eq!(response.body, "media");
    }

    #[tokio::test]
    async fn test_method_must_match() {
        let mock = MockTransport::new().on(Method::Post, "/2/tweets", HttpResponse::new(201, "{}"));

        let result = mock.send(HttpRequest::get("https://api.x.com/2/tweets")).await;
        assert!(matches!(result, Err(TransportError::Other(msg)) if msg.contains("no mock route")));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last_reply() {
        let mock = MockTransport::new().on_sequence(
            Method::Get,
            "/status",
            vec![
                HttpResponse::new(500, "first").into(),
                HttpResponse::json_value(200, json!({"ok": true})).into(),
            ],
        );

        let url = "https://api.example.com/status";
        assert_eq!(mock.send(HttpRequest::get(url)).await.unwrap().status, 500);
        assert_eq!(mock.send(HttpRequest::get(url)).await.unwrap().status, 200);
        assert_eq!(mock.send(HttpRequest::get(url)).await.unwrap().status, 200);
        assert_eq!(mock.requests_to(Method::Get, "/status").len(), 3);
    }

    #[tokio::test]
    async fn test_transport_error_reply() {
        let mock = MockTransport::new().on(
            Method::Get,
            "/slow",
            TransportError::Timeout("after 30s".to_string()),
        );

        let result = mock.send(HttpRequest::get("https://api.example.com/slow")).await;
        assert_eq!(result, Err(TransportError::Timeout("after 30s".to_string())));
    }
}
