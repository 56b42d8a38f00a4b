use core::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::config::Config;
use crate::error::Error;

/// an immutable HTTP/2 POST request. Built via [`Request::builder`].
///
/// `deadline` is `None` to mean "no deadline" (spec's `+inf`).
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) deadline: Option<Instant>,
}

impl Request {
    pub fn builder(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub(crate) fn into_body(self) -> Bytes {
        self.body
    }

    /// pseudo-headers followed by caller headers, in a fixed wire order: method, scheme,
    /// authority, path, then caller headers in submission order.
    pub(crate) fn pseudo_and_headers(&self, config: &Config) -> http::Request<()> {
        let uri = http::Uri::builder()
            .scheme(config.scheme().clone())
            .authority(config.authority())
            .path_and_query(self.path.as_str())
            .build()
            .expect("scheme/authority/path were already validated by Config/RequestBuilder");

        let mut builder = http::Request::builder().method(http::Method::POST).uri(uri);

        for (name, value) in self.headers.iter() {
            builder = builder.header(name, value);
        }

        builder.body(()).expect("header insertion cannot fail after validation")
    }
}

/// incrementally builds a [`Request`]. Header insertion order is preserved on the wire.
pub struct RequestBuilder {
    path: String,
    headers: HeaderMap,
    body: Bytes,
    deadline: Option<Instant>,
}

impl RequestBuilder {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// serialize `value` as the JSON request body.
    pub fn json(mut self, value: &impl Serialize) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(value).map_err(|e| crate::error::FormatError {
            preview: String::new(),
            source: e,
        })?;
        self.body = Bytes::from(bytes);
        Ok(self)
    }

    /// relative deadline from now. mutually exclusive with [`Self::deadline`]; the later call wins.
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.deadline = Instant::now().checked_add(dur);
        self
    }

    /// absolute monotonic deadline. mutually exclusive with [`Self::timeout`]; the later call wins.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    pub fn build(self, config: &Config) -> Result<Request, Error> {
        if self.body.len() > config.max_payload_size() {
            return Err(Error::PayloadTooLarge {
                len: self.body.len(),
                max: config.max_payload_size(),
            });
        }
        Ok(Request {
            path: self.path,
            headers: self.headers,
            body: self.body,
            deadline: self.deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> Config {
        Config::builder("https://localhost:2197").unwrap().build()
    }

    #[test]
    fn pseudo_headers_in_fixed_order() {
        let config = config();
        let req = Request::builder("/3/device/aaa")
            .header(HeaderName::from_static("apns-topic"), HeaderValue::from_static("com.example.app"))
            .json(&json!({"baz": 42}))
            .unwrap()
            .build(&config)
            .unwrap();

        let wire = req.pseudo_and_headers(&config);
        assert_eq!(wire.method(), http::Method::POST);
        assert_eq!(wire.uri().scheme_str(), Some("https"));
        assert_eq!(wire.uri().authority().unwrap().as_str(), "localhost:2197");
        assert_eq!(wire.uri().path(), "/3/device/aaa");
        assert_eq!(wire.headers().get("apns-topic").unwrap(), "com.example.app");
    }

    #[test]
    fn rejects_oversized_body() {
        let config = Config::builder("https://localhost:2197").unwrap().max_payload_size(4).build();
        let err = Request::builder("/3/device/aaa").body(Bytes::from_static(b"12345")).build(&config).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { len: 5, max: 4 }));
    }

    #[test]
    fn no_deadline_by_default() {
        let req = Request::builder("/x").build(&config()).unwrap();
        assert!(req.deadline().is_none());
    }

    #[test]
    fn timeout_sets_future_deadline() {
        let before = Instant::now();
        let req = Request::builder("/x").timeout(Duration::from_millis(100)).build(&config()).unwrap();
        assert!(req.deadline().unwrap() > before);
    }
}
