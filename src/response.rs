use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;

use crate::error::{Error, FormatError};

/// a completed response: status code, the peer's non-pseudo headers in the order received,
/// and the decoded JSON body (`Value::Null` for an empty body).
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub data: Value,
}

impl Response {
    pub(crate) fn from_parts(parts: http::response::Parts, body: Bytes) -> Result<Self, Error> {
        let status = parts.status.as_u16();
        let data = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|source| FormatError {
                preview: preview(&body),
                source,
            })?
        };
        Ok(Self {
            status,
            headers: parts.headers,
            data,
        })
    }
}

fn preview(body: &[u8]) -> String {
    let truncated = &body[..body.len().min(20)];
    String::from_utf8_lossy(truncated).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(status: u16) -> http::response::Parts {
        http::Response::builder().status(status).body(()).unwrap().into_parts().0
    }

    #[test]
    fn empty_body_decodes_to_null() {
        let res = Response::from_parts(parts(200), Bytes::new()).unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.data, Value::Null);
    }

    #[test]
    fn json_body_round_trips() {
        let res = Response::from_parts(parts(400), Bytes::from_static(br#"{"reason":"BadDeviceToken"}"#)).unwrap();
        assert_eq!(res.status, 400);
        assert_eq!(res.data["reason"], "BadDeviceToken");
    }

    #[test]
    fn non_json_body_is_format_error() {
        let err = Response::from_parts(parts(200), Bytes::from_static(b"not-json")).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }
}
