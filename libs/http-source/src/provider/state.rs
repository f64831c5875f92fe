use crate::model::ResponseResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Computed outputs shared by the data source, resource and ephemeral resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseState {
    /// URL of the request
    pub id: String,
    pub status_code: u16,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
    /// Deprecated alias of `response_body`
    pub body: String,
    pub response_body_base64: String,
}

impl ResponseState {
    /// Outputs of a completed request to `url`.
    #[must_use]
    pub fn from_result(url: &str, result: ResponseResult) -> Self {
        Self {
            id: url.to_owned(),
            status_code: result.status_code,
            response_headers: result.headers,
            body: result.body.clone(),
            response_body: result.body,
            response_body_base64: result.body_base64,
        }
    }

    /// Outputs for `url` when no request was sent: empty bodies and headers,
    /// status 0.
    #[must_use]
    pub fn placeholder(url: &str) -> Self {
        Self {
            id: url.to_owned(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_from_result_fills_body_alias() {
        let result = ResponseResult {
            status_code: 200,
            headers: BTreeMap::from([("Content-Type".to_owned(), "text/plain".to_owned())]),
            body: "1.0.0".to_owned(),
            body_base64: "MS4wLjA=".to_owned(),
            body_is_utf8: true,
        };

        let state = ResponseState::from_result("http://localhost/get", result);
        assert_eq!(state.id, "http://localhost/get");
        assert_eq!(state.status_code, 200);
        assert_eq!(state.response_body, "1.0.0");
        assert_eq!(state.body, "1.0.0");
        assert_eq!(state.response_body_base64, "MS4wLjA=");
        assert_eq!(state.response_headers["Content-Type"], "text/plain");
    }

    #[test]
    fn test_placeholder() {
        let state = ResponseState::placeholder("http://localhost/");
        assert_eq!(state.id, "http://localhost/");
        assert_eq!(state.status_code, 0);
        assert!(state.response_headers.is_empty());
        assert!(state.response_body.is_empty());
        assert!(state.body.is_empty());
        assert!(state.response_body_base64.is_empty());
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let state: ResponseState = serde_json::from_str(r#"{"status_code": 204}"#).unwrap();
        assert_eq!(state.status_code, 204);
        assert!(state.id.is_empty());
        assert!(state.response_headers.is_empty());
    }
}
