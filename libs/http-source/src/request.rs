use crate::error::HttpError;
use crate::model::RequestSpec;
use bytes::Bytes;
use http::{HeaderValue, Request, header};
use http_body_util::Full;

/// Turn a validated [`RequestSpec`] into the request sent on the wire.
///
/// A configured body (even an empty one) is framed with an explicit
/// `Content-Length`. Without a body no framing header is added, so GET and
/// HEAD go out bare. A `Host` header among the request headers is carried
/// through and takes precedence over the URL authority.
///
/// # Errors
/// Returns `HttpError::RequestBuild` if the parts cannot be assembled.
pub fn build_request(spec: &RequestSpec) -> Result<Request<Full<Bytes>>, HttpError> {
    let mut builder = Request::builder()
        .method(spec.method().as_http())
        .uri(spec.uri().clone());

    if let Some(headers) = builder.headers_mut() {
        headers.extend(spec.headers().clone());
    }

    let body = match spec.body() {
        Some(bytes) => {
            builder = builder.header(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Full::new(bytes.clone())
        }
        None => Full::new(Bytes::new()),
    };

    Ok(builder.body(body)?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use http_body::Body;

    fn spec(config: RequestConfig) -> RequestSpec {
        config.validate().unwrap()
    }

    #[test]
    fn test_no_body_has_no_framing() {
        let req = build_request(&spec(RequestConfig::get("http://example.com/"))).unwrap();

        assert_eq!(req.method(), http::Method::GET);
        assert!(req.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(req.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(req.body().size_hint().exact(), Some(0));
    }

    #[test]
    fn test_body_sets_content_length() {
        let config = RequestConfig {
            method: Some("POST".to_owned()),
            request_body: Some("hello".to_owned()),
            ..RequestConfig::get("http://example.com/")
        };
        let req = build_request(&spec(config)).unwrap();

        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(req.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(req.body().size_hint().exact(), Some(5));
    }

    #[test]
    fn test_empty_body_is_still_framed() {
        let config = RequestConfig {
            request_body: Some(String::new()),
            ..RequestConfig::get("http://example.com/")
        };
        let req = build_request(&spec(config)).unwrap();
        assert_eq!(req.headers()[header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn test_headers_and_host_override_carried() {
        let mut config = RequestConfig::get("http://127.0.0.1:8080/");
        config
            .request_headers
            .insert("Host".to_owned(), "virtual.example".to_owned());
        config
            .request_headers
            .insert("Accept".to_owned(), "application/json".to_owned());
        let req = build_request(&spec(config)).unwrap();

        assert_eq!(req.headers()[header::HOST], "virtual.example");
        assert_eq!(req.headers()[header::ACCEPT], "application/json");
        assert_eq!(req.uri().host(), Some("127.0.0.1"));
    }
}
