use crate::error::HttpError;
use crate::model::ResponseResult;
use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, Response};
use http_body_util::BodyExt;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Type alias for the boxed response body that supports decompression.
///
/// This type can hold either a raw body or a decompressed body (gzip/br/deflate).
/// The body is type-erased to allow the decompression layer to work transparently.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date (RFC 1123): "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if the header is missing, unparsable, or negative.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    // A date already in the past yields None
    let parsed = httpdate::parse_http_date(trimmed).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// Read the whole body and build the [`ResponseResult`].
///
/// # Errors
/// Returns `HttpError::Body` if the body stream fails before its end.
pub async fn read_response(response: Response<ResponseBody>) -> Result<ResponseResult, HttpError> {
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.map_err(HttpError::Body)?.to_bytes();

    Ok(map_response(parts.status.as_u16(), &parts.headers, &bytes))
}

/// Map a status, header block and raw body into a [`ResponseResult`].
#[must_use]
pub fn map_response(status: u16, headers: &HeaderMap, body: &[u8]) -> ResponseResult {
    let body_is_utf8 = std::str::from_utf8(body).is_ok();
    if !body_is_utf8 {
        tracing::debug!(len = body.len(), "response body is not valid UTF-8");
    }

    ResponseResult {
        status_code: status,
        headers: join_headers(headers),
        body: String::from_utf8_lossy(body).into_owned(),
        body_base64: base64::engine::general_purpose::STANDARD.encode(body),
        body_is_utf8,
    }
}

/// Collapse repeated headers into one entry per canonical name.
///
/// Values keep their arrival order and are joined with `", "` (RFC 9110 §5.2).
pub fn join_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut joined = BTreeMap::new();
    for name in headers.keys() {
        let values: Vec<_> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .collect();
        joined.insert(canonical_header_name(name.as_str()), values.join(", "));
    }
    joined
}

/// `content-type` → `Content-Type`, `x-request-id` → `X-Request-Id`.
pub fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "  60  ".parse().unwrap());

        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_retry_after_rejected_values() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        for value in ["not-a-number", "-5", "Wed, 21 Oct 2015 07:28:00 GMT"] {
            let mut headers = HeaderMap::new();
            headers.insert(http::header::RETRY_AFTER, value.parse().unwrap());
            assert_eq!(parse_retry_after(&headers), None, "{value}");
        }
    }

    #[test]
    fn test_parse_retry_after_http_date_in_future() {
        let mut headers = HeaderMap::new();
        let future_time = SystemTime::now() + Duration::from_secs(60);
        headers.insert(
            http::header::RETRY_AFTER,
            httpdate::fmt_http_date(future_time).parse().unwrap(),
        );

        let duration = parse_retry_after(&headers).unwrap();
        assert!(duration.as_secs() >= 58 && duration.as_secs() <= 62);
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-double"), "X-Double");
        assert_eq!(canonical_header_name("www-authenticate"), "Www-Authenticate");
        assert_eq!(canonical_header_name("etag"), "Etag");
    }

    #[test]
    fn test_duplicate_headers_joined_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-double", HeaderValue::from_static("1"));
        headers.append("x-double", HeaderValue::from_static("2"));
        headers.append("x-single", HeaderValue::from_static("only"));

        let joined = join_headers(&headers);
        assert_eq!(joined["X-Double"], "1, 2");
        assert_eq!(joined["X-Single"], "only");
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn test_map_utf8_body() {
        let result = map_response(200, &HeaderMap::new(), "你好世界".as_bytes());
        assert_eq!(result.status_code, 200);
        assert_eq!(result.body, "你好世界");
        assert_eq!(result.body_base64, "5L2g5aW95LiW55WM");
        assert!(result.body_is_utf8);
    }

    #[test]
    fn test_map_binary_body() {
        // 1x1 transparent GIF
        let gif = base64::engine::general_purpose::STANDARD
            .decode("R0lGODlhAQABAIAAAAAAAAAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw==")
            .unwrap();

        let result = map_response(200, &HeaderMap::new(), &gif);
        assert!(!result.body_is_utf8);
        assert!(result.body.contains('\u{FFFD}'));
        assert_eq!(
            result.body_base64,
            "R0lGODlhAQABAIAAAAAAAAAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw=="
        );
    }

    #[test]
    fn test_map_empty_body() {
        let result = map_response(204, &HeaderMap::new(), b"");
        assert_eq!(result.body, "");
        assert_eq!(result.body_base64, "");
        assert!(result.body_is_utf8);
    }

    #[tokio::test]
    async fn test_read_response() {
        let body = http_body_util::Full::new(Bytes::from_static(b"1.0.0"))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed();
        let response = Response::builder()
            .status(418)
            .header("content-type", "text/plain")
            .body(body)
            .unwrap();

        let result = read_response(response).await.unwrap();
        assert_eq!(result.status_code, 418);
        assert_eq!(result.body, "1.0.0");
        assert_eq!(result.headers["Content-Type"], "text/plain");
    }
}
