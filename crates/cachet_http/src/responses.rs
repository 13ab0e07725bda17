use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::Full;

pub type HttpResponse = Response<Full<Bytes>>;

pub const SERVER_NAME: &str = "cachet/0.1.0";
pub const X_CACHE: &str = "x-cache";

/// Where a 200 body came from, reported in `X-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Status + `Server` header + body, no content type.
fn bare_response(status: StatusCode, body: Bytes) -> HttpResponse {
    let mut res = Response::new(Full::new(body));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    res
}

/// Generic helper: status + content type + body.
fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> HttpResponse {
    let mut res = bare_response(status, body);
    res.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    res
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
    response(status, "text/plain; charset=utf-8", Bytes::from_static(body.as_bytes()))
}

/// 200 with cached or freshly fetched bytes, returned verbatim.
///
/// Only the bytes are cached, so no `Content-Type` is sent on either path;
/// clients sniff the payload the same way on a hit and on a miss.
pub fn body_200(body: Bytes, cache: CacheStatus) -> HttpResponse {
    let mut res = bare_response(StatusCode::OK, body);
    res.headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(cache.as_str()));
    res
}

pub fn send_400() -> HttpResponse {
    text_response(StatusCode::BAD_REQUEST, "400 Bad Request\n")
}

pub fn send_429() -> HttpResponse {
    text_response(StatusCode::TOO_MANY_REQUESTS, "429 Too Many Requests\n")
}

pub fn send_500() -> HttpResponse {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{header, StatusCode};
    use http_body_util::BodyExt;

    use super::{body_200, send_429, CacheStatus, X_CACHE};

    #[tokio::test]
    async fn body_200_returns_bytes_verbatim() {
        let res = body_200(Bytes::from_static(b"\x00raw\xff"), CacheStatus::Hit);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[X_CACHE], "HIT");
        assert!(res.headers().get(header::CONTENT_TYPE).is_none());

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"\x00raw\xff");
    }

    #[test]
    fn send_429_is_throttled() {
        let res = send_429();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["server"], "cachet/0.1.0");
    }
}
