use std::time::Duration;

use bytes::Bytes;
use cachet_http::{ProxyRequest, ProxyResponse};
use http::{uri::Scheme, Request, Uri};
use http_body_util::{BodyExt, Full, Limited};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn, Span};

use crate::{error::ForwardError, headers::copy_request_headers, path::join_origin_path};

/// Static description of the origin.
#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub url: String,
    /// Append the inbound `path?query` to the origin URL instead of always
    /// hitting the URL as configured.
    pub forward_path: bool,
    pub connect_timeout: Duration,
    /// Deadline for the whole exchange: connect, response head and body.
    pub request_timeout: Duration,
    pub max_response_body_bytes: usize,
}

/// The single upstream every cache miss is forwarded to.
///
/// Holds one pooled HTTP/1.1 client shared by all request tasks.
pub struct Origin {
    client: Client<HttpConnector, Full<Bytes>>,
    base: Uri,
    forward_path: bool,
    request_timeout: Duration,
    max_body: usize,
    log: Span,
}

impl Origin {
    /// Validates the origin URL up front; an empty or non-`http://` URL is
    /// rejected here, before any I/O.
    pub fn new(settings: &OriginSettings, log: Span) -> Result<Self, ForwardError> {
        let base = parse_origin_url(&settings.url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(settings.connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        info!(
            target: "cachet::proxy",
            parent: &log,
            origin = %base,
            forward_path = settings.forward_path,
            "Origin client ready"
        );

        Ok(Self {
            client,
            base,
            forward_path: settings.forward_path,
            request_timeout: settings.request_timeout,
            max_body: settings.max_response_body_bytes,
            log,
        })
    }

    /// Where `req` would be sent.
    pub fn target_for(&self, req: &ProxyRequest) -> Result<Uri, ForwardError> {
        if !self.forward_path {
            return Ok(self.base.clone());
        }

        let path = join_origin_path(self.base.path(), req.path_and_query());
        let mut parts = self.base.clone().into_parts();
        parts.path_and_query = Some(
            path.parse()
                .map_err(|e| ForwardError::InvalidInput(format!("bad target path '{path}': {e}")))?,
        );
        Uri::from_parts(parts).map_err(|e| ForwardError::InvalidInput(e.to_string()))
    }

    /// Sends `req` to the origin and buffers the whole response body.
    ///
    /// Non-2xx answers are returned as-is; only transport failures, timeouts
    /// and body read failures are errors.
    #[instrument(
        parent = &self.log,
        skip(self, req),
        fields(method = %req.method, path = %req.path())
    )]
    pub async fn forward(&self, req: ProxyRequest) -> Result<ProxyResponse, ForwardError> {
        let target = self.target_for(&req)?;
        let deadline = Instant::now() + self.request_timeout;

        let ProxyRequest {
            method,
            headers,
            body,
            ..
        } = req;

        let mut outbound = Request::builder()
            .method(method)
            .uri(target.clone())
            .body(Full::new(body))
            .map_err(|e| ForwardError::InvalidInput(e.to_string()))?;
        copy_request_headers(&headers, outbound.headers_mut());

        debug!(target: "cachet::proxy", %target, "Forwarding request to origin");

        let response = match timeout_at(deadline, self.client.request(outbound)).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) => {
                warn!(target: "cachet::proxy", %target, error = %e, "Origin request failed");
                return Err(ForwardError::OriginUnreachable(e.to_string()));
            }
            Err(_) => {
                warn!(target: "cachet::proxy", %target, "Origin request timed out");
                return Err(ForwardError::OriginUnreachable("request timed out".into()));
            }
        };

        let (parts, body) = response.into_parts();
        let collected = match timeout_at(deadline, Limited::new(body, self.max_body).collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => return Err(ForwardError::BodyRead(e.to_string())),
            Err(_) => return Err(ForwardError::BodyRead("body read timed out".into())),
        };

        debug!(
            target: "cachet::proxy",
            status = parts.status.as_u16(),
            bytes = collected.len(),
            "Origin response buffered"
        );

        Ok(ProxyResponse {
            status: parts.status,
            headers: parts.headers,
            body: collected,
        })
    }
}

fn parse_origin_url(raw: &str) -> Result<Uri, ForwardError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ForwardError::InvalidInput("origin url is empty".into()));
    }

    let uri: Uri = raw
        .parse()
        .map_err(|e| ForwardError::InvalidInput(format!("origin url '{raw}': {e}")))?;

    if uri.scheme() != Some(&Scheme::HTTP) || uri.authority().is_none() {
        return Err(ForwardError::InvalidInput(format!(
            "origin url '{raw}' must be an absolute http:// URL"
        )));
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use cachet_http::ProxyRequest;
    use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
    use tracing::Span;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{parse_origin_url, Origin, OriginSettings};
    use crate::ForwardError;

    fn settings(url: String) -> OriginSettings {
        OriginSettings {
            url,
            forward_path: false,
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            max_response_body_bytes: 1024 * 1024,
        }
    }

    fn request(method: Method, target: &'static str, body: &'static [u8]) -> ProxyRequest {
        ProxyRequest::new(
            method,
            Uri::from_static(target),
            HeaderMap::new(),
            Bytes::from_static(body),
        )
    }

    #[test]
    fn rejects_empty_and_non_http_urls() {
        assert!(matches!(parse_origin_url(""), Err(ForwardError::InvalidInput(_))));
        assert!(matches!(parse_origin_url("   "), Err(ForwardError::InvalidInput(_))));
        assert!(matches!(parse_origin_url("/relative"), Err(ForwardError::InvalidInput(_))));
        assert!(matches!(
            parse_origin_url("https://example.com"),
            Err(ForwardError::InvalidInput(_))
        ));
        assert!(parse_origin_url("http://127.0.0.1:9000/base").is_ok());
    }

    #[test]
    fn origin_new_fails_before_io_on_empty_url() {
        let res = Origin::new(&settings(String::new()), Span::none());
        assert!(matches!(res, Err(ForwardError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn target_ignores_inbound_path_by_default() {
        let origin = Origin::new(&settings("http://127.0.0.1:9000/origin".into()), Span::none()).unwrap();
        let target = origin.target_for(&request(Method::GET, "/a?x=1", b"")).unwrap();
        assert_eq!(target.to_string(), "http://127.0.0.1:9000/origin");
    }

    #[tokio::test]
    async fn target_appends_inbound_path_when_enabled() {
        let mut s = settings("http://127.0.0.1:9000/origin".into());
        s.forward_path = true;
        let origin = Origin::new(&s, Span::none()).unwrap();
        let target = origin.target_for(&request(Method::GET, "/a?x=1", b"")).unwrap();
        assert_eq!(target.to_string(), "http://127.0.0.1:9000/origin/a?x=1");
    }

    #[tokio::test]
    async fn forward_copies_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/origin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"created".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let origin = Origin::new(&settings(format!("{}/origin", server.uri())), Span::none()).unwrap();

        let mut req = request(Method::POST, "/ignored?x=1", b"payload");
        req.headers.append("x-dup", HeaderValue::from_static("one"));
        req.headers.append("x-dup", HeaderValue::from_static("two"));
        req.headers.insert("host", HeaderValue::from_static("proxy.local"));

        let res = origin.forward(req).await.unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, Bytes::from_static(b"created"));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let seen = &received[0];
        assert_eq!(seen.body, b"payload".to_vec());
        let dups: Vec<_> = seen.headers.get_all("x-dup").iter().collect();
        assert_eq!(dups, vec!["one", "two"]);
        assert_ne!(seen.headers.get("host").unwrap(), "proxy.local");
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let origin = Origin::new(&settings(server.uri()), Span::none()).unwrap();
        let res = origin.forward(request(Method::GET, "/", b"")).await.unwrap();
        assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body, Bytes::from_static(b"busy"));
    }

    #[tokio::test]
    async fn oversized_body_is_a_read_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let mut s = settings(server.uri());
        s.max_response_body_bytes = 1024;
        let origin = Origin::new(&s, Span::none()).unwrap();

        let err = origin.forward(request(Method::GET, "/", b"")).await.unwrap_err();
        assert!(matches!(err, ForwardError::BodyRead(_)));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let origin = Origin::new(&settings(format!("http://{addr}/")), Span::none()).unwrap();
        let err = origin.forward(request(Method::GET, "/", b"")).await.unwrap_err();
        assert!(matches!(err, ForwardError::OriginUnreachable(_)));
    }
}
