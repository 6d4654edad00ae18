//! Per-request telemetry metadata.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::{HeaderMap, Method};
use opentelemetry::KeyValue;

/// Route label for requests that matched no route.
///
/// Using one constant instead of the raw path keeps label cardinality
/// bounded when clients probe random URLs.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Client address label when nothing better is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// What the pipeline knows about a request before it is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: Method,
    /// Route template, e.g. `/api/users/:id`.
    pub route: String,
    /// Raw request path, e.g. `/api/users/42`. Only used in logs.
    pub path: String,
    pub client_addr: String,
}

impl RequestInfo {
    pub fn new(
        method: Method,
        route: impl Into<String>,
        path: impl Into<String>,
        client_addr: impl Into<String>,
    ) -> Self {
        Self {
            method,
            route: route.into(),
            path: path.into(),
            client_addr: client_addr.into(),
        }
    }

    /// Derive request metadata from an axum request.
    ///
    /// The route comes from the router's [`MatchedPath`], so it is only
    /// available to middleware added with `Router::layer`.
    pub fn from_request(request: &Request) -> Self {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or(UNMATCHED_ROUTE, MatchedPath::as_str);
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self::new(
            request.method().clone(),
            route,
            request.uri().path(),
            client_addr(request.headers(), peer),
        )
    }

    /// Attach the outcome of the request.
    pub fn complete(&self, status: u16, elapsed: Duration) -> RequestTelemetryRecord {
        RequestTelemetryRecord {
            method: self.method.clone(),
            route: self.route.clone(),
            path: self.path.clone(),
            status,
            elapsed,
            client_addr: self.client_addr.clone(),
        }
    }
}

/// Ephemeral record fed into spans, metrics and the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTelemetryRecord {
    pub method: Method,
    pub route: String,
    pub path: String,
    pub status: u16,
    pub elapsed: Duration,
    pub client_addr: String,
}

impl RequestTelemetryRecord {
    /// Metric dimensions: `{method, route, status}`.
    pub fn metric_attributes(&self) -> [KeyValue; 3] {
        [
            KeyValue::new("method", self.method.as_str().to_string()),
            KeyValue::new("route", self.route.clone()),
            KeyValue::new("status", i64::from(self.status)),
        ]
    }

    pub fn duration_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Resolve the client address the way reverse proxies report it.
///
/// Order: first `X-Forwarded-For` hop, `X-Real-IP`, socket peer address.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    #[test]
    fn test_unrouted_request_uses_unmatched_label() {
        let request = Request::builder()
            .uri("/api/users/42")
            .body(Body::empty())
            .unwrap();
        let info = RequestInfo::from_request(&request);
        assert_eq!(info.route, UNMATCHED_ROUTE);
        assert_eq!(info.path, "/api/users/42");
        assert_eq!(info.method, Method::GET);
        assert_eq!(info.client_addr, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_client_addr_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_addr(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_addr_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_addr(&headers, None), "198.51.100.2");

        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_addr(&HeaderMap::new(), Some(peer)), "127.0.0.1");
    }

    #[test]
    fn test_connect_info_is_used_as_peer() {
        let peer: SocketAddr = "192.0.2.10:41000".parse().unwrap();
        let mut request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(RequestInfo::from_request(&request).client_addr, "192.0.2.10");
    }

    #[test]
    fn test_record_attributes_use_route_template() {
        let info = RequestInfo::new(Method::GET, "/api/users/:id", "/api/users/7", "127.0.0.1");
        let record = info.complete(404, Duration::from_millis(12));

        let attrs: Vec<(String, String)> = record
            .metric_attributes()
            .iter()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
            .collect();
        assert_eq!(
            attrs,
            vec![
                ("method".to_string(), "GET".to_string()),
                ("route".to_string(), "/api/users/:id".to_string()),
                ("status".to_string(), "404".to_string()),
            ]
        );
        assert!((record.duration_ms() - 12.0).abs() < 1e-9);
    }
}
