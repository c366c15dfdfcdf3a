//! Access log middleware
//!
//! Writes one line per request to the [`ACCESS_TARGET`] tracing target, which
//! the logging setup routes to `access.log`:
//!
//! ```text
//! ✓ 203.0.113.7 | POST /download | 200 | 3412ms | Mozilla/5.0 (X11; Linux x86_64)
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::logs::ACCESS_TARGET;

const MAX_USER_AGENT_LEN: usize = 90;

/// Paths never written to the access log
const SKIPPED_PATHS: [&str; 2] = ["/", "/health"];

/// Axum middleware logging every request except health probes
pub async fn access_log(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if SKIPPED_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(truncate_user_agent)
        .unwrap_or_else(|| "-".to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed().as_millis();
    let status = response.status().as_u16();

    tracing::info!(
        target: ACCESS_TARGET,
        "{} {} | {} {} | {} | {}ms | {}",
        status_indicator(status),
        ip,
        method,
        path,
        status,
        elapsed,
        user_agent
    );

    response
}

/// Resolves the client address from proxy headers, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn status_indicator(status: u16) -> &'static str {
    match status {
        200..=299 => "✓",
        400.. => "✗",
        _ => "!",
    }
}

fn truncate_user_agent(ua: &str) -> String {
    ua.chars().take(MAX_USER_AGENT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None), "198.51.100.2");

        let peer: SocketAddr = "192.0.2.10:4000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.10");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_status_indicator() {
        assert_eq!(status_indicator(200), "✓");
        assert_eq!(status_indicator(302), "!");
        assert_eq!(status_indicator(404), "✗");
        assert_eq!(status_indicator(500), "✗");
    }

    #[test]
    fn test_user_agent_truncated() {
        let ua = "x".repeat(200);
        assert_eq!(truncate_user_agent(&ua).len(), MAX_USER_AGENT_LEN);
        assert_eq!(truncate_user_agent("curl/8.0"), "curl/8.0");
    }
}
