use std::task::{Context, Poll};

use axum::http::{HeaderMap, HeaderName, Request};
use tower::{Layer, Service};

use super::origin_mut;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Layer applying `X-Forwarded-Proto` and `X-Forwarded-Host` to the
/// request's [`RequestOrigin`](super::RequestOrigin).
///
/// Only the last entry of each header is used (the value appended by the
/// proxy directly in front of this service). Malformed values are ignored.
#[derive(Clone, Copy, Debug)]
pub struct ForwardedHeadersLayer {
    enabled: bool,
}

impl ForwardedHeadersLayer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for ForwardedHeadersLayer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<S> Layer<S> for ForwardedHeadersLayer {
    type Service = ForwardedHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ForwardedHeadersService {
            inner,
            enabled: self.enabled,
        }
    }
}

/// Service produced by [`ForwardedHeadersLayer`].
#[derive(Clone, Debug)]
pub struct ForwardedHeadersService<S> {
    inner: S,
    enabled: bool,
}

impl<S, B> Service<Request<B>> for ForwardedHeadersService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if self.enabled {
            apply_forwarded(&mut req);
        }
        self.inner.call(req)
    }
}

fn apply_forwarded<B>(req: &mut Request<B>) {
    let scheme = last_entry(req.headers(), &X_FORWARDED_PROTO)
        .filter(|s| is_scheme(s))
        .map(|s| s.to_ascii_lowercase());
    let host = last_entry(req.headers(), &X_FORWARDED_HOST).filter(|h| is_host(h));

    let origin = origin_mut(req);
    if let Some(scheme) = scheme {
        origin.scheme = scheme;
    }
    if let Some(host) = host {
        origin.host = host;
    }
}

fn last_entry(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get_all(name).iter().last()?.to_str().ok()?;
    let entry = value.rsplit(',').next()?.trim();
    (!entry.is_empty()).then(|| entry.to_string())
}

fn is_scheme(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

fn is_host(h: &str) -> bool {
    h.bytes()
        .all(|b| b.is_ascii_graphic() && !matches!(b, b'/' | b'?' | b'#' | b'@' | b'\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::RequestOrigin;

    fn origin_of(req: &Request<()>) -> RequestOrigin {
        req.extensions().get::<RequestOrigin>().cloned().unwrap()
    }

    #[test]
    fn forwarded_proto_and_host_override_origin() {
        let mut req = Request::get("/")
            .header("host", "10.0.0.7:5000")
            .header("x-forwarded-proto", "HTTPS")
            .header("x-forwarded-host", "gateway.example.com")
            .body(())
            .unwrap();
        apply_forwarded(&mut req);

        let origin = origin_of(&req);
        assert_eq!(origin.scheme, "https");
        assert_eq!(origin.host, "gateway.example.com");
    }

    #[test]
    fn last_entry_of_a_list_wins() {
        let mut req = Request::get("/")
            .header("x-forwarded-host", "spoofed.example, edge.example.com")
            .body(())
            .unwrap();
        apply_forwarded(&mut req);
        assert_eq!(origin_of(&req).host, "edge.example.com");
    }

    #[test]
    fn malformed_values_are_ignored() {
        let mut req = Request::get("/")
            .header("host", "internal:5000")
            .header("x-forwarded-proto", "1ttp")
            .header("x-forwarded-host", "evil.example/path")
            .body(())
            .unwrap();
        apply_forwarded(&mut req);

        let origin = origin_of(&req);
        assert_eq!(origin.scheme, "http");
        assert_eq!(origin.host, "internal:5000");
    }
}
