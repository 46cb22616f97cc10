use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::uri::PathAndQuery;
use axum::http::{Request, Uri};
use tower::{Layer, Service};

use super::origin_mut;
use crate::config::{ConfigError, ConfigValue, FromConfigValue};

/// Fixed URL prefix under which the service is reachable behind a proxy.
///
/// Always either empty (root) or `/segment[/segment...]` with no trailing
/// slash. Built once at startup and shared read-only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PathBase(Arc<str>);

/// A configured path base that cannot be used as a URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBaseError {
    pub value: String,
    pub reason: &'static str,
}

impl fmt::Display for PathBaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path base '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for PathBaseError {}

impl PathBase {
    /// The empty path base (service mounted at `/`).
    pub fn root() -> Self {
        PathBase(Arc::from(""))
    }

    /// Parse and normalize a configured prefix. `""` and `"/"` mean root.
    pub fn parse(raw: &str) -> Result<Self, PathBaseError> {
        let err = |reason| PathBaseError {
            value: raw.to_string(),
            reason,
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(Self::root());
        }
        if !trimmed.starts_with('/') {
            return Err(err("must start with '/'"));
        }
        let normalized = trimmed.trim_end_matches('/');
        for segment in normalized[1..].split('/') {
            match segment {
                "" => return Err(err("contains an empty segment")),
                "." | ".." => return Err(err("contains a relative segment")),
                _ => {}
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_graphic() && !matches!(b, b'?' | b'#' | b'%' | b'\\'))
            {
                return Err(err("segments may only contain visible, unreserved characters"));
            }
        }
        Ok(PathBase(Arc::from(normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Remainder of `path` after this prefix, if `path` lies under it.
    ///
    /// Matching is ASCII case-insensitive and respects segment boundaries:
    /// `/idservice/x` and `/IdService` match `/idservice`, `/idservicex`
    /// does not. The remainder always starts with `/`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return None;
        }
        let base = self.as_str();
        let head = path.get(..base.len())?;
        if !head.eq_ignore_ascii_case(base) {
            return None;
        }
        match &path[base.len()..] {
            "" => Some("/"),
            rest if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

impl Default for PathBase {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for PathBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathBase({:?})", self.as_str())
    }
}

impl fmt::Display for PathBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_root() { "/" } else { self.as_str() })
    }
}

impl FromConfigValue for PathBase {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        let raw = String::from_config_value(value, key)?;
        PathBase::parse(&raw).map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Layer that rebases every request under a fixed [`PathBase`].
#[derive(Clone, Debug)]
pub struct PathBaseLayer {
    path_base: PathBase,
}

impl PathBaseLayer {
    pub fn new(path_base: PathBase) -> Self {
        Self { path_base }
    }
}

impl<S> Layer<S> for PathBaseLayer {
    type Service = PathBaseService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PathBaseService {
            inner,
            path_base: self.path_base.clone(),
        }
    }
}

/// Service produced by [`PathBaseLayer`].
#[derive(Clone, Debug)]
pub struct PathBaseService<S> {
    inner: S,
    path_base: PathBase,
}

impl<S> PathBaseService<S> {
    pub fn path_base(&self) -> &PathBase {
        &self.path_base
    }
}

impl<S, B> Service<Request<B>> for PathBaseService<S>
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
        rebase(&self.path_base, &mut req);
        self.inner.call(req)
    }
}

fn rebase<B>(path_base: &PathBase, req: &mut Request<B>) {
    let stripped = path_base.strip(req.uri().path()).map(|rest| match req.uri().query() {
        Some(q) => format!("{rest}?{q}"),
        None => rest.to_string(),
    });

    if let Some(path_and_query) = stripped {
        let mut parts = req.uri().clone().into_parts();
        if let Ok(pq) = path_and_query.parse::<PathAndQuery>() {
            parts.path_and_query = Some(pq);
            if let Ok(uri) = Uri::from_parts(parts) {
                *req.uri_mut() = uri;
            }
        }
    }

    origin_mut(req).path_base = path_base.clone();
}
