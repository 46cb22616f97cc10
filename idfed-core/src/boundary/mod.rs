//! Request boundary: everything that must run before routing.
//!
//! A reverse proxy exposes the service under a prefix (`/idservice`) and
//! terminates TLS, so the router never sees the URL clients actually used.
//! The two layers here rebuild that view and store it as a [`RequestOrigin`]
//! request extension:
//!
//! 1. [`PathBaseLayer`] records the configured [`PathBase`] and strips it from
//!    the path when the proxy forwarded it unchanged.
//! 2. [`ForwardedHeadersLayer`] applies `X-Forwarded-Proto` / `X-Forwarded-Host`.
//!
//! Both must wrap the *router* (not be added with `Router::layer`), otherwise
//! routing happens before the path is rebased. [`AppBuilder::build`] does this.
//!
//! [`AppBuilder::build`]: crate::builder::AppBuilder::build

mod forwarded;
mod path_base;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Request, Uri};

pub use forwarded::{ForwardedHeadersLayer, ForwardedHeadersService};
pub use path_base::{PathBase, PathBaseError, PathBaseLayer, PathBaseService};

/// Externally visible origin of the current request.
///
/// Every absolute URL the service emits (discovery metadata, redirect
/// targets, default issuer) is built from this value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
    pub path_base: PathBase,
}

impl Default for RequestOrigin {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            host: "localhost".into(),
            path_base: PathBase::root(),
        }
    }
}

impl RequestOrigin {
    /// Derive an origin from the request as received (no proxy headers).
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".into());
        let scheme = uri.scheme_str().unwrap_or("http").to_string();
        Self {
            scheme,
            host,
            path_base: PathBase::root(),
        }
    }

    /// `scheme://host` followed by the path base, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_base.as_str())
    }

    /// Absolute URL for an application-relative `path` (`/connect/token`).
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url())
        } else {
            format!("{}/{path}", self.base_url())
        }
    }
}

/// Fetch the origin extension, creating it from the raw request if no
/// boundary layer ran yet.
pub(crate) fn origin_mut<B>(req: &mut Request<B>) -> &mut RequestOrigin {
    let fallback = req
        .extensions()
        .get::<RequestOrigin>()
        .is_none()
        .then(|| RequestOrigin::from_parts(req.headers(), req.uri()));
    req.extensions_mut()
        .get_or_insert_with(|| fallback.unwrap_or_default())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestOrigin>()
            .cloned()
            .unwrap_or_else(|| RequestOrigin::from_parts(&parts.headers, &parts.uri)))
    }
}
