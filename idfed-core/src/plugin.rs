//! Plugin system.
//!
//! Plugins are composable units of functionality installed into an
//! [`AppBuilder`] with `.with(plugin)`. They add routes and router layers;
//! the request boundary (path base, forwarded headers) is owned by the
//! builder itself and always wraps whatever plugins install.

use crate::builder::AppBuilder;

/// A composable unit of functionality that can be installed into an [`AppBuilder`].
///
/// ```ignore
/// use idfed_core::{AppBuilder, Plugin};
///
/// pub struct Version;
///
/// impl Plugin for Version {
///     fn install(self, app: AppBuilder) -> AppBuilder {
///         app.register_routes(Router::new().route("/version", get(|| async { "1" })))
///     }
/// }
/// ```
pub trait Plugin: Send + 'static {
    /// Install this plugin into the given `AppBuilder`, returning the modified builder.
    fn install(self, app: AppBuilder) -> AppBuilder;

    /// The name of this plugin (for diagnostics).
    fn name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}
