//! Built-in plugins for common cross-cutting concerns.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::builder::AppBuilder;
use crate::plugin::Plugin;

/// CORS plugin.
pub struct Cors {
    layer: CorsLayer,
}

impl Cors {
    /// Any origin, method and header.
    pub fn permissive() -> Self {
        Self {
            layer: crate::layers::default_cors(),
        }
    }

    pub fn custom(layer: CorsLayer) -> Self {
        Self { layer }
    }
}

impl Plugin for Cors {
    fn install(self, app: AppBuilder) -> AppBuilder {
        app.with_layer_fn(move |router| router.layer(self.layer))
    }
}

/// HTTP request/response tracing plugin.
///
/// Initialises the global subscriber (see [`init_tracing`]) and adds a
/// tower-http `TraceLayer`.
///
/// [`init_tracing`]: crate::layers::init_tracing
pub struct Tracing;

impl Plugin for Tracing {
    fn install(self, app: AppBuilder) -> AppBuilder {
        crate::layers::init_tracing();
        app.with_layer_fn(|router| router.layer(crate::layers::default_trace()))
    }
}

/// `GET /health` → `"OK"`.
pub struct Health;

impl Plugin for Health {
    fn install(self, app: AppBuilder) -> AppBuilder {
        app.register_routes(Router::new().route("/health", get(health_handler)))
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Converts panics into JSON 500 responses.
pub struct ErrorHandling;

impl Plugin for ErrorHandling {
    fn install(self, app: AppBuilder) -> AppBuilder {
        app.with_layer_fn(|router| router.layer(crate::layers::catch_panic_layer()))
    }
}
