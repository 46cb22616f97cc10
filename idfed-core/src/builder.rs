use axum::Router;
use tower::Layer;
use tracing::info;

use crate::boundary::{
    ForwardedHeadersLayer, ForwardedHeadersService, PathBase, PathBaseLayer, PathBaseService,
};
use crate::plugin::Plugin;

type LayerFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// The assembled application: the router wrapped by the request boundary.
///
/// Cloneable and usable with `tower::ServiceExt::oneshot` in tests.
pub type App = PathBaseService<ForwardedHeadersService<Router>>;

/// Builder assembling routes, plugins and the request boundary.
///
/// ```ignore
/// AppBuilder::new()
///     .path_base(PathBase::parse("/idservice")?)
///     .with(Health)
///     .with(Tracing)
///     .with(identity_server)
///     .serve("0.0.0.0:5000")
///     .await?;
/// ```
pub struct AppBuilder {
    routes: Vec<Router>,
    layers: Vec<LayerFn>,
    path_base: PathBase,
    forwarded_headers: bool,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            layers: Vec::new(),
            path_base: PathBase::root(),
            forwarded_headers: true,
        }
    }

    /// Set the path base applied to every request before routing.
    pub fn path_base(mut self, path_base: PathBase) -> Self {
        self.path_base = path_base;
        self
    }

    /// Enable or disable `X-Forwarded-Proto` / `X-Forwarded-Host` processing
    /// (enabled by default).
    pub fn forwarded_headers(mut self, enabled: bool) -> Self {
        self.forwarded_headers = enabled;
        self
    }

    /// Install a plugin.
    pub fn with<Pl: Plugin>(self, plugin: Pl) -> Self {
        tracing::debug!(plugin = Pl::name(), "Installing plugin");
        plugin.install(self)
    }

    /// Register a router fragment to be merged into the application.
    pub fn register_routes(mut self, router: Router) -> Self {
        self.routes.push(router);
        self
    }

    /// Apply a custom transformation to the router (layers, fallbacks).
    ///
    /// Transformations run in registration order after all routes are merged.
    /// They run *inside* the request boundary, so they observe rebased paths.
    pub fn with_layer_fn<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.layers.push(Box::new(f));
        self
    }

    /// Assemble the application.
    pub fn build(self) -> App {
        let mut router = Router::new();
        for r in self.routes {
            router = router.merge(r);
        }
        for layer_fn in self.layers {
            router = layer_fn(router);
        }

        let forwarded = ForwardedHeadersLayer::new(self.forwarded_headers).layer(router);
        PathBaseLayer::new(self.path_base).layer(forwarded)
    }

    /// Build the application and serve it on `addr` until Ctrl-C / SIGTERM.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Like [`serve`](Self::serve) with an already bound listener.
    pub async fn serve_with_listener(
        self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.build();
        info!(
            addr = %listener.local_addr()?,
            path_base = %app.path_base(),
            "idfed server listening"
        );
        axum::serve(
            listener,
            axum::ServiceExt::<axum::extract::Request>::into_make_service(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        info!("idfed server stopped");
        Ok(())
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
