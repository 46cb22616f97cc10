use idfed_core::layers::init_tracing;
use idfed_core::prelude::*;
use idfed_oidc::IdentityServer;
use tracing::{error, info};

const DEFAULT_PROFILE: &str = "dev";
const DEFAULT_ADDR: &str = "0.0.0.0:5000";

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "Identity server failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IdfedConfig::load(DEFAULT_PROFILE)?;
    let addr: String = config.get_or("server.addr", DEFAULT_ADDR.to_string())?;
    let forwarded_headers: bool = config.get_or("server.forwarded_headers", true)?;

    let runtime = IdentityServer::from_config(&config)?.build()?;
    let path_base = runtime.settings().path_base.clone();
    info!(profile = config.profile(), %path_base, forwarded_headers, "Starting idservice");

    AppBuilder::new()
        .path_base(path_base)
        .forwarded_headers(forwarded_headers)
        .with(Health)
        .with(Cors::permissive())
        .with(Tracing)
        .with(ErrorHandling)
        .with(runtime)
        .serve(&addr)
        .await
}
