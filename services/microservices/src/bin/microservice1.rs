use idfed_client::PeerClient;
use idfed_core::layers::init_tracing;
use idfed_core::prelude::*;
use idfed_microservices::caller::{self, CallerTarget};
use idfed_microservices::listen_addr;
use tracing::error;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "microservice1 failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IdfedConfig::load("microservice1")?;
    let peers = PeerClient::from_config(&config)?;
    let target = CallerTarget::from_config(&config)?;
    let addr = listen_addr(&config, "0.0.0.0:5001")?;

    AppBuilder::new()
        .with(Health)
        .with(Cors::permissive())
        .with(Tracing)
        .with(ErrorHandling)
        .register_routes(caller::routes(peers, target))
        .serve(&addr)
        .await
}
