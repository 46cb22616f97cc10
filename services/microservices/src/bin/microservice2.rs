use idfed_core::layers::init_tracing;
use idfed_core::prelude::*;
use idfed_microservices::{forecast, listen_addr};
use tracing::error;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "microservice2 failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = IdfedConfig::load("microservice2")?;
    let addr = listen_addr(&config, "0.0.0.0:5002")?;

    AppBuilder::new()
        .with(Health)
        .with(Cors::permissive())
        .with(Tracing)
        .with(ErrorHandling)
        .register_routes(forecast::routes())
        .serve(&addr)
        .await
}
