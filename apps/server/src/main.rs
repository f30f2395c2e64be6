#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;

use actix_web::{App, HttpServer, web};
use tracing::info;
use vigil_service::config::Config;
use vigil_service::orchestrator::Orchestrator;
use vigil_service::pool::open_pool;
use vigil_service::service::VigilService;

mod error;
mod routes;

use error::AppError;
use logger::init_tracing;

/// Config file from `VIGIL_CONFIG`, falling back to the value baked in at build time.
fn config_path() -> Option<String> {
    std::env::var("VIGIL_CONFIG")
        .ok()
        .or_else(|| option_env!("VIGIL_CONFIG").map(String::from))
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    let config = Config::from_config(config_path())?;
    let pool = open_pool(&config.database.path, config.database.pool_size).await?;
    let orchestrator = Orchestrator::start(&config, pool).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let served = run_server(addr, orchestrator.service()).await;

    orchestrator.shutdown().await;
    served
}

async fn run_server(addr: SocketAddr, service: VigilService) -> Result<(), AppError> {
    info!("Listening on {}", addr);
    let service = web::Data::new(service);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(error::json_config())
            .configure(routes::routes)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
