use actix_web::{middleware::Logger, web, App, HttpServer};
use log::info;
use std::io;

use filevault::app_state::AppState;
use filevault::config::AppConfig;
use filevault::logging::init_logging;
use filevault::service::configure;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = AppConfig::load().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    init_logging(&config.logging);

    let state = AppState::from_config(config).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    if state.config.reconciliation.enabled {
        state.reconciliation_worker().start_background();
    }

    let server = state.config.server.clone();
    let data = web::Data::new(state);

    info!("Starting server on {}:{}", server.host, server.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(configure)
    })
    .workers(server.workers)
    .bind((server.host.as_str(), server.port))?
    .run()
    .await
}
