mod config;
mod inference;
mod provision;
mod routes;
mod service;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::env;

use config::AppConfig;
use provision::{HttpFetcher, Provisioner};
use routes::configure_routes;
use service::ClassifierService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Configuration loading failed: {e}"),
            ));
        }
    };
    log::info!(
        "Serving {} classes, model artifact at {}",
        config.labels.len(),
        config.model.path.display()
    );

    let service = web::Data::new(ClassifierService::new());
    let provisioner = Provisioner::new(HttpFetcher::new());
    if let Err(e) = service.bootstrap(&provisioner, &config).await {
        log::error!("Failed to initialize classifier at startup: {e}");
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Classifier startup failed: {e}"),
        ));
    }

    let static_dir = config::static_dir();
    let config = web::Data::new(config);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .app_data(config.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
