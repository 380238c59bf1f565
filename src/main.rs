mod auth;
mod bridge;
mod commands;
mod config;
mod db;
mod error;
mod model;
mod operator;
mod routes;
mod settings;
mod staleness;
mod status;
mod telemetry;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use crate::bridge::DeviceBridge;
use crate::config::Config;
use crate::routes::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    let pool = match db::connect(&config.database_url, config.db_max_connections).await {
        Ok(pool) => {
            info!("connected to {}", config.database_url);
            pool
        }
        Err(err) => {
            error!("failed to connect to the database: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = db::migrate(&pool).await {
        error!("failed to migrate the database: {err}");
        std::process::exit(1);
    }

    info!(
        "serving device {} on {}:{}, offline after {}s of silence",
        config.device_id,
        config.http_host,
        config.http_port,
        config.staleness_threshold.as_secs()
    );

    let state = web::Data::new(AppState {
        bridge: DeviceBridge::new(pool, &config),
        device_id: config.device_id.clone(),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_header()
                    .allow_any_method(),
            )
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind((config.http_host.as_str(), config.http_port))?
    .run()
    .await
}
