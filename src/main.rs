//! Application entry point building the Actix-Web server.
use dotenvy::dotenv;

use synapse_mapper::{AppState, models::config::Settings, run};

#[actix_web::main]
async fn main() {
    // Load environment variables from `.env` in local development.
    dotenv().ok();
    // Initialize logger with default level INFO if not provided.
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("Error loading settings: {err}");
            std::process::exit(1);
        }
    };

    let state = match AppState::initialize(settings).await {
        Ok(state) => state,
        Err(err) => {
            log::error!("Error initializing application: {err}");
            std::process::exit(1);
        }
    };

    match run(state).await {
        Ok(_) => log::info!("Server stopped"),
        Err(err) => {
            log::error!("Error starting server: {err}");
            std::process::exit(1);
        }
    }
}
