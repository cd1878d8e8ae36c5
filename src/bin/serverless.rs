//! Serverless entry point speaking the API Gateway proxy-event protocol.
use std::sync::Arc;

use dotenvy::dotenv;
use lambda_runtime::{Error, LambdaEvent, run, service_fn};

use synapse_mapper::serverless::{ProxyEvent, dispatch};
use synapse_mapper::{AppState, models::config::Settings};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Services are built once per container lifecycle and shared by every
    // invocation.
    let settings = Settings::from_env()?;
    let state = Arc::new(AppState::initialize(settings).await?);
    let ref_state = &state;

    run(service_fn(|event: LambdaEvent<ProxyEvent>| async move {
        Ok::<_, Error>(dispatch(ref_state, event.payload).await)
    }))
    .await
}
