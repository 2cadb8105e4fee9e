use std::net::Ipv4Addr;

use axum::serve;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{event, Level};

use brandshot::app_state::AppState;
use brandshot::config::Config;
use brandshot::routes::router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();
    let config = Config::from_env()?;
    let state = AppState::init(&config).await?;
    let app = router(state);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
    event!(Level::INFO, port = config.port, "Listening");
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
