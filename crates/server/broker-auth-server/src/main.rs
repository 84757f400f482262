use anyhow::{Context, Result};
use broker_auth_server::{AppState, Config, build_router, connect_backends, cors_layer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config);

    info!("Starting broker auth server");
    info!(
        "Identity provider endpoint: {}",
        config.verifier.authentication_check_endpoint
    );

    let (cache, store) = connect_backends(&config).await?;
    let state = AppState::from_config(&config, cache, store)?;

    let app = build_router(state).layer(cors_layer(&config.server.cors)?);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
