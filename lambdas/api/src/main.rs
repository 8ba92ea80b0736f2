use anyhow::Context;
use api::{router, AppState, Config};
use aws_config::BehaviorVersion;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let in_lambda = Config::in_lambda();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    // CloudWatch stamps every line already.
    if in_lambda {
        subscriber.without_time().init();
    } else {
        subscriber.init();
    }

    let config = Config::from_env();

    if in_lambda {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let state = AppState::aws(&sdk_config, &config);
        tracing::info!("Starting MediConnect API on Lambda");

        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default())
            .service(router(state));

        lambda_http::run(app)
            .await
            .map_err(|err| anyhow::anyhow!(err))?;
    } else {
        let state = AppState::memory(&config);
        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_address))?;
        tracing::info!(address = %config.bind_address, "Starting MediConnect API with in-memory stores");

        axum::serve(listener, router(state)).await?;
    }

    Ok(())
}
