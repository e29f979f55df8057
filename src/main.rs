use medminder::{
    application::{auth::TokenAuthenticator, change_feed::ChangeFeed, medication_service::MedicationServiceImpl},
    config::AppConfig,
    domain::repository::MedicationRepository,
    http::{routes::AppState, routing},
    infrastructure::sqlite_repo::{prepare_sqlite_file, SqliteMedicationRepository},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| "info".into()))
        .init();

    prepare_sqlite_file(&config.database_url)?;
    let repo = SqliteMedicationRepository::connect(&config.database_url).await?;
    repo.init().await?;

    let service = MedicationServiceImpl::new(repo.clone(), ChangeFeed::new(config.event_buffer));
    let auth = TokenAuthenticator::new(repo);
    let router = routing::app(AppState { service, auth });

    let addr = config.bind_addr;
    tracing::info!(%addr, database_url = %config.database_url, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
