//! HTTP server over the CRUD engine. Configuration comes from the environment.

use architect_crud::{app, AppState, CrudService, EngineConfig};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("architect_crud=info")),
        )
        .init();

    let database_url = config.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await?;

    let state = AppState::new(CrudService::postgres(pool, &config));
    let app = app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes)),
    );

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        schema = %config.schema,
        "architect-crud listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
