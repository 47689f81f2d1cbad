use std::sync::Arc;

use carpool::{
    AppState, Identity, RideDirectory,
    backend::{Backend, SqliteStore, SupabaseClient},
    config::Config,
    web,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "carpool=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let client = Arc::new(SupabaseClient::new(&config.supabase_url, &config.supabase_anon_key)?);
    let backend = match &config.database_url {
        Some(url) => {
            info!("serving data from local store {url}");
            Backend::new(client, Arc::new(SqliteStore::connect(url).await?))
        }
        None => Backend::hosted(client),
    };

    let identity = Arc::new(Identity::new(backend.clone()));
    let _auth_watcher = identity.clone().watch();

    let rides = Arc::new(RideDirectory::new(backend));
    rides.list_active_upcoming(None).await;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    let app = web::router()
        .with_state(AppState { identity, rides })
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("received ctrl-c, shutting down");
}
