use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use storefront_api::{
    self as api,
    auth::{AuthConfig, AuthService},
    config,
    events::{process_events, EventSender},
    handlers::AppServices,
    services::{
        checkout::CheckoutSettings,
        payment_gateway::{PaymentGateway, StripeConfig, StripeGateway},
    },
    AppState,
};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tracing::{error, info, warn};

const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);
    info!(environment = %cfg.environment, "Starting storefront API");

    let db = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(EventSender::new(event_tx));
    let event_task = tokio::spawn(process_events(event_rx));

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        StripeGateway::new(StripeConfig::from(&cfg)).context("failed to build Stripe client")?,
    );
    let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg), db.clone()));
    let services = AppServices::new(
        db.clone(),
        gateway,
        event_sender,
        CheckoutSettings::from(&cfg),
    );

    let addr = cfg.server_addr();
    let state = AppState {
        db: db.clone(),
        config: cfg,
        services,
        auth,
    };
    let app = api::build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Storefront API listening on {}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped; draining events");
    match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, event_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Event processor terminated abnormally"),
        Err(_) => warn!("Event processor did not drain in time"),
    }
    api::db::close(db).await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
