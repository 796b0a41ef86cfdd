use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use order_service as api;
use api::{
    repositories::OrderRepository,
    services::{
        catalog::HttpProductValidator, orders::OrderService, payments::HttpPaymentSessionRequester,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool)
            .await
            .map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })
            .context("failed to run migrations")?;
    }
    let db_arc = Arc::new(db_pool);

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    let catalog = HttpProductValidator::new(cfg.product_service_url.clone(), cfg.upstream_timeout())
        .context("failed to build product catalog client")?;
    let payments =
        HttpPaymentSessionRequester::new(cfg.payment_service_url.clone(), cfg.upstream_timeout())
            .context("failed to build payment service client")?;
    info!(
        product_service = %cfg.product_service_url,
        payment_service = %cfg.payment_service_url,
        "Upstream services configured"
    );

    if cfg.payment_webhook_secret.is_none() {
        warn!("Payment webhook secret not configured; payment confirmations are accepted unsigned");
    }

    let order_service = OrderService::new(
        Arc::new(OrderRepository::new(db_arc.clone())),
        Arc::new(catalog),
        Arc::new(payments),
        Some(event_sender),
    );

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        order_service: Arc::new(order_service),
    };

    let app = api::app(app_state);

    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cfg.host, cfg.port))?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("order-service listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("order-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
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
