use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use storefront_checkout as app;

use app::audit::{PaymentAuditLog, SeaOrmPaymentAuditLog};
use app::auth::{AuthConfig, AuthService};
use app::payment_gateway::{PaymentGateway, PayosClient};
use app::rate_limiter::RateLimiters;
use app::repositories::{
    OrderRepository, ProductRepository, SeaOrmOrderRepository, SeaOrmProductRepository,
};

const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config().context("failed to load configuration")?;
    app::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = app::db::establish_connection(&app::db::DbConfig::from(&cfg))
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool)
            .await
            .context("failed running migrations")?;
    }
    let db = Arc::new(db_pool);

    // Redis is only needed for shared rate-limit counters
    let redis_client = if cfg.rate_limit.use_redis {
        match redis::Client::open(cfg.redis_url.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                warn!(error = %err, "invalid redis url, rate limiting stays in memory");
                None
            }
        }
    } else {
        None
    };
    let rate_limiters = RateLimiters::from_settings(&cfg.rate_limit, redis_client);

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(PayosClient::new(&cfg.payos).context("failed to build payment gateway client")?);
    let products: Arc<dyn ProductRepository> = Arc::new(SeaOrmProductRepository::new(db.clone()));
    let orders: Arc<dyn OrderRepository> = Arc::new(SeaOrmOrderRepository::new(db.clone()));
    let audit_log: Arc<dyn PaymentAuditLog> = Arc::new(SeaOrmPaymentAuditLog::new(db.clone()));

    let services = app::handlers::AppServices::new(
        products,
        orders,
        gateway,
        audit_log,
        rate_limiters.clone(),
        cfg.orders.clone(),
        cfg.payos.timeout(),
    );

    let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    let state = app::AppState {
        db: Some(db),
        config: Arc::new(cfg),
        auth,
        services,
    };

    // Drop expired in-memory windows so idle identities do not accumulate
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            rate_limiters.cleanup_expired();
        }
    });

    let router = app::build_router(state);

    // Bind and serve
    info!("storefront-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
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
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
