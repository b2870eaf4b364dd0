use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::http::{webhook_router, WebhookAppState};
use billing_reconciler::adapters::{PostgresEventMarkerStore, PostgresSubscriptionStore};
use billing_reconciler::application::{
    PruneProcessedEventsHandler, ReconcileSettings, ReconcileWebhookHandler,
};
use billing_reconciler::config::{AppConfig, LogFormat, ServerConfig};
use billing_reconciler::domain::billing::{Tolerance, WebhookVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.server);

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(config.database.url.expose_secret())
        .await
        .context("failed to connect to database")?;

    if config.database.run_migrations {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("database migration failed")?;
    }

    let markers = Arc::new(PostgresEventMarkerStore::new(pool.clone()));
    let subscriptions = Arc::new(PostgresSubscriptionStore::new(pool.clone()));

    let webhook = config.webhook;
    let settings = ReconcileSettings {
        storage_deadline: webhook.storage_deadline(),
        max_commit_attempts: webhook.max_commit_attempts,
        admission_lease: webhook.admission_lease(),
        billing_interval: webhook.billing_interval(),
    };
    let retention = webhook.marker_retention();
    let prune_every = webhook.prune_interval();
    let tolerance = Tolerance {
        max_age_secs: webhook.tolerance_secs,
        clock_skew_secs: webhook.clock_skew_secs,
    };
    let verifier = WebhookVerifier::new(webhook.signing_secret, tolerance);
    let reconciler =
        ReconcileWebhookHandler::new(Arc::new(verifier), markers.clone(), subscriptions, settings);

    let pruner = PruneProcessedEventsHandler::new(markers, retention);
    let prune_task = tokio::spawn(async move {
        let mut ticker = interval(prune_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = pruner.handle().await {
                error!(error = %e, "failed to prune rejected event markers");
            }
        }
    });

    let app = webhook_router(
        WebhookAppState::new(Arc::new(reconciler)),
        config.server.body_limit_bytes,
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %listener.local_addr()?, "billing reconciler listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    prune_task.abort();
    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match server.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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

    info!("shutdown signal received");
}
