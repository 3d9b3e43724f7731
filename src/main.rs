use anyhow::anyhow;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use olhourbano::app::notifications::Notifier;
use olhourbano::app::verification;
use olhourbano::config::categories::CategoryCatalog;
use olhourbano::config::AppConfig;
use olhourbano::infra::db::Db;
use olhourbano::infra::mailer;
use olhourbano::infra::queue::MailQueue;
use olhourbano::infra::store::{PgReportStore, ReportStore};
use olhourbano::jobs::{city_backfill, mail_dispatcher::MailDispatcher};
use olhourbano::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let store: Arc<dyn ReportStore> = Arc::new(PgReportStore::new(db.clone()));

    match config.app_mode.as_str() {
        "api" => {
            let catalog = Arc::new(CategoryCatalog::load(&config.categories_path)?);
            tracing::info!(
                categories = catalog.categories().len(),
                path = %config.categories_path.display(),
                "category catalog loaded"
            );

            let mailer = mailer::from_config(&config)?;
            let (queue, receiver) = MailQueue::bounded(config.mail_queue_capacity);
            let dispatcher = MailDispatcher::spawn(receiver, mailer);

            let state = AppState {
                store,
                catalog,
                verifier: verification::from_config(&config)?,
                notifier: Notifier::new(queue, config.public_base_url.clone()),
                reports_per_page: config.reports_per_page,
            };

            let app = http::router(state);
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            // The router owned the last queue handles; wait for pending mail.
            dispatcher.shutdown().await;
        }
        "migrate" => {
            tracing::info!("applying migrations");
            db.migrate().await?;
        }
        "backfill-cities" => {
            tracing::info!("starting city backfill");
            city_backfill::run(store.as_ref()).await?;
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
