// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use swapnest_server::{
    api::router,
    bootstrap,
    clock::{Clock, SystemClock},
    config::{AppConfig, ConfigError, LogFormat, DEFAULT_LOG_FILTER},
    error::MarketError,
    mail::{LogMailer, MailError, Mailer, SmtpMailer},
    otp::OtpSweeper,
    state::AppState,
    storage::{DbError, MarketDb},
};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] DbError),
    #[error("admin provisioning: {0}")]
    Admin(#[from] MarketError),
    #[error("mail transport: {0}")]
    Mail(#[from] MailError),
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
    token.cancel();
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    if config.jwt_secret_generated {
        tracing::warn!("JWT_SECRET not set; sessions will not survive a restart");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db = Arc::new(MarketDb::open_in(&config.data_dir)?);
    tracing::info!(data_dir = %config.data_dir.display(), "Database opened");

    bootstrap::seed_catalog(&db, clock.now())?;
    match &config.admin {
        Some(admin) => {
            let outcome = bootstrap::ensure_admin(&db, admin, clock.now())?;
            tracing::info!(?outcome, "Administrator provisioning done");
        }
        None => tracing::warn!("ADMIN_EMAIL not set; no administrator is provisioned"),
    }

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Using SMTP mail transport");
            Arc::new(SmtpMailer::new(smtp, &config.mail_from)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, db.clone(), mailer, clock.clone(), shutdown.clone());

    let sweeper = OtpSweeper::new(db, clock, config.otp_sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "SwapNest server listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::warn!(error = %e, "Passcode sweeper task failed");
    }
    tracing::info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
