use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use nl2sql::config::ServeArgs;
use nl2sql::web::{create_router, AppState};
use nl2sql::{telemetry, Controller, SessionStore};
use nl2sql_driver::{device, Driver, HostCapabilities, ModelLoader};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServeArgs::parse();
    let _trace = telemetry::init(&args.telemetry, 1)?;

    info!("starting nl2sql server v{}", env!("CARGO_PKG_VERSION"));

    let caps = HostCapabilities::detect();
    let kind = device::select(caps, args.model.cpu);
    let source = args.model.source();

    info!(?caps, device = %kind, model = %source, "selected device");

    let loader = Arc::new(ModelLoader::new(source.clone(), kind));

    if !args.lazy {
        let preload = loader.clone();
        tokio::task::spawn_blocking(move || preload.handle().map(|_| ()))
            .await?
            .wrap_err("failed to load the model")?;
    }

    let driver = Driver::boot(loader.clone(), args.workers, args.queue)?;
    let controller = Controller::new(Arc::new(driver), args.model.params());

    let state = Arc::new(
        AppState::new(controller, SessionStore::new(args.session_ttl()))?.with_model(
            source.to_string(),
            kind.to_string(),
            loader,
        ),
    );

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let ended = sweeper.sessions.purge_expired();
            if ended > 0 {
                debug!(ended, live = sweeper.sessions.len(), "expired idle sessions");
            }
        }
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", args.bind))?;

    info!("listening on http://{}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutting down"),
                Err(e) => {
                    error!(error = %e, "failed to listen for ctrl-c, serving until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}
