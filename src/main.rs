//! serial-forwarder binary.
//!
//! Usage: serial-forwarder <HTTP_PORT> <SERIAL_PORT> <BAUD> <BUFFER_LENGTH> [LOG]

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use serial_forwarder::shutdown::{self, ShutdownOutcome, ShutdownPlan};
use serial_forwarder::{
    AppState, Cli, Config, Forwarder, ForwarderBuilder, Mode, SimulatedForwarder, build_router,
};

#[tokio::main]
async fn main() -> serial_forwarder::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::try_from(Cli::parse())?;
    info!(?config, "starting serial forwarder");

    let forwarder: Arc<dyn Forwarder> = match config.mode {
        Mode::Live => {
            let mut builder = ForwarderBuilder::new(&config.serial_port)
                .baud(config.baud)
                .capacity(config.capacity)
                .settle(config.settle);
            if let Some(dir) = &config.log_dir {
                builder = builder.log_dir(dir);
            }
            if let Some(delay) = config.reconnect {
                builder = builder.reconnect(delay);
            }
            Arc::new(builder.build().await?)
        }
        Mode::Simulated => Arc::new(
            SimulatedForwarder::start(
                &config.serial_port,
                config.baud,
                config.capacity,
                config.settle,
            )
            .await,
        ),
    };

    let token = CancellationToken::new();
    let plan = ShutdownPlan::default();

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received kill signal, shutting down gracefully");
            signal_token.cancel();
        }
    });

    let deadline_token = token.clone();
    tokio::spawn(async move {
        deadline_token.cancelled().await;
        shutdown::arm_deadline(plan.deadline);
    });

    // Readiness line for supervisors that wait on stdout.
    let listener = shutdown::bind_and_announce(config.addr, &mut std::io::stdout()).await?;
    info!("listening on http://{}", config.addr);

    let router = build_router(AppState::new(forwarder.clone(), token.clone()));
    let outcome = shutdown::serve(listener, router, token, plan).await?;

    if let Err(e) = forwarder.close().await {
        warn!("error closing forwarder: {e}");
    }
    match outcome {
        ShutdownOutcome::Graceful => info!("server stopped"),
        ShutdownOutcome::Forced => warn!("server stopped with connections dropped"),
    }
    Ok(())
}
