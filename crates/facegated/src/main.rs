use anyhow::{Context, Result};
use facegate_core::EventChannel;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{FacegateService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        config_file = ?config.source,
        model_dir = %config.model_dir.display(),
        store = %config.store_path.display(),
        threshold = config.acceptance_threshold,
        bus = ?config.bus,
        "facegated starting"
    );

    let events = EventChannel::default();
    let signals = events.subscribe();
    let loader = engine::onnx_loader(&config);
    let orchestrator = engine::build_orchestrator(&config, &loader, events);
    let engine = engine::spawn_engine(orchestrator, loader, config.op_timeout)?;

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, FacegateService::new(engine))?
        .build()
        .await
        .with_context(|| format!("failed to register {BUS_NAME} on the {:?} bus", config.bus))?;

    let iface = connection
        .object_server()
        .interface::<_, FacegateService>(OBJECT_PATH)
        .await?;
    tokio::spawn(dbus_interface::forward_outcomes(iface, signals));

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
