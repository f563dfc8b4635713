//! The top-level controller: wires the store, transport, engine, control
//! server, and the scheduler tick loop, and owns graceful shutdown.

use std::sync::{Arc, LazyLock};

use courier_common::{Signal, logging};
use courier_control::{ControlServer, DEFAULT_CONTROL_SOCKET};
use courier_engine::{Engine, EngineConfig, TransportConfig};
use courier_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::control_handler::CourierControlHandler;

const fn default_tick_interval() -> u64 {
    60
}

fn default_socket_path() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

/// Control socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Path of the Unix domain socket the admin tooling connects to.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

/// Scheduler tick configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TickConfig {
    /// Seconds between `process_due` invocations.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
        }
    }
}

/// The courier daemon, deserialized straight from the RON config file.
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    control: ControlConfig,
    #[serde(default)]
    scheduler: TickConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(16);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("CTRL+C received, shutting down");
        }
        _ = terminate.recv() => {
            info!("Terminate signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Courier {
    /// Run the daemon until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the control server cannot bind its socket or a
    /// component exits with a fatal error.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let store = self.store.build();
        let transport = self.transport.build();
        let engine = Engine::new(Arc::clone(&store), transport, self.engine.clone());

        info!("Courier running");

        let handler = Arc::new(CourierControlHandler::new(engine.clone(), Arc::clone(&store)));
        let control = ControlServer::new(self.control.socket_path.clone(), handler);

        let scheduler = engine.scheduler.clone();
        let tick_interval = std::time::Duration::from_secs(self.scheduler.tick_interval_secs);

        let ret = tokio::select! {
            r = control.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            () = Self::tick_loop(scheduler, tick_interval, SHUTDOWN_BROADCAST.subscribe()) => {
                Ok(())
            }
            r = shutdown() => {
                r
            }
        };

        info!("Shutting down...");

        ret
    }

    /// Periodically advance due enrollments until shutdown.
    async fn tick_loop(
        scheduler: courier_engine::SequenceScheduler,
        interval: std::time::Duration,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        let mut timer = tokio::time::interval(interval);
        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match scheduler.process_due().await {
                        Ok(report) if report.processed > 0 => {
                            info!(
                                processed = report.processed,
                                sent = report.sent,
                                skipped = report.skipped,
                                "scheduler tick"
                            );
                        }
                        Ok(_) => {
                            debug!("scheduler tick, nothing due");
                        }
                        Err(e) => {
                            error!("scheduler tick failed: {e}");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Scheduler tick loop received shutdown signal");
                    break;
                }
            }
        }
    }
}
