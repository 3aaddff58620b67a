use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::control::{self, ControlState};
use crate::error::Result;
use crate::queue::JobQueue;

/// Accept control connections forever, one short-lived task per connection.
/// Failing to bind is startup-fatal and propagates to the caller; accept
/// errors are logged and the loop keeps serving.
pub async fn run(port: u16, queue: Arc<JobQueue>, control: Arc<ControlState>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening for connections on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let queue = queue.clone();
                let control = control.clone();
                tokio::spawn(async move {
                    if let Err(e) = control::handle_connection(stream, &queue, &control).await {
                        warn!("Error on connection from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                warn!("Error on accepting connection: {}", e);
            }
        }
    }
}

/// Watch for OS interrupts and feed them into the two-stage shutdown: the
/// first interrupt requests a graceful drain, a second one while that is
/// pending forces immediate termination.
pub fn spawn_signal_watcher(control: Arc<ControlState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => control::handle_stop_request(&control),
                Err(e) => {
                    warn!("Failed to listen for interrupt signals: {}", e);
                    break;
                }
            }
        }
    })
}
