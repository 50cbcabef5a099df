//! Optional HTTP endpoint exposing channel states and bound modules.

use crate::modules::{BindingSnapshot, ModuleManager};
use crate::status::ModuleStatus;
use anyhow::{Context, Result};
use api::StopToken;
use axum::{extract::State, routing::get, Json, Router};
use log::{error, info};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: ModuleStatus,
    pub bindings: BindingSnapshot,
}

#[derive(Clone)]
struct HostState {
    manager: Arc<ModuleManager>,
}

pub fn router(manager: Arc<ModuleManager>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(HostState { manager })
}

async fn status_handler(State(state): State<HostState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.manager.status().get(),
        bindings: state.manager.bindings(),
    })
}

pub struct StatusHost;

impl StatusHost {
    /// Serves `app` until `stop` fires. Reports the bound address through `bound`.
    pub async fn serve(
        requested_port: u16,
        app: Router,
        stop: StopToken,
        bound: Option<SyncSender<SocketAddr>>,
    ) -> Result<()> {
        // 0 picks a free port
        let addr = SocketAddr::from(([127, 0, 0, 1], requested_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status host on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("Status host listening on http://{}/status", local_addr);
        if let Some(bound) = bound {
            let _ = bound.send(local_addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !stop.is_stopped() {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            })
            .await?;

        info!("Status host stopped");
        Ok(())
    }
}

/// Runs the status host on its own Tokio runtime thread and waits until the
/// listener is bound.
pub fn spawn_status_host(
    port: u16,
    manager: Arc<ModuleManager>,
    stop: StopToken,
) -> Result<(JoinHandle<()>, SocketAddr)> {
    let (bound_tx, bound_rx) = sync_channel(1);
    let handle = thread::Builder::new()
        .name("status-host".into())
        .spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create Tokio runtime: {}", e);
                    return;
                }
            };
            rt.block_on(async {
                if let Err(e) = StatusHost::serve(port, router(manager), stop, Some(bound_tx)).await
                {
                    error!("Status host failed: {:#}", e);
                }
            });
        })
        .context("Failed to spawn status host thread")?;

    let addr = bound_rx
        .recv()
        .context("Status host exited before binding")?;
    Ok((handle, addr))
}
