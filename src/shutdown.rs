use crate::components::redis_service::RedisActorHandle;
use crate::components::ComponentManager;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
#[cfg(windows)]
use tokio::signal::windows::{ctrl_break, ctrl_c};

/// Stop every component, then release the cache connection
pub async fn teardown(component_manager: &ComponentManager, redis_handle: Option<RedisActorHandle>) {
    // Shut down all components
    if let Err(e) = component_manager.shutdown_all().await {
        error!("Error shutting down components: {:?}", e);
    } else {
        info!("All components shut down successfully");
    }

    // Shut down Redis actor
    if let Some(redis_handle) = redis_handle {
        if let Err(e) = redis_handle.shutdown().await {
            error!("Error shutting down Redis actor: {:?}", e);
        } else {
            info!("Redis actor shut down successfully");
        }
    }
}

/// Platform-specific signal handling implementation
#[cfg(unix)]
pub async fn wait_for_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            error!("Failed to create signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal, initiating graceful shutdown");
        }
    }
}

/// Platform-specific signal handling implementation
#[cfg(windows)]
pub async fn wait_for_signal() {
    let (mut ctrlc, mut ctrlbreak) = match (ctrl_c(), ctrl_break()) {
        (Ok(ctrlc), Ok(ctrlbreak)) => (ctrlc, ctrlbreak),
        _ => {
            error!("Failed to create console handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = ctrlc.recv() => {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
        _ = ctrlbreak.recv() => {
            info!("Received Ctrl+Break signal, initiating graceful shutdown");
        }
    }
}
