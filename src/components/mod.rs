use crate::error::SyncResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

// Export components
pub mod google_calendar;
pub mod redis_service;

// Re-export the calendar sync service
pub use google_calendar::CalendarSync;

/// Component trait for long-lived services with a start/stop lifecycle
#[async_trait]
pub trait Component: Send + Sync {
    /// Get the name of the component
    fn name(&self) -> &'static str;

    /// Initialize the component, starting its background work
    async fn init(&self) -> SyncResult<()>;

    /// Shutdown the component
    async fn shutdown(&self) -> SyncResult<()>;
}

/// Manager for all components
#[derive(Default)]
pub struct ComponentManager {
    components: Vec<Arc<dyn Component>>,
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("component_count", &self.components.len())
            .finish()
    }
}

impl ComponentManager {
    /// Create a new component manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component
    pub fn register(&mut self, component: Arc<dyn Component>) {
        info!("Registering component: {}", component.name());
        self.components.push(component);
    }

    /// Initialize all registered components
    pub async fn init_all(&self) -> SyncResult<()> {
        for component in &self.components {
            info!("Initializing component: {}", component.name());

            if let Err(e) = component.init().await {
                // Log error but continue with other components
                tracing::error!("Error initializing component {}: {:?}", component.name(), e);
            }
        }

        Ok(())
    }

    /// Shutdown all components, in reverse registration order
    pub async fn shutdown_all(&self) -> SyncResult<()> {
        info!("Shutting down all components");

        for component in self.components.iter().rev() {
            info!("Shutting down component: {}", component.name());

            if let Err(e) = component.shutdown().await {
                // Log error but continue with other components
                tracing::error!(
                    "Error shutting down component {}: {:?}",
                    component.name(),
                    e
                );
            }
        }

        Ok(())
    }

    /// Names of registered components, in registration order
    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }
}
