//! Filtered calendar: republishes the events of an upstream calendar that a
//! user template accepts, and tracks the next such event.

mod actor;
mod handle;
mod manager;
pub mod models;
pub mod pipeline;
pub mod predicate;
pub mod source;

pub use handle::FilteredCalendarHandle;
pub use manager::FilterManager;
pub use models::{EntityState, FilterConfig, FilteredCalendarState};
pub use predicate::{Expression, JinjaExpression};

use super::registry::EntityRegistry;
use crate::config::Config;
use crate::error::FilterResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Component that owns every filtered calendar of the host
#[derive(Default)]
pub struct CalendarFilter {
    manager: RwLock<Option<Arc<FilterManager>>>,
}

impl CalendarFilter {
    /// Create a new calendar filter component
    pub fn new() -> Self {
        Self {
            manager: RwLock::new(None),
        }
    }

    /// Get the manager once the component is initialized
    pub async fn get_manager(&self) -> Option<Arc<FilterManager>> {
        self.manager.read().await.clone()
    }
}

#[async_trait]
impl super::Component for CalendarFilter {
    fn name(&self) -> &'static str {
        "calendar_filter"
    }

    async fn init(&self, registry: EntityRegistry, config: Arc<RwLock<Config>>) -> FilterResult<()> {
        let config = config.read().await.clone();
        config.settings.validate()?;
        let manager = Arc::new(FilterManager::new(registry, config.settings.clone()));

        let mut loaded = 0;
        for options in &config.filters {
            if manager.setup_platform(options).await {
                loaded += 1;
            }
        }
        for entry in &config.entries {
            if manager.setup_entry(entry).await {
                loaded += 1;
            }
        }
        info!(
            "Loaded {} of {} filtered calendars",
            loaded,
            config.filters.len() + config.entries.len()
        );

        *self.manager.write().await = Some(manager);
        Ok(())
    }

    async fn shutdown(&self) -> FilterResult<()> {
        if let Some(manager) = self.manager.write().await.take() {
            manager.shutdown_all().await;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
