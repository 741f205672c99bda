pub mod models;
pub mod provider;
mod scheduler;

pub use models::{CalendarEvent, EventTime};
pub use provider::{CalendarProvider, InMemoryCalendar};
pub use scheduler::start_change_ticker;

use super::registry::EntityRegistry;
use crate::config::Config;
use crate::error::FilterResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves the calendars listed in the configuration file
#[derive(Default)]
pub struct StaticCalendars {
    token: CancellationToken,
    ticker: RwLock<Option<JoinHandle<()>>>,
    entity_ids: RwLock<Vec<String>>,
}

impl StaticCalendars {
    /// Create a new static calendars component
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entity_ids(&self) -> Vec<String> {
        self.entity_ids.read().await.clone()
    }
}

#[async_trait]
impl super::Component for StaticCalendars {
    fn name(&self) -> &'static str {
        "static_calendars"
    }

    async fn init(&self, registry: EntityRegistry, config: Arc<RwLock<Config>>) -> FilterResult<()> {
        let config = config.read().await;
        config.settings.validate()?;
        let tz = config.settings.tz()?;

        let mut entity_ids = Vec::with_capacity(config.calendars.len());
        for calendar in &config.calendars {
            info!(
                "Serving {} events as {}",
                calendar.events.len(),
                calendar.entity_id
            );
            registry
                .register_calendar(
                    calendar.entity_id.clone(),
                    Arc::new(InMemoryCalendar::new(tz, calendar.events.clone())),
                )
                .await;
            entity_ids.push(calendar.entity_id.clone());
        }

        let ticker = start_change_ticker(
            registry.bus().clone(),
            entity_ids.clone(),
            config.settings.poll_interval(),
            self.token.clone(),
        );
        *self.ticker.write().await = Some(ticker);
        *self.entity_ids.write().await = entity_ids;
        Ok(())
    }

    async fn shutdown(&self) -> FilterResult<()> {
        self.token.cancel();
        if let Some(ticker) = self.ticker.write().await.take() {
            let _ = ticker.await;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
