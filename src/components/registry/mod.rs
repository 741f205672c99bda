//! In-process stand-in for the host's entity registry and change bus.
//!
//! Calendars are looked up by entity id (`calendar.work`). Entities from other
//! domains can be registered too; resolving them as a calendar fails with an
//! upstream resolution error.

mod bus;

pub use bus::{StateBus, StateChanged, Subscription};

use crate::components::calendar::CalendarProvider;
use crate::error::{resolution_error, FilterResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// An entry in the registry
#[derive(Clone)]
pub enum RegisteredEntity {
    Calendar(Arc<dyn CalendarProvider>),
    Other { domain: String },
}

impl RegisteredEntity {
    pub fn domain(&self) -> &str {
        match self {
            RegisteredEntity::Calendar(_) => "calendar",
            RegisteredEntity::Other { domain } => domain,
        }
    }
}

/// Shared registry of entities plus the bus used to announce their changes
#[derive(Clone, Default)]
pub struct EntityRegistry {
    entities: Arc<RwLock<HashMap<String, RegisteredEntity>>>,
    bus: StateBus,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &StateBus {
        &self.bus
    }

    /// Register a calendar provider, replacing any entity with the same id
    pub async fn register_calendar(
        &self,
        entity_id: impl Into<String>,
        provider: Arc<dyn CalendarProvider>,
    ) {
        let entity_id = entity_id.into();
        debug!(entity_id = %entity_id, "Registering calendar entity");
        self.entities
            .write()
            .await
            .insert(entity_id, RegisteredEntity::Calendar(provider));
    }

    /// Register a non-calendar entity
    pub async fn register_other(&self, entity_id: impl Into<String>, domain: impl Into<String>) {
        self.entities.write().await.insert(
            entity_id.into(),
            RegisteredEntity::Other {
                domain: domain.into(),
            },
        );
    }

    pub async fn remove(&self, entity_id: &str) -> Option<RegisteredEntity> {
        self.entities.write().await.remove(entity_id)
    }

    pub async fn get(&self, entity_id: &str) -> Option<RegisteredEntity> {
        self.entities.read().await.get(entity_id).cloned()
    }

    pub async fn contains(&self, entity_id: &str) -> bool {
        self.entities.read().await.contains_key(entity_id)
    }

    /// Resolve `entity_id` to a calendar provider
    pub async fn calendar(&self, entity_id: &str) -> FilterResult<Arc<dyn CalendarProvider>> {
        match self.get(entity_id).await {
            Some(RegisteredEntity::Calendar(provider)) => Ok(provider),
            Some(RegisteredEntity::Other { domain }) => Err(resolution_error(
                entity_id,
                &format!("entity belongs to domain {}, not calendar", domain),
            )),
            None => Err(resolution_error(entity_id, "entity not found")),
        }
    }

    /// Sorted ids of every registered entity
    pub async fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
