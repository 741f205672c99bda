use super::handle::FilteredCalendarHandle;
use super::models::FilterConfig;
use crate::components::registry::EntityRegistry;
use crate::config::{ConfigEntry, FilterOptions, Settings};
use crate::error::{config_error, FilterResult};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Creates, reloads and tears down filtered calendars.
///
/// Setup failures are logged and reported as `false`; they never propagate.
pub struct FilterManager {
    registry: EntityRegistry,
    settings: Settings,
    entities: RwLock<HashMap<String, FilteredCalendarHandle>>,
    /// entry id -> entity id
    entries: RwLock<HashMap<String, String>>,
}

impl FilterManager {
    pub fn new(registry: EntityRegistry, settings: Settings) -> Self {
        Self {
            registry,
            settings,
            entities: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Set up a filter declared in static configuration
    pub async fn setup_platform(&self, options: &FilterOptions) -> bool {
        let config = match FilterConfig::from_options(options) {
            Ok(config) => config,
            Err(e) => {
                error!(name = %options.name, error = %e, "Could not set up calendar filter");
                return false;
            }
        };

        match self.add_entity(config).await {
            Ok(_) => true,
            Err(e) => {
                error!(name = %options.name, error = %e, "Could not set up calendar filter");
                false
            }
        }
    }

    /// Set up a filter backed by a configuration entry
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> bool {
        if self.entries.read().await.contains_key(&entry.entry_id) {
            warn!(entry_id = %entry.entry_id, "Configuration entry is already set up");
            return false;
        }

        let config = match FilterConfig::from_entry(entry) {
            Ok(config) => config,
            Err(e) => {
                error!(entry_id = %entry.entry_id, error = %e, "Could not set up configuration entry");
                return false;
            }
        };

        match self.add_entity(config).await {
            Ok(entity_id) => {
                self.entries
                    .write()
                    .await
                    .insert(entry.entry_id.clone(), entity_id);
                true
            }
            Err(e) => {
                error!(entry_id = %entry.entry_id, error = %e, "Could not set up configuration entry");
                false
            }
        }
    }

    /// Apply changed options by tearing the entity down and creating it again
    pub async fn update_entry(&self, entry: &ConfigEntry) -> bool {
        info!(entry_id = %entry.entry_id, title = %entry.title(), "Reloading configuration entry");
        self.unload_entry(&entry.entry_id).await;
        self.setup_entry(entry).await
    }

    /// Tear down the entity created for a configuration entry
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let entity_id = self.entries.write().await.remove(entry_id);
        match entity_id {
            Some(entity_id) => {
                self.remove_entity(&entity_id).await;
                true
            }
            None => {
                warn!(entry_id = %entry_id, "Configuration entry is not loaded");
                false
            }
        }
    }

    pub async fn get(&self, entity_id: &str) -> Option<FilteredCalendarHandle> {
        self.entities.read().await.get(entity_id).cloned()
    }

    /// Handle of the entity created for a configuration entry
    pub async fn get_entry(&self, entry_id: &str) -> Option<FilteredCalendarHandle> {
        let entity_id = self.entries.read().await.get(entry_id).cloned()?;
        self.get(&entity_id).await
    }

    pub async fn handles(&self) -> Vec<FilteredCalendarHandle> {
        let mut handles: Vec<_> = self.entities.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));
        handles
    }

    pub async fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entities.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Shut down every filtered calendar
    pub async fn shutdown_all(&self) {
        let handles: Vec<_> = self.entities.write().await.drain().collect();
        self.entries.write().await.clear();

        for (entity_id, _) in &handles {
            self.registry.remove(entity_id).await;
        }

        let results = join_all(handles.iter().map(|(_, handle)| handle.shutdown())).await;
        for ((entity_id, _), result) in handles.iter().zip(results) {
            if let Err(e) = result {
                error!(entity_id = %entity_id, error = %e, "Error shutting down filtered calendar");
            }
        }
    }

    async fn add_entity(&self, config: FilterConfig) -> FilterResult<String> {
        let entity_id = config.entity_id();
        let mut entities = self.entities.write().await;

        if entities.contains_key(&entity_id) || self.registry.contains(&entity_id).await {
            return Err(config_error(&format!("Entity {} already exists", entity_id)));
        }

        let handle = FilteredCalendarHandle::start(config, &self.registry, &self.settings)?;
        self.registry
            .register_calendar(entity_id.clone(), Arc::new(handle.clone()))
            .await;
        entities.insert(entity_id.clone(), handle);

        info!(entity_id = %entity_id, "Added filtered calendar");
        Ok(entity_id)
    }

    async fn remove_entity(&self, entity_id: &str) {
        let handle = self.entities.write().await.remove(entity_id);
        self.registry.remove(entity_id).await;

        if let Some(handle) = handle {
            if let Err(e) = handle.shutdown().await {
                error!(entity_id = %entity_id, error = %e, "Error shutting down filtered calendar");
            }
            info!(entity_id = %entity_id, "Removed filtered calendar");
        }
    }
}
