use crate::components::{CalendarFilter, ComponentManager, EntityRegistry, StaticCalendars};
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start every component and run until a termination signal arrives
pub async fn start_host(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let registry = EntityRegistry::new();
    let mut component_manager = ComponentManager::new(registry, Arc::clone(&config));

    // Upstream calendars first so filters resolve on their first refresh
    component_manager.register(StaticCalendars::new());
    component_manager.register(CalendarFilter::new());

    component_manager.init_all().await?;
    let component_manager = Arc::new(component_manager);

    spawn_state_loggers(&component_manager).await;

    let (shutdown_send, shutdown_recv) = oneshot::channel();
    let shutdown_components = Arc::clone(&component_manager);
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components).await;
    });

    info!("Calendar filter host running");
    if shutdown_recv.await.is_err() {
        error!("Signal handler ended without a shutdown notice");
        component_manager.shutdown_all().await?;
    }
    info!("Calendar filter host stopped");
    Ok(())
}

/// Log every state a filtered calendar publishes
async fn spawn_state_loggers(component_manager: &ComponentManager) {
    let Some(filter) = component_manager.get_component::<CalendarFilter>() else {
        return;
    };
    let Some(manager) = filter.get_manager().await else {
        return;
    };

    for handle in manager.handles().await {
        let mut state_rx = handle.subscribe();
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = state_rx.borrow_and_update().clone();
                let tz = handle.timezone();
                let now = crate::utils::time::now_in(&tz);
                let attributes = serde_json::Value::Object(state.attributes(&tz));
                info!(
                    entity_id = %handle.entity_id(),
                    state = %state.state_at(&now),
                    sequence = state.sequence,
                    attributes = %attributes,
                    "Published state"
                );
            }
        });
    }
}
