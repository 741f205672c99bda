use super::actor::{ActorOptions, FilterActorHandle, FilterContext, FilteredCalendarActor};
use super::models::{FilterConfig, FilteredCalendarState};
use super::predicate::JinjaExpression;
use super::source::EventSource;
use crate::components::calendar::{CalendarEvent, CalendarProvider};
use crate::components::registry::EntityRegistry;
use crate::config::Settings;
use crate::error::FilterResult;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handle for interacting with a filtered calendar
#[derive(Clone)]
pub struct FilteredCalendarHandle {
    actor_handle: FilterActorHandle,
    ctx: Arc<FilterContext>,
    state_rx: watch::Receiver<FilteredCalendarState>,
    _actor_task: Arc<JoinHandle<()>>,
}

impl FilteredCalendarHandle {
    /// Create the filtered calendar, subscribe it to its upstream and spawn the actor
    pub fn start(
        config: FilterConfig,
        registry: &EntityRegistry,
        settings: &Settings,
    ) -> FilterResult<Self> {
        let tz = settings.tz()?;
        let ctx = Arc::new(FilterContext {
            entity_id: config.entity_id(),
            source: EventSource::new(
                registry.clone(),
                config.calendar_entity.clone(),
                settings.fetch_timeout(),
            ),
            expression: JinjaExpression::new(config.template.clone(), tz),
            tz,
            lookahead: settings.lookahead(),
            config,
        });

        let options = ActorOptions {
            refresh_on_start: settings.refresh_on_start,
            retain_on_fetch_failure: settings.retain_on_fetch_failure,
        };
        let (mut actor, actor_handle, state_rx) =
            FilteredCalendarActor::new(Arc::clone(&ctx), registry.bus().clone(), options);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Ok(Self {
            actor_handle,
            ctx,
            state_rx,
            _actor_task: Arc::new(actor_task),
        })
    }

    pub fn entity_id(&self) -> &str {
        &self.ctx.entity_id
    }

    pub fn name(&self) -> &str {
        &self.ctx.config.name
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.ctx.config.unique_id.as_deref()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.ctx.config
    }

    pub fn timezone(&self) -> Tz {
        self.ctx.tz
    }

    /// Queue a refresh
    pub fn refresh(&self) -> FilterResult<()> {
        self.actor_handle.refresh()
    }

    /// Refresh and wait for the resulting authoritative state
    pub async fn refresh_now(&self) -> FilterResult<FilteredCalendarState> {
        self.actor_handle.refresh_now().await
    }

    /// Currently selected next event
    pub async fn next_event(&self) -> FilterResult<Option<CalendarEvent>> {
        Ok(self.actor_handle.current_state().await?.next_event)
    }

    /// Last published state
    pub fn state(&self) -> FilteredCalendarState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<FilteredCalendarState> {
        self.state_rx.clone()
    }

    /// Filtered events in `[start, end)`, fetched fresh.
    ///
    /// Also queues a refresh of the next event; the returned events never
    /// write the cached state themselves.
    pub async fn filtered_events(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Vec<CalendarEvent> {
        if let Err(e) = self.refresh() {
            warn!(entity_id = %self.ctx.entity_id, error = %e, "Could not queue refresh after range query");
        }
        self.ctx.events_between(start, end).await
    }

    /// Stop the actor and release the upstream subscription
    pub async fn shutdown(&self) -> FilterResult<()> {
        self.actor_handle.shutdown().await
    }
}

#[async_trait]
impl CalendarProvider for FilteredCalendarHandle {
    async fn get_events(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>> {
        Ok(self.filtered_events(start, end).await)
    }
}
