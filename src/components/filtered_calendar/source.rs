use crate::components::calendar::CalendarEvent;
use crate::components::registry::EntityRegistry;
use crate::error::{Error, FilterResult};
use chrono::DateTime;
use chrono_tz::Tz;
use std::time::Duration;
use tracing::warn;

/// Fetches events for a date range from the upstream calendar
pub struct EventSource {
    registry: EntityRegistry,
    upstream: String,
    timeout: Duration,
}

impl EventSource {
    pub fn new(registry: EntityRegistry, upstream: impl Into<String>, timeout: Duration) -> Self {
        Self {
            registry,
            upstream: upstream.into(),
            timeout,
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Resolve the upstream and run its range query under the fetch timeout
    pub async fn try_fetch(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>> {
        let calendar = self.registry.calendar(&self.upstream).await?;

        match tokio::time::timeout(self.timeout, calendar.get_events(start, end)).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamTimeout(
                self.upstream.clone(),
                self.timeout.as_secs(),
            )),
        }
    }

    /// Like [`EventSource::try_fetch`], but any failure yields no events
    pub async fn fetch(&self, start: DateTime<Tz>, end: DateTime<Tz>) -> Vec<CalendarEvent> {
        match self.try_fetch(start, end).await {
            Ok(events) => events,
            Err(e) => {
                warn!(upstream = %self.upstream, error = %e, "Could not fetch upstream events");
                Vec::new()
            }
        }
    }
}
