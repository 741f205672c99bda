use super::models::CalendarEvent;
use crate::error::FilterResult;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use tokio::sync::RwLock;

/// A calendar that can answer range queries.
///
/// Implementations return every event whose interval intersects
/// `[start, end)`, ordered by start time.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn get_events(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>>;
}

/// Calendar backed by a fixed list of events
pub struct InMemoryCalendar {
    tz: Tz,
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new(tz: Tz, events: Vec<CalendarEvent>) -> Self {
        Self {
            tz,
            events: RwLock::new(events),
        }
    }

    /// Replace the stored events
    pub async fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.write().await = events;
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn get_events(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>> {
        let events = self.events.read().await;
        let mut matching: Vec<CalendarEvent> = events
            .iter()
            .filter(|event| event.intersects(&start, &end, &self.tz))
            .cloned()
            .collect();

        // Stable, so events sharing a start keep their stored order
        matching.sort_by_key(|event| event.start_datetime(&self.tz));
        Ok(matching)
    }
}
