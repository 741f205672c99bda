//! Mock upstream calendars shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use calendar_filter::components::calendar::{CalendarEvent, CalendarProvider, EventTime};
use calendar_filter::config::Settings;
use calendar_filter::error::{upstream_error, FilterResult};
use calendar_filter::utils::time::now_in;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{oneshot, Notify};

/// Settings for tests: UTC, 24h look-ahead, no refresh on start
pub fn test_settings() -> Settings {
    Settings {
        timezone: "UTC".to_string(),
        refresh_on_start: false,
        ..Default::default()
    }
}

/// Event starting `offset` from now and lasting one hour
pub fn event_in(summary: &str, offset: Duration) -> CalendarEvent {
    let start = now_in(&chrono_tz::UTC) + offset;
    CalendarEvent::new(
        summary,
        EventTime::DateTime(start.fixed_offset()),
        EventTime::DateTime((start + Duration::hours(1)).fixed_offset()),
    )
}

pub fn summaries(events: &[CalendarEvent]) -> Vec<String> {
    events.iter().map(|e| e.summary.clone()).collect()
}

/// One scripted answer of a [`ScriptedCalendar`]
pub struct Step {
    gate: Option<oneshot::Receiver<()>>,
    result: FilterResult<Vec<CalendarEvent>>,
}

impl Step {
    pub fn events(events: Vec<CalendarEvent>) -> Self {
        Self {
            gate: None,
            result: Ok(events),
        }
    }

    /// Answer only after the returned sender fires
    pub fn gated(events: Vec<CalendarEvent>) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                gate: Some(rx),
                result: Ok(events),
            },
            tx,
        )
    }

    pub fn failure(message: &str) -> Self {
        Self {
            gate: None,
            result: Err(upstream_error(message)),
        }
    }
}

/// Calendar answering each call with the next scripted step
#[derive(Default)]
pub struct ScriptedCalendar {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    called: Notify,
}

impl ScriptedCalendar {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            called: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` range queries have started
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl CalendarProvider for ScriptedCalendar {
    async fn get_events(
        &self,
        _start: DateTime<Tz>,
        _end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>> {
        let step = self.steps.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();

        let Some(step) = step else {
            return Ok(Vec::new());
        };
        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.result
    }
}

/// Calendar that never answers
pub struct SilentCalendar;

#[async_trait]
impl CalendarProvider for SilentCalendar {
    async fn get_events(
        &self,
        _start: DateTime<Tz>,
        _end: DateTime<Tz>,
    ) -> FilterResult<Vec<CalendarEvent>> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}
