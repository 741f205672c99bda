use super::models::{FilterConfig, FilteredCalendarState};
use super::pipeline::filter_events;
use super::predicate::JinjaExpression;
use super::source::EventSource;
use crate::components::calendar::CalendarEvent;
use crate::components::registry::{StateBus, Subscription};
use crate::error::{component_error, FilterResult};
use crate::utils::time::{lookahead_window, now_in};
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{debug, info, warn};

const MAILBOX_SIZE: usize = 32;

/// Everything a refresh or range query needs, shared with spawned fetches
pub struct FilterContext {
    pub entity_id: String,
    pub config: FilterConfig,
    pub source: EventSource,
    pub expression: JinjaExpression,
    pub tz: Tz,
    pub lookahead: chrono::Duration,
}

impl FilterContext {
    /// Fresh fetch and filter over `[start, end)`
    pub async fn events_between(&self, start: DateTime<Tz>, end: DateTime<Tz>) -> Vec<CalendarEvent> {
        let events = self.source.fetch(start, end).await;
        filter_events(events, &self.expression)
    }

    /// Earliest passing event in the look-ahead window
    async fn compute_next_event(&self) -> FilterResult<Option<CalendarEvent>> {
        let (start, end) = lookahead_window(now_in(&self.tz), self.lookahead)?;
        let events = self.source.try_fetch(start, end).await?;
        // Upstream results are chronological, so the first survivor is the next event
        Ok(filter_events(events, &self.expression).into_iter().next())
    }
}

/// Commands that can be sent to the filtered calendar actor
pub enum FilterCommand {
    Refresh(Option<oneshot::Sender<FilteredCalendarState>>),
    RefreshCompleted {
        sequence: u64,
        outcome: FilterResult<Option<CalendarEvent>>,
        responder: Option<oneshot::Sender<FilteredCalendarState>>,
    },
    CurrentState(oneshot::Sender<FilteredCalendarState>),
    Shutdown,
}

/// Handle for communicating with the filtered calendar actor
#[derive(Clone)]
pub struct FilterActorHandle {
    command_tx: mpsc::Sender<FilterCommand>,
}

impl FilterActorHandle {
    /// Queue a refresh without waiting for it
    pub fn refresh(&self) -> FilterResult<()> {
        self.command_tx
            .try_send(FilterCommand::Refresh(None))
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))
    }

    /// Run a refresh and wait until its result has been applied or discarded
    pub async fn refresh_now(&self) -> FilterResult<FilteredCalendarState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(FilterCommand::Refresh(Some(response_tx)))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .await
            .map_err(|_| component_error("Response channel closed"))
    }

    pub async fn current_state(&self) -> FilterResult<FilteredCalendarState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(FilterCommand::CurrentState(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .await
            .map_err(|_| component_error("Response channel closed"))
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> FilterResult<()> {
        let _ = self.command_tx.send(FilterCommand::Shutdown).await;
        Ok(())
    }
}

/// Owner of one filtered calendar's state.
///
/// Refreshes fetch concurrently in spawned tasks; each is numbered when it
/// starts and its completion is applied only if no later-started refresh has
/// been applied already.
pub struct FilteredCalendarActor {
    ctx: Arc<FilterContext>,
    command_rx: mpsc::Receiver<FilterCommand>,
    command_tx: mpsc::WeakSender<FilterCommand>,
    /// Upstream changes not yet turned into a refresh; repeated changes coalesce
    upstream_changed: Arc<Notify>,
    state_tx: watch::Sender<FilteredCalendarState>,
    bus: StateBus,
    subscription: Option<Subscription>,
    state: FilteredCalendarState,
    next_sequence: u64,
    last_applied: u64,
    refresh_on_start: bool,
    retain_on_fetch_failure: bool,
}

/// Behaviour switches taken from the runtime settings
#[derive(Debug, Clone, Copy)]
pub struct ActorOptions {
    pub refresh_on_start: bool,
    pub retain_on_fetch_failure: bool,
}

impl FilteredCalendarActor {
    /// Create the actor, subscribe it to upstream changes and return its handle
    pub fn new(
        ctx: Arc<FilterContext>,
        bus: StateBus,
        options: ActorOptions,
    ) -> (Self, FilterActorHandle, watch::Receiver<FilteredCalendarState>) {
        let (command_tx, command_rx) = mpsc::channel(MAILBOX_SIZE);
        let (state_tx, state_rx) = watch::channel(FilteredCalendarState::default());

        let upstream_changed = Arc::new(Notify::new());
        let trigger = Arc::clone(&upstream_changed);
        let subscription = bus.track_state_change(ctx.config.calendar_entity.clone(), move || {
            trigger.notify_one();
        });

        let actor = Self {
            ctx,
            command_rx,
            command_tx: command_tx.downgrade(),
            upstream_changed,
            state_tx,
            bus,
            subscription: Some(subscription),
            state: FilteredCalendarState::default(),
            next_sequence: 0,
            last_applied: 0,
            refresh_on_start: options.refresh_on_start,
            retain_on_fetch_failure: options.retain_on_fetch_failure,
        };

        (actor, FilterActorHandle { command_tx }, state_rx)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!(entity_id = %self.ctx.entity_id, upstream = %self.ctx.config.calendar_entity, "Filtered calendar started");

        if self.refresh_on_start {
            self.start_refresh(None);
        }

        while let Some(cmd) = self.next_command().await {
            match cmd {
                FilterCommand::Refresh(responder) => self.start_refresh(responder),
                FilterCommand::RefreshCompleted {
                    sequence,
                    outcome,
                    responder,
                } => {
                    self.complete_refresh(sequence, outcome);
                    if let Some(responder) = responder {
                        let _ = responder.send(self.state.clone());
                    }
                }
                FilterCommand::CurrentState(response_tx) => {
                    let _ = response_tx.send(self.state.clone());
                }
                FilterCommand::Shutdown => {
                    info!(entity_id = %self.ctx.entity_id, "Filtered calendar shutting down");
                    break;
                }
            }
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        info!(entity_id = %self.ctx.entity_id, "Filtered calendar shut down");
    }

    /// Next mailbox command, or a refresh when the upstream changed
    async fn next_command(&mut self) -> Option<FilterCommand> {
        tokio::select! {
            cmd = self.command_rx.recv() => cmd,
            _ = self.upstream_changed.notified() => {
                debug!(entity_id = %self.ctx.entity_id, "Upstream changed");
                Some(FilterCommand::Refresh(None))
            }
        }
    }

    fn start_refresh(&mut self, responder: Option<oneshot::Sender<FilteredCalendarState>>) {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        let ctx = Arc::clone(&self.ctx);
        let command_tx = self.command_tx.clone();
        debug!(entity_id = %ctx.entity_id, sequence, "Starting refresh");

        tokio::spawn(async move {
            let outcome = ctx.compute_next_event().await;
            // The actor is gone if nobody can be upgraded; the result has no owner
            if let Some(tx) = command_tx.upgrade() {
                let _ = tx
                    .send(FilterCommand::RefreshCompleted {
                        sequence,
                        outcome,
                        responder,
                    })
                    .await;
            }
        });
    }

    fn complete_refresh(&mut self, sequence: u64, outcome: FilterResult<Option<CalendarEvent>>) {
        if sequence <= self.last_applied {
            debug!(
                entity_id = %self.ctx.entity_id,
                sequence,
                last_applied = self.last_applied,
                "Discarding stale refresh"
            );
            return;
        }

        match outcome {
            Ok(next_event) => self.apply(sequence, next_event),
            Err(e) if e.is_transient() && self.retain_on_fetch_failure => {
                warn!(
                    entity_id = %self.ctx.entity_id,
                    sequence,
                    error = %e,
                    "Upstream fetch failed, keeping previous next event"
                );
            }
            Err(e) => {
                warn!(
                    entity_id = %self.ctx.entity_id,
                    sequence,
                    error = %e,
                    "Upstream calendar unavailable, clearing next event"
                );
                self.apply(sequence, None);
            }
        }
    }

    /// Record and publish a refresh result. Publication is the last step.
    fn apply(&mut self, sequence: u64, next_event: Option<CalendarEvent>) {
        let changed = self.state.next_event != next_event;
        self.last_applied = sequence;
        self.state = FilteredCalendarState {
            next_event,
            sequence,
        };

        self.state_tx.send_replace(self.state.clone());
        if changed {
            self.bus.notify(&self.ctx.entity_id);
        }
        debug!(
            entity_id = %self.ctx.entity_id,
            sequence,
            has_next_event = self.state.has_next_event(),
            "Applied refresh"
        );
    }
}
