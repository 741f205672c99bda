mod common;

use calendar_filter::components::calendar::{CalendarProvider, InMemoryCalendar};
use calendar_filter::components::filtered_calendar::{
    EntityState, FilterConfig, FilteredCalendarHandle,
};
use calendar_filter::components::registry::EntityRegistry;
use calendar_filter::config::{FilterOptions, Settings};
use calendar_filter::utils::time::now_in;
use chrono::Duration;
use common::{event_in, summaries, test_settings, ScriptedCalendar, SilentCalendar, Step};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const UPSTREAM: &str = "calendar.family";

fn config(template: &str) -> FilterConfig {
    FilterConfig::from_options(&FilterOptions::new("Filtered", UPSTREAM, template)).unwrap()
}

async fn registry_with(calendar: Arc<dyn CalendarProvider>) -> EntityRegistry {
    let registry = EntityRegistry::new();
    registry.register_calendar(UPSTREAM, calendar).await;
    registry
}

fn start(template: &str, registry: &EntityRegistry, settings: &Settings) -> FilteredCalendarHandle {
    FilteredCalendarHandle::start(config(template), registry, settings).unwrap()
}

#[tokio::test]
async fn test_refresh_selects_earliest_passing_event() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![
            event_in("standup", Duration::hours(1)),
            event_in("dentist", Duration::hours(3)),
        ],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ event.summary == 'dentist' }}", &registry, &test_settings());

    let state = handle.refresh_now().await.unwrap();
    assert_eq!(state.next_event.as_ref().map(|e| e.summary.as_str()), Some("dentist"));
    assert_eq!(state.sequence, 1);
    assert_eq!(handle.next_event().await.unwrap(), state.next_event);
    assert_eq!(handle.state(), state);
}

#[tokio::test]
async fn test_refresh_with_no_events_has_no_next_event() {
    let registry = registry_with(Arc::new(InMemoryCalendar::new(chrono_tz::UTC, Vec::new()))).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    let state = handle.refresh_now().await.unwrap();
    assert!(state.next_event.is_none());
    assert_eq!(state.state_at(&now_in(&chrono_tz::UTC)), EntityState::Off);
}

#[tokio::test]
async fn test_events_beyond_lookahead_are_ignored() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("next week", Duration::days(7))],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    assert!(handle.refresh_now().await.unwrap().next_event.is_none());
}

#[tokio::test]
async fn test_in_progress_event_turns_state_on() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("meeting", Duration::minutes(-30))],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    let state = handle.refresh_now().await.unwrap();
    assert_eq!(state.state_at(&now_in(&chrono_tz::UTC)), EntityState::On);
    assert_eq!(state.attributes(&chrono_tz::UTC)["message"], "meeting");
}

#[tokio::test]
async fn test_range_query_returns_fresh_events() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![
            event_in("work: planning", Duration::hours(2)),
            event_in("gym", Duration::hours(4)),
            event_in("work: review", Duration::days(3)),
        ],
    ));
    let registry = registry_with(calendar.clone()).await;
    let handle = start("{{ event.summary is startingwith('work') }}", &registry, &test_settings());
    let mut state_rx = handle.subscribe();

    let now = now_in(&chrono_tz::UTC);
    let events = handle.filtered_events(now, now + Duration::days(7)).await;
    assert_eq!(summaries(&events), vec!["work: planning", "work: review"]);

    // Events outside the look-ahead never become the next event
    let state = tokio::time::timeout(
        StdDuration::from_secs(5),
        state_rx.wait_for(|s| s.sequence >= 1),
    )
    .await
    .expect("range query did not refresh")
    .unwrap()
    .clone();
    assert_eq!(state.next_event.unwrap().summary, "work: planning");

    // Upstream changes show up in range queries right away
    calendar.set_events(vec![event_in("work: new", Duration::hours(1))]).await;
    let events = handle.filtered_events(now, now + Duration::days(7)).await;
    assert_eq!(summaries(&events), vec!["work: new"]);

    tokio::time::timeout(
        StdDuration::from_secs(5),
        state_rx.wait_for(|s| s.next_event.as_ref().is_some_and(|e| e.summary == "work: new")),
    )
    .await
    .expect("range query refresh did not publish")
    .unwrap();
}

#[tokio::test]
async fn test_range_query_queues_refresh() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![
            event_in("gym", Duration::hours(1)),
            event_in("dentist", Duration::days(30)),
        ],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());
    assert_eq!(handle.state().sequence, 0);

    let now = now_in(&chrono_tz::UTC);
    let events = handle.filtered_events(now, now + Duration::days(60)).await;
    assert_eq!(summaries(&events), vec!["gym", "dentist"]);

    let mut state_rx = handle.subscribe();
    tokio::time::timeout(
        StdDuration::from_secs(5),
        state_rx.wait_for(|s| s.sequence > 0),
    )
    .await
    .expect("range query did not queue a refresh")
    .unwrap();
    assert!(handle.state().sequence > 0);
    assert_eq!(handle.next_event().await.unwrap().unwrap().summary, "gym");
}

#[tokio::test]
async fn test_burst_of_upstream_changes_settles_on_latest() {
    let calendar = Arc::new(InMemoryCalendar::new(chrono_tz::UTC, Vec::new()));
    let registry = registry_with(calendar.clone()).await;
    let handle = start("{{ true }}", &registry, &test_settings());
    let mut state_rx = handle.subscribe();

    for _ in 0..200 {
        registry.bus().notify(UPSTREAM);
    }
    calendar.set_events(vec![event_in("latest", Duration::hours(1))]).await;
    registry.bus().notify(UPSTREAM);

    tokio::time::timeout(
        StdDuration::from_secs(5),
        state_rx.wait_for(|s| s.next_event.as_ref().is_some_and(|e| e.summary == "latest")),
    )
    .await
    .expect("last upstream change was lost")
    .unwrap();
}

#[tokio::test]
async fn test_oversized_lookahead_clears_instead_of_failing() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("dentist", Duration::hours(1))],
    ));
    let registry = registry_with(calendar).await;
    let settings = Settings {
        lookahead_hours: 2_500_000_000,
        ..test_settings()
    };
    let handle = start("{{ true }}", &registry, &settings);

    let state = handle.refresh_now().await.unwrap();
    assert!(state.next_event.is_none());
    assert_eq!(state.sequence, 1);
}

#[tokio::test]
async fn test_upstream_change_triggers_refresh() {
    let calendar = Arc::new(InMemoryCalendar::new(chrono_tz::UTC, Vec::new()));
    let registry = registry_with(calendar.clone()).await;
    let handle = start("{{ 'swim' in event.summary }}", &registry, &test_settings());
    let mut state_rx = handle.subscribe();

    calendar
        .set_events(vec![
            event_in("piano", Duration::hours(1)),
            event_in("swimming", Duration::hours(2)),
        ])
        .await;
    registry.bus().notify(UPSTREAM);

    tokio::time::timeout(StdDuration::from_secs(5), state_rx.changed())
        .await
        .expect("no state published")
        .unwrap();
    let state = state_rx.borrow().clone();
    assert_eq!(state.next_event.map(|e| e.summary), Some("swimming".to_string()));
}

#[tokio::test]
async fn test_filtered_entity_announces_its_changes() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("swimming", Duration::hours(2))],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = registry
        .bus()
        .track_state_change(handle.entity_id().to_string(), move || {
            let _ = tx.send(());
        });

    handle.refresh_now().await.unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), rx.recv())
        .await
        .expect("filtered calendar did not announce its change");
}

#[tokio::test]
async fn test_out_of_order_completion_keeps_newest_refresh() {
    let (slow, release) = Step::gated(vec![event_in("old result", Duration::hours(1))]);
    let calendar = Arc::new(ScriptedCalendar::new(vec![
        slow,
        Step::events(vec![event_in("new result", Duration::hours(2))]),
    ]));
    let registry = registry_with(calendar.clone()).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    // First refresh blocks inside the upstream fetch
    let first = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.refresh_now().await })
    };
    calendar.wait_for_calls(1).await;

    // Second refresh starts later but finishes first
    let second = handle.refresh_now().await.unwrap();
    assert_eq!(second.sequence, 2);
    assert_eq!(second.next_event.as_ref().unwrap().summary, "new result");

    release.send(()).unwrap();
    let after_first = first.await.unwrap().unwrap();

    assert_eq!(after_first, second);
    assert_eq!(handle.state(), second);
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_event() {
    let calendar = Arc::new(ScriptedCalendar::new(vec![
        Step::events(vec![event_in("dentist", Duration::hours(1))]),
        Step::failure("backend unavailable"),
        Step::events(Vec::new()),
    ]));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());

    let good = handle.refresh_now().await.unwrap();
    assert!(good.has_next_event());

    let after_failure = handle.refresh_now().await.unwrap();
    assert_eq!(after_failure, good);

    // The next successful refresh is authoritative again
    let recovered = handle.refresh_now().await.unwrap();
    assert!(recovered.next_event.is_none());
    assert_eq!(recovered.sequence, 3);
}

#[tokio::test]
async fn test_fetch_failure_clears_when_not_retaining() {
    let calendar = Arc::new(ScriptedCalendar::new(vec![
        Step::events(vec![event_in("dentist", Duration::hours(1))]),
        Step::failure("backend unavailable"),
    ]));
    let registry = registry_with(calendar).await;
    let settings = Settings {
        retain_on_fetch_failure: false,
        ..test_settings()
    };
    let handle = start("{{ true }}", &registry, &settings);

    assert!(handle.refresh_now().await.unwrap().has_next_event());
    let state = handle.refresh_now().await.unwrap();
    assert!(state.next_event.is_none());
    assert_eq!(state.sequence, 2);
}

#[tokio::test]
async fn test_missing_upstream_clears_next_event() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("dentist", Duration::hours(1))],
    ));
    let registry = registry_with(calendar).await;
    let handle = start("{{ true }}", &registry, &test_settings());
    assert!(handle.refresh_now().await.unwrap().has_next_event());

    registry.remove(UPSTREAM).await;
    assert!(handle.refresh_now().await.unwrap().next_event.is_none());

    registry.register_other(UPSTREAM, "sensor").await;
    let now = now_in(&chrono_tz::UTC);
    assert!(handle.filtered_events(now, now + Duration::days(1)).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_upstream_timeout_is_not_fatal() {
    let registry = registry_with(Arc::new(SilentCalendar)).await;
    let settings = Settings {
        fetch_timeout_secs: 2,
        ..test_settings()
    };
    let handle = start("{{ true }}", &registry, &settings);

    let state = handle.refresh_now().await.unwrap();
    assert!(state.next_event.is_none());
    assert_eq!(state.sequence, 0);

    let now = now_in(&chrono_tz::UTC);
    assert!(handle.filtered_events(now, now + Duration::days(1)).await.is_empty());
}

#[tokio::test]
async fn test_bad_template_excludes_events_without_failing() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("dentist", Duration::hours(1))],
    ));
    let registry = registry_with(calendar).await;

    let broken = start("{{ event.summary ", &registry, &test_settings());
    let state = broken.refresh_now().await.unwrap();
    assert!(state.next_event.is_none());
    assert_eq!(state.sequence, 1);

    let undefined = start("{{ event.organizer }}", &registry, &test_settings());
    assert!(undefined.refresh_now().await.unwrap().next_event.is_none());
}

#[tokio::test]
async fn test_refresh_on_start() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![event_in("dentist", Duration::hours(1))],
    ));
    let registry = registry_with(calendar).await;
    let settings = Settings {
        refresh_on_start: true,
        ..test_settings()
    };
    let handle = start("{{ true }}", &registry, &settings);
    let mut state_rx = handle.subscribe();

    tokio::time::timeout(StdDuration::from_secs(5), state_rx.wait_for(|s| s.has_next_event()))
        .await
        .expect("initial refresh did not publish")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_subscription() {
    let registry = registry_with(Arc::new(InMemoryCalendar::new(chrono_tz::UTC, Vec::new()))).await;
    let handle = start("{{ true }}", &registry, &test_settings());
    assert_eq!(registry.bus().listener_count(), 1);

    handle.shutdown().await.unwrap();
    let mut state_rx = handle.subscribe();
    // The actor drops its state sender on exit
    tokio::time::timeout(StdDuration::from_secs(5), async {
        while state_rx.changed().await.is_ok() {}
    })
    .await
    .expect("actor did not stop");
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    assert_eq!(registry.bus().listener_count(), 0);
    assert!(handle.refresh().is_err());
    assert!(handle.refresh_now().await.is_err());
}

#[tokio::test]
async fn test_filtered_calendar_can_be_filtered_again() {
    let calendar = Arc::new(InMemoryCalendar::new(
        chrono_tz::UTC,
        vec![
            event_in("work: standup", Duration::hours(1)),
            event_in("home: dinner", Duration::hours(2)),
            event_in("work: 1:1 review", Duration::hours(3)),
        ],
    ));
    let registry = registry_with(calendar).await;
    let settings = test_settings();

    let work = FilteredCalendarHandle::start(
        FilterConfig::from_options(&FilterOptions::new(
            "Work",
            UPSTREAM,
            "{{ event.summary is startingwith('work') }}",
        ))
        .unwrap(),
        &registry,
        &settings,
    )
    .unwrap();
    registry
        .register_calendar(work.entity_id().to_string(), Arc::new(work.clone()))
        .await;

    let reviews = FilteredCalendarHandle::start(
        FilterConfig::from_options(&FilterOptions::new(
            "Reviews",
            "calendar.work",
            "{{ 'review' in event.summary }}",
        ))
        .unwrap(),
        &registry,
        &settings,
    )
    .unwrap();

    let state = reviews.refresh_now().await.unwrap();
    assert_eq!(state.next_event.unwrap().summary, "work: 1:1 review");
}
