use super::predicate::{evaluate, Expression};
use crate::components::calendar::CalendarEvent;
use tracing::error;

/// Keep the events the expression accepts, in their original order.
///
/// Evaluation errors reject only the event that caused them.
pub fn filter_events(events: Vec<CalendarEvent>, expression: &dyn Expression) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|event| passes(expression, event))
        .collect()
}

/// Whether a single event passes, logging evaluation errors
pub fn passes(expression: &dyn Expression, event: &CalendarEvent) -> bool {
    match evaluate(expression, event) {
        Ok(pass) => pass,
        Err(e) => {
            error!(
                summary = %event.summary,
                start = %event.start.to_iso(),
                template = %expression.source(),
                error = %e,
                "Error rendering template for event in filter"
            );
            false
        }
    }
}
