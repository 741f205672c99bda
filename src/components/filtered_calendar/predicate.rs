//! Per-event predicate evaluation.
//!
//! A predicate is a template rendered with the event's field map bound as
//! `event`. The event passes only when the rendered text equals `true`,
//! ignoring case and surrounding whitespace. Anything else, including
//! `True`-ish values like `1` or `yes`, does not pass.

use crate::components::calendar::CalendarEvent;
use crate::error::{Error, FilterResult};
use crate::utils::time::now_in;
use chrono_tz::Tz;
use minijinja::{context, Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::warn;

const TEMPLATE_NAME: &str = "predicate";

/// A compiled expression evaluated against one event at a time
pub trait Expression: Send + Sync {
    /// Source text as configured
    fn source(&self) -> &str;

    /// Render with `event` bound to the given field map
    fn render(&self, event: &Map<String, Value>) -> FilterResult<String>;
}

/// Coerce rendered template output to a pass/fail decision
pub fn is_truthy_output(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("true")
}

/// Evaluate `expression` for a single event
pub fn evaluate(expression: &dyn Expression, event: &CalendarEvent) -> FilterResult<bool> {
    let rendered = expression.render(&event.as_dict())?;
    Ok(is_truthy_output(&rendered))
}

/// Jinja-syntax expression.
///
/// Undefined lookups are errors, so `{{ event.no_such_field }}` fails the
/// event instead of rendering as empty. `now()` returns the current time in
/// the configured zone as ISO-8601 text.
pub struct JinjaExpression {
    source: String,
    env: Environment<'static>,
    compile_error: Option<String>,
}

impl JinjaExpression {
    pub fn new(source: impl Into<String>, tz: Tz) -> Self {
        let source = source.into();
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_function("now", move || -> String { now_in(&tz).to_rfc3339() });

        let compile_error = env
            .add_template_owned(TEMPLATE_NAME, source.clone())
            .err()
            .map(|err| err.to_string());
        if let Some(err) = &compile_error {
            warn!(template = %source, error = %err, "Filter template does not compile");
        }

        Self {
            source,
            env,
            compile_error,
        }
    }

    /// Whether the template parsed
    pub fn is_valid(&self) -> bool {
        self.compile_error.is_none()
    }
}

impl Expression for JinjaExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn render(&self, event: &Map<String, Value>) -> FilterResult<String> {
        if let Some(err) = &self.compile_error {
            return Err(Error::Predicate(err.clone()));
        }
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(context! { event => event })?)
    }
}
