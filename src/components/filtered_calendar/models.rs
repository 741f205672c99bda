use crate::components::calendar::CalendarEvent;
use crate::config::{ConfigEntry, FilterOptions};
use crate::error::{config_error, FilterResult};
use crate::utils::time::format_attribute_time;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Validated configuration of one filtered calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub name: String,
    pub template: String,
    /// Entity id of the calendar being filtered
    pub calendar_entity: String,
    /// Stable identity, set when the filter comes from a configuration entry
    pub unique_id: Option<String>,
}

impl FilterConfig {
    /// Build from static options. Every field must be non-empty.
    pub fn from_options(options: &FilterOptions) -> FilterResult<Self> {
        let name = options.name.trim();
        let template = options.template.trim();
        let calendar_entity = options.calendar_entity.trim();

        let missing: Vec<&str> = [
            ("name", name),
            ("template", template),
            ("calendar_entity", calendar_entity),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();

        if !missing.is_empty() {
            return Err(config_error(&format!(
                "Missing required configuration items: {}",
                missing.join(", ")
            )));
        }

        let config = Self {
            name: name.to_string(),
            template: template.to_string(),
            calendar_entity: calendar_entity.to_string(),
            unique_id: None,
        };

        if config.entity_id() == config.calendar_entity {
            return Err(config_error(&format!(
                "{} cannot filter itself",
                config.calendar_entity
            )));
        }

        Ok(config)
    }

    /// Build from a configuration entry, keyed by the entry id
    pub fn from_entry(entry: &ConfigEntry) -> FilterResult<Self> {
        let mut config = Self::from_options(&entry.options)?;
        config.unique_id = Some(entry.entry_id.clone());
        Ok(config)
    }

    /// Entity id this filter is published under, e.g. `calendar.work_only`
    pub fn entity_id(&self) -> String {
        format!("calendar.{}", slug::slugify(&self.name).replace('-', "_"))
    }
}

/// Externally observable on/off state of a calendar entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    On,
    Off,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::On => write!(f, "on"),
            EntityState::Off => write!(f, "off"),
        }
    }
}

/// Published state of a filtered calendar
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilteredCalendarState {
    /// Earliest passing event in the look-ahead window
    pub next_event: Option<CalendarEvent>,
    /// Sequence number of the refresh that produced this state, 0 before the first one
    pub sequence: u64,
}

impl FilteredCalendarState {
    pub fn has_next_event(&self) -> bool {
        self.next_event.is_some()
    }

    /// `on` while the next event is in progress
    pub fn state_at(&self, now: &DateTime<Tz>) -> EntityState {
        match &self.next_event {
            Some(event) if event.is_in_progress(now) => EntityState::On,
            _ => EntityState::Off,
        }
    }

    /// Attributes published alongside the state
    pub fn attributes(&self, tz: &Tz) -> Map<String, Value> {
        let mut attributes = Map::new();
        let Some(event) = &self.next_event else {
            return attributes;
        };

        let text = |value: &Option<String>| Value::String(value.clone().unwrap_or_default());
        attributes.insert("message".to_string(), Value::String(event.summary.clone()));
        attributes.insert("all_day".to_string(), Value::Bool(event.is_all_day()));
        attributes.insert(
            "start_time".to_string(),
            Value::String(format_attribute_time(&event.start_datetime(tz))),
        );
        attributes.insert(
            "end_time".to_string(),
            Value::String(format_attribute_time(&event.end_datetime(tz))),
        );
        attributes.insert("location".to_string(), text(&event.location));
        attributes.insert("description".to_string(), text(&event.description));
        attributes
    }
}
