use crate::utils::time::resolve_local;
use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Start or end of a calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    /// A timed event boundary
    DateTime(DateTime<FixedOffset>),
    /// An all-day event boundary, interpreted in the calendar's zone
    Date(NaiveDate),
}

impl EventTime {
    /// Resolve to an instant in `tz`. All-day boundaries are local midnight.
    pub fn to_datetime(&self, tz: &Tz) -> DateTime<Tz> {
        match self {
            EventTime::DateTime(dt) => dt.with_timezone(tz),
            EventTime::Date(date) => resolve_local(&date.and_time(chrono::NaiveTime::MIN), tz),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// ISO-8601 text, `YYYY-MM-DD` for all-day boundaries
    pub fn to_iso(&self) -> String {
        match self {
            EventTime::DateTime(dt) => dt.to_rfc3339(),
            EventTime::Date(date) => date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A single event as provided by an upstream calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub start: EventTime,
    pub end: EventTime,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    /// Provider specific fields, exposed to templates next to the standard ones
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    pub fn new(summary: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            start,
            end,
            summary: summary.into(),
            description: None,
            location: None,
            uid: None,
            recurrence_id: None,
            rrule: None,
            extra: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    pub fn start_datetime(&self, tz: &Tz) -> DateTime<Tz> {
        self.start.to_datetime(tz)
    }

    pub fn end_datetime(&self, tz: &Tz) -> DateTime<Tz> {
        self.end.to_datetime(tz)
    }

    /// Whether the event overlaps `[start, end)`.
    ///
    /// Zero-length events count when their instant lies inside the range.
    pub fn intersects(&self, start: &DateTime<Tz>, end: &DateTime<Tz>, tz: &Tz) -> bool {
        let event_start = self.start_datetime(tz);
        let event_end = self.end_datetime(tz);
        if event_start == event_end {
            return event_start >= *start && event_start < *end;
        }
        event_start < *end && event_end > *start
    }

    /// Whether `now` falls inside the event
    pub fn is_in_progress(&self, now: &DateTime<Tz>) -> bool {
        let tz = now.timezone();
        self.start_datetime(&tz) <= *now && *now < self.end_datetime(&tz)
    }

    /// Field map bound as `event` when rendering a predicate
    pub fn as_dict(&self) -> Map<String, Value> {
        let mut dict = self.extra.clone();
        let optional = |value: &Option<String>| {
            value.as_ref().map(|v| Value::String(v.clone())).unwrap_or(Value::Null)
        };

        dict.insert("start".to_string(), Value::String(self.start.to_iso()));
        dict.insert("end".to_string(), Value::String(self.end.to_iso()));
        dict.insert("summary".to_string(), Value::String(self.summary.clone()));
        dict.insert("description".to_string(), optional(&self.description));
        dict.insert("location".to_string(), optional(&self.location));
        dict.insert("uid".to_string(), optional(&self.uid));
        dict.insert("recurrence_id".to_string(), optional(&self.recurrence_id));
        dict.insert("rrule".to_string(), optional(&self.rrule));
        dict.insert("all_day".to_string(), Value::Bool(self.is_all_day()));
        dict
    }
}
