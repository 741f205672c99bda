use crate::components::calendar::CalendarEvent;
use crate::error::{config_error, env_error, FilterResult};
use crate::utils::time::parse_timezone;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/calendar_filter.toml";

/// Look-ahead used when selecting the next event
pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;

/// Longest accepted look-ahead, one leap year
pub const MAX_LOOKAHEAD_HOURS: i64 = 24 * 366;

/// Upper bound on a single upstream fetch
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// How often the host re-announces its static calendars
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Runtime settings shared by every filtered calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// IANA zone used to compute "now" and to place all-day events
    pub timezone: String,
    pub lookahead_hours: i64,
    pub fetch_timeout_secs: u64,
    /// Run a refresh as soon as a filtered calendar starts
    pub refresh_on_start: bool,
    /// Keep the last good next event when the upstream fetch fails
    pub retain_on_fetch_failure: bool,
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: String::from("UTC"),
            lookahead_hours: DEFAULT_LOOKAHEAD_HOURS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            refresh_on_start: true,
            retain_on_fetch_failure: true,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Settings {
    pub fn tz(&self) -> FilterResult<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.lookahead_hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject settings no filtered calendar could run with
    pub fn validate(&self) -> FilterResult<()> {
        self.tz()?;
        if self.lookahead_hours <= 0 {
            return Err(config_error("lookahead_hours must be positive"));
        }
        if self.lookahead_hours > MAX_LOOKAHEAD_HOURS {
            return Err(config_error(&format!(
                "lookahead_hours must be at most {}",
                MAX_LOOKAHEAD_HOURS
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(config_error("fetch_timeout_secs must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(config_error("poll_interval_secs must be positive"));
        }
        Ok(())
    }

    /// Override fields from `TIMEZONE`, `LOOKAHEAD_HOURS` and `FETCH_TIMEOUT_SECS`
    pub fn apply_env(&mut self) -> FilterResult<()> {
        if let Ok(timezone) = env::var("TIMEZONE") {
            self.timezone = timezone;
        }
        if let Ok(hours) = env::var("LOOKAHEAD_HOURS") {
            self.lookahead_hours = hours
                .parse::<i64>()
                .map_err(|_| env_error("Invalid LOOKAHEAD_HOURS format"))?;
        }
        if let Ok(secs) = env::var("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = secs
                .parse::<u64>()
                .map_err(|_| env_error("Invalid FETCH_TIMEOUT_SECS format"))?;
        }
        Ok(())
    }
}

/// The user-editable record behind one filtered calendar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub name: String,
    /// Entity id of the calendar to filter
    #[serde(default)]
    pub calendar_entity: String,
    #[serde(default)]
    pub template: String,
}

impl FilterOptions {
    pub fn new(
        name: impl Into<String>,
        calendar_entity: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            calendar_entity: calendar_entity.into(),
            template: template.into(),
        }
    }
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A persisted, updatable configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default = "new_entry_id")]
    pub entry_id: String,
    pub options: FilterOptions,
}

impl ConfigEntry {
    pub fn new(options: FilterOptions) -> Self {
        Self {
            entry_id: new_entry_id(),
            options,
        }
    }

    /// Entry title, taken from the configured name
    pub fn title(&self) -> &str {
        &self.options.name
    }

    /// Same entry with replaced options
    pub fn with_options(&self, options: FilterOptions) -> Self {
        Self {
            entry_id: self.entry_id.clone(),
            options,
        }
    }
}

/// A calendar served from the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticCalendarConfig {
    pub entity_id: String,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub calendars: Vec<StaticCalendarConfig>,
    /// Filters declared directly in the file
    #[serde(default)]
    pub filters: Vec<FilterOptions>,
    /// Filters backed by configuration entries
    #[serde(default)]
    pub entries: Vec<ConfigEntry>,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> FilterResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let path = env::var("CALENDAR_FILTER_CONFIG")
            .unwrap_or_else(|_| String::from(DEFAULT_CONFIG_PATH));

        let mut config = if Path::new(&path).exists() {
            info!("Loading configuration from {}", path);
            Self::from_file(&path)?
        } else {
            warn!("Configuration file {} not found, using defaults", path);
            Self::default()
        };

        config.settings.apply_env()?;
        config.settings.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> FilterResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> FilterResult<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
