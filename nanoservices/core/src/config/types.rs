use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::planner::polling::DEFAULT_REFRESH_INTERVAL;
use crate::planner::{IntervalPlanner, Planner, PollingPlanner, DEFAULT_THREADS};

/// Top-level relay configuration: planner settings plus named links.
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub links: HashMap<String, LinkSettings>,
}

/// Settings for one link. Unset fields keep the builder defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSettings {
    pub interval: DurationValue,
    pub tags: Option<StringOrVec>,
    pub copy_records: Option<bool>,
    pub ignore_exceptions: Option<bool>,
    pub inlet_concurrency: Option<usize>,
    pub immediate_transfer: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Interval,
    Polling,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub scheduler: SchedulerKind,
    pub threads: usize,
    /// Tick of the polling scheduler.
    pub refresh_interval: DurationValue,
    pub ignore_exceptions: bool,
    pub immediate_transfer: bool,
    pub shutdown_at_exit: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Interval,
            threads: DEFAULT_THREADS,
            refresh_interval: DurationValue(DEFAULT_REFRESH_INTERVAL),
            ignore_exceptions: false,
            immediate_transfer: true,
            shutdown_at_exit: false,
        }
    }
}

impl PlannerSettings {
    /// An interval planner configured by these settings. `scheduler` and
    /// `refresh_interval` are not consulted.
    pub fn build_interval(&self) -> IntervalPlanner {
        self.apply(Planner::interval(self.threads))
    }

    /// A polling planner configured by these settings. `scheduler` is not
    /// consulted.
    pub fn build_polling(&self) -> PollingPlanner {
        self.apply(Planner::polling(self.threads, self.refresh_interval.get()))
    }

    fn apply<S: crate::planner::Scheduler>(&self, planner: Planner<S>) -> Planner<S> {
        planner
            .with_ignore_exceptions(self.ignore_exceptions)
            .with_immediate_transfer(self.immediate_transfer)
            .with_shutdown_at_exit(self.shutdown_at_exit)
    }
}

/// Allows tags to be either a single string or a list of strings.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum StringOrVec {
    Single(String),
    Multiple(Vec<String>),
}

impl StringOrVec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringOrVec::Single(s) => vec![s],
            StringOrVec::Multiple(v) => v,
        }
    }
}

/// A duration written as seconds (`1.5`) or with a unit suffix
/// (`500ms`, `2s`, `5m`, `1h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDuration")]
pub struct DurationValue(pub Duration);

impl DurationValue {
    pub fn get(&self) -> Duration {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(f64),
    Text(String),
}

impl TryFrom<RawDuration> for DurationValue {
    type Error = InvalidDuration;

    fn try_from(raw: RawDuration) -> Result<Self, Self::Error> {
        match raw {
            RawDuration::Seconds(secs) => from_secs(secs, &secs.to_string()),
            RawDuration::Text(text) => parse_duration(&text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDuration(String);

impl fmt::Display for InvalidDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration `{}`", self.0)
    }
}

impl std::error::Error for InvalidDuration {}

pub fn parse_duration(text: &str) -> Result<DurationValue, InvalidDuration> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let factor = match unit.trim() {
        "ms" => 0.001,
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(InvalidDuration(text.to_string())),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| InvalidDuration(text.to_string()))?;
    from_secs(value * factor, text)
}

fn from_secs(secs: f64, text: &str) -> Result<DurationValue, InvalidDuration> {
    Duration::try_from_secs_f64(secs)
        .map(DurationValue)
        .map_err(|_| InvalidDuration(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_durations() {
        assert_eq!(parse_duration("500ms").unwrap().get(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap().get(), Duration::from_secs(2));
        assert_eq!(parse_duration("5m").unwrap().get(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap().get(), Duration::from_secs(3600));
        assert_eq!(parse_duration("0.5").unwrap().get(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
