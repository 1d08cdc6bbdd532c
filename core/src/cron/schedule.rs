//! Schedule grammar.
//!
//! ```text
//! @minutely | @hourly | @daily | @weekly      (leading @ optional)
//! every <duration> | @every <duration>
//! ```
//!
//! `<duration>` is compound: `90s`, `5m`, `2h30m`, `2 hours 30 minutes`,
//! `1 day`. A bare unit (`every hour`) means one of it. Matching is
//! case-insensitive and every accepted schedule is at least 30 seconds.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Shortest interval a schedule may describe.
pub const MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Longest interval a schedule may describe; keeps due arithmetic within
/// `chrono::TimeDelta` range.
pub const MAX_INTERVAL: Duration = Duration::from_secs(i64::MAX as u64 / 1000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("empty schedule")]
    Empty,
    #[error("unrecognized schedule '{0}' (expected @hourly, @daily, @weekly, @minutely or 'every <duration>')")]
    Unrecognized(String),
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },
    #[error("schedule '{input}' is every {secs}s; the minimum is {min}s", min = MIN_INTERVAL.as_secs())]
    TooShort { input: String, secs: u64 },
    #[error("schedule '{input}' is every {secs}s; the maximum is {max}s", max = MAX_INTERVAL.as_secs())]
    TooLong { input: String, secs: u64 },
}

/// A parsed schedule: a fixed repeat interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    interval: Duration,
}

impl CronSchedule {
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let interval = match preset(&normalized) {
            Some(d) => d,
            None => {
                let rest = normalized
                    .strip_prefix("@every")
                    .or_else(|| normalized.strip_prefix("every"))
                    .filter(|r| r.starts_with(char::is_whitespace))
                    .ok_or_else(|| ScheduleError::Unrecognized(input.trim().to_string()))?;
                parse_compound(rest.trim(), input)?
            }
        };

        if interval < MIN_INTERVAL {
            return Err(ScheduleError::TooShort {
                input: input.trim().to_string(),
                secs: interval.as_secs(),
            });
        }
        if interval > MAX_INTERVAL {
            return Err(ScheduleError::TooLong {
                input: input.trim().to_string(),
                secs: interval.as_secs(),
            });
        }
        Ok(CronSchedule { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Interval in whole seconds, the unit due-checks compare in.
    pub fn interval_secs(&self) -> u64 {
        self.interval.as_secs()
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {}", humantime::format_duration(self.interval))
    }
}

fn preset(s: &str) -> Option<Duration> {
    let secs = match s.strip_prefix('@').unwrap_or(s) {
        "minutely" => 60,
        "hourly" => 3_600,
        "daily" => 86_400,
        "weekly" => 604_800,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Glue each number to the unit that follows it so `2 hours 30 minutes`
/// reads as `2hours 30minutes`, then hand the result to humantime.
fn parse_compound(text: &str, original: &str) -> Result<Duration, ScheduleError> {
    let cleaned = text.replace(',', " ");
    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| *t != "and")
        .collect();
    if tokens.is_empty() {
        return Err(ScheduleError::InvalidDuration {
            input: original.trim().to_string(),
            reason: "missing duration".into(),
        });
    }

    let mut parts: Vec<String> = Vec::new();
    let mut pending_number: Option<&str> = None;
    for token in tokens {
        let numeric = token.chars().all(|c| c.is_ascii_digit());
        match (pending_number.take(), numeric) {
            (Some(n), false) => parts.push(format!("{}{}", n, token)),
            (Some(n), true) => {
                parts.push(n.to_string());
                pending_number = Some(token);
            }
            (None, true) => pending_number = Some(token),
            (None, false) if token.starts_with(|c: char| c.is_ascii_digit()) => {
                parts.push(token.to_string())
            }
            (None, false) => parts.push(format!("1{}", token)),
        }
    }
    if let Some(n) = pending_number {
        parts.push(n.to_string());
    }

    humantime::parse_duration(&parts.join(" ")).map_err(|e| ScheduleError::InvalidDuration {
        input: original.trim().to_string(),
        reason: e.to_string(),
    })
}
