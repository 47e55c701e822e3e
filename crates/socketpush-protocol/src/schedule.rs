//! Scheduling fields that event payloads may carry.

use crate::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unit of a [`Frequency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyUnit {
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `w`
    Weeks,
}

impl FrequencyUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(FrequencyUnit::Seconds),
            'm' => Some(FrequencyUnit::Minutes),
            'h' => Some(FrequencyUnit::Hours),
            'd' => Some(FrequencyUnit::Days),
            'w' => Some(FrequencyUnit::Weeks),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            FrequencyUnit::Seconds => 's',
            FrequencyUnit::Minutes => 'm',
            FrequencyUnit::Hours => 'h',
            FrequencyUnit::Days => 'd',
            FrequencyUnit::Weeks => 'w',
        }
    }

    fn seconds(self) -> u64 {
        match self {
            FrequencyUnit::Seconds => 1,
            FrequencyUnit::Minutes => 60,
            FrequencyUnit::Hours => 60 * 60,
            FrequencyUnit::Days => 24 * 60 * 60,
            FrequencyUnit::Weeks => 7 * 24 * 60 * 60,
        }
    }
}

/// Repeat interval of a scheduled event, written `<count><unit>` (e.g. `15m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    count: u64,
    unit: FrequencyUnit,
}

impl Frequency {
    /// Creates a frequency.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is zero.
    pub fn new(count: u64, unit: FrequencyUnit) -> Result<Self> {
        if count == 0 {
            return Err(ProtocolError::InvalidFrequency(
                "count must be greater than zero".into(),
            ));
        }
        Ok(Self { count, unit })
    }

    /// Number of units.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The unit.
    #[must_use]
    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }

    /// Interval as a duration, saturating on overflow.
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.count.saturating_mul(self.unit.seconds()))
    }
}

impl FromStr for Frequency {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(suffix) = s.chars().last() else {
            return Err(ProtocolError::InvalidFrequency("empty".into()));
        };
        let unit = FrequencyUnit::from_suffix(suffix)
            .ok_or_else(|| ProtocolError::InvalidFrequency(format!("unknown unit in {s:?}")))?;
        let digits = &s[..s.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidFrequency(format!(
                "expected <count><s|m|h|d|w>, got {s:?}"
            )));
        }
        let count = digits
            .parse::<u64>()
            .map_err(|e| ProtocolError::InvalidFrequency(e.to_string()))?;
        Frequency::new(count, unit)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl TryFrom<String> for Frequency {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

/// Delivery schedule merged into an event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// When the first delivery should happen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    /// Repeat interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    /// When repetition stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_until: Option<String>,
}

impl Schedule {
    /// Schedule a single delivery at `at`.
    #[must_use]
    pub fn at(at: impl Into<String>) -> Self {
        Self {
            scheduled_at: Some(at.into()),
            ..Self::default()
        }
    }

    /// Repeat every `frequency`.
    #[must_use]
    pub fn every(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    /// Stop repeating at `until`.
    #[must_use]
    pub fn until(mut self, until: impl Into<String>) -> Self {
        self.repeat_until = Some(until.into());
        self
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scheduled_at.is_none() && self.frequency.is_none() && self.repeat_until.is_none()
    }

    /// Writes the schedule fields into `payload`.
    ///
    /// A `null` payload becomes an object; existing keys with the same name
    /// are overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` is neither an object nor `null`.
    pub fn apply_to(&self, payload: &mut Value) -> Result<()> {
        if payload.is_null() {
            *payload = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = payload else {
            return Err(ProtocolError::Malformed(
                "scheduled payloads must be JSON objects".into(),
            ));
        };
        if let Value::Object(fields) = serde_json::to_value(self)? {
            map.extend(fields);
        }
        Ok(())
    }
}
