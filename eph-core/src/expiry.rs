//! Expiry dates and the clock they are compared against.

use std::fmt;
use std::sync::RwLock;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

/// Calendar-day format used on the wire and in stack outputs.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d";

/// A calendar date after which a workspace may be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpiryDate(NaiveDate);

impl ExpiryDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn parse(value: &str) -> Result<Self> {
        NaiveDate::parse_from_str(value.trim(), EXPIRY_FORMAT)
            .map(Self)
            .map_err(|e| WorkspaceError::InvalidSpec(format!("invalid expiry '{value}': {e}")))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// A workspace expires at the start of its expiry day.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        today >= self.0
    }
}

impl fmt::Display for ExpiryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(EXPIRY_FORMAT))
    }
}

impl TryFrom<String> for ExpiryDate {
    type Error = WorkspaceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ExpiryDate> for String {
    fn from(date: ExpiryDate) -> Self {
        date.to_string()
    }
}

/// How create-time expiry dates are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    /// Lifetime given to workspaces that do not ask for one.
    pub default_days: u32,
    /// Furthest date a caller may ask for; later requests are clamped.
    pub max_days: u32,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            default_days: 1,
            max_days: 90,
        }
    }
}

impl ExpiryPolicy {
    pub fn resolve(&self, requested: Option<ExpiryDate>, today: NaiveDate) -> ExpiryDate {
        let latest = add_days(today, self.max_days);
        match requested {
            None => ExpiryDate(add_days(today, self.default_days.max(1)).min(latest)),
            Some(date) if date.0 > latest => ExpiryDate(latest),
            Some(date) => date,
        }
    }
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}

/// Source of "today" for expiry decisions.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock(RwLock<NaiveDate>);

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self(RwLock::new(today))
    }

    pub fn set(&self, today: NaiveDate) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }
}
