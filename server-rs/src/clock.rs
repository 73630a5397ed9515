//! Wall clock injection and the date arithmetic shared by every component.
//!
//! Day counts round partial days up so the subscriber never loses access to
//! rounding. Week keys are Monday-aligned calendar dates in UTC.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const MILLIS_PER_DAY: i64 = 86_400_000;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Monday of the week containing a date. Stable bucket id for weekly data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    pub fn containing(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday() as i64;
        Self(date - Duration::days(offset))
    }

    pub fn monday(&self) -> NaiveDate {
        self.0
    }

    pub fn sunday(&self) -> NaiveDate {
        self.0 + Duration::days(6)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Duration::days(7))
    }

    pub fn previous(&self) -> Self {
        Self(self.0 - Duration::days(7))
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| AppError::BadRequest(format!("Invalid week key '{s}': {e}")))?;
        if date.weekday().num_days_from_monday() != 0 {
            return Err(AppError::BadRequest(format!(
                "Week key '{s}' is not a Monday"
            )));
        }
        Ok(Self(date))
    }
}

impl TryFrom<String> for WeekKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekKey> for String {
    fn from(key: WeekKey) -> Self {
        key.to_string()
    }
}

pub fn current_week_key(clock: &dyn Clock) -> WeekKey {
    WeekKey::containing(clock.today())
}

/// Human label such as `Oct 19 - Oct 25, 2026`.
pub fn week_label(key: WeekKey) -> String {
    let (start, end) = (key.monday(), key.sunday());
    if start.year() == end.year() {
        format!(
            "{} - {}, {}",
            start.format("%b %-d"),
            end.format("%b %-d"),
            end.year()
        )
    } else {
        format!("{} - {}", start.format("%b %-d, %Y"), end.format("%b %-d, %Y"))
    }
}

/// Whole days from `a` to `b`, any partial day counted as a full one.
/// Negative when `b` precedes `a`.
pub fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    let millis = (b - a).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

pub fn add_days(at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    at + Duration::days(days)
}

/// Calendar-month addition; the day clamps to the end of shorter months.
pub fn add_months(at: DateTime<Utc>, months: u32) -> AppResult<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| AppError::Internal(format!("Date overflow adding {months} months")))
}

/// Consecutive-day run ending today, or yesterday when today has no entry yet.
pub fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut sorted: Vec<NaiveDate> = days.iter().copied().filter(|d| *d <= today).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut expected = match sorted.last() {
        Some(last) if *last == today => today,
        Some(last) if *last == today - Duration::days(1) => *last,
        _ => return 0,
    };

    let mut streak = 0;
    for day in sorted.iter().rev() {
        if *day != expected {
            break;
        }
        streak += 1;
        expected -= Duration::days(1);
    }
    streak
}
