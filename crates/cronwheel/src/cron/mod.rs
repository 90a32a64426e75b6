//! Cron expression parsing and next-fire-time calculation.
//!
//! The grammar is the seven-field calendar form:
//! `seconds minutes hours day-of-month month day-of-week [year]`, with the
//! usual `* , - /` tokens plus `?` (no specific value), `L` (last), `W`
//! (nearest weekday) and `#` (n-th weekday of the month). Month and weekday
//! fields also accept three-letter names (`JAN`..`DEC`, `SUN`..`SAT`);
//! weekdays are numbered 1 = Sunday through 7 = Saturday.
//!
//! Calendar arithmetic runs in the expression's time zone (UTC unless set
//! with [`CronExpression::with_time_zone`]). Local instants that do not
//! exist (spring-forward gaps) are skipped; ambiguous instants (fall-back
//! overlaps) resolve to their earliest occurrence.

mod next;
mod parse;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ParseError;

/// Scheduling gives up past this year; expressions that yield nothing
/// earlier report no next fire time.
pub const MAX_YEAR: i32 = 2199;
/// Lower bound of the optional year field.
pub const MIN_YEAR: i32 = 1970;

/// One parsed cron field: an ordered set of allowed values.
///
/// Lookup is tail-set style: `next(v)` answers "smallest allowed value ≥ v",
/// `first()` answers "smallest allowed value". Sets are never empty once
/// parsing succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldSet {
    values: BTreeSet<u16>,
    from_wildcard: bool,
}

impl FieldSet {
    pub(crate) fn new(values: BTreeSet<u16>) -> Self {
        Self {
            values,
            from_wildcard: false,
        }
    }

    pub(crate) fn wildcard(lo: u16, hi: u16) -> Self {
        Self {
            values: (lo..=hi).collect(),
            from_wildcard: true,
        }
    }

    pub(crate) fn next(&self, v: u16) -> Option<u16> {
        self.values.range(v..).next().copied()
    }

    pub(crate) fn first(&self) -> u16 {
        self.values.iter().next().copied().unwrap_or(0)
    }

    pub(crate) fn contains(&self, v: u16) -> bool {
        self.values.contains(&v)
    }

    fn render(&self) -> String {
        if self.from_wildcard {
            "*".to_string()
        } else {
            let mut out = String::new();
            for (i, v) in self.values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&v.to_string());
            }
            out
        }
    }
}

/// A parsed cron expression: a calendar predicate over instants.
///
/// Obtained with [`CronExpression::parse`] (or [`str::parse`]); answers
/// "smallest matching instant strictly after t" via
/// [`next_valid_after`](CronExpression::next_valid_after).
#[derive(Debug, Clone)]
pub struct CronExpression {
    pub(crate) expression: String,
    pub(crate) seconds: FieldSet,
    pub(crate) minutes: FieldSet,
    pub(crate) hours: FieldSet,
    pub(crate) days_of_month: FieldSet,
    pub(crate) months: FieldSet,
    pub(crate) days_of_week: FieldSet,
    pub(crate) years: FieldSet,
    /// Day-of-month field was `?`.
    pub(crate) day_of_month_unspecified: bool,
    /// Day-of-week field was `?`.
    pub(crate) day_of_week_unspecified: bool,
    /// Day-of-month used `L` (optionally `L-n` / `LW`).
    pub(crate) last_day_of_month: bool,
    /// Days before the last day of the month (`L-n`).
    pub(crate) last_day_offset: u8,
    /// Day-of-month used `W` (or `LW`).
    pub(crate) nearest_weekday: bool,
    /// Day-of-week used `L` (last occurrence of that weekday).
    pub(crate) last_day_of_week: bool,
    /// Day-of-week used `#n`; 0 when unset.
    pub(crate) nth_day_of_week: u8,
    time_zone: Tz,
}

impl CronExpression {
    /// Parse a cron string. The time zone defaults to UTC; override with
    /// [`with_time_zone`](Self::with_time_zone).
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        parse::parse(expression)
    }

    /// Evaluate calendar arithmetic in `tz` instead of UTC.
    pub fn with_time_zone(mut self, tz: Tz) -> Self {
        self.time_zone = tz;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// The original expression string, as given to [`parse`](Self::parse).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Smallest instant strictly after `after` that satisfies every field,
    /// or `None` when the expression yields nothing before the end of
    /// [`MAX_YEAR`].
    pub fn next_valid_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next::next_valid_after(self, after)
    }

    /// Largest matching instant strictly before `t`.
    ///
    /// Not supported; always returns `None`.
    pub fn time_before(&self, _t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }

    /// Whether `t` (truncated to whole seconds) is itself a matching instant.
    pub fn is_satisfied_by(&self, t: DateTime<Utc>) -> bool {
        let Some(t) = t.with_nanosecond(0) else {
            return false;
        };
        self.next_valid_after(t - Duration::seconds(1)) == Some(t)
    }

    /// Human-readable dump of the parsed field sets.
    pub fn summary(&self) -> String {
        let dom = if self.day_of_month_unspecified {
            "?".to_string()
        } else if self.last_day_of_month {
            let mut s = "L".to_string();
            if self.last_day_offset > 0 {
                s.push_str(&format!("-{}", self.last_day_offset));
            }
            if self.nearest_weekday {
                s.push('W');
            }
            s
        } else if self.nearest_weekday {
            format!("{}W", self.days_of_month.first())
        } else {
            self.days_of_month.render()
        };
        let dow = if self.day_of_week_unspecified {
            "?".to_string()
        } else if self.last_day_of_week {
            format!("{}L", self.days_of_week.first())
        } else if self.nth_day_of_week > 0 {
            format!("{}#{}", self.days_of_week.first(), self.nth_day_of_week)
        } else {
            self.days_of_week.render()
        };
        format!(
            "seconds: {}\nminutes: {}\nhours: {}\ndays of month: {}\nmonths: {}\ndays of week: {}\nyears: {}\ntime zone: {}\n",
            self.seconds.render(),
            self.minutes.render(),
            self.hours.render(),
            dom,
            self.months.render(),
            dow,
            self.years.render(),
            self.time_zone,
        )
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression && self.time_zone == other.time_zone
    }
}

pub(crate) fn default_time_zone() -> Tz {
    Tz::UTC
}
