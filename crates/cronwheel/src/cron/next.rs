//! Field-ascending next-fire-time search.
//!
//! The search walks calendar components from seconds upward, snapping each
//! one to the smallest allowed value and carrying into the next component
//! when a field's set has nothing left. Day handling enforces the
//! `L` / `W` / `#` specials; candidates are resolved against the
//! expression's time zone last, so spring-forward gaps are skipped and
//! fall-back overlaps resolve to their earliest occurrence.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use super::{CronExpression, MAX_YEAR};

/// Civil (zone-less) calendar components. Out-of-range values appear
/// transiently while carrying: hour 24, day 32, month 13. The field sets
/// contain no such member, so the next lookup turns each one into a carry.
#[derive(Debug, Clone, Copy)]
struct Civil {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl Civil {
    fn from_naive(t: NaiveDateTime) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
        }
    }

    fn to_naive(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, self.second)
    }

    fn reset_time(&mut self, expr: &CronExpression) {
        self.hour = u32::from(expr.hours.first());
        self.minute = u32::from(expr.minutes.first());
        self.second = u32::from(expr.seconds.first());
    }
}

enum DayHit {
    /// A matching day at or after the cursor, within the current month.
    On(u32),
    /// No matching day left this month.
    NextMonth,
}

pub(super) fn next_valid_after(
    expr: &CronExpression,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let tz = expr.time_zone();
    // Smallest whole second strictly after `after`, in the cron's zone.
    let local = after.with_timezone(&tz).naive_local();
    let start = local.with_nanosecond(0)? + Duration::seconds(1);
    let mut t = Civil::from_naive(start);

    loop {
        if t.year > MAX_YEAR {
            return None;
        }

        // Seconds.
        match expr.seconds.next(t.second as u16) {
            Some(s) => t.second = u32::from(s),
            None => {
                t.second = u32::from(expr.seconds.first());
                t.minute += 1;
            }
        }

        // Minutes.
        match expr.minutes.next(t.minute as u16) {
            Some(m) if u32::from(m) == t.minute => {}
            Some(m) => {
                t.minute = u32::from(m);
                t.second = u32::from(expr.seconds.first());
            }
            None => {
                t.minute = u32::from(expr.minutes.first());
                t.second = u32::from(expr.seconds.first());
                t.hour += 1;
            }
        }

        // Hours.
        match expr.hours.next(t.hour as u16) {
            Some(h) if u32::from(h) == t.hour => {}
            Some(h) => {
                t.hour = u32::from(h);
                t.minute = u32::from(expr.minutes.first());
                t.second = u32::from(expr.seconds.first());
            }
            None => {
                t.reset_time(expr);
                t.day += 1;
            }
        }

        // Months — must hold before day arithmetic can run.
        match expr.months.next(t.month as u16) {
            Some(m) if u32::from(m) == t.month => {}
            Some(m) => {
                t.month = u32::from(m);
                t.day = 1;
                t.reset_time(expr);
                continue;
            }
            None => {
                t.year += 1;
                t.month = u32::from(expr.months.first());
                t.day = 1;
                t.reset_time(expr);
                continue;
            }
        }

        // Years.
        match expr.years.next(t.year.max(0) as u16) {
            Some(y) if i32::from(y) == t.year => {}
            Some(y) => {
                t.year = i32::from(y);
                t.month = u32::from(expr.months.first());
                t.day = 1;
                t.reset_time(expr);
                continue;
            }
            None => return None,
        }

        // Day of month / day of week, including the specials.
        match next_day(expr, t.year, t.month, t.day) {
            Some(DayHit::On(d)) if d == t.day => {}
            Some(DayHit::On(d)) => {
                t.day = d;
                t.reset_time(expr);
            }
            Some(DayHit::NextMonth) | None => {
                t.month += 1;
                t.day = 1;
                t.reset_time(expr);
                continue;
            }
        }

        // Every component agrees; resolve the civil candidate in the zone.
        let naive = match t.to_naive() {
            Some(n) => n,
            None => return None,
        };
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => {
                let utc = dt.with_timezone(&Utc);
                if utc > after {
                    return Some(utc);
                }
                t = Civil::from_naive(naive + Duration::seconds(1));
            }
            LocalResult::Ambiguous(first, second) => {
                let first = first.with_timezone(&Utc);
                if first > after {
                    return Some(first);
                }
                let second = second.with_timezone(&Utc);
                if second > after {
                    return Some(second);
                }
                t = Civil::from_naive(naive + Duration::seconds(1));
            }
            // The candidate falls in a spring-forward gap; resume just past it.
            LocalResult::None => {
                t = Civil::from_naive(naive + Duration::seconds(1));
            }
        }
    }
}

/// Find the next day >= `from` in (`year`, `month`) that satisfies the
/// day-of-month or day-of-week constraint. Exactly one of the two is
/// specified (the parser guarantees it).
fn next_day(expr: &CronExpression, year: i32, month: u32, from: u32) -> Option<DayHit> {
    let last = days_in_month(year, month);

    if expr.day_of_week_unspecified {
        // Day-of-month rules.
        if expr.last_day_of_month {
            let offset = u32::from(expr.last_day_offset);
            if offset >= last {
                return Some(DayHit::NextMonth);
            }
            let mut target = last - offset;
            if expr.nearest_weekday {
                target = nearest_weekday_in_month(year, month, target, last)?;
            }
            return Some(hit_if_reachable(target, from));
        }
        if expr.nearest_weekday {
            let pivot = u32::from(expr.days_of_month.first()).min(last);
            let target = nearest_weekday_in_month(year, month, pivot, last)?;
            return Some(hit_if_reachable(target, from));
        }
        return Some(
            match expr
                .days_of_month
                .next(from as u16)
                .map(u32::from)
                .filter(|&d| d <= last)
            {
                Some(d) => DayHit::On(d),
                None => DayHit::NextMonth,
            },
        );
    }

    // Day-of-week rules.
    if expr.last_day_of_week {
        let w = u32::from(expr.days_of_week.first());
        let last_weekday = weekday1(year, month, last)?;
        let target = last - (last_weekday + 7 - w) % 7;
        return Some(hit_if_reachable(target, from));
    }
    if expr.nth_day_of_week > 0 {
        let w = u32::from(expr.days_of_week.first());
        let first_weekday = weekday1(year, month, 1)?;
        let first_occurrence = 1 + (w + 7 - first_weekday) % 7;
        let target = first_occurrence + 7 * (u32::from(expr.nth_day_of_week) - 1);
        if target > last {
            return Some(DayHit::NextMonth);
        }
        return Some(hit_if_reachable(target, from));
    }
    let mut d = from;
    while d <= last {
        let w = weekday1(year, month, d)?;
        if expr.days_of_week.contains(w as u16) {
            return Some(DayHit::On(d));
        }
        d += 1;
    }
    Some(DayHit::NextMonth)
}

fn hit_if_reachable(target: u32, from: u32) -> DayHit {
    if target >= from {
        DayHit::On(target)
    } else {
        DayHit::NextMonth
    }
}

/// The weekday (Mon-Fri) nearest to `day`, never leaving the month:
/// a Saturday snaps back to Friday (forward to Monday when `day` is the
/// 1st), a Sunday snaps forward to Monday (back to Friday when `day` is
/// the last day of the month).
fn nearest_weekday_in_month(year: i32, month: u32, day: u32, last: u32) -> Option<u32> {
    match weekday1(year, month, day)? {
        7 if day == 1 => Some(day + 2),
        7 => Some(day - 1),
        1 if day == last => Some(day - 2),
        1 => Some(day + 1),
        _ => Some(day),
    }
}

/// Weekday of a civil date, 1 = Sunday .. 7 = Saturday.
fn weekday1(year: i32, month: u32, day: u32) -> Option<u32> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.weekday().num_days_from_sunday() + 1)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    const DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS.get(month as usize - 1).copied().unwrap_or(31)
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}
