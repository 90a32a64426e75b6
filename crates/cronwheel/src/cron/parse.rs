//! Grammar for the seven-field cron form.

use std::collections::BTreeSet;

use super::{default_time_zone, CronExpression, FieldSet, MAX_YEAR, MIN_YEAR};
use crate::error::{CronField, ParseError};

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

pub(super) fn parse(expression: &str) -> Result<CronExpression, ParseError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 6 && fields.len() != 7 {
        return Err(ParseError {
            expression: expression.to_string(),
            field: CronField::Expression,
            token: String::new(),
            reason: format!("expected 6 or 7 fields, found {}", fields.len()),
        });
    }

    let seconds = numeric_field(expression, CronField::Seconds, fields[0], 0, 59, None)?;
    let minutes = numeric_field(expression, CronField::Minutes, fields[1], 0, 59, None)?;
    let hours = numeric_field(expression, CronField::Hours, fields[2], 0, 23, None)?;
    let dom = day_of_month_field(expression, fields[3])?;
    let months = numeric_field(expression, CronField::Month, fields[4], 1, 12, Some(&MONTH_NAMES))?;
    let dow = day_of_week_field(expression, fields[5])?;
    let years = match fields.get(6) {
        Some(raw) => numeric_field(
            expression,
            CronField::Year,
            raw,
            MIN_YEAR as u16,
            MAX_YEAR as u16,
            None,
        )?,
        None => FieldSet::wildcard(MIN_YEAR as u16, MAX_YEAR as u16),
    };

    if dom.unspecified && dow.unspecified {
        return Err(ParseError {
            expression: expression.to_string(),
            field: CronField::DayOfWeek,
            token: "?".to_string(),
            reason: "'?' cannot be used in both the day-of-month and day-of-week fields".into(),
        });
    }
    if !dom.unspecified && !dow.unspecified {
        return Err(ParseError {
            expression: expression.to_string(),
            field: CronField::DayOfWeek,
            token: fields[5].to_string(),
            reason: "day-of-month and day-of-week cannot both be specified; use '?' in one".into(),
        });
    }

    Ok(CronExpression {
        expression: expression.to_string(),
        seconds,
        minutes,
        hours,
        days_of_month: dom.set,
        months,
        days_of_week: dow.set,
        years,
        day_of_month_unspecified: dom.unspecified,
        day_of_week_unspecified: dow.unspecified,
        last_day_of_month: dom.last_day,
        last_day_offset: dom.last_day_offset,
        nearest_weekday: dom.nearest_weekday,
        last_day_of_week: dow.last_day,
        nth_day_of_week: dow.nth,
        time_zone: default_time_zone(),
    })
}

struct DomSpec {
    set: FieldSet,
    unspecified: bool,
    last_day: bool,
    last_day_offset: u8,
    nearest_weekday: bool,
}

struct DowSpec {
    set: FieldSet,
    unspecified: bool,
    last_day: bool,
    nth: u8,
}

fn day_of_month_field(expression: &str, raw: &str) -> Result<DomSpec, ParseError> {
    let field = CronField::DayOfMonth;
    let err = |token: &str, reason: String| ParseError {
        expression: expression.to_string(),
        field,
        token: token.to_string(),
        reason,
    };
    let upper = raw.to_ascii_uppercase();

    let mut spec = DomSpec {
        set: FieldSet::wildcard(1, 31),
        unspecified: false,
        last_day: false,
        last_day_offset: 0,
        nearest_weekday: false,
    };

    if upper == "?" {
        spec.unspecified = true;
        return Ok(spec);
    }
    if upper == "L" {
        spec.last_day = true;
        return Ok(spec);
    }
    if upper == "LW" {
        spec.last_day = true;
        spec.nearest_weekday = true;
        return Ok(spec);
    }
    if let Some(rest) = upper.strip_prefix("L-") {
        let n = parse_number(rest).ok_or_else(|| {
            err(raw, "offset after 'L-' must be a number of days".into())
        })?;
        if n > 30 {
            return Err(err(raw, format!("offset {n} after 'L-' must be at most 30")));
        }
        spec.last_day = true;
        spec.last_day_offset = n as u8;
        return Ok(spec);
    }
    if upper.contains('W') {
        let day_txt = upper
            .strip_suffix('W')
            .filter(|d| !d.contains([',', '-', '/']))
            .ok_or_else(|| err(raw, "'W' requires a single day of month".into()))?;
        let d = parse_number(day_txt)
            .ok_or_else(|| err(raw, "day before 'W' must be a number".into()))?;
        if !(1..=31).contains(&d) {
            return Err(err(raw, format!("day {d} before 'W' is outside 1-31")));
        }
        spec.nearest_weekday = true;
        spec.set = FieldSet::new([d].into_iter().collect());
        return Ok(spec);
    }

    spec.set = numeric_field(expression, field, raw, 1, 31, None)?;
    Ok(spec)
}

fn day_of_week_field(expression: &str, raw: &str) -> Result<DowSpec, ParseError> {
    let field = CronField::DayOfWeek;
    let err = |token: &str, reason: String| ParseError {
        expression: expression.to_string(),
        field,
        token: token.to_string(),
        reason,
    };
    let upper = raw.to_ascii_uppercase();

    let mut spec = DowSpec {
        set: FieldSet::wildcard(1, 7),
        unspecified: false,
        last_day: false,
        nth: 0,
    };

    if upper == "?" {
        spec.unspecified = true;
        return Ok(spec);
    }
    // Bare "L" is shorthand for Saturday.
    if upper == "L" {
        spec.set = FieldSet::new([7].into_iter().collect());
        return Ok(spec);
    }
    if let Some(day_txt) = upper.strip_suffix('L') {
        if day_txt.contains([',', '-', '/', '#']) {
            return Err(err(raw, "'L' requires a single day of week".into()));
        }
        let d = weekday_value(day_txt)
            .ok_or_else(|| err(raw, "day before 'L' must be a weekday (1-7 or SUN-SAT)".into()))?;
        spec.last_day = true;
        spec.set = FieldSet::new([d].into_iter().collect());
        return Ok(spec);
    }
    if let Some((day_txt, nth_txt)) = upper.split_once('#') {
        if day_txt.contains([',', '-', '/']) {
            return Err(err(raw, "'#' requires a single day of week".into()));
        }
        let d = weekday_value(day_txt)
            .ok_or_else(|| err(raw, "day before '#' must be a weekday (1-7 or SUN-SAT)".into()))?;
        let n = parse_number(nth_txt)
            .ok_or_else(|| err(raw, "occurrence after '#' must be a number".into()))?;
        if !(1..=5).contains(&n) {
            return Err(err(raw, format!("occurrence {n} after '#' is outside 1-5")));
        }
        spec.nth = n as u8;
        spec.set = FieldSet::new([d].into_iter().collect());
        return Ok(spec);
    }

    spec.set = numeric_field(expression, field, raw, 1, 7, Some(&DAY_NAMES))?;
    Ok(spec)
}

/// Parse a `* , - /` field, optionally with three-letter names mapped onto
/// `1..` (months) or `1..` starting at Sunday (weekdays).
fn numeric_field(
    expression: &str,
    field: CronField,
    raw: &str,
    lo: u16,
    hi: u16,
    names: Option<&'static [&'static str]>,
) -> Result<FieldSet, ParseError> {
    let err = |token: &str, reason: String| ParseError {
        expression: expression.to_string(),
        field,
        token: token.to_string(),
        reason,
    };

    let upper = raw.to_ascii_uppercase();
    if upper == "*" {
        return Ok(FieldSet::wildcard(lo, hi));
    }
    reject_misplaced_specials(field, &upper).map_err(|reason| err(raw, reason))?;

    let mut values: BTreeSet<u16> = BTreeSet::new();
    for part in upper.split(',') {
        if part.is_empty() {
            return Err(err(raw, "empty list item".into()));
        }

        let (range_txt, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step = parse_number(s)
                    .ok_or_else(|| err(part, format!("step '{s}' must be a number")))?;
                if step == 0 {
                    return Err(err(part, "step must be positive".into()));
                }
                (r, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_txt == "*" {
            (lo, hi)
        } else if let Some((a_txt, b_txt)) = range_txt.split_once('-') {
            let a = field_value(a_txt, names)
                .ok_or_else(|| err(part, format!("'{a_txt}' is not a valid value")))?;
            let b = field_value(b_txt, names)
                .ok_or_else(|| err(part, format!("'{b_txt}' is not a valid value")))?;
            if a > b {
                return Err(err(part, format!("range {a}-{b} is inverted")));
            }
            (a, b)
        } else {
            let v = field_value(range_txt, names)
                .ok_or_else(|| err(part, format!("'{range_txt}' is not a valid value")))?;
            if part.contains('/') {
                // "a/s" runs from a to the field maximum.
                (v, hi)
            } else {
                (v, v)
            }
        };

        if start < lo || end > hi {
            return Err(err(
                part,
                format!("value outside allowed range {lo}-{hi}"),
            ));
        }

        let mut v = start;
        while v <= end {
            values.insert(v);
            match v.checked_add(step) {
                Some(n) => v = n,
                None => break,
            }
        }
    }

    if values.is_empty() {
        return Err(err(raw, "field has no values".into()));
    }
    Ok(FieldSet::new(values))
}

/// Targeted diagnostics for special tokens in list position or in a field
/// that does not admit them. Standalone special forms are consumed by the
/// day-field parsers before this runs.
fn reject_misplaced_specials(field: CronField, token: &str) -> Result<(), String> {
    if token.contains('?') {
        return Err("'?' must stand alone in the day-of-month or day-of-week field".into());
    }
    if token.contains('#') {
        return Err(match field {
            CronField::DayOfWeek => "'#' cannot be combined with other values".into(),
            _ => "'#' is only allowed in the day-of-week field".into(),
        });
    }
    // JUL (and friends) contain an 'L'; month names are exempt.
    if token.contains('L') && field != CronField::Month {
        return Err(match field {
            CronField::DayOfMonth | CronField::DayOfWeek => {
                "'L' cannot be combined with other values".into()
            }
            _ => "'L' is only allowed in the day-of-month or day-of-week field".into(),
        });
    }
    // WED contains a 'W'; weekday names are exempt.
    if token.contains('W') && field != CronField::DayOfWeek {
        return Err(match field {
            CronField::DayOfMonth => "'W' cannot be combined with other values".into(),
            _ => "'W' is only allowed in the day-of-month field".into(),
        });
    }
    Ok(())
}

fn parse_number(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn field_value(s: &str, names: Option<&'static [&'static str]>) -> Option<u16> {
    if let Some(v) = parse_number(s) {
        return Some(v);
    }
    let names = names?;
    names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(s))
        .map(|i| i as u16 + 1)
}

fn weekday_value(s: &str) -> Option<u16> {
    let v = field_value(s, Some(&DAY_NAMES))?;
    (1..=7).contains(&v).then_some(v)
}
