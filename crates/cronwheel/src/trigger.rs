//! Cron trigger state: next/previous fire tracking over an expression,
//! with an optional activity window.
//!
//! The trigger is what the scheduler re-arms between firings. Advancing
//! happens from the previously *scheduled* instant, not from the wall clock
//! at completion time, so a body that finishes early can never be handed
//! the same calendar instant twice.

use chrono::{DateTime, Duration, Utc};

use crate::cron::CronExpression;

/// Fire-time bookkeeping for one cron task.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: CronExpression,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    next_fire_time: Option<DateTime<Utc>>,
    previous_fire_time: Option<DateTime<Utc>>,
}

impl CronTrigger {
    pub fn new(expression: CronExpression) -> Self {
        Self {
            expression,
            start_time: None,
            end_time: None,
            next_fire_time: None,
            previous_fire_time: None,
        }
    }

    /// Instants before `start` never fire. A fire exactly at `start` counts.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Instants at or after `end` never fire. An inverted window (end before
    /// start) simply yields no fire times.
    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn expression(&self) -> &CronExpression {
        &self.expression
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// The instant this trigger is currently scheduled to fire at, if any.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    /// The most recently fired instant, if the trigger has fired at all.
    pub fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    /// Next matching instant strictly after `after`, clamped to the
    /// trigger's window.
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut after = after;
        if let Some(start) = self.start_time {
            if start > after {
                // Allow a fire exactly at the window start.
                after = start - Duration::seconds(1);
            }
        }
        if let Some(end) = self.end_time {
            if after >= end {
                return None;
            }
        }
        let fire = self.expression.next_valid_after(after)?;
        match self.end_time {
            Some(end) if fire >= end => None,
            _ => Some(fire),
        }
    }

    /// Seed `next_fire_time` when the trigger is first handed to the
    /// scheduler. A matching instant exactly at `now` counts as the first
    /// fire. Returns the computed instant.
    pub fn compute_first_fire_time(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_fire_time = self.fire_time_after(now - Duration::seconds(1));
        self.next_fire_time
    }

    /// Record a firing: the scheduled instant becomes `previous_fire_time`
    /// and the trigger advances to the next instant after it.
    pub fn triggered(&mut self) {
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = self
            .next_fire_time
            .and_then(|t| self.fire_time_after(t));
    }

    pub fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    /// Misfire handling: a trigger whose scheduled instant is already in
    /// the past fires once immediately, then realigns to the calendar on
    /// the following [`triggered`](Self::triggered).
    pub fn update_after_misfire(&mut self, now: DateTime<Utc>) {
        self.next_fire_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn daily_noon() -> CronTrigger {
        CronTrigger::new(CronExpression::parse("0 0 12 * * ?").unwrap())
    }

    #[test]
    fn first_fire_time_includes_now_exactly() {
        let mut trigger = daily_noon();
        let noon = utc(2024, 6, 3, 12, 0, 0);
        assert_eq!(trigger.compute_first_fire_time(noon), Some(noon));
    }

    #[test]
    fn first_fire_time_after_now() {
        let mut trigger = daily_noon();
        let morning = utc(2024, 6, 3, 8, 0, 0);
        assert_eq!(
            trigger.compute_first_fire_time(morning),
            Some(utc(2024, 6, 3, 12, 0, 0))
        );
        assert!(trigger.may_fire_again());
        assert_eq!(trigger.previous_fire_time(), None);
    }

    #[test]
    fn triggered_advances_from_the_scheduled_instant() {
        let mut trigger = daily_noon();
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        trigger.triggered();
        assert_eq!(trigger.previous_fire_time(), Some(utc(2024, 6, 3, 12, 0, 0)));
        // Advance comes from the scheduled noon, not from any wall clock:
        // the next instant is the following day's noon even if the body
        // finished within the same second.
        assert_eq!(trigger.next_fire_time(), Some(utc(2024, 6, 4, 12, 0, 0)));
    }

    #[test]
    fn start_time_defers_the_first_fire() {
        let mut trigger = daily_noon().with_start_time(utc(2024, 6, 10, 0, 0, 0));
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        assert_eq!(trigger.next_fire_time(), Some(utc(2024, 6, 10, 12, 0, 0)));
    }

    #[test]
    fn fire_exactly_at_start_counts() {
        let start = utc(2024, 6, 10, 12, 0, 0);
        let mut trigger = daily_noon().with_start_time(start);
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        assert_eq!(trigger.next_fire_time(), Some(start));
    }

    #[test]
    fn end_time_exhausts_the_trigger() {
        let mut trigger = daily_noon().with_end_time(utc(2024, 6, 5, 0, 0, 0));
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        assert_eq!(trigger.next_fire_time(), Some(utc(2024, 6, 3, 12, 0, 0)));
        trigger.triggered();
        assert_eq!(trigger.next_fire_time(), Some(utc(2024, 6, 4, 12, 0, 0)));
        trigger.triggered();
        assert_eq!(trigger.next_fire_time(), None);
        assert!(!trigger.may_fire_again());
    }

    #[test]
    fn fire_exactly_at_end_is_excluded() {
        let end = utc(2024, 6, 3, 12, 0, 0);
        let mut trigger = daily_noon().with_end_time(end);
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        assert_eq!(trigger.next_fire_time(), None);
    }

    #[test]
    fn inverted_window_never_fires() {
        let mut trigger = daily_noon()
            .with_start_time(utc(2024, 6, 10, 0, 0, 0))
            .with_end_time(utc(2024, 6, 1, 0, 0, 0));
        assert_eq!(trigger.compute_first_fire_time(utc(2024, 6, 3, 0, 0, 0)), None);
    }

    #[test]
    fn misfire_fires_once_now_then_realigns() {
        let mut trigger = daily_noon();
        trigger.compute_first_fire_time(utc(2024, 6, 3, 8, 0, 0));
        // The worker fell behind: it is already past 14:00.
        let now = utc(2024, 6, 3, 14, 0, 0);
        trigger.update_after_misfire(now);
        assert_eq!(trigger.next_fire_time(), Some(now));
        trigger.triggered();
        // Realigned to the calendar after the immediate firing.
        assert_eq!(trigger.next_fire_time(), Some(utc(2024, 6, 4, 12, 0, 0)));
    }

    #[test]
    fn exhausted_expression_never_schedules() {
        let expr = CronExpression::parse("0 0 0 1 1 ? 2020").unwrap();
        let mut trigger = CronTrigger::new(expr);
        assert_eq!(trigger.compute_first_fire_time(utc(2024, 6, 3, 0, 0, 0)), None);
        assert!(!trigger.may_fire_again());
    }
}
