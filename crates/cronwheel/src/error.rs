use std::fmt;

/// The cron field a parse diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Seconds,
    Minutes,
    Hours,
    DayOfMonth,
    Month,
    DayOfWeek,
    Year,
    /// Structural problems not tied to a single field (e.g. wrong field count).
    Expression,
}

impl CronField {
    /// Zero-based position of the field within the expression, left to right.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Seconds => Some(0),
            Self::Minutes => Some(1),
            Self::Hours => Some(2),
            Self::DayOfMonth => Some(3),
            Self::Month => Some(4),
            Self::DayOfWeek => Some(5),
            Self::Year => Some(6),
            Self::Expression => None,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
            Self::Year => "year",
            Self::Expression => "expression",
        };
        f.write_str(name)
    }
}

/// A cron expression that failed to parse.
///
/// Carries the field the diagnostic refers to, the offending token, and a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub expression: String,
    pub field: CronField,
    pub token: String,
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.token.is_empty() {
            write!(
                f,
                "invalid cron expression '{}': {}: {}",
                self.expression, self.field, self.reason
            )
        } else {
            write!(
                f,
                "invalid cron expression '{}': {} token '{}': {}",
                self.expression, self.field, self.token, self.reason
            )
        }
    }
}

impl std::error::Error for ParseError {}

/// Why [`Scheduler::add`](crate::Scheduler::add) refused a task.
#[derive(Debug)]
pub enum AddError {
    /// The cron expression failed to parse.
    InvalidCron(ParseError),
    /// The expression yields no future instant below the supported year cap.
    ExpressionExhausted,
    /// The scheduler has been shut down.
    Shutdown,
}

impl fmt::Display for AddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCron(e) => write!(f, "{e}"),
            Self::ExpressionExhausted => {
                write!(f, "cron expression yields no future fire time")
            }
            Self::Shutdown => write!(f, "scheduler has been shut down"),
        }
    }
}

impl std::error::Error for AddError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidCron(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for AddError {
    fn from(e: ParseError) -> Self {
        Self::InvalidCron(e)
    }
}

/// Returned when submitting a timeout to a timer that has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownError;

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("timer has been shut down")
    }
}

impl std::error::Error for ShutdownError {}

impl From<ShutdownError> for AddError {
    fn from(_: ShutdownError) -> Self {
        Self::Shutdown
    }
}

/// A scheduler configuration that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid scheduler config: {}", self.reason)
    }
}

impl std::error::Error for ConfigError {}
