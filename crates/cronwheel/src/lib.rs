//! # cronwheel
//!
//! Cron-driven deferred task scheduler built on a hashed timing wheel.
//!
//! ## Features
//!
//! - Full seven-field cron grammar (`sec min hour dom month dow [year]`)
//!   including `?`, `L`, `LW`, `L-n`, `W`, `#`, names and steps, with
//!   per-field parse diagnostics.
//! - Calendar arithmetic in any IANA time zone; spring-forward gaps are
//!   skipped, fall-back overlaps resolve to their earliest occurrence.
//! - O(1) amortised insertion and cancellation: a power-of-two bucket ring
//!   with one background worker, fed by lock-free MPSC queues.
//! - Tasks re-arm themselves after each firing until their expression is
//!   exhausted, cancelled, or the scheduler shuts down.
//! - Graceful shutdown reporting the tasks that never fired.
//!
//! Dispatch accuracy is approximate within one wheel tick (100 ms by
//! default): a timeout fires on the first tick at or after its deadline,
//! never before it. Nothing is persisted — scheduler state is entirely
//! in-memory.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cronwheel::Scheduler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::with_defaults();
//!
//!     // Every weekday at 08:30:00.
//!     scheduler
//!         .add("report", "0 30 8 ? * MON-FRI", || async {
//!             println!("generating report");
//!         })
//!         .unwrap();
//!
//!     // ...
//!     scheduler.cancel("report");
//!     let never_fired = scheduler.shutdown().await;
//!     println!("{} tasks still pending", never_fired.len());
//! }
//! ```

pub mod config;
pub mod cron;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod trigger;
pub mod wheel;

pub use config::{Dispatch, SchedulerConfig};
pub use cron::{CronExpression, MAX_YEAR, MIN_YEAR};
pub use error::{AddError, ConfigError, CronField, ParseError, ShutdownError};
pub use registry::HandleRegistry;
pub use scheduler::{CronTask, Scheduler, TaskBody};
pub use trigger::CronTrigger;
pub use wheel::{HashedWheelTimer, TimerTask, Timeout, TimeoutState};
