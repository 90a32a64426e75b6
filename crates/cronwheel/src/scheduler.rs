//! Scheduler facade: cron tasks in, wheel timeouts out.
//!
//! `add` computes the task's first fire instant, converts it to a relative
//! delay, and hands the wrapped body to the wheel. When a timeout expires
//! the wrapper runs the body, then re-arms the trigger for the following
//! instant — unless the task was cancelled or replaced meanwhile, the
//! expression is exhausted, or shutdown is in progress.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::config::SchedulerConfig;
use crate::cron::CronExpression;
use crate::error::{AddError, ConfigError};
use crate::registry::HandleRegistry;
use crate::trigger::CronTrigger;
use crate::wheel::{HashedWheelTimer, TimerTask, Timeout};

/// An opaque task body: invoked once per firing.
pub type TaskBody = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// A named cron task: identifier, trigger, body.
///
/// Re-adding a task under an id that is already registered cancels the
/// previous registration first.
pub struct CronTask {
    id: String,
    trigger: CronTrigger,
    body: Arc<TaskBody>,
}

impl CronTask {
    pub fn new<F, Fut>(id: impl Into<String>, expression: CronExpression, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_trigger(id, CronTrigger::new(expression), body)
    }

    /// Build from a pre-configured trigger (e.g. one with an activity
    /// window).
    pub fn from_trigger<F, Fut>(id: impl Into<String>, trigger: CronTrigger, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: id.into(),
            trigger,
            body: Arc::new(move || body().boxed()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

struct SchedulerInner {
    wheel: HashedWheelTimer,
    registry: HandleRegistry,
}

/// Cron-driven deferred task scheduler.
///
/// An explicit value — construct one per embedding (there is no process-wide
/// instance). Must be created inside a tokio runtime; the wheel's worker is
/// spawned at construction.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub fn with_defaults() -> Self {
        Self::build(SchedulerConfig::default())
    }

    fn build(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                wheel: HashedWheelTimer::new(
                    config.tick_duration,
                    config.wheel_size,
                    config.dispatch,
                ),
                registry: HandleRegistry::new(),
            }),
        }
    }

    /// Parse `cron` and schedule `body` under `task_id`.
    pub fn add<F, Fut>(
        &self,
        task_id: impl Into<String>,
        cron: &str,
        body: F,
    ) -> Result<(), AddError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let expression = CronExpression::parse(cron)?;
        self.add_task(CronTask::new(task_id, expression, body))
    }

    /// Schedule a pre-built task.
    pub fn add_task(&self, task: CronTask) -> Result<(), AddError> {
        let CronTask {
            id,
            mut trigger,
            body,
        } = task;
        let now = Utc::now();
        let Some(next) = trigger.compute_first_fire_time(now) else {
            return Err(AddError::ExpressionExhausted);
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        let job = Arc::new(ScheduledJob {
            id: id.clone(),
            trigger: Mutex::new(trigger),
            body,
            scheduler: Arc::downgrade(&self.inner),
        });
        let handle = self.inner.wheel.submit(ScheduledJob::wheel_task(&job), delay)?;
        tracing::debug!(task_id = %id, next_fire = %next, "cron task scheduled");
        if let Some(old) = self.inner.registry.put(id, handle) {
            old.cancel();
        }
        Ok(())
    }

    /// Stop `task_id` from firing again. Unknown ids are a no-op returning
    /// `true`; a task whose body is currently executing is not interrupted
    /// (and reports `false`), but will not re-arm.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.inner.registry.remove(task_id) {
            None => true,
            Some(handle) => handle.cancel(),
        }
    }

    /// Currently registered task ids (fired-and-rearming tasks count once).
    pub fn task_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.wheel.is_shutdown()
    }

    /// Stop the wheel and report the ids of tasks that never got to fire.
    /// Subsequent [`add`](Self::add) calls fail with [`AddError::Shutdown`].
    pub async fn shutdown(&self) -> Vec<String> {
        let _unfired = self.inner.wheel.shutdown().await;
        let ids = self.inner.registry.pending_ids();
        tracing::info!(pending_tasks = ids.len(), "scheduler shut down");
        ids
    }
}

/// One registered task: the auto-rearm wrapper around the user body.
struct ScheduledJob {
    id: String,
    trigger: Mutex<CronTrigger>,
    body: Arc<TaskBody>,
    scheduler: Weak<SchedulerInner>,
}

impl ScheduledJob {
    fn wheel_task(job: &Arc<ScheduledJob>) -> Arc<dyn TimerTask> {
        let job = Arc::clone(job);
        Arc::new(move |timeout: Timeout| -> BoxFuture<'static, ()> {
            let job = Arc::clone(&job);
            async move { job.fire(timeout).await }.boxed()
        })
    }

    async fn fire(self: Arc<Self>, timeout: Timeout) {
        // The body must not take the re-arm down with it.
        if AssertUnwindSafe((self.body)()).catch_unwind().await.is_err() {
            tracing::error!(task_id = %self.id, "cron task body panicked");
        }
        self.rearm(timeout);
    }

    fn rearm(self: Arc<Self>, timeout: Timeout) {
        let Some(inner) = self.scheduler.upgrade() else {
            return;
        };
        if inner.wheel.is_shutdown() {
            tracing::debug!(task_id = %self.id, "not re-arming: scheduler shut down");
            return;
        }
        if !inner
            .registry
            .get(&self.id)
            .is_some_and(|h| h.same_handle(&timeout))
        {
            tracing::debug!(task_id = %self.id, "not re-arming: task cancelled or replaced");
            return;
        }

        let (next, delay) = {
            let mut trigger = self.trigger.lock();
            trigger.triggered();
            let now = Utc::now();
            // The body ran past the next instant: fire once now, realign after.
            if trigger.next_fire_time().is_some_and(|next| next < now) {
                trigger.update_after_misfire(now);
            }
            match trigger.next_fire_time() {
                Some(next) => (next, (next - now).to_std().unwrap_or(Duration::ZERO)),
                None => {
                    drop(trigger);
                    inner.registry.remove_if_same(&self.id, &timeout);
                    tracing::debug!(task_id = %self.id, "cron schedule complete; no further fire times");
                    return;
                }
            }
        };

        match inner.wheel.submit(Self::wheel_task(&self), delay) {
            Ok(handle) => {
                if !inner.registry.replace_if_same(&self.id, &timeout, handle.clone()) {
                    // Lost a race against cancel or re-add; withdraw quietly.
                    handle.cancel();
                    return;
                }
                tracing::trace!(task_id = %self.id, next_fire = %next, "cron task re-armed");
            }
            Err(_) => {
                tracing::debug!(task_id = %self.id, "not re-arming: scheduler shut down");
            }
        }
    }
}
