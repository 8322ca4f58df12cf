//! A recurring/one-shot convenience façade over [`Scheduler`].
//!
//! Mirrors the Go `cron` package this crate generalizes:
//! `every(n).<unit>().from(t)?.at(h, m, s, ns)?.run(task)` for recurring
//! jobs, `once(t).run(task)` for one-shot jobs, both returning an
//! idempotent cancel handle. A recurring job re-arms itself from inside
//! its own callback (`previous + interval`), so drift never accumulates
//! from dispatch latency.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, TimeZone, Utc};

use crate::error::CronError;
use crate::job::{CancelToken, Deadline};
use crate::scheduler::Scheduler;
use crate::CloseError;

/// Which timezone `at()` interprets its hour/minute/second fields in.
#[derive(Debug, Clone, Copy)]
pub enum TimeZoneKind {
    Local,
    Utc,
}

impl Default for TimeZoneKind {
    fn default() -> Self {
        TimeZoneKind::Local
    }
}

/// Configuration for [`Cron::new`].
#[derive(Debug, Clone)]
pub struct CronOptions {
    pub workers: usize,
    pub timezone: TimeZoneKind,
}

impl Default for CronOptions {
    fn default() -> Self {
        CronOptions {
            workers: 1,
            timezone: TimeZoneKind::Local,
        }
    }
}

/// A cancel handle for a cron rule. Calling it more than once is a no-op.
pub type CancelFn = Box<dyn Fn() + Send + Sync>;

fn make_cancel_fn(token: CancelToken) -> CancelFn {
    Box::new(move || token.cancel())
}

/// The recurring/one-shot convenience façade.
///
/// Cheap to clone; every clone shares the same underlying [`Scheduler`].
#[derive(Clone)]
pub struct Cron {
    scheduler: Scheduler,
    timezone: TimeZoneKind,
}

impl Cron {
    pub fn new(options: CronOptions) -> Self {
        Cron {
            scheduler: Scheduler::new(options.workers),
            timezone: options.timezone,
        }
    }

    /// Starts building a recurring rule that fires every `n` units.
    pub fn every(&self, n: u64) -> IntervalBuilder<'_> {
        IntervalBuilder {
            cron: self,
            magnitude: n,
            interval: Duration::from_secs(n),
            from: None,
            at_error: None,
        }
    }

    /// Starts building a one-shot rule that fires once at `at`.
    pub fn once(&self, at: Deadline) -> OnceBuilder<'_> {
        OnceBuilder { cron: self, at }
    }

    pub async fn close(&self) -> Result<(), CloseError> {
        self.scheduler.close().await
    }
}

/// Builds a recurring cron rule.
pub struct IntervalBuilder<'a> {
    cron: &'a Cron,
    magnitude: u64,
    interval: Duration,
    from: Option<Deadline>,
    at_error: Option<CronError>,
}

impl<'a> IntervalBuilder<'a> {
    pub fn millisecond(mut self) -> Self {
        self.interval = Duration::from_millis(self.magnitude);
        self
    }

    pub fn second(mut self) -> Self {
        self.interval = Duration::from_secs(self.magnitude);
        self
    }

    pub fn minute(mut self) -> Self {
        self.interval = Duration::from_secs(self.magnitude.saturating_mul(60));
        self
    }

    pub fn hour(mut self) -> Self {
        self.interval = Duration::from_secs(self.magnitude.saturating_mul(3_600));
        self
    }

    pub fn day(mut self) -> Self {
        self.interval = Duration::from_secs(self.magnitude.saturating_mul(86_400));
        self
    }

    /// First fire time. Defaults to "now" if neither this nor `at()` is set.
    pub fn from(mut self, at: Deadline) -> Self {
        self.from = Some(at);
        self
    }

    /// First fire time expressed as today's wall-clock hour/minute/second
    /// (and, optionally, nanosecond) in the cron's configured timezone,
    /// rolled forward a day if that moment has already passed. Accepts at
    /// most 4 fields; a 5th or later is an [`CronError::InvalidAt`],
    /// surfaced from `run()` rather than here so the builder stays
    /// chainable.
    pub fn at(mut self, fields: &[u32]) -> Self {
        if fields.len() > 4 {
            self.at_error = Some(CronError::InvalidAt);
            return self;
        }
        self.from = Some(compute_at(self.cron.timezone, fields));
        self
    }

    /// Finalizes the rule and starts it running.
    ///
    /// `async` rather than the original's plain function call: the
    /// first submission goes through [`Scheduler::set`], which is async,
    /// and awaiting it directly (instead of spawning a detached task and
    /// blocking on its result) keeps this on the caller's own task and
    /// never risks blocking an executor thread.
    pub async fn run(
        self,
        task: impl Fn() + Send + Sync + 'static,
    ) -> (CancelFn, Result<(), CronError>) {
        let cancel = CancelToken::new();
        let cancel_fn = make_cancel_fn(cancel.clone());

        if let Some(err) = self.at_error {
            return (cancel_fn, Err(err));
        }

        let first = self.from.unwrap_or_else(Deadline::now);
        let task = Arc::new(task);
        let scheduler = self.cron.scheduler.clone();
        let callback = make_recurring_callback(scheduler.clone(), cancel.clone(), first, self.interval, task);
        let result = scheduler
            .set(Some(cancel), first, Some(callback))
            .await
            .map_err(CronError::from);
        (cancel_fn, result)
    }
}

/// Builds a one-shot cron rule.
pub struct OnceBuilder<'a> {
    cron: &'a Cron,
    at: Deadline,
}

impl<'a> OnceBuilder<'a> {
    pub async fn run(
        self,
        task: impl FnOnce() + Send + 'static,
    ) -> (CancelFn, Result<(), CronError>) {
        let cancel = CancelToken::new();
        let cancel_fn = make_cancel_fn(cancel.clone());

        let callback: crate::job::Callback = Box::new(move |_fired_at| task());
        let result = self
            .cron
            .scheduler
            .set(Some(cancel.clone()), self.at, Some(callback))
            .await
            .map_err(CronError::from);
        (cancel_fn, result)
    }
}

/// Builds the callback a recurring job invokes on each fire: re-arms
/// itself for `current + interval` (the *intended* previous deadline, not
/// the actual fire time, so dispatch jitter never accumulates drift),
/// then runs the user task. Re-arming requires `Scheduler::set`, which is
/// async, so it is spawned as a fresh task from inside the (synchronous)
/// callback; the re-arm is submitted before the task runs, matching the
/// order the original cron package uses.
fn make_recurring_callback(
    scheduler: Scheduler,
    cancel: CancelToken,
    current: Deadline,
    interval: Duration,
    task: Arc<dyn Fn() + Send + Sync>,
) -> crate::job::Callback {
    Box::new(move |_fired_at: Deadline| {
        let next = current + interval;
        let scheduler_for_rearm = scheduler.clone();
        let cancel_for_rearm = cancel.clone();
        let task_for_rearm = task.clone();
        tokio::spawn(async move {
            let callback = make_recurring_callback(
                scheduler_for_rearm.clone(),
                cancel_for_rearm.clone(),
                next,
                interval,
                task_for_rearm,
            );
            let _ = scheduler_for_rearm
                .set(Some(cancel_for_rearm), next, Some(callback))
                .await;
        });
        task();
    })
}

fn compute_at(tz: TimeZoneKind, fields: &[u32]) -> Deadline {
    let hour = fields.first().copied().unwrap_or(0);
    let minute = fields.get(1).copied().unwrap_or(0);
    let second = fields.get(2).copied().unwrap_or(0);
    let nanosecond = fields.get(3).copied().unwrap_or(0);

    match tz {
        TimeZoneKind::Local => compute_at_tz(Local, hour, minute, second, nanosecond),
        TimeZoneKind::Utc => compute_at_tz(Utc, hour, minute, second, nanosecond),
    }
}

fn compute_at_tz<Tz>(tz: Tz, hour: u32, minute: u32, second: u32, nanosecond: u32) -> Deadline
where
    Tz: TimeZone,
{
    let now = Utc::now().with_timezone(&tz);
    let today = tz
        .with_ymd_and_hms(now.year(), now.month(), now.day(), hour, minute, second)
        .single()
        .unwrap_or_else(|| now.clone())
        + chrono::Duration::nanoseconds(nanosecond as i64);

    let target = if today < now {
        today + chrono::Duration::days(1)
    } else {
        today
    };
    Deadline::from(target.with_timezone(&Utc).into())
}
