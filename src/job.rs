//! The scheduler's data model: deadlines, cancellation signals, and jobs.

use std::ops::Add;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

/// A callback invoked once with the wall-clock time the scheduler actually
/// fired it at (which may be later than the requested deadline, never
/// earlier).
pub type Callback = Box<dyn FnOnce(Deadline) + Send + 'static>;

/// An absolute wall-clock deadline.
///
/// Wraps [`SystemTime`] rather than a monotonic clock so that
/// [`Deadline::ZERO`] (the Unix epoch) is a real, constructible value:
/// callers can pass it by mistake, and `set` can reject it, the same role
/// a zero-valued timestamp plays in the scheduler this crate generalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(SystemTime);

impl Deadline {
    /// The Unix epoch. Treated as "no deadline" / invalid input.
    pub const ZERO: Deadline = Deadline(SystemTime::UNIX_EPOCH);

    pub fn now() -> Deadline {
        Deadline(SystemTime::now())
    }

    pub fn after(duration: Duration) -> Deadline {
        Deadline(SystemTime::now() + duration)
    }

    pub fn is_zero(&self) -> bool {
        *self == Deadline::ZERO
    }

    /// How long from now until this deadline; zero if already due.
    pub(crate) fn remaining(&self) -> Duration {
        self.0
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}

impl From<SystemTime> for Deadline {
    fn from(t: SystemTime) -> Self {
        Deadline(t)
    }
}

impl From<Deadline> for SystemTime {
    fn from(d: Deadline) -> Self {
        d.0
    }
}

impl Add<Duration> for Deadline {
    type Output = Deadline;

    fn add(self, rhs: Duration) -> Deadline {
        Deadline(self.0 + rhs)
    }
}

/// A clone-able, idempotent, one-shot cancellation flag.
///
/// Cloning shares the same underlying signal: cancelling any clone cancels
/// them all, and cancelling twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(CancellationToken::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub(crate) async fn cancelled(&self) {
        self.0.cancelled().await
    }
}

/// A submitted job awaiting its deadline: the unit the heap orders by
/// deadline and the scheduler task eventually hands off to a worker.
pub(crate) struct Job {
    pub(crate) deadline: Deadline,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) callback: Callback,
}

impl Job {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
