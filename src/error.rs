//! Hand-rolled error enums, one per fallible public operation.
//!
//! Matches the teacher's `05-error-handling` idiom: manual `Display` +
//! `impl Error` instead of pulling in a derive-macro crate for something
//! this small.

use std::fmt;

/// Errors returned by [`crate::Scheduler::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetError {
    /// The deadline was [`crate::Deadline::ZERO`].
    InvalidTime,
    /// No callback was supplied.
    InvalidTask,
    /// The supplied cancel token was already signalled at call time.
    TaskCancelled,
    /// The scheduler has been closed.
    Closed,
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetError::InvalidTime => write!(f, "deadline must not be the zero time"),
            SetError::InvalidTask => write!(f, "callback must not be absent"),
            SetError::TaskCancelled => write!(f, "cancel token was already signalled"),
            SetError::Closed => write!(f, "scheduler is closed"),
        }
    }
}

impl std::error::Error for SetError {}

/// Errors returned by [`crate::Scheduler::change_workers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeError {
    /// The requested worker count was negative.
    InvalidWorkers,
    /// The scheduler has been closed.
    Closed,
}

impl fmt::Display for ResizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeError::InvalidWorkers => write!(f, "worker count must not be negative"),
            ResizeError::Closed => write!(f, "scheduler is closed"),
        }
    }
}

impl std::error::Error for ResizeError {}

/// Errors returned by [`crate::Scheduler::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseError {
    /// The scheduler was already closed.
    AlreadyClosed,
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseError::AlreadyClosed => write!(f, "scheduler is already closed"),
        }
    }
}

impl std::error::Error for CloseError {}

/// Errors returned when constructing a recurring or one-shot cron rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronError {
    /// `at()` was called with more than four fields (hour, minute, second,
    /// nanosecond).
    InvalidAt,
    /// Surfaced from the underlying [`SetError`].
    InvalidTime,
    InvalidTask,
    TaskCancelled,
    Closed,
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronError::InvalidAt => write!(f, "at() accepts at most 4 fields"),
            CronError::InvalidTime => write!(f, "deadline must not be the zero time"),
            CronError::InvalidTask => write!(f, "callback must not be absent"),
            CronError::TaskCancelled => write!(f, "cancel token was already signalled"),
            CronError::Closed => write!(f, "scheduler is closed"),
        }
    }
}

impl std::error::Error for CronError {}

impl From<SetError> for CronError {
    fn from(e: SetError) -> Self {
        match e {
            SetError::InvalidTime => CronError::InvalidTime,
            SetError::InvalidTask => CronError::InvalidTask,
            SetError::TaskCancelled => CronError::TaskCancelled,
            SetError::Closed => CronError::Closed,
        }
    }
}

/// Errors the min-heap can raise on its own (used directly by its unit
/// tests; the scheduler always constructs an unbounded heap, so this never
/// surfaces through [`crate::Scheduler`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap is at capacity")
    }
}

impl std::error::Error for CapacityExceeded {}
