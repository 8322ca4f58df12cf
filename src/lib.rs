//! A high-throughput scheduler for one-shot tasks with an absolute
//! deadline and optional cancellation.
//!
//! The core is [`Scheduler`]: a single arbiter task multiplexes job
//! submissions, cancellations, its one hardware timer, worker hand-off and
//! pool resizing against a binary min-heap, dispatching callbacks to a
//! pool of worker tasks (or, with zero workers, running them inline as
//! they come due). [`cron`] layers a recurring/one-shot convenience façade
//! on top.
//!
//! ```no_run
//! use deadline_scheduler::{Deadline, Scheduler};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let scheduler = Scheduler::new(4);
//! scheduler
//!     .set(None, Deadline::after(Duration::from_millis(50)), Some(Box::new(|_| {
//!         println!("fired");
//!     })))
//!     .await
//!     .unwrap();
//! scheduler.close().await.unwrap();
//! # }
//! ```

mod cron;
mod error;
mod heap;
mod job;
mod scheduler;

pub use cron::{CancelFn, Cron, CronOptions, IntervalBuilder, OnceBuilder, TimeZoneKind};
pub use error::{CapacityExceeded, CloseError, CronError, ResizeError, SetError};
pub use job::{CancelToken, Callback, Deadline};
pub use scheduler::Scheduler;
