//! The central arbiter: one scheduler task multiplexes submissions,
//! cancellations, the armed timer, worker hand-off and resize requests
//! against a single min-heap, plus a pool of worker tasks that invoke
//! callbacks as they are dispatched.
//!
//! Translated event-for-event from the Go `scheduler()`/`worker()`
//! goroutines this crate generalizes, using `tokio::select!` in place of
//! Go's `select` statement. The worker pool's shared-receiver idiom
//! (`Arc<tokio::sync::Mutex<Receiver<_>>>`, one termination token per
//! live worker) mirrors the teacher's `29-thread-pool` lab.

use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{CloseError, ResizeError, SetError};
use crate::heap::MinHeap;
use crate::job::{CancelToken, Callback, Deadline, Job};

/// A callback plus the wall-clock time it is being fired at, handed off to
/// a worker (or a zero-worker transient task) once its deadline is due.
struct DispatchItem {
    callback: Callback,
    fire_time: Deadline,
}

/// Receivers shared by every worker task. Wrapped in an async mutex so
/// that at most one worker is ever racing to receive from either channel
/// at a time -- the closest tokio equivalent of Go's unbuffered channel
/// fan-in, and the same pattern the teacher's thread pool lab uses for a
/// shared `Receiver<Message>`.
struct SharedChannels {
    dispatch_rx: AsyncMutex<mpsc::Receiver<DispatchItem>>,
    term_rx: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

/// Tracks how many scheduler/worker/transient tasks are still running so
/// that `close()` can wait for all of them to unwind before returning --
/// a tokio-friendly analogue of `sync.WaitGroup`.
#[derive(Clone)]
struct TaskGroup {
    count: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl TaskGroup {
    fn new() -> Self {
        TaskGroup {
            count: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    fn enter(&self) -> TaskGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            group: self.clone(),
        }
    }

    async fn wait_idle(&self) {
        loop {
            // Register for notification before checking the count, so a
            // `notify_waiters` that lands between the check and the await
            // below is not lost.
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct TaskGuard {
    group: TaskGroup,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.group.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.group.notify.notify_waiters();
        }
    }
}

struct ControlState {
    live_workers: usize,
    closed: bool,
}

/// Invokes `callback(fire_time)`, isolating any panic so it never reaches
/// the worker loop or the scheduler task.
fn invoke_with_panic_guard(callback: Callback, fire_time: Deadline) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback(fire_time);
    }));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(panic_message = %message, "scheduled callback panicked; isolated");
    }
}

fn spawn_transient(item: DispatchItem, task_group: &TaskGroup) {
    let guard = task_group.enter();
    tokio::spawn(async move {
        let _guard = guard;
        invoke_with_panic_guard(item.callback, item.fire_time);
    });
}

async fn worker_loop(shared: Arc<SharedChannels>, close_token: CancellationToken) {
    loop {
        tokio::select! {
            _ = close_token.cancelled() => {
                debug!("worker exiting: scheduler closed");
                return;
            }
            terminated = async { shared.term_rx.lock().await.recv().await } => {
                if terminated.is_some() {
                    debug!("worker exiting: termination token received");
                }
                return;
            }
            item = async { shared.dispatch_rx.lock().await.recv().await } => {
                match item {
                    Some(item) => invoke_with_panic_guard(item.callback, item.fire_time),
                    None => return,
                }
            }
        }
    }
}

/// The scheduler task's private state machine. Owns the heap and the
/// timer; everything else communicates with it over channels.
struct SchedulerTask {
    heap: MinHeap,
    dispatch_enabled: bool,
    last_fire_time: Deadline,
    worker_count: usize,
    dispatch_tx: mpsc::Sender<DispatchItem>,
    submit_rx: mpsc::Receiver<Job>,
    worker_count_rx: mpsc::UnboundedReceiver<usize>,
    close_token: CancellationToken,
    task_group: TaskGroup,
}

impl SchedulerTask {
    fn rearm(&self, mut sleep: Pin<&mut Sleep>) {
        if let Some(deadline) = self.heap.peek_deadline() {
            let instant = Instant::now() + deadline.remaining();
            sleep.as_mut().reset(instant);
            trace!(?deadline, "timer armed");
        }
    }

    /// Called after the previous top-of-heap job has been resolved (sent
    /// to a worker, dropped as cancelled, or drained inline): decide
    /// whether the new top is already overdue (keep draining without
    /// re-arming) or needs a fresh timer.
    fn advance(&mut self, sleep: Pin<&mut Sleep>) {
        match self.heap.peek_deadline() {
            Some(deadline) if deadline <= self.last_fire_time => {
                // Still overdue relative to the last fire: stay in
                // dispatch-enabled mode so the next loop iteration tries
                // to hand it off immediately.
                self.dispatch_enabled = true;
            }
            Some(_) => {
                self.dispatch_enabled = false;
                self.rearm(sleep);
            }
            None => {
                self.dispatch_enabled = false;
            }
        }
    }

    fn drain_inline(&mut self) {
        while let Some(deadline) = self.heap.peek_deadline() {
            if deadline > self.last_fire_time {
                break;
            }
            let job = self.heap.pop().expect("peek just confirmed a top entry");
            if job.is_cancelled() {
                trace!("inline drain: job already cancelled");
                continue;
            }
            spawn_transient(
                DispatchItem {
                    callback: job.callback,
                    fire_time: self.last_fire_time,
                },
                &self.task_group,
            );
        }
    }

    async fn run(mut self) {
        let idle = Instant::now() + Duration::from_secs(3600);
        let sleep = tokio::time::sleep_until(idle);
        tokio::pin!(sleep);

        loop {
            let cancel_token = self.heap.peek().and_then(|j| j.cancel.clone());
            let cancelled = async {
                match &cancel_token {
                    Some(token) => token.cancelled().await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.close_token.cancelled() => {
                    debug!("scheduler task exiting: closed");
                    return;
                }
                maybe_job = self.submit_rx.recv() => {
                    match maybe_job {
                        Some(job) => {
                            self.heap.add(job).expect("scheduler's heap is unbounded");
                            self.dispatch_enabled = false;
                            self.rearm(sleep.as_mut());
                            trace!("job submitted, timer re-armed");
                        }
                        None => return,
                    }
                }
                _ = cancelled => {
                    let popped = self.heap.pop();
                    debug_assert!(popped.is_some());
                    trace!("current job cancelled, dropped without invoking");
                    self.dispatch_enabled = false;
                    self.advance(sleep.as_mut());
                }
                _ = sleep.as_mut(), if !self.dispatch_enabled && !self.heap.is_empty() => {
                    self.last_fire_time = Deadline::now();
                    self.dispatch_enabled = true;
                    trace!(fire_time = ?self.last_fire_time, "timer fired");
                    if self.worker_count == 0 {
                        self.drain_inline();
                        self.advance(sleep.as_mut());
                    }
                }
                Some(new_count) = self.worker_count_rx.recv() => {
                    self.worker_count = new_count;
                    debug!(worker_count = new_count, "worker count changed");
                    if self.worker_count == 0 && self.dispatch_enabled {
                        self.drain_inline();
                        self.advance(sleep.as_mut());
                    }
                }
                permit = self.dispatch_tx.reserve(), if self.dispatch_enabled && self.worker_count > 0 => {
                    if let Ok(permit) = permit {
                        if let Some(job) = self.heap.pop() {
                            if job.is_cancelled() {
                                trace!("job cancelled just before dispatch, dropped");
                            } else {
                                permit.send(DispatchItem {
                                    callback: job.callback,
                                    fire_time: self.last_fire_time,
                                });
                                trace!("job dispatched to worker");
                            }
                        }
                        self.advance(sleep.as_mut());
                    }
                }
            }
        }
    }
}

/// A high-throughput deadline task scheduler.
///
/// Cheap to clone: every clone shares the same underlying scheduler task,
/// worker pool and channels.
#[derive(Clone)]
pub struct Scheduler {
    submit_tx: mpsc::Sender<Job>,
    worker_count_tx: mpsc::UnboundedSender<usize>,
    term_tx: mpsc::UnboundedSender<()>,
    close_token: CancellationToken,
    control: Arc<AsyncMutex<ControlState>>,
    task_group: TaskGroup,
    shared: Arc<SharedChannels>,
}

impl Scheduler {
    /// Spawns the scheduler task and `initial_workers` worker tasks.
    pub fn new(initial_workers: usize) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(1);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);
        let (worker_count_tx, worker_count_rx) = mpsc::unbounded_channel();
        let (term_tx, term_rx) = mpsc::unbounded_channel();
        let close_token = CancellationToken::new();
        let task_group = TaskGroup::new();

        let shared = Arc::new(SharedChannels {
            dispatch_rx: AsyncMutex::new(dispatch_rx),
            term_rx: AsyncMutex::new(term_rx),
        });

        let scheduler_task = SchedulerTask {
            heap: MinHeap::new(0),
            dispatch_enabled: false,
            last_fire_time: Deadline::now(),
            worker_count: initial_workers,
            dispatch_tx: dispatch_tx.clone(),
            submit_rx,
            worker_count_rx,
            close_token: close_token.clone(),
            task_group: task_group.clone(),
        };
        let sched_guard = task_group.enter();
        tokio::spawn(async move {
            let _guard = sched_guard;
            scheduler_task.run().await;
        });

        let scheduler = Scheduler {
            submit_tx,
            worker_count_tx,
            term_tx,
            close_token,
            control: Arc::new(AsyncMutex::new(ControlState {
                live_workers: initial_workers,
                closed: false,
            })),
            task_group,
            shared,
        };
        for _ in 0..initial_workers {
            scheduler.spawn_worker();
        }
        info!(workers = initial_workers, "scheduler started");
        scheduler
    }

    fn spawn_worker(&self) {
        let shared = self.shared.clone();
        let close_token = self.close_token.clone();
        let guard = self.task_group.enter();
        tokio::spawn(async move {
            let _guard = guard;
            worker_loop(shared, close_token).await;
        });
    }

    /// Schedules `callback` to fire at or after `deadline`.
    ///
    /// Rejects a zero deadline, an absent callback, an already-cancelled
    /// token, or a closed scheduler.
    pub async fn set(
        &self,
        cancel: Option<CancelToken>,
        deadline: Deadline,
        callback: Option<Callback>,
    ) -> Result<(), SetError> {
        if deadline.is_zero() {
            return Err(SetError::InvalidTime);
        }
        let callback = callback.ok_or(SetError::InvalidTask)?;
        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(SetError::TaskCancelled);
        }
        if self.close_token.is_cancelled() {
            return Err(SetError::Closed);
        }
        let job = Job {
            deadline,
            cancel,
            callback,
        };
        tokio::select! {
            _ = self.close_token.cancelled() => Err(SetError::Closed),
            result = self.submit_tx.send(job) => result.map_err(|_| SetError::Closed),
        }
    }

    /// Resizes the worker pool. `0` is legal and switches to zero-worker
    /// inline-dispatch mode.
    pub async fn change_workers(&self, n: i64) -> Result<(), ResizeError> {
        if n < 0 {
            return Err(ResizeError::InvalidWorkers);
        }
        let n = n as usize;
        let mut guard = self.control.lock().await;
        if guard.closed {
            return Err(ResizeError::Closed);
        }
        let live = guard.live_workers;
        if n > live {
            for _ in 0..(n - live) {
                self.spawn_worker();
            }
        } else if n < live {
            for _ in 0..(live - n) {
                let _ = self.term_tx.send(());
            }
        }
        guard.live_workers = n;
        drop(guard);
        let _ = self.worker_count_tx.send(n);
        info!(workers = n, "worker pool resized");
        Ok(())
    }

    /// Closes the scheduler: stops accepting new jobs, terminates all
    /// workers, and waits for the scheduler task and every worker and
    /// in-flight transient task to finish.
    ///
    /// Idempotent calls return [`CloseError::AlreadyClosed`] rather than
    /// panicking, since two collaborators racing to shut down is a normal
    /// occurrence, not a programmer error.
    pub async fn close(&self) -> Result<(), CloseError> {
        let mut guard = self.control.lock().await;
        if guard.closed {
            return Err(CloseError::AlreadyClosed);
        }
        guard.closed = true;
        let live = guard.live_workers;
        drop(guard);

        for _ in 0..live {
            let _ = self.term_tx.send(());
        }
        self.close_token.cancel();
        self.task_group.wait_idle().await;
        info!("scheduler closed");
        Ok(())
    }
}
