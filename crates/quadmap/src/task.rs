//! Task spawning with explicit cancellation.
//!
//! Tile requests run as detached tasks on whatever executor the host
//! provides. Every task comes with a [`TaskHandle`] that aborts it, and the
//! fetch tasks also carry a [`CancellationToken`] so a request that already
//! finished cannot deliver its result after its node was destroyed.
//!
//! - [`LocalSpawner`]: cooperative executor driven by the render loop
//! - [`TokioSpawner`]: spawns onto a Tokio runtime (native only)

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// A boxed task future.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Something that can run detached tasks.
pub trait Spawner: Send + Sync {
    /// Start running `future` and return a handle that can abort it.
    fn spawn(&self, future: TaskFuture) -> TaskHandle;
}

/// Handle to a spawned task.
///
/// Dropping the handle detaches the task; [`TaskHandle::cancel`] aborts it.
#[derive(Default)]
pub struct TaskHandle {
    task: Option<async_executor::Task<()>>,
    abort: Option<Box<dyn FnOnce() + Send>>,
}

impl TaskHandle {
    /// A handle that aborts the task by calling `abort`.
    pub fn new(abort: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task: None,
            abort: Some(Box::new(abort)),
        }
    }

    /// A handle owning an executor task. Cancelling drops the task.
    #[must_use]
    pub fn from_task(task: async_executor::Task<()>) -> Self {
        Self {
            task: Some(task),
            abort: None,
        }
    }

    /// A handle with nothing to abort.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Abort the task. It will not be polled again.
    pub fn cancel(mut self) {
        // Dropping an executor task cancels it.
        drop(self.task.take());
        if let Some(abort) = self.abort.take() {
            abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.detach();
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("abortable", &(self.task.is_some() || self.abort.is_some()))
            .finish()
    }
}

/// Shared flag tied to the liveness of the node that issued a request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token cancelled. All clones observe it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cooperative executor driven by the render loop.
///
/// Tasks only make progress inside [`run_until_stalled`](Self::run_until_stalled),
/// which the host calls once per frame. Only tasks whose waker fired are
/// polled again, so a request parked on the network costs nothing per frame.
#[derive(Clone)]
pub struct LocalSpawner {
    executor: Arc<async_executor::Executor<'static>>,
    live: Arc<AtomicUsize>,
}

/// Decrements the live count when a task's future is dropped, whether it
/// finished or was cancelled.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl LocalSpawner {
    /// Create an empty executor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: Arc::new(async_executor::Executor::new()),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of tasks that have not finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Run scheduled tasks until none of them is ready to make progress.
    ///
    /// Returns the number of task polls performed.
    pub fn run_until_stalled(&self) -> usize {
        let mut polls = 0;
        while self.executor.try_tick() {
            polls += 1;
        }
        polls
    }
}

impl Default for LocalSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for LocalSpawner {
    fn spawn(&self, future: TaskFuture) -> TaskHandle {
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(Arc::clone(&self.live));
        let task = self.executor.spawn(async move {
            let _guard = guard;
            future.await;
        });
        TaskHandle::from_task(task)
    }
}

impl fmt::Debug for LocalSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSpawner")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Spawns tasks onto a Tokio runtime.
#[cfg(not(target_family = "wasm"))]
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

#[cfg(not(target_family = "wasm"))]
impl TokioSpawner {
    /// Spawn onto the runtime behind `handle`.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime of the calling context, if there is one.
    #[must_use]
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(not(target_family = "wasm"))]
impl Spawner for TokioSpawner {
    fn spawn(&self, future: TaskFuture) -> TaskHandle {
        let abort = self.handle.spawn(future).abort_handle();
        TaskHandle::new(move || abort.abort())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_local_spawner_runs_ready_tasks() {
        let spawner = LocalSpawner::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            let _ = spawner.spawn(Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(spawner.pending(), 3);
        assert_eq!(spawner.run_until_stalled(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn test_local_spawner_waits_for_channel() {
        let spawner = LocalSpawner::new();
        let (tx, rx) = async_channel::unbounded::<u32>();
        let (done_tx, done_rx) = async_channel::unbounded::<u32>();
        let _ = spawner.spawn(Box::pin(async move {
            if let Ok(v) = rx.recv().await {
                let _ = done_tx.send(v * 2).await;
            }
        }));

        assert_eq!(spawner.run_until_stalled(), 1);
        assert_eq!(spawner.pending(), 1);

        tx.try_send(21).unwrap();
        assert_eq!(spawner.run_until_stalled(), 1);
        assert_eq!(done_rx.try_recv().unwrap(), 42);
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn test_parked_task_is_not_polled_until_woken() {
        let spawner = LocalSpawner::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let (tx, rx) = async_channel::unbounded::<()>();
        let _ = spawner.spawn(Box::pin(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                if rx.recv().await.is_err() {
                    break;
                }
            }
        }));

        assert_eq!(spawner.run_until_stalled(), 1);
        for _ in 0..10 {
            assert_eq!(spawner.run_until_stalled(), 0);
        }
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        tx.try_send(()).unwrap();
        assert_eq!(spawner.run_until_stalled(), 1);
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        drop(tx);
        spawner.run_until_stalled();
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn test_dropped_handle_detaches() {
        let spawner = LocalSpawner::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        drop(spawner.spawn(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        })));
        spawner.run_until_stalled();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let spawner = LocalSpawner::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = spawner.spawn(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
        }));
        handle.cancel();
        // The executor drops the cancelled future on its next tick.
        spawner.run_until_stalled();
        assert_eq!(spawner.pending(), 0);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_task_spawned_from_task_runs_in_same_call() {
        let spawner = LocalSpawner::new();
        let inner = spawner.clone();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let _ = spawner.spawn(Box::pin(async move {
            let _ = inner.spawn(Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            }));
        }));
        assert_eq!(spawner.run_until_stalled(), 2);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[cfg(not(target_family = "wasm"))]
    #[tokio::test]
    async fn test_tokio_spawner_abort() {
        let spawner = TokioSpawner::current().unwrap();
        let (tx, rx) = async_channel::unbounded::<()>();
        let handle = spawner.spawn(Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            let _ = tx.send(()).await;
        }));
        handle.cancel();
        // The aborted task drops its sender, closing the channel.
        assert!(rx.recv().await.is_err());
    }
}
