//! Per-key sequenced write coordination.
//!
//! A [`WriteCoordinator`] serializes writes that target the same resource key.
//! Each key that has accepted work owns a dedicated worker future draining an
//! ordered inbox, so writes for one key run strictly one at a time in the
//! order [`submit`] was called, while unrelated keys never wait on each other.
//!
//! ## Lifecycle of a key
//!
//! 1. The first submission for a key creates its queue state and spawns the
//!    key's worker through the coordinator's [`Spawner`].
//! 2. Every accepted submission takes the next sequence number, starting at
//!    0, and is pushed onto the worker's inbox in the same critical section.
//! 3. A final submission ([`submit_final`]) closes the key the moment it is
//!    accepted. Later submissions are skipped without running their task.
//! 4. Once the final write has settled and nothing else is pending, the key's
//!    state is evicted and its worker exits. Submitting to the key again
//!    starts a brand new stream at sequence 0.
//!
//! ## Failure isolation
//!
//! Every submission carries two completion signals: an internal settle signal
//! that fires no matter how the task ended, which waiters and the chain tail
//! use, and the caller's own result channel, which carries the task's real
//! outcome. A failed or panicking write is reported only to its own
//! [`Submission`] and never blocks the writes behind it.
//!
//! [`submit`]: WriteCoordinator::submit
//! [`submit_final`]: WriteCoordinator::submit_final

use crate::{
    CoordinatorConfig, Error, Spawner, Submission, SubmissionResult, WaitUntil,
    coordinator::{
        mutex::{Mutex, MutexGuard, lock},
        state::{Job, QueueSnapshot, QueueState, Settle, WaitPlan},
    },
};
use core::{fmt, hash::Hash, panic::AssertUnwindSafe};
use futures::{
    FutureExt, StreamExt,
    channel::{
        mpsc::{self, UnboundedReceiver},
        oneshot,
    },
    future::join_all,
};
use portable_atomic::{AtomicU64, Ordering};
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Serializes writes per resource key.
///
/// The coordinator is a cheap handle: clones share the same registry, while
/// coordinators built separately are fully independent of one another.
///
/// `K` identifies one serialization domain (for example one document under
/// edit). `S` is the [`Spawner`] used to start per-key workers.
///
/// # Example
/// ```
/// # #[cfg(feature = "async-tokio")]
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use keyseq::{SubmissionResult, WriteCoordinator};
///
/// let coordinator = WriteCoordinator::new();
///
/// let first = coordinator.submit("doc-1", || async { Ok::<_, std::io::Error>(()) });
/// let last = coordinator.submit_final("doc-1", || async { Ok::<_, std::io::Error>(()) });
/// let late = coordinator.submit("doc-1", || async { Ok::<_, std::io::Error>(()) });
///
/// assert_eq!(first.sequence_number(), 0);
/// assert_eq!(last.sequence_number(), 1);
/// assert!(late.is_skipped());
///
/// assert_eq!(
///     late.await.unwrap(),
///     SubmissionResult { sequence_number: 1, skipped: true }
/// );
/// coordinator.wait_until(&"doc-1", None).await;
/// assert!(!coordinator.is_closed(&"doc-1"));
/// # });
/// ```
pub struct WriteCoordinator<K, S> {
    inner: Arc<Inner<K, S>>,
}

struct Inner<K, S> {
    queues: Mutex<HashMap<K, QueueState>>,
    epochs: AtomicU64,
    config: CoordinatorConfig,
    spawner: S,
}

impl<K, S> Clone for WriteCoordinator<K, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, S> fmt::Debug for WriteCoordinator<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<K, S> WriteCoordinator<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    /// Creates an unbounded coordinator that starts key workers on `spawner`.
    pub fn with_spawner(spawner: S) -> Self {
        Self::with_config(spawner, CoordinatorConfig::default())
    }

    /// Creates a coordinator with explicit configuration.
    pub fn with_config(spawner: S, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                epochs: AtomicU64::new(0),
                config,
                spawner,
            }),
        }
    }

    /// The configuration this coordinator was built with.
    pub fn config(&self) -> CoordinatorConfig {
        self.inner.config
    }

    /// Queues `task` behind every write previously submitted for `key`.
    ///
    /// Equivalent to [`submit_with`](Self::submit_with) with `is_final =
    /// false`.
    pub fn submit<F, Fut, E>(&self, key: K, task: F) -> Submission<E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        self.submit_with(key, task, false)
    }

    /// Queues `task` as the last write for `key` and closes the key.
    ///
    /// The key reports closed as soon as this returns, before `task` has even
    /// started. Every later submission for the key is skipped until the key
    /// drains and is evicted.
    pub fn submit_final<F, Fut, E>(&self, key: K, task: F) -> Submission<E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        self.submit_with(key, task, true)
    }

    /// Submits a write for `key`, optionally closing the key.
    ///
    /// Sequence assignment is synchronous: the returned [`Submission`]
    /// already knows its sequence number, and writes for one key run in the
    /// order this method was called.
    ///
    /// If the key is already closed, `task` is dropped without being invoked
    /// and the handle resolves to a skipped [`SubmissionResult`] carrying the
    /// final submission's sequence number.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, task)))]
    pub fn submit_with<F, Fut, E>(&self, key: K, task: F, is_final: bool) -> Submission<E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        let mut queues = lock(&self.inner.queues);
        let state = self.inner.state_for(&mut queues, &key);
        if state.closed {
            return Self::skip(&key, state);
        }
        self.accept(queues, key, task, is_final)
    }

    /// Like [`submit_with`](Self::submit_with), but refuses the write when the
    /// key already holds [`CoordinatorConfig::max_pending_per_key`] unsettled
    /// submissions.
    ///
    /// A closed key still yields a skipped submission rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Saturated`] if the key is at its limit. No sequence
    /// number is consumed and `task` is dropped without being invoked.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, task)))]
    pub fn try_submit<F, Fut, E>(
        &self,
        key: K,
        task: F,
        is_final: bool,
    ) -> Result<Submission<E>, Error<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        let mut queues = lock(&self.inner.queues);
        let state = self.inner.state_for(&mut queues, &key);
        if state.closed {
            return Ok(Self::skip(&key, state));
        }
        if let Some(limit) = self.inner.config.max_pending_per_key {
            if state.pending.len() >= limit.get() {
                #[cfg(feature = "tracing")]
                tracing::debug!(?key, limit = limit.get(), "write refused, key saturated");
                return Err(Error::Saturated { limit: limit.get() });
            }
        }
        Ok(self.accept(queues, key, task, is_final))
    }

    /// Returns a future that resolves once writes for `key` have settled.
    ///
    /// - With `up_to = Some(n)`, waits for every submission with sequence
    ///   `<= n`. `n` is clamped to the highest sequence assigned so far, so
    ///   naming a number that was never handed out cannot hang.
    /// - With `up_to = None` and a final submission already settled, waits
    ///   through the final sequence.
    /// - Otherwise waits for everything accepted **before this call**.
    ///   Submissions made afterwards are not covered.
    ///
    /// Unknown keys (never used, or already drained) resolve immediately.
    ///
    /// The wait only certifies that writes settled, not that they succeeded;
    /// each write's own [`Submission`] carries its outcome.
    ///
    /// A write whose task never finishes stalls every wait that covers it.
    /// Use a bounded wait (e.g. `WriteCoordinatorTokioExt`) to put an upper
    /// limit on it.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn wait_until(&self, key: &K, up_to: Option<u64>) -> WaitUntil {
        let plan = {
            let mut queues = lock(&self.inner.queues);
            let Some(state) = queues.get(key) else {
                return WaitUntil::ready();
            };
            let plan = state.wait_plan(up_to);
            if matches!(plan, WaitPlan::Settled) {
                Inner::<K, S>::evict_if_drained(&mut queues, key);
                return WaitUntil::ready();
            }
            plan
        };

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        WaitUntil::new(
            async move {
                match plan {
                    WaitPlan::Settled => {}
                    WaitPlan::Tail(tail) => tail.await,
                    WaitPlan::Pending(gathered) => {
                        join_all(gathered).await;
                    }
                }
                inner.evict_if_idle(&key);
            }
            .boxed(),
        )
    }

    /// Returns `true` if a final submission has been accepted for `key` and
    /// the key has not been evicted since.
    pub fn is_closed(&self, key: &K) -> bool {
        lock(&self.inner.queues)
            .get(key)
            .is_some_and(|state| state.closed)
    }

    /// A point-in-time view of `key`'s queue, or `None` if the key holds no
    /// state.
    pub fn snapshot(&self, key: &K) -> Option<QueueSnapshot> {
        lock(&self.inner.queues).get(key).map(QueueState::snapshot)
    }

    /// Number of keys currently holding queue state.
    pub fn active_keys(&self) -> usize {
        lock(&self.inner.queues).len()
    }

    fn skip<E>(_key: &K, state: &QueueState) -> Submission<E> {
        let sequence = state.skipped_sequence();
        #[cfg(feature = "tracing")]
        tracing::debug!(key = ?_key, sequence, "key closed, write skipped");
        Submission::skipped(sequence)
    }

    /// Assigns the next sequence number to `task` and queues it on the key's
    /// worker. Takes the registry guard so it can be released before a
    /// rejected job is dropped.
    fn accept<F, Fut, E>(
        &self,
        mut queues: MutexGuard<'_, HashMap<K, QueueState>>,
        key: K,
        task: F,
        is_final: bool,
    ) -> Submission<E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
    {
        let state = self.inner.state_for(&mut queues, &key);
        if is_final {
            state.closed = true;
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let (settle_tx, settle_rx) = oneshot::channel::<()>();
        let settle: Settle = settle_rx.map(|_| ()).boxed().shared();
        state.pending.insert(sequence, settle.clone());
        state.tail = Some(settle);

        #[cfg(feature = "tracing")]
        tracing::trace!(?key, sequence, is_final, "write accepted");

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let guard = SettleGuard {
            // Jobs sit in the worker's inbox, which the registry owns through
            // the sender, so they must not keep the registry alive.
            registry: Arc::downgrade(&self.inner),
            key,
            epoch: state.epoch,
            sequence,
            is_final,
            settle: Some(settle_tx),
        };

        let job: Job = async move {
            let outcome = match AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => Ok(SubmissionResult {
                    sequence_number: sequence,
                    skipped: false,
                }),
                Ok(Err(err)) => Err(Error::Task(err)),
                Err(_) => Err(Error::Panicked),
            };

            #[cfg(feature = "tracing")]
            {
                if outcome.is_err() {
                    tracing::warn!(key = ?guard.key, sequence, "write task failed");
                }
            }

            drop(guard);
            let _ = outcome_tx.send(outcome);
        }
        .boxed();

        if let Err(rejected) = state.jobs.unbounded_send(job) {
            // Dropping the job settles the write through its guard, which
            // takes the registry lock.
            drop(queues);
            #[cfg(feature = "tracing")]
            tracing::warn!(sequence, "queue worker unavailable, write dropped");
            drop(rejected);
        }

        Submission::accepted(sequence, outcome_rx)
    }
}

impl<K, S> Inner<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    fn state_for<'a>(&self, queues: &'a mut HashMap<K, QueueState>, key: &K) -> &'a mut QueueState {
        queues
            .entry(key.clone())
            .or_insert_with(|| self.open_queue(key))
    }

    fn open_queue(&self, key: &K) -> QueueState {
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
        let (jobs, inbox) = mpsc::unbounded();
        self.spawner
            .spawn_worker(drive_queue(key.clone(), epoch, inbox).boxed());
        QueueState::new(epoch, jobs)
    }

    /// Applies a settled write to its key, evicting the key if that drained
    /// it. Completions from an evicted incarnation of the key are ignored.
    fn complete(&self, key: &K, epoch: u64, sequence: u64, is_final: bool) {
        let mut queues = lock(&self.queues);
        let Some(state) = queues.get_mut(key) else {
            return;
        };
        if state.epoch != epoch {
            return;
        }
        state.settle(sequence, is_final);
        Self::evict_if_drained(&mut queues, key);
    }

    fn evict_if_idle(&self, key: &K) {
        Self::evict_if_drained(&mut lock(&self.queues), key);
    }

    fn evict_if_drained(queues: &mut HashMap<K, QueueState>, key: &K) {
        if queues.get(key).is_some_and(QueueState::is_drained) {
            queues.remove(key);
            #[cfg(feature = "tracing")]
            tracing::debug!(?key, "key drained, state evicted");
        }
    }
}

/// Settles one write when dropped.
///
/// A job normally drops its guard right after its task finishes. When the
/// key's worker is torn down with jobs still queued (or a job is rejected by
/// a worker that is already gone), the guard is dropped with the job, so the
/// write still settles and the key can drain.
struct SettleGuard<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    registry: Weak<Inner<K, S>>,
    key: K,
    epoch: u64,
    sequence: u64,
    is_final: bool,
    settle: Option<oneshot::Sender<()>>,
}

impl<K, S> Drop for SettleGuard<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.complete(&self.key, self.epoch, self.sequence, self.is_final);
        }
        if let Some(settle) = self.settle.take() {
            let _ = settle.send(());
        }
    }
}

/// Worker loop for one incarnation of a key.
///
/// Runs queued writes one at a time in arrival order and exits once the
/// registry drops the inbox sender and the inbox is empty.
async fn drive_queue<K: fmt::Debug>(_key: K, _epoch: u64, mut inbox: UnboundedReceiver<Job>) {
    #[cfg(feature = "tracing")]
    tracing::trace!(key = ?_key, epoch = _epoch, "queue worker started");

    while let Some(job) = inbox.next().await {
        job.await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(key = ?_key, epoch = _epoch, "queue worker stopped");
}
