use crate::{CoordinatorConfig, Result, SleepProvider, Spawner, WriteCoordinator};
use core::{fmt, hash::Hash, time::Duration};
use futures::future::BoxFuture;
use tokio::runtime::Handle;

/// A [`WriteCoordinator`] whose key workers run on a Tokio runtime.
pub type TokioWriteCoordinator<K> = WriteCoordinator<K, TokioSpawner>;

/// An implementation of [`Spawner`] backed by a Tokio runtime [`Handle`].
///
/// The handle is captured up front, so the coordinator can accept writes from
/// threads that are not themselves inside the runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Spawns key workers on the runtime behind `handle`.
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawns key workers on the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a Tokio runtime, like
    /// [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl From<Handle> for TokioSpawner {
    fn from(handle: Handle) -> Self {
        Self::new(handle)
    }
}

impl Spawner for TokioSpawner {
    fn spawn_worker(&self, worker: BoxFuture<'static, ()>) {
        // Workers exit on their own once their key drains; the join handle
        // is not needed.
        drop(self.handle.spawn(worker));
    }
}

impl<K> WriteCoordinator<K, TokioSpawner>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Creates an unbounded coordinator on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a Tokio runtime.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_spawner(TokioSpawner::current())
    }

    /// Creates a coordinator with explicit configuration on the current Tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside the context of a Tokio runtime.
    pub fn with_tokio_config(config: CoordinatorConfig) -> Self {
        Self::with_config(TokioSpawner::current(), config)
    }
}

/// Extension trait for bounded waits using the
/// [`tokio`](https://docs.rs/tokio) timer.
///
/// This trait provides a convenience method backed by [`TokioSleep`],
/// allowing you to call `.wait_until_timeout()` without specifying the sleep
/// strategy manually.
pub trait WriteCoordinatorTokioExt<K> {
    /// Waits like [`WriteCoordinator::wait_until`], giving up after `timeout`.
    ///
    /// Internally delegates to
    /// [`WriteCoordinatorAsyncExt::wait_until_timeout`] with [`TokioSleep`]
    /// as the sleep strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if `timeout` elapses first.
    ///
    /// [`WriteCoordinatorAsyncExt::wait_until_timeout`]:
    ///     crate::WriteCoordinatorAsyncExt::wait_until_timeout
    /// [`Error::TimedOut`]: crate::Error::TimedOut
    fn wait_until_timeout(
        &self,
        key: &K,
        up_to: Option<u64>,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>>;
}

impl<K, S> WriteCoordinatorTokioExt<K> for WriteCoordinator<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    fn wait_until_timeout(
        &self,
        key: &K,
        up_to: Option<u64>,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> {
        <Self as crate::WriteCoordinatorAsyncExt<K>>::wait_until_timeout::<TokioSleep>(
            self, key, up_to, timeout,
        )
    }
}

/// [`SleepProvider`] backed by Tokio's timer; used by
/// `WriteCoordinatorTokioExt`.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use futures::FutureExt;
    use std::io;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn bounded_wait_times_out_on_stalled_write() {
        let coordinator = TokioWriteCoordinator::new();
        let (release, gate) = oneshot::channel::<()>();

        let stalled = coordinator.submit("doc", move || async move {
            let _ = gate.await;
            Ok::<_, io::Error>(())
        });

        let waited = coordinator
            .wait_until_timeout(&"doc", None, Duration::from_millis(20))
            .await;
        assert_eq!(waited, Err(Error::TimedOut));

        // Timing out must not disturb the queued write.
        release.send(()).unwrap();
        assert!(!stalled.await.unwrap().skipped);
        coordinator
            .wait_until_timeout(&"doc", None, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bounded_wait_on_unknown_key_is_immediate() {
        let coordinator = TokioWriteCoordinator::<&str>::new();
        coordinator
            .wait_until_timeout(&"ghost", Some(3), Duration::ZERO)
            .await
            .unwrap();
    }

    #[test]
    fn spawner_accepts_writes_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .unwrap();
        let spawner = TokioSpawner::from(runtime.handle().clone());
        let coordinator = WriteCoordinator::with_spawner(spawner);

        let submission = coordinator.submit_final(7_u32, || async { Ok::<_, io::Error>(()) });
        assert_eq!(submission.sequence_number(), 0);
        assert!(coordinator.is_closed(&7));

        let result = runtime.block_on(submission).unwrap();
        assert_eq!(result.sequence_number, 0);
        runtime.block_on(coordinator.wait_until(&7, None));
        assert_eq!(coordinator.active_keys(), 0);
    }

    #[test]
    fn writes_queued_when_the_runtime_shuts_down_still_drain() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let spawner = TokioSpawner::from(runtime.handle().clone());
        let coordinator = WriteCoordinator::with_spawner(spawner);

        let first = coordinator.submit("doc", || async { Ok::<_, io::Error>(()) });
        let last = coordinator.submit_final("doc", || async { Ok::<_, io::Error>(()) });
        assert!(coordinator.is_closed(&"doc"));

        // The worker was spawned but never polled; shutting down drops it
        // together with both queued writes.
        drop(runtime);

        assert!(matches!(first.now_or_never(), Some(Err(Error::WorkerGone))));
        assert!(matches!(last.now_or_never(), Some(Err(Error::WorkerGone))));
        assert_eq!(coordinator.active_keys(), 0);
        assert!(!coordinator.is_closed(&"doc"));
        assert_eq!(coordinator.wait_until(&"doc", None).now_or_never(), Some(()));

        let fresh = coordinator.submit("doc", || async { Ok::<_, io::Error>(()) });
        assert!(!fresh.is_skipped());
        assert_eq!(fresh.sequence_number(), 0);
    }
}
