use crate::{Error, Result, SleepProvider, Spawner, WriteCoordinator};
use core::{fmt, hash::Hash, pin::pin, time::Duration};
use futures::future::{Either, select};

/// Extension trait for bounding how long a caller waits on a key.
///
/// [`WriteCoordinator::wait_until`] has no deadline of its own: a write that
/// never finishes stalls every wait that covers it. This trait races the wait
/// against a sleep from the chosen [`SleepProvider`].
pub trait WriteCoordinatorAsyncExt<K> {
    /// Waits like [`WriteCoordinator::wait_until`], giving up after `timeout`.
    ///
    /// What the wait covers is captured when this method is called. Timing
    /// out leaves all queued writes untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if `timeout` elapses before the covered
    /// writes have settled.
    fn wait_until_timeout<P>(
        &self,
        key: &K,
        up_to: Option<u64>,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>>
    where
        P: SleepProvider;
}

impl<K, S> WriteCoordinatorAsyncExt<K> for WriteCoordinator<K, S>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    S: Spawner,
{
    fn wait_until_timeout<P>(
        &self,
        key: &K,
        up_to: Option<u64>,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>>
    where
        P: SleepProvider,
    {
        let wait = self.wait_until(key, up_to);
        async move {
            let sleep = pin!(P::sleep_for(timeout));
            match select(wait, sleep).await {
                Either::Left(((), _)) => Ok(()),
                Either::Right(((), _)) => Err(Error::TimedOut),
            }
        }
    }
}
