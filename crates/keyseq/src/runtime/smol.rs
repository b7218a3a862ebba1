use crate::{Result, SleepProvider, Spawner, WriteCoordinator};
use core::{fmt, hash::Hash, time::Duration};
use futures::future::BoxFuture;
use pin_project_lite::pin_project;
use smol::Timer;
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// A [`WriteCoordinator`] whose key workers run on smol's global executor.
pub type SmolWriteCoordinator<K> = WriteCoordinator<K, SmolSpawner>;

/// An implementation of [`Spawner`] using [`smol::spawn`].
///
/// Workers run on smol's global executor and are detached; they finish on
/// their own once their key drains.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmolSpawner;

impl Spawner for SmolSpawner {
    fn spawn_worker(&self, worker: BoxFuture<'static, ()>) {
        smol::spawn(worker).detach();
    }
}

/// Extension trait for bounded waits using the
/// [`smol`](https://docs.rs/smol) timer.
///
/// This trait provides a convenience method backed by [`SmolSleep`],
/// allowing you to call `.wait_until_timeout()` without specifying the sleep
/// strategy manually.
pub trait WriteCoordinatorSmolExt<K> {
    /// Waits like [`WriteCoordinator::wait_until`], giving up after `timeout`.
    ///
    /// Internally delegates to
    /// [`WriteCoordinatorAsyncExt::wait_until_timeout`] with [`SmolSleep`] as
    /// the sleep strategy.
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

impl<K, S> WriteCoordinatorSmolExt<K> for WriteCoordinator<K, S>
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
        <Self as crate::WriteCoordinatorAsyncExt<K>>::wait_until_timeout::<SmolSleep>(
            self, key, up_to, timeout,
        )
    }
}

/// [`SleepProvider`] backed by Smol's timer; used by
/// `WriteCoordinatorSmolExt`.
pub struct SmolSleep;
impl SleepProvider for SmolSleep {
    type Sleep = SmolSleepFuture;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        SmolSleepFuture {
            timer: Timer::after(dur),
        }
    }
}

pin_project! {
    /// Internal future returned by [`SmolSleep::sleep_for`].
    ///
    /// This type wraps a [`smol::Timer`] and implements [`Future`] with `Output
    /// = ()`, discarding the timer's `Instant` result.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct SmolSleepFuture {
        #[pin]
        timer: Timer,
    }
}

impl Future for SmolSleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.project().timer.poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}
