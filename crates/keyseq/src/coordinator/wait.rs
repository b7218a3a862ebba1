use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::{FutureExt, future::BoxFuture};

/// Future returned by [`WriteCoordinator::wait_until`].
///
/// Resolves once every write it covers has settled, successfully or not.
/// What it covers is fixed when `wait_until` is called, not when the future
/// is first polled.
///
/// [`WriteCoordinator::wait_until`]: crate::WriteCoordinator::wait_until
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct WaitUntil {
    inner: Option<BoxFuture<'static, ()>>,
}

impl WaitUntil {
    pub(crate) const fn ready() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(inner: BoxFuture<'static, ()>) -> Self {
        Self { inner: Some(inner) }
    }
}

impl Future for WaitUntil {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.inner.as_mut() {
            None => Poll::Ready(()),
            Some(inner) => inner.poll_unpin(cx),
        }
    }
}
