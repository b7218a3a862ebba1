use futures::future::BoxFuture;

/// Starts the background worker that drains a key's write queue.
///
/// A [`WriteCoordinator`] calls this once per key incarnation, while it holds
/// its registry lock, so implementations must hand the future off to an
/// executor and return without blocking or polling it inline.
///
/// The worker future completes on its own once the key is evicted or the
/// coordinator is dropped.
///
/// [`WriteCoordinator`]: crate::WriteCoordinator
pub trait Spawner: Send + Sync + 'static {
    fn spawn_worker(&self, worker: BoxFuture<'static, ()>);
}
