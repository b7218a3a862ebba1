use core::time::Duration;

/// Supplies the timer a bounded wait races against.
///
/// [`WriteCoordinator::wait_until`] never times out by itself, so bounded
/// waits pick a runtime's timer through this trait (see `TokioSleep` and
/// `SmolSleep`).
///
/// [`WriteCoordinator::wait_until`]: crate::WriteCoordinator::wait_until
pub trait SleepProvider {
    /// Must be `Send` so bounded waits can run on multi-threaded executors.
    type Sleep: Future<Output = ()> + Send;

    /// A future that completes once `deadline` has elapsed.
    fn sleep_for(deadline: Duration) -> Self::Sleep;
}
