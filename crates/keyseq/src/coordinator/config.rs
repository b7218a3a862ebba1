use core::num::NonZeroUsize;

/// Tuning knobs for a [`WriteCoordinator`].
///
/// The defaults reproduce the unbounded behavior: every submission is
/// accepted and queued no matter how far behind the key's worker is.
///
/// [`WriteCoordinator`]: crate::WriteCoordinator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CoordinatorConfig {
    /// Upper bound on unsettled submissions per key, enforced only by
    /// [`WriteCoordinator::try_submit`]. `None` means unbounded.
    ///
    /// [`WriteCoordinator::try_submit`]: crate::WriteCoordinator::try_submit
    pub max_pending_per_key: Option<NonZeroUsize>,
}

impl CoordinatorConfig {
    /// Creates an unbounded configuration.
    pub const fn new() -> Self {
        Self {
            max_pending_per_key: None,
        }
    }

    /// Bounds the number of unsettled submissions `try_submit` admits per key.
    #[must_use]
    pub const fn with_max_pending_per_key(mut self, limit: NonZeroUsize) -> Self {
        self.max_pending_per_key = Some(limit);
        self
    }
}
