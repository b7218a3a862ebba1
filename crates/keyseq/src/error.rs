use core::convert::Infallible;

/// A result type whose error defaults to an [`Error`] that carries no task
/// failure.
///
/// Waits and rejected submissions never involve a task's own error, so most
/// APIs that are not tied to a specific write use this default.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `keyseq` can surface.
///
/// The generic parameter `E` is the error type of the caller-supplied write
/// task. It only appears in [`Error::Task`], which passes the task's failure
/// through unmodified. APIs that never run a task use the default
/// [`Infallible`] parameter.
///
/// A submission that arrives after its key was finalized is **not** an error:
/// it resolves to `Ok` with [`SubmissionResult::skipped`] set.
///
/// [`SubmissionResult::skipped`]: crate::SubmissionResult::skipped
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E = Infallible> {
    /// The write task returned an error.
    ///
    /// Only the submission that owns the task observes this. Later writes for
    /// the same key still run.
    #[error("write task failed: {0}")]
    Task(E),

    /// The write task panicked.
    ///
    /// The panic is caught by the key's worker and isolated to the owning
    /// submission, exactly like [`Error::Task`].
    #[error("write task panicked")]
    Panicked,

    /// The key's worker was dropped before the write settled.
    ///
    /// This only happens when the async runtime that hosts the worker shuts
    /// down with writes still queued.
    #[error("queue worker stopped before the write settled")]
    WorkerGone,

    /// [`WriteCoordinator::try_submit`] refused the write because the key
    /// already has `limit` unsettled submissions.
    ///
    /// No sequence number was consumed and the task was not queued.
    ///
    /// [`WriteCoordinator::try_submit`]: crate::WriteCoordinator::try_submit
    #[error("key already has {limit} unsettled writes")]
    Saturated { limit: usize },

    /// A bounded wait reached its deadline before the target settled.
    ///
    /// Queued writes are unaffected and keep running.
    #[error("timed out waiting for writes to settle")]
    TimedOut,
}

impl<E> Error<E> {
    /// Returns `true` if the write task itself failed or panicked.
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::Task(_) | Self::Panicked)
    }

    /// Consumes the error and returns the task's own error, if there is one.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_round_trips_unmodified() {
        let err: Error<&str> = Error::Task("disk full");
        assert!(err.is_task_failure());
        assert_eq!(err.to_string(), "write task failed: disk full");
        assert_eq!(err.into_task_error(), Some("disk full"));
    }

    #[test]
    fn non_task_errors_carry_no_task_error() {
        let err: Error<&str> = Error::Saturated { limit: 4 };
        assert!(!err.is_task_failure());
        assert_eq!(err.to_string(), "key already has 4 unsettled writes");
        assert_eq!(err.into_task_error(), None);

        assert!(Error::<&str>::Panicked.is_task_failure());
        assert_eq!(Error::<Infallible>::TimedOut.into_task_error(), None);
    }
}
