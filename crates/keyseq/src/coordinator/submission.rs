use crate::Error;
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::{FutureExt, channel::oneshot};

/// Outcome of a submission that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubmissionResult {
    /// Position of the submission within its key's ordering.
    ///
    /// For a skipped submission this is the sequence of the key's final
    /// submission; no new number is consumed.
    pub sequence_number: u64,
    /// `true` if the key was already closed and the task never ran.
    pub skipped: bool,
}

pub(crate) type Outcome<E> = Result<SubmissionResult, Error<E>>;

/// Handle to a write accepted (or skipped) by a [`WriteCoordinator`].
///
/// The sequence number is assigned when the write is submitted, so
/// [`Submission::sequence_number`] is available before the handle is ever
/// polled. Awaiting the handle yields the write's outcome:
///
/// - `Ok(SubmissionResult { skipped: false, .. })`: the task ran and
///   succeeded.
/// - `Ok(SubmissionResult { skipped: true, .. })`: the key was closed; the
///   task was never invoked.
/// - `Err(Error::Task(e))`: the task ran and returned `e`.
///
/// Dropping the handle does not cancel the write.
///
/// [`WriteCoordinator`]: crate::WriteCoordinator
#[derive(Debug)]
pub struct Submission<E> {
    sequence_number: u64,
    outcome: Option<oneshot::Receiver<Outcome<E>>>,
}

impl<E> Submission<E> {
    pub(crate) const fn accepted(
        sequence_number: u64,
        outcome: oneshot::Receiver<Outcome<E>>,
    ) -> Self {
        Self {
            sequence_number,
            outcome: Some(outcome),
        }
    }

    pub(crate) const fn skipped(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            outcome: None,
        }
    }

    /// The sequence number assigned to this submission.
    pub const fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Returns `true` if the key was closed when this write was submitted.
    pub const fn is_skipped(&self) -> bool {
        self.outcome.is_none()
    }
}

impl<E> Future for Submission<E> {
    type Output = Outcome<E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let sequence_number = self.sequence_number;
        match self.outcome.as_mut() {
            None => Poll::Ready(Ok(SubmissionResult {
                sequence_number,
                skipped: true,
            })),
            // A cancelled receiver means the worker was dropped with the
            // write still queued.
            Some(outcome) => outcome
                .poll_unpin(cx)
                .map(|received| received.unwrap_or(Err(Error::WorkerGone))),
        }
    }
}
