use futures::{
    channel::mpsc::UnboundedSender,
    future::{BoxFuture, Shared},
};
use std::collections::BTreeMap;

/// Settle signal for one submission.
///
/// Resolves once the submission's task has finished, whatever its outcome.
/// It never carries the task's error, so chaining on it never stalls.
pub(crate) type Settle = Shared<BoxFuture<'static, ()>>;

/// A write wrapped with its bookkeeping, ready to be driven by a key worker.
pub(crate) type Job = BoxFuture<'static, ()>;

/// Per-key bookkeeping held by the registry.
pub(crate) struct QueueState {
    /// Identifies this incarnation of the key. A key that is evicted and
    /// submitted to again gets a fresh epoch.
    pub(crate) epoch: u64,
    /// Ordered inbox of the key's worker.
    pub(crate) jobs: UnboundedSender<Job>,
    /// Settle signal of the most recently accepted submission.
    pub(crate) tail: Option<Settle>,
    pub(crate) next_sequence: u64,
    pub(crate) pending: BTreeMap<u64, Settle>,
    /// `None` until the first task settles.
    pub(crate) last_completed: Option<u64>,
    /// Known once the final submission has settled.
    pub(crate) final_sequence: Option<u64>,
    pub(crate) closed: bool,
}

/// What a waiter has to suspend on, captured when the wait is issued.
pub(crate) enum WaitPlan {
    /// Nothing to wait for.
    Settled,
    /// Everything accepted so far; the tail settles after all of it.
    Tail(Settle),
    /// The specific submissions between the completion watermark and the
    /// target.
    Pending(Vec<Settle>),
}

impl QueueState {
    pub(crate) fn new(epoch: u64, jobs: UnboundedSender<Job>) -> Self {
        Self {
            epoch,
            jobs,
            tail: None,
            next_sequence: 0,
            pending: BTreeMap::new(),
            last_completed: None,
            final_sequence: None,
            closed: false,
        }
    }

    /// Sequence number reported to a submission that arrives after closing.
    pub(crate) fn skipped_sequence(&self) -> u64 {
        self.final_sequence
            .unwrap_or_else(|| self.next_sequence.saturating_sub(1))
    }

    /// Records that the task for `sequence` has settled.
    pub(crate) fn settle(&mut self, sequence: u64, is_final: bool) {
        self.pending.remove(&sequence);
        self.last_completed = Some(
            self.last_completed
                .map_or(sequence, |last| last.max(sequence)),
        );
        if is_final {
            self.final_sequence = Some(sequence);
        }
    }

    pub(crate) fn is_settled_through(&self, sequence: u64) -> bool {
        self.last_completed.is_some_and(|last| last >= sequence)
    }

    /// Closed, final submission settled, nothing in flight.
    pub(crate) fn is_drained(&self) -> bool {
        self.closed
            && self.pending.is_empty()
            && self
                .final_sequence
                .is_some_and(|last| self.is_settled_through(last))
    }

    pub(crate) fn wait_plan(&self, up_to: Option<u64>) -> WaitPlan {
        let Some(target) = up_to.or(self.final_sequence) else {
            return self.tail_plan();
        };
        // Nothing has been assigned yet, so there is nothing to wait for.
        let Some(highest) = self.next_sequence.checked_sub(1) else {
            return WaitPlan::Settled;
        };
        let target = target.min(highest);
        if self.is_settled_through(target) {
            return WaitPlan::Settled;
        }

        let first = self.last_completed.map_or(0, |last| last + 1);
        let gathered: Vec<Settle> = self
            .pending
            .range(first..=target)
            .map(|(_, settle)| settle.clone())
            .collect();
        if gathered.is_empty() {
            self.tail_plan()
        } else {
            WaitPlan::Pending(gathered)
        }
    }

    fn tail_plan(&self) -> WaitPlan {
        self.tail
            .clone()
            .map_or(WaitPlan::Settled, WaitPlan::Tail)
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            next_sequence: self.next_sequence,
            last_completed: self.last_completed,
            final_sequence: self.final_sequence,
            closed: self.closed,
            pending: self.pending.len(),
        }
    }
}

/// A point-in-time view of one key's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueSnapshot {
    /// Sequence number the next accepted submission will receive.
    pub next_sequence: u64,
    /// Highest sequence whose task has settled, if any has.
    pub last_completed: Option<u64>,
    /// Sequence of the final submission, once it has settled.
    pub final_sequence: Option<u64>,
    /// Whether a final submission has been accepted.
    pub closed: bool,
    /// Number of accepted submissions that have not settled yet.
    pub pending: usize,
}
