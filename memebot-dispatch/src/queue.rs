//! Ordered storage for pending envelopes.

use std::collections::VecDeque;

use crate::envelope::{Envelope, PositionUpdate};
use crate::types::{OrderingMode, QueuePosition};

/// Pending envelopes in the order they will execute.
///
/// Callers are expected to hold the dispatcher lock around every method so
/// that each mutation and its renumbering form a single atomic step. The
/// renumbering is returned as [`PositionUpdate`]s for the caller to deliver
/// once the lock is released.
#[derive(Debug)]
pub(crate) struct DispatchQueue {
    ordering: OrderingMode,
    pending: VecDeque<Envelope>,
}

impl DispatchQueue {
    pub(crate) fn new(ordering: OrderingMode) -> Self {
        Self {
            ordering,
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn ordering(&self) -> OrderingMode {
        self.ordering
    }

    /// Insert an envelope according to the ordering mode. Returns the new
    /// envelope's position and the rank of every pending envelope.
    pub(crate) fn insert(&mut self, envelope: Envelope) -> (QueuePosition, Vec<PositionUpdate>) {
        let index = match self.ordering {
            OrderingMode::Fifo => self.pending.len(),
            // First strictly lower priority; equal priorities keep submission order.
            OrderingMode::Priority => self
                .pending
                .iter()
                .position(|queued| queued.priority < envelope.priority)
                .unwrap_or(self.pending.len()),
        };
        self.pending.insert(index, envelope);
        let position = QueuePosition {
            position: index + 1,
            total: self.pending.len(),
        };
        (position, self.positions())
    }

    /// Pop the next envelope to execute and renumber the rest.
    pub(crate) fn remove_front(&mut self) -> Option<(Envelope, Vec<PositionUpdate>)> {
        let envelope = self.pending.pop_front()?;
        Some((envelope, self.positions()))
    }

    /// Remove every pending envelope, front first.
    pub(crate) fn drain_all(&mut self) -> Vec<Envelope> {
        self.pending.drain(..).collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn positions(&self) -> Vec<PositionUpdate> {
        let total = self.pending.len();
        self.pending
            .iter()
            .enumerate()
            .filter_map(|(index, envelope)| {
                envelope.position_update(QueuePosition {
                    position: index + 1,
                    total,
                })
            })
            .collect()
    }
}
