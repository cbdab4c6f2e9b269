//! Plan scheduling and the host contract.
//!
//! This module is responsible for:
//! * the [`SimulationHost`] interface the group store calls into (clock,
//!   plan scheduling, event emission),
//! * the deferred structural commands the store schedules for itself,
//! * a time-ordered plan queue a host can execute them from.
//!
//! ## Ordering model
//!
//! Plans execute in ascending time. Plans scheduled for the same time run in
//! the order they were scheduled. A plan scheduled "now" from inside a
//! running plan therefore runs after the current plan finishes, and after
//! the host has delivered the events the current plan emitted.
//!
//! ## Deferred commands
//!
//! Group removal and person cleanup are not applied when requested. The
//! store emits the imminent-removal event, then schedules a
//! [`GroupCommand`] at the current time. Observers of the event still see the
//! group intact; the structural change happens when the host runs the
//! command.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::engine::events::GroupEvent;
use crate::engine::types::{GroupId, PersonId, Time};


/// Structural work the store defers to a later plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupCommand {
    /// Drop the group's properties, memberships and type entry.
    RemoveGroup(GroupId),
    /// Drop every membership of a person being removed.
    RemovePersonFromGroups(PersonId),
}

/// Services the group store requires from its host.
pub trait SimulationHost {
    /// Current simulation time.
    fn current_time(&self) -> Time;

    /// Runs `command` against the store at `time`.
    fn schedule(&mut self, time: Time, command: GroupCommand);

    /// Queues `event` for delivery to observers.
    fn emit(&mut self, event: GroupEvent);
}

/// A plan waiting in the queue.
#[derive(Debug)]
struct Scheduled<P> {
    time: Time,
    sequence: u64,
    payload: P,
}

impl<P> PartialEq for Scheduled<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for Scheduled<P> {}

impl<P> PartialOrd for Scheduled<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Scheduled<P> {
    // Reversed: `BinaryHeap` is a max-heap and the earliest plan must surface.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-queue of plans ordered by `(time, scheduling order)`.
#[derive(Debug)]
pub struct PlanQueue<P> {
    heap: BinaryHeap<Scheduled<P>>,
    sequence: u64,
}

impl<P> Default for PlanQueue<P> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new(), sequence: 0 }
    }
}

impl<P> PlanQueue<P> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, time: Time, payload: P) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.heap.push(Scheduled { time, sequence, payload });
    }

    /// Time of the next plan.
    pub fn next_time(&self) -> Option<Time> {
        self.heap.peek().map(|s| s.time)
    }

    /// Removes the next plan if it is due at or before `until`.
    pub fn pop_due(&mut self, until: Time) -> Option<(Time, P)> {
        if self.next_time()? > until {
            return None;
        }
        self.heap.pop().map(|s| (s.time, s.payload))
    }

    /// Removes the next plan regardless of time.
    pub fn pop(&mut self) -> Option<(Time, P)> {
        self.heap.pop().map(|s| (s.time, s.payload))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
