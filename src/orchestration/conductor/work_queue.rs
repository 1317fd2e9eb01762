//! # Work Queue Bookkeeping
//!
//! Pending queue, locked identifiers and collision list for one conductor.
//! The three live behind a single mutex in the conductor so that every
//! transition between them is atomic. Invariants maintained here:
//!
//! - an identifier is in at most one of `pending` and `locked`
//! - a descriptor goes to `collisions` iff its identifier is pending or held
//! - `pending + locked + collisions` equals descriptors added minus those
//!   that reached a terminal outcome
//!
//! Clearing the queue cannot stop executions already running, so their
//! identifiers move from `locked` to `draining`. A draining identifier is
//! still held: new descriptors for it collide until the old execution ends.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use uuid::Uuid;

use crate::orchestration::descriptor::TaskDescriptor;

/// Where an added descriptor ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    Collision,
}

/// Result of asking the queue for work
#[derive(Debug)]
pub enum Dispatch {
    /// Descriptor removed from the queue and its identifier locked
    Ready(TaskDescriptor),
    /// Only delayed retries are pending; the earliest becomes ready then
    WaitUntil(Instant),
    /// Nothing dispatchable
    Idle,
}

#[derive(Debug)]
struct PendingEntry {
    descriptor: TaskDescriptor,
    not_before: Option<Instant>,
}

impl PendingEntry {
    fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    pending: VecDeque<PendingEntry>,
    /// Target ids present in `pending`
    pending_ids: HashSet<String>,
    /// target id -> id of the descriptor holding the lock
    locked: HashMap<String, Uuid>,
    /// Holders still running after their lock was cleared
    draining: HashMap<String, Uuid>,
    /// Duplicates in arrival order
    collisions: VecDeque<TaskDescriptor>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, descriptor: TaskDescriptor) -> Enqueued {
        let target_id = descriptor.target_id();
        if self.is_held(target_id) || self.is_pending(target_id) {
            self.collisions.push_back(descriptor);
            Enqueued::Collision
        } else {
            self.push_pending(descriptor, None, false);
            Enqueued::Queued
        }
    }

    /// Take the first ready descriptor and lock its identifier
    pub fn next_dispatch(&mut self, now: Instant) -> Dispatch {
        while let Some(position) = self.pending.iter().position(|e| e.is_ready(now)) {
            let Some(entry) = self.pending.remove(position) else {
                break;
            };
            let descriptor = entry.descriptor;
            self.pending_ids.remove(descriptor.target_id());
            if self.is_held(descriptor.target_id()) {
                // Lost the race for this identifier; wait for the holder to finish
                self.collisions.push_back(descriptor);
                continue;
            }
            self.locked
                .insert(descriptor.target_id().to_string(), descriptor.id());
            return Dispatch::Ready(descriptor);
        }

        self.pending
            .iter()
            .filter_map(|e| e.not_before)
            .min()
            .map_or(Dispatch::Idle, Dispatch::WaitUntil)
    }

    /// Terminal outcome for an in-flight descriptor: release its lock and
    /// promote the oldest collision for the same identifier to the queue front.
    /// Returns whether a collision was promoted.
    pub fn complete(&mut self, descriptor: &TaskDescriptor) -> bool {
        if !self.release(descriptor.target_id(), descriptor.id()) {
            return false;
        }
        self.promote_collision(descriptor.target_id())
    }

    /// Put an in-flight descriptor back in the queue, dispatchable at `not_before`.
    /// A descriptor cleared while running is dropped instead. Returns whether
    /// it was re-queued.
    pub fn retry(&mut self, descriptor: TaskDescriptor, not_before: Instant) -> bool {
        let target_id = descriptor.target_id();
        if self.draining.get(target_id) == Some(&descriptor.id()) {
            self.draining.remove(target_id);
            self.promote_collision(target_id);
            return false;
        }
        if !self.release(target_id, descriptor.id()) {
            return false;
        }
        self.push_pending(descriptor, Some(not_before), false);
        true
    }

    /// Release every lock (the holders were aborted), promoting collisions.
    /// Returns the released identifiers.
    pub fn release_all_locked(&mut self) -> Vec<String> {
        let mut released: Vec<String> = self.locked.drain().map(|(id, _)| id).collect();
        released.extend(self.draining.drain().map(|(id, _)| id));
        for target_id in &released {
            self.promote_collision(target_id);
        }
        released
    }

    /// Drop all pending descriptors, returning how many were dropped
    pub fn flush_pending(&mut self) -> usize {
        let flushed = self.pending.len();
        self.pending.clear();
        self.pending_ids.clear();
        flushed
    }

    /// Forget all queued and waiting work. Executions still running keep
    /// their identifiers held until they end.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_ids.clear();
        self.collisions.clear();
        self.draining.extend(self.locked.drain());
    }

    /// Forget everything, including running holders. Only valid once no
    /// worker is running.
    pub fn reset(&mut self) {
        self.clear();
        self.draining.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn locked_len(&self) -> usize {
        self.locked.len()
    }

    pub fn collisions_len(&self) -> usize {
        self.collisions.len()
    }

    /// Cleared holders whose execution has not ended yet
    pub fn draining_len(&self) -> usize {
        self.draining.len()
    }

    /// Whether an execution for the identifier is running, locked or cleared
    pub fn is_held(&self, target_id: &str) -> bool {
        self.locked.contains_key(target_id) || self.draining.contains_key(target_id)
    }

    pub fn is_pending(&self, target_id: &str) -> bool {
        self.pending_ids.contains(target_id)
    }

    fn push_pending(
        &mut self,
        descriptor: TaskDescriptor,
        not_before: Option<Instant>,
        front: bool,
    ) {
        self.pending_ids.insert(descriptor.target_id().to_string());
        let entry = PendingEntry {
            descriptor,
            not_before,
        };
        if front {
            self.pending.push_front(entry);
        } else {
            self.pending.push_back(entry);
        }
    }

    fn release(&mut self, target_id: &str, descriptor_id: Uuid) -> bool {
        for holders in [&mut self.locked, &mut self.draining] {
            if holders.get(target_id) == Some(&descriptor_id) {
                holders.remove(target_id);
                return true;
            }
        }
        false
    }

    fn promote_collision(&mut self, target_id: &str) -> bool {
        if self.is_pending(target_id) || self.is_held(target_id) {
            return false;
        }
        let Some(position) = self
            .collisions
            .iter()
            .position(|d| d.target_id() == target_id)
        else {
            return false;
        };
        match self.collisions.remove(position) {
            Some(descriptor) => {
                self.push_pending(descriptor, None, true);
                true
            }
            None => false,
        }
    }
}
