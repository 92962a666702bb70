//
// execution_queue.rs
//
// Copyright (C) 2024 Posit Software, PBC. All rights reserved.
//
//

use std::collections::VecDeque;

use crate::execution_session::task::Task;

/// The tasks waiting on the execution engine. At most one task is active
/// (sent to the engine and awaiting its response) at a time; the rest wait
/// in first-in, first-out order.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    pub active: Option<Task>,
    pub pending: VecDeque<Task>,
}

impl ExecutionQueue {
    /// Create a new execution queue
    pub fn new() -> Self {
        ExecutionQueue {
            active: None,
            pending: VecDeque::new(),
        }
    }

    /// Clear the execution queue, dropping the active and pending tasks.
    /// Whoever awaits their outcomes sees them abandoned.
    pub fn clear(&mut self) -> usize {
        let mut discarded = self.pending.len();
        if let Some(active) = self.active.take() {
            log::debug!("Abandoning active task {}", active.id);
            discarded += 1;
        }
        if !self.pending.is_empty() {
            log::debug!("Discarding {} pending tasks", self.pending.len());
        }
        self.pending.clear();
        discarded
    }

    /// Process a given task, either making it active immediately or queueing
    /// it for later.
    ///
    /// Returns true if the task became active, or false if it was queued.
    pub fn process_request(&mut self, task: Task) -> bool {
        match &self.active {
            None => {
                log::trace!(
                    "Running task {} ({}) immediately (no tasks are waiting)",
                    task.id,
                    task.request.action
                );
                self.active = Some(task);
                true
            }
            Some(active) => {
                log::debug!(
                    "Queueing task {} ({}) (active task is {}; there are {} pending tasks)",
                    task.id,
                    task.request.action,
                    active.id,
                    self.pending.len()
                );
                self.pending.push_back(task);
                false
            }
        }
    }

    /// Takes the active task out of the queue, e.g. to deliver its outcome.
    pub fn take_active(&mut self) -> Option<Task> {
        self.active.take()
    }

    /// Makes the oldest pending task active and returns it. Returns `None` if
    /// a task is already active or nothing is pending.
    pub fn next_request(&mut self) -> Option<&Task> {
        if self.active.is_some() {
            return None;
        }
        let task = self.pending.pop_front()?;
        log::debug!(
            "Running pending task {} ({} pending tasks remain)",
            task.id,
            self.pending.len()
        );
        self.active = Some(task);
        self.active.as_ref()
    }

    /// Whether no task is active or pending
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }
}
