//! # Task Registry
//!
//! Maps each plan task to its handle and tracks where it is in its
//! lifecycle. Handles are only ever obtained through here, so a task that
//! has been deleted can no longer be named.

use crate::error::OrchestrationError;
use crate::plan::{TaskName, TASK_COUNT};
use crate::task::TaskHandle;

/// Lifecycle of a plan task as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotCreated,
    /// Ready or running; the scheduler decides which.
    Created,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: Option<TaskHandle>,
    lifecycle: Lifecycle,
}

impl Entry {
    const VACANT: Self = Self {
        handle: None,
        lifecycle: Lifecycle::NotCreated,
    };
}

#[derive(Debug, Clone)]
pub struct Registry {
    entries: [Entry; TASK_COUNT],
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            entries: [Entry::VACANT; TASK_COUNT],
        }
    }

    #[inline]
    pub fn lifecycle(&self, name: TaskName) -> Lifecycle {
        self.entries[name.index()].lifecycle
    }

    /// Handle of a live task.
    pub fn handle(&self, name: TaskName) -> Result<TaskHandle, OrchestrationError> {
        let entry = &self.entries[name.index()];
        match (entry.lifecycle, entry.handle) {
            (Lifecycle::Deleted, _) => Err(OrchestrationError::UseAfterDelete(name)),
            (_, Some(handle)) => Ok(handle),
            (_, None) => Err(OrchestrationError::NotCreated(name)),
        }
    }

    pub fn record_created(
        &mut self,
        name: TaskName,
        handle: TaskHandle,
    ) -> Result<(), OrchestrationError> {
        let entry = &mut self.entries[name.index()];
        if entry.lifecycle != Lifecycle::NotCreated {
            return Err(OrchestrationError::AlreadyCreated(name));
        }
        *entry = Entry {
            handle: Some(handle),
            lifecycle: Lifecycle::Created,
        };
        Ok(())
    }

    pub fn record_suspended(&mut self, name: TaskName) {
        self.transition(name, Lifecycle::Suspended);
    }

    /// Only a suspended task moves; resuming anything else is a no-op.
    pub fn record_resumed(&mut self, name: TaskName) {
        if self.lifecycle(name) == Lifecycle::Suspended {
            self.transition(name, Lifecycle::Created);
        }
    }

    /// Drops the handle for good.
    pub fn record_deleted(&mut self, name: TaskName) {
        let entry = &mut self.entries[name.index()];
        entry.handle = None;
        entry.lifecycle = Lifecycle::Deleted;
    }

    /// Tasks created and not yet deleted.
    pub fn alive(&self) -> impl Iterator<Item = TaskName> + '_ {
        TaskName::ALL.into_iter().filter(|&name| {
            matches!(self.lifecycle(name), Lifecycle::Created | Lifecycle::Suspended)
        })
    }

    fn transition(&mut self, name: TaskName, to: Lifecycle) {
        let entry = &mut self.entries[name.index()];
        if matches!(entry.lifecycle, Lifecycle::Created | Lifecycle::Suspended) {
            entry.lifecycle = to;
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
