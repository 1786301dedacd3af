//! # Errors
//!
//! Nothing in Baton is retried or recovered in place. Kernel and
//! orchestration errors bubble up with `?` until they reach a task runner
//! or `main`, which turn them into a [`Fatal`] halt.

use core::fmt;

use crate::plan::{PlanError, TaskName};
use crate::task::{Priority, TaskHandle};

/// Failures reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Every task slot is taken (stack / control-block exhaustion).
    NoFreeSlot,
    /// Priority above `MAX_PRIORITY`.
    InvalidPriority(Priority),
    /// The handle's task has been deleted.
    StaleHandle(TaskHandle),
    /// A self-targeted operation was issued with no task running.
    NoCurrentTask,
    /// `start` was called with nothing to run.
    NoTasks,
    /// `start` was called twice.
    AlreadyStarted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NoFreeSlot => write!(f, "no free task slot"),
            KernelError::InvalidPriority(p) => write!(f, "priority {} out of range", p),
            KernelError::StaleHandle(h) => {
                write!(f, "stale handle (slot {}, generation {})", h.slot(), h.generation())
            }
            KernelError::NoCurrentTask => write!(f, "no task is running"),
            KernelError::NoTasks => write!(f, "no task to start"),
            KernelError::AlreadyStarted => write!(f, "scheduler already started"),
        }
    }
}

/// Failures while driving the handoff plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationError {
    /// The plan failed static validation.
    InvalidPlan(PlanError),
    /// A kernel operation on `task` failed.
    Kernel { task: TaskName, source: KernelError },
    /// The scheduler refused to start.
    Start(KernelError),
    /// `task` was referenced before anyone created it.
    NotCreated(TaskName),
    /// `task` was referenced after it was deleted.
    UseAfterDelete(TaskName),
    /// `task` was created a second time.
    AlreadyCreated(TaskName),
    /// `created` would not sit strictly below the task creating it.
    PriorityNotBelowCreator { created: TaskName, creator: Priority },
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::InvalidPlan(e) => write!(f, "invalid plan: {}", e),
            OrchestrationError::Kernel { task, source } => write!(f, "{}: {}", task, source),
            OrchestrationError::Start(e) => write!(f, "scheduler start failed: {}", e),
            OrchestrationError::NotCreated(t) => write!(f, "{} used before creation", t),
            OrchestrationError::UseAfterDelete(t) => write!(f, "{} used after deletion", t),
            OrchestrationError::AlreadyCreated(t) => write!(f, "{} created twice", t),
            OrchestrationError::PriorityNotBelowCreator { created, creator } => {
                write!(f, "{} must sit below its creator (priority {})", created, creator)
            }
        }
    }
}

/// Reasons the system halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// The kernel could not set itself up (idle task creation).
    Init(KernelError),
    /// Bootstrap could not build the initial task set.
    Startup(OrchestrationError),
    /// A task's script hit an error after the scheduler took over.
    Orchestration(OrchestrationError),
    /// `start` came back instead of running the first task.
    SchedulerReturned(KernelError),
    /// Core peripherals were already taken.
    NoPeripherals,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::Init(e) => write!(f, "kernel init failed: {}", e),
            Fatal::Startup(e) => write!(f, "startup failed: {}", e),
            Fatal::Orchestration(e) => write!(f, "{}", e),
            Fatal::SchedulerReturned(e) => write!(f, "scheduler returned: {}", e),
            Fatal::NoPeripherals => write!(f, "core peripherals unavailable"),
        }
    }
}
