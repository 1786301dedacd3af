//! # Task Control Block
//!
//! The task model shared by the scheduler, the bare-metal kernel and the
//! host simulator.
//!
//! A task is a name, a fixed priority and a lifecycle state. Tasks are
//! referred to through [`TaskHandle`]s, which are weak: a handle names a
//! scheduler slot *and* the generation of that slot, so a handle kept past
//! the deletion of its task no longer resolves.

use crate::config::{DEFAULT_TIME_SLICE, STACK_SIZE};

/// Scheduling priority. Higher value = more urgent; idle sits at 0.
pub type Priority = u8;

/// Scheduler tick counter. 32 bits wide and wrapping, like the hardware
/// tick of the target.
pub type Tick = u32;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a task slot.
///
/// ```text
///   create()                schedule()
///  ─────────► ┌─────────┐ ─────────────► ┌─────────┐
///             │  Ready  │                │ Running │
///             └─────────┘ ◄───────────── └─────────┘
///                  ▲  │      preempt          │
///         resume() │  │ suspend()             │ suspend(self)
///                  │  ▼                       │
///             ┌───────────┐ ◄─────────────────┘
///             │ Suspended │
///             └───────────┘
///
///   delete() from any state ──► Deleted (terminal, slot reusable)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable, waiting for the CPU.
    Ready,
    /// Currently executing. Exactly one task is in this state once the
    /// scheduler has started.
    Running,
    /// Out of scheduling consideration until resumed.
    Suspended,
    /// Terminated. The slot is free and its generation has moved on.
    Deleted,
}

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Opaque reference to a task, used to suspend, resume or delete it.
///
/// Handles do not own the task: the scheduler owns every TCB. A handle
/// stops resolving as soon as its task is deleted, even if the slot is
/// later reused by a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    slot: u8,
    generation: u32,
}

impl TaskHandle {
    pub(crate) const fn new(slot: usize, generation: u32) -> Self {
        Self {
            slot: slot as u8,
            generation,
        }
    }

    /// Scheduler slot this handle points at.
    #[inline]
    pub const fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot at the time the task was created.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task stack, 8-byte aligned as AAPCS requires.
#[repr(C, align(8))]
pub struct Stack(pub [u8; STACK_SIZE]);

/// Task Control Block (TCB).
///
/// TCBs live in a fixed array inside the scheduler; nothing is allocated.
/// On the target, `stack_pointer` points into `stack` and is updated on
/// every context switch. The host simulator never touches either field.
pub struct TaskControlBlock {
    /// Human-readable task name.
    pub name: &'static str,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Fixed at creation; never changed afterwards.
    pub priority: Priority,

    /// Bumped every time the slot is freed. Handles carry the generation
    /// they were issued with.
    pub generation: u32,

    /// Saved process stack pointer.
    pub stack_pointer: *mut u32,

    pub stack: Stack,

    /// Remaining ticks of the current time slice (round-robin among equal
    /// priorities).
    pub ticks_remaining: u32,

    /// Whether this slot holds a live task.
    pub active: bool,
}

// Safety: `stack_pointer` only ever points into the TCB's own stack, and
// TCBs are only touched inside critical sections or from PendSV.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// A free slot. Used to initialize the static TCB array.
    pub const EMPTY: Self = Self {
        name: "",
        state: TaskState::Deleted,
        priority: 0,
        generation: 0,
        stack_pointer: core::ptr::null_mut(),
        stack: Stack([0u8; STACK_SIZE]),
        ticks_remaining: 0,
        active: false,
    };

    /// Occupy this slot with a new task in `Ready` state.
    pub fn init(&mut self, name: &'static str, priority: Priority) {
        self.name = name;
        self.state = TaskState::Ready;
        self.priority = priority;
        self.stack_pointer = core::ptr::null_mut();
        self.ticks_remaining = DEFAULT_TIME_SLICE;
        self.active = true;
    }

    /// Free this slot. Outstanding handles become stale.
    pub fn release(&mut self) {
        self.state = TaskState::Deleted;
        self.active = false;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Runnable means Ready, or Running and still holding the CPU.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Does `handle` still refer to the task in this slot?
    #[inline]
    pub fn matches(&self, handle: TaskHandle) -> bool {
        self.active && self.generation == handle.generation()
    }

    /// Issue a handle for the task currently in `slot`.
    #[inline]
    pub fn handle(&self, slot: usize) -> TaskHandle {
        TaskHandle::new(slot, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
