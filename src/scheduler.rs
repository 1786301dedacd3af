//! # Scheduler
//!
//! Strict priority-preemptive scheduling over a fixed TCB array.
//!
//! This is pure state-machine logic: it decides *who* should hold the CPU
//! and raises `needs_reschedule` when that changes. The bare-metal kernel
//! answers the flag with a PendSV context switch; the host simulator
//! answers it by switching which script it steps next.
//!
//! ## Rules
//!
//! 1. The highest-priority runnable task runs.
//! 2. Among equal priorities, the next slot after the current one wins
//!    (round-robin), rotated when the time slice expires.
//! 3. A task becoming ready with a priority above the running task's
//!    preempts it immediately.
//! 4. Suspending or deleting the running task gives the CPU away.

use crate::config::{DEFAULT_TIME_SLICE, MAX_PRIORITY, MAX_TASKS};
use crate::error::KernelError;
use crate::task::{Priority, TaskControlBlock, TaskHandle, TaskState, Tick};

/// The central scheduler state. Stored as a global `static mut` in
/// `kernel.rs` on the target, owned by the simulator on a host.
pub struct Scheduler {
    /// Fixed-size array of TCBs.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Slot of the task holding the CPU. Still points at a task that just
    /// suspended or deleted itself until the next `schedule()`.
    current: Option<usize>,

    /// Set once `start()` has handed the CPU to the first task.
    started: bool,

    /// Monotonic, wrapping tick counter.
    tick_count: Tick,

    /// Set when the task holding the CPU should change.
    needs_reschedule: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            current: None,
            started: false,
            tick_count: 0,
            needs_reschedule: false,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Register a new task in the first free slot, in `Ready` state.
    pub fn create_task(
        &mut self,
        name: &'static str,
        priority: Priority,
    ) -> Result<TaskHandle, KernelError> {
        if priority > MAX_PRIORITY {
            return Err(KernelError::InvalidPriority(priority));
        }

        let slot = self
            .tasks
            .iter()
            .position(|t| !t.active)
            .ok_or(KernelError::NoFreeSlot)?;

        self.tasks[slot].init(name, priority);
        self.request_preemption_by(slot);

        Ok(self.tasks[slot].handle(slot))
    }

    /// Take a task out of scheduling consideration. `None` targets the
    /// running task, which then gives up the CPU.
    ///
    /// Suspending an already-suspended task changes nothing.
    pub fn suspend(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        let slot = self.resolve(target)?;
        let task = &mut self.tasks[slot];

        if task.state == TaskState::Suspended {
            return Ok(());
        }

        task.state = TaskState::Suspended;
        if self.current == Some(slot) {
            self.needs_reschedule = true;
        }
        Ok(())
    }

    /// Return a suspended task to `Ready`. Preempts the caller when the
    /// resumed task outranks it; resuming a task that is not suspended
    /// changes nothing.
    pub fn resume(&mut self, target: TaskHandle) -> Result<(), KernelError> {
        let slot = self.resolve(Some(target))?;

        if self.tasks[slot].state != TaskState::Suspended {
            return Ok(());
        }

        self.tasks[slot].state = TaskState::Ready;
        self.request_preemption_by(slot);
        Ok(())
    }

    /// Terminate a task and free its slot. `None` targets the running task.
    /// The handle is stale from here on.
    pub fn delete(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        let slot = self.resolve(target)?;

        self.tasks[slot].release();
        if self.current == Some(slot) {
            self.needs_reschedule = true;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Priority of the task holding the CPU, if any.
    pub fn current_priority(&self) -> Option<Priority> {
        self.current
            .map(|slot| &self.tasks[slot])
            .filter(|t| t.active)
            .map(|t| t.priority)
    }

    /// Slot of the task holding the CPU.
    #[inline]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Handle of the task holding the CPU.
    pub fn current_handle(&self) -> Option<TaskHandle> {
        self.current
            .filter(|&slot| self.tasks[slot].active)
            .map(|slot| self.tasks[slot].handle(slot))
    }

    pub fn state_of(&self, handle: TaskHandle) -> Result<TaskState, KernelError> {
        let slot = self.resolve(Some(handle))?;
        Ok(self.tasks[slot].state)
    }

    pub fn priority_of(&self, handle: TaskHandle) -> Result<Priority, KernelError> {
        let slot = self.resolve(Some(handle))?;
        Ok(self.tasks[slot].priority)
    }

    /// Number of live (not deleted) tasks.
    pub fn live_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.active).count()
    }

    #[inline]
    pub fn tick_count(&self) -> Tick {
        self.tick_count
    }

    #[inline]
    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Hand the CPU to the first task. Returns its slot.
    pub fn start(&mut self) -> Result<usize, KernelError> {
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }
        let first = self.schedule().ok_or(KernelError::NoTasks)?;
        self.started = true;
        Ok(first)
    }

    /// Called from the SysTick handler every tick.
    ///
    /// Advances the tick counter and charges the running task. When its
    /// time slice runs out and another task of the same priority is ready,
    /// asks for a reschedule.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        let Some(current) = self.current else {
            return;
        };
        if !self.tasks[current].active {
            return;
        }

        let task = &mut self.tasks[current];
        task.ticks_remaining = task.ticks_remaining.saturating_sub(1);
        if task.ticks_remaining > 0 {
            return;
        }

        task.ticks_remaining = DEFAULT_TIME_SLICE;
        let priority = task.priority;
        let peer_ready = self
            .tasks
            .iter()
            .enumerate()
            .any(|(i, t)| i != current && t.is_runnable() && t.priority == priority);
        if peer_ready {
            self.needs_reschedule = true;
        }
    }

    /// Select the task that holds the CPU next and mark it `Running`.
    ///
    /// Candidates are scanned starting after the current slot, so the
    /// first one found at the top priority is the round-robin successor.
    /// The current task itself is considered last.
    ///
    /// # Returns
    /// Slot of the selected task, or `None` if nothing is runnable.
    pub fn schedule(&mut self) -> Option<usize> {
        let start = self.current.map_or(0, |c| c + 1);
        let mut best: Option<usize> = None;

        for offset in 0..MAX_TASKS {
            let i = (start + offset) % MAX_TASKS;
            if !self.tasks[i].is_runnable() {
                continue;
            }
            match best {
                Some(b) if self.tasks[b].priority >= self.tasks[i].priority => {}
                _ => best = Some(i),
            }
        }

        if let Some(prev) = self.current {
            if prev != best.unwrap_or(usize::MAX) && self.tasks[prev].state == TaskState::Running {
                self.tasks[prev].state = TaskState::Ready;
            }
        }

        if let Some(next) = best {
            if self.current != Some(next) {
                self.tasks[next].ticks_remaining = DEFAULT_TIME_SLICE;
            }
            self.tasks[next].state = TaskState::Running;
        }

        self.current = best;
        self.needs_reschedule = false;
        best
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Map a handle (or "self") to a live slot.
    fn resolve(&self, target: Option<TaskHandle>) -> Result<usize, KernelError> {
        match target {
            Some(handle) => {
                let slot = handle.slot();
                if slot < MAX_TASKS && self.tasks[slot].matches(handle) {
                    Ok(slot)
                } else {
                    Err(KernelError::StaleHandle(handle))
                }
            }
            None => self
                .current
                .filter(|&slot| self.tasks[slot].active)
                .ok_or(KernelError::NoCurrentTask),
        }
    }

    /// `slot` just became ready: preempt if it outranks the running task.
    fn request_preemption_by(&mut self, slot: usize) {
        if !self.started {
            return;
        }
        match self.current_priority() {
            Some(running) if running >= self.tasks[slot].priority => {}
            _ => self.needs_reschedule = true,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn started_with(priorities: &[Priority]) -> (Scheduler, [Option<TaskHandle>; MAX_TASKS]) {
        let mut sched = Scheduler::new();
        let mut handles = [None; MAX_TASKS];
        for (i, &p) in priorities.iter().enumerate() {
            handles[i] = Some(sched.create_task("t", p).unwrap());
        }
        sched.start().unwrap();
        (sched, handles)
    }

    #[test]
    fn test_highest_priority_runs_first() {
        let (sched, handles) = started_with(&[1, 4, 2]);
        assert_eq!(sched.current(), Some(handles[1].unwrap().slot()));
        assert_eq!(sched.current_priority(), Some(4));
        assert_eq!(sched.state_of(handles[1].unwrap()), Ok(TaskState::Running));
        assert_eq!(sched.state_of(handles[0].unwrap()), Ok(TaskState::Ready));
    }

    #[test]
    fn test_start_without_tasks_fails() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.start(), Err(KernelError::NoTasks));
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut sched, _) = started_with(&[1]);
        assert_eq!(sched.start(), Err(KernelError::AlreadyStarted));
    }

    #[test]
    fn test_creating_lower_priority_does_not_preempt() {
        let (mut sched, _) = started_with(&[4]);
        sched.create_task("low", 3).unwrap();
        assert!(!sched.needs_reschedule());
    }

    #[test]
    fn test_creating_higher_priority_preempts() {
        let (mut sched, _) = started_with(&[2]);
        let high = sched.create_task("high", 5).unwrap();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), Some(high.slot()));
    }

    #[test]
    fn test_suspend_self_yields_to_next_highest() {
        let (mut sched, handles) = started_with(&[4, 3, 2]);
        sched.suspend(None).unwrap();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), Some(handles[1].unwrap().slot()));
        assert_eq!(sched.state_of(handles[0].unwrap()), Ok(TaskState::Suspended));
    }

    #[test]
    fn test_suspend_other_does_not_yield() {
        let (mut sched, handles) = started_with(&[4, 3]);
        sched.suspend(handles[1]).unwrap();
        assert!(!sched.needs_reschedule());
        assert_eq!(sched.state_of(handles[1].unwrap()), Ok(TaskState::Suspended));
    }

    #[test]
    fn test_suspend_is_idempotent() {
        let (mut sched, handles) = started_with(&[4, 3]);
        let low = handles[1].unwrap();
        sched.suspend(Some(low)).unwrap();
        sched.suspend(Some(low)).unwrap();
        assert_eq!(sched.state_of(low), Ok(TaskState::Suspended));
        assert!(!sched.needs_reschedule());
    }

    #[test]
    fn test_resume_higher_priority_preempts() {
        let (mut sched, handles) = started_with(&[4, 3]);
        let high = handles[0].unwrap();
        sched.suspend(None).unwrap();
        sched.schedule();

        sched.resume(high).unwrap();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), Some(high.slot()));
        assert_eq!(sched.state_of(handles[1].unwrap()), Ok(TaskState::Ready));
    }

    #[test]
    fn test_resume_lower_priority_does_not_preempt() {
        let (mut sched, handles) = started_with(&[4, 3]);
        let low = handles[1].unwrap();
        sched.suspend(Some(low)).unwrap();
        sched.resume(low).unwrap();
        assert!(!sched.needs_reschedule());
        assert_eq!(sched.state_of(low), Ok(TaskState::Ready));
    }

    #[test]
    fn test_resume_of_ready_task_is_noop() {
        let (mut sched, handles) = started_with(&[4, 3]);
        sched.resume(handles[1].unwrap()).unwrap();
        assert!(!sched.needs_reschedule());
    }

    #[test]
    fn test_delete_makes_handle_stale() {
        let (mut sched, handles) = started_with(&[4, 3]);
        let low = handles[1].unwrap();
        sched.delete(Some(low)).unwrap();

        assert_eq!(sched.live_tasks(), 1);
        assert_eq!(sched.resume(low), Err(KernelError::StaleHandle(low)));
        assert_eq!(sched.suspend(Some(low)), Err(KernelError::StaleHandle(low)));
        assert_eq!(sched.delete(Some(low)), Err(KernelError::StaleHandle(low)));

        // The freed slot is reused, but the old handle stays dead.
        let again = sched.create_task("again", 2).unwrap();
        assert_eq!(again.slot(), low.slot());
        assert_eq!(sched.state_of(low), Err(KernelError::StaleHandle(low)));
    }

    #[test]
    fn test_delete_self_gives_cpu_away() {
        let (mut sched, handles) = started_with(&[4, 1]);
        sched.delete(None).unwrap();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.current_priority(), None);
        assert_eq!(sched.schedule(), Some(handles[1].unwrap().slot()));
    }

    #[test]
    fn test_self_operation_without_running_task() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.suspend(None), Err(KernelError::NoCurrentTask));
    }

    #[test]
    fn test_slot_exhaustion() {
        let mut sched = Scheduler::new();
        for _ in 0..MAX_TASKS {
            sched.create_task("t", 1).unwrap();
        }
        assert_eq!(sched.create_task("t", 1), Err(KernelError::NoFreeSlot));
    }

    #[test]
    fn test_priority_out_of_range() {
        let mut sched = Scheduler::new();
        assert_eq!(
            sched.create_task("t", MAX_PRIORITY + 1),
            Err(KernelError::InvalidPriority(MAX_PRIORITY + 1))
        );
    }

    #[test]
    fn test_nothing_runnable() {
        let (mut sched, _) = started_with(&[2]);
        sched.suspend(None).unwrap();
        assert_eq!(sched.schedule(), None);
        assert_eq!(sched.current_priority(), None);
    }

    #[test]
    fn test_round_robin_on_slice_expiry() {
        let (mut sched, handles) = started_with(&[2, 2]);
        let first = sched.current().unwrap();
        assert_eq!(first, handles[0].unwrap().slot());

        for _ in 0..DEFAULT_TIME_SLICE - 1 {
            sched.tick();
            assert!(!sched.needs_reschedule());
        }
        sched.tick();
        assert!(sched.needs_reschedule());
        assert_eq!(sched.schedule(), Some(handles[1].unwrap().slot()));
    }

    #[test]
    fn test_slice_expiry_without_peer_keeps_running() {
        let (mut sched, _) = started_with(&[3, 1]);
        for _ in 0..DEFAULT_TIME_SLICE * 3 {
            sched.tick();
        }
        assert!(!sched.needs_reschedule());
        assert_eq!(sched.tick_count(), DEFAULT_TIME_SLICE * 3);
    }

    #[test]
    fn test_tick_counter_wraps() {
        let mut sched = Scheduler::new();
        sched.tick_count = Tick::MAX;
        sched.tick();
        assert_eq!(sched.tick_count(), 0);
    }
}
