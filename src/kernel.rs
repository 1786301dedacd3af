//! # Kernel
//!
//! The global scheduler instance and the task-facing API on the target.
//!
//! Every call runs its scheduler update inside a critical section and
//! pends PendSV when the update changed who should run. Called from
//! inside an outer critical section, the switch waits for that section
//! to end.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()         ← idle task in slot 0
//!         ├─► runtime::bootstrap()   ← Task A only
//!         └─► kernel::start()        ← SysTick, PendSV, first task
//!                                      (returns only on failure)
//! ```

use core::ptr::addr_of_mut;

use crate::arch::cortex_m4;
use crate::config::IDLE_PRIORITY;
use crate::error::KernelError;
use crate::orchestrator::Kernel;
use crate::plan::TaskPlan;
use crate::runtime;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::{Priority, TaskHandle, Tick};
use crate::work::TickSource;

/// Task entry point. Never returns.
pub type TaskEntry = extern "C" fn() -> !;

/// Slot of the idle task, created first by `init()`.
pub const IDLE_SLOT: usize = 0;

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler, for the PendSV and SysTick
/// handlers.
///
/// # Safety
/// Set once during `init()`. Task code only goes through it inside a
/// critical section; handlers are serialized by priority.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let (result, switch) = sync::critical_section(|_cs| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let result = f(scheduler);
        (result, scheduler.is_started() && scheduler.needs_reschedule())
    });
    if switch {
        cortex_m4::trigger_pendsv();
    }
    result
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Set up the scheduler and its idle task. Call once, before anything else.
pub fn init() -> Result<(), KernelError> {
    unsafe {
        SCHEDULER_PTR = addr_of_mut!(SCHEDULER);
    }
    let idle = create("idle", IDLE_PRIORITY, idle_task)?;
    debug_assert_eq!(idle.slot(), IDLE_SLOT);
    Ok(())
}

/// Register a task and lay out its initial stack frame.
pub fn create(
    name: &'static str,
    priority: Priority,
    entry: TaskEntry,
) -> Result<TaskHandle, KernelError> {
    with_scheduler(|scheduler| {
        let handle = scheduler.create_task(name, priority)?;
        cortex_m4::init_stack(&mut scheduler.tasks[handle.slot()], entry);
        Ok(handle)
    })
}

/// Suspend `target`, or the calling task when `None`.
pub fn suspend(target: Option<TaskHandle>) -> Result<(), KernelError> {
    with_scheduler(|scheduler| scheduler.suspend(target))
}

pub fn resume(target: TaskHandle) -> Result<(), KernelError> {
    with_scheduler(|scheduler| scheduler.resume(target))
}

/// Delete `target`, or the calling task when `None`.
pub fn delete(target: Option<TaskHandle>) -> Result<(), KernelError> {
    with_scheduler(|scheduler| scheduler.delete(target))
}

pub fn current_priority() -> Option<Priority> {
    with_scheduler(|scheduler| scheduler.current_priority())
}

pub fn tick_count() -> Tick {
    with_scheduler(|scheduler| scheduler.tick_count())
}

/// Start the scheduler.
///
/// On success this never returns: the first task takes over. Getting a
/// value back means startup failed.
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> KernelError {
    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities();

    let first = sync::critical_section(|_cs| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        scheduler
            .start()
            .map(|slot| scheduler.tasks[slot].stack_pointer)
    });

    match first {
        Ok(psp) => unsafe { cortex_m4::start_first_task(psp) },
        Err(e) => e,
    }
}

extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Orchestrator port
// ---------------------------------------------------------------------------

/// The bare-metal [`Kernel`]: plan tasks get their entry trampolines from
/// the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rtos;

impl TickSource for Rtos {
    fn now(&self) -> Tick {
        tick_count()
    }
}

impl Kernel for Rtos {
    fn create_task(&mut self, task: &TaskPlan) -> Result<TaskHandle, KernelError> {
        create(task.name.as_str(), task.priority, runtime::entry_for(task.name))
    }

    fn suspend(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        suspend(target)
    }

    fn resume(&mut self, target: TaskHandle) -> Result<(), KernelError> {
        resume(target)
    }

    fn delete(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        delete(target)
    }

    fn current_priority(&self) -> Option<Priority> {
        current_priority()
    }
}
