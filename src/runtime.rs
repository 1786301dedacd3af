//! # Firmware Runtime
//!
//! Runs the handoff plan on the real scheduler. Each plan task gets an
//! `extern "C"` trampoline that walks its script: lifecycle steps go
//! through the shared [`Orchestrator`] inside one critical section, work
//! steps run with interrupts enabled so the tick keeps counting.
//!
//! Output goes over semihosting, so a debugger or QEMU shows both the
//! "Task X" lines and every indicator change.

use core::sync::atomic::{AtomicU8, Ordering};

use cortex_m_semihosting::hprintln;

use crate::board::{self, Board, Led};
use crate::error::{Fatal, OrchestrationError};
use crate::kernel::{Rtos, TaskEntry};
use crate::orchestrator::Orchestrator;
use crate::plan::{Step, TaskName, HANDOFF};
use crate::sync::Shared;
use crate::work;

static ORCHESTRATOR: Shared<Orchestrator<'static>> = Shared::new(Orchestrator::new(&HANDOFF));

/// On/off state of every indicator, one bit per [`Led`].
static INDICATORS: AtomicU8 = AtomicU8::new(0);

/// [`Board`] backed by the host debugger.
#[derive(Debug, Clone, Copy, Default)]
pub struct Semihosting;

impl Board for Semihosting {
    fn toggle(&mut self, led: Led) {
        let before = INDICATORS.fetch_xor(led.mask(), Ordering::Relaxed);
        let state = if before & led.mask() == 0 { "on" } else { "off" };
        hprintln!("{} {}", led, state);
    }

    fn emit(&mut self, line: &str) {
        hprintln!("{}", line);
    }
}

/// Validate the plan and create the boot task. Call after `kernel::init`
/// and before `kernel::start`.
pub fn bootstrap() -> Result<(), OrchestrationError> {
    ORCHESTRATOR.lock(|orchestrator| orchestrator.bootstrap(&mut Rtos).map(|_| ()))
}

/// Entry trampoline for a plan task.
pub fn entry_for(name: TaskName) -> TaskEntry {
    match name {
        TaskName::A => task_a,
        TaskName::B => task_b,
        TaskName::C => task_c,
        TaskName::D => task_d,
    }
}

extern "C" fn task_a() -> ! {
    run_task(TaskName::A)
}

extern "C" fn task_b() -> ! {
    run_task(TaskName::B)
}

extern "C" fn task_c() -> ! {
    run_task(TaskName::C)
}

extern "C" fn task_d() -> ! {
    run_task(TaskName::D)
}

fn run_task(me: TaskName) -> ! {
    let plan = ORCHESTRATOR.lock(|orchestrator| orchestrator.plan());
    let task = plan.task(me);
    let mut board = Semihosting;
    let mut rtos = Rtos;

    for step in task.steps {
        if step.is_lifecycle() {
            if let Err(e) = ORCHESTRATOR.lock(|orchestrator| orchestrator.apply(me, step, &mut rtos)) {
                halt(&mut board, Fatal::Orchestration(e));
            }
        } else if let Step::BlinkForever = step {
            loop {
                work::perform(task, step, &rtos, &mut board);
            }
        } else {
            work::perform(task, step, &rtos, &mut board);
        }
    }

    if let Err(e) = ORCHESTRATOR.lock(|orchestrator| orchestrator.finish(me, &mut rtos)) {
        halt(&mut board, Fatal::Orchestration(e));
    }

    // Deleted: the pended switch takes us off the CPU for good.
    loop {
        cortex_m::asm::wfi();
    }
}

/// Mask interrupts, report `reason` and halt. Nothing gets scheduled
/// once this is entered.
pub fn halt<B: Board + ?Sized>(board: &mut B, reason: Fatal) -> ! {
    cortex_m::interrupt::disable();
    board::fatal(board, reason)
}
