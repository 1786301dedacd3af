//! # Cortex-M4 Port Layer
//!
//! Context switching via PendSV, the SysTick tick, and first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on the process stack (PSP); handlers use the
//! main stack (MSP). On exception entry the hardware stacks R0–R3, R12,
//! LR, PC and xPSR onto the task's stack; PendSV saves R4–R11 by hand.
//!
//! Every lifecycle call that changes who should run pends PendSV. PendSV
//! sits at the lowest priority, so it fires as soon as the caller leaves
//! its critical section: a task resuming a higher-priority task is
//! switched out before its next instruction.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xFF (lowest)
//! - PendSV: 0xFF (lowest)

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{STACK_SIZE, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::{self, TaskEntry};
use crate::task::TaskControlBlock;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a context switch.
///
/// Sets PENDSVSET in ICSR. The barriers make the switch take effect
/// before the next instruction when interrupts are enabled.
#[inline]
pub fn trigger_pendsv() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Put PendSV and SysTick at the lowest priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // SHPR3 (0xE000_ED20): [23:16] PendSV, [31:24] SysTick
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        core::ptr::write_volatile(shpr3, val | (0xFF << 16) | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Lay out an initial frame on the task's stack so the first switch to it
/// "returns" into `entry`.
///
/// ```text
/// high  xPSR  (Thumb bit)
///       PC    (entry)
///       LR    (task_exit)
///       R12, R3, R2, R1, R0
///       R11 .. R4              <- stack_pointer
/// low
/// ```
pub fn init_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
    let stack_top = tcb.stack.0.as_mut_ptr() as usize + STACK_SIZE;
    let aligned_top = stack_top & !0x07;

    // 16 words: 8 software-saved, 8 hardware-stacked
    let frame = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        for i in 0..13 {
            frame.add(i).write_volatile(0); // R4–R11, R0–R3, R12
        }
        frame.add(13).write_volatile(task_exit as usize as u32); // LR
        frame.add(14).write_volatile(entry as usize as u32); // PC
        frame.add(15).write_volatile(0x0100_0000); // xPSR
    }

    tcb.stack_pointer = frame;
}

/// Where a task would land if its entry returned. Entries never return.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to PSP and branch into the first task.
///
/// # Safety
/// Call once, with a stack pointer produced by `init_stack`.
pub unsafe fn start_first_task(psp: *mut u32) -> ! {
    asm!(
        "adds r0, #32",        // skip R4–R11, never used yet
        "msr psp, r0",
        "movs r0, #2",         // CONTROL.SPSEL = 1
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "mov lr, r4",
        "pop {{r5}}",          // PC
        "pop {{r6}}",          // xPSR, restored by hardware from here on
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler.
///
/// 1. Push R4–R11 onto the outgoing task's stack and record its PSP
/// 2. Let the scheduler pick the incoming task
/// 3. Pop R4–R11 from the incoming task's stack and return on PSP
///
/// # Safety
/// Entered only by the NVIC.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "cpsie i",
        "mvn r0, #2",          // EXC_RETURN 0xFFFFFFFD: Thread mode, PSP
        "bx r0",
        save = sym save_current_context,
        switch = sym do_context_switch,
    );
}

/// Record the outgoing task's PSP. A task that just deleted itself gets
/// the write too; its slot is free and nobody reads it back.
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    let scheduler = &mut *kernel::SCHEDULER_PTR;
    if let Some(current) = scheduler.current() {
        scheduler.tasks[current].stack_pointer = psp;
    }
}

/// Pick the incoming task and return its PSP.
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    let scheduler = &mut *kernel::SCHEDULER_PTR;
    // Idle is always runnable, so `None` cannot happen once started.
    let next = scheduler.schedule().unwrap_or(kernel::IDLE_SLOT);
    scheduler.tasks[next].stack_pointer
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Scheduler tick. Pends a switch when a time slice hands over to an
/// equal-priority task.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let scheduler = &mut *kernel::SCHEDULER_PTR;
    scheduler.tick();

    if scheduler.is_started() && scheduler.needs_reschedule() {
        trigger_pendsv();
    }
}
