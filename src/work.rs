//! # Simulated Work
//!
//! The visible, CPU-bound work the tasks do between handoffs.
//!
//! `spin_delay` polls the tick counter instead of blocking. It holds the
//! CPU for the whole wait, so lower-priority tasks cannot run meanwhile.
//! That is the point of the demo and nothing else: a real application
//! waits with a suspending timed delay.

use crate::board::{Board, Led};
use crate::config::{ms_to_ticks, BLINK_HALF_PERIOD_MS};
use crate::plan::{Step, TaskPlan};
use crate::task::Tick;

/// A monotonically increasing tick counter.
pub trait TickSource {
    fn now(&self) -> Tick;
}

/// Busy-wait for `ticks` scheduler ticks. Returns how many times the
/// counter was polled without reaching the target.
///
/// The target is computed with a plain wrapping add and compared with
/// `<`, so a wait that straddles tick-counter wraparound ends early.
/// Acceptable for short runs; do not reuse this for long-running timing.
pub fn spin_delay<C: TickSource + ?Sized>(clock: &C, ticks: Tick) -> u32 {
    let base = clock.now();
    let target = base.wrapping_add(ticks); // NOTE: wrapping-around not checked

    let mut polls: u32 = 0;
    while clock.now() < target {
        polls = polls.wrapping_add(1);
        core::hint::spin_loop();
    }
    polls
}

/// Blink `led` `times` times: two toggles per blink, each followed by a
/// half-period spin delay.
pub fn blink<C, B>(clock: &C, board: &mut B, led: Led, times: u32)
where
    C: TickSource + ?Sized,
    B: Board + ?Sized,
{
    for _ in 0..times {
        for _ in 0..2 {
            board.toggle(led);
            spin_delay(clock, ms_to_ticks(BLINK_HALF_PERIOD_MS));
        }
    }
}

/// Run one non-lifecycle step of `task`.
///
/// `BlinkForever` performs a single blink here; the caller decides how
/// often to come back to it.
pub fn perform<C, B>(task: &TaskPlan, step: &Step, clock: &C, board: &mut B)
where
    C: TickSource + ?Sized,
    B: Board + ?Sized,
{
    match step {
        Step::Emit(line) => board.emit(line),
        Step::Blink => blink(clock, board, task.led, task.blinks),
        Step::BlinkForever => blink(clock, board, task.led, 1),
        Step::Create(_) | Step::SuspendSelf | Step::Resume(_) | Step::Delete(_) => {}
    }
}
