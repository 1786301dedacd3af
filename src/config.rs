//! # Baton Configuration
//!
//! Compile-time constants for the scheduler and the handoff demo.
//! Nothing here is read at runtime from anywhere else.

use crate::task::Priority;

/// Number of task slots, idle task included. The handoff plan uses five
/// (idle + A, B, C, D); the rest is headroom.
pub const MAX_TASKS: usize = 8;

/// Highest priority the scheduler accepts.
pub const MAX_PRIORITY: Priority = 7;

/// Priority of the idle task. Application tasks must sit above it.
pub const IDLE_PRIORITY: Priority = 0;

/// Priority of the first task created at boot (idle + 4). Every other task
/// of the handoff plan sits strictly below it.
pub const BASE_PRIORITY: Priority = IDLE_PRIORITY + 4;

/// SysTick frequency in Hz. One tick is one millisecond.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Ticks a task runs before an equal-priority ready task gets the CPU.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Covers the hardware exception frame
/// (32 bytes), the software-saved R4–R11 (32 bytes) and the semihosting
/// formatting path.
pub const STACK_SIZE: usize = 2048;

/// Half period of one indicator blink, in milliseconds.
pub const BLINK_HALF_PERIOD_MS: u32 = 500;

/// Line emitted once at boot.
pub const WELCOME_TEXT: &str = "Baton: priority handoff demo";

/// Convert milliseconds to scheduler ticks.
#[inline]
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ms * TICK_HZ / 1000
}
