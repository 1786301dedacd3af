//! # Synchronization Primitives
//!
//! Interrupt-safe access to state shared between tasks and the SysTick /
//! PendSV handlers. Single core, so masking interrupts is enough.
//!
//! Critical sections nest: a context switch requested inside one only
//! happens once the outermost section ends.

use core::cell::RefCell;

use cortex_m::interrupt::{self, CriticalSection, Mutex};

/// Execute a closure with interrupts disabled.
///
/// Interrupts are restored to their previous state on exit, so a pending
/// PendSV fires right after the outermost section.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    interrupt::free(f)
}

/// A value shared between tasks, only reachable inside a critical section.
pub struct Shared<T>(Mutex<RefCell<T>>);

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(RefCell::new(value)))
    }

    /// Borrow the value mutably for the duration of `f`.
    ///
    /// # Panics
    /// If `f` re-enters `lock` on the same value.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(&mut self.0.borrow(cs).borrow_mut()))
    }
}
