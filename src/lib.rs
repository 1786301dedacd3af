//! # Baton: priority-ladder task handoff
//!
//! A small preemptive kernel for ARM Cortex-M4 and a declarative plan of
//! four tasks that hand control to one another purely through priority
//! and lifecycle calls (create, suspend, resume, delete).
//!
//! ## Overview
//!
//! Task A boots alone at the top priority, creates B, C and D below it
//! and suspends. From there each handoff is a consequence of the
//! scheduler's one rule, the highest-priority ready task runs:
//!
//! ```text
//! A ──suspend──► B ──resume A──► A ──suspend──► B ──suspend──► C ──suspend──► D
//!                                                                     deletes A, B, C
//!                                                                     blinks forever
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │      Plan (plan.rs) · Work (work.rs) · Board (board.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │          Orchestrator (orchestrator.rs)                 │
//! │     bootstrap() · apply() · finish() · Registry         │
//! ├───────────────────────────┬────────────────────────────┤
//! │  Kernel API (kernel.rs)   │  Simulator (sim.rs)        │
//! │  runtime.rs · sync.rs     │  host-side, step by step   │
//! ├───────────────────────────┴────────────────────────────┤
//! │  Scheduler (scheduler.rs) · Task Model (task.rs)        │
//! ├────────────────────────────────────────────────────────┤
//! │  Arch Port (arch/cortex_m4.rs)                          │
//! │  PendSV · SysTick · Context Switch · Stack Init        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler is plain data and runs anywhere. The kernel, runtime,
//! sync and arch layers only exist on the target (`target_os = "none"`);
//! on the host the simulator drives the same scheduler and orchestrator.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in the TCB
//! - **Bounded buffers**: `heapless` for traces and messages
//! - **Critical sections**: `cortex_m::interrupt::free()` for shared state

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod task;
pub mod error;
pub mod scheduler;
pub mod board;
pub mod plan;
pub mod registry;
pub mod work;
pub mod orchestrator;
pub mod sim;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod kernel;
#[cfg(target_os = "none")]
pub mod runtime;
#[cfg(target_os = "none")]
pub mod sync;
