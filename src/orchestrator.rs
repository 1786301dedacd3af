//! # Task Lifecycle Orchestrator
//!
//! Drives the plan's lifecycle steps (create, suspend, resume, delete)
//! through a [`Kernel`] and keeps the [`Registry`] in step with them.
//!
//! The orchestrator never decides who runs. It issues the call the
//! running task's script asks for, and the scheduler's priority rules do
//! the rest: a resume of a higher-priority task switches away before the
//! caller's next step, a self-suspend hands the CPU down.
//!
//! On the target every `apply` runs inside one critical section, so the
//! registry update and the kernel call land together and the context
//! switch they request happens right after.

use crate::error::{KernelError, OrchestrationError};
use crate::plan::{Plan, Step, TaskName, TaskPlan};
use crate::registry::Registry;
use crate::task::{Priority, TaskHandle};
use crate::work::TickSource;

/// The scheduler operations the orchestrator consumes.
pub trait Kernel: TickSource {
    /// Register `task` at its plan priority, in `Ready` state.
    fn create_task(&mut self, task: &TaskPlan) -> Result<TaskHandle, KernelError>;

    /// Suspend `target`, or the running task when `None`.
    fn suspend(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError>;

    fn resume(&mut self, target: TaskHandle) -> Result<(), KernelError>;

    /// Delete `target`, or the running task when `None`.
    fn delete(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError>;

    /// Priority of the running task, `None` before the scheduler starts.
    fn current_priority(&self) -> Option<Priority>;
}

pub struct Orchestrator<'p> {
    plan: &'p Plan,
    registry: Registry,
}

impl<'p> Orchestrator<'p> {
    pub const fn new(plan: &'p Plan) -> Self {
        Self {
            plan,
            registry: Registry::new(),
        }
    }

    #[inline]
    pub fn plan(&self) -> &'p Plan {
        self.plan
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Validate the plan and create the boot task. Nothing else exists
    /// until the boot task runs.
    pub fn bootstrap<K: Kernel + ?Sized>(
        &mut self,
        kernel: &mut K,
    ) -> Result<TaskHandle, OrchestrationError> {
        self.plan.validate().map_err(OrchestrationError::InvalidPlan)?;

        let boot = self.plan.boot_task();
        let handle = kernel
            .create_task(boot)
            .map_err(|source| OrchestrationError::Kernel {
                task: boot.name,
                source,
            })?;
        self.registry.record_created(boot.name, handle)?;
        Ok(handle)
    }

    /// Carry out a lifecycle step on behalf of `me`, the running task.
    /// Work steps are not the orchestrator's; they pass through untouched.
    pub fn apply<K: Kernel + ?Sized>(
        &mut self,
        me: TaskName,
        step: &Step,
        kernel: &mut K,
    ) -> Result<(), OrchestrationError> {
        match *step {
            Step::Create(name) => self.create(name, kernel),
            Step::SuspendSelf => {
                self.registry.handle(me)?;
                kernel.suspend(None).map_err(kernel_error(me))?;
                self.registry.record_suspended(me);
                Ok(())
            }
            Step::Resume(name) => {
                let handle = self.registry.handle(name)?;
                kernel.resume(handle).map_err(kernel_error(name))?;
                self.registry.record_resumed(name);
                Ok(())
            }
            Step::Delete(name) => {
                let handle = self.registry.handle(name)?;
                kernel.delete(Some(handle)).map_err(kernel_error(name))?;
                self.registry.record_deleted(name);
                Ok(())
            }
            Step::Emit(_) | Step::Blink | Step::BlinkForever => Ok(()),
        }
    }

    /// `me` ran out of script. A task never just returns: it deletes itself.
    pub fn finish<K: Kernel + ?Sized>(
        &mut self,
        me: TaskName,
        kernel: &mut K,
    ) -> Result<(), OrchestrationError> {
        self.registry.handle(me)?;
        kernel.delete(None).map_err(kernel_error(me))?;
        self.registry.record_deleted(me);
        Ok(())
    }

    fn create<K: Kernel + ?Sized>(
        &mut self,
        name: TaskName,
        kernel: &mut K,
    ) -> Result<(), OrchestrationError> {
        let task = self.plan.task(name);

        // The plan's table is static, but the created task must still sit
        // below whoever creates it, or it would preempt mid-script.
        if let Some(creator) = kernel.current_priority() {
            if task.priority >= creator {
                return Err(OrchestrationError::PriorityNotBelowCreator {
                    created: name,
                    creator,
                });
            }
        }

        let handle = kernel.create_task(task).map_err(kernel_error(name))?;
        self.registry.record_created(name, handle)
    }
}

fn kernel_error(task: TaskName) -> impl FnOnce(KernelError) -> OrchestrationError {
    move |source| OrchestrationError::Kernel { task, source }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
