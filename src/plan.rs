//! # Handoff Plan
//!
//! The orchestration plan as data: a static priority table plus one
//! script per task. Priorities are fixed here, not derived from whichever
//! task happens to run the creation call.
//!
//! ## The handoff
//!
//! | Task | Priority | Indicator | Script |
//! |------|----------|-----------|--------|
//! | A | `BASE_PRIORITY` | LEDB | create B, C, D · suspend · blink · suspend |
//! | B | `BASE_PRIORITY - 1` | LED1 | blink · resume A · suspend |
//! | C | `BASE_PRIORITY - 2` | LED2 | blink · suspend |
//! | D | `BASE_PRIORITY - 3` | LED3 | delete A, B, C · blink forever |
//!
//! Only A is created at boot. Priority order alone then yields the run
//! order A → B → A → B → C → D, with D left as the only live task.

use core::fmt;

use crate::board::Led;
use crate::config::{BASE_PRIORITY, IDLE_PRIORITY, MAX_PRIORITY};
use crate::task::Priority;

/// Number of tasks in a plan.
pub const TASK_COUNT: usize = 4;

/// Identity of a task in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    A,
    B,
    C,
    D,
}

impl TaskName {
    pub const ALL: [TaskName; TASK_COUNT] = [TaskName::A, TaskName::B, TaskName::C, TaskName::D];

    /// Position in the plan's table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskName::A => "task_a",
            TaskName::B => "task_b",
            TaskName::C => "task_c",
            TaskName::D => "task_d",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a task script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write a line to the debug channel.
    Emit(&'static str),
    /// Create another task of the plan.
    Create(TaskName),
    /// Suspend the running task.
    SuspendSelf,
    /// Resume a suspended task.
    Resume(TaskName),
    /// Delete a task. Its handle is dead afterwards.
    Delete(TaskName),
    /// Bounded visible work: the task's blink count on its own indicator.
    Blink,
    /// Blink the task's indicator until the end of time.
    BlinkForever,
}

impl Step {
    /// Steps that go through the scheduler. Everything else is work the
    /// task does on its own.
    #[inline]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Step::Create(_) | Step::SuspendSelf | Step::Resume(_) | Step::Delete(_)
        )
    }

    /// Task named by this step, if it names one.
    #[inline]
    pub const fn target(&self) -> Option<TaskName> {
        match self {
            Step::Create(t) | Step::Resume(t) | Step::Delete(t) => Some(*t),
            _ => None,
        }
    }
}

/// One row of the plan.
#[derive(Debug, Clone, Copy)]
pub struct TaskPlan {
    pub name: TaskName,
    pub priority: Priority,
    pub led: Led,
    /// Blinks per `Step::Blink`. One blink is two toggles.
    pub blinks: u32,
    pub steps: &'static [Step],
}

const SCRIPT_A: &[Step] = &[
    Step::Emit("Task A"),
    Step::Create(TaskName::B),
    Step::Create(TaskName::C),
    Step::Create(TaskName::D),
    Step::SuspendSelf,
    Step::Blink,
    Step::SuspendSelf,
];

const SCRIPT_B: &[Step] = &[
    Step::Emit("Task B"),
    Step::Blink,
    Step::Resume(TaskName::A),
    Step::SuspendSelf,
];

const SCRIPT_C: &[Step] = &[Step::Emit("Task C"), Step::Blink, Step::SuspendSelf];

const SCRIPT_D: &[Step] = &[
    Step::Emit("Task D"),
    Step::Delete(TaskName::A),
    Step::Delete(TaskName::B),
    Step::Delete(TaskName::C),
    Step::BlinkForever,
];

/// The shipped plan: A blinks twice, B and C three times.
pub static HANDOFF: Plan = Plan::handoff(2, 3, 3);

/// A complete orchestration plan. Row `i` describes `TaskName::ALL[i]`;
/// row 0 is the task created at boot.
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    tasks: [TaskPlan; TASK_COUNT],
}

impl Plan {
    pub const fn new(tasks: [TaskPlan; TASK_COUNT]) -> Self {
        Self { tasks }
    }

    /// The A/B/C/D handoff with the given blink counts for A, B and C.
    pub const fn handoff(blinks_a: u32, blinks_b: u32, blinks_c: u32) -> Self {
        Self::new([
            TaskPlan {
                name: TaskName::A,
                priority: BASE_PRIORITY,
                led: Led::Blue,
                blinks: blinks_a,
                steps: SCRIPT_A,
            },
            TaskPlan {
                name: TaskName::B,
                priority: BASE_PRIORITY - 1,
                led: Led::Led1,
                blinks: blinks_b,
                steps: SCRIPT_B,
            },
            TaskPlan {
                name: TaskName::C,
                priority: BASE_PRIORITY - 2,
                led: Led::Led2,
                blinks: blinks_c,
                steps: SCRIPT_C,
            },
            TaskPlan {
                name: TaskName::D,
                priority: BASE_PRIORITY - 3,
                led: Led::Led3,
                blinks: 1,
                steps: SCRIPT_D,
            },
        ])
    }

    /// The handoff with every bounded-work count set to `blinks`.
    pub const fn uniform(blinks: u32) -> Self {
        Self::handoff(blinks, blinks, blinks)
    }

    #[inline]
    pub fn task(&self, name: TaskName) -> &TaskPlan {
        &self.tasks[name.index()]
    }

    #[inline]
    pub fn tasks(&self) -> &[TaskPlan] {
        &self.tasks
    }

    /// The task created at boot.
    #[inline]
    pub fn boot_task(&self) -> &TaskPlan {
        &self.tasks[0]
    }

    /// Check the plan before anything runs.
    ///
    /// - priorities strictly descend down the table, all above idle;
    /// - only the boot task exists at start, every other task is created
    ///   exactly once, by a task that outranks it;
    /// - a task is deleted only by a task it outranks, only once its own
    ///   script ends suspended, and nobody who can run after the deletion
    ///   names it again.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.validate_priorities()?;
        self.validate_creation()?;
        self.validate_deletion()
    }

    fn validate_priorities(&self) -> Result<(), PlanError> {
        for (i, task) in self.tasks.iter().enumerate() {
            if task.name.index() != i {
                return Err(PlanError::Misplaced(task.name));
            }
            if task.priority <= IDLE_PRIORITY || task.priority > MAX_PRIORITY {
                return Err(PlanError::PriorityOutOfRange(task.name));
            }
            if i > 0 && task.priority >= self.tasks[i - 1].priority {
                return Err(PlanError::PriorityOrder(task.name));
            }
            if task.blinks == 0 && task.steps.iter().any(|s| matches!(s, Step::Blink)) {
                return Err(PlanError::NoWork(task.name));
            }
        }
        Ok(())
    }

    fn validate_creation(&self) -> Result<(), PlanError> {
        let boot = self.boot_task().name;
        let mut creator: [Option<TaskName>; TASK_COUNT] = [None; TASK_COUNT];

        for task in &self.tasks {
            for step in task.steps {
                let Step::Create(created) = *step else {
                    continue;
                };
                if created == boot {
                    return Err(PlanError::BootTaskCreated);
                }
                if creator[created.index()].is_some() {
                    return Err(PlanError::CreatedTwice(created));
                }
                if self.task(created).priority >= task.priority {
                    return Err(PlanError::CreatorNotHigher {
                        creator: task.name,
                        created,
                    });
                }
                creator[created.index()] = Some(task.name);
            }
        }

        match self.tasks[1..].iter().find(|t| creator[t.name.index()].is_none()) {
            Some(orphan) => Err(PlanError::NeverCreated(orphan.name)),
            None => Ok(()),
        }
    }

    fn validate_deletion(&self) -> Result<(), PlanError> {
        for deleter in &self.tasks {
            let mut deleted = [false; TASK_COUNT];

            for step in deleter.steps {
                if let Some(target) = step.target() {
                    if deleted[target.index()] {
                        return Err(PlanError::ReferenceAfterDelete {
                            task: deleter.name,
                            target,
                        });
                    }
                }

                let Step::Delete(target) = *step else {
                    continue;
                };
                let victim = self.task(target);
                if victim.priority <= deleter.priority {
                    return Err(PlanError::DeleteOfLowerPriority {
                        deleter: deleter.name,
                        target,
                    });
                }
                if !matches!(victim.steps.last(), Some(Step::SuspendSelf)) {
                    return Err(PlanError::DeletedWhileActive(target));
                }
                // Anyone at or below the deleter's priority runs after it.
                let late_user = self.tasks.iter().find(|t| {
                    t.name != deleter.name
                        && t.priority <= deleter.priority
                        && t.steps.iter().any(|s| s.target() == Some(target))
                });
                if let Some(user) = late_user {
                    return Err(PlanError::ReferenceAfterDelete {
                        task: user.name,
                        target,
                    });
                }
                deleted[target.index()] = true;
            }
        }
        Ok(())
    }
}

/// Why a plan was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// Row does not match the task's table position.
    Misplaced(TaskName),
    PriorityOutOfRange(TaskName),
    /// Not strictly below the previous row.
    PriorityOrder(TaskName),
    /// A `Blink` step with a zero blink count.
    NoWork(TaskName),
    BootTaskCreated,
    CreatedTwice(TaskName),
    NeverCreated(TaskName),
    CreatorNotHigher { creator: TaskName, created: TaskName },
    DeleteOfLowerPriority { deleter: TaskName, target: TaskName },
    DeletedWhileActive(TaskName),
    ReferenceAfterDelete { task: TaskName, target: TaskName },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Misplaced(t) => write!(f, "{} is in the wrong row", t),
            PlanError::PriorityOutOfRange(t) => write!(f, "{} priority out of range", t),
            PlanError::PriorityOrder(t) => write!(f, "{} does not sit below the previous task", t),
            PlanError::NoWork(t) => write!(f, "{} blinks zero times", t),
            PlanError::BootTaskCreated => write!(f, "boot task created by a script"),
            PlanError::CreatedTwice(t) => write!(f, "{} created twice", t),
            PlanError::NeverCreated(t) => write!(f, "{} never created", t),
            PlanError::CreatorNotHigher { creator, created } => {
                write!(f, "{} creates {} without outranking it", creator, created)
            }
            PlanError::DeleteOfLowerPriority { deleter, target } => {
                write!(f, "{} deletes {} without being outranked by it", deleter, target)
            }
            PlanError::DeletedWhileActive(t) => write!(f, "{} may still be running when deleted", t),
            PlanError::ReferenceAfterDelete { task, target } => {
                write!(f, "{} names {} after its deletion", task, target)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn with_script(name: TaskName, steps: &'static [Step]) -> Plan {
        let mut plan = Plan::uniform(2);
        plan.tasks[name.index()].steps = steps;
        plan
    }

    #[test]
    fn test_shipped_plan_is_valid() {
        assert_eq!(HANDOFF.validate(), Ok(()));
        for n in 1..=4 {
            assert_eq!(Plan::uniform(n).validate(), Ok(()));
        }
    }

    #[test]
    fn test_priorities_strictly_descend() {
        let prios: [Priority; TASK_COUNT] = core::array::from_fn(|i| HANDOFF.tasks()[i].priority);
        assert_eq!(prios, [4, 3, 2, 1]);
        assert!(prios.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_shipped_blink_counts() {
        assert_eq!(HANDOFF.task(TaskName::A).blinks, 2);
        assert_eq!(HANDOFF.task(TaskName::B).blinks, 3);
        assert_eq!(HANDOFF.task(TaskName::C).blinks, 3);
    }

    #[test]
    fn test_rejects_equal_priorities() {
        let mut plan = Plan::uniform(2);
        plan.tasks[2].priority = plan.tasks[1].priority;
        assert_eq!(plan.validate(), Err(PlanError::PriorityOrder(TaskName::C)));
    }

    #[test]
    fn test_rejects_idle_priority() {
        let mut plan = Plan::uniform(2);
        plan.tasks[3].priority = IDLE_PRIORITY;
        assert_eq!(plan.validate(), Err(PlanError::PriorityOutOfRange(TaskName::D)));
    }

    #[test]
    fn test_rejects_zero_blinks() {
        assert_eq!(Plan::uniform(0).validate(), Err(PlanError::NoWork(TaskName::A)));
    }

    #[test]
    fn test_rejects_double_creation() {
        let plan = with_script(
            TaskName::B,
            &[Step::Create(TaskName::C), Step::SuspendSelf],
        );
        assert_eq!(plan.validate(), Err(PlanError::CreatedTwice(TaskName::C)));
    }

    #[test]
    fn test_rejects_missing_creation() {
        let plan = with_script(
            TaskName::A,
            &[Step::Create(TaskName::B), Step::Create(TaskName::C), Step::SuspendSelf],
        );
        assert_eq!(plan.validate(), Err(PlanError::NeverCreated(TaskName::D)));
    }

    #[test]
    fn test_rejects_creating_boot_task() {
        let plan = with_script(TaskName::C, &[Step::Create(TaskName::A), Step::SuspendSelf]);
        assert_eq!(plan.validate(), Err(PlanError::BootTaskCreated));
    }

    #[test]
    fn test_rejects_reference_after_delete() {
        let plan = with_script(
            TaskName::D,
            &[
                Step::Delete(TaskName::A),
                Step::Delete(TaskName::B),
                Step::Delete(TaskName::C),
                Step::Resume(TaskName::A),
                Step::BlinkForever,
            ],
        );
        assert_eq!(
            plan.validate(),
            Err(PlanError::ReferenceAfterDelete {
                task: TaskName::D,
                target: TaskName::A
            })
        );
    }

    #[test]
    fn test_rejects_deleting_a_lower_task() {
        let plan = with_script(TaskName::B, &[Step::Blink, Step::Delete(TaskName::C), Step::SuspendSelf]);
        assert_eq!(
            plan.validate(),
            Err(PlanError::DeleteOfLowerPriority {
                deleter: TaskName::B,
                target: TaskName::C
            })
        );
    }

    #[test]
    fn test_rejects_deleting_a_task_that_never_parks() {
        let plan = with_script(TaskName::C, &[Step::Blink]);
        assert_eq!(plan.validate(), Err(PlanError::DeletedWhileActive(TaskName::C)));
    }

    #[test]
    fn test_lifecycle_classification() {
        assert!(Step::Create(TaskName::B).is_lifecycle());
        assert!(Step::SuspendSelf.is_lifecycle());
        assert!(!Step::Blink.is_lifecycle());
        assert!(!Step::Emit("x").is_lifecycle());
        assert_eq!(Step::Delete(TaskName::C).target(), Some(TaskName::C));
        assert_eq!(Step::BlinkForever.target(), None);
    }
}
