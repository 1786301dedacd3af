//! # Host Simulator
//!
//! Runs a plan against the real [`Scheduler`] without a CPU to switch.
//!
//! Each task script is stepped one [`Step`] at a time. After every step
//! the simulator honours `needs_reschedule` exactly where PendSV would on
//! the target: before the running task's next step. A step itself is
//! never interrupted, which matches the target too, since a spin delay
//! only ever competes with lower-priority tasks.
//!
//! Time advances one tick per read of the clock, so spin delays finish
//! after as many polls as they wait ticks.
//!
//! Everything observable lands in a [`Trace`].

use core::cell::Cell;
use core::fmt;

use heapless::Vec;

use crate::board::{Board, Led};
use crate::config::MAX_TASKS;
use crate::error::{KernelError, OrchestrationError};
use crate::orchestrator::{Kernel, Orchestrator};
use crate::plan::{Plan, Step, TaskName, TaskPlan, TASK_COUNT};
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::task::{Priority, TaskHandle, TaskState, Tick};
use crate::work::{self, TickSource};

/// Events kept per simulation. Later events are counted, not stored.
pub const TRACE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The CPU moved to `task`.
    Switch(TaskName),
    Created { task: TaskName, priority: Priority },
    Suspended(TaskName),
    Resumed(TaskName),
    Deleted(TaskName),
    /// `task` wrote a line to the debug channel.
    Emit(TaskName),
    Toggle { task: TaskName, led: Led },
    /// Nothing left to run.
    Idle,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Switch(t) => write!(f, "switch    -> {}", t),
            Event::Created { task, priority } => write!(f, "create    {} @ {}", task, priority),
            Event::Suspended(t) => write!(f, "suspend   {}", t),
            Event::Resumed(t) => write!(f, "resume    {}", t),
            Event::Deleted(t) => write!(f, "delete    {}", t),
            Event::Emit(t) => write!(f, "emit      {}", t),
            Event::Toggle { task, led } => write!(f, "toggle    {} ({})", led, task),
            Event::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Trace {
    events: Vec<Event, TRACE_CAPACITY>,
    dropped: usize,
}

impl Trace {
    fn push(&mut self, event: Event) {
        if self.events.push(event).is_err() {
            self.dropped += 1;
        }
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events that did not fit.
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Who got the CPU, in order.
    pub fn switches(&self) -> impl Iterator<Item = TaskName> + '_ {
        self.events.iter().filter_map(|e| match e {
            Event::Switch(t) => Some(*t),
            _ => None,
        })
    }

    pub fn toggles_by(&self, task: TaskName) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Toggle { task: t, .. } if *t == task))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Simulated kernel
// ---------------------------------------------------------------------------

/// Advances one tick per read.
#[derive(Debug, Default)]
pub struct SimClock(Cell<Tick>);

impl SimClock {
    pub const fn starting_at(tick: Tick) -> Self {
        Self(Cell::new(tick))
    }
}

impl TickSource for SimClock {
    fn now(&self) -> Tick {
        let now = self.0.get();
        self.0.set(now.wrapping_add(1));
        now
    }
}

/// The [`Kernel`] the simulator hands to the orchestrator.
pub struct SimPort {
    scheduler: Scheduler,
    names: [Option<TaskName>; MAX_TASKS],
    clock: SimClock,
    trace: Trace,
    indicators: u8,
}

impl SimPort {
    fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            names: [None; MAX_TASKS],
            clock: SimClock::default(),
            trace: Trace::default(),
            indicators: 0,
        }
    }

    /// Plan task holding the CPU.
    fn running(&self) -> Option<TaskName> {
        self.scheduler.current().and_then(|slot| self.names[slot])
    }

    fn name_of(&self, handle: TaskHandle) -> Option<TaskName> {
        self.names.get(handle.slot()).copied().flatten()
    }

    fn is_suspended(&self, handle: Option<TaskHandle>) -> bool {
        handle.is_some_and(|h| self.scheduler.state_of(h) == Ok(TaskState::Suspended))
    }
}

impl TickSource for SimPort {
    fn now(&self) -> Tick {
        self.clock.now()
    }
}

impl Kernel for SimPort {
    fn create_task(&mut self, task: &TaskPlan) -> Result<TaskHandle, KernelError> {
        let handle = self.scheduler.create_task(task.name.as_str(), task.priority)?;
        self.names[handle.slot()] = Some(task.name);
        self.trace.push(Event::Created {
            task: task.name,
            priority: task.priority,
        });
        Ok(handle)
    }

    fn suspend(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        let handle = target.or_else(|| self.scheduler.current_handle());
        let already = self.is_suspended(handle);
        self.scheduler.suspend(target)?;

        if !already {
            if let Some(name) = handle.and_then(|h| self.name_of(h)) {
                self.trace.push(Event::Suspended(name));
            }
        }
        Ok(())
    }

    fn resume(&mut self, target: TaskHandle) -> Result<(), KernelError> {
        let was_suspended = self.is_suspended(Some(target));
        self.scheduler.resume(target)?;

        if was_suspended {
            if let Some(name) = self.name_of(target) {
                self.trace.push(Event::Resumed(name));
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: Option<TaskHandle>) -> Result<(), KernelError> {
        let handle = target.or_else(|| self.scheduler.current_handle());
        self.scheduler.delete(target)?;

        if let Some(handle) = handle {
            if let Some(name) = self.names[handle.slot()].take() {
                self.trace.push(Event::Deleted(name));
            }
        }
        Ok(())
    }

    fn current_priority(&self) -> Option<Priority> {
        self.scheduler.current_priority()
    }
}

/// Board view handed to a task's work step.
struct SimOutput<'a> {
    task: TaskName,
    trace: &'a mut Trace,
    indicators: &'a mut u8,
}

impl Board for SimOutput<'_> {
    fn toggle(&mut self, led: Led) {
        *self.indicators ^= led.mask();
        self.trace.push(Event::Toggle {
            task: self.task,
            led,
        });
    }

    fn emit(&mut self, _line: &str) {
        self.trace.push(Event::Emit(self.task));
    }
}

// ---------------------------------------------------------------------------
// Simulation driver
// ---------------------------------------------------------------------------

/// Outcome of one [`Simulation::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// `task` ran one step.
    Stepped(TaskName),
    /// Every live task is suspended.
    Idle,
}

pub struct Simulation<'p> {
    orchestrator: Orchestrator<'p>,
    port: SimPort,
    /// Next step of each task script; the simulated saved context.
    pcs: [usize; TASK_COUNT],
}

impl<'p> Simulation<'p> {
    pub fn new(plan: &'p Plan) -> Self {
        Self {
            orchestrator: Orchestrator::new(plan),
            port: SimPort::new(),
            pcs: [0; TASK_COUNT],
        }
    }

    /// Start the clock at `tick` instead of zero.
    pub fn with_clock(mut self, tick: Tick) -> Self {
        self.port.clock = SimClock::starting_at(tick);
        self
    }

    /// Create the boot task and start the scheduler.
    pub fn boot(&mut self) -> Result<(), OrchestrationError> {
        self.orchestrator.bootstrap(&mut self.port)?;
        self.port.scheduler.start().map_err(OrchestrationError::Start)?;
        if let Some(first) = self.port.running() {
            self.port.trace.push(Event::Switch(first));
        }
        Ok(())
    }

    /// Run one step of whichever task holds the CPU, then reschedule if
    /// that step asked for it.
    pub fn step(&mut self) -> Result<Progress, OrchestrationError> {
        let Some(me) = self.port.running() else {
            return Ok(Progress::Idle);
        };
        let plan = self.orchestrator.plan();
        let task = plan.task(me);
        let pc = &mut self.pcs[me.index()];

        match task.steps.get(*pc) {
            None => self.orchestrator.finish(me, &mut self.port)?,
            Some(step) if step.is_lifecycle() => {
                *pc += 1;
                self.orchestrator.apply(me, step, &mut self.port)?;
            }
            Some(step) => {
                // BlinkForever never moves on.
                if !matches!(step, Step::BlinkForever) {
                    *pc += 1;
                }
                let SimPort {
                    clock,
                    trace,
                    indicators,
                    ..
                } = &mut self.port;
                let mut out = SimOutput {
                    task: me,
                    trace,
                    indicators,
                };
                work::perform(task, step, &*clock, &mut out);
            }
        }

        self.reschedule();
        Ok(Progress::Stepped(me))
    }

    /// Step until idle or until `max_steps` steps have run. Returns the
    /// number of steps taken.
    pub fn run(&mut self, max_steps: usize) -> Result<usize, OrchestrationError> {
        for taken in 0..max_steps {
            if self.step()? == Progress::Idle {
                return Ok(taken);
            }
        }
        Ok(max_steps)
    }

    fn reschedule(&mut self) {
        if !self.port.scheduler.needs_reschedule() {
            return;
        }
        let prev = self.port.scheduler.current();
        match self.port.scheduler.schedule() {
            Some(next) if Some(next) != prev => {
                if let Some(name) = self.port.names[next] {
                    self.port.trace.push(Event::Switch(name));
                }
            }
            Some(_) => {}
            None => self.port.trace.push(Event::Idle),
        }
    }

    #[inline]
    pub fn trace(&self) -> &Trace {
        &self.port.trace
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        self.orchestrator.registry()
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.port.scheduler
    }

    /// Task holding the CPU.
    #[inline]
    pub fn running(&self) -> Option<TaskName> {
        self.port.running()
    }

    /// Packed on/off state of the indicators (see [`Led::mask`]).
    #[inline]
    pub fn indicators(&self) -> u8 {
        self.port.indicators
    }

    pub fn now(&self) -> Tick {
        self.port.clock.0.get()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BASE_PRIORITY;
    use crate::plan::HANDOFF;
    use crate::registry::Lifecycle;

    /// Enough steps to get every handoff done and D well into its loop.
    const BUDGET: usize = 40;

    fn run_plan(plan: &Plan) -> Simulation<'_> {
        let mut sim = Simulation::new(plan);
        sim.boot().unwrap();
        assert_eq!(sim.run(BUDGET).unwrap(), BUDGET);
        sim
    }

    fn position(trace: &Trace, event: Event) -> usize {
        trace
            .events()
            .iter()
            .position(|e| *e == event)
            .unwrap_or_else(|| panic!("{} missing from trace", event))
    }

    #[test]
    fn test_boot_runs_only_task_a() {
        let mut sim = Simulation::new(&HANDOFF);
        sim.boot().unwrap();
        assert_eq!(sim.running(), Some(TaskName::A));
        assert_eq!(sim.scheduler().live_tasks(), 1);
        assert_eq!(
            sim.trace().events(),
            [
                Event::Created {
                    task: TaskName::A,
                    priority: BASE_PRIORITY,
                },
                Event::Switch(TaskName::A),
            ]
        );
    }

    #[test]
    fn test_handoff_order() {
        for n in 1..=3 {
            let plan = Plan::uniform(n);
            let sim = run_plan(&plan);
            let order: std::vec::Vec<TaskName> = sim.trace().switches().collect();
            assert_eq!(
                order,
                [TaskName::A, TaskName::B, TaskName::A, TaskName::B, TaskName::C, TaskName::D],
                "blink count {}",
                n
            );
        }
    }

    #[test]
    fn test_toggle_counts_with_two_blinks() {
        let plan = Plan::uniform(2);
        let sim = run_plan(&plan);
        let trace = sim.trace();

        assert_eq!(trace.toggles_by(TaskName::B), 4);
        assert_eq!(trace.toggles_by(TaskName::A), 4);
        assert_eq!(trace.toggles_by(TaskName::C), 4);
        // D keeps going for as long as the simulation runs.
        let before = trace.toggles_by(TaskName::D);
        assert!(before > 4);

        let mut sim = sim;
        sim.run(5).unwrap();
        assert_eq!(sim.trace().toggles_by(TaskName::D), before + 10);
    }

    #[test]
    fn test_shipped_plan_toggle_counts() {
        let sim = run_plan(&HANDOFF);
        assert_eq!(sim.trace().toggles_by(TaskName::A), 4);
        assert_eq!(sim.trace().toggles_by(TaskName::B), 6);
        assert_eq!(sim.trace().toggles_by(TaskName::C), 6);
    }

    #[test]
    fn test_toggles_use_each_task_indicator() {
        let sim = run_plan(&HANDOFF);
        for event in sim.trace().events() {
            if let Event::Toggle { task, led } = event {
                assert_eq!(*led, HANDOFF.task(*task).led);
            }
        }
    }

    #[test]
    fn test_only_d_survives() {
        let sim = run_plan(&HANDOFF);
        assert_eq!(sim.running(), Some(TaskName::D));
        assert_eq!(sim.scheduler().live_tasks(), 1);
        for name in [TaskName::A, TaskName::B, TaskName::C] {
            assert_eq!(sim.registry().lifecycle(name), Lifecycle::Deleted);
        }
        assert_eq!(sim.registry().lifecycle(TaskName::D), Lifecycle::Created);
        assert!(sim.registry().alive().eq([TaskName::D]));
    }

    #[test]
    fn test_indicators_settle_after_every_step() {
        let mut sim = Simulation::new(&HANDOFF);
        sim.boot().unwrap();
        for _ in 0..BUDGET {
            sim.step().unwrap();
            // Whole blinks only: no step leaves an indicator lit.
            assert_eq!(sim.indicators(), 0);
        }

        let d_runs = position(sim.trace(), Event::Switch(TaskName::D));
        let after_d = &sim.trace().events()[d_runs..];
        assert!(after_d.iter().any(|e| matches!(e, Event::Toggle { .. })));
        for event in after_d {
            if let Event::Toggle { led, .. } = event {
                assert_eq!(*led, Led::Led3);
            }
        }
    }

    #[test]
    fn test_priorities_descend_after_creation() {
        let mut sim = Simulation::new(&HANDOFF);
        sim.boot().unwrap();
        // Emit plus three creations.
        sim.run(4).unwrap();

        let prio = |name| {
            let handle = sim.registry().handle(name).unwrap();
            sim.scheduler().priority_of(handle).unwrap()
        };
        assert!(prio(TaskName::A) > prio(TaskName::B));
        assert!(prio(TaskName::B) > prio(TaskName::C));
        assert!(prio(TaskName::C) > prio(TaskName::D));
        // Creating lower-priority tasks did not take the CPU from A.
        assert_eq!(sim.running(), Some(TaskName::A));
    }

    #[test]
    fn test_resume_preempts_before_callers_next_step() {
        let sim = run_plan(&HANDOFF);
        let trace = sim.trace().events();
        let resumed = position(sim.trace(), Event::Resumed(TaskName::A));

        assert_eq!(trace[resumed + 1], Event::Switch(TaskName::A));
        // B's next event only comes after A has blinked and suspended.
        let a_suspends_again = trace[resumed..]
            .iter()
            .position(|e| *e == Event::Suspended(TaskName::A))
            .unwrap()
            + resumed;
        let b_next = trace[resumed + 1..]
            .iter()
            .position(|e| matches!(e, Event::Toggle { task: TaskName::B, .. } | Event::Suspended(TaskName::B)))
            .unwrap()
            + resumed
            + 1;
        assert!(a_suspends_again < b_next);
    }

    #[test]
    fn test_no_reference_after_delete() {
        let sim = run_plan(&HANDOFF);
        let trace = sim.trace().events();

        for name in [TaskName::A, TaskName::B, TaskName::C] {
            let deleted = position(sim.trace(), Event::Deleted(name));
            let touched_later = trace[deleted + 1..].iter().any(|e| {
                matches!(e, Event::Suspended(t) | Event::Resumed(t) | Event::Deleted(t) | Event::Switch(t) if *t == name)
                    || matches!(e, Event::Toggle { task, .. } if *task == name)
            });
            assert!(!touched_later, "{} touched after deletion", name);
        }
    }

    #[test]
    fn test_every_task_announces_itself_once() {
        let sim = run_plan(&HANDOFF);
        for name in TaskName::ALL {
            let emits = sim
                .trace()
                .events()
                .iter()
                .filter(|e| **e == Event::Emit(name))
                .count();
            assert_eq!(emits, 1, "{}", name);
        }
    }

    #[test]
    fn test_work_holds_the_clock() {
        let plan = Plan::uniform(1);
        let sim = run_plan(&plan);
        // Every toggle is followed by a half-period spin.
        let toggles = TaskName::ALL
            .iter()
            .map(|&t| sim.trace().toggles_by(t) as u32)
            .sum::<u32>();
        assert!(sim.now() >= toggles * crate::config::BLINK_HALF_PERIOD_MS);
    }

    #[test]
    fn test_simulation_survives_clock_wraparound() {
        let plan = Plan::uniform(2);
        let mut sim = Simulation::new(&plan).with_clock(Tick::MAX - 600);
        sim.boot().unwrap();
        sim.run(BUDGET).unwrap();
        let order: std::vec::Vec<TaskName> = sim.trace().switches().collect();
        assert_eq!(
            order,
            [TaskName::A, TaskName::B, TaskName::A, TaskName::B, TaskName::C, TaskName::D]
        );
    }

    #[test]
    fn test_idle_when_everything_suspends() {
        static PARKED: Plan = Plan::new([
            TaskPlan {
                name: TaskName::A,
                priority: 4,
                led: Led::Blue,
                blinks: 1,
                steps: &[
                    Step::Create(TaskName::B),
                    Step::Create(TaskName::C),
                    Step::Create(TaskName::D),
                    Step::SuspendSelf,
                ],
            },
            TaskPlan {
                name: TaskName::B,
                priority: 3,
                led: Led::Led1,
                blinks: 1,
                steps: &[Step::SuspendSelf],
            },
            TaskPlan {
                name: TaskName::C,
                priority: 2,
                led: Led::Led2,
                blinks: 1,
                steps: &[Step::SuspendSelf],
            },
            TaskPlan {
                name: TaskName::D,
                priority: 1,
                led: Led::Led3,
                blinks: 1,
                steps: &[Step::SuspendSelf],
            },
        ]);

        let mut sim = Simulation::new(&PARKED);
        sim.boot().unwrap();
        let steps = sim.run(BUDGET).unwrap();
        assert_eq!(steps, 7);
        assert_eq!(sim.running(), None);
        assert_eq!(sim.trace().events().last(), Some(&Event::Idle));
        assert_eq!(sim.step(), Ok(Progress::Idle));
    }

    #[test]
    fn test_exhausted_script_deletes_its_task() {
        static SHORT: Plan = Plan::new([
            TaskPlan {
                name: TaskName::A,
                priority: 4,
                led: Led::Blue,
                blinks: 1,
                steps: &[
                    Step::Create(TaskName::B),
                    Step::Create(TaskName::C),
                    Step::Create(TaskName::D),
                ],
            },
            TaskPlan {
                name: TaskName::B,
                priority: 3,
                led: Led::Led1,
                blinks: 1,
                steps: &[],
            },
            TaskPlan {
                name: TaskName::C,
                priority: 2,
                led: Led::Led2,
                blinks: 1,
                steps: &[],
            },
            TaskPlan {
                name: TaskName::D,
                priority: 1,
                led: Led::Led3,
                blinks: 1,
                steps: &[],
            },
        ]);

        let mut sim = Simulation::new(&SHORT);
        sim.boot().unwrap();
        sim.run(BUDGET).unwrap();
        assert_eq!(sim.scheduler().live_tasks(), 0);
        for name in TaskName::ALL {
            assert_eq!(sim.registry().lifecycle(name), Lifecycle::Deleted);
        }
    }
}
