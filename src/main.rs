//! # Baton Firmware
//!
//! Four tasks pass control down a priority ladder:
//!
//! | Task | Priority | Indicator | Script |
//! |------|----------|-----------|--------|
//! | A | 4 | LEDB | create B, C, D · suspend · blink 2× · suspend |
//! | B | 3 | LED1 | blink 3× · resume A · suspend |
//! | C | 2 | LED2 | blink 3× · suspend |
//! | D | 1 | LED3 | delete A, B, C · blink forever |
//!
//! Expected run order: A → B → A → B → C → D.
//!
//! On a Cortex-M4 target (`thumbv7em-none-eabihf`) this is the firmware.
//! On the host it replays the same plan in the simulator and prints the
//! trace.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use baton::board::Board;
    use baton::config::WELCOME_TEXT;
    use baton::error::Fatal;
    use baton::kernel;
    use baton::runtime::{self, Semihosting};

    /// Firmware entry point. Builds the boot task and hands the CPU to
    /// the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let mut board = Semihosting;

        let Some(cp) = cortex_m::Peripherals::take() else {
            runtime::halt(&mut board, Fatal::NoPeripherals);
        };

        board.emit(WELCOME_TEXT);

        if let Err(e) = kernel::init() {
            runtime::halt(&mut board, Fatal::Init(e));
        }
        if let Err(e) = runtime::bootstrap() {
            runtime::halt(&mut board, Fatal::Startup(e));
        }

        let err = kernel::start(cp);
        runtime::halt(&mut board, Fatal::SchedulerReturned(err))
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    use baton::config::WELCOME_TEXT;
    use baton::plan::HANDOFF;
    use baton::sim::Simulation;

    // Enough for the handoff sequence plus a few rounds of D's blinking.
    const STEPS: usize = 30;

    println!("{}", WELCOME_TEXT);

    let mut sim = Simulation::new(&HANDOFF);
    let result = sim.boot().and_then(|()| sim.run(STEPS));

    for event in sim.trace().events() {
        println!("{}", event);
    }
    if sim.trace().dropped() > 0 {
        println!("... {} events dropped", sim.trace().dropped());
    }

    let alive: Vec<&str> = sim.registry().alive().map(|t| t.as_str()).collect();
    println!("alive: {} · indicators: {:#07b}", alive.join(", "), sim.indicators());

    if let Err(e) = result {
        eprintln!("FATAL: {}", e);
        std::process::exit(1);
    }
}
