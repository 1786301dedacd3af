//! # Board
//!
//! The output side the tasks consume: indicators they can toggle and a
//! line-oriented debug channel. Bring-up of the actual pins and UART is
//! not Baton's business; the bare-metal runtime routes both through
//! semihosting and the simulator records them.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::error::Fatal;

/// Indicator identifiers, named after the board's LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    /// RGB blue channel (LEDB).
    Blue,
    /// RGB red channel (LEDR). Reserved for fatal errors.
    Red,
    Led1,
    Led2,
    Led3,
}

impl Led {
    pub const ALL: [Led; 5] = [Led::Blue, Led::Red, Led::Led1, Led::Led2, Led::Led3];

    /// Bit of this indicator in a packed on/off mask.
    #[inline]
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Led::Blue => "LEDB",
            Led::Red => "LEDR",
            Led::Led1 => "LED1",
            Led::Led2 => "LED2",
            Led::Led3 => "LED3",
        }
    }
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output collaborator used by task scripts.
pub trait Board {
    /// Flip an indicator.
    fn toggle(&mut self, led: Led);

    /// Emit one line of debug text.
    fn emit(&mut self, line: &str);
}

/// Report `reason` on `board`, light the red indicator and panic.
///
/// The message is cut at 96 bytes. On the target the panic handler halts
/// the core.
pub fn fatal<B: Board + ?Sized>(board: &mut B, reason: Fatal) -> ! {
    let mut line: String<96> = String::new();
    let _ = write!(line, "FATAL: {}", reason);
    board.emit(&line);
    board.toggle(Led::Red);
    panic!("{}", line);
}
