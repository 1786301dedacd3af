//! # Architecture Port
//!
//! Context switching and tick source for the bare-metal target. The rest
//! of the crate only sees `kernel`'s API.

pub mod cortex_m4;
