//! Unlocks or locks the flash protection of AM32 ESC microcontrollers.
//!
//! OpenOCD is launched again and again with the script for the selected MCU
//! until it reports success, so the user can keep re-plugging or holding the
//! programming pads while the tool retries.

pub mod config;
pub mod feedback;
pub mod invocation;
pub mod logging;
pub mod resources;
pub mod runner;
pub mod selection;
pub mod session_log;
pub mod status;
