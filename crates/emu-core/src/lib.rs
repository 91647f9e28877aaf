//! Core traits and types for cycle-accurate emulation.
//!
//! A CPU core never owns its memory map. It is handed a bus on every call and
//! charges its own clock for each access it makes.

mod bus;
mod clock;
mod observable;
mod ticks;

pub use bus::{Bus, IoBus, SimpleBus};
pub use clock::Clock;
pub use observable::{Observable, Value};
pub use ticks::Ticks;
