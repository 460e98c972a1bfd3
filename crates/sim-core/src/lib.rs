//! Core traits and types shared by the memory hierarchy and CPU controller.
//!
//! Everything advances one logical clock tick at a time. All latency is
//! expressed in cycles of that one clock. No exceptions.

mod bus;
mod observable;

pub use bus::WordBus;
pub use observable::{Observable, Value};
