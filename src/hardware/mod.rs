//! Stage hardware
//!
//! Capability traits, the serial transport, and the K10CR1 driver.

pub mod capabilities;
pub mod k10cr1;
pub mod serial;

pub use k10cr1::K10cr1Driver;
