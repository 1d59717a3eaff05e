//! # K10CR1 Rotation Stage Driver
//!
//! Host-side driver for the Thorlabs K10CR1 motorized rotation stage, spoken to
//! over its APT binary protocol on a USB-serial port.
//!
//! ## Crate Structure
//!
//! - **`codec`**: little-endian two's-complement integer encoding for any byte
//!   width, the representation every numeric APT field uses.
//! - **`protocol`**: degree/device-unit conversion, the fixed command catalogue,
//!   move-frame assembly and position-reply parsing. Pure functions, no I/O.
//! - **`hardware`**: the capability traits (`Movable`, `Homeable`), the serial
//!   transport (port opening, discovery by serial number, frame reads), and
//!   `K10cr1Driver`, which owns the connection.
//! - **`config`**: Figment-based configuration (TOML file + `K10CR1_` env vars).
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: the `StageError` enum shared by every layer.

pub mod codec;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod protocol;

pub use error::{StageError, StageResult};
pub use hardware::K10cr1Driver;
