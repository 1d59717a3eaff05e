//! Hardware capability traits
//!
//! Devices implement the small capability traits they actually support rather
//! than one monolithic device trait, so generic code can be written against a
//! trait bound and exercised with any implementation:
//!
//! ```rust,ignore
//! async fn scan<T: Movable>(stage: &T, targets: &[f64]) -> Result<Vec<f64>> {
//!     let mut reached = Vec::new();
//!     for &target in targets {
//!         move_and_settle(stage, target).await?;
//!         reached.push(stage.position().await?);
//!     }
//!     Ok(reached)
//! }
//! ```
//!
//! Each capability trait is async, `Send + Sync`, and returns `anyhow::Result`.

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Motion Control
///
/// Devices that can move to positions (rotation stages, actuators).
///
/// # Contract
/// - Positions are in device-native units (degrees for rotation stages)
/// - `move_abs` and `move_rel` initiate motion and may return before completion
/// - `wait_settled` blocks until motion completes
/// - `position` returns current position (may be approximate during motion)
///
/// # Thread Safety
/// - All methods take `&self`; implementations use interior mutability
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Move relative to current position (positive or negative)
    async fn move_rel(&self, distance: f64) -> Result<()>;

    /// Get current position
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// Should have internal timeout to prevent infinite blocking.
    async fn wait_settled(&self) -> Result<()>;
}

/// Capability: Homing
///
/// Devices that find a mechanical reference position.
#[async_trait]
pub trait Homeable: Send + Sync {
    /// Drive to the home position and return once the device reports it.
    async fn home(&self) -> Result<()>;
}

/// Move to `position` and wait for the device to report completion.
pub async fn move_and_settle<T: Movable + ?Sized>(device: &T, position: f64) -> Result<()> {
    device.move_abs(position).await?;
    device.wait_settled().await
}
