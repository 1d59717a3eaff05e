//! Thorlabs K10CR1 Rotation Stage Driver
//!
//! Protocol: APT binary messages over the USB-serial bridge, 115200 baud, RTS/CTS
//! Reference: Thorlabs APT Communications Protocol
//!
//! The stage is half-duplex: every operation writes one frame and, when the
//! command has a reply, reads until the whole reply has arrived. The port sits
//! behind an async mutex so a transaction always completes before the next one
//! starts.
//!
//! # Example Usage
//!
//! ```no_run
//! use k10cr1::config::DeviceConfig;
//! use k10cr1::hardware::k10cr1::K10cr1Driver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let driver = K10cr1Driver::new(DeviceConfig::for_port("55000231"));
//!     driver.connect().await?;
//!
//!     driver.home().await?;
//!     driver.move_absolute(45.0).await?;
//!     driver.wait_settled().await?;
//!     println!("Position: {:.3}°", driver.get_position().await?);
//!
//!     driver.disconnect().await?;
//!     Ok(())
//! }
//! ```

use crate::config::DeviceConfig;
use crate::error::{StageError, StageResult};
use crate::hardware::capabilities::{Homeable, Movable};
use crate::hardware::serial::{drain_serial_buffer, read_frame, write_frame, DynSerial};
use crate::protocol::{
    build_fixed_frame, build_move_frame, parse_position, FixedCommand, FrameHeader, MoveKind,
    MOVE_COMPLETED_LEN,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

/// Driver for the Thorlabs K10CR1 rotation stage.
///
/// Owns the connection: `None` until [`connect`](Self::connect) succeeds or a
/// port is injected with [`with_port`](Self::with_port).
pub struct K10cr1Driver {
    port: Mutex<Option<DynSerial>>,
    settings: DeviceConfig,
}

impl K10cr1Driver {
    /// Create an unconnected driver.
    pub fn new(settings: DeviceConfig) -> Self {
        Self {
            port: Mutex::new(None),
            settings,
        }
    }

    /// Create a driver around an already open stream.
    pub fn with_port(port: DynSerial, settings: DeviceConfig) -> Self {
        Self {
            port: Mutex::new(Some(port)),
            settings,
        }
    }

    /// Connection settings this driver was created with.
    pub fn settings(&self) -> &DeviceConfig {
        &self.settings
    }

    /// Resolve the configured port (path or serial number) and open it.
    #[cfg(feature = "serial")]
    pub async fn connect(&self) -> StageResult<()> {
        use crate::hardware::serial::{open_serial_async, resolve_port};

        let path = resolve_port(&self.settings.port)?;
        let stream = open_serial_async(&path, self.settings.baud_rate).await?;
        *self.port.lock().await = Some(Box::new(stream));

        info!(port = %path, baud = self.settings.baud_rate, "Connected to K10CR1");
        Ok(())
    }

    /// Serial support is compiled out; only injected ports can be used.
    #[cfg(not(feature = "serial"))]
    pub async fn connect(&self) -> StageResult<()> {
        Err(StageError::SerialFeatureDisabled)
    }

    /// Close the port. Operations afterwards fail with `NotConnected`.
    pub async fn disconnect(&self) -> StageResult<()> {
        if let Some(mut port) = self.port.lock().await.take() {
            port.shutdown().await?;
            info!("Disconnected from K10CR1");
        }
        Ok(())
    }

    /// Whether a port is currently held.
    pub async fn is_connected(&self) -> bool {
        self.port.lock().await.is_some()
    }

    /// Flash the front-panel LED (MGMSG_MOD_IDENTIFY). No reply.
    pub async fn identify(&self) -> StageResult<()> {
        self.fixed(FixedCommand::Identify).await.map(|_| ())
    }

    /// Home the stage and return the 6-byte homed reply.
    pub async fn home(&self) -> StageResult<Vec<u8>> {
        self.fixed(FixedCommand::Home).await
    }

    /// Rotate by `angle_deg` relative to the current position.
    pub async fn move_relative(&self, angle_deg: f64) -> StageResult<()> {
        let frame = build_move_frame(MoveKind::Relative, angle_deg)?;
        self.transaction(&frame, None, self.settings.timeout())
            .await
            .map(|_| ())
    }

    /// Rotate to the absolute angle `angle_deg`.
    pub async fn move_absolute(&self, angle_deg: f64) -> StageResult<()> {
        let frame = build_move_frame(MoveKind::Absolute, angle_deg)?;
        self.transaction(&frame, None, self.settings.timeout())
            .await
            .map(|_| ())
    }

    /// Jog one step and return the 20-byte move-completed reply.
    pub async fn jog(&self) -> StageResult<Vec<u8>> {
        self.fixed(FixedCommand::Jog).await
    }

    /// Current angle in degrees, rounded to three decimals.
    pub async fn get_position(&self) -> StageResult<f64> {
        let reply = self.fixed(FixedCommand::GetPosition).await?;
        parse_position(&reply)
    }

    /// Wait for the move-completed message that follows a move.
    ///
    /// Bounded by `motion_timeout_ms`, since the message only arrives once the
    /// stage stops.
    #[instrument(skip(self), err)]
    pub async fn wait_settled(&self) -> StageResult<()> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(StageError::NotConnected)?;

        let reply =
            read_frame(port, MOVE_COMPLETED_LEN, self.settings.motion_timeout()).await?;
        log_reply(&reply);
        Ok(())
    }

    #[instrument(skip(self, command), fields(command = command.name()), err)]
    async fn fixed(&self, command: FixedCommand) -> StageResult<Vec<u8>> {
        let frame = build_fixed_frame(command);
        let timeout = if command.awaits_motion() {
            self.settings.motion_timeout()
        } else {
            self.settings.timeout()
        };
        let reply = self.transaction(frame, command.reply_len(), timeout).await?;
        Ok(reply.unwrap_or_default())
    }

    /// Write `frame` and read `reply_len` bytes back, if a reply is expected.
    #[instrument(skip(self, frame), fields(frame = %hex::encode(frame)), err)]
    async fn transaction(
        &self,
        frame: &[u8],
        reply_len: Option<usize>,
        timeout: Duration,
    ) -> StageResult<Option<Vec<u8>>> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(StageError::NotConnected)?;

        // Unread move-completed messages would otherwise be taken as the reply
        if !self.settings.drain().is_zero() {
            let discarded = drain_serial_buffer(port, self.settings.drain()).await;
            if discarded > 0 {
                debug!(discarded, "Discarded stale bytes before K10CR1 command");
            }
        }

        write_frame(port, frame).await?;

        let Some(len) = reply_len else {
            return Ok(None);
        };
        let reply = read_frame(port, len, timeout).await?;
        log_reply(&reply);
        Ok(Some(reply))
    }
}

fn log_reply(reply: &[u8]) {
    match FrameHeader::parse(reply) {
        Ok(header) => debug!(
            opcode = format_args!("{:#06x}", header.opcode),
            len = reply.len(),
            "K10CR1 reply"
        ),
        Err(_) => trace!(len = reply.len(), "K10CR1 reply without header"),
    }
}

#[async_trait]
impl Movable for K10cr1Driver {
    async fn move_abs(&self, position: f64) -> anyhow::Result<()> {
        Ok(self.move_absolute(position).await?)
    }

    async fn move_rel(&self, distance: f64) -> anyhow::Result<()> {
        Ok(self.move_relative(distance).await?)
    }

    async fn position(&self) -> anyhow::Result<f64> {
        Ok(self.get_position().await?)
    }

    async fn wait_settled(&self) -> anyhow::Result<()> {
        Ok(K10cr1Driver::wait_settled(self).await?)
    }
}

#[async_trait]
impl Homeable for K10cr1Driver {
    async fn home(&self) -> anyhow::Result<()> {
        K10cr1Driver::home(self).await?;
        Ok(())
    }
}
