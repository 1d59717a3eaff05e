//! Serial transport for the stage.
//!
//! The protocol layer only needs a byte stream, so the driver stores any type
//! implementing `AsyncRead + AsyncWrite` behind [`DynSerial`]. Real hardware is
//! a `tokio_serial::SerialStream`; tests use `tokio::io::duplex`.
//!
//! # Utilities
//!
//! - [`open_serial_async`]: open a port with the APT serial settings
//! - [`resolve_port`]: turn a port path or USB serial number into a port path
//! - [`read_frame`]: accumulate partial reads until a frame is complete
//! - [`drain_serial_buffer`]: discard stale bytes before a request

use crate::error::{StageError, StageResult};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Baud rate of the APT USB-serial bridge.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Trait alias for async serial port I/O.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// An enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSummary {
    /// OS port path
    pub name: String,
    /// USB serial number, for USB ports
    pub serial_number: Option<String>,
    /// USB product string, for USB ports
    pub product: Option<String>,
}

/// Pick the port named by `identifier` from `ports`.
///
/// An exact port-name match wins; otherwise the first USB port whose serial
/// number contains `identifier` is chosen.
pub fn match_port<'a>(identifier: &str, ports: &'a [PortSummary]) -> Option<&'a PortSummary> {
    ports.iter().find(|p| p.name == identifier).or_else(|| {
        ports.iter().find(|p| {
            p.serial_number
                .as_deref()
                .is_some_and(|serial| serial.contains(identifier))
        })
    })
}

#[cfg_attr(not(feature = "serial"), allow(dead_code))]
fn looks_like_path(identifier: &str) -> bool {
    identifier.contains('/') || identifier.contains('\\') || identifier.starts_with("COM")
}

/// List serial ports visible to the OS.
#[cfg(feature = "serial")]
pub fn list_ports() -> StageResult<Vec<PortSummary>> {
    let ports = tokio_serial::available_ports().map_err(std::io::Error::from)?;
    Ok(ports
        .into_iter()
        .map(|info| match info.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => PortSummary {
                name: info.port_name,
                serial_number: usb.serial_number,
                product: usb.product,
            },
            _ => PortSummary {
                name: info.port_name,
                serial_number: None,
                product: None,
            },
        })
        .collect())
}

/// Resolve a port path or USB serial number to the path to open.
///
/// Paths that are not enumerated (pseudo terminals, for instance) are passed
/// through unchanged so that opening them reports the real error.
#[cfg(feature = "serial")]
pub fn resolve_port(identifier: &str) -> StageResult<String> {
    let ports = list_ports()?;
    if let Some(port) = match_port(identifier, &ports) {
        tracing::debug!(identifier, port = %port.name, "Resolved stage port");
        return Ok(port.name.clone());
    }
    if looks_like_path(identifier) {
        return Ok(identifier.to_string());
    }
    Err(StageError::DeviceNotFound(identifier.to_string()))
}

/// Open a serial port using spawn_blocking.
///
/// APT settings: 8 data bits, no parity, 1 stop bit, RTS/CTS flow control.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> StageResult<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let path = port_path.to_string();
    let stream = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::Hardware)
            .open_native_async()
            .map_err(std::io::Error::from)
    })
    .await
    .map_err(std::io::Error::other)??;

    Ok(stream)
}

/// Write a complete frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(port: &mut W, frame: &[u8]) -> StageResult<()> {
    port.write_all(frame).await?;
    port.flush().await?;
    trace!(frame = %hex::encode(frame), "Frame written");
    Ok(())
}

/// Read until exactly `expected` bytes have arrived.
///
/// Short reads only mean the frame is not complete yet. The whole frame must
/// arrive before `timeout` elapses.
pub async fn read_frame<R: AsyncRead + Unpin>(
    port: &mut R,
    expected: usize,
    timeout: Duration,
) -> StageResult<Vec<u8>> {
    let mut frame = Vec::with_capacity(expected);
    let mut buf = [0u8; 64];
    let deadline = tokio::time::Instant::now() + timeout;

    while frame.len() < expected {
        // Never consume bytes that belong to the next frame
        let want = (expected - frame.len()).min(buf.len());
        match tokio::time::timeout_at(deadline, port.read(&mut buf[..want])).await {
            Ok(Ok(0)) => {
                return Err(StageError::UnexpectedEof {
                    expected,
                    received: frame.len(),
                })
            }
            Ok(Ok(n)) => {
                frame.extend_from_slice(&buf[..n]);
                trace!(chunk = n, total = frame.len(), expected, "Partial read");
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(StageError::Timeout {
                    expected,
                    received: frame.len(),
                })
            }
        }
    }

    Ok(frame)
}

/// Discard whatever is waiting in the receive buffer.
///
/// Returns the number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, timeout: Duration) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + timeout;
    let mut total_discarded = 0usize;

    loop {
        match tokio::time::timeout_at(deadline, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    total_discarded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortSummary> {
        vec![
            PortSummary {
                name: "/dev/ttyS0".into(),
                serial_number: None,
                product: None,
            },
            PortSummary {
                name: "/dev/ttyUSB0".into(),
                serial_number: Some("55000231".into()),
                product: Some("Kinesis K10CR1 Rotary Stage".into()),
            },
        ]
    }

    #[test]
    fn test_match_port_by_name() {
        let ports = ports();
        let found = match_port("/dev/ttyS0", &ports).unwrap();
        assert_eq!(found.name, "/dev/ttyS0");
    }

    #[test]
    fn test_match_port_by_serial_substring() {
        let ports = ports();
        let found = match_port("000231", &ports).unwrap();
        assert_eq!(found.name, "/dev/ttyUSB0");
        assert!(match_port("99999999", &ports).is_none());
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("/dev/pts/3"));
        assert!(looks_like_path("COM4"));
        assert!(!looks_like_path("55000231"));
    }

    #[tokio::test]
    async fn test_read_frame_accumulates_fragments() {
        let (mut device, mut host) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            device.write_all(&[1, 2, 3]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            device.write_all(&[4, 5, 6, 7]).await.unwrap();
            device
        });

        let frame = read_frame(&mut host, 6, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, vec![1, 2, 3, 4, 5, 6]);

        // The seventh byte stays in the stream
        let _device = writer.await.unwrap();
        let mut rest = [0u8; 1];
        host.read_exact(&mut rest).await.unwrap();
        assert_eq!(rest, [7]);
    }

    #[tokio::test]
    async fn test_read_frame_times_out() {
        let (mut device, mut host) = tokio::io::duplex(64);
        device.write_all(&[0xaa, 0xbb]).await.unwrap();

        let err = read_frame(&mut host, 12, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::Timeout {
                expected: 12,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof() {
        let (device, mut host) = tokio::io::duplex(64);
        drop(device);

        let err = read_frame(&mut host, 6, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::UnexpectedEof { received: 0, .. }));
    }

    #[tokio::test]
    async fn test_drain_serial_buffer() {
        let (mut device, mut host) = tokio::io::duplex(64);
        device.write_all(b"stale data 12345").await.unwrap();

        let discarded = drain_serial_buffer(&mut host, Duration::from_millis(20)).await;
        assert_eq!(discarded, 16);

        let discarded = drain_serial_buffer(&mut host, Duration::from_millis(5)).await;
        assert_eq!(discarded, 0);
    }

    #[tokio::test]
    async fn test_write_frame() {
        let (mut device, mut host) = tokio::io::duplex(64);
        write_frame(&mut host, &[0x23, 0x02, 0x00, 0x00, 0x50, 0x01])
            .await
            .unwrap();

        let mut buf = [0u8; 6];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x23, 0x02, 0x00, 0x00, 0x50, 0x01]);
    }
}
