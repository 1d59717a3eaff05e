//! K10CR1 APT frame layer.
//!
//! Reference: Thorlabs APT Communications Protocol (MGMSG_* messages)
//!
//! Frame Layout (all multi-byte fields little-endian):
//!
//! | Offset | Size | Field                                    |
//! |--------|------|------------------------------------------|
//! | 0–1    | 2    | opcode                                   |
//! | 2–3    | 2    | parameters, or data length when a payload follows |
//! | 4      | 1    | destination (`| 0x80` when a payload follows) |
//! | 5      | 1    | source                                   |
//! | 6–7    | 2    | channel (move/position frames only)      |
//! | 8–11   | 4    | position in device units                 |
//!
//! Positions travel as 32-bit two's-complement counts, 24 576 000 counts per
//! 180 degrees. Every function here is pure; the driver does the I/O.

use crate::codec;
use crate::error::{StageError, StageResult};
use bytes::{BufMut, Bytes, BytesMut};

/// Counts per 180 degrees of rotation.
pub const UNITS_PER_HALF_TURN: f64 = 24_576_000.0;

/// Width of a device-unit field on the wire.
pub const DEVICE_UNIT_WIDTH: usize = 4;

/// Header length of every APT frame.
pub const HEADER_LEN: usize = 6;

/// Length of move and position frames (header + channel + position).
pub const POSITION_FRAME_LEN: usize = 12;

/// Length of the move-completed / jog status reply.
pub const MOVE_COMPLETED_LEN: usize = 20;

/// Length of the homed reply.
pub const HOMED_LEN: usize = 6;

/// Channel selector prepended to move payloads (channel 1).
pub const CHANNEL_1: [u8; 2] = [0x01, 0x00];

const IDENTIFY: [u8; 6] = [0x23, 0x02, 0x00, 0x00, 0x50, 0x01];
const HOME: [u8; 6] = [0x43, 0x04, 0x01, 0x00, 0x50, 0x01];
const JOG: [u8; 6] = [0x6a, 0x04, 0x01, 0x01, 0x50, 0x01];
const GET_POSITION: [u8; 6] = [0x11, 0x04, 0x01, 0x00, 0x50, 0x01];

/// Convert degrees to device units, truncating toward zero.
///
/// # Errors
/// `StageError::Range` if the angle is not finite or the count overflows `i32`.
pub fn angle_to_units(angle_deg: f64) -> StageResult<i32> {
    let units = (angle_deg * UNITS_PER_HALF_TURN / 180.0).trunc();
    if !units.is_finite() || units < i32::MIN as f64 || units > i32::MAX as f64 {
        return Err(StageError::range(angle_deg, DEVICE_UNIT_WIDTH));
    }
    Ok(units as i32)
}

/// Convert device units to degrees at full precision.
pub fn units_to_angle(units: i32) -> f64 {
    f64::from(units) * 180.0 / UNITS_PER_HALF_TURN
}

/// Round to three decimals, the resolution reported by `get_position`.
pub fn round_to_millidegrees(angle_deg: f64) -> f64 {
    (angle_deg * 1000.0).round() / 1000.0
}

/// The six-byte header that starts every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message ID, little-endian on the wire
    pub opcode: u16,
    /// First parameter byte, or the low byte of the data length
    pub param1: u8,
    /// Second parameter byte, or the high byte of the data length
    pub param2: u8,
    /// Destination address, with [`Self::DATA_FOLLOWS`] set when data follows
    pub destination: u8,
    /// Source address
    pub source: u8,
}

impl FrameHeader {
    /// Destination flag marking a header followed by a data packet.
    pub const DATA_FOLLOWS: u8 = 0x80;

    /// Header for a frame carrying `data_len` payload bytes.
    pub fn with_data(opcode: u16, data_len: u16, destination: u8, source: u8) -> Self {
        let [param1, param2] = data_len.to_le_bytes();
        Self {
            opcode,
            param1,
            param2,
            destination: destination | Self::DATA_FOLLOWS,
            source,
        }
    }

    /// Whether a data packet follows this header.
    pub fn has_data(&self) -> bool {
        self.destination & Self::DATA_FOLLOWS != 0
    }

    /// Payload length for headers that carry data.
    pub fn data_len(&self) -> Option<u16> {
        self.has_data()
            .then(|| u16::from_le_bytes([self.param1, self.param2]))
    }

    /// Wire image of the header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [op_lo, op_hi] = self.opcode.to_le_bytes();
        [
            op_lo,
            op_hi,
            self.param1,
            self.param2,
            self.destination,
            self.source,
        ]
    }

    /// Parse the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> StageResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StageError::InvalidLength {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            opcode: u16::from_le_bytes([bytes[0], bytes[1]]),
            param1: bytes[2],
            param2: bytes[3],
            destination: bytes[4],
            source: bytes[5],
        })
    }
}

/// Direction of a move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Offset from the current position
    Relative,
    /// Target angle
    Absolute,
}

impl MoveKind {
    /// MGMSG_MOT_MOVE_RELATIVE / MGMSG_MOT_MOVE_ABSOLUTE
    pub fn opcode(self) -> u16 {
        match self {
            MoveKind::Relative => 0x0448,
            MoveKind::Absolute => 0x0453,
        }
    }

    /// Header `48 04 06 00 d0 01` / `53 04 06 00 d0 01`.
    pub fn header(self) -> FrameHeader {
        let data_len = (CHANNEL_1.len() + DEVICE_UNIT_WIDTH) as u16;
        FrameHeader::with_data(self.opcode(), data_len, 0x50, 0x01)
    }
}

/// Commands without a variable payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedCommand {
    /// MGMSG_MOD_IDENTIFY
    Identify,
    /// MGMSG_MOT_MOVE_HOME
    Home,
    /// MGMSG_MOT_MOVE_JOG
    Jog,
    /// MGMSG_MOT_REQ_POSCOUNTER
    GetPosition,
}

impl FixedCommand {
    /// Command name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            FixedCommand::Identify => "identify",
            FixedCommand::Home => "home",
            FixedCommand::Jog => "jog",
            FixedCommand::GetPosition => "get_position",
        }
    }

    /// Length of the reply the device sends, if any.
    pub fn reply_len(self) -> Option<usize> {
        match self {
            FixedCommand::Identify => None,
            FixedCommand::Home => Some(HOMED_LEN),
            FixedCommand::Jog => Some(MOVE_COMPLETED_LEN),
            FixedCommand::GetPosition => Some(POSITION_FRAME_LEN),
        }
    }

    /// Whether the reply is only sent once the stage has stopped moving.
    pub fn awaits_motion(self) -> bool {
        matches!(self, FixedCommand::Home | FixedCommand::Jog)
    }
}

/// Bytes of a fixed command.
pub fn build_fixed_frame(command: FixedCommand) -> &'static [u8; HEADER_LEN] {
    match command {
        FixedCommand::Identify => &IDENTIFY,
        FixedCommand::Home => &HOME,
        FixedCommand::Jog => &JOG,
        FixedCommand::GetPosition => &GET_POSITION,
    }
}

/// Build a 12-byte move frame for `angle_deg`.
pub fn build_move_frame(kind: MoveKind, angle_deg: f64) -> StageResult<Bytes> {
    let units = angle_to_units(angle_deg)?;
    let field = codec::encode(i128::from(units), DEVICE_UNIT_WIDTH)?;

    let mut frame = BytesMut::with_capacity(POSITION_FRAME_LEN);
    frame.put_slice(&kind.header().to_bytes());
    frame.put_slice(&CHANNEL_1);
    frame.put_slice(&field);
    Ok(frame.freeze())
}

/// Device units carried by the trailing field of a 12-byte frame.
pub fn position_units(frame: &[u8]) -> StageResult<i32> {
    if frame.len() != POSITION_FRAME_LEN {
        return Err(StageError::InvalidLength {
            expected: POSITION_FRAME_LEN,
            actual: frame.len(),
        });
    }
    codec::decode_i32(&frame[POSITION_FRAME_LEN - DEVICE_UNIT_WIDTH..])
}

/// Parse a get-position reply into degrees, rounded to three decimals.
pub fn parse_position(response: &[u8]) -> StageResult<f64> {
    let units = position_units(response)?;
    Ok(round_to_millidegrees(units_to_angle(units)))
}
