//! Frame-level properties of the codec and protocol, through the public API.

use k10cr1::codec::{self, bounds};
use k10cr1::protocol::{
    angle_to_units, build_move_frame, parse_position, position_units, units_to_angle, MoveKind,
    UNITS_PER_HALF_TURN,
};
use k10cr1::StageError;

#[test]
fn test_move_absolute_round_trip_through_frame() {
    for angle in [-45.0, -0.001, 0.0, 0.5, 1.0, 179.999, 360.0, -720.0] {
        let frame = build_move_frame(MoveKind::Absolute, angle).unwrap();
        assert_eq!(frame.len(), 12);
        assert_eq!(
            codec::decode(&frame[8..]).unwrap(),
            i128::from(angle_to_units(angle).unwrap()),
            "angle {}",
            angle
        );
    }
}

#[test]
fn test_relative_frame_layout() {
    let frame = build_move_frame(MoveKind::Relative, 1.0).unwrap();
    let mut expected = vec![0x48, 0x04, 0x06, 0x00, 0xd0, 0x01, 0x01, 0x00];
    expected.extend(codec::encode(i128::from(angle_to_units(1.0).unwrap()), 4).unwrap());
    assert_eq!(frame.as_ref(), expected.as_slice());
}

#[test]
fn test_position_reply_parses_to_degrees() {
    let mut reply = vec![0u8; 8];
    reply.extend(codec::encode(24_576_000, 4).unwrap());
    assert_eq!(parse_position(&reply).unwrap(), 180.0);

    // Same units, read through the move frame helpers
    assert_eq!(position_units(&reply).unwrap(), 24_576_000);
}

#[test]
fn test_position_reply_rounds_to_three_decimals() {
    let units = angle_to_units(33.33333).unwrap();
    let mut reply = vec![0u8; 8];
    reply.extend(codec::encode_i32(units));
    assert_eq!(parse_position(&reply).unwrap(), 33.333);
    assert!((units_to_angle(units) - 33.333).abs() > 1e-4);
}

#[test]
fn test_short_reply_is_rejected() {
    let err = parse_position(&[0u8; 6]).unwrap_err();
    assert!(matches!(
        err,
        StageError::InvalidLength {
            expected: 12,
            actual: 6
        }
    ));
}

#[test]
fn test_quantization_bound_over_stage_travel() {
    let step = 180.0 / UNITS_PER_HALF_TURN;
    for tenth in -3600..=3600 {
        let angle = f64::from(tenth) / 10.0;
        let back = units_to_angle(angle_to_units(angle).unwrap());
        assert!((back - angle).abs() <= step);
    }
}

#[test]
fn test_width_bounds_match_encode() {
    for width in 1..=15usize {
        let (min, max) = bounds(width).unwrap();
        assert_eq!(codec::decode(&codec::encode(min, width).unwrap()).unwrap(), min);
        assert_eq!(codec::decode(&codec::encode(max, width).unwrap()).unwrap(), max);
        assert!(codec::encode(max + 1, width).is_err());
        assert!(codec::encode(min - 1, width).is_err());
    }
    assert!(bounds(16).is_none());
}
