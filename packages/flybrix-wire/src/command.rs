//! Payloads of actuation commands.

use bitflags::bitflags;

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
};

/// Animation played by the LEDs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LedPattern {
    /// Fall back to the pattern selected by the board status.
    #[default]
    NoOverride = 0,
    Flash = 1,
    Beacon = 2,
    Breathe = 3,
    Alternate = 4,
    Solid = 5,
}

impl Encode for LedPattern {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, data: &mut [u8]) {
        data[0] = *self as u8;
    }
}

impl Decode for LedPattern {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(data)? {
            0 => Ok(Self::NoOverride),
            1 => Ok(Self::Flash),
            2 => Ok(Self::Beacon),
            3 => Ok(Self::Breathe),
            4 => Ok(Self::Alternate),
            5 => Ok(Self::Solid),
            v => Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedValue {
                name: "LedPattern",
                value: v as u32,
                expected: &[0, 1, 2, 3, 4, 5],
            })),
        }
    }
}

/// Payload of [`CommandMask::SET_LED`](crate::message::CommandMask::SET_LED).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LedCommand {
    pub pattern: LedPattern,
    pub color_right: [u8; 3],
    pub color_left: [u8; 3],
    pub indicator_red: u8,
    pub indicator_green: u8,
}

impl Encode for LedCommand {
    fn size(&self) -> usize {
        9
    }

    fn encode(&self, data: &mut [u8]) {
        (
            self.pattern,
            self.color_right,
            self.color_left,
            self.indicator_red,
            self.indicator_green,
        )
            .encode(data)
    }
}

impl Decode for LedCommand {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (pattern, color_right, color_left, indicator_red, indicator_green) =
            <(LedPattern, [u8; 3], [u8; 3], u8, u8)>::decode(data)?;

        Ok(Self {
            pattern,
            color_right,
            color_left,
            indicator_red,
            indicator_green,
        })
    }
}

/// Pilot command injected over the link.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct RcCommand {
    pub throttle: i16,
    pub pitch: i16,
    pub roll: i16,
    pub yaw: i16,
    pub aux_mask: u8,
}

/// Payload of [`CommandMask::SET_SERIAL_RC`](crate::message::CommandMask::SET_SERIAL_RC).
///
/// `None` hands command authority back to the radio receiver.
///
/// # Encoding
///
/// | Field      | Size | Description |
/// |------------|------|-------------|
/// | `enabled`  | 1    | Nonzero to inject the command below. |
/// | `throttle` | 2    | |
/// | `pitch`    | 2    | |
/// | `roll`     | 2    | |
/// | `yaw`      | 2    | |
/// | `aux_mask` | 1    | |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SerialRc(pub Option<RcCommand>);

impl Encode for SerialRc {
    fn size(&self) -> usize {
        10
    }

    fn encode(&self, data: &mut [u8]) {
        let command = self.0.unwrap_or_default();
        (
            u8::from(self.0.is_some()),
            command.throttle,
            command.pitch,
            command.roll,
            command.yaw,
            command.aux_mask,
        )
            .encode(data)
    }
}

impl Decode for SerialRc {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (enabled, throttle, pitch, roll, yaw, aux_mask) =
            <(u8, i16, i16, i16, i16, u8)>::decode(data)?;

        Ok(Self((enabled != 0).then_some(RcCommand {
            throttle,
            pitch,
            roll,
            yaw,
            aux_mask,
        })))
    }
}

bitflags! {
    /// Log file state, both requested and reported.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub struct RecordingFlags: u8 {
        /// The log file is (or should be) open.
        const RECORD = 1 << 0;
        /// The log file is (or should be) locked in its current state.
        const LOCK = 1 << 1;
    }
}

impl Encode for RecordingFlags {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, data: &mut [u8]) {
        data[0] = self.bits();
    }
}

impl Decode for RecordingFlags {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_bits_truncate(u8::decode(data)?))
    }
}
