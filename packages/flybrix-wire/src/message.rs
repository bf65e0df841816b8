//! Message header and command masks.

use bitflags::bitflags;

use crate::{
    decode::{Decode, DecodeError, DecodeErrorKind},
    encode::Encode,
};

/// Kind of a message, the first field of every frame.
///
/// Encoded as a little-endian `u32`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Telemetry, with a [`StateMask`](crate::state::StateMask).
    State = 0,
    /// Commands to the board and configuration replies from it, with a [`CommandMask`].
    Command = 1,
    /// Null-terminated text.
    DebugString = 3,
    /// Replayed log data.
    HistoryData = 4,
    /// Acknowledgment of a command.
    Response = 255,
}

impl Encode for MessageType {
    fn size(&self) -> usize {
        4
    }

    fn encode(&self, data: &mut [u8]) {
        (*self as u32).encode(data)
    }
}

impl Decode for MessageType {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        match u32::decode(data)? {
            0 => Ok(Self::State),
            1 => Ok(Self::Command),
            3 => Ok(Self::DebugString),
            4 => Ok(Self::HistoryData),
            255 => Ok(Self::Response),
            v => Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedValue {
                name: "MessageType",
                value: v,
                expected: &[0, 1, 3, 4, 255],
            })),
        }
    }
}

/// The `{type, mask}` pair that starts every frame.
///
/// # Encoding
///
/// | Field  | Size | Description |
/// |--------|------|-------------|
/// | `type` | 4    | A [`MessageType`]. |
/// | `mask` | 4    | Field mask; its meaning depends on `type`. |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Header {
    pub message_type: MessageType,
    pub mask: u32,
}

impl Header {
    pub const SIZE: usize = 8;
}

impl Encode for Header {
    fn size(&self) -> usize {
        Self::SIZE
    }

    fn encode(&self, data: &mut [u8]) {
        (self.message_type, self.mask).encode(data)
    }
}

impl Decode for Header {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let message_type = MessageType::decode(data)?;
        let mask = u32::decode(data)?;

        Ok(Self { message_type, mask })
    }
}

bitflags! {
    /// Operations requested by a [`MessageType::Command`] frame.
    ///
    /// Bits are handled in declaration order. Retired bits are never reused.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub struct CommandMask: u32 {
        /// Reply with a [`Response`] carrying the ack mask.
        const REQ_RESPONSE = 1 << 0;
        /// Replace the whole configuration.
        const SET_EEPROM_DATA = 1 << 1;
        /// Restore the default configuration.
        const REINIT_EEPROM_DATA = 1 << 2;
        /// Send the whole configuration.
        const REQ_EEPROM_DATA = 1 << 3;
        /// Step motor arming, or disarm.
        const REQ_ENABLE_ITERATION = 1 << 4;
        const MOTOR_OVERRIDE_SPEED_0 = 1 << 5;
        const MOTOR_OVERRIDE_SPEED_1 = 1 << 6;
        const MOTOR_OVERRIDE_SPEED_2 = 1 << 7;
        const MOTOR_OVERRIDE_SPEED_3 = 1 << 8;
        const MOTOR_OVERRIDE_SPEED_4 = 1 << 9;
        const MOTOR_OVERRIDE_SPEED_5 = 1 << 10;
        const MOTOR_OVERRIDE_SPEED_6 = 1 << 11;
        const MOTOR_OVERRIDE_SPEED_7 = 1 << 12;
        /// Any motor override.
        const MOTOR_OVERRIDE_SPEED_ALL = Self::MOTOR_OVERRIDE_SPEED_0.bits()
            | Self::MOTOR_OVERRIDE_SPEED_1.bits()
            | Self::MOTOR_OVERRIDE_SPEED_2.bits()
            | Self::MOTOR_OVERRIDE_SPEED_3.bits()
            | Self::MOTOR_OVERRIDE_SPEED_4.bits()
            | Self::MOTOR_OVERRIDE_SPEED_5.bits()
            | Self::MOTOR_OVERRIDE_SPEED_6.bits()
            | Self::MOTOR_OVERRIDE_SPEED_7.bits();
        const SET_COMMAND_OVERRIDE = 1 << 13;
        /// Replace the default telemetry mask.
        const SET_STATE_MASK = 1 << 14;
        /// Telemetry send interval.
        const SET_STATE_DELAY = 1 << 15;
        /// Log write interval.
        const SET_SD_WRITE_DELAY = 1 << 16;
        const SET_LED = 1 << 17;
        /// Inject pilot commands over the link.
        const SET_SERIAL_RC = 1 << 18;
        const SET_CARD_RECORDING = 1 << 19;
        const SET_PARTIAL_EEPROM_DATA = 1 << 20;
        const REINIT_PARTIAL_EEPROM_DATA = 1 << 21;
        const REQ_PARTIAL_EEPROM_DATA = 1 << 22;
        const REQ_CARD_RECORDING_STATE = 1 << 23;
    }
}

impl CommandMask {
    /// Per-motor override bits, indexed by motor.
    pub const MOTOR_OVERRIDE_SPEEDS: [Self; 8] = [
        Self::MOTOR_OVERRIDE_SPEED_0,
        Self::MOTOR_OVERRIDE_SPEED_1,
        Self::MOTOR_OVERRIDE_SPEED_2,
        Self::MOTOR_OVERRIDE_SPEED_3,
        Self::MOTOR_OVERRIDE_SPEED_4,
        Self::MOTOR_OVERRIDE_SPEED_5,
        Self::MOTOR_OVERRIDE_SPEED_6,
        Self::MOTOR_OVERRIDE_SPEED_7,
    ];
}

impl Encode for CommandMask {
    fn size(&self) -> usize {
        4
    }

    fn encode(&self, data: &mut [u8]) {
        self.bits().encode(data)
    }
}

impl Decode for CommandMask {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_bits_retain(u32::decode(data)?))
    }
}

/// Acknowledgment of a command frame.
///
/// # Encoding
///
/// | Field  | Size | Description |
/// |--------|------|-------------|
/// | `type` | 4    | Always [`MessageType::Response`]. |
/// | `mask` | 4    | The mask of the command being acknowledged. |
/// | `ack`  | 4    | The subset of `mask` that succeeded. |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Response {
    pub mask: CommandMask,
    pub ack: CommandMask,
}

impl Encode for Response {
    fn size(&self) -> usize {
        12
    }

    fn encode(&self, data: &mut [u8]) {
        (MessageType::Response, self.mask, self.ack).encode(data)
    }
}

impl Decode for Response {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let message_type = MessageType::decode(data)?;
        if message_type != MessageType::Response {
            return Err(DecodeError::new::<Self>(DecodeErrorKind::UnexpectedValue {
                name: "type",
                value: message_type as u32,
                expected: &[MessageType::Response as u32],
            }));
        }

        let mask = CommandMask::decode(data)?;
        let ack = CommandMask::decode(data)?;

        Ok(Self { mask, ack })
    }
}
