//! Telemetry layout.
//!
//! A [`MessageType::State`](crate::message::MessageType::State) frame carries
//! a [`StateMask`] and one field per set bit, in bit order. [`StateField::ALL`]
//! is the single table both the serializer and
//! [`StateMask::packet_size`] walk, so the two never disagree.

use bitflags::bitflags;

use crate::encode::{Encode, EncodeError, MessageEncoder};

bitflags! {
    /// Board status flags.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Status: u16 {
        const BOOT = 1 << 0;
        const MPU_FAIL = 1 << 1;
        const BMP_FAIL = 1 << 2;
        const RX_FAIL = 1 << 3;
        const IDLE = 1 << 4;
        const ENABLING = 1 << 5;
        const CLEAR_MPU_BIAS = 1 << 6;
        const SET_MPU_BIAS = 1 << 7;
        const FAIL_STABILITY = 1 << 8;
        const FAIL_ANGLE = 1 << 9;
        const ENABLED = 1 << 10;
        const BATTERY_LOW = 1 << 11;
        const TEMP_WARNING = 1 << 12;
        const LOG_FULL = 1 << 13;
        const FAIL_OTHER = 1 << 14;
        const OVERRIDE = 1 << 15;
    }
}

bitflags! {
    /// Selects the fields of a telemetry frame.
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct StateMask: u32 {
        const MICROS = 1 << 0;
        const STATUS = 1 << 1;
        const V0 = 1 << 2;
        const I0 = 1 << 3;
        const I1 = 1 << 4;
        const ACCEL = 1 << 5;
        const GYRO = 1 << 6;
        const MAG = 1 << 7;
        const TEMPERATURE = 1 << 8;
        const PRESSURE = 1 << 9;
        const RX_PPM = 1 << 10;
        const AUX_CHAN_MASK = 1 << 11;
        const COMMANDS = 1 << 12;
        const F_AND_T = 1 << 13;
        const PID_FZ_MASTER = 1 << 14;
        const PID_TX_MASTER = 1 << 15;
        const PID_TY_MASTER = 1 << 16;
        const PID_TZ_MASTER = 1 << 17;
        const PID_FZ_SLAVE = 1 << 18;
        const PID_TX_SLAVE = 1 << 19;
        const PID_TY_SLAVE = 1 << 20;
        const PID_TZ_SLAVE = 1 << 21;
        const MOTOR_OUT = 1 << 22;
        const KINE_ANGLE = 1 << 23;
        const KINE_RATE = 1 << 24;
        const KINE_ALTITUDE = 1 << 25;
        const LOOP_COUNT = 1 << 26;
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for StateMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl StateMask {
    /// Body length of a telemetry frame with this mask, header excluded.
    pub fn packet_size(self) -> usize {
        StateField::ALL
            .iter()
            .filter(|field| self.contains(field.flag()))
            .map(|field| field.size())
            .sum()
    }
}

/// One telemetry field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StateField {
    Micros,
    Status,
    V0,
    I0,
    I1,
    Accel,
    Gyro,
    Mag,
    Temperature,
    Pressure,
    RxPpm,
    AuxChanMask,
    Commands,
    ForceAndTorque,
    /// PID controller state, indexed as in [`Telemetry::pids`].
    Pid(usize),
    MotorOut,
    KineAngle,
    KineRate,
    KineAltitude,
    LoopCount,
}

impl StateField {
    /// Every field, in wire order.
    pub const ALL: [Self; 27] = [
        Self::Micros,
        Self::Status,
        Self::V0,
        Self::I0,
        Self::I1,
        Self::Accel,
        Self::Gyro,
        Self::Mag,
        Self::Temperature,
        Self::Pressure,
        Self::RxPpm,
        Self::AuxChanMask,
        Self::Commands,
        Self::ForceAndTorque,
        Self::Pid(0),
        Self::Pid(1),
        Self::Pid(2),
        Self::Pid(3),
        Self::Pid(4),
        Self::Pid(5),
        Self::Pid(6),
        Self::Pid(7),
        Self::MotorOut,
        Self::KineAngle,
        Self::KineRate,
        Self::KineAltitude,
        Self::LoopCount,
    ];

    /// The mask bit selecting this field.
    pub const fn flag(self) -> StateMask {
        match self {
            Self::Micros => StateMask::MICROS,
            Self::Status => StateMask::STATUS,
            Self::V0 => StateMask::V0,
            Self::I0 => StateMask::I0,
            Self::I1 => StateMask::I1,
            Self::Accel => StateMask::ACCEL,
            Self::Gyro => StateMask::GYRO,
            Self::Mag => StateMask::MAG,
            Self::Temperature => StateMask::TEMPERATURE,
            Self::Pressure => StateMask::PRESSURE,
            Self::RxPpm => StateMask::RX_PPM,
            Self::AuxChanMask => StateMask::AUX_CHAN_MASK,
            Self::Commands => StateMask::COMMANDS,
            Self::ForceAndTorque => StateMask::F_AND_T,
            Self::Pid(index) => StateMask::from_bits_retain(StateMask::PID_FZ_MASTER.bits() << index),
            Self::MotorOut => StateMask::MOTOR_OUT,
            Self::KineAngle => StateMask::KINE_ANGLE,
            Self::KineRate => StateMask::KINE_RATE,
            Self::KineAltitude => StateMask::KINE_ALTITUDE,
            Self::LoopCount => StateMask::LOOP_COUNT,
        }
    }

    /// Encoded size in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Micros | Self::Pressure | Self::KineAltitude | Self::LoopCount => 4,
            Self::Status | Self::V0 | Self::I0 | Self::I1 | Self::Temperature => 2,
            Self::Accel | Self::Gyro | Self::Mag | Self::KineAngle | Self::KineRate => 12,
            Self::RxPpm => 12,
            Self::AuxChanMask => 1,
            Self::Commands => 8,
            Self::ForceAndTorque => 16,
            Self::Pid(_) => PidState::SIZE,
            Self::MotorOut => 16,
        }
    }
}

/// Run-time state of one PID controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidState {
    /// Timestamp of the last update, in microseconds.
    pub last_time: u32,
    pub input: f32,
    pub setpoint: f32,
    pub p_term: f32,
    pub i_term: f32,
    pub d_term: f32,
}

impl PidState {
    pub const SIZE: usize = 24;
}

impl Encode for PidState {
    fn size(&self) -> usize {
        Self::SIZE
    }

    fn encode(&self, data: &mut [u8]) {
        (
            self.last_time,
            self.input,
            self.setpoint,
            self.p_term,
            self.i_term,
            self.d_term,
        )
            .encode(data)
    }
}

/// Pilot command after mixing in the radio and any override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Commands {
    pub throttle: i16,
    pub pitch: i16,
    pub roll: i16,
    pub yaw: i16,
}

/// Snapshot of the live system, read by the telemetry encoder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Telemetry {
    pub status: Status,
    pub v0_raw: u16,
    pub i0_raw: u16,
    pub i1_raw: u16,
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub mag: [f32; 3],
    pub temperature: i16,
    pub pressure: u32,
    pub ppm: [u16; 6],
    pub aux_mask: u8,
    pub commands: Commands,
    /// Fz, Tx, Ty and Tz.
    pub force_torque: [f32; 4],
    /// Thrust, pitch, roll and yaw masters, then the slaves in the same order.
    pub pids: [PidState; 8],
    pub motor_out: [u16; 8],
    pub kinematics_angle: [f32; 3],
    pub kinematics_rate: [f32; 3],
    pub altitude: f32,
    pub loop_count: u32,
}

impl Telemetry {
    /// Appends the fields selected by `mask` to `payload`, in wire order.
    ///
    /// The payload is expected to already hold the message header.
    pub fn write_to<const N: usize>(
        &self,
        timestamp_us: u32,
        mask: StateMask,
        payload: &mut MessageEncoder<N>,
    ) -> Result<(), EncodeError> {
        for field in StateField::ALL {
            if mask.contains(field.flag()) {
                self.write_field(timestamp_us, field, payload)?;
            }
        }
        Ok(())
    }

    fn write_field<const N: usize>(
        &self,
        timestamp_us: u32,
        field: StateField,
        payload: &mut MessageEncoder<N>,
    ) -> Result<(), EncodeError> {
        match field {
            StateField::Micros => payload.write(&timestamp_us),
            StateField::Status => payload.write(&self.status.bits()),
            StateField::V0 => payload.write(&self.v0_raw),
            StateField::I0 => payload.write(&self.i0_raw),
            StateField::I1 => payload.write(&self.i1_raw),
            StateField::Accel => payload.write(&self.accel),
            StateField::Gyro => payload.write(&self.gyro),
            StateField::Mag => payload.write(&self.mag),
            StateField::Temperature => payload.write(&self.temperature),
            StateField::Pressure => payload.write(&self.pressure),
            StateField::RxPpm => payload.write(&self.ppm),
            StateField::AuxChanMask => payload.write(&self.aux_mask),
            StateField::Commands => payload.write(&(
                self.commands.throttle,
                self.commands.pitch,
                self.commands.roll,
                self.commands.yaw,
            )),
            StateField::ForceAndTorque => payload.write(&self.force_torque),
            StateField::Pid(index) => payload.write(&self.pids[index]),
            StateField::MotorOut => payload.write(&self.motor_out),
            StateField::KineAngle => payload.write(&self.kinematics_angle),
            StateField::KineRate => payload.write(&self.kinematics_rate),
            StateField::KineAltitude => payload.write(&self.altitude),
            StateField::LoopCount => payload.write(&self.loop_count),
        }
    }
}
