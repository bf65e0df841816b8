//! The persisted configuration record.
//!
//! A [`Config`] is a sequence of sub-fields, each addressed by one
//! [`ConfigSubmask`] bit. Full messages carry every sub-field in declaration
//! order; partial messages carry a submask followed by the selected
//! sub-fields in the same order. The LED states are further split by a
//! 16-bit LED mask, one bit per entry.

use bitflags::bitflags;
use thiserror::Error;

use crate::{
    command::LedPattern,
    decode::{Decode, DecodeError, FieldReader},
    encode::{Encode, EncodeError, MessageEncoder},
    name::{DeviceName, NameError},
    state::Status,
    version::Version,
};

/// Number of entries in [`LedStates`].
pub const LED_STATE_COUNT: usize = 16;

bitflags! {
    /// Selects sub-fields of a [`Config`].
    #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
    pub struct ConfigSubmask: u16 {
        const VERSION = 1 << 0;
        const PCB = 1 << 1;
        const MIX_TABLE = 1 << 2;
        const MAG_BIAS = 1 << 3;
        const CHANNEL = 1 << 4;
        const PID_PARAMETERS = 1 << 5;
        const STATE_PARAMETERS = 1 << 6;
        /// Followed on the wire by a 16-bit LED mask.
        const LED_STATES = 1 << 7;
        const DEVICE_NAME = 1 << 8;
    }
}

impl Decode for ConfigSubmask {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_bits_retain(u16::decode(data)?))
    }
}

impl Encode for ConfigSubmask {
    fn size(&self) -> usize {
        2
    }

    fn encode(&self, data: &mut [u8]) {
        self.bits().encode(data)
    }
}

/// Returned by [`Config::verify`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} holds a non-finite value")]
    NonFinite { field: &'static str },

    #[error("Channel assignment {value} at index {index} is out of range")]
    ChannelOutOfRange { index: usize, value: u8 },

    #[error("Receiver channel {value} is assigned more than once")]
    DuplicateChannel { value: u8 },

    #[error("State estimation weight {value} is outside [0, 1]")]
    EstimationWeight { value: f32 },

    #[error("Enable threshold {value} is negative")]
    EnableThreshold { value: f32 },

    #[error(transparent)]
    Name(#[from] NameError),
}

fn check_finite(field: &'static str, values: &[f32]) -> Result<(), ConfigError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field })
    }
}

/// Mounting of the board relative to the airframe.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PcbTransform {
    /// Roll, pitch and yaw of the board, in degrees.
    pub orientation: [f32; 3],
    /// Offset of the board from the center of mass, in millimeters.
    pub translation: [f32; 3],
}

impl Encode for PcbTransform {
    fn size(&self) -> usize {
        24
    }

    fn encode(&self, data: &mut [u8]) {
        (self.orientation, self.translation).encode(data)
    }
}

impl Decode for PcbTransform {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (orientation, translation) = Decode::decode(data)?;
        Ok(Self {
            orientation,
            translation,
        })
    }
}

/// Contribution of each force/torque axis to each motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixTable {
    pub fz: [i8; 8],
    pub tx: [i8; 8],
    pub ty: [i8; 8],
    pub tz: [i8; 8],
}

impl Encode for MixTable {
    fn size(&self) -> usize {
        32
    }

    fn encode(&self, data: &mut [u8]) {
        (self.fz, self.tx, self.ty, self.tz).encode(data)
    }
}

impl Decode for MixTable {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (fz, tx, ty, tz) = Decode::decode(data)?;
        Ok(Self { fz, tx, ty, tz })
    }
}

/// Hard-iron magnetometer correction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MagBias {
    pub offset: [f32; 3],
}

impl Encode for MagBias {
    fn size(&self) -> usize {
        12
    }

    fn encode(&self, data: &mut [u8]) {
        self.offset.encode(data)
    }
}

impl Decode for MagBias {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            offset: Decode::decode(data)?,
        })
    }
}

/// Mapping of the six receiver channels onto command axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelProperties {
    /// Receiver channel feeding throttle, pitch, roll, yaw, aux1 and aux2.
    pub assignment: [u8; 6],
    /// Bit *n* inverts the *n*-th command axis.
    pub inversion: u8,
    pub midpoint: [u16; 6],
    pub deadzone: [u16; 6],
}

impl ChannelProperties {
    pub const CHANNEL_COUNT: u8 = 6;

    fn verify(&self) -> Result<(), ConfigError> {
        let mut seen = 0u8;
        for (index, &value) in self.assignment.iter().enumerate() {
            if value >= Self::CHANNEL_COUNT {
                return Err(ConfigError::ChannelOutOfRange { index, value });
            }
            if seen & (1 << value) != 0 {
                return Err(ConfigError::DuplicateChannel { value });
            }
            seen |= 1 << value;
        }
        Ok(())
    }
}

impl Encode for ChannelProperties {
    fn size(&self) -> usize {
        31
    }

    fn encode(&self, data: &mut [u8]) {
        (self.assignment, self.inversion, self.midpoint, self.deadzone).encode(data)
    }
}

impl Decode for ChannelProperties {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (assignment, inversion, midpoint, deadzone) = Decode::decode(data)?;
        Ok(Self {
            assignment,
            inversion,
            midpoint,
            deadzone,
        })
    }
}

/// Tuning of one PID controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PidSettings {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_windup_guard: f32,
    pub d_filter_time: f32,
    pub setpoint_filter_time: f32,
    pub command_to_value: f32,
}

impl PidSettings {
    pub const fn new(values: [f32; 7]) -> Self {
        let [kp, ki, kd, integral_windup_guard, d_filter_time, setpoint_filter_time, command_to_value] =
            values;
        Self {
            kp,
            ki,
            kd,
            integral_windup_guard,
            d_filter_time,
            setpoint_filter_time,
            command_to_value,
        }
    }

    pub const fn to_array(self) -> [f32; 7] {
        [
            self.kp,
            self.ki,
            self.kd,
            self.integral_windup_guard,
            self.d_filter_time,
            self.setpoint_filter_time,
            self.command_to_value,
        ]
    }
}

impl Encode for PidSettings {
    fn size(&self) -> usize {
        28
    }

    fn encode(&self, data: &mut [u8]) {
        self.to_array().encode(data)
    }
}

impl Decode for PidSettings {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::new(Decode::decode(data)?))
    }
}

/// Cascaded (master/slave) PID tuning for the four control axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PidParameters {
    pub thrust_master: PidSettings,
    pub pitch_master: PidSettings,
    pub roll_master: PidSettings,
    pub yaw_master: PidSettings,
    pub thrust_slave: PidSettings,
    pub pitch_slave: PidSettings,
    pub roll_slave: PidSettings,
    pub yaw_slave: PidSettings,
    pub thrust_gain: f32,
    pub pitch_gain: f32,
    pub roll_gain: f32,
    pub yaw_gain: f32,
    /// Bit *n* skips the master stage of axis *n*.
    pub pid_bypass: u8,
}

impl PidParameters {
    fn settings(&self) -> [PidSettings; 8] {
        [
            self.thrust_master,
            self.pitch_master,
            self.roll_master,
            self.yaw_master,
            self.thrust_slave,
            self.pitch_slave,
            self.roll_slave,
            self.yaw_slave,
        ]
    }

    fn verify(&self) -> Result<(), ConfigError> {
        for settings in self.settings() {
            check_finite("PID settings", &settings.to_array())?;
        }
        check_finite(
            "PID gains",
            &[self.thrust_gain, self.pitch_gain, self.roll_gain, self.yaw_gain],
        )
    }
}

impl Encode for PidParameters {
    fn size(&self) -> usize {
        8 * 28 + 4 * 4 + 1
    }

    fn encode(&self, data: &mut [u8]) {
        (
            self.settings(),
            self.thrust_gain,
            self.pitch_gain,
            self.roll_gain,
            self.yaw_gain,
            self.pid_bypass,
        )
            .encode(data)
    }
}

impl Decode for PidParameters {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let [
            thrust_master,
            pitch_master,
            roll_master,
            yaw_master,
            thrust_slave,
            pitch_slave,
            roll_slave,
            yaw_slave,
        ] = <[PidSettings; 8]>::decode(data)?;
        let (thrust_gain, pitch_gain, roll_gain, yaw_gain, pid_bypass) = Decode::decode(data)?;

        Ok(Self {
            thrust_master,
            pitch_master,
            roll_master,
            yaw_master,
            thrust_slave,
            pitch_slave,
            roll_slave,
            yaw_slave,
            thrust_gain,
            pitch_gain,
            roll_gain,
            yaw_gain,
            pid_bypass,
        })
    }
}

/// State estimation and arming thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateParameters {
    /// Complementary filter weights, each in `[0, 1]`.
    pub state_estimation: [f32; 2],
    pub enable: [f32; 2],
}

impl StateParameters {
    fn verify(&self) -> Result<(), ConfigError> {
        check_finite("State parameters", &self.state_estimation)?;
        check_finite("State parameters", &self.enable)?;
        if let Some(&value) = self
            .state_estimation
            .iter()
            .find(|v| !(0.0..=1.0).contains(*v))
        {
            return Err(ConfigError::EstimationWeight { value });
        }
        if let Some(&value) = self.enable.iter().find(|v| **v < 0.0) {
            return Err(ConfigError::EnableThreshold { value });
        }
        Ok(())
    }
}

impl Encode for StateParameters {
    fn size(&self) -> usize {
        16
    }

    fn encode(&self, data: &mut [u8]) {
        (self.state_estimation, self.enable).encode(data)
    }
}

impl Decode for StateParameters {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (state_estimation, enable) = Decode::decode(data)?;
        Ok(Self {
            state_estimation,
            enable,
        })
    }
}

/// LED behavior triggered by a set of status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedState {
    pub status: Status,
    pub pattern: LedPattern,
    pub color_right: [u8; 3],
    pub color_left: [u8; 3],
    pub indicator_red: u8,
    pub indicator_green: u8,
}

impl LedState {
    pub const SIZE: usize = 11;

    pub const fn new(
        status: Status,
        pattern: LedPattern,
        color_right: [u8; 3],
        color_left: [u8; 3],
        indicator_red: u8,
        indicator_green: u8,
    ) -> Self {
        Self {
            status,
            pattern,
            color_right,
            color_left,
            indicator_red,
            indicator_green,
        }
    }
}

impl Encode for LedState {
    fn size(&self) -> usize {
        Self::SIZE
    }

    fn encode(&self, data: &mut [u8]) {
        (
            self.status.bits(),
            self.pattern,
            self.color_right,
            self.color_left,
            self.indicator_red,
            self.indicator_green,
        )
            .encode(data)
    }
}

impl Decode for LedState {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (status, pattern, color_right, color_left, indicator_red, indicator_green) =
            <(u16, LedPattern, [u8; 3], [u8; 3], u8, u8)>::decode(data)?;

        Ok(Self {
            status: Status::from_bits_retain(status),
            pattern,
            color_right,
            color_left,
            indicator_red,
            indicator_green,
        })
    }
}

/// LED behaviors, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedStates(pub [LedState; LED_STATE_COUNT]);

impl Default for LedStates {
    fn default() -> Self {
        const RED: [u8; 3] = [255, 0, 0];
        const GREEN: [u8; 3] = [0, 255, 0];
        const BLUE: [u8; 3] = [0, 0, 255];
        const ORANGE: [u8; 3] = [255, 80, 0];
        const WHITE: [u8; 3] = [255, 255, 255];

        let mut states = [LedState::default(); LED_STATE_COUNT];
        states[0] = LedState::new(Status::MPU_FAIL, LedPattern::Flash, RED, RED, 1, 0);
        states[1] = LedState::new(Status::BMP_FAIL, LedPattern::Flash, RED, ORANGE, 1, 0);
        states[2] = LedState::new(Status::BOOT, LedPattern::Solid, GREEN, GREEN, 0, 0);
        states[3] = LedState::new(Status::RX_FAIL, LedPattern::Flash, ORANGE, ORANGE, 1, 0);
        states[4] = LedState::new(Status::FAIL_OTHER, LedPattern::Alternate, BLUE, BLUE, 1, 0);
        states[5] = LedState::new(Status::FAIL_STABILITY, LedPattern::Flash, BLUE, BLUE, 0, 0);
        states[6] = LedState::new(Status::FAIL_ANGLE, LedPattern::Flash, ORANGE, BLUE, 0, 0);
        states[7] = LedState::new(Status::OVERRIDE, LedPattern::Beacon, RED, RED, 1, 0);
        states[8] = LedState::new(Status::TEMP_WARNING, LedPattern::Flash, RED, RED, 0, 0);
        states[9] = LedState::new(Status::BATTERY_LOW, LedPattern::Beacon, ORANGE, ORANGE, 0, 0);
        states[10] = LedState::new(Status::ENABLING, LedPattern::Flash, BLUE, GREEN, 0, 1);
        states[11] = LedState::new(Status::ENABLED, LedPattern::Beacon, BLUE, GREEN, 0, 1);
        states[12] = LedState::new(Status::IDLE, LedPattern::Beacon, GREEN, GREEN, 0, 1);
        states[13] = LedState::new(Status::LOG_FULL, LedPattern::Breathe, WHITE, WHITE, 0, 0);

        Self(states)
    }
}

impl Encode for LedStates {
    fn size(&self) -> usize {
        LED_STATE_COUNT * LedState::SIZE
    }

    fn encode(&self, data: &mut [u8]) {
        self.0.encode(data)
    }
}

impl Decode for LedStates {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self(Decode::decode(data)?))
    }
}

/// The flight controller's persisted settings.
///
/// # Encoding
///
/// | Field              | Size | Submask bit |
/// |--------------------|------|-------------|
/// | `version`          | 3    | [`ConfigSubmask::VERSION`] |
/// | `pcb`              | 24   | [`ConfigSubmask::PCB`] |
/// | `mix_table`        | 32   | [`ConfigSubmask::MIX_TABLE`] |
/// | `mag_bias`         | 12   | [`ConfigSubmask::MAG_BIAS`] |
/// | `channel`          | 31   | [`ConfigSubmask::CHANNEL`] |
/// | `pid_parameters`   | 241  | [`ConfigSubmask::PID_PARAMETERS`] |
/// | `state_parameters` | 16   | [`ConfigSubmask::STATE_PARAMETERS`] |
/// | `led_states`       | 176  | [`ConfigSubmask::LED_STATES`] |
/// | `name`             | N    | [`ConfigSubmask::DEVICE_NAME`] |
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub version: Version,
    pub pcb: PcbTransform,
    pub mix_table: MixTable,
    pub mag_bias: MagBias,
    pub channel: ChannelProperties,
    pub pid_parameters: PidParameters,
    pub state_parameters: StateParameters,
    pub led_states: LedStates,
    pub name: DeviceName,
}

impl Config {
    /// Version written into freshly initialized records.
    pub const FIRMWARE_VERSION: Version = Version::new(1, 5, 0);

    /// Checks the whole record before it is persisted or applied.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn verify(&self) -> Result<(), ConfigError> {
        check_finite("PCB orientation", &self.pcb.orientation)?;
        check_finite("PCB translation", &self.pcb.translation)?;
        check_finite("Magnetometer bias", &self.mag_bias.offset)?;
        self.channel.verify()?;
        self.pid_parameters.verify()?;
        self.state_parameters.verify()?;
        self.name.verify()?;
        Ok(())
    }

    /// Overwrites the sub-fields selected by `submask` with values read from
    /// `reader`, in wire order.
    ///
    /// Reading stops at the first sub-field that fails to parse. Sub-fields
    /// read before the failure keep their new values, so callers should work
    /// on a copy.
    pub fn read_partial(
        &mut self,
        reader: &mut FieldReader<'_>,
        submask: ConfigSubmask,
    ) -> Result<(), DecodeError> {
        if submask.contains(ConfigSubmask::VERSION) {
            self.version = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::PCB) {
            self.pcb = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::MIX_TABLE) {
            self.mix_table = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::MAG_BIAS) {
            self.mag_bias = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::CHANNEL) {
            self.channel = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::PID_PARAMETERS) {
            self.pid_parameters = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::STATE_PARAMETERS) {
            self.state_parameters = reader.parse()?;
        }
        if submask.contains(ConfigSubmask::LED_STATES) {
            let led_mask: u16 = reader.parse()?;
            for (index, state) in self.led_states.0.iter_mut().enumerate() {
                if led_mask & (1 << index) != 0 {
                    *state = reader.parse()?;
                }
            }
        }
        if submask.contains(ConfigSubmask::DEVICE_NAME) {
            self.name = reader.parse()?;
        }
        Ok(())
    }

    /// Overwrites the sub-fields selected by `submask` (and the LED entries
    /// selected by `led_mask`) with their defaults.
    pub fn reset_partial(&mut self, submask: ConfigSubmask, led_mask: u16) {
        let defaults = Self::default();

        if submask.contains(ConfigSubmask::VERSION) {
            self.version = defaults.version;
        }
        if submask.contains(ConfigSubmask::PCB) {
            self.pcb = defaults.pcb;
        }
        if submask.contains(ConfigSubmask::MIX_TABLE) {
            self.mix_table = defaults.mix_table;
        }
        if submask.contains(ConfigSubmask::MAG_BIAS) {
            self.mag_bias = defaults.mag_bias;
        }
        if submask.contains(ConfigSubmask::CHANNEL) {
            self.channel = defaults.channel;
        }
        if submask.contains(ConfigSubmask::PID_PARAMETERS) {
            self.pid_parameters = defaults.pid_parameters;
        }
        if submask.contains(ConfigSubmask::STATE_PARAMETERS) {
            self.state_parameters = defaults.state_parameters;
        }
        if submask.contains(ConfigSubmask::LED_STATES) {
            for (index, state) in self.led_states.0.iter_mut().enumerate() {
                if led_mask & (1 << index) != 0 {
                    *state = defaults.led_states.0[index];
                }
            }
        }
        if submask.contains(ConfigSubmask::DEVICE_NAME) {
            self.name = defaults.name;
        }
    }

    /// Appends `submask`, then the selected sub-fields, to `payload`.
    pub fn write_partial<const N: usize>(
        &self,
        payload: &mut MessageEncoder<N>,
        submask: ConfigSubmask,
        led_mask: u16,
    ) -> Result<(), EncodeError> {
        payload.write(&submask)?;

        if submask.contains(ConfigSubmask::VERSION) {
            payload.write(&self.version)?;
        }
        if submask.contains(ConfigSubmask::PCB) {
            payload.write(&self.pcb)?;
        }
        if submask.contains(ConfigSubmask::MIX_TABLE) {
            payload.write(&self.mix_table)?;
        }
        if submask.contains(ConfigSubmask::MAG_BIAS) {
            payload.write(&self.mag_bias)?;
        }
        if submask.contains(ConfigSubmask::CHANNEL) {
            payload.write(&self.channel)?;
        }
        if submask.contains(ConfigSubmask::PID_PARAMETERS) {
            payload.write(&self.pid_parameters)?;
        }
        if submask.contains(ConfigSubmask::STATE_PARAMETERS) {
            payload.write(&self.state_parameters)?;
        }
        if submask.contains(ConfigSubmask::LED_STATES) {
            payload.write(&led_mask)?;
            for (index, state) in self.led_states.0.iter().enumerate() {
                if led_mask & (1 << index) != 0 {
                    payload.write(state)?;
                }
            }
        }
        if submask.contains(ConfigSubmask::DEVICE_NAME) {
            payload.write(&self.name)?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Self::FIRMWARE_VERSION,
            pcb: PcbTransform::default(),
            mix_table: MixTable {
                fz: [1, 1, 1, 1, 0, 0, 0, 0],
                tx: [1, 1, -1, -1, 0, 0, 0, 0],
                ty: [-1, 1, -1, 1, 0, 0, 0, 0],
                tz: [1, -1, -1, 1, 0, 0, 0, 0],
            },
            mag_bias: MagBias::default(),
            channel: ChannelProperties {
                assignment: [2, 1, 0, 3, 4, 5],
                inversion: 0b0000_0110,
                midpoint: [1515, 1515, 1500, 1520, 1500, 1500],
                deadzone: [20, 20, 20, 40, 20, 20],
            },
            pid_parameters: PidParameters {
                thrust_master: PidSettings::new([1.0, 0.0, 0.0, 0.0, 0.005, 0.005, 1.0]),
                pitch_master: PidSettings::new([10.0, 1.0, 0.0, 10.0, 0.005, 0.005, 10.0]),
                roll_master: PidSettings::new([10.0, 1.0, 0.0, 10.0, 0.005, 0.005, 10.0]),
                yaw_master: PidSettings::new([5.0, 1.0, 0.0, 10.0, 0.005, 0.005, 180.0]),
                thrust_slave: PidSettings::new([1.0, 0.0, 0.0, 10.0, 0.001, 0.001, 0.3]),
                pitch_slave: PidSettings::new([10.0, 4.0, 0.0, 30.0, 0.001, 0.001, 30.0]),
                roll_slave: PidSettings::new([10.0, 4.0, 0.0, 30.0, 0.001, 0.001, 30.0]),
                yaw_slave: PidSettings::new([30.0, 5.0, 0.0, 20.0, 0.001, 0.001, 240.0]),
                thrust_gain: 4095.0,
                pitch_gain: 2047.0,
                roll_gain: 2047.0,
                yaw_gain: 2047.0,
                pid_bypass: 0b0000_1001,
            },
            state_parameters: StateParameters {
                state_estimation: [1.0, 0.01],
                enable: [0.001, 30.0],
            },
            led_states: LedStates::default(),
            name: DeviceName::default(),
        }
    }
}

impl Encode for Config {
    fn size(&self) -> usize {
        self.version.size()
            + self.pcb.size()
            + self.mix_table.size()
            + self.mag_bias.size()
            + self.channel.size()
            + self.pid_parameters.size()
            + self.state_parameters.size()
            + self.led_states.size()
            + self.name.size()
    }

    fn encode(&self, data: &mut [u8]) {
        (
            &self.version,
            &self.pcb,
            &self.mix_table,
            &self.mag_bias,
            &self.channel,
            &self.pid_parameters,
            &self.state_parameters,
            &self.led_states,
            &self.name,
        )
            .encode(data)
    }
}

impl Decode for Config {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let (version, pcb, mix_table, mag_bias, channel, pid_parameters, state_parameters) =
            Decode::decode(data)?;
        let (led_states, name) = Decode::decode(data)?;

        Ok(Self {
            version,
            pcb,
            mix_table,
            mag_bias,
            channel,
            pid_parameters,
            state_parameters,
            led_states,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::{Config, ConfigError, ConfigSubmask, LedPattern, MixTable};
    use crate::{
        decode::{Decode, DecodeErrorKind, FieldReader},
        encode::{Encode, MessageEncoder},
        frame::LARGE_CAPACITY,
        name::{DeviceName, NameError},
    };

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default().verify(), Ok(()));
    }

    #[test]
    fn full_record_layout() {
        let config = Config::default();
        let mut data = vec![0; config.size()];
        config.encode(&mut data);

        assert_eq!(
            data.len(),
            3 + 24 + 32 + 12 + 31 + 241 + 16 + 176 + crate::name::DEVICE_NAME_CAPACITY
        );
        assert_eq!(&data[..3], &[1, 5, 0]);
        assert_eq!(Config::decode(&mut data.as_slice()).unwrap(), config);
    }

    #[test]
    fn unknown_led_pattern_fails_the_record() {
        let config = Config::default();
        let mut data = vec![0; config.size()];
        config.encode(&mut data);

        // Pattern byte of the first LED state.
        let offset = 3 + 24 + 32 + 12 + 31 + 241 + 16 + 2;
        assert_eq!(data[offset], LedPattern::Flash as u8);
        data[offset] = 9;

        let err = Config::decode(&mut data.as_slice()).unwrap_err();
        assert!(matches!(
            err.kind(),
            DecodeErrorKind::UnexpectedValue { name: "LedPattern", value: 9, .. }
        ));
    }

    #[test]
    fn rejects_bad_records() {
        let mut config = Config::default();
        config.channel.assignment = [0, 1, 2, 3, 4, 4];
        assert_eq!(config.verify(), Err(ConfigError::DuplicateChannel { value: 4 }));

        let mut config = Config::default();
        config.channel.assignment[0] = 6;
        assert_eq!(
            config.verify(),
            Err(ConfigError::ChannelOutOfRange { index: 0, value: 6 })
        );

        let mut config = Config::default();
        config.pid_parameters.yaw_slave.kd = f32::NAN;
        assert!(matches!(config.verify(), Err(ConfigError::NonFinite { .. })));

        let mut config = Config::default();
        config.state_parameters.state_estimation[1] = 1.5;
        assert_eq!(
            config.verify(),
            Err(ConfigError::EstimationWeight { value: 1.5 })
        );

        let mut config = Config::default();
        config.name = DeviceName::new("no/slash").unwrap();
        assert!(matches!(
            config.verify(),
            Err(ConfigError::Name(NameError::IllegalCharacter { index: 2, .. }))
        ));
    }

    #[test]
    fn partial_round_trip_keeps_other_fields() {
        let mut source = Config::default();
        source.mix_table = MixTable {
            fz: [2; 8],
            tx: [3; 8],
            ty: [4; 8],
            tz: [5; 8],
        };
        source.led_states.0[3].pattern = LedPattern::Breathe;
        source.led_states.0[4].pattern = LedPattern::Solid;

        let mut payload = MessageEncoder::<LARGE_CAPACITY>::empty();
        source
            .write_partial(
                &mut payload,
                ConfigSubmask::MIX_TABLE | ConfigSubmask::LED_STATES,
                1 << 3,
            )
            .unwrap();
        assert_eq!(payload.len(), 2 + 32 + 2 + 11);

        let mut reader = FieldReader::new(payload.as_bytes());
        let submask: ConfigSubmask = reader.parse().unwrap();
        let mut target = Config::default();
        target.read_partial(&mut reader, submask).unwrap();
        assert!(reader.is_empty());

        assert_eq!(target.mix_table, source.mix_table);
        assert_eq!(target.led_states.0[3].pattern, LedPattern::Breathe);
        assert_eq!(target.led_states.0[4], Config::default().led_states.0[4]);
        assert_eq!(target.pid_parameters, source.pid_parameters);
    }

    #[test]
    fn partial_read_stops_at_first_failure() {
        let mut payload = MessageEncoder::<LARGE_CAPACITY>::empty();
        payload.write(&[7u8, 7, 7]).unwrap();
        payload.write(&[0u8; 10]).unwrap(); // PCB needs 24 bytes

        let mut reader = FieldReader::new(payload.as_bytes());
        let mut config = Config::default();
        let result = config.read_partial(
            &mut reader,
            ConfigSubmask::VERSION | ConfigSubmask::PCB | ConfigSubmask::DEVICE_NAME,
        );

        assert!(result.is_err());
        assert_eq!(config.version.major, 7);
        assert_eq!(config.name, DeviceName::default());
    }

    #[test]
    fn partial_reset() {
        let mut config = Config::default();
        config.mag_bias.offset = [1.0, 2.0, 3.0];
        config.led_states.0[0].pattern = LedPattern::Solid;
        config.led_states.0[1].pattern = LedPattern::Solid;

        config.reset_partial(ConfigSubmask::MAG_BIAS | ConfigSubmask::LED_STATES, 0b10);

        assert_eq!(config.mag_bias.offset, [0.0; 3]);
        assert_eq!(config.led_states.0[0].pattern, LedPattern::Solid);
        assert_eq!(config.led_states.0[1], Config::default().led_states.0[1]);
    }
}
