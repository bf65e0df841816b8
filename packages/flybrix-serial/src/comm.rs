//! The protocol dispatcher and telemetry encoder.

use log::{debug, error, trace, warn};
use thiserror::Error;

use flybrix_wire::{
    command::{LedCommand, RecordingFlags, SerialRc},
    config::{Config, ConfigError, ConfigSubmask},
    frame::{decode_frame, DEBUG_CAPACITY, LARGE_CAPACITY, RESPONSE_CAPACITY, SMALL_CAPACITY},
    message::{CommandMask, Header, MessageType, Response},
    state::StateMask,
    DecodeError, EncodeError, FieldReader, MessageEncoder,
};

use crate::{Log, LogError, Storage, StorageError, System, Transport, TransportError};

/// Run-time knobs changed over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommSettings {
    /// Telemetry fields sent when [`SerialComm::send_state`] is given an empty mask.
    pub state_mask: StateMask,
    /// Ticks between telemetry frames on the link.
    pub state_delay: u16,
    /// Ticks between telemetry frames in the log.
    pub log_delay: u16,
}

impl Default for CommSettings {
    fn default() -> Self {
        Self {
            state_mask: StateMask::MICROS
                | StateMask::STATUS
                | StateMask::V0
                | StateMask::MOTOR_OUT
                | StateMask::KINE_ANGLE
                | StateMask::KINE_ALTITUDE,
            state_delay: 1001,
            log_delay: 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum CommError {
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Log error: {0}")]
    LogError(#[from] LogError),

    #[error("Message encoding error: {0}")]
    EncodeError(#[from] EncodeError),

    #[error("Field decoding error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),
}

impl CommError {
    /// Whether a collaborator, rather than the message, caused the failure.
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_) | Self::StorageError(_) | Self::LogError(_)
        )
    }
}

/// Ack mask of one command frame, plus the first collaborator failure.
#[derive(Debug)]
struct Acks {
    mask: CommandMask,
    error: Option<CommError>,
}

impl Acks {
    fn new() -> Self {
        Self {
            mask: CommandMask::empty(),
            error: None,
        }
    }

    fn record(&mut self, operation: CommandMask, result: Result<(), CommError>) {
        match result {
            Ok(()) => self.mask |= operation,
            Err(err) => self.fail(operation, err),
        }
    }

    fn fail(&mut self, operation: CommandMask, err: CommError) {
        match &err {
            CommError::DecodeError(_) => debug!("Skipping {:?}: {}", operation, err),
            CommError::ConfigError(_) => warn!("Refusing {:?}: {}", operation, err),
            _ => error!("{:?} failed: {}", operation, err),
        }

        if err.is_collaborator_error() && self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Serial protocol endpoint of the flight controller.
///
/// Owns its collaborators and is driven by an external scheduler, which calls
/// [`read`](SerialComm::read) to drain incoming commands and
/// [`send_state`](SerialComm::send_state) to emit telemetry.
#[derive(Debug)]
pub struct SerialComm<T, S, L, Y> {
    transport: T,
    storage: S,
    log: L,
    system: Y,
    settings: CommSettings,
}

impl<T: Transport, S: Storage, L: Log, Y: System> SerialComm<T, S, L, Y> {
    pub fn new(transport: T, storage: S, log: L, system: Y) -> Self {
        Self::with_settings(transport, storage, log, system, CommSettings::default())
    }

    pub fn with_settings(transport: T, storage: S, log: L, system: Y, settings: CommSettings) -> Self {
        Self {
            transport,
            storage,
            log,
            system,
            settings,
        }
    }

    /// Processes frames until the transport has none left.
    ///
    /// Returns the number of frames handled. A frame that fails does not stop
    /// the ones after it.
    pub fn read(&mut self) -> Result<usize, CommError> {
        let mut handled = 0;

        while let Some(frame) = self.transport.read_frame()? {
            if let Err(err) = self.process_frame(&frame) {
                warn!("Frame {} completed with errors: {}", handled, err);
            }
            handled += 1;
        }

        Ok(handled)
    }

    /// Executes every operation requested by one command frame.
    ///
    /// Operations run in [`CommandMask`] bit order, each on the fields that
    /// follow the previous one. An operation whose fields fail to parse or
    /// validate is left out of the ack mask and the rest still run. Frames
    /// that are malformed or are not commands are dropped.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator failure, after every operation has run
    /// and the requested [`Response`] has been sent.
    pub fn process_frame(&mut self, frame: &[u8]) -> Result<CommandMask, CommError> {
        trace!("received frame: {:x?}", frame);

        let data = match decode_frame(frame) {
            Ok(data) => data,
            Err(err) => {
                debug!("Dropping frame: {}", err);
                return Ok(CommandMask::empty());
            }
        };

        let mut reader = FieldReader::new(&data);
        let header = match reader.parse::<Header>() {
            Ok(header) => header,
            Err(err) => {
                debug!("Dropping message with unreadable header: {}", err);
                return Ok(CommandMask::empty());
            }
        };
        if header.message_type != MessageType::Command {
            debug!("Ignoring {:?} message", header.message_type);
            return Ok(CommandMask::empty());
        }

        let mask = CommandMask::from_bits_retain(header.mask);
        let mut acks = Acks::new();

        if mask.contains(CommandMask::SET_EEPROM_DATA) {
            let result = self.set_config(&mut reader);
            acks.record(CommandMask::SET_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REINIT_EEPROM_DATA) {
            let result = self.commit(&Config::default());
            acks.record(CommandMask::REINIT_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REQ_EEPROM_DATA) {
            let result = self.send_configuration();
            acks.record(CommandMask::REQ_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REQ_ENABLE_ITERATION) {
            let result = reader.parse::<u8>().map(|flag| {
                if flag == 1 {
                    self.system.process_motor_enabling_iteration();
                } else {
                    self.system.disable_motors();
                }
            });
            acks.record(CommandMask::REQ_ENABLE_ITERATION, result.map_err(CommError::from));
        }
        if mask.intersects(CommandMask::MOTOR_OVERRIDE_SPEED_ALL) {
            for (motor, bit) in CommandMask::MOTOR_OVERRIDE_SPEEDS.into_iter().enumerate() {
                if mask.contains(bit) {
                    let result = reader
                        .parse::<u16>()
                        .map(|value| self.system.set_motor_out(motor, value));
                    acks.record(bit, result.map_err(CommError::from));
                }
            }
        }
        if mask.contains(CommandMask::SET_COMMAND_OVERRIDE) {
            let result = reader
                .parse::<u8>()
                .map(|flag| self.system.set_command_override(flag == 1));
            acks.record(CommandMask::SET_COMMAND_OVERRIDE, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_STATE_MASK) {
            let result = reader
                .parse::<u32>()
                .map(|bits| self.settings.state_mask = StateMask::from_bits_truncate(bits));
            acks.record(CommandMask::SET_STATE_MASK, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_STATE_DELAY) {
            let result = reader
                .parse::<u16>()
                .map(|delay| self.settings.state_delay = delay);
            acks.record(CommandMask::SET_STATE_DELAY, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_SD_WRITE_DELAY) {
            let result = reader
                .parse::<u16>()
                .map(|delay| self.settings.log_delay = delay);
            acks.record(CommandMask::SET_SD_WRITE_DELAY, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_LED) {
            let result = reader
                .parse::<LedCommand>()
                .map(|command| self.system.set_led(command));
            acks.record(CommandMask::SET_LED, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_SERIAL_RC) {
            let result = reader
                .parse::<SerialRc>()
                .map(|SerialRc(command)| self.system.set_serial_rc(command));
            acks.record(CommandMask::SET_SERIAL_RC, result.map_err(CommError::from));
        }
        if mask.contains(CommandMask::SET_CARD_RECORDING) {
            let result = self.set_recording(&mut reader);
            acks.record(CommandMask::SET_CARD_RECORDING, result);
        }
        if mask.contains(CommandMask::SET_PARTIAL_EEPROM_DATA) {
            let result = self.set_partial_config(&mut reader);
            acks.record(CommandMask::SET_PARTIAL_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REINIT_PARTIAL_EEPROM_DATA) {
            let result = self.reinit_partial_config(&mut reader);
            acks.record(CommandMask::REINIT_PARTIAL_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REQ_PARTIAL_EEPROM_DATA) {
            let result = self.request_partial_config(&mut reader);
            acks.record(CommandMask::REQ_PARTIAL_EEPROM_DATA, result);
        }
        if mask.contains(CommandMask::REQ_CARD_RECORDING_STATE) {
            let result = self.send_recording_state();
            acks.record(CommandMask::REQ_CARD_RECORDING_STATE, result);
        }

        if !reader.is_empty() {
            debug!("{} trailing bytes in command {:?}", reader.len(), mask);
        }

        if mask.contains(CommandMask::REQ_RESPONSE) {
            if let Err(err) = self.send_response(mask, acks.mask) {
                acks.fail(CommandMask::REQ_RESPONSE, err);
            }
        }

        match acks.error {
            Some(err) => Err(err),
            None => Ok(acks.mask),
        }
    }

    /// Sends a telemetry frame.
    ///
    /// An empty `mask` falls back to the configured state mask. Nothing is
    /// sent if that is empty too, or if `to_log` is set and the log is closed.
    pub fn send_state(&mut self, timestamp_us: u32, mask: StateMask, to_log: bool) -> Result<(), CommError> {
        if to_log && !self.log.is_open() {
            return Ok(());
        }

        let mask = if mask.is_empty() { self.settings.state_mask } else { mask };
        let mask = mask & StateMask::all();
        if mask.is_empty() {
            return Ok(());
        }

        let mut payload = MessageEncoder::<LARGE_CAPACITY>::new(MessageType::State, mask.bits())?;
        self.system
            .telemetry()
            .write_to(timestamp_us, mask, &mut payload)?;

        self.write_frame(&payload, to_log)
    }

    /// Sends the configuration in effect, as a [`CommandMask::SET_EEPROM_DATA`] command.
    pub fn send_configuration(&mut self) -> Result<(), CommError> {
        let mut payload =
            MessageEncoder::<LARGE_CAPACITY>::new(MessageType::Command, CommandMask::SET_EEPROM_DATA.bits())?;
        payload.write(self.system.config())?;

        self.write_frame(&payload, false)
    }

    /// Sends part of the configuration in effect, as a
    /// [`CommandMask::SET_PARTIAL_EEPROM_DATA`] command.
    pub fn send_partial_configuration(&mut self, submask: ConfigSubmask, led_mask: u16) -> Result<(), CommError> {
        let mut payload = MessageEncoder::<LARGE_CAPACITY>::new(
            MessageType::Command,
            CommandMask::SET_PARTIAL_EEPROM_DATA.bits(),
        )?;
        self.system
            .config()
            .write_partial(&mut payload, submask, led_mask)?;

        self.write_frame(&payload, false)
    }

    /// Sends null-terminated text, cut short if it does not fit one frame.
    pub fn send_debug_string(&mut self, text: &str, message_type: MessageType) -> Result<(), CommError> {
        let mut payload = MessageEncoder::<DEBUG_CAPACITY>::new(message_type, u32::MAX)?;

        let room = payload.capacity() - payload.len() - 1;
        let bytes = text.as_bytes();
        if bytes.len() > room {
            debug!("Truncating debug string from {} to {} bytes", bytes.len(), room);
        }
        payload.write(&bytes[..bytes.len().min(room)])?;
        payload.write(&0u8)?;

        self.write_frame(&payload, false)
    }

    pub fn settings(&self) -> &CommSettings {
        &self.settings
    }

    pub fn state_mask(&self) -> StateMask {
        self.settings.state_mask
    }

    pub fn set_state_mask(&mut self, mask: StateMask) {
        self.settings.state_mask = mask;
    }

    pub fn add_to_state_mask(&mut self, mask: StateMask) {
        self.settings.state_mask |= mask;
    }

    pub fn remove_from_state_mask(&mut self, mask: StateMask) {
        self.settings.state_mask &= !mask;
    }

    pub fn state_delay(&self) -> u16 {
        self.settings.state_delay
    }

    pub fn log_delay(&self) -> u16 {
        self.settings.log_delay
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn system(&self) -> &Y {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut Y {
        &mut self.system
    }

    fn set_config(&mut self, reader: &mut FieldReader<'_>) -> Result<(), CommError> {
        let config = reader.parse::<Config>()?;
        config.verify()?;
        self.commit(&config)
    }

    fn set_partial_config(&mut self, reader: &mut FieldReader<'_>) -> Result<(), CommError> {
        let submask = reader.parse::<ConfigSubmask>()?;
        let mut config = match self.storage.read() {
            Ok(config) => config,
            Err(err) => {
                // Consume the sub-fields anyway so later operations stay aligned.
                let _ = Config::default().read_partial(reader, submask);
                return Err(err.into());
            }
        };
        config.read_partial(reader, submask)?;
        config.verify()?;
        self.commit(&config)
    }

    fn reinit_partial_config(&mut self, reader: &mut FieldReader<'_>) -> Result<(), CommError> {
        let submask = reader.parse::<ConfigSubmask>()?;
        let led_mask = if submask.contains(ConfigSubmask::LED_STATES) {
            reader.parse::<u16>()?
        } else {
            0
        };

        let mut config = self.storage.read()?;
        config.reset_partial(submask, led_mask);
        config.verify()?;
        self.commit(&config)
    }

    fn request_partial_config(&mut self, reader: &mut FieldReader<'_>) -> Result<(), CommError> {
        let submask = reader.parse::<ConfigSubmask>()?;
        let led_mask = if submask.contains(ConfigSubmask::LED_STATES) {
            reader.parse::<u16>()?
        } else {
            0
        };

        self.send_partial_configuration(submask, led_mask)
    }

    /// Persists a verified configuration, then puts it into effect.
    fn commit(&mut self, config: &Config) -> Result<(), CommError> {
        self.storage.write(config)?;
        self.system.apply_config(config);
        Ok(())
    }

    fn set_recording(&mut self, reader: &mut FieldReader<'_>) -> Result<(), CommError> {
        let flags = reader.parse::<RecordingFlags>()?;

        self.log.set_lock(false);
        let result = if flags.contains(RecordingFlags::RECORD) {
            self.log.open()
        } else {
            self.log.close()
        };
        self.log.set_lock(flags.contains(RecordingFlags::LOCK));

        Ok(result?)
    }

    fn send_recording_state(&mut self) -> Result<(), CommError> {
        let mut payload = MessageEncoder::<SMALL_CAPACITY>::new(
            MessageType::Command,
            (CommandMask::SET_SD_WRITE_DELAY | CommandMask::SET_CARD_RECORDING).bits(),
        )?;

        let mut flags = RecordingFlags::empty();
        flags.set(RecordingFlags::RECORD, self.log.is_open());
        flags.set(RecordingFlags::LOCK, self.log.is_locked());
        payload.write(&(self.settings.log_delay, flags))?;

        self.write_frame(&payload, false)
    }

    fn send_response(&mut self, mask: CommandMask, ack: CommandMask) -> Result<(), CommError> {
        let mut payload = MessageEncoder::<RESPONSE_CAPACITY>::empty();
        payload.write(&Response { mask, ack })?;

        self.write_frame(&payload, false)
    }

    fn write_frame<const N: usize>(&mut self, payload: &MessageEncoder<N>, to_log: bool) -> Result<(), CommError> {
        let frame = payload.finish();
        trace!("sent frame: {:x?}", frame);

        if to_log {
            self.log.write(&frame)?;
        } else {
            self.transport.write_bytes(&frame)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use flybrix_wire::{
        command::{LedCommand, LedPattern, RcCommand},
        config::{Config, ConfigSubmask, MixTable},
        frame::{decode_frame, encode_frame, DEBUG_CAPACITY, LARGE_CAPACITY},
        message::{CommandMask, Header, MessageType, Response},
        state::{StateMask, Telemetry},
        Decode, DeviceName, Encode, MessageEncoder,
    };
    use log::LevelFilter;
    use simplelog::TestLogger;

    use super::{CommError, CommSettings, SerialComm};
    use crate::{Log, LogError, Storage, StorageError, System, Transport, TransportError};

    #[derive(Debug, Default)]
    struct MockTransport {
        incoming: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        unplugged: bool,
    }

    impl Transport for MockTransport {
        fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.incoming.pop_front())
        }

        fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.unplugged {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct MockStorage {
        config: Config,
        writes: usize,
        broken: bool,
    }

    impl Storage for MockStorage {
        fn read(&mut self) -> Result<Config, StorageError> {
            if self.broken {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "bad sector").into());
            }
            Ok(self.config.clone())
        }

        fn write(&mut self, config: &Config) -> Result<(), StorageError> {
            self.writes += 1;
            self.config = config.clone();
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct MockLog {
        open: bool,
        locked: bool,
        written: Vec<Vec<u8>>,
    }

    impl Log for MockLog {
        fn is_open(&self) -> bool {
            self.open
        }

        fn is_locked(&self) -> bool {
            self.locked
        }

        fn open(&mut self) -> Result<(), LogError> {
            if !self.locked {
                self.open = true;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), LogError> {
            if !self.locked {
                self.open = false;
            }
            Ok(())
        }

        fn set_lock(&mut self, locked: bool) {
            self.locked = locked;
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), LogError> {
            if !self.open {
                return Err(LogError::NotOpen);
            }
            self.written.push(bytes.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct MockSystem {
        config: Config,
        applied: usize,
        telemetry: Telemetry,
        motors: [Option<u16>; 8],
        enabling_steps: usize,
        disarmed: bool,
        command_override: Option<bool>,
        led: Option<LedCommand>,
        serial_rc: Option<Option<RcCommand>>,
    }

    impl System for MockSystem {
        fn config(&self) -> &Config {
            &self.config
        }

        fn apply_config(&mut self, config: &Config) {
            self.applied += 1;
            self.config = config.clone();
        }

        fn process_motor_enabling_iteration(&mut self) {
            self.enabling_steps += 1;
        }

        fn disable_motors(&mut self) {
            self.disarmed = true;
        }

        fn set_motor_out(&mut self, motor: usize, value: u16) {
            self.motors[motor] = Some(value);
        }

        fn set_command_override(&mut self, enabled: bool) {
            self.command_override = Some(enabled);
        }

        fn set_led(&mut self, command: LedCommand) {
            self.led = Some(command);
        }

        fn set_serial_rc(&mut self, command: Option<RcCommand>) {
            self.serial_rc = Some(command);
        }

        fn telemetry(&self) -> &Telemetry {
            &self.telemetry
        }
    }

    type TestComm = SerialComm<MockTransport, MockStorage, MockLog, MockSystem>;

    fn comm() -> TestComm {
        let _ = TestLogger::init(LevelFilter::Trace, simplelog::Config::default());
        SerialComm::new(
            MockTransport::default(),
            MockStorage::default(),
            MockLog::default(),
            MockSystem::default(),
        )
    }

    fn encoded<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
        let mut data = vec![0; value.size()];
        value.encode(&mut data);
        data
    }

    fn command(mask: CommandMask, body: &[u8]) -> Vec<u8> {
        let mut payload = MessageEncoder::<DEBUG_CAPACITY>::new(MessageType::Command, mask.bits()).unwrap();
        payload.write(body).unwrap();
        payload.finish()
    }

    fn sent(comm: &TestComm) -> Vec<Vec<u8>> {
        comm.transport()
            .sent
            .iter()
            .map(|frame| decode_frame(frame).unwrap())
            .collect()
    }

    fn last_response(comm: &TestComm) -> Response {
        let frames = sent(comm);
        Response::decode(&mut frames.last().unwrap().as_slice()).unwrap()
    }

    #[test]
    fn invalid_name_is_not_acked_or_persisted() {
        let mut comm = comm();
        let mut config = Config::default();
        config.name = DeviceName::new("bad!name").unwrap();

        let mask = CommandMask::SET_EEPROM_DATA | CommandMask::REQ_RESPONSE;
        let ack = comm.process_frame(&command(mask, &encoded(&config))).unwrap();

        assert_eq!(ack, CommandMask::empty());
        assert_eq!(comm.storage().writes, 0);
        assert_eq!(comm.system().applied, 0);
        assert_eq!(
            last_response(&comm),
            Response {
                mask,
                ack: CommandMask::empty()
            }
        );
    }

    #[test]
    fn full_config_is_persisted_and_applied() {
        let mut comm = comm();
        let mut config = Config::default();
        config.name = DeviceName::new("racer-7").unwrap();
        config.mag_bias.offset = [0.5, -0.25, 3.0];

        let ack = comm
            .process_frame(&command(CommandMask::SET_EEPROM_DATA, &encoded(&config)))
            .unwrap();

        assert_eq!(ack, CommandMask::SET_EEPROM_DATA);
        assert_eq!(comm.storage().config, config);
        assert_eq!(comm.system().config, config);
        assert!(comm.transport().sent.is_empty());
    }

    #[test]
    fn reinit_restores_defaults() {
        let mut comm = comm();
        comm.system_mut().config.pcb.orientation = [0.0, 0.0, 90.0];

        let ack = comm
            .process_frame(&command(CommandMask::REINIT_EEPROM_DATA, &[]))
            .unwrap();

        assert_eq!(ack, CommandMask::REINIT_EEPROM_DATA);
        assert_eq!(comm.system().config, Config::default());
        assert_eq!(comm.storage().writes, 1);
    }

    #[test]
    fn motor_overrides_are_independent() {
        let mut comm = comm();
        let mask = CommandMask::MOTOR_OVERRIDE_SPEED_0
            | CommandMask::MOTOR_OVERRIDE_SPEED_2
            | CommandMask::MOTOR_OVERRIDE_SPEED_5
            | CommandMask::REQ_RESPONSE;

        // Only two of the three values are present.
        let body = encoded(&(1200u16, 1300u16));
        let ack = comm.process_frame(&command(mask, &body)).unwrap();

        assert_eq!(
            ack,
            CommandMask::MOTOR_OVERRIDE_SPEED_0 | CommandMask::MOTOR_OVERRIDE_SPEED_2
        );
        assert_eq!(comm.system().motors[0], Some(1200));
        assert_eq!(comm.system().motors[2], Some(1300));
        assert_eq!(comm.system().motors[5], None);
        assert_eq!(last_response(&comm).ack, ack);
    }

    #[test]
    fn failed_field_does_not_consume_input() {
        let mut comm = comm();
        let mask = CommandMask::SET_STATE_MASK | CommandMask::SET_STATE_DELAY;

        // Too short for the 4-byte state mask, enough for the 2-byte delay.
        let ack = comm.process_frame(&command(mask, &[0x10, 0x27])).unwrap();

        assert_eq!(ack, CommandMask::SET_STATE_DELAY);
        assert_eq!(comm.state_delay(), 10_000);
        assert_eq!(comm.state_mask(), CommSettings::default().state_mask);
    }

    #[test]
    fn actuation_commands_reach_the_system() {
        let mut comm = comm();
        let mask = CommandMask::REQ_ENABLE_ITERATION
            | CommandMask::SET_COMMAND_OVERRIDE
            | CommandMask::SET_STATE_MASK
            | CommandMask::SET_SD_WRITE_DELAY
            | CommandMask::SET_LED
            | CommandMask::SET_SERIAL_RC;

        let mut body = vec![1u8, 1];
        body.extend(encoded(&(StateMask::MICROS | StateMask::GYRO).bits()));
        body.extend(encoded(&7u16));
        body.extend([LedPattern::Beacon as u8, 1, 2, 3, 4, 5, 6, 1, 0]);
        body.extend(encoded(&(1u8, 900i16, -10i16, 20i16, -30i16, 0b11u8)));

        let ack = comm.process_frame(&command(mask, &body)).unwrap();
        assert_eq!(ack, mask);

        let system = comm.system();
        assert_eq!(system.enabling_steps, 1);
        assert!(!system.disarmed);
        assert_eq!(system.command_override, Some(true));
        assert_eq!(system.led.unwrap().pattern, LedPattern::Beacon);
        assert_eq!(system.led.unwrap().color_left, [4, 5, 6]);
        assert_eq!(
            system.serial_rc,
            Some(Some(RcCommand {
                throttle: 900,
                pitch: -10,
                roll: 20,
                yaw: -30,
                aux_mask: 0b11,
            }))
        );
        assert_eq!(comm.state_mask(), StateMask::MICROS | StateMask::GYRO);
        assert_eq!(comm.log_delay(), 7);

        // Unknown LED pattern.
        let mask = CommandMask::REQ_ENABLE_ITERATION | CommandMask::SET_LED;
        let body = [0, 42, 0, 0, 0, 0, 0, 0, 0, 0];
        let ack = comm.process_frame(&command(mask, &body)).unwrap();
        assert_eq!(ack, CommandMask::REQ_ENABLE_ITERATION);
        assert!(comm.system().disarmed);
        assert_eq!(comm.system().led.unwrap().pattern, LedPattern::Beacon);

        let ack = comm
            .process_frame(&command(CommandMask::SET_SERIAL_RC, &[0; 10]))
            .unwrap();
        assert_eq!(ack, CommandMask::SET_SERIAL_RC);
        assert_eq!(comm.system().serial_rc, Some(None));
    }

    #[test]
    fn partial_set_preserves_untouched_fields() {
        let mut comm = comm();
        let mut stored = Config::default();
        stored.mag_bias.offset = [9.0, 8.0, 7.0];
        comm.storage.config = stored.clone();

        let mix_table = MixTable {
            fz: [1, 1, 1, 1, 1, 1, 0, 0],
            tx: [1, 1, 1, -1, -1, -1, 0, 0],
            ty: [-1, 0, 1, 1, 0, -1, 0, 0],
            tz: [1, -1, 1, -1, 1, -1, 0, 0],
        };
        let mut body = encoded(&ConfigSubmask::MIX_TABLE);
        body.extend(encoded(&mix_table));

        let ack = comm
            .process_frame(&command(CommandMask::SET_PARTIAL_EEPROM_DATA, &body))
            .unwrap();

        assert_eq!(ack, CommandMask::SET_PARTIAL_EEPROM_DATA);
        let expected = Config { mix_table, ..stored };
        assert_eq!(comm.storage().config, expected);
        assert_eq!(comm.system().config, expected);

        let ack = comm
            .process_frame(&command(CommandMask::REQ_EEPROM_DATA, &[]))
            .unwrap();
        assert_eq!(ack, CommandMask::REQ_EEPROM_DATA);

        let frames = sent(&comm);
        let mut reply = frames[0].as_slice();
        assert_eq!(Header::decode(&mut reply).unwrap().mask, CommandMask::SET_EEPROM_DATA.bits());
        assert_eq!(Config::decode(&mut reply).unwrap(), expected);
        assert!(reply.is_empty());
    }

    #[test]
    fn partial_set_commits_nothing_after_a_short_field() {
        let mut comm = comm();
        let submask = ConfigSubmask::VERSION | ConfigSubmask::PCB | ConfigSubmask::DEVICE_NAME;
        let mut body = encoded(&submask);
        body.extend([2, 0, 0]);
        body.extend([0; 10]);

        let ack = comm
            .process_frame(&command(CommandMask::SET_PARTIAL_EEPROM_DATA, &body))
            .unwrap();

        assert_eq!(ack, CommandMask::empty());
        assert_eq!(comm.storage().writes, 0);
        assert_eq!(comm.system().applied, 0);
    }

    #[test]
    fn partial_set_rejects_invalid_record() {
        let mut comm = comm();
        let mut body = encoded(&ConfigSubmask::CHANNEL);
        let mut channel = Config::default().channel;
        channel.assignment = [0, 0, 1, 2, 3, 4];
        body.extend(encoded(&channel));

        let ack = comm
            .process_frame(&command(CommandMask::SET_PARTIAL_EEPROM_DATA, &body))
            .unwrap();

        assert_eq!(ack, CommandMask::empty());
        assert_eq!(comm.storage().writes, 0);
    }

    #[test]
    fn partial_reinit_restores_selected_entries() {
        let mut comm = comm();
        let mut stored = Config::default();
        stored.led_states.0[2].pattern = LedPattern::Solid;
        stored.led_states.0[3].pattern = LedPattern::Solid;
        stored.name = DeviceName::new("custom").unwrap();
        comm.storage.config = stored;

        let mut body = encoded(&(ConfigSubmask::LED_STATES | ConfigSubmask::DEVICE_NAME));
        body.extend(encoded(&0b0100u16));

        let ack = comm
            .process_frame(&command(CommandMask::REINIT_PARTIAL_EEPROM_DATA, &body))
            .unwrap();

        let defaults = Config::default();
        let config = &comm.storage().config;
        assert_eq!(ack, CommandMask::REINIT_PARTIAL_EEPROM_DATA);
        assert_eq!(config.led_states.0[2], defaults.led_states.0[2]);
        assert_eq!(config.led_states.0[3].pattern, LedPattern::Solid);
        assert_eq!(config.name, defaults.name);
    }

    #[test]
    fn storage_failure_is_reported() {
        let mut comm = comm();
        comm.storage.broken = true;

        let mask = CommandMask::REINIT_PARTIAL_EEPROM_DATA | CommandMask::SET_STATE_DELAY | CommandMask::REQ_RESPONSE;
        let mut body = encoded(&5u16);
        body.extend(encoded(&ConfigSubmask::MAG_BIAS));

        let err = comm.process_frame(&command(mask, &body)).unwrap_err();
        assert!(matches!(err, CommError::StorageError(_)));
        assert_eq!(comm.state_delay(), 5);
        assert_eq!(last_response(&comm).ack, CommandMask::SET_STATE_DELAY);
    }

    #[test]
    fn partial_set_with_unreadable_storage_keeps_later_fields_aligned() {
        let mut comm = comm();
        comm.storage.broken = true;

        let mut bias = Config::default().mag_bias;
        bias.offset = [1.0, 2.0, 3.0];
        let mut body = encoded(&ConfigSubmask::MAG_BIAS);
        body.extend(encoded(&bias));
        body.extend(encoded(&ConfigSubmask::VERSION));

        let mask = CommandMask::SET_PARTIAL_EEPROM_DATA
            | CommandMask::REQ_PARTIAL_EEPROM_DATA
            | CommandMask::REQ_RESPONSE;
        let err = comm.process_frame(&command(mask, &body)).unwrap_err();
        assert!(matches!(err, CommError::StorageError(_)));
        assert_eq!(comm.storage().writes, 0);
        assert_eq!(comm.system().applied, 0);

        let mut expected = MessageEncoder::<LARGE_CAPACITY>::new(
            MessageType::Command,
            CommandMask::SET_PARTIAL_EEPROM_DATA.bits(),
        )
        .unwrap();
        comm.system()
            .config
            .write_partial(&mut expected, ConfigSubmask::VERSION, 0)
            .unwrap();

        let frames = sent(&comm);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], expected.as_bytes());
        assert_eq!(last_response(&comm).ack, CommandMask::REQ_PARTIAL_EEPROM_DATA);
    }

    #[test]
    fn config_requests_reply_from_the_live_system() {
        let mut comm = comm();
        comm.system_mut().config.mag_bias.offset = [1.0, 2.0, 3.0];
        comm.system_mut().config.led_states.0[0].indicator_green = 9;

        let mut body = encoded(&(ConfigSubmask::MAG_BIAS | ConfigSubmask::LED_STATES));
        body.extend(encoded(&0b1u16));

        let mask = CommandMask::REQ_EEPROM_DATA | CommandMask::REQ_PARTIAL_EEPROM_DATA;
        let ack = comm.process_frame(&command(mask, &body)).unwrap();
        assert_eq!(ack, mask);

        let frames = sent(&comm);
        assert_eq!(frames.len(), 2);

        let mut full = frames[0].as_slice();
        let header = Header::decode(&mut full).unwrap();
        assert_eq!(header.message_type, MessageType::Command);
        assert_eq!(header.mask, CommandMask::SET_EEPROM_DATA.bits());
        assert_eq!(Config::decode(&mut full).unwrap(), comm.system().config);

        let mut expected = MessageEncoder::<LARGE_CAPACITY>::new(
            MessageType::Command,
            CommandMask::SET_PARTIAL_EEPROM_DATA.bits(),
        )
        .unwrap();
        comm.system()
            .config
            .write_partial(&mut expected, ConfigSubmask::MAG_BIAS | ConfigSubmask::LED_STATES, 0b1)
            .unwrap();
        assert_eq!(frames[1], expected.as_bytes());
        assert_eq!(frames[1].len(), Header::SIZE + 2 + 12 + 2 + 11);
    }

    #[test]
    fn partial_request_needs_led_mask() {
        let mut comm = comm();
        let body = encoded(&ConfigSubmask::LED_STATES);

        let ack = comm
            .process_frame(&command(CommandMask::REQ_PARTIAL_EEPROM_DATA, &body))
            .unwrap();

        assert_eq!(ack, CommandMask::empty());
        assert!(comm.transport().sent.is_empty());
    }

    #[test]
    fn recording_follows_flags_and_lock() {
        let mut comm = comm();

        comm.process_frame(&command(CommandMask::SET_CARD_RECORDING, &[0b11]))
            .unwrap();
        assert!(comm.log().is_open());
        assert!(comm.log().is_locked());

        let ack = comm
            .process_frame(&command(
                CommandMask::SET_CARD_RECORDING | CommandMask::REQ_CARD_RECORDING_STATE,
                &[0b00],
            ))
            .unwrap();
        assert_eq!(
            ack,
            CommandMask::SET_CARD_RECORDING | CommandMask::REQ_CARD_RECORDING_STATE
        );
        assert!(!comm.log().is_open());
        assert!(!comm.log().is_locked());

        let frames = sent(&comm);
        let mut state = frames[0].as_slice();
        let header = Header::decode(&mut state).unwrap();
        assert_eq!(
            header.mask,
            (CommandMask::SET_SD_WRITE_DELAY | CommandMask::SET_CARD_RECORDING).bits()
        );
        assert_eq!(state, &[2, 0, 0]);
    }

    #[test]
    fn non_command_frames_are_ignored() {
        let mut comm = comm();

        let mut state = MessageEncoder::<LARGE_CAPACITY>::new(MessageType::State, CommandMask::REQ_RESPONSE.bits())
            .unwrap();
        state.write(&0u32).unwrap();
        assert_eq!(comm.process_frame(&state.finish()).unwrap(), CommandMask::empty());

        assert_eq!(comm.process_frame(&[0x05, 0x01, 0x00]).unwrap(), CommandMask::empty());
        assert_eq!(comm.process_frame(&encode_frame(&[9, 9, 9])).unwrap(), CommandMask::empty());
        assert!(comm.transport().sent.is_empty());
    }

    #[test]
    fn drain_processes_every_buffered_frame() {
        let mut comm = comm();
        let incoming = &mut comm.transport_mut().incoming;
        incoming.push_back(command(CommandMask::SET_STATE_DELAY, &encoded(&50u16)));
        incoming.push_back(vec![0x07, 0x00]);
        incoming.push_back(command(CommandMask::REQ_RESPONSE, &[]));
        incoming.push_back(command(CommandMask::SET_SD_WRITE_DELAY, &encoded(&9u16)));

        assert_eq!(comm.read().unwrap(), 4);
        assert_eq!(comm.state_delay(), 50);
        assert_eq!(comm.log_delay(), 9);
        assert_eq!(
            last_response(&comm),
            Response {
                mask: CommandMask::REQ_RESPONSE,
                ack: CommandMask::empty()
            }
        );
        assert_eq!(comm.read().unwrap(), 0);
    }

    #[test]
    fn transport_failure_does_not_stop_later_operations() {
        let mut comm = comm();
        comm.transport_mut().unplugged = true;

        let mask = CommandMask::REQ_EEPROM_DATA | CommandMask::SET_STATE_DELAY | CommandMask::REQ_RESPONSE;
        let err = comm.process_frame(&command(mask, &encoded(&77u16))).unwrap_err();

        assert!(matches!(err, CommError::TransportError(_)));
        assert_eq!(comm.state_delay(), 77);

        comm.transport_mut().unplugged = false;
        let ack = comm
            .process_frame(&command(CommandMask::REQ_EEPROM_DATA, &[]))
            .unwrap();
        assert_eq!(ack, CommandMask::REQ_EEPROM_DATA);
    }

    #[test]
    fn state_uses_configured_mask_by_default() {
        let mut comm = comm();
        comm.system_mut().telemetry.loop_count = 3;

        comm.send_state(1234, StateMask::empty(), false).unwrap();

        let frames = sent(&comm);
        let mut frame = frames[0].as_slice();
        let header = Header::decode(&mut frame).unwrap();
        let mask = CommSettings::default().state_mask;
        assert_eq!(header.message_type, MessageType::State);
        assert_eq!(header.mask, mask.bits());
        assert_eq!(frame.len(), mask.packet_size());
        assert_eq!(&frame[..4], &1234u32.to_le_bytes());

        comm.set_state_mask(StateMask::empty());
        comm.send_state(0, StateMask::empty(), false).unwrap();
        assert_eq!(comm.transport().sent.len(), 1);
    }

    #[test]
    fn state_to_log_needs_open_log() {
        let mut comm = comm();

        comm.send_state(0, StateMask::LOOP_COUNT, true).unwrap();
        assert!(comm.log().written.is_empty());
        assert!(comm.transport().sent.is_empty());

        comm.process_frame(&command(CommandMask::SET_CARD_RECORDING, &[0b01]))
            .unwrap();
        comm.send_state(0, StateMask::LOOP_COUNT, true).unwrap();
        assert_eq!(comm.log().written.len(), 1);
        assert!(comm.transport().sent.is_empty());

        let frame = decode_frame(&comm.log().written[0]).unwrap();
        assert_eq!(frame.len(), Header::SIZE + 4);
    }

    #[test]
    fn state_mask_helpers() {
        let mut comm = comm();
        comm.set_state_mask(StateMask::MICROS);
        comm.add_to_state_mask(StateMask::GYRO | StateMask::MAG);
        comm.remove_from_state_mask(StateMask::MICROS | StateMask::MAG);
        assert_eq!(comm.state_mask(), StateMask::GYRO);
    }

    #[test]
    fn debug_string_is_terminated_and_truncated() {
        let mut comm = comm();
        comm.send_debug_string("hello", MessageType::DebugString).unwrap();

        let long = "x".repeat(3000);
        comm.send_debug_string(&long, MessageType::DebugString).unwrap();

        let frames = sent(&comm);
        assert_eq!(&frames[0][..8], &[3, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&frames[0][8..], b"hello\0");

        assert_eq!(frames[1].len(), DEBUG_CAPACITY);
        assert_eq!(frames[1].last(), Some(&0));
    }
}
