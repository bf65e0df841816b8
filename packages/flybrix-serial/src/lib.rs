//! Command dispatcher and telemetry encoder for the Flybrix flight controller.
//!
//! [`SerialComm`] owns four collaborators supplied by the host firmware:
//! a [`Transport`] carrying frames to and from the client, the [`Storage`]
//! holding the persisted configuration, a [`Log`] file that receives
//! telemetry, and the live [`System`] that receives decoded commands.

pub use flybrix_wire as protocol;

use flybrix_wire::{
    command::{LedCommand, RcCommand},
    config::Config,
    state::Telemetry,
    DecodeError,
};
use thiserror::Error;

pub mod comm;
pub mod fs;
#[cfg(feature = "serial")]
pub mod serial;

pub use comm::{CommError, CommSettings, SerialComm};

/// A byte link to the client.
pub trait Transport {
    /// Returns the next complete frame, if one is buffered.
    ///
    /// The frame is still COBS encoded; its trailing delimiter may or may not
    /// be present.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Writes an already framed message.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Persistent home of the [`Config`].
pub trait Storage {
    fn read(&mut self) -> Result<Config, StorageError>;

    fn write(&mut self, config: &Config) -> Result<(), StorageError>;
}

/// The on-board log file.
///
/// While locked, requests to open or close the file are ignored.
pub trait Log {
    fn is_open(&self) -> bool;

    fn is_locked(&self) -> bool;

    fn open(&mut self) -> Result<(), LogError>;

    fn close(&mut self) -> Result<(), LogError>;

    fn set_lock(&mut self, locked: bool);

    fn write(&mut self, bytes: &[u8]) -> Result<(), LogError>;
}

/// The live flight system.
pub trait System {
    /// The configuration currently in effect.
    fn config(&self) -> &Config;

    /// Puts a verified configuration into effect.
    fn apply_config(&mut self, config: &Config);

    /// Advances the motor arming sequence by one step.
    fn process_motor_enabling_iteration(&mut self);

    fn disable_motors(&mut self);

    fn set_motor_out(&mut self, motor: usize, value: u16);

    /// Grants (or revokes) the link authority over the pilot command.
    fn set_command_override(&mut self, enabled: bool);

    fn set_led(&mut self, command: LedCommand);

    /// Injects a pilot command, or hands authority back to the receiver on `None`.
    fn set_serial_rc(&mut self, command: Option<RcCommand>);

    fn telemetry(&self) -> &Telemetry;
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("Serialport Error: {0}")]
    SerialportError(#[from] serialport::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stored configuration is corrupt: {0}")]
    DecodeError(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Log file is not open")]
    NotOpen,
}
