//! Wire format of the Flybrix flight controller serial protocol.
//!
//! Messages are `{type: u32, mask: u32, body}` in little endian, wrapped in
//! COBS frames. The mask selects which fields follow, so both ends walk the
//! same ordered field tables defined here.

#![no_std]

extern crate alloc;

pub mod command;
pub mod config;
pub mod frame;
pub mod message;
pub mod state;

mod decode;
mod encode;
mod name;
mod version;

pub use decode::{Decode, DecodeError, DecodeErrorKind, FieldReader};
pub use encode::{Encode, EncodeError, MessageEncoder};
pub use name::{DEFAULT_DEVICE_NAME, DEVICE_NAME_CAPACITY, DeviceName, NameError};
pub use version::Version;
